//! Machine configuration.

use crate::decrypt::DEFAULT_LOCK_PRUNE_THRESHOLD;

/// Configuration for [`Machine`](crate::Machine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    /// Report missing group sessions to the wedge hook
    pub wedge_check: bool,

    /// Session-lock table size at which idle locks are pruned
    pub lock_prune_threshold: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self { wedge_check: true, lock_prune_threshold: DEFAULT_LOCK_PRUNE_THRESHOLD }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_decryptor_prune_threshold() {
        let config = MachineConfig::default();
        assert!(config.wedge_check);
        assert_eq!(config.lock_prune_threshold, DEFAULT_LOCK_PRUNE_THRESHOLD);
    }
}
