//! Missing-session diagnostics.
//!
//! When an envelope arrives for a session we do not hold, the peer may
//! believe a session exists that we lost (a "wedged" session). The hook is
//! informational: it cannot alter the decryption result and must return
//! without blocking.

use tokio::sync::mpsc;

use crate::ids::{EventId, RoomId, SenderKey, SessionId, UserId};

/// Report for an envelope whose group session is not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingSession {
    /// Room of the envelope
    pub room_id: RoomId,
    /// Sending user
    pub sender: UserId,
    /// Sending device identity key
    pub sender_key: SenderKey,
    /// Session the envelope was encrypted with
    pub session_id: SessionId,
    /// The envelope
    pub event_id: EventId,
}

/// Receives missing-session reports.
pub trait WedgeCheck: Send + Sync {
    /// Record a missing session. Must not block.
    fn session_missing(&self, report: &MissingSession);
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWedgeCheck;

impl WedgeCheck for NoWedgeCheck {
    fn session_missing(&self, _report: &MissingSession) {}
}

/// Logs every report at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingWedgeCheck;

impl WedgeCheck for TracingWedgeCheck {
    fn session_missing(&self, report: &MissingSession) {
        tracing::warn!(
            room_id = report.room_id.as_str(),
            sender = report.sender.as_str(),
            sender_key = report.sender_key.as_str(),
            session_id = report.session_id.as_str(),
            event_id = report.event_id.as_str(),
            "Group session missing, sender's session may be wedged"
        );
    }
}

/// Forwards reports to a bounded channel for an external recovery task.
///
/// Reports are dropped when the queue is full or the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelWedgeCheck {
    tx: mpsc::Sender<MissingSession>,
}

impl ChannelWedgeCheck {
    /// Create a hook and the receiving end of its queue.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<MissingSession>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl WedgeCheck for ChannelWedgeCheck {
    fn session_missing(&self, report: &MissingSession) {
        if let Err(e) = self.tx.try_send(report.clone()) {
            tracing::debug!(
                session_id = report.session_id.as_str(),
                error = %e,
                "Dropped missing-session report"
            );
        }
    }
}
