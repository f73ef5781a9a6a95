//! Sealframe command-line tool.
//!
//! # Usage
//!
//! ```bash
//! # Load keys, signatures and group sessions
//! sealframe --db crypto.redb --user @me:example.org import bundle.json
//!
//! # Resolve a device's trust state
//! sealframe --db crypto.redb --user @me:example.org trust @alice:example.org <device key>
//!
//! # Decrypt an m.room.encrypted event
//! sealframe --db crypto.redb --user @me:example.org decrypt event.json
//! ```

mod bundle;

use std::{
    error::Error,
    io::{self, Write},
    path::PathBuf,
};

use clap::{Parser, Subcommand};
use sealframe_core::{
    DeviceId, DeviceIdentity, Event, Machine, MachineConfig, RedbStore, SenderKey, SigningKey,
    TrustState, UserId,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::bundle::Bundle;

/// Sealframe trust and decryption tool
#[derive(Parser, Debug)]
#[command(name = "sealframe")]
#[command(about = "Cross-signing trust queries and group decryption")]
#[command(version)]
struct Args {
    /// Path to the redb key store (created if missing)
    #[arg(long, default_value = "sealframe.redb")]
    db: PathBuf,

    /// Local account user ID
    #[arg(long)]
    user: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Do not report missing group sessions
    #[arg(long)]
    no_wedge_check: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a provisioning bundle
    Import {
        /// Bundle JSON file
        bundle: PathBuf,
    },

    /// Resolve a device's trust state
    Trust {
        /// Owner of the device
        user: String,

        /// Device Ed25519 signing key
        signing_key: String,

        /// Locally recorded trust state
        #[arg(long, default_value = "unset")]
        trust: TrustState,

        /// Device ID
        #[arg(long, default_value = "")]
        device: String,

        /// Device Curve25519 identity key
        #[arg(long, default_value = "")]
        identity_key: String,
    },

    /// Check whether a user is trusted
    UserTrust {
        /// User to check
        user: String,
    },

    /// Decrypt an m.room.encrypted event
    Decrypt {
        /// Event JSON file
        event: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    run(args, &mut io::stdout().lock())
}

/// Execute one command against the store, writing results to `out`.
fn run(args: Args, out: &mut impl Write) -> Result<(), Box<dyn Error>> {
    let store = RedbStore::open(&args.db)?;
    tracing::debug!(db = %args.db.display(), "Opened key store");

    let config = MachineConfig { wedge_check: !args.no_wedge_check, ..MachineConfig::default() };
    let machine = Machine::with_config(store, UserId::new(args.user), &config);

    match args.command {
        Command::Import { bundle } => {
            let bundle = Bundle::from_json(&std::fs::read_to_string(&bundle)?)?;
            let summary = bundle.import(machine.store())?;
            tracing::info!(
                keys = summary.keys,
                signatures = summary.signatures,
                sessions = summary.sessions,
                "Imported bundle"
            );
            writeln!(
                out,
                "imported {} keys, {} signatures, {} sessions",
                summary.keys, summary.signatures, summary.sessions
            )?;
        },
        Command::Trust { user, signing_key, trust, device, identity_key } => {
            let device = DeviceIdentity {
                user_id: UserId::new(user),
                device_id: DeviceId::new(device),
                identity_key: SenderKey::new(identity_key),
                signing_key: SigningKey::new(signing_key),
                trust,
            };
            writeln!(out, "{}", machine.resolve_trust(&device))?;
        },
        Command::UserTrust { user } => {
            let trusted = machine.is_user_trusted(&UserId::new(user));
            writeln!(out, "{}", if trusted { "trusted" } else { "untrusted" })?;
        },
        Command::Decrypt { event } => {
            let event = Event::from_json(&std::fs::read_to_string(&event)?)?;
            match machine.decrypt_megolm_event(&event) {
                Ok(decrypted) => {
                    serde_json::to_writer_pretty(&mut *out, &decrypted)?;
                    writeln!(out)?;
                },
                Err(e) => {
                    tracing::error!(
                        event_id = event.event_id.as_str(),
                        needs_new_session = e.needs_new_session(),
                        error = %e,
                        "Decryption failed"
                    );
                    return Err(e.into());
                },
            }
        },
    }

    Ok(())
}
