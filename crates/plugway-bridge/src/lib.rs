//! plugway Bridge - Device protocol access through an external helper
//!
//! The device wire protocol (session negotiation, encryption, command
//! encoding) lives in a helper program. This crate invokes it as a
//! subprocess and exchanges JSON over stdout:
//!
//! - `<program> scan --timeout <secs>` prints the responding devices
//! - `<program> status|on|off --id <id> --ip <ip> --version <v>` queries or
//!   switches one device, with the local key in `PLUGWAY_LOCAL_KEY`

pub mod client;
pub mod scan;
pub mod transport;

pub use client::{BridgeClient, BridgeConnector, LOCAL_KEY_ENV};
pub use transport::{BridgeError, BridgeTransport};
