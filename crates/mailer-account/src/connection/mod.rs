//! Connection management.
//!
//! This module provides the network side of an account:
//! - Connection tunables (idle delay, read chunk size)
//! - Host name resolution into candidate addresses
//! - Plain/TLS stream abstraction
//! - TLS sessions with interactive certificate confirmation

mod config;
mod resolve;
mod stream;
mod tls;

pub use config::{DEFAULT_IDLE_DELAY, DEFAULT_READ_CHUNK, Settings, SettingsBuilder};
pub use resolve::resolve;
pub use stream::{AccountStream, connect_addr};
pub use tls::{CertificateIssue, TlsSetup, default_roots};
