//! Error types for the account engine.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors that can occur while running a mail account.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Host name resolution failed.
    #[error("Cannot resolve {host}: {source}")]
    Resolve {
        /// Host name that was looked up.
        host: String,
        /// Underlying resolver error.
        #[source]
        source: std::io::Error,
    },

    /// No candidate address accepted the connection.
    #[error("Connection failed ({source})")]
    Connect {
        /// Last address that was tried.
        addr: SocketAddr,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// The user refused an untrusted server certificate.
    #[error("Certificate rejected: {0}")]
    CertificateRejected(String),

    /// Authentication failed or credentials are missing.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A server line did not match the grammar expected by the head command.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Server returned NO response.
    #[error("Server returned NO: {0}")]
    No(String),

    /// Server returned BAD response.
    #[error("Server returned BAD: {0}")]
    Bad(String),

    /// POP3 server returned `-ERR`.
    #[error("Server returned -ERR: {0}")]
    ServerError(String),

    /// Server refused the session in its greeting.
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// The peer closed the connection.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Invalid or missing configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid state for the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Returns true if this error terminates the connection.
    ///
    /// Negative completions for a single command (`NO`, `BAD`, `-ERR`) and
    /// refused requests are reported to the host and the queue carries on;
    /// everything else stops the account.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::No(_) | Self::Bad(_) | Self::ServerError(_) | Self::InvalidState(_)
        )
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(!Error::No("denied".into()).is_fatal());
        assert!(!Error::Bad("syntax".into()).is_fatal());
        assert!(!Error::ServerError("no such message".into()).is_fatal());
        assert!(!Error::InvalidState("unknown folder".into()).is_fatal());
        assert!(Error::Bye("maildrop locked".into()).is_fatal());
        assert!(Error::Parse("garbage".into()).is_fatal());
        assert!(Error::Auth("bad password".into()).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = Error::Auth("LOGIN rejected".into());
        assert_eq!(err.to_string(), "Authentication failed: LOGIN rejected");
    }
}
