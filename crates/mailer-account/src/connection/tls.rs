//! TLS session setup.
//!
//! Certificates are checked against the web PKI, but a failed check does not
//! abort the handshake. The failure is recorded as a [`CertificateIssue`]
//! and the caller asks the user whether to continue once the session is up.
//! Handshake signatures are always verified.

use std::sync::{Arc, Mutex};

use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::{Error, Result};

/// Why the server certificate was not trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateIssue {
    /// The chain did not verify against the trust anchors.
    Unverified(String),
    /// The certificate is valid but not for this host name.
    Mismatch,
}

impl CertificateIssue {
    /// Question put to the user before continuing.
    #[must_use]
    pub const fn prompt(&self) -> &'static str {
        match self {
            Self::Unverified(_) => "The certificate could not be verified.\nConnect anyway?",
            Self::Mismatch => "The certificate could not be matched.\nConnect anyway?",
        }
    }
}

impl std::fmt::Display for CertificateIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unverified(reason) => write!(f, "certificate not verified: {reason}"),
            Self::Mismatch => f.write_str("certificate does not match host name"),
        }
    }
}

type IssueSlot = Arc<Mutex<Option<CertificateIssue>>>;

#[derive(Debug)]
struct ConfirmingVerifier {
    inner: Arc<WebPkiServerVerifier>,
    issue: IssueSlot,
}

impl ConfirmingVerifier {
    fn record(&self, issue: CertificateIssue) {
        tracing::warn!(%issue, "untrusted server certificate");
        if let Ok(mut slot) = self.issue.lock() {
            *slot = Some(issue);
        }
    }
}

impl ServerCertVerifier for ConfirmingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Ok(verified) => Ok(verified),
            Err(rustls::Error::InvalidCertificate(
                CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. },
            )) => {
                self.record(CertificateIssue::Mismatch);
                Ok(ServerCertVerified::assertion())
            }
            Err(e) => {
                self.record(CertificateIssue::Unverified(e.to_string()));
                Ok(ServerCertVerified::assertion())
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Returns the bundled web PKI trust anchors.
#[must_use]
pub fn default_roots() -> RootCertStore {
    RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    }
}

/// Factory for client TLS sessions.
pub struct TlsSetup {
    connector: TlsConnector,
    issue: IssueSlot,
}

impl TlsSetup {
    /// Creates a session factory trusting `roots`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tls`] if no verifier can be built from the roots.
    pub fn new(roots: RootCertStore) -> Result<Self> {
        let inner = WebPkiServerVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| Error::Tls(rustls::Error::General(e.to_string())))?;
        let issue = IssueSlot::default();
        let verifier = ConfirmingVerifier {
            inner,
            issue: Arc::clone(&issue),
        };
        let config = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();
        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            issue,
        })
    }

    /// Runs the client handshake over `tcp`.
    ///
    /// On success the stream is returned with the certificate issue found
    /// during the handshake, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is not a valid server name or the
    /// handshake fails.
    pub async fn connect(
        &self,
        host: &str,
        tcp: TcpStream,
    ) -> Result<(TlsStream<TcpStream>, Option<CertificateIssue>)> {
        if let Ok(mut slot) = self.issue.lock() {
            *slot = None;
        }
        let server_name = ServerName::try_from(host.to_string())?;
        let stream = self.connector.connect(server_name, tcp).await?;
        let issue = self.issue.lock().ok().and_then(|mut slot| slot.take());
        tracing::debug!(host, trusted = issue.is_none(), "TLS session established");
        Ok((stream, issue))
    }
}

impl std::fmt::Debug for TlsSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSetup").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts() {
        assert_eq!(
            CertificateIssue::Mismatch.prompt(),
            "The certificate could not be matched.\nConnect anyway?"
        );
        assert_eq!(
            CertificateIssue::Unverified("UnknownIssuer".into()).prompt(),
            "The certificate could not be verified.\nConnect anyway?"
        );
    }

    #[test]
    fn test_setup_with_default_roots() {
        assert!(TlsSetup::new(default_roots()).is_ok());
    }

    #[test]
    fn test_setup_without_roots_fails() {
        assert!(matches!(
            TlsSetup::new(RootCertStore::empty()),
            Err(Error::Tls(_))
        ));
    }
}
