//! Host name resolution.

use std::io;
use std::net::SocketAddr;

use crate::{Error, Result};

/// Resolves `host` to every candidate stream address for `port`.
///
/// # Errors
///
/// Returns [`Error::Resolve`] if the lookup fails or yields no address.
pub async fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| Error::Resolve {
            host: host.to_string(),
            source,
        })?
        .collect();
    if addrs.is_empty() {
        return Err(Error::Resolve {
            host: host.to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no address found"),
        });
    }
    tracing::debug!(host, port, count = addrs.len(), "resolved");
    Ok(addrs)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_literal_address() {
        let addrs = resolve("127.0.0.1", 143).await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:143".parse().unwrap()]);
    }

    #[tokio::test]
    async fn test_resolve_failure() {
        let err = resolve("no-such-host.invalid", 110).await.unwrap_err();
        assert!(matches!(err, Error::Resolve { .. }));
    }
}
