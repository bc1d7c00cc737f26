//! Host name resolution cache shared by a connection and its transport.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::debug;

use super::transport::TransportError;

/// How long a resolved address list stays valid.
pub const DEFAULT_DNS_TTL: Duration = Duration::from_secs(300);

const MAX_ENTRIES: u64 = 64;

/// TTL-bounded `host:port` to socket address cache.
#[derive(Clone)]
pub struct DnsCache {
    entries: Cache<String, Arc<Vec<SocketAddr>>>,
}

impl Default for DnsCache {
    fn default() -> Self {
        Self::new(DEFAULT_DNS_TTL)
    }
}

impl DnsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Resolve `host:port`, consulting the cache first.
    pub async fn resolve(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Arc<Vec<SocketAddr>>, TransportError> {
        let key = format!("{host}:{port}");
        self.entries
            .try_get_with(key.clone(), async move {
                debug!("Resolving {}", key);
                let addrs: Vec<SocketAddr> = tokio::net::lookup_host(key.as_str())
                    .await
                    .map_err(|_| TransportError::DnsFailure)?
                    .collect();
                if addrs.is_empty() {
                    return Err(TransportError::DnsFailure);
                }
                Ok(Arc::new(addrs))
            })
            .await
            .map_err(|err| *err)
    }

    /// Drop a cached entry, e.g. after the resolved address refused a connection.
    pub async fn invalidate(&self, host: &str, port: u16) {
        self.entries.invalidate(&format!("{host}:{port}")).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_localhost_is_cached() {
        let cache = DnsCache::default();
        let first = cache.resolve("127.0.0.1", 8080).await.unwrap();
        assert_eq!(first[0], "127.0.0.1:8080".parse::<SocketAddr>().unwrap());

        let second = cache.resolve("127.0.0.1", 8080).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        cache.invalidate("127.0.0.1", 8080).await;
        let third = cache.resolve("127.0.0.1", 8080).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_dns_failure() {
        let cache = DnsCache::default();
        let result = cache.resolve("host.invalid", 443).await;
        assert_eq!(result.unwrap_err(), TransportError::DnsFailure);
    }
}
