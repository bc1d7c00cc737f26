//! One-time process initialisation.

use once_cell::sync::OnceCell;
use tracing::debug;

use super::base::{UspError, UspResult};

static PLATFORM: OnceCell<()> = OnceCell::new();

/// Install the TLS crypto provider used by every connection.
///
/// Runs once per process; later calls return immediately. A provider that was
/// already installed by the embedding application is kept.
pub fn init() -> UspResult<()> {
    PLATFORM
        .get_or_try_init(|| {
            if rustls::crypto::ring::default_provider()
                .install_default()
                .is_err()
            {
                debug!("TLS crypto provider already installed");
            }
            if rustls::crypto::CryptoProvider::get_default().is_none() {
                return Err(UspError::RuntimeError(
                    "Failed to initialize platform (TLS crypto provider)".to_string(),
                ));
            }
            Ok(())
        })
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        assert!(init().is_ok());
        assert!(init().is_ok());
        assert!(rustls::crypto::CryptoProvider::get_default().is_some());
    }
}
