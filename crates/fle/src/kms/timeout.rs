//! [`TimeoutKms`]: per-call deadline around any [`KmsClient`].

use std::time::Duration;

use async_trait::async_trait;
use tokio::time;
use tracing::warn;
use zeroize::Zeroizing;

use super::{KmsBackendKind, KmsClient, KmsError};

/// Default deadline for a single KMS call.
pub const DEFAULT_KMS_TIMEOUT: Duration = Duration::from_secs(5);

/// Fails any call to the inner client that runs longer than `timeout`.
///
/// An unresponsive KMS must not hold a request open indefinitely. Nothing is
/// retried.
#[derive(Debug)]
pub struct TimeoutKms<K> {
    inner: K,
    timeout: Duration,
}

impl<K> TimeoutKms<K> {
    pub fn new(inner: K, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl<K: KmsClient> KmsClient for TimeoutKms<K> {
    async fn encrypt_dek(&self, plaintext: &[u8]) -> Result<Vec<u8>, KmsError> {
        match time::timeout(self.timeout, self.inner.encrypt_dek(plaintext)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(kms = %self.inner.backend(), timeout = ?self.timeout, "KMS wrap timed out");
                Err(KmsError::Timeout(self.timeout))
            }
        }
    }

    async fn decrypt_dek(&self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, KmsError> {
        match time::timeout(self.timeout, self.inner.decrypt_dek(wrapped)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(kms = %self.inner.backend(), timeout = ?self.timeout, "KMS unwrap timed out");
                Err(KmsError::Timeout(self.timeout))
            }
        }
    }

    fn backend(&self) -> KmsBackendKind {
        self.inner.backend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kms::{LocalKms, MockKmsClient};

    struct SlowKms(Duration);

    #[async_trait]
    impl KmsClient for SlowKms {
        async fn encrypt_dek(&self, plaintext: &[u8]) -> Result<Vec<u8>, KmsError> {
            time::sleep(self.0).await;
            Ok(plaintext.to_vec())
        }

        async fn decrypt_dek(&self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, KmsError> {
            time::sleep(self.0).await;
            Ok(Zeroizing::new(wrapped.to_vec()))
        }

        fn backend(&self) -> KmsBackendKind {
            KmsBackendKind::Gcp
        }
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let kms = TimeoutKms::new(SlowKms(Duration::from_millis(500)), Duration::from_millis(20));
        assert!(matches!(
            kms.encrypt_dek(b"k").await,
            Err(KmsError::Timeout(d)) if d == Duration::from_millis(20)
        ));
        assert!(matches!(kms.decrypt_dek(b"k").await, Err(KmsError::Timeout(_))));
    }

    #[tokio::test]
    async fn fast_backend_passes_through() {
        let kms = TimeoutKms::new(LocalKms::new([3u8; 32]), DEFAULT_KMS_TIMEOUT);
        let wrapped = kms.encrypt_dek(&[4u8; 32]).await.unwrap();
        assert_eq!(kms.decrypt_dek(&wrapped).await.unwrap().as_slice(), &[4u8; 32]);
        assert_eq!(kms.backend(), KmsBackendKind::Local);
    }

    #[tokio::test]
    async fn inner_errors_are_not_retried() {
        let mut mock = MockKmsClient::new();
        mock.expect_decrypt_dek().times(1).returning(|_| {
            Err(KmsError::Transport {
                backend: KmsBackendKind::Gcp,
                message: "PERMISSION_DENIED".into(),
            })
        });
        mock.expect_backend().return_const(KmsBackendKind::Gcp);

        let kms = TimeoutKms::new(mock, DEFAULT_KMS_TIMEOUT);
        assert!(matches!(
            kms.decrypt_dek(b"blob").await,
            Err(KmsError::Transport { .. })
        ));
    }
}
