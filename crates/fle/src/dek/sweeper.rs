//! Background eviction of expired [`DekCache`] entries.
//!
//! Reads already ignore expired entries; the sweeper only bounds how long
//! expired key material stays resident.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::DekCache;

/// Owns the sweep task. Dropping a running sweeper does not stop it; call
/// [`CacheSweeper::stop`].
#[derive(Debug)]
pub struct CacheSweeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl CacheSweeper {
    /// Spawn a task that calls [`DekCache::purge_expired`] every `interval`.
    ///
    /// The first sweep fires after one full interval.
    pub fn start(cache: DekCache, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            // First tick fires immediately — skip it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = cache.purge_expired().await;
                        if evicted > 0 {
                            debug!(evicted, "purged expired DEK cache entries");
                        }
                    }
                }
            }
        });
        Self { cancel, handle }
    }

    /// Returns `true` until the task has exited.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the task to exit and wait for it.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "DEK cache sweeper task did not exit cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_LEN;
    use crate::dek::Dek;

    #[tokio::test]
    async fn sweeps_expired_entries() {
        let cache = DekCache::new(Duration::from_millis(5), 16);
        let dek = Dek::from_slice(&[1u8; KEY_LEN]).unwrap();
        cache.insert("org_1", 1, b"blob", &dek).await;

        let sweeper = CacheSweeper::start(cache.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.is_empty().await);
        sweeper.stop().await;
    }

    #[tokio::test]
    async fn stop_after_abort_does_not_panic() {
        let sweeper = CacheSweeper::start(DekCache::default(), Duration::from_secs(3600));
        sweeper.handle.abort();
        sweeper.stop().await;
    }

    #[tokio::test]
    async fn stop_terminates_task() {
        let sweeper = CacheSweeper::start(DekCache::default(), Duration::from_secs(3600));
        assert!(sweeper.is_running());
        sweeper.stop().await;
    }
}
