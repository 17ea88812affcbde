//! Connect retry with exponential backoff

use std::time::Duration;

use printeremu_core::constants::{MAX_RETRIES, RETRY_BASE_DELAY_MS, RETRY_MAX_DELAY_MS};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{error::*, FramedConnection, Transport};

/// How often and how patiently to retry a failed connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRIES,
            base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_millis(RETRY_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
    
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }
    
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }
    
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }
    
    /// Delay after the given failed attempt (1-based)
    ///
    /// `base * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let shift = attempt.saturating_sub(1).min(30);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

/// Connect, retrying retryable failures until the policy or `cancel` gives up
///
/// # Errors
///
/// - The first non-retryable error, unchanged
/// - [`Error::RetriesExhausted`] once `max_attempts` attempts failed
/// - [`Error::Cancelled`] if `cancel` fires while waiting
pub async fn connect_with_retry(
    transport: &dyn Transport,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<FramedConnection> {
    let max_attempts = policy.max_attempts.max(1);
    
    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        
        match transport.connect().await {
            Ok(conn) => {
                if attempt > 1 {
                    info!("Connected to {} after {} attempts", conn.remote_addr, attempt);
                }
                return Ok(conn);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt == max_attempts => {
                warn!("Connect attempt {}/{} to {} failed: {}", attempt, max_attempts, transport.remote_addr(), e);
            }
            Err(e) => {
                let delay = policy.delay_for(attempt as u32);
                warn!(
                    "Connect attempt {}/{} to {} failed: {}; retrying in {:?}",
                    attempt,
                    max_attempts,
                    transport.remote_addr(),
                    e,
                    delay
                );
                
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
    
    Err(Error::RetriesExhausted {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    
    use async_trait::async_trait;
    
    /// Fails the first `failures` connects, then hands out a memory connection
    struct FlakyTransport {
        failures: usize,
        attempts: AtomicUsize,
        error: fn() -> Error,
    }
    
    impl FlakyTransport {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                attempts: AtomicUsize::new(0),
                error: || Error::ConnectionTimeout,
            }
        }
    }
    
    #[async_trait]
    impl Transport for FlakyTransport {
        async fn connect(&self) -> Result<FramedConnection> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err((self.error)());
            }
            let (transport, _peer) = crate::memory::channel();
            transport.connect().await
        }
        
        fn remote_addr(&self) -> String {
            "flaky".into()
        }
    }
    
    #[test]
    fn test_backoff_calculation() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        
        // Capped
        assert_eq!(policy.delay_for(10), Duration::from_secs(5));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(5));
    }
    
    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_retries() {
        let transport = FlakyTransport::new(2);
        let conn = connect_with_retry(&transport, &RetryPolicy::default(), &CancellationToken::new()).await;
        
        assert!(conn.is_ok());
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
    }
    
    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let transport = FlakyTransport::new(usize::MAX);
        let policy = RetryPolicy::default().with_max_attempts(4);
        
        let err = connect_with_retry(&transport, &policy, &CancellationToken::new())
            .await
            .unwrap_err();
        
        assert!(matches!(err, Error::RetriesExhausted { attempts: 4 }));
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 4);
    }
    
    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_returns_immediately() {
        let transport = FlakyTransport {
            error: || Error::InvalidAddress("nowhere".into()),
            ..FlakyTransport::new(usize::MAX)
        };
        
        let err = connect_with_retry(&transport, &RetryPolicy::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        
        assert!(matches!(err, Error::InvalidAddress(_)));
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
    }
    
    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let transport = Arc::new(FlakyTransport::new(usize::MAX));
        let policy = RetryPolicy::default().with_base_delay(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        
        let task = {
            let transport = transport.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { connect_with_retry(transport.as_ref(), &policy, &cancel).await })
        };
        
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
    }
}
