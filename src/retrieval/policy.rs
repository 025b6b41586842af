//! Poll policy and cancellation

use super::{RetrievalError, RetrievalResult};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Bounds and pacing of the poll loop
///
/// The delay between polls is `base_delay` plus a uniform jitter in
/// `[0, jitter)`, drawn once per job so concurrent clients drift apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub base_delay: Duration,
    pub jitter: Duration,
    /// Maximum number of polls, `None` for unbounded
    pub max_attempts: Option<u32>,
    /// Maximum time spent polling, `None` for unbounded
    pub max_wait: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(875),
            jitter: Duration::from_millis(500),
            max_attempts: Some(240),
            max_wait: Some(Duration::from_secs(30 * 60)),
        }
    }
}

impl PollPolicy {
    /// Default pacing without attempt or time limits
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            max_wait: None,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Base delay plus a fresh random jitter
    pub fn jittered_delay(&self) -> Duration {
        let fraction: f64 = rand::thread_rng().gen();
        self.base_delay + self.jitter.mul_f64(fraction)
    }

    /// Delay for one job: the override when given, otherwise jittered
    pub fn delay(&self, delay_override: Option<Duration>) -> Duration {
        delay_override.unwrap_or_else(|| self.jittered_delay())
    }

    /// Check whether poll number `attempt` (1-based) may still be issued
    pub fn check(&self, attempt: u32, elapsed: Duration) -> RetrievalResult<()> {
        if let Some(max_attempts) = self.max_attempts {
            if attempt > max_attempts {
                return Err(RetrievalError::PollExhausted {
                    attempts: max_attempts,
                });
            }
        }
        if let Some(max_wait) = self.max_wait {
            if elapsed >= max_wait {
                return Err(RetrievalError::DeadlineExceeded(max_wait));
            }
        }
        Ok(())
    }
}

/// Cooperative cancellation shared between a caller and its jobs
///
/// Clones observe the same flag.
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Request cancellation of every job holding this token
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        while !*receiver.borrow_and_update() {
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = PollPolicy::default();
        assert_eq!(policy.base_delay, Duration::from_millis(875));
        assert_eq!(policy.jitter, Duration::from_millis(500));
        assert_eq!(policy.max_attempts, Some(240));
    }

    #[test]
    fn test_jittered_delay_bounds() {
        let policy = PollPolicy::default();
        for _ in 0..200 {
            let delay = policy.jittered_delay();
            assert!(delay >= Duration::from_millis(875));
            assert!(delay < Duration::from_millis(1375));
        }
    }

    #[test]
    fn test_delay_override() {
        let policy = PollPolicy::default();
        assert_eq!(policy.delay(Some(Duration::from_millis(5))), Duration::from_millis(5));
    }

    #[test]
    fn test_check_attempts() {
        let policy = PollPolicy::default().with_max_attempts(Some(2)).with_max_wait(None);
        assert!(policy.check(1, Duration::ZERO).is_ok());
        assert!(policy.check(2, Duration::ZERO).is_ok());
        assert!(matches!(
            policy.check(3, Duration::ZERO),
            Err(RetrievalError::PollExhausted { attempts: 2 })
        ));
    }

    #[test]
    fn test_check_deadline() {
        let policy = PollPolicy::default()
            .with_max_attempts(None)
            .with_max_wait(Some(Duration::from_secs(10)));
        assert!(policy.check(1000, Duration::from_secs(9)).is_ok());
        assert!(matches!(
            policy.check(1, Duration::from_secs(10)),
            Err(RetrievalError::DeadlineExceeded(_))
        ));
    }

    #[test]
    fn test_unbounded() {
        let policy = PollPolicy::unbounded();
        assert!(policy.check(u32::MAX, Duration::from_secs(u32::MAX as u64)).is_ok());
    }

    #[tokio::test]
    async fn test_cancel_token() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());

        let waiter = tokio::spawn(async move { observer.cancelled().await });
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap();
    }
}
