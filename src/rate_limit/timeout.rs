//! Request Timeout Management
//!
//! Bounds how long a single unit of work may run.

use std::future::Future;
use std::time::Duration;
use tokio::time;

use super::error::QuotaError;

/// Request timeout configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeout {
    duration: Duration,
}

impl Default for RequestTimeout {
    fn default() -> Self {
        Self::from_secs(super::config::DEFAULT_REQUEST_TIMEOUT_SECS)
    }
}

impl RequestTimeout {
    /// Create a new request timeout
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Create a timeout from seconds
    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Get the timeout duration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Run a unit of work under the timeout
    ///
    /// Errors from the work itself come back as [`QuotaError::Request`],
    /// expiry as [`QuotaError::Timeout`].
    pub async fn run<F, T>(&self, future: F) -> Result<T, QuotaError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match time::timeout(self.duration, future).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(QuotaError::Request(e)),
            Err(_) => Err(QuotaError::Timeout(self.duration)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_default() {
        let timeout = RequestTimeout::default();
        assert_eq!(timeout.duration(), Duration::from_secs(300));
    }

    #[test]
    fn test_timeout_from_secs() {
        let timeout = RequestTimeout::from_secs(45);
        assert_eq!(timeout.duration(), Duration::from_secs(45));
    }

    #[tokio::test]
    async fn test_timeout_run_success() {
        let timeout = RequestTimeout::from_secs(5);
        let result = timeout.run(async { Ok::<_, anyhow::Error>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_timeout_run_timeout() {
        let timeout = RequestTimeout::new(Duration::from_millis(50));

        let result = timeout
            .run(async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok::<(), anyhow::Error>(())
            })
            .await;

        assert!(matches!(result, Err(QuotaError::Timeout(d)) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_timeout_run_future_error() {
        let timeout = RequestTimeout::from_secs(5);

        let result = timeout
            .run(async { Err::<(), anyhow::Error>(anyhow::anyhow!("Test error")) })
            .await;

        match result {
            Err(QuotaError::Request(e)) => assert_eq!(e.to_string(), "Test error"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
