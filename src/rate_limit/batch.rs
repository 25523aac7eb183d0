//! Batch execution results.

use super::error::QuotaError;

/// Outcome of one attempted item
#[derive(Debug)]
pub struct BatchItemResult<T> {
    /// Position of the item in the input
    pub index: usize,
    /// Value produced, or why the item failed
    pub outcome: Result<T, QuotaError>,
}

impl<T> BatchItemResult<T> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// An item that failed, kept so the caller can retry it
#[derive(Debug, Clone, PartialEq)]
pub struct FailedRequest<I> {
    pub index: usize,
    pub request: I,
}

/// Summary of a batch run.
///
/// Items left unattempted after a quota stop appear only in
/// `not_attempted`, never in `results` or `failed_requests`.
#[derive(Debug)]
pub struct BatchResult<I, T> {
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<BatchItemResult<T>>,
    pub failed_requests: Vec<FailedRequest<I>>,
    pub not_attempted: usize,
}

impl<I, T> BatchResult<I, T> {
    pub fn new() -> Self {
        Self {
            successful: 0,
            failed: 0,
            results: Vec::new(),
            failed_requests: Vec::new(),
            not_attempted: 0,
        }
    }

    /// Whether processing stopped before the end of the input
    pub fn halted(&self) -> bool {
        self.not_attempted > 0
    }

    /// Successful values in input order
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.results.iter().filter_map(|r| r.outcome.as_ref().ok())
    }

    /// Failed items, handing back ownership for a retry
    pub fn into_failed_requests(self) -> Vec<I> {
        self.failed_requests.into_iter().map(|f| f.request).collect()
    }
}

impl<I, T> Default for BatchResult<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_batch() {
        let batch: BatchResult<String, u32> = BatchResult::new();
        assert_eq!(batch.successful, 0);
        assert_eq!(batch.failed, 0);
        assert!(!batch.halted());
        assert_eq!(batch.values().count(), 0);
    }

    #[test]
    fn test_values_and_failed_requests() {
        let mut batch: BatchResult<&str, u32> = BatchResult::new();
        batch.results.push(BatchItemResult {
            index: 0,
            outcome: Ok(10),
        });
        batch.results.push(BatchItemResult {
            index: 1,
            outcome: Err(QuotaError::Request(anyhow::anyhow!("boom"))),
        });
        batch.failed_requests.push(FailedRequest {
            index: 1,
            request: "second",
        });

        assert!(batch.results[0].is_success());
        assert!(!batch.results[1].is_success());
        assert_eq!(batch.values().copied().collect::<Vec<_>>(), vec![10]);
        assert_eq!(batch.into_failed_requests(), vec!["second"]);
    }
}
