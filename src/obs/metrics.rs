// self
use crate::obs::{Operation, Outcome, RetryReason};

/// Records an operation outcome via the global metrics recorder (when enabled).
pub fn record_outcome(operation: Operation, outcome: Outcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"basecamp_api_operation_total",
			"operation" => operation.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (operation, outcome);
	}
}

/// Records an automatic retry via the global metrics recorder and tracing (when enabled).
pub fn record_retry(reason: RetryReason) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("basecamp_api_retry_total", "reason" => reason.as_str()).increment(1);
	}
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(reason = reason.as_str(), "retrying request");
	}

	#[cfg(not(any(feature = "metrics", feature = "tracing")))]
	{
		let _ = reason;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_noop_without_features() {
		record_outcome(Operation::Fetch, Outcome::Failure);
		record_retry(RetryReason::Throttled);
	}
}
