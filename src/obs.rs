//! Optional observability helpers for API operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `basecamp_api.operation` with the
//!   `operation` and `stage` (call site) fields, plus debug events for automatic retries.
//! - Enable `metrics` to increment the `basecamp_api_operation_total` counter for every
//!   attempt/success/failure, labeled by `operation` + `outcome`, and the
//!   `basecamp_api_retry_total` counter labeled by `reason`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operation kinds observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
	/// Rate-limited, cache-validated resource fetch.
	Fetch,
	/// Refresh-token grant.
	RefreshToken,
	/// Authorization-code grant.
	ExchangeCode,
	/// Browser-cookie-assisted authorization.
	CookieBootstrap,
}
impl Operation {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Operation::Fetch => "fetch",
			Operation::RefreshToken => "refresh_token",
			Operation::ExchangeCode => "exchange_code",
			Operation::CookieBootstrap => "cookie_bootstrap",
		}
	}
}
impl Display for Operation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl Outcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Outcome::Attempt => "attempt",
			Outcome::Success => "success",
			Outcome::Failure => "failure",
		}
	}
}
impl Display for Outcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Reasons the pipeline retried a request on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RetryReason {
	/// HTTP 401; the access token was force-refreshed.
	Unauthorized,
	/// HTTP 429; the pipeline waited for the Retry-After delay.
	Throttled,
}
impl RetryReason {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RetryReason::Unauthorized => "unauthorized",
			RetryReason::Throttled => "throttled",
		}
	}
}

/// Records the final outcome of `result` for `operation`.
pub(crate) fn record_result<T>(operation: Operation, result: &Result<T>) {
	match result {
		Ok(_) => record_outcome(operation, Outcome::Success),
		Err(_) => record_outcome(operation, Outcome::Failure),
	}
}
