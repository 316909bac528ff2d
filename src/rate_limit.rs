//! Client-side request pacing consulted by the pipeline before every send.
//!
//! A [`RateLimitPolicy`] decides, at a given instant, whether the next request may go out now
//! or must be delayed. [`IntervalRateLimiter`] enforces a fixed minimum spacing between permitted
//! requests: each evaluation reserves the next free slot while holding its lock, so the waiting
//! itself happens outside the critical section and concurrent callers queue into one cadence.

// crates.io
use tokio::time::{self, Instant};
// self
use crate::{_prelude::*, config::DEFAULT_REQUEST_DELAY};

/// Strategy consulted before each outbound request.
///
/// Implementations must record their decision as a reservation: a returned
/// [`RateLimitDecision::Delay`] is a commitment that the caller may proceed at
/// [`RetryDirective::earliest_retry_at`] without evaluating again.
pub trait RateLimitPolicy
where
	Self: Send + Sync,
{
	/// Reserves a send slot for a request observed at `now`.
	fn evaluate(&self, now: Instant) -> RateLimitDecision;
}

/// Result emitted by a [`RateLimitPolicy`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
	/// The request may proceed immediately.
	Allow,
	/// The request must wait until the directive's instant.
	Delay(RetryDirective),
}

/// Advises callers when to send after a [`RateLimitDecision::Delay`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Instant at which the reserved slot opens.
	pub earliest_retry_at: Instant,
	/// Wait from the evaluation instant until the slot opens.
	pub recommended_backoff: StdDuration,
	/// Optional descriptive string.
	pub reason: Option<String>,
}
impl RetryDirective {
	/// Creates a new directive with the provided timing metadata.
	pub fn new(earliest_retry_at: Instant, recommended_backoff: StdDuration) -> Self {
		Self { earliest_retry_at, recommended_backoff, reason: None }
	}

	/// Adds a human-readable reason.
	pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());

		self
	}
}

/// Fixed-interval limiter: no two permitted instants are closer than [`Self::delay`].
#[derive(Debug)]
pub struct IntervalRateLimiter {
	delay: StdDuration,
	next_slot: Mutex<Option<Instant>>,
}
impl IntervalRateLimiter {
	/// Creates a limiter spacing permitted requests `delay` apart.
	pub fn new(delay: StdDuration) -> Self {
		Self { delay, next_slot: Mutex::new(None) }
	}

	/// Minimum spacing between two permitted requests.
	pub fn delay(&self) -> StdDuration {
		self.delay
	}
}
impl Default for IntervalRateLimiter {
	fn default() -> Self {
		Self::new(DEFAULT_REQUEST_DELAY)
	}
}
impl RateLimitPolicy for IntervalRateLimiter {
	fn evaluate(&self, now: Instant) -> RateLimitDecision {
		let slot = {
			let mut next_slot = self.next_slot.lock();
			let slot = next_slot.map_or(now, |next| next.max(now));

			*next_slot = Some(slot + self.delay);

			slot
		};

		if slot <= now {
			RateLimitDecision::Allow
		} else {
			RateLimitDecision::Delay(
				RetryDirective::new(slot, slot - now).with_reason("minimum request spacing"),
			)
		}
	}
}

/// Suspends until `policy` permits the next request, or fails with [`Error::Cancelled`].
pub async fn wait_if_necessary<P>(policy: &P, cancel: &CancellationToken) -> Result<()>
where
	P: ?Sized + RateLimitPolicy,
{
	match policy.evaluate(Instant::now()) {
		RateLimitDecision::Allow => Ok(()),
		RateLimitDecision::Delay(directive) => pause_until(directive.earliest_retry_at, cancel).await,
	}
}

/// Sleeps until `deadline`, or fails with [`Error::Cancelled`] if `cancel` fires first.
pub(crate) async fn pause_until(deadline: Instant, cancel: &CancellationToken) -> Result<()> {
	tokio::select! {
		biased;
		_ = cancel.cancelled() => Err(Error::Cancelled),
		_ = time::sleep_until(deadline) => Ok(()),
	}
}
