//! Access token with a conservatively estimated expiry.

// crates.io
use time::PrimitiveDateTime;
// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Short-lived bearer credential plus the instant it should no longer be used.
///
/// The expiry is an estimate computed when the token endpoint answered, shortened by
/// [`AccessToken::SAFETY_MARGIN`] so callers never present a token the server already treats as
/// expired. Lifetimes too short to absorb the margin are treated as already expired.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
	secret: TokenSecret,
	expires_at: Option<OffsetDateTime>,
}
impl AccessToken {
	/// Margin subtracted from the server-reported lifetime.
	pub const SAFETY_MARGIN: Duration = Duration::seconds(10);
	/// Reported lifetimes at or below this value are not shortened; the token counts as expired.
	pub const MARGIN_THRESHOLD: Duration = Duration::seconds(15);

	/// Wraps a pre-obtained token with no known expiry.
	pub fn new(secret: impl Into<String>) -> Self {
		Self { secret: TokenSecret::new(secret), expires_at: None }
	}

	/// Builds a token from a grant completed at `completed_at` with lifetime `expires_in`.
	pub fn issued(
		secret: impl Into<String>,
		expires_in: Duration,
		completed_at: OffsetDateTime,
	) -> Self {
		let expires_at = if expires_in > Self::MARGIN_THRESHOLD {
			completed_at
				.checked_add(expires_in - Self::SAFETY_MARGIN)
				.unwrap_or_else(|| PrimitiveDateTime::MAX.assume_utc())
		} else {
			completed_at
		};

		Self { secret: TokenSecret::new(secret), expires_at: Some(expires_at) }
	}

	/// Token secret.
	pub fn secret(&self) -> &TokenSecret {
		&self.secret
	}

	/// Estimated expiry, or `None` for tokens without one.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.expires_at
	}

	/// Returns `true` if the token needs a refresh at `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expiry| instant >= expiry)
	}

	/// Returns `true` if the token needs a refresh now.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("secret", &self.secret)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
