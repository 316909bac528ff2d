//! Access token providers consulted by the request pipeline before every attempt.
//!
//! [`RefreshingTokenProvider`] keeps the current token and refreshes it through the token
//! endpoint once its conservative expiry passes, or whenever the pipeline forces a refresh after
//! an HTTP 401. Non-forced callers that arrive while a refresh is in flight wait behind a
//! singleflight guard and reuse its result; forced refreshes always hit the endpoint.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use oauth2::RefreshToken;
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	error::AuthError,
	http::HttpTransport,
	oauth::{GrantType, TokenExchange},
};

/// Boxed future returned by [`AccessTokenProvider::access_token`].
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<AccessToken>> + 'a + Send>>;

/// Source of bearer tokens for API requests.
pub trait AccessTokenProvider
where
	Self: Send + Sync,
{
	/// Returns a usable token, refreshing first when the cached one expired or `force_refresh`.
	fn access_token(&self, force_refresh: bool) -> TokenFuture<'_>;
}

/// Provider that always returns the same pre-obtained token, ignoring the force flag.
#[derive(Clone, Debug)]
pub struct StaticTokenProvider(AccessToken);
impl StaticTokenProvider {
	/// Wraps a pre-obtained token string.
	pub fn new(token: impl Into<String>) -> Self {
		Self(AccessToken::new(token))
	}
}
impl AccessTokenProvider for StaticTokenProvider {
	fn access_token(&self, _force_refresh: bool) -> TokenFuture<'_> {
		let token = self.0.clone();

		Box::pin(async move { Ok(token) })
	}
}

/// Provider that mints access tokens from an immutable refresh token.
pub struct RefreshingTokenProvider<C>
where
	C: ?Sized + HttpTransport,
{
	exchange: TokenExchange<C>,
	refresh_token: RefreshToken,
	current: RwLock<Option<AccessToken>>,
	refresh_guard: AsyncMutex<()>,
	refreshes: AtomicU64,
}
impl<C> RefreshingTokenProvider<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates a provider with no cached token; the first call performs a refresh.
	pub fn new(exchange: TokenExchange<C>, refresh_token: RefreshToken) -> Self {
		Self {
			exchange,
			refresh_token,
			current: RwLock::new(None),
			refresh_guard: AsyncMutex::new(()),
			refreshes: AtomicU64::new(0),
		}
	}

	/// Seeds the provider with a token obtained elsewhere (for example from a code exchange).
	pub fn with_access_token(self, token: AccessToken) -> Self {
		*self.current.write() = Some(token);

		self
	}

	/// Currently cached token, without triggering a refresh.
	pub fn current(&self) -> Option<AccessToken> {
		self.current.read().clone()
	}

	/// Number of refresh-token grants performed so far.
	pub fn refresh_count(&self) -> u64 {
		self.refreshes.load(Ordering::Relaxed)
	}

	fn fresh_token(&self, now: OffsetDateTime) -> Option<AccessToken> {
		self.current.read().as_ref().filter(|token| !token.is_expired_at(now)).cloned()
	}

	async fn refresh(&self) -> Result<AccessToken> {
		self.refreshes.fetch_add(1, Ordering::Relaxed);

		let grant = match self.exchange.exchange_refresh_token(&self.refresh_token).await {
			Ok(grant) => grant,
			Err(Error::Cancelled) => return Err(Error::Cancelled),
			Err(e) =>
				return Err(AuthError::Exchange {
					grant: GrantType::Refresh.as_str(),
					source: Box::new(e),
				}
				.into()),
		};

		*self.current.write() = Some(grant.access_token.clone());

		Ok(grant.access_token)
	}
}
impl<C> AccessTokenProvider for RefreshingTokenProvider<C>
where
	C: ?Sized + HttpTransport,
{
	fn access_token(&self, force_refresh: bool) -> TokenFuture<'_> {
		Box::pin(async move {
			if !force_refresh {
				if let Some(token) = self.fresh_token(OffsetDateTime::now_utc()) {
					return Ok(token);
				}
			}

			let _singleflight = self.refresh_guard.lock().await;

			if !force_refresh {
				if let Some(token) = self.fresh_token(OffsetDateTime::now_utc()) {
					return Ok(token);
				}
			}

			self.refresh().await
		})
	}
}
impl<C> Debug for RefreshingTokenProvider<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshingTokenProvider")
			.field("exchange", &self.exchange)
			.field("current", &self.current.read())
			.field("refreshes", &self.refresh_count())
			.finish()
	}
}
