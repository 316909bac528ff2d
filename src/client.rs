//! Rate-limited, authenticated, cache-validated API requests.
//!
//! [`ApiClient`] turns a resource URI into one logical exchange:
//!
//! 1. resolve an access token from the [`AccessTokenProvider`];
//! 2. look up a [`CacheEntry`] for the exact URI, when a cache is configured;
//! 3. wait for the [`RateLimitPolicy`];
//! 4. send with bearer authorization, the configured user agent, and conditional headers;
//! 5. classify the response.
//!
//! HTTP 401 forces one token refresh and one retry of the whole sequence. HTTP 429 with a
//! positive `Retry-After` waits that long and retries once; without one it fails immediately.
//! HTTP 304 is answered from the cache entry. Every other non-success status surfaces as a
//! [`ResponseError`]. Collections come back as [`Page`]s that know how to fetch their successor.

pub mod link;
pub mod page;

pub use link::next_link;
pub use page::Page;

// std
use std::mem;
// crates.io
use oauth2::{
	HttpRequest, HttpResponse,
	http::{
		Method, Request, StatusCode,
		header::{ACCEPT, AUTHORIZATION, USER_AGENT},
	},
};
use serde::de::DeserializeOwned;
use tokio::time::Instant;
// self
#[cfg(feature = "reqwest")] use crate::http::ReqwestPool;
use crate::{
	_prelude::*,
	auth::{AccessToken, AccessTokenProvider},
	cache::{CacheEntry, ResponseCache},
	config::ClientConfig,
	error::ResponseError,
	http::{self, ClientOptions, HttpTransport},
	obs::{self, Operation, OperationSpan, Outcome, RetryReason},
	rate_limit::{self, IntervalRateLimiter, RateLimitPolicy},
};

/// [`ApiClient`] over the built-in reqwest connection pool.
#[cfg(feature = "reqwest")]
pub type ReqwestApiClient = ApiClient<ReqwestPool>;

/// Entry point for API calls; cheap to clone, clones share every collaborator.
pub struct ApiClient<C>
where
	C: ?Sized + HttpTransport,
{
	transport: Arc<C>,
	tokens: Arc<dyn AccessTokenProvider>,
	rate_limiter: Arc<dyn RateLimitPolicy>,
	cache: Option<Arc<dyn ResponseCache>>,
	config: Arc<ClientConfig>,
	cancel: CancellationToken,
}
impl<C> ApiClient<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates a client over a caller-supplied transport.
	///
	/// The rate limiter spaces requests by [`ClientConfig::request_delay`]; no cache is attached.
	pub fn with_transport(
		config: ClientConfig,
		tokens: Arc<dyn AccessTokenProvider>,
		transport: impl Into<Arc<C>>,
	) -> Self {
		Self {
			transport: transport.into(),
			tokens,
			rate_limiter: Arc::new(IntervalRateLimiter::new(config.request_delay)),
			cache: None,
			config: Arc::new(config),
			cancel: CancellationToken::new(),
		}
	}

	/// Attaches a response cache used for conditional requests.
	pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
		self.cache = Some(cache);

		self
	}

	/// Replaces the rate limiter, e.g. to share one cadence between several clients.
	pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn RateLimitPolicy>) -> Self {
		self.rate_limiter = rate_limiter;

		self
	}

	/// Aborts in-flight sends and waits when `cancel` fires.
	pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
		self.cancel = cancel;

		self
	}

	/// Validated client configuration.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Shared transport.
	pub fn transport(&self) -> &Arc<C> {
		&self.transport
	}

	/// Cancellation token observed at every suspension point.
	pub fn cancellation(&self) -> &CancellationToken {
		&self.cancel
	}

	/// Resolves a resource path relative to the configured API base.
	pub fn resolve(&self, path: &str) -> Result<Url> {
		self.config.resolve(path)
	}

	/// Fetches one page of a collection.
	pub async fn fetch_page<T>(&self, uri: Url) -> Result<Page<T, C>>
	where
		T: DeserializeOwned,
	{
		const OPERATION: Operation = Operation::Fetch;

		let span = OperationSpan::new(OPERATION, "fetch_page");

		obs::record_outcome(OPERATION, Outcome::Attempt);

		let result = span
			.instrument(async {
				let response = self.execute(&uri).await?;
				let items = decode::<Vec<T>>(&uri, response.body())?;
				let next = link::next_link(response.headers(), &uri);

				Ok(Page::new(self.clone(), items, next))
			})
			.await;

		obs::record_result(OPERATION, &result);

		result
	}

	/// Fetches a single resource.
	pub async fn fetch_one<T>(&self, uri: Url) -> Result<T>
	where
		T: DeserializeOwned,
	{
		const OPERATION: Operation = Operation::Fetch;

		let span = OperationSpan::new(OPERATION, "fetch_one");

		obs::record_outcome(OPERATION, Outcome::Attempt);

		let result = span
			.instrument(async {
				let response = self.execute(&uri).await?;

				decode::<T>(&uri, response.body())
			})
			.await;

		obs::record_result(OPERATION, &result);

		result
	}

	async fn execute(&self, uri: &Url) -> Result<HttpResponse> {
		let mut force_refresh = false;
		let mut refreshed = false;
		let mut throttled = false;

		loop {
			let token = tokio::select! {
				biased;
				_ = self.cancel.cancelled() => return Err(Error::Cancelled),
				token = self.tokens.access_token(mem::take(&mut force_refresh)) => token?,
			};
			let cached = self.cache.as_ref().and_then(|cache| cache.get(uri.as_str()));

			rate_limit::wait_if_necessary(self.rate_limiter.as_ref(), &self.cancel).await?;

			let request = build_request(&self.config, uri, &token, cached.as_deref())?;
			let response = http::dispatch(
				self.transport.as_ref(),
				ClientOptions::default(),
				request,
				&self.cancel,
			)
			.await?;

			match (response.status(), cached) {
				(StatusCode::UNAUTHORIZED, _) => {
					if refreshed {
						return Err(Error::Unauthorized { uri: uri.clone() });
					}

					obs::record_retry(RetryReason::Unauthorized);

					refreshed = true;
					force_refresh = true;
				},
				(StatusCode::TOO_MANY_REQUESTS, _) => {
					let retry_after = http::parse_retry_after(response.headers());

					// Deadlines beyond the clock's range are treated like a missing Retry-After.
					let deadline = retry_after
						.filter(|delay| delay.is_positive() && !throttled)
						.and_then(|delay| Instant::now().checked_add(delay.unsigned_abs()));
					let Some(deadline) = deadline else {
						return Err(Error::RateLimited { uri: uri.clone(), retry_after });
					};

					obs::record_retry(RetryReason::Throttled);

					throttled = true;

					rate_limit::pause_until(deadline, &self.cancel).await?;
				},
				(StatusCode::NOT_MODIFIED, Some(entry)) => return entry.to_response(),
				(status, _) if status.is_success() => {
					self.remember(uri, &response);

					return Ok(response);
				},
				_ => return Err(ResponseError::from_response(uri, &response).into()),
			}
		}
	}

	fn remember(&self, uri: &Url, response: &HttpResponse) {
		let Some(cache) = &self.cache else { return };

		if let Some(entry) = CacheEntry::from_response(response) {
			cache.set(uri.as_str(), entry);
		}
	}
}
#[cfg(feature = "reqwest")]
impl ApiClient<ReqwestPool> {
	/// Creates a client with its own reqwest pool built from [`ClientConfig::transport`].
	pub fn new(config: ClientConfig, tokens: Arc<dyn AccessTokenProvider>) -> Self {
		let transport = ReqwestPool::new(config.transport.clone());

		Self::with_transport(config, tokens, transport)
	}
}
impl<C> Clone for ApiClient<C>
where
	C: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			tokens: self.tokens.clone(),
			rate_limiter: self.rate_limiter.clone(),
			cache: self.cache.clone(),
			config: self.config.clone(),
			cancel: self.cancel.clone(),
		}
	}
}
impl<C> Debug for ApiClient<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("config", &self.config)
			.field("cached", &self.cache.is_some())
			.field("cancelled", &self.cancel.is_cancelled())
			.finish()
	}
}

fn build_request(
	config: &ClientConfig,
	uri: &Url,
	token: &AccessToken,
	cached: Option<&CacheEntry>,
) -> Result<HttpRequest> {
	let authorization =
		token.secret().bearer().map_err(|e| ConfigError::from(oauth2::http::Error::from(e)))?;
	let mut request = Request::builder()
		.method(Method::GET)
		.uri(uri.as_str())
		.header(AUTHORIZATION, authorization)
		.header(USER_AGENT, config.user_agent.as_str())
		.header(ACCEPT, "application/json")
		.body(Vec::new())
		.map_err(ConfigError::from)?;

	if let Some(entry) = cached {
		entry.apply_conditional_headers(request.headers_mut());
	}

	Ok(request)
}

pub(crate) fn decode<T>(uri: &Url, body: &[u8]) -> Result<T>
where
	T: DeserializeOwned,
{
	let mut de = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut de).map_err(|e| Error::malformed(uri, e))
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::{
		HeaderName,
		header::{IF_MODIFIED_SINCE, IF_NONE_MATCH},
	};
	// self
	use super::*;

	fn config() -> ClientConfig {
		ClientConfig::builder()
			.account_id(42)
			.user_agent("Tests (tests@example.com)")
			.build()
			.expect("Config fixture should build.")
	}

	#[test]
	fn requests_carry_auth_agent_and_validators() {
		let config = config();
		let uri = config.resolve("projects.json").expect("Path should resolve.");
		let entry = CacheEntry {
			etag: Some("\"abc\"".into()),
			last_modified: None,
			status_code: 200,
			headers: BTreeMap::new(),
			content_headers: BTreeMap::new(),
			content_bytes: Vec::new(),
		};
		let request = build_request(&config, &uri, &AccessToken::new("tok"), Some(&entry))
			.expect("Request should build.");
		let header = |name: HeaderName| request.headers().get(name).and_then(|v| v.to_str().ok());

		assert_eq!(request.method(), Method::GET);
		assert_eq!(request.uri().to_string(), "https://3.basecampapi.com/42/projects.json");
		assert_eq!(header(AUTHORIZATION), Some("Bearer tok"));
		assert_eq!(header(USER_AGENT), Some("Tests (tests@example.com)"));
		assert_eq!(header(IF_NONE_MATCH), Some("\"abc\""));
		assert_eq!(header(IF_MODIFIED_SINCE), None);
	}

	#[test]
	fn decode_failures_report_the_json_path() {
		let uri = Url::parse("https://3.basecampapi.com/42/projects.json").expect("URL parses.");
		let err = decode::<Vec<BTreeMap<String, u64>>>(&uri, b"[{\"id\":\"x\"}]")
			.expect_err("Mismatched body should fail.");

		match err {
			Error::MalformedResponse { source, .. } => assert_eq!(source.path().to_string(), "[0].id"),
			other => panic!("Unexpected error: {other:?}"),
		}
	}
}
