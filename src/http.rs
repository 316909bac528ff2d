//! Transport primitives: the [`HttpTransport`] pool contract, its reqwest-backed
//! implementation, and the helpers the pipeline uses to send requests.
//!
//! A transport hands out short-lived [`AsyncHttpClient`] handles. Handles created with the same
//! [`ClientOptions`] share one long-lived connection object; dropping a handle never closes that
//! shared connection. [`ReqwestPool`] rotates each shared connection after
//! [`TransportConfig::connection_lifetime`] so DNS changes are eventually picked up, evicting the
//! stale one lazily on the next [`HttpTransport::create`] for the same options.

// std
#[cfg(feature = "reqwest")]
use std::{
	sync::atomic::{AtomicU64, Ordering},
	time::Instant,
};
// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
	http::{HeaderMap, header::RETRY_AFTER},
};
#[cfg(feature = "reqwest")] use reqwest::{redirect::Policy, tls::Version};
use time::format_description::well_known::Rfc2822;
// self
use crate::_prelude::*;

/// Lifetime after which a pooled connection is replaced.
pub const DEFAULT_CONNECTION_LIFETIME: StdDuration = StdDuration::from_secs(60 * 60);

/// Abstraction over connection pools capable of sending API and token requests.
///
/// The trait is the crate's only dependency on an HTTP stack. Implementations must be
/// `Send + Sync + 'static` so one pool can be shared by every client and token provider, and the
/// handles they return must own whatever state their request futures need so those futures
/// remain `Send`.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// Single-use send/receive handle.
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Returns a handle backed by the shared connection registered for `options`.
	fn create(&self, options: ClientOptions) -> Result<Self::Handle, ConfigError>;
}

/// Options that select which shared connection backs a handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClientOptions {
	/// Whether redirects are followed transparently.
	pub follow_redirects: bool,
}
impl ClientOptions {
	/// Options that surface 3xx responses to the caller instead of following them.
	pub const NO_REDIRECTS: Self = Self { follow_redirects: false };
}
impl Default for ClientOptions {
	fn default() -> Self {
		Self { follow_redirects: true }
	}
}

/// Minimum TLS protocol version accepted by the pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TlsVersion {
	/// TLS 1.2.
	#[default]
	Tls12,
	/// TLS 1.3.
	Tls13,
}

/// Explicit transport settings passed into the pool constructor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
	/// Age after which a shared connection is rebuilt.
	pub connection_lifetime: StdDuration,
	/// Optional per-request timeout.
	pub request_timeout: Option<StdDuration>,
	/// Minimum TLS version.
	pub min_tls_version: TlsVersion,
}
impl Default for TransportConfig {
	fn default() -> Self {
		Self {
			connection_lifetime: DEFAULT_CONNECTION_LIFETIME,
			request_timeout: None,
			min_tls_version: TlsVersion::default(),
		}
	}
}

#[cfg(feature = "reqwest")]
#[derive(Clone)]
struct PooledConnection {
	id: u64,
	client: ReqwestClient,
	created_at: Instant,
}

/// Reqwest-backed [`HttpTransport`] keeping one shared client per [`ClientOptions`].
#[cfg(feature = "reqwest")]
#[derive(Default)]
pub struct ReqwestPool {
	config: TransportConfig,
	connections: Mutex<HashMap<ClientOptions, PooledConnection>>,
	next_id: AtomicU64,
}
#[cfg(feature = "reqwest")]
impl ReqwestPool {
	/// Creates an empty pool using the provided transport settings.
	pub fn new(config: TransportConfig) -> Self {
		Self { config, connections: Default::default(), next_id: AtomicU64::new(0) }
	}

	/// Transport settings used for every connection.
	pub fn config(&self) -> &TransportConfig {
		&self.config
	}

	/// Number of shared connections currently registered.
	pub fn connection_count(&self) -> usize {
		self.connections.lock().len()
	}

	/// Drops every shared connection; in-flight handles keep theirs until they finish.
	pub fn shutdown(&self) {
		self.connections.lock().clear();
	}

	fn connection(&self, options: ClientOptions) -> Result<PooledConnection, ConfigError> {
		let now = Instant::now();
		let mut connections = self.connections.lock();

		if let Some(existing) = connections.get(&options) {
			if now.duration_since(existing.created_at) < self.config.connection_lifetime {
				return Ok(existing.clone());
			}

			connections.remove(&options);
		}

		let connection = PooledConnection {
			id: self.next_id.fetch_add(1, Ordering::Relaxed),
			client: self.build_client(options)?,
			created_at: now,
		};

		connections.insert(options, connection.clone());

		Ok(connection)
	}

	fn build_client(&self, options: ClientOptions) -> Result<ReqwestClient, ConfigError> {
		let redirect = if options.follow_redirects { Policy::default() } else { Policy::none() };
		let min_tls = match self.config.min_tls_version {
			TlsVersion::Tls12 => Version::TLS_1_2,
			TlsVersion::Tls13 => Version::TLS_1_3,
		};
		let mut builder = ReqwestClient::builder().redirect(redirect).min_tls_version(min_tls);

		if let Some(timeout) = self.config.request_timeout {
			builder = builder.timeout(timeout);
		}

		Ok(builder.build()?)
	}
}
#[cfg(feature = "reqwest")]
impl Debug for ReqwestPool {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ReqwestPool")
			.field("config", &self.config)
			.field("connections", &self.connection_count())
			.finish()
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestPool {
	type Handle = PooledHandle;
	type TransportError = ReqwestError;

	fn create(&self, options: ClientOptions) -> Result<Self::Handle, ConfigError> {
		let connection = self.connection(options)?;

		Ok(PooledHandle { connection_id: connection.id, client: connection.client })
	}
}

/// Lightweight handle returned by [`ReqwestPool`]; dropping it leaves the shared client open.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct PooledHandle {
	connection_id: u64,
	client: ReqwestClient,
}
#[cfg(feature = "reqwest")]
impl PooledHandle {
	/// Identifier of the shared connection backing this handle.
	pub fn connection_id(&self) -> u64 {
		self.connection_id
	}
}
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for PooledHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = self.client.clone();

		Box::pin(async move {
			let response =
				client.execute(request.try_into().map_err(Box::new)?).await.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

/// Sends `request` through a fresh handle, aborting when `cancel` fires first.
pub async fn dispatch<C>(
	transport: &C,
	options: ClientOptions,
	request: HttpRequest,
	cancel: &CancellationToken,
) -> Result<HttpResponse>
where
	C: ?Sized + HttpTransport,
{
	let handle = transport.create(options)?;

	tokio::select! {
		biased;
		_ = cancel.cancelled() => Err(Error::Cancelled),
		response = handle.call(request) => response.map_err(Error::from),
	}
}

/// Parses `Retry-After` as delta-seconds or an HTTP date relative to now.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(i64::try_from(secs).ok()?));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn retry_after_accepts_delta_seconds() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, "2".parse().expect("Header value should parse."));

		assert_eq!(parse_retry_after(&headers), Some(Duration::seconds(2)));

		headers.insert(RETRY_AFTER, "soon".parse().expect("Header value should parse."));

		assert_eq!(parse_retry_after(&headers), None);
		assert_eq!(parse_retry_after(&HeaderMap::new()), None);
	}

	#[test]
	fn retry_after_ignores_past_dates() {
		let mut headers = HeaderMap::new();

		headers.insert(
			RETRY_AFTER,
			"Sat, 02 Feb 2002 12:22:22 +0000".parse().expect("Header value should parse."),
		);

		assert_eq!(parse_retry_after(&headers), None);
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn handles_with_same_options_share_a_connection() {
		let pool = ReqwestPool::new(TransportConfig::default());
		let first = pool.create(ClientOptions::default()).expect("Handle should build.");
		let second = pool.create(ClientOptions::default()).expect("Handle should build.");
		let no_redirects = pool.create(ClientOptions::NO_REDIRECTS).expect("Handle should build.");

		assert_eq!(first.connection_id(), second.connection_id());
		assert_ne!(first.connection_id(), no_redirects.connection_id());
		assert_eq!(pool.connection_count(), 2);

		drop(first);

		let third = pool.create(ClientOptions::default()).expect("Handle should build.");

		assert_eq!(third.connection_id(), second.connection_id());
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn expired_connections_are_replaced_lazily() {
		let pool = ReqwestPool::new(TransportConfig {
			connection_lifetime: StdDuration::ZERO,
			..TransportConfig::default()
		});
		let first = pool.create(ClientOptions::default()).expect("Handle should build.");
		let second = pool.create(ClientOptions::default()).expect("Handle should build.");

		assert_ne!(first.connection_id(), second.connection_id());
		assert_eq!(pool.connection_count(), 1);

		pool.shutdown();

		assert_eq!(pool.connection_count(), 0);
	}
}
