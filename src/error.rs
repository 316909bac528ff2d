//! Client-level error types shared by the request pipeline, token exchange, and flows.

// crates.io
use oauth2::{HttpClientError, HttpResponse, http::header::CONTENT_TYPE};
// self
use crate::{_prelude::*, config::ClientConfigError};

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Token exchange or refresh failed.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Server rejected the access token, even after a forced refresh.
	#[error("Server rejected the access token for {uri}.")]
	Unauthorized {
		/// Request URI that was rejected.
		uri: Url,
	},
	/// Server throttled the request and no further retry is allowed.
	#[error("Server throttled the request for {uri}.")]
	RateLimited {
		/// Request URI that was throttled.
		uri: Url,
		/// Retry-After hint from the last throttled response, if any.
		retry_after: Option<Duration>,
	},
	/// Any other non-success HTTP status.
	#[error(transparent)]
	Response(#[from] ResponseError),
	/// Response body could not be decoded into the expected shape.
	#[error("Response body from {uri} could not be decoded.")]
	MalformedResponse {
		/// Request URI whose body failed to decode.
		uri: Url,
		/// Structured decoding failure, including the JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The caller's cancellation token fired while the operation was suspended.
	///
	/// Cancellation is an outcome, not a server failure; use [`Error::is_cancelled`] to branch.
	#[error("Operation was cancelled.")]
	Cancelled,
}
impl Error {
	/// Returns `true` when the operation ended because it was cancelled.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled)
	}

	/// HTTP status associated with the failure, when one was observed.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Unauthorized { .. } => Some(401),
			Self::RateLimited { .. } => Some(429),
			Self::Response(err) => Some(err.status),
			Self::Auth(AuthError::Exchange { source, .. }) => source.status(),
			_ => None,
		}
	}

	/// Request URI associated with the failure, when known.
	pub fn uri(&self) -> Option<&Url> {
		match self {
			Self::Unauthorized { uri }
			| Self::RateLimited { uri, .. }
			| Self::MalformedResponse { uri, .. } => Some(uri),
			Self::Response(err) => Some(&err.uri),
			Self::Auth(AuthError::Exchange { source, .. }) => source.uri(),
			_ => None,
		}
	}

	pub(crate) fn malformed(uri: &Url, source: serde_path_to_error::Error<serde_json::Error>) -> Self {
		Self::MalformedResponse { uri: uri.clone(), source }
	}
}
impl<E> From<HttpClientError<E>> for Error
where
	E: 'static + Send + Sync + StdError,
{
	fn from(e: HttpClientError<E>) -> Self {
		match e {
			HttpClientError::Reqwest(inner) => TransportError::Network { source: inner }.into(),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => TransportError::Other { message }.into(),
			_ => TransportError::Other { message: "Unknown HTTP client failure.".into() }.into(),
		}
	}
}

/// Token acquisition failures.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// The token endpoint call itself failed.
	#[error("Token endpoint call for the {grant} grant failed.")]
	Exchange {
		/// Grant label (`web_server`, `refresh`).
		grant: &'static str,
		/// Underlying failure.
		#[source]
		source: Box<Error>,
	},
	/// The `state` returned to the redirect handler does not match the session.
	#[error("Authorization state mismatch.")]
	StateMismatch,
}

/// Non-success HTTP response surfaced to the caller.
#[derive(Clone, Debug, ThisError)]
#[error("Request to {uri} failed with HTTP {status}: {message}")]
pub struct ResponseError {
	/// Request URI.
	pub uri: Url,
	/// HTTP status code.
	pub status: u16,
	/// Raw response body.
	pub body: Vec<u8>,
	/// Best-effort human-readable message.
	pub message: String,
}
impl ResponseError {
	/// Builds an error from a response, extracting the message from the body.
	///
	/// `text/plain` bodies are used verbatim, `application/json` bodies contribute their `error`
	/// field, and everything else falls back to the canonical status reason.
	pub fn from_response(uri: &Url, response: &HttpResponse) -> Self {
		let message = extract_message(response);

		Self::with_message(uri, response, message)
	}

	pub(crate) fn with_message(
		uri: &Url,
		response: &HttpResponse,
		message: impl Into<String>,
	) -> Self {
		Self {
			uri: uri.clone(),
			status: response.status().as_u16(),
			body: response.body().clone(),
			message: message.into(),
		}
	}

	/// Response body as lossy UTF-8.
	pub fn body_text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}
}

/// Configuration and request-construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A URL could not be parsed or joined.
	#[error("URL is invalid.")]
	InvalidUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Client configuration failed validation.
	#[error(transparent)]
	Client(#[from] ClientConfigError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<url::ParseError> for ConfigError {
	fn from(source: url::ParseError) -> Self {
		Self::InvalidUrl { source }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the API.")]
	Io(#[from] std::io::Error),
	/// Transport reported a failure without a typed source.
	#[error("HTTP client error occurred while calling the API: {message}.")]
	Other {
		/// Transport-supplied message.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[derive(Deserialize)]
struct ErrorBody {
	error: Option<String>,
}

fn extract_message(response: &HttpResponse) -> String {
	let fallback = || {
		response.status().canonical_reason().unwrap_or("Unexpected HTTP status").to_owned()
	};
	let essence = response
		.headers()
		.get(CONTENT_TYPE)
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.split(';').next())
		.map(|value| value.trim().to_ascii_lowercase());

	match essence.as_deref() {
		Some("text/plain") => String::from_utf8_lossy(response.body()).into_owned(),
		Some("application/json") => serde_json::from_slice::<ErrorBody>(response.body())
			.ok()
			.and_then(|body| body.error)
			.unwrap_or_else(fallback),
		_ => fallback(),
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::{Response, StatusCode};
	// self
	use super::*;

	fn uri() -> Url {
		Url::parse("https://3.basecampapi.com/1/projects.json").expect("Fixture URL should parse.")
	}

	fn response(status: u16, content_type: Option<&str>, body: &str) -> HttpResponse {
		let mut builder = Response::builder().status(status);

		if let Some(value) = content_type {
			builder = builder.header(CONTENT_TYPE, value);
		}

		builder.body(body.as_bytes().to_vec()).expect("Response fixture should build.")
	}

	#[test]
	fn plain_text_bodies_are_used_verbatim() {
		let err = ResponseError::from_response(
			&uri(),
			&response(404, Some("text/plain; charset=utf-8"), "Project not found"),
		);

		assert_eq!(err.status, 404);
		assert_eq!(err.message, "Project not found");
		assert_eq!(err.body_text(), "Project not found");
	}

	#[test]
	fn json_bodies_contribute_their_error_field() {
		let err = ResponseError::from_response(
			&uri(),
			&response(422, Some("application/json"), "{\"error\":\"Name can't be blank\"}"),
		);

		assert_eq!(err.message, "Name can't be blank");
	}

	#[test]
	fn other_bodies_fall_back_to_status_reason() {
		let err = ResponseError::from_response(&uri(), &response(503, Some("text/html"), "<h1>"));

		assert_eq!(err.message, StatusCode::SERVICE_UNAVAILABLE.canonical_reason().unwrap_or(""));

		let err = ResponseError::from_response(
			&uri(),
			&response(500, Some("application/json"), "{\"status\":500}"),
		);

		assert_eq!(err.message, "Internal Server Error");
	}

	#[test]
	fn error_accessors_expose_context() {
		let err: Error = ResponseError::from_response(&uri(), &response(404, None, "")).into();

		assert_eq!(err.status(), Some(404));
		assert_eq!(err.uri(), Some(&uri()));
		assert!(!err.is_cancelled());
		assert!(Error::Cancelled.is_cancelled());

		let wrapped: Error = AuthError::Exchange { grant: "refresh", source: Box::new(err) }.into();

		assert_eq!(wrapped.status(), Some(404));
	}
}
