// std
use std::net::IpAddr;
// self
use crate::{_prelude::*, config::{ClientConfig, DEFAULT_REQUEST_DELAY}, http::TransportConfig};

/// Errors raised while constructing or validating client configuration.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum ClientConfigError {
	/// Neither an account identifier nor an explicit API base was supplied.
	#[error("Missing API base; set an account identifier or an explicit API base.")]
	MissingApiBase,
	/// The API base cannot have relative paths joined onto it.
	#[error("The API base cannot be used as a base URL: {url}.")]
	InvalidApiBase {
		/// API base that failed validation.
		url: String,
	},
	/// A user agent is mandatory for every request.
	#[error("Missing user agent.")]
	MissingUserAgent,
	/// Endpoints must use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
}

/// Builder for [`ClientConfig`] values.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
	/// Explicit API base, or the base derived from an account identifier.
	pub api_base: Option<Url>,
	/// `User-Agent` header value.
	pub user_agent: Option<String>,
	/// Override for the minimum request spacing.
	pub request_delay: Option<StdDuration>,
	/// Transport settings.
	pub transport: TransportConfig,
}
impl ClientConfigBuilder {
	/// Targets the Basecamp 3 API of the given account.
	pub fn account_id(mut self, account_id: u64) -> Self {
		self.api_base = Url::parse(&format!("https://3.basecampapi.com/{account_id}/")).ok();

		self
	}

	/// Sets an explicit API base (a trailing slash is added when missing).
	pub fn api_base(mut self, mut url: Url) -> Self {
		if !url.path().ends_with('/') {
			let path = format!("{}/", url.path());

			url.set_path(&path);
		}

		self.api_base = Some(url);

		self
	}

	/// Sets the `User-Agent` header value, e.g. `MyApp (ops@example.com)`.
	pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = Some(user_agent.into());

		self
	}

	/// Overrides the minimum spacing between requests.
	pub fn request_delay(mut self, delay: StdDuration) -> Self {
		self.request_delay = Some(delay);

		self
	}

	/// Overrides the transport settings.
	pub fn transport(mut self, transport: TransportConfig) -> Self {
		self.transport = transport;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<ClientConfig, ClientConfigError> {
		let api_base = self.api_base.ok_or(ClientConfigError::MissingApiBase)?;
		let user_agent = self
			.user_agent
			.map(|value| value.trim().to_owned())
			.filter(|value| !value.is_empty())
			.ok_or(ClientConfigError::MissingUserAgent)?;

		if api_base.cannot_be_a_base() {
			return Err(ClientConfigError::InvalidApiBase { url: api_base.to_string() });
		}

		validate_endpoint("api", &api_base)?;

		Ok(ClientConfig {
			api_base,
			user_agent,
			request_delay: self.request_delay.unwrap_or(DEFAULT_REQUEST_DELAY),
			transport: self.transport,
		})
	}
}

/// Requires HTTPS, except for loopback hosts used by local mocks.
pub(crate) fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ClientConfigError> {
	if url.scheme() == "https" || (url.scheme() == "http" && is_loopback(url)) {
		Ok(())
	} else {
		Err(ClientConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host_str() {
		Some("localhost") => true,
		Some(host) => host
			.trim_start_matches('[')
			.trim_end_matches(']')
			.parse::<IpAddr>()
			.map(|ip| ip.is_loopback())
			.unwrap_or(false),
		None => false,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn account_id_derives_api_base() {
		let config = ClientConfig::builder()
			.account_id(999_999_999)
			.user_agent("Tests (tests@example.com)")
			.build()
			.expect("Config with account id should build.");

		assert_eq!(config.api_base.as_str(), "https://3.basecampapi.com/999999999/");
		assert_eq!(config.request_delay, DEFAULT_REQUEST_DELAY);
		assert_eq!(
			config.resolve("projects.json").expect("Path should resolve.").as_str(),
			"https://3.basecampapi.com/999999999/projects.json"
		);
	}

	#[test]
	fn missing_fields_are_rejected() {
		let err = ClientConfig::builder().user_agent("ua").build().expect_err("Base is required.");

		assert_eq!(err, ClientConfigError::MissingApiBase);

		let err = ClientConfig::builder()
			.account_id(1)
			.user_agent("   ")
			.build()
			.expect_err("Blank user agents are rejected.");

		assert_eq!(err, ClientConfigError::MissingUserAgent);
	}

	#[test]
	fn plain_http_is_only_allowed_for_loopback() {
		let local = ClientConfig::builder()
			.api_base(Url::parse("http://127.0.0.1:8080/42").expect("Loopback URL should parse."))
			.user_agent("ua")
			.build()
			.expect("Loopback HTTP should be accepted.");

		assert_eq!(local.api_base.as_str(), "http://127.0.0.1:8080/42/");

		let err = ClientConfig::builder()
			.api_base(Url::parse("http://api.example.com/").expect("Remote URL should parse."))
			.user_agent("ua")
			.build()
			.expect_err("Remote HTTP should be rejected.");

		assert!(matches!(err, ClientConfigError::InsecureEndpoint { endpoint: "api", .. }));
	}
}
