//! Client configuration: API base, user agent, rate-limit cadence, transport settings, and the
//! OAuth application credentials used by token exchanges.
//!
//! Everything is validated once at build time so the request pipeline can assume HTTPS
//! endpoints and a non-empty user agent.

/// Builder API for assembling client configuration.
pub mod builder;

pub use builder::*;

// crates.io
use oauth2::{ClientId, ClientSecret, RedirectUrl};
// self
use crate::{_prelude::*, http::TransportConfig};

/// Minimum delay enforced between two requests issued by one client (50 requests per 10 s).
pub const DEFAULT_REQUEST_DELAY: StdDuration = StdDuration::from_millis(200);

/// Validated configuration consumed by [`ApiClient`](crate::client::ApiClient).
#[derive(Clone, Debug)]
pub struct ClientConfig {
	/// Account-scoped API base; relative resource paths are joined onto it.
	pub api_base: Url,
	/// `User-Agent` sent with every request.
	pub user_agent: String,
	/// Minimum spacing between two permitted requests.
	pub request_delay: StdDuration,
	/// Transport settings handed to the connection pool.
	pub transport: TransportConfig,
}
impl ClientConfig {
	/// Creates a new builder.
	pub fn builder() -> ClientConfigBuilder {
		ClientConfigBuilder::default()
	}

	/// Resolves a resource path (for example `projects.json`) against the API base.
	pub fn resolve(&self, path: &str) -> Result<Url> {
		self.api_base.join(path).map_err(|e| ConfigError::from(e).into())
	}
}

/// OAuth endpoints of the authorization server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthEndpoints {
	/// Page the user visits to grant access.
	pub authorization: Url,
	/// Form target that records the grant and redirects with a `code`.
	pub approval: Url,
	/// Token endpoint used for code exchanges and refreshes.
	pub token: Url,
}
impl OAuthEndpoints {
	/// Validates that every endpoint is HTTPS (loopback hosts are exempt).
	pub fn validate(&self) -> Result<(), ClientConfigError> {
		builder::validate_endpoint("authorization", &self.authorization)?;
		builder::validate_endpoint("approval", &self.approval)?;
		builder::validate_endpoint("token", &self.token)
	}
}
impl Default for OAuthEndpoints {
	fn default() -> Self {
		Self {
			authorization: launchpad("authorization/new"),
			approval: launchpad("authorization"),
			token: launchpad("authorization/token"),
		}
	}
}

/// Registered OAuth application credentials.
#[derive(Clone, Debug)]
pub struct AppCredentials {
	/// Application client identifier.
	pub client_id: ClientId,
	/// Application client secret.
	pub client_secret: ClientSecret,
	/// Redirect URI registered for the application.
	pub redirect_uri: RedirectUrl,
	/// Authorization server endpoints.
	pub endpoints: OAuthEndpoints,
}
impl AppCredentials {
	/// Creates credentials against the default Launchpad endpoints.
	pub fn new(
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		redirect_uri: &Url,
	) -> Self {
		Self {
			client_id: ClientId::new(client_id.into()),
			client_secret: ClientSecret::new(client_secret.into()),
			redirect_uri: RedirectUrl::from_url(redirect_uri.clone()),
			endpoints: OAuthEndpoints::default(),
		}
	}

	/// Overrides the authorization server endpoints after validating them.
	pub fn with_endpoints(mut self, endpoints: OAuthEndpoints) -> Result<Self, ClientConfigError> {
		endpoints.validate()?;

		self.endpoints = endpoints;

		Ok(self)
	}
}

fn launchpad(path: &str) -> Url {
	let mut url = Url::parse("https://launchpad.37signals.com/").expect("Static URL is valid.");

	url.set_path(path);

	url
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn default_endpoints_point_at_launchpad() {
		let endpoints = OAuthEndpoints::default();

		assert_eq!(
			endpoints.authorization.as_str(),
			"https://launchpad.37signals.com/authorization/new"
		);
		assert_eq!(endpoints.approval.as_str(), "https://launchpad.37signals.com/authorization");
		assert_eq!(endpoints.token.as_str(), "https://launchpad.37signals.com/authorization/token");
		assert!(endpoints.validate().is_ok());
	}

	#[test]
	fn credentials_reject_insecure_endpoints() {
		let redirect = Url::parse("https://app.example.com/callback").expect("Redirect should parse.");
		let endpoints = OAuthEndpoints {
			token: Url::parse("http://auth.example.com/token").expect("Token URL should parse."),
			..OAuthEndpoints::default()
		};
		let err = AppCredentials::new("id", "secret", &redirect)
			.with_endpoints(endpoints)
			.expect_err("Plain HTTP token endpoints should be rejected.");

		assert!(matches!(err, ClientConfigError::InsecureEndpoint { endpoint: "token", .. }));
	}

	#[test]
	fn credentials_debug_redacts_secret() {
		let redirect = Url::parse("https://app.example.com/callback").expect("Redirect should parse.");
		let credentials = AppCredentials::new("id", "very-secret", &redirect);

		assert!(!format!("{credentials:?}").contains("very-secret"));
	}
}
