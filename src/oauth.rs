//! Token endpoint exchanges.
//!
//! The authorization server speaks a Launchpad dialect of OAuth 2.0: grants are selected with a
//! `type` form field (`web_server` for code exchanges, `refresh` for refreshes) instead of
//! `grant_type`, and responses carry `access_token`, `expires_in`, and an optional
//! `refresh_token` without a `token_type`. [`TokenExchange`] speaks that dialect directly over
//! an [`HttpTransport`] handle rather than through a generic RFC 6749 client.

pub use oauth2;

// crates.io
use oauth2::{
	AuthorizationCode, HttpRequest, RefreshToken,
	http::{
		Method, Request,
		header::{ACCEPT, CONTENT_TYPE, USER_AGENT},
	},
};
use url::form_urlencoded::Serializer;
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	config::AppCredentials,
	error::ResponseError,
	http::{self, ClientOptions, HttpTransport},
	obs::{self, Operation, OperationSpan, Outcome},
};

pub(crate) const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Grant selector sent in the `type` form field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GrantType {
	/// Authorization-code exchange.
	WebServer,
	/// Refresh-token exchange.
	Refresh,
}
impl GrantType {
	/// Returns the wire value of the grant selector.
	pub const fn as_str(self) -> &'static str {
		match self {
			GrantType::WebServer => "web_server",
			GrantType::Refresh => "refresh",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Tokens minted by a successful exchange.
#[derive(Clone, Debug)]
pub struct TokenGrant {
	/// Access token with its estimated expiry.
	pub access_token: AccessToken,
	/// Refresh token, when the server issued one.
	pub refresh_token: Option<RefreshToken>,
}

#[derive(Deserialize)]
struct TokenEndpointResponse {
	access_token: String,
	expires_in: i64,
	refresh_token: Option<String>,
}

/// Client for the authorization server's token endpoint.
pub struct TokenExchange<C>
where
	C: ?Sized + HttpTransport,
{
	pub(crate) transport: Arc<C>,
	pub(crate) credentials: AppCredentials,
	pub(crate) user_agent: Option<String>,
	pub(crate) cancel: CancellationToken,
}
impl<C> TokenExchange<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates an exchange client for the given application over `transport`.
	pub fn new(credentials: AppCredentials, transport: impl Into<Arc<C>>) -> Self {
		Self {
			transport: transport.into(),
			credentials,
			user_agent: None,
			cancel: CancellationToken::new(),
		}
	}

	/// Sets the `User-Agent` sent to the authorization server.
	pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = Some(user_agent.into());

		self
	}

	/// Aborts in-flight exchanges when `cancel` fires.
	pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
		self.cancel = cancel;

		self
	}

	/// Application credentials used for every exchange.
	pub fn credentials(&self) -> &AppCredentials {
		&self.credentials
	}

	/// Exchanges an authorization (verification) code for an access + refresh token pair.
	///
	/// A single POST without retries; failures follow the general response classification.
	pub async fn exchange_code(&self, code: &AuthorizationCode) -> Result<TokenGrant> {
		const OPERATION: Operation = Operation::ExchangeCode;

		let span = OperationSpan::new(OPERATION, "exchange_code");

		obs::record_outcome(OPERATION, Outcome::Attempt);

		let credential = ("code", code.secret().as_str());
		let result = span.instrument(self.exchange(GrantType::WebServer, credential)).await;

		obs::record_result(OPERATION, &result);

		result
	}

	/// Exchanges a refresh token for a new access token.
	pub async fn exchange_refresh_token(&self, refresh_token: &RefreshToken) -> Result<TokenGrant> {
		const OPERATION: Operation = Operation::RefreshToken;

		let span = OperationSpan::new(OPERATION, "exchange_refresh_token");

		obs::record_outcome(OPERATION, Outcome::Attempt);

		let credential = ("refresh_token", refresh_token.secret().as_str());
		let result = span.instrument(self.exchange(GrantType::Refresh, credential)).await;

		obs::record_result(OPERATION, &result);

		result
	}

	async fn exchange(&self, grant: GrantType, credential: (&str, &str)) -> Result<TokenGrant> {
		let uri = self.credentials.endpoints.token.clone();
		let body = Serializer::new(String::new())
			.append_pair("type", grant.as_str())
			.append_pair("client_id", self.credentials.client_id.as_str())
			.append_pair("client_secret", self.credentials.client_secret.secret())
			.append_pair("redirect_uri", self.credentials.redirect_uri.as_str())
			.append_pair(credential.0, credential.1)
			.finish();
		let request = self.form_request(&uri, body)?;
		let response =
			http::dispatch(self.transport.as_ref(), ClientOptions::default(), request, &self.cancel)
				.await?;

		if !response.status().is_success() {
			return Err(ResponseError::from_response(&uri, &response).into());
		}

		let mut de = serde_json::Deserializer::from_slice(response.body());
		let parsed: TokenEndpointResponse =
			serde_path_to_error::deserialize(&mut de).map_err(|e| Error::malformed(&uri, e))?;
		let completed_at = OffsetDateTime::now_utc();

		Ok(TokenGrant {
			access_token: AccessToken::issued(
				parsed.access_token,
				Duration::seconds(parsed.expires_in),
				completed_at,
			),
			refresh_token: parsed.refresh_token.map(RefreshToken::new),
		})
	}

	pub(crate) fn form_request(&self, uri: &Url, body: String) -> Result<HttpRequest> {
		let mut builder = Request::builder()
			.method(Method::POST)
			.uri(uri.as_str())
			.header(CONTENT_TYPE, FORM_CONTENT_TYPE)
			.header(ACCEPT, "application/json");

		if let Some(user_agent) = &self.user_agent {
			builder = builder.header(USER_AGENT, user_agent.as_str());
		}

		builder.body(body.into_bytes()).map_err(|e| ConfigError::from(e).into())
	}
}
impl<C> Debug for TokenExchange<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenExchange")
			.field("credentials", &self.credentials)
			.field("user_agent", &self.user_agent)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn grant_selectors_use_wire_values() {
		assert_eq!(GrantType::WebServer.as_str(), "web_server");
		assert_eq!(GrantType::Refresh.to_string(), "refresh");
	}
}
