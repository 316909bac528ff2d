//! Authorization-code flow with a random `state` round-tripped through the redirect.

// crates.io
use oauth2::AuthorizationCode;
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{
	_prelude::*,
	config::AppCredentials,
	error::AuthError,
	http::HttpTransport,
	oauth::{GrantType, TokenExchange, TokenGrant},
};

const STATE_LEN: usize = 32;

/// Handshake metadata returned by [`TokenExchange::start_authorization`].
#[derive(Clone, Debug)]
pub struct AuthorizationSession {
	/// Opaque state value that must round-trip via the redirect handler.
	pub state: String,
	/// Redirect URI the authorization server sends the user back to.
	pub redirect_uri: Url,
	/// Fully-formed authorize URL that callers should send end-users to.
	pub authorize_url: Url,
}
impl AuthorizationSession {
	pub(crate) fn new(credentials: &AppCredentials) -> Self {
		Self::with_state(credentials, random_string(STATE_LEN))
	}

	fn with_state(credentials: &AppCredentials, state: String) -> Self {
		let redirect_uri = credentials.redirect_uri.url().clone();
		let mut authorize_url = credentials.endpoints.authorization.clone();

		authorize_url
			.query_pairs_mut()
			.append_pair("type", GrantType::WebServer.as_str())
			.append_pair("client_id", credentials.client_id.as_str())
			.append_pair("redirect_uri", redirect_uri.as_str())
			.append_pair("state", &state);

		Self { state, redirect_uri, authorize_url }
	}

	/// Validates the returned `state` parameter after the authorization redirect.
	pub fn validate_state(&self, returned_state: &str) -> Result<(), AuthError> {
		if returned_state == self.state { Ok(()) } else { Err(AuthError::StateMismatch) }
	}
}

impl<C> TokenExchange<C>
where
	C: ?Sized + HttpTransport,
{
	/// Starts an authorization-code flow with a fresh random `state`.
	pub fn start_authorization(&self) -> AuthorizationSession {
		AuthorizationSession::new(&self.credentials)
	}

	/// Validates the redirect's `state` and exchanges its `code`.
	pub async fn complete_authorization(
		&self,
		session: &AuthorizationSession,
		returned_state: &str,
		code: AuthorizationCode,
	) -> Result<TokenGrant> {
		session.validate_state(returned_state)?;

		self.exchange_code(&code).await
	}
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}
