//! Authorization bootstrap from an existing browser session cookie.
//!
//! The sequence is linear and never retries:
//!
//! 1. GET the authorize page with the session cookie and scrape the `authenticity_token` input;
//! 2. POST the approval form with that token, surfacing the redirect instead of following it;
//! 3. read the `code` from the redirect's `Location`;
//! 4. exchange the code for tokens.
//!
//! Any deviation from that script is reported as a [`ResponseError`].

// std
use std::sync::LazyLock;
// crates.io
use oauth2::{
	AuthorizationCode, HttpRequest, HttpResponse,
	http::{
		HeaderValue, Method, Request,
		header::{ACCEPT, CONTENT_TYPE, COOKIE, LOCATION, USER_AGENT},
	},
};
use regex::{Captures, Regex};
use url::form_urlencoded::Serializer;
// self
use crate::{
	_prelude::*,
	error::ResponseError,
	flows::AuthorizationSession,
	http::{self, ClientOptions, HttpTransport},
	oauth::{FORM_CONTENT_TYPE, GrantType, TokenExchange, TokenGrant},
	obs::{self, Operation, OperationSpan, Outcome},
};

const CSRF_FIELD: &str = "authenticity_token";
const BROWSER_USER_AGENT: &str =
	"Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)";
const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

static INPUT_TAG: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?is)<input\b([^>]*)>").expect("Input tag pattern should compile.")
});
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r#"([^\s=/>"']+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
		.expect("Attribute pattern should compile.")
});
static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|amp|lt|gt|quot|apos);")
		.expect("Entity pattern should compile.")
});

impl<C> TokenExchange<C>
where
	C: ?Sized + HttpTransport,
{
	/// Obtains tokens by approving the application with an already signed-in browser session.
	///
	/// `session_cookie` is sent verbatim as the `Cookie` header of both browser requests.
	pub async fn bootstrap_with_cookie(&self, session_cookie: &str) -> Result<TokenGrant> {
		const OPERATION: Operation = Operation::CookieBootstrap;

		let span = OperationSpan::new(OPERATION, "bootstrap_with_cookie");

		obs::record_outcome(OPERATION, Outcome::Attempt);

		let result = span.instrument(self.bootstrap(session_cookie)).await;

		obs::record_result(OPERATION, &result);

		result
	}

	async fn bootstrap(&self, session_cookie: &str) -> Result<TokenGrant> {
		let session = self.start_authorization();
		let token = self.scrape_authenticity_token(&session, session_cookie).await?;
		let code = self.approve(&session, session_cookie, &token).await?;

		self.exchange_code(&code).await
	}

	async fn scrape_authenticity_token(
		&self,
		session: &AuthorizationSession,
		session_cookie: &str,
	) -> Result<String> {
		let uri = &session.authorize_url;
		let request = browser_request(Method::GET, uri, session_cookie, Vec::new())?;
		let response =
			http::dispatch(self.transport.as_ref(), ClientOptions::default(), request, &self.cancel)
				.await?;

		if !response.status().is_success() {
			return Err(ResponseError::from_response(uri, &response).into());
		}

		let html = String::from_utf8_lossy(response.body());

		input_value(&html, CSRF_FIELD).ok_or_else(|| {
			ResponseError::with_message(
				uri,
				&response,
				"Authorization page did not contain an authenticity token.",
			)
			.into()
		})
	}

	async fn approve(
		&self,
		session: &AuthorizationSession,
		session_cookie: &str,
		authenticity_token: &str,
	) -> Result<AuthorizationCode> {
		let uri = &self.credentials.endpoints.approval;
		let body = Serializer::new(String::new())
			.append_pair(CSRF_FIELD, authenticity_token)
			.append_pair("type", GrantType::WebServer.as_str())
			.append_pair("client_id", self.credentials.client_id.as_str())
			.append_pair("redirect_uri", session.redirect_uri.as_str())
			.append_pair("state", &session.state)
			.finish();
		let mut request = browser_request(Method::POST, uri, session_cookie, body.into_bytes())?;

		request
			.headers_mut()
			.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));

		let response = http::dispatch(
			self.transport.as_ref(),
			ClientOptions::NO_REDIRECTS,
			request,
			&self.cancel,
		)
		.await?;

		redirect_code(uri, &response, session)
	}
}

fn browser_request(
	method: Method,
	uri: &Url,
	session_cookie: &str,
	body: Vec<u8>,
) -> Result<HttpRequest> {
	let cookie = HeaderValue::from_str(session_cookie)
		.map_err(|e| ConfigError::from(oauth2::http::Error::from(e)))?;

	Request::builder()
		.method(method)
		.uri(uri.as_str())
		.header(USER_AGENT, BROWSER_USER_AGENT)
		.header(ACCEPT, HTML_ACCEPT)
		.header(COOKIE, cookie)
		.body(body)
		.map_err(|e| ConfigError::from(e).into())
}

fn redirect_code(
	uri: &Url,
	response: &HttpResponse,
	session: &AuthorizationSession,
) -> Result<AuthorizationCode> {
	let deviation = |message: &str| -> Error {
		ResponseError::with_message(uri, response, message).into()
	};

	if !response.status().is_redirection() {
		return Err(deviation("Approval did not redirect back to the application."));
	}

	let location = response
		.headers()
		.get(LOCATION)
		.and_then(|value| value.to_str().ok())
		.ok_or_else(|| deviation("Approval redirect has no usable Location header."))?;
	let target =
		uri.join(location).map_err(|_| deviation("Approval redirect Location is not a URL."))?;
	let mut code = None;

	for (name, value) in target.query_pairs() {
		match name.as_ref() {
			"code" if code.is_none() => code = Some(value.into_owned()),
			"state" => session.validate_state(&value).map_err(Error::from)?,
			_ => (),
		}
	}

	code.filter(|code| !code.is_empty())
		.map(AuthorizationCode::new)
		.ok_or_else(|| deviation("Approval redirect did not carry a code."))
}

/// Returns the decoded `value` of the first `<input>` whose `name` equals `name`.
fn input_value(html: &str, name: &str) -> Option<String> {
	INPUT_TAG.captures_iter(html).find_map(|tag| {
		let attributes = ATTRIBUTE
			.captures_iter(tag.get(1)?.as_str())
			.map(|attribute| {
				let key = attribute[1].to_ascii_lowercase();
				let value = [2, 3, 4]
					.into_iter()
					.find_map(|i| attribute.get(i))
					.map_or("", |value| value.as_str());

				(key, value)
			})
			.collect::<HashMap<_, _>>();

		if attributes.get("name").copied() == Some(name) {
			attributes.get("value").map(|value| decode_entities(value))
		} else {
			None
		}
	})
}

fn decode_entities(raw: &str) -> String {
	ENTITY
		.replace_all(raw, |entity: &Captures| {
			let body = &entity[1];
			let decoded = match body {
				"amp" => Some('&'),
				"lt" => Some('<'),
				"gt" => Some('>'),
				"quot" => Some('"'),
				"apos" => Some('\''),
				_ => body
					.strip_prefix("#x")
					.or_else(|| body.strip_prefix("#X"))
					.map(|hex| u32::from_str_radix(hex, 16))
					.unwrap_or_else(|| body[1..].parse())
					.ok()
					.and_then(char::from_u32),
			};

			decoded.map_or_else(|| entity[0].to_owned(), String::from)
		})
		.into_owned()
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::Response;
	// self
	use super::*;
	use crate::{config::AppCredentials, error::AuthError};

	fn session() -> AuthorizationSession {
		let redirect = Url::parse("https://app.example.com/callback").expect("Redirect should parse.");

		AuthorizationSession::new(&AppCredentials::new("id", "secret", &redirect))
	}

	fn approval_uri() -> Url {
		Url::parse("https://launchpad.37signals.com/authorization").expect("URL should parse.")
	}

	fn redirect(status: u16, location: Option<&str>) -> HttpResponse {
		let mut builder = Response::builder().status(status);

		if let Some(location) = location {
			builder = builder.header(LOCATION, location);
		}

		builder.body(Vec::new()).expect("Response fixture should build.")
	}

	#[test]
	fn scrapes_inputs_regardless_of_attribute_order_and_quotes() {
		let html = r#"
			<form action="/authorization" method="post">
				<input type="hidden" name="utf8" value="&#x2713;">
				<INPUT value='tok+en/&amp;=' type=hidden name="authenticity_token" />
			</form>
		"#;

		assert_eq!(input_value(html, "authenticity_token").as_deref(), Some("tok+en/&="));
		assert_eq!(input_value(html, "utf8").as_deref(), Some("\u{2713}"));
		assert_eq!(input_value(html, "missing"), None);
	}

	#[test]
	fn decodes_basic_entities() {
		assert_eq!(decode_entities("a&lt;b&gt;&quot;c&quot;&#39;&apos;"), "a<b>\"c\"''");
		assert_eq!(decode_entities("&unknown; &#xZZ;"), "&unknown; &#xZZ;");
	}

	#[test]
	fn redirect_must_carry_a_code() {
		let session = session();
		let location = format!("https://app.example.com/callback?code=abc&state={}", session.state);
		let code = redirect_code(&approval_uri(), &redirect(302, Some(&location)), &session)
			.expect("Redirect with a code should succeed.");

		assert_eq!(code.secret(), "abc");

		for response in [
			redirect(200, None),
			redirect(302, None),
			redirect(302, Some("https://app.example.com/callback?error=denied")),
		] {
			let err = redirect_code(&approval_uri(), &response, &session)
				.expect_err("Deviation should fail.");

			assert!(matches!(err, Error::Response(_)), "Unexpected error: {err:?}");
		}
	}

	#[test]
	fn redirect_state_must_match_the_session() {
		let session = session();
		let response = redirect(302, Some("https://app.example.com/callback?code=abc&state=forged"));
		let err =
			redirect_code(&approval_uri(), &response, &session).expect_err("Forged state fails.");

		assert!(matches!(err, Error::Auth(AuthError::StateMismatch)));
	}
}
