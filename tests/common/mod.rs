//! Shared fixtures for integration tests.

#![allow(dead_code)]

// std
use std::{collections::VecDeque, future::Future, io, pin::Pin, sync::Arc, time::Duration};
// crates.io
use basecamp_api::{
	config::{AppCredentials, ClientConfig, OAuthEndpoints},
	error::ConfigError,
	http::{ClientOptions, HttpTransport},
};
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
	http::{HeaderMap, Method, Response},
};
use parking_lot::Mutex;
use tokio::time::Instant;
use url::Url;

pub const USER_AGENT: &str = "Integration Tests (tests@example.com)";
pub const CLIENT_ID: &str = "client-1";
pub const CLIENT_SECRET: &str = "secret-1";
pub const REDIRECT_URI: &str = "https://app.example.com/callback";

/// One scripted reaction to an outbound request.
pub enum Step {
	/// Answer with this response.
	Respond(HttpResponse),
	/// Never answer; only cancellation ends the call.
	Hang,
}

/// Request as observed by [`ScriptedTransport`].
#[derive(Clone, Debug)]
pub struct RecordedRequest {
	pub at: Instant,
	pub method: Method,
	pub uri: String,
	pub headers: HeaderMap,
	pub body: Vec<u8>,
	pub options: ClientOptions,
}
impl RecordedRequest {
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}

	pub fn body_text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}
}

#[derive(Default)]
struct Shared {
	script: Mutex<VecDeque<Step>>,
	requests: Mutex<Vec<RecordedRequest>>,
}

/// In-memory transport that answers requests from a fixed script, in order.
#[derive(Clone, Default)]
pub struct ScriptedTransport(Arc<Shared>);
impl ScriptedTransport {
	pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
		let transport = Self::default();

		transport.0.script.lock().extend(steps);

		transport
	}

	pub fn requests(&self) -> Vec<RecordedRequest> {
		self.0.requests.lock().clone()
	}

	pub fn remaining(&self) -> usize {
		self.0.script.lock().len()
	}
}
impl HttpTransport for ScriptedTransport {
	type Handle = ScriptedHandle;
	type TransportError = io::Error;

	fn create(&self, options: ClientOptions) -> Result<Self::Handle, ConfigError> {
		Ok(ScriptedHandle { shared: self.0.clone(), options })
	}
}

pub struct ScriptedHandle {
	shared: Arc<Shared>,
	options: ClientOptions,
}
impl<'c> AsyncHttpClient<'c> for ScriptedHandle {
	type Error = HttpClientError<io::Error>;
	type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			let (parts, body) = request.into_parts();

			self.shared.requests.lock().push(RecordedRequest {
				at: Instant::now(),
				method: parts.method,
				uri: parts.uri.to_string(),
				headers: parts.headers,
				body,
				options: self.options,
			});

			let step = self.shared.script.lock().pop_front();

			match step {
				Some(Step::Respond(response)) => Ok(response),
				Some(Step::Hang) => std::future::pending().await,
				None => Err(HttpClientError::Other("Script exhausted.".into())),
			}
		})
	}
}

pub fn respond(status: u16, headers: &[(&str, &str)], body: &str) -> Step {
	let mut builder = Response::builder().status(status);

	for (name, value) in headers {
		builder = builder.header(*name, *value);
	}

	Step::Respond(builder.body(body.as_bytes().to_vec()).expect("Response fixture should build."))
}

pub fn json(status: u16, body: &str) -> Step {
	respond(status, &[("content-type", "application/json")], body)
}

pub fn token_response(access_token: &str) -> Step {
	json(
		200,
		&format!(
			"{{\"access_token\":\"{access_token}\",\"expires_in\":1209600,\"refresh_token\":\"refresh-2\"}}"
		),
	)
}

pub fn config(api_base: &str, request_delay: Duration) -> ClientConfig {
	ClientConfig::builder()
		.api_base(Url::parse(api_base).expect("API base fixture should parse."))
		.user_agent(USER_AGENT)
		.request_delay(request_delay)
		.build()
		.expect("Client config fixture should build.")
}

pub fn credentials(auth_base: &str) -> AppCredentials {
	let base = Url::parse(auth_base).expect("Authorization base fixture should parse.");
	let endpoint = |path: &str| base.join(path).expect("Endpoint fixture should join.");
	let redirect = Url::parse(REDIRECT_URI).expect("Redirect fixture should parse.");

	AppCredentials::new(CLIENT_ID, CLIENT_SECRET, &redirect)
		.with_endpoints(OAuthEndpoints {
			authorization: endpoint("authorization/new"),
			approval: endpoint("authorization"),
			token: endpoint("authorization/token"),
		})
		.expect("Loopback endpoints should validate.")
}
