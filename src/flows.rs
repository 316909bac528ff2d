//! Interactive flows that end in an authorization-code exchange.
//!
//! [`AuthorizationSession`] covers the redirect-based flow: send the user to
//! [`AuthorizationSession::authorize_url`], then hand the `state` and `code` from the redirect to
//! [`TokenExchange::complete_authorization`](crate::oauth::TokenExchange::complete_authorization).
//! The cookie bootstrap replays the same grant with an existing browser session instead of a
//! user at the keyboard.

pub mod authorization;
pub mod cookie;

pub use authorization::*;
