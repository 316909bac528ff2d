//! Conditional-request response caching.
//!
//! A [`ResponseCache`] maps an exact request URI to a [`CacheEntry`]: the validators
//! (`ETag`/`Last-Modified`) of a previous response plus everything needed to rebuild it. The
//! pipeline attaches `If-None-Match`/`If-Modified-Since` from the entry and, on HTTP 304, serves
//! the stored response instead of the empty network one.

pub mod memory;

pub use memory::SingleSlotCache;

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use oauth2::{
	HttpResponse,
	http::{
		HeaderMap, HeaderValue, Response,
		header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED},
	},
};
use time::{
	PrimitiveDateTime, UtcOffset,
	format_description::{BorrowedFormatItem, well_known::Rfc2822},
	macros::format_description,
};
// self
use crate::_prelude::*;

/// Header names stored in [`CacheEntry::content_headers`] rather than [`CacheEntry::headers`].
pub const CONTENT_HEADERS: &[&str] = &[
	"allow",
	"content-disposition",
	"content-encoding",
	"content-language",
	"content-length",
	"content-location",
	"content-md5",
	"content-range",
	"content-type",
	"expires",
	"last-modified",
];

const HTTP_DATE: &[BorrowedFormatItem<'static>] = format_description!(
	"[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Lookup contract used by the request pipeline.
///
/// Keys are request URIs compared verbatim. Implementations decide how many entries they keep;
/// readers racing a writer must observe either the old or the new entry, never a mix.
pub trait ResponseCache
where
	Self: Send + Sync,
{
	/// Returns the entry stored for exactly `uri`, if any.
	fn get(&self, uri: &str) -> Option<Arc<CacheEntry>>;

	/// Stores `entry` for `uri`.
	fn set(&self, uri: &str, entry: CacheEntry);
}

/// Validators plus a byte-exact copy of a cacheable response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
	/// Opaque `ETag` validator, quotes included.
	pub etag: Option<String>,
	/// `Last-Modified` validator.
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub last_modified: Option<OffsetDateTime>,
	/// Status code of the stored response.
	pub status_code: u16,
	/// Response headers, excluding [`CONTENT_HEADERS`].
	pub headers: BTreeMap<String, Vec<String>>,
	/// Content headers of the stored response.
	pub content_headers: BTreeMap<String, Vec<String>>,
	/// Raw response body.
	#[serde(with = "base64_bytes")]
	pub content_bytes: Vec<u8>,
}
impl CacheEntry {
	/// Captures `response` when it carries at least one validator; otherwise returns `None`.
	pub fn from_response(response: &HttpResponse) -> Option<Self> {
		let headers = response.headers();
		let etag = headers
			.get(ETAG)
			.and_then(|value| value.to_str().ok())
			.map(str::to_owned)
			.filter(|value| !value.is_empty());
		let last_modified = headers
			.get(LAST_MODIFIED)
			.and_then(|value| value.to_str().ok())
			.and_then(parse_http_date);

		if etag.is_none() && last_modified.is_none() {
			return None;
		}

		let mut regular = BTreeMap::<String, Vec<String>>::new();
		let mut content = BTreeMap::<String, Vec<String>>::new();

		for (name, value) in headers {
			let name = name.as_str();
			let target =
				if CONTENT_HEADERS.contains(&name) { &mut content } else { &mut regular };

			target
				.entry(name.to_owned())
				.or_default()
				.push(String::from_utf8_lossy(value.as_bytes()).into_owned());
		}

		Some(Self {
			etag,
			last_modified,
			status_code: response.status().as_u16(),
			headers: regular,
			content_headers: content,
			content_bytes: response.body().clone(),
		})
	}

	/// Rebuilds the stored response.
	pub fn to_response(&self) -> Result<HttpResponse> {
		let mut builder = Response::builder().status(self.status_code);

		for (name, values) in self.headers.iter().chain(&self.content_headers) {
			for value in values {
				builder = builder.header(name.as_str(), value.as_str());
			}
		}

		builder.body(self.content_bytes.clone()).map_err(|e| ConfigError::from(e).into())
	}

	/// Adds `If-None-Match` and `If-Modified-Since` for the validators this entry holds.
	pub fn apply_conditional_headers(&self, headers: &mut HeaderMap) {
		if let Some(value) = self.etag.as_deref().and_then(|etag| HeaderValue::from_str(etag).ok())
		{
			headers.insert(IF_NONE_MATCH, value);
		}
		if let Some(value) = self
			.last_modified
			.and_then(|moment| moment.to_offset(UtcOffset::UTC).format(HTTP_DATE).ok())
			.and_then(|formatted| HeaderValue::from_str(&formatted).ok())
		{
			headers.insert(IF_MODIFIED_SINCE, value);
		}
	}
}

fn parse_http_date(raw: &str) -> Option<OffsetDateTime> {
	let raw = raw.trim();

	PrimitiveDateTime::parse(raw, HTTP_DATE)
		.map(PrimitiveDateTime::assume_utc)
		.or_else(|_| OffsetDateTime::parse(raw, &Rfc2822))
		.ok()
}

mod base64_bytes {
	// crates.io
	use serde::{Deserializer, Serializer, de::Error as _};
	// self
	use super::*;

	pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&BASE64.encode(bytes))
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
	where
		D: Deserializer<'de>,
	{
		let encoded = String::deserialize(deserializer)?;

		BASE64.decode(encoded.as_bytes()).map_err(D::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::BTreeSet;
	// crates.io
	use oauth2::http::header::{CACHE_CONTROL, CONTENT_TYPE};
	use time::macros;
	// self
	use super::*;

	fn validated_response() -> HttpResponse {
		Response::builder()
			.status(200)
			.header(ETAG, "\"abcdef==\"")
			.header(LAST_MODIFIED, "Sat, 02 Feb 2002 12:22:22 GMT")
			.header(CACHE_CONTROL, "max-age=0")
			.header(CACHE_CONTROL, "private")
			.header(CONTENT_TYPE, "text/plain; charset=utf-8")
			.body(b"This is the content".to_vec())
			.expect("Response fixture should build.")
	}

	fn header_set(response: &HttpResponse) -> BTreeSet<(String, String)> {
		response
			.headers()
			.iter()
			.map(|(name, value)| {
				(name.as_str().to_owned(), value.to_str().unwrap_or_default().to_owned())
			})
			.collect()
	}

	#[test]
	fn responses_without_validators_are_not_cacheable() {
		let response = Response::builder()
			.status(200)
			.header(CONTENT_TYPE, "application/json")
			.body(b"[]".to_vec())
			.expect("Response fixture should build.");

		assert!(CacheEntry::from_response(&response).is_none());
	}

	#[test]
	fn validators_are_captured_and_split_by_header_kind() {
		let entry = CacheEntry::from_response(&validated_response())
			.expect("Validated response should be cacheable.");

		assert_eq!(entry.etag.as_deref(), Some("\"abcdef==\""));
		assert_eq!(entry.last_modified, Some(macros::datetime!(2002-02-02 12:22:22 UTC)));
		assert_eq!(
			entry.headers.get("cache-control"),
			Some(&vec!["max-age=0".to_owned(), "private".to_owned()])
		);
		assert!(entry.content_headers.contains_key("content-type"));
		assert!(entry.content_headers.contains_key("last-modified"));
		assert_eq!(entry.headers.get("etag"), Some(&vec!["\"abcdef==\"".to_owned()]));
	}

	#[test]
	fn serialized_entries_round_trip() {
		let original = validated_response();
		let entry =
			CacheEntry::from_response(&original).expect("Validated response should be cacheable.");
		let json = serde_json::to_string(&entry).expect("Entry should serialize.");

		assert!(json.contains("\"last_modified\":\"2002-02-02T12:22:22Z\""));

		let restored: CacheEntry = serde_json::from_str(&json).expect("Entry should deserialize.");
		let rebuilt = restored.to_response().expect("Entry should rebuild a response.");

		assert_eq!(restored, entry);
		assert_eq!(rebuilt.status(), original.status());
		assert_eq!(rebuilt.body(), b"This is the content");
		assert_eq!(header_set(&rebuilt), header_set(&original));
	}

	#[test]
	fn conditional_headers_mirror_validators() {
		let entry = CacheEntry::from_response(&validated_response())
			.expect("Validated response should be cacheable.");
		let mut headers = HeaderMap::new();

		entry.apply_conditional_headers(&mut headers);

		assert_eq!(headers.get(IF_NONE_MATCH).and_then(|v| v.to_str().ok()), Some("\"abcdef==\""));
		assert_eq!(
			headers.get(IF_MODIFIED_SINCE).and_then(|v| v.to_str().ok()),
			Some("Sat, 02 Feb 2002 12:22:22 GMT")
		);
	}
}
