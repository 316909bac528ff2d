//! `Link` header parsing for pagination.

// crates.io
use oauth2::http::{HeaderMap, header::LINK};
// self
use crate::_prelude::*;

/// Returns the first well-formed `rel="next"` target across every `Link` header value.
///
/// Relation names compare case-insensitively, relative targets resolve against `base`, and
/// malformed segments are skipped.
pub fn next_link(headers: &HeaderMap, base: &Url) -> Option<Url> {
	headers
		.get_all(LINK)
		.iter()
		.filter_map(|value| value.to_str().ok())
		.flat_map(split_segments)
		.find_map(|segment| parse_next(segment, base))
}

// Commas inside `<...>` or quoted parameter values do not separate links.
fn split_segments(value: &str) -> Vec<&str> {
	let mut segments = Vec::new();
	let mut start = 0;
	let mut in_target = false;
	let mut in_quotes = false;

	for (i, c) in value.char_indices() {
		match c {
			'<' if !in_quotes => in_target = true,
			'>' if !in_quotes => in_target = false,
			'"' if !in_target => in_quotes = !in_quotes,
			',' if !in_target && !in_quotes => {
				segments.push(&value[start..i]);

				start = i + 1;
			},
			_ => (),
		}
	}

	segments.push(&value[start..]);

	segments
}

fn parse_next(segment: &str, base: &Url) -> Option<Url> {
	let (target, params) = segment.trim().strip_prefix('<')?.split_once('>')?;
	let params = params.trim_start();

	if !params.is_empty() && !params.starts_with(';') {
		return None;
	}

	let is_next = params.split(';').filter_map(|param| param.split_once('=')).any(|(name, value)| {
		name.trim().eq_ignore_ascii_case("rel")
			&& value
				.trim()
				.trim_matches('"')
				.split_ascii_whitespace()
				.any(|rel| rel.eq_ignore_ascii_case("next"))
	});

	if is_next { base.join(target.trim()).ok() } else { None }
}
