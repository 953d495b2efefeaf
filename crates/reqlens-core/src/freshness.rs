//! Conditional GET freshness
//!
//! Decides whether the client's cached representation, as described by
//! `If-None-Match` / `If-Modified-Since`, still matches the validators the
//! response layer is about to send. A fresh request can be answered with
//! `304 Not Modified`.
//!
//! # Example
//!
//! ```rust
//! use reqlens_core::{FreshnessEvaluator, ResponseValidators};
//! use http::{HeaderMap, Method};
//!
//! let mut headers = HeaderMap::new();
//! headers.insert("if-none-match", "W/\"v1\"".parse().unwrap());
//!
//! let evaluator = FreshnessEvaluator::new(&Method::GET, &headers);
//! assert!(evaluator.is_fresh(&ResponseValidators::new().etag("\"v1\"")));
//! assert!(!evaluator.is_fresh(&ResponseValidators::new().etag("\"v2\"")));
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use http::{header, HeaderMap, Method};

/// Validators describing the representation the server is about to send.
///
/// These are response-side facts, so they are handed in at the moment
/// freshness is evaluated rather than stored on the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseValidators {
    etag: Option<String>,
    last_modified: Option<String>,
}

impl ResponseValidators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entity tag, quotes and weak prefix included (`W/"abc"`)
    pub fn etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    /// Set the last modification time
    pub fn last_modified(mut self, time: DateTime<Utc>) -> Self {
        self.last_modified = Some(format_http_date(time));
        self
    }

    /// Set the raw `Last-Modified` header value as the response would send it
    pub fn last_modified_raw(mut self, value: impl Into<String>) -> Self {
        self.last_modified = Some(value.into());
        self
    }

    /// Read `ETag` and `Last-Modified` from a response header map
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            etag: read(header::ETAG),
            last_modified: read(header::LAST_MODIFIED),
        }
    }

    pub fn etag_value(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn last_modified_value(&self) -> Option<&str> {
        self.last_modified.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// Evaluates request conditional headers against response validators.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessEvaluator<'a> {
    method: &'a Method,
    headers: &'a HeaderMap,
}

impl<'a> FreshnessEvaluator<'a> {
    pub fn new(method: &'a Method, headers: &'a HeaderMap) -> Self {
        Self { method, headers }
    }

    /// Whether the client's cached copy is still current.
    pub fn is_fresh(&self, validators: &ResponseValidators) -> bool {
        if self.method != Method::GET && self.method != Method::HEAD {
            return false;
        }

        let none_match = self.header_str(header::IF_NONE_MATCH);
        let modified_since = self.header_str(header::IF_MODIFIED_SINCE);

        if none_match.is_none() && modified_since.is_none() {
            return false;
        }

        if self.requests_no_cache() {
            return false;
        }

        if let Some(none_match) = none_match {
            return etag_list_matches(none_match, validators.etag_value());
        }

        match modified_since {
            Some(since) => not_modified_since(since, validators.last_modified_value()),
            None => false,
        }
    }

    /// Exactly `!is_fresh`.
    pub fn is_stale(&self, validators: &ResponseValidators) -> bool {
        !self.is_fresh(validators)
    }

    fn header_str(&self, name: header::HeaderName) -> Option<&'a str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn requests_no_cache(&self) -> bool {
        self.headers
            .get_all(header::CACHE_CONTROL)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|directive| directive.trim().eq_ignore_ascii_case("no-cache"))
    }
}

/// `If-None-Match` evaluation with weak comparison.
fn etag_list_matches(list: &str, etag: Option<&str>) -> bool {
    let mut members = list.split(',').map(str::trim).filter(|m| !m.is_empty());
    let etag = etag.map(strip_weak);

    members.any(|member| member == "*" || Some(strip_weak(member)) == etag)
}

fn strip_weak(tag: &str) -> &str {
    let tag = tag.trim();
    tag.strip_prefix("W/").unwrap_or(tag)
}

/// `If-Modified-Since` evaluation at one-second resolution.
fn not_modified_since(since: &str, last_modified: Option<&str>) -> bool {
    let (Some(since), Some(last_modified)) =
        (parse_http_date(since), last_modified.and_then(parse_http_date))
    else {
        return false;
    };
    last_modified.timestamp() <= since.timestamp()
}

/// Parse an HTTP-date in IMF-fixdate, RFC 850 or asctime form.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }

    // asctime pads single-digit days with a space
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    const OBSOLETE_FORMATS: [&str; 2] = ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %d %H:%M:%S %Y"];
    let parsed = OBSOLETE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&collapsed, format).ok())
        .map(|naive| naive.and_utc());

    if parsed.is_none() {
        trace_debug!(value = %value, "ignoring unparsable HTTP-date");
    }
    parsed
}

/// Format a timestamp as an IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn format_http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
