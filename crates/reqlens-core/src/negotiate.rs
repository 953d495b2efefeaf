//! Content negotiation
//!
//! Picks the best server-supported representation for the request's
//! `Accept`, `Accept-Language`, `Accept-Charset` and `Accept-Encoding`
//! headers, and checks the request's own `Content-Type` (`is`).
//!
//! Candidates may be full media types (`application/json`) or short names
//! from the shared [`mime_table`](crate::mime_table) (`json`, `html`). The
//! winning candidate is handed back exactly as the caller spelled it.
//!
//! # Example
//!
//! ```rust
//! use reqlens_core::ContentNegotiator;
//! use http::HeaderMap;
//!
//! let mut headers = HeaderMap::new();
//! headers.insert("accept", "application/json;q=0.8, text/html".parse().unwrap());
//!
//! let negotiator = ContentNegotiator::new(&headers);
//! assert_eq!(negotiator.accepts(&["json", "html"]), Some("html"));
//! ```

use crate::mime_table;
use http::{header, HeaderMap, HeaderName};
use std::cmp::Ordering;

/// One entry of an `Accept`-style header.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptEntry {
    /// Lower-cased value without parameters (`text/html`, `en-us`, `gzip`)
    pub value: String,
    /// Parameters other than `q`, names lower-cased
    pub params: Vec<(String, String)>,
    /// Quality value (0.0 - 1.0), default is 1.0
    pub quality: f32,
    /// Position in the header
    pub order: usize,
}

/// Parsed `Accept`-style header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcceptHeader {
    entries: Vec<AcceptEntry>,
}

impl AcceptHeader {
    /// Parse a header value such as `text/html, application/json;q=0.9`.
    ///
    /// Malformed q-values count as 1.0; values outside `[0, 1]` are clamped.
    pub fn parse(header_value: &str) -> Self {
        let entries = header_value
            .split(',')
            .filter_map(|part| {
                let mut pieces = part.split(';');
                let value = pieces.next()?.trim().to_ascii_lowercase();
                if value.is_empty() {
                    return None;
                }

                let mut quality = 1.0;
                let mut params = Vec::new();
                for param in pieces {
                    let Some((name, raw)) = param.split_once('=') else {
                        continue;
                    };
                    let name = name.trim().to_ascii_lowercase();
                    let raw = raw.trim().trim_matches('"');
                    if name == "q" {
                        quality = raw.parse::<f32>().map(|q| q.clamp(0.0, 1.0)).unwrap_or_else(|_| {
                            trace_debug!(q = %raw, "ignoring malformed quality value");
                            1.0
                        });
                    } else {
                        params.push((name, raw.to_string()));
                    }
                }

                Some((value, params, quality))
            })
            .enumerate()
            .map(|(order, (value, params, quality))| AcceptEntry {
                value,
                params,
                quality,
                order,
            })
            .collect();

        Self { entries }
    }

    /// Every entry in header order, refused (`q=0`) entries included.
    pub fn entries(&self) -> &[AcceptEntry] {
        &self.entries
    }

    /// Acceptable values, most preferred first.
    ///
    /// Sorted by quality, then by how specific the value is, then by
    /// header order. Refused entries are left out.
    pub fn preferred(&self) -> Vec<&str> {
        let mut entries: Vec<&AcceptEntry> =
            self.entries.iter().filter(|e| e.quality > 0.0).collect();
        entries.sort_by(|a, b| {
            b.quality
                .partial_cmp(&a.quality)
                .unwrap_or(Ordering::Equal)
                .then_with(|| wildcard_count(&a.value).cmp(&wildcard_count(&b.value)))
                .then_with(|| a.order.cmp(&b.order))
        });
        entries.into_iter().map(|e| e.value.as_str()).collect()
    }
}

fn wildcard_count(value: &str) -> usize {
    value.split('/').filter(|part| *part == "*").count()
}

/// Which request header a negotiation runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    MediaType,
    Language,
    Charset,
    Encoding,
}

impl Dimension {
    fn header(self) -> HeaderName {
        match self {
            Dimension::MediaType => header::ACCEPT,
            Dimension::Language => header::ACCEPT_LANGUAGE,
            Dimension::Charset => header::ACCEPT_CHARSET,
            Dimension::Encoding => header::ACCEPT_ENCODING,
        }
    }

    /// Specificity of `entry` for `candidate`, `None` when they do not match.
    fn specificity(self, entry: &AcceptEntry, candidate: &Candidate) -> Option<u8> {
        match self {
            Dimension::MediaType => media_type_specificity(entry, candidate),
            Dimension::Language => language_specificity(&entry.value, &candidate.value),
            Dimension::Charset | Dimension::Encoding => {
                if entry.value == candidate.value {
                    Some(1)
                } else if entry.value == "*" {
                    Some(0)
                } else {
                    None
                }
            }
        }
    }
}

/// A caller-supplied candidate in canonical form.
#[derive(Debug)]
struct Candidate {
    value: String,
    params: Vec<(String, String)>,
}

impl Candidate {
    fn new(dimension: Dimension, raw: &str) -> Option<Self> {
        let mut pieces = raw.split(';');
        let base = pieces.next()?.trim();
        if base.is_empty() {
            return None;
        }

        let value = match dimension {
            Dimension::MediaType if base.contains('/') => base.to_ascii_lowercase(),
            Dimension::MediaType => mime_table::lookup(base)?.to_string(),
            _ => base.to_ascii_lowercase(),
        };

        let params = pieces
            .filter_map(|p| p.split_once('='))
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().trim_matches('"').to_string()))
            .collect();

        Some(Self { value, params })
    }
}

fn media_type_specificity(entry: &AcceptEntry, candidate: &Candidate) -> Option<u8> {
    let (entry_type, entry_subtype) = entry.value.split_once('/')?;
    let (cand_type, cand_subtype) = candidate.value.split_once('/')?;

    let mut specificity = 0;
    if entry_type == cand_type {
        specificity |= 4;
    } else if entry_type != "*" {
        return None;
    }

    if entry_subtype == cand_subtype {
        specificity |= 2;
    } else if entry_subtype != "*" {
        return None;
    }

    if !entry.params.is_empty() {
        let all_match = entry.params.iter().all(|(name, value)| {
            candidate
                .params
                .iter()
                .any(|(n, v)| n == name && v.eq_ignore_ascii_case(value))
        });
        if !all_match {
            return None;
        }
        specificity |= 1;
    }

    Some(specificity)
}

fn language_specificity(entry: &str, candidate: &str) -> Option<u8> {
    let prefix = |tag: &str| tag.split('-').next().unwrap_or(tag).to_string();

    if entry == candidate {
        Some(4)
    } else if prefix(candidate) == entry {
        Some(2)
    } else if prefix(entry) == candidate {
        Some(1)
    } else if entry == "*" {
        Some(0)
    } else {
        None
    }
}

/// Negotiates representations for one request's headers.
#[derive(Debug, Clone, Copy)]
pub struct ContentNegotiator<'a> {
    headers: &'a HeaderMap,
}

impl<'a> ContentNegotiator<'a> {
    pub fn new(headers: &'a HeaderMap) -> Self {
        Self { headers }
    }

    /// Best media type among `candidates`, or `None` if none is acceptable.
    ///
    /// Without an `Accept` header the first candidate wins.
    pub fn accepts<'c>(&self, candidates: &[&'c str]) -> Option<&'c str> {
        self.negotiate(Dimension::MediaType, candidates)
    }

    /// Acceptable media types, most preferred first.
    pub fn types(&self) -> Vec<String> {
        self.preferred(Dimension::MediaType)
    }

    pub fn language<'c>(&self, candidates: &[&'c str]) -> Option<&'c str> {
        self.negotiate(Dimension::Language, candidates)
    }

    pub fn languages(&self) -> Vec<String> {
        self.preferred(Dimension::Language)
    }

    pub fn charset<'c>(&self, candidates: &[&'c str]) -> Option<&'c str> {
        self.negotiate(Dimension::Charset, candidates)
    }

    pub fn charsets(&self) -> Vec<String> {
        self.preferred(Dimension::Charset)
    }

    /// Best content coding. `identity` stays acceptable unless refused.
    pub fn encoding<'c>(&self, candidates: &[&'c str]) -> Option<&'c str> {
        self.negotiate(Dimension::Encoding, candidates)
    }

    pub fn encodings(&self) -> Vec<String> {
        self.preferred(Dimension::Encoding)
    }

    /// The candidate matching the request's own `Content-Type`, if any.
    ///
    /// Parameters such as `charset` are ignored. Candidates may use
    /// wildcards (`text/*`, `*/json`) or a structured suffix (`+json`).
    pub fn content_type_is<'c>(&self, candidates: &[&'c str]) -> Option<&'c str> {
        let content_type = self
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())?;
        let actual = content_type.split(';').next()?.trim().to_ascii_lowercase();
        if !actual.contains('/') {
            return None;
        }

        candidates
            .iter()
            .copied()
            .find(|candidate| match expand_type_pattern(candidate) {
                Some(expected) => mime_matches(&expected, &actual),
                None => false,
            })
    }

    fn header_value(&self, dimension: Dimension) -> Option<String> {
        let values: Vec<&str> = self
            .headers
            .get_all(dimension.header())
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(","))
        }
    }

    fn accept_header(&self, dimension: Dimension) -> Option<AcceptHeader> {
        let mut accept = AcceptHeader::parse(&self.header_value(dimension)?);

        if dimension == Dimension::Encoding
            && !accept.entries.iter().any(|e| e.value == "identity" || e.value == "*")
        {
            let quality = accept
                .entries
                .iter()
                .map(|e| e.quality)
                .fold(1.0_f32, f32::min);
            let order = accept.entries.len();
            accept.entries.push(AcceptEntry {
                value: "identity".to_string(),
                params: Vec::new(),
                quality,
                order,
            });
        }

        Some(accept)
    }

    fn preferred(&self, dimension: Dimension) -> Vec<String> {
        self.accept_header(dimension)
            .map(|accept| accept.preferred().into_iter().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn negotiate<'c>(&self, dimension: Dimension, candidates: &[&'c str]) -> Option<&'c str> {
        let Some(accept) = self.accept_header(dimension) else {
            return candidates.first().copied();
        };

        candidates
            .iter()
            .enumerate()
            .filter_map(|(index, raw)| {
                let candidate = Candidate::new(dimension, raw)?;
                let (specificity, quality) = best_match(dimension, &accept, &candidate)?;
                (quality > 0.0).then_some((*raw, quality, specificity, index))
            })
            .min_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| b.2.cmp(&a.2))
                    .then_with(|| a.3.cmp(&b.3))
            })
            .map(|(raw, ..)| raw)
    }
}

/// Most specific header entry matching `candidate`, as `(specificity, quality)`.
///
/// The most specific entry decides, so `text/*, text/plain;q=0` refuses
/// `text/plain` while still accepting `text/html`.
fn best_match(dimension: Dimension, accept: &AcceptHeader, candidate: &Candidate) -> Option<(u8, f32)> {
    accept
        .entries
        .iter()
        .filter_map(|entry| {
            dimension
                .specificity(entry, candidate)
                .map(|s| (s, entry.quality, entry.order))
        })
        .max_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
                .then_with(|| b.2.cmp(&a.2))
        })
        .map(|(s, q, _)| (s, q))
}

/// Canonical pattern for an `is()` candidate.
fn expand_type_pattern(candidate: &str) -> Option<String> {
    let candidate = candidate.trim();
    if candidate.starts_with('+') {
        return Some(format!("*/*{}", candidate.to_ascii_lowercase()));
    }
    if candidate.contains('/') {
        return Some(candidate.to_ascii_lowercase());
    }
    mime_table::lookup(candidate).map(str::to_string)
}

pub(crate) fn mime_matches(expected: &str, actual: &str) -> bool {
    let (Some((exp_type, exp_sub)), Some((act_type, act_sub))) =
        (expected.split_once('/'), actual.split_once('/'))
    else {
        return false;
    };

    if exp_type != "*" && exp_type != act_type {
        return false;
    }

    if let Some(suffix) = exp_sub.strip_prefix("*+") {
        return act_sub
            .rsplit_once('+')
            .is_some_and(|(_, act_suffix)| act_suffix == suffix);
    }

    exp_sub == "*" || exp_sub == act_sub
}
