//! Request cookies
//!
//! The jar is parsed once from every `Cookie` header line. Values are
//! percent-decoded; the first occurrence of a name wins.

use http::{header, HeaderMap};
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Ordered `name -> value` cookie map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    entries: Vec<(String, String)>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse all `Cookie` header lines of `headers`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut jar = CookieJar::new();
        for line in headers.get_all(header::COOKIE) {
            let Ok(line) = line.to_str() else {
                trace_debug!("ignoring non-ASCII Cookie header");
                continue;
            };
            for cookie in cookie::Cookie::split_parse_encoded(line) {
                match cookie {
                    Ok(cookie) => {
                        if !jar.contains(cookie.name()) {
                            jar.entries
                                .push((cookie.name().to_string(), cookie.value().to_string()));
                        }
                    }
                    Err(_err) => {
                        trace_debug!(error = %_err, "ignoring malformed cookie pair");
                    }
                }
            }
        }
        jar
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == name)
    }

    /// Set a cookie, replacing an existing value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for CookieJar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
