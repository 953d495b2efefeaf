//! Hostname to subdomain decomposition

use std::net::IpAddr;

/// Number of trailing labels that make up the base domain by default
pub const DEFAULT_SUBDOMAIN_OFFSET: usize = 2;

/// Splits a hostname into the labels in front of its base domain.
///
/// `offset` is the number of trailing labels treated as the registrable
/// domain (2 for `abc.com`, 3 for `abc.co.uk`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubdomainParser {
    offset: usize,
}

impl Default for SubdomainParser {
    fn default() -> Self {
        Self::new(DEFAULT_SUBDOMAIN_OFFSET)
    }
}

impl SubdomainParser {
    /// Parser that drops `offset` right-most labels as the base domain
    pub fn new(offset: usize) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Subdomain labels, most specific first.
    ///
    /// ```
    /// use reqlens_core::SubdomainParser;
    ///
    /// let parser = SubdomainParser::default();
    /// assert_eq!(parser.parse(Some("virk.abc.com")), vec!["virk"]);
    /// assert!(parser.parse(Some("abc.com")).is_empty());
    /// ```
    pub fn parse(&self, hostname: Option<&str>) -> Vec<String> {
        let Some(hostname) = hostname.map(str::trim).filter(|h| !h.is_empty()) else {
            return Vec::new();
        };

        if is_ip_literal(hostname) {
            return Vec::new();
        }

        let hostname = hostname.trim_end_matches('.').to_ascii_lowercase();
        let hostname = hostname.strip_prefix("www.").unwrap_or(&hostname);

        let labels: Vec<&str> = hostname.split('.').collect();
        if labels.iter().any(|label| label.is_empty()) {
            return Vec::new();
        }

        let keep = labels.len().saturating_sub(self.offset);
        labels[..keep].iter().map(|label| label.to_string()).collect()
    }
}

fn is_ip_literal(hostname: &str) -> bool {
    let bare = hostname
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(hostname);
    bare.parse::<IpAddr>().is_ok()
}
