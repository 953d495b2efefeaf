//! Client address resolution
//!
//! Derives the client IP and the forwarded address chain. `X-Forwarded-For`
//! is only consulted when the configured [`TrustProxy`] policy trusts the
//! peer that sent the request; otherwise the socket's remote address is the
//! whole story.

use serde::{Deserialize, Deserializer};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// Which peers are allowed to speak for the client through forwarding headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TrustProxy {
    /// Never trust forwarding headers
    #[default]
    None,
    /// Trust forwarding headers from any peer
    All,
    /// Trust forwarding headers only when the peer address is listed
    Addresses(Vec<IpAddr>),
}

impl TrustProxy {
    /// Whether forwarding headers from `peer` should be believed.
    pub fn trusts(&self, peer: Option<IpAddr>) -> bool {
        match self {
            TrustProxy::None => false,
            TrustProxy::All => true,
            TrustProxy::Addresses(list) => peer.is_some_and(|peer| list.contains(&peer)),
        }
    }
}

impl FromStr for TrustProxy {
    type Err = std::net::AddrParseError;

    /// Parses `true`/`false` or a comma-separated address list.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "false" | "0" | "no" | "none" => Ok(TrustProxy::None),
            "true" | "1" | "yes" | "all" => Ok(TrustProxy::All),
            _ => s
                .split(',')
                .map(|part| part.trim().parse::<IpAddr>())
                .collect::<Result<Vec<_>, _>>()
                .map(TrustProxy::Addresses),
        }
    }
}

impl<'de> Deserialize<'de> for TrustProxy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            List(Vec<IpAddr>),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => Ok(TrustProxy::All),
            Raw::Flag(false) => Ok(TrustProxy::None),
            Raw::List(list) => Ok(TrustProxy::Addresses(list)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Resolves client addresses for one request.
#[derive(Debug, Clone, Copy)]
pub struct AddressResolver<'a> {
    trust: &'a TrustProxy,
}

impl<'a> AddressResolver<'a> {
    /// Resolver that trusts proxies according to `trust`
    pub fn new(trust: &'a TrustProxy) -> Self {
        Self { trust }
    }

    /// Ordered address chain, client first.
    ///
    /// `forwarded_for` holds every `X-Forwarded-For` header line in the
    /// order received. Falls back to the remote address when the peer is
    /// untrusted or the header yields no valid address.
    pub fn ips(&self, remote: Option<IpAddr>, forwarded_for: &[&str]) -> Vec<IpAddr> {
        if self.trust.trusts(remote) {
            let chain: Vec<IpAddr> = forwarded_for
                .iter()
                .flat_map(|line| line.split(','))
                .filter_map(parse_forwarded_entry)
                .collect();
            if !chain.is_empty() {
                return chain;
            }
        }

        remote.into_iter().collect()
    }

    /// Best guess at the client address: the left-most entry of [`ips`](Self::ips).
    pub fn ip(&self, remote: Option<IpAddr>, forwarded_for: &[&str]) -> Option<IpAddr> {
        self.ips(remote, forwarded_for).into_iter().next().or(remote)
    }
}

/// Parses one `X-Forwarded-For` entry, tolerating ports and IPv6 brackets.
fn parse_forwarded_entry(entry: &str) -> Option<IpAddr> {
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }

    let parsed = entry
        .parse::<IpAddr>()
        .ok()
        .or_else(|| entry.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
        .or_else(|| {
            entry
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
                .and_then(|inner| inner.parse::<IpAddr>().ok())
        });

    if parsed.is_none() {
        trace_debug!(entry = %entry, "ignoring malformed X-Forwarded-For entry");
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn localhost() -> Option<IpAddr> {
        Some("127.0.0.1".parse().unwrap())
    }

    #[test]
    fn test_untrusted_uses_remote_address() {
        let trust = TrustProxy::None;
        let resolver = AddressResolver::new(&trust);

        let ips = resolver.ips(localhost(), &["203.0.113.7"]);
        assert_eq!(ips, vec![localhost().unwrap()]);
        assert_eq!(resolver.ip(localhost(), &["203.0.113.7"]), localhost());
    }

    #[test]
    fn test_trusted_chain_is_client_first() {
        let trust = TrustProxy::All;
        let resolver = AddressResolver::new(&trust);

        let ips = resolver.ips(localhost(), &["203.0.113.7, 10.0.0.1", "10.0.0.2"]);
        let expected: Vec<IpAddr> = ["203.0.113.7", "10.0.0.1", "10.0.0.2"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        assert_eq!(ips, expected);
        assert_eq!(resolver.ip(localhost(), &["203.0.113.7, 10.0.0.1"]), Some(expected[0]));
    }

    #[test]
    fn test_malformed_entries_are_filtered() {
        let trust = TrustProxy::All;
        let resolver = AddressResolver::new(&trust);

        let ips = resolver.ips(localhost(), &["unknown, 198.51.100.4:8080, [2001:db8::1], ,"]);
        assert_eq!(
            ips,
            vec![
                "198.51.100.4".parse::<IpAddr>().unwrap(),
                "2001:db8::1".parse::<IpAddr>().unwrap(),
            ]
        );

        let fallback = resolver.ips(localhost(), &["garbage"]);
        assert_eq!(fallback, vec![localhost().unwrap()]);
    }

    #[test]
    fn test_address_allow_list() {
        let trust: TrustProxy = "10.0.0.1, 10.0.0.2".parse().unwrap();
        let resolver = AddressResolver::new(&trust);

        let proxy = Some("10.0.0.1".parse().unwrap());
        assert_eq!(
            resolver.ip(proxy, &["203.0.113.7"]),
            Some("203.0.113.7".parse().unwrap())
        );
        assert_eq!(resolver.ip(localhost(), &["203.0.113.7"]), localhost());
    }

    #[test]
    fn test_no_connection_address() {
        let trust = TrustProxy::None;
        let resolver = AddressResolver::new(&trust);
        assert!(resolver.ips(None, &[]).is_empty());
        assert_eq!(resolver.ip(None, &[]), None);
    }

    #[test]
    fn test_trust_proxy_from_str() {
        assert_eq!("true".parse::<TrustProxy>().unwrap(), TrustProxy::All);
        assert_eq!("false".parse::<TrustProxy>().unwrap(), TrustProxy::None);
        assert!("not-an-ip".parse::<TrustProxy>().is_err());
    }

    #[test]
    fn test_trust_proxy_deserialize() {
        let all: TrustProxy = serde_json::from_str("true").unwrap();
        assert_eq!(all, TrustProxy::All);
        let list: TrustProxy = serde_json::from_str(r#"["10.0.0.1"]"#).unwrap();
        assert_eq!(list, TrustProxy::Addresses(vec!["10.0.0.1".parse().unwrap()]));
        let text: TrustProxy = serde_json::from_str(r#""10.0.0.1,10.0.0.2""#).unwrap();
        assert!(matches!(text, TrustProxy::Addresses(ref v) if v.len() == 2));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_untrusted_is_single_remote(a in any::<u8>(), b in any::<u8>(), header in ".{0,40}") {
            let trust = TrustProxy::None;
            let resolver = AddressResolver::new(&trust);
            let remote = IpAddr::from([10, 0, a, b]);

            let ips = resolver.ips(Some(remote), &[header.as_str()]);
            prop_assert_eq!(ips, vec![remote]);
        }

        #[test]
        fn prop_ip_is_head_of_ips(header in "[0-9., a-z]{0,40}") {
            let trust = TrustProxy::All;
            let resolver = AddressResolver::new(&trust);
            let remote = localhost();

            let ips = resolver.ips(remote, &[header.as_str()]);
            prop_assert_eq!(resolver.ip(remote, &[header.as_str()]), ips.first().copied());
        }
    }
}
