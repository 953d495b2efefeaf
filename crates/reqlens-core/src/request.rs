//! The request facade
//!
//! [`Request`] wraps a [`RawRequest`] and derives structured views of it on
//! demand. Query, body, cookie, route-parameter and file views are computed
//! on first access and cached for the lifetime of the facade. Caching is
//! first-read-wins: re-injecting a store after its view was read does not
//! change what the facade returns.
//!
//! Body, route parameters and uploads come from upstream collaborators (a
//! body parser, a router, a multipart parser) through [`Request::set_body`],
//! [`Request::set_params`] and [`Request::set_files`]. Until injected they
//! read as empty.
//!
//! # Example
//!
//! ```rust
//! use reqlens_core::{RawRequest, Request};
//!
//! let raw = RawRequest::builder()
//!     .uri("/posts?page=2")
//!     .header("x-requested-with", "XMLHttpRequest")
//!     .build()
//!     .unwrap();
//! let request = Request::new(raw).unwrap();
//!
//! assert_eq!(request.url(), "/posts");
//! assert_eq!(request.input("page").unwrap(), "2");
//! assert!(request.ajax());
//! ```

use crate::address::AddressResolver;
use crate::config::RequestConfig;
use crate::cookies::CookieJar;
use crate::error::{Error, Result};
use crate::file::{FileBag, UploadedFile};
use crate::freshness::{FreshnessEvaluator, ResponseValidators};
use crate::negotiate::ContentNegotiator;
use crate::params::RouteParams;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method, Uri};
use serde_json::{Map, Value};
use std::net::{IpAddr, SocketAddr};
use std::sync::OnceLock;

/// Transport facts about the connection a request arrived on.
///
/// Servers put one into the `http::Request` extensions so that
/// `RawRequest::from` can pick it up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Connection {
    /// Peer socket address
    pub remote_addr: Option<SocketAddr>,
    /// Whether the transport is TLS
    pub encrypted: bool,
}

impl Connection {
    /// A plain-text connection from `remote_addr`
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr: Some(remote_addr),
            encrypted: false,
        }
    }

    /// Mark the transport as TLS
    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }
}

/// An incoming request before any derivation.
///
/// Header map and connection default to empty, so a bare URL is a valid
/// raw request.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: Method,
    /// Path and query, or an absolute URL
    pub target: String,
    pub headers: HeaderMap,
    pub connection: Option<Connection>,
}

impl RawRequest {
    /// Start building a raw request
    pub fn builder() -> RawRequestBuilder {
        RawRequestBuilder::default()
    }

    /// A GET for `target` with no headers and no connection.
    pub fn from_url(target: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            target: target.into(),
            headers: HeaderMap::new(),
            connection: None,
        }
    }
}

impl<B> From<http::Request<B>> for RawRequest {
    fn from(req: http::Request<B>) -> Self {
        let (parts, _body) = req.into_parts();
        let connection = parts.extensions.get::<Connection>().copied();
        let target = match parts.uri.path_and_query() {
            Some(pq) if parts.uri.authority().is_none() => pq.as_str().to_string(),
            _ => parts.uri.to_string(),
        };
        Self {
            method: parts.method,
            target,
            headers: parts.headers,
            connection,
        }
    }
}

/// Builder for [`RawRequest`].
#[derive(Debug, Default)]
pub struct RawRequestBuilder {
    method: Option<String>,
    target: String,
    headers: HeaderMap,
    connection: Option<Connection>,
}

impl RawRequestBuilder {
    /// Method token, case-insensitive. Defaults to GET.
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Request target, origin-form or absolute
    pub fn uri(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Append a header line. Invalid names or values are skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => {
                trace_debug!(header = %name, "skipping invalid header");
            }
        }
        self
    }

    /// Attach the transport descriptor
    pub fn connection(mut self, connection: Connection) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Fails only on an invalid method token
    pub fn build(self) -> Result<RawRequest> {
        let method = match self.method {
            Some(token) => parse_method(&token)?,
            None => Method::GET,
        };
        Ok(RawRequest {
            method,
            target: self.target,
            headers: self.headers,
            connection: self.connection,
        })
    }
}

fn parse_method(token: &str) -> Result<Method> {
    Method::from_bytes(token.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| Error::InvalidMethod(token.to_string()))
}

/// Read-side facade over one incoming request.
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    connection: Connection,
    config: RequestConfig,

    body_store: Option<Map<String, Value>>,
    params_store: Option<RouteParams>,
    files_store: Option<FileBag>,

    query: OnceLock<Map<String, Value>>,
    body: OnceLock<Map<String, Value>>,
    cookies: OnceLock<CookieJar>,
    cookies_owned: Option<CookieJar>,
    params: OnceLock<RouteParams>,
    files: OnceLock<FileBag>,
}

impl Request {
    /// Wrap `raw` with the default configuration.
    pub fn new(raw: RawRequest) -> Result<Self> {
        Self::with_config(raw, RequestConfig::default())
    }

    /// Wrap `raw`. Fails only when the target cannot be parsed.
    pub fn with_config(raw: RawRequest, config: RequestConfig) -> Result<Self> {
        let target = raw.target.trim();
        if target.is_empty() {
            return Err(Error::EmptyTarget);
        }
        let uri = target.parse::<Uri>().map_err(|source| Error::InvalidTarget {
            target: target.to_string(),
            source,
        })?;

        let method = if raw.method.as_str().bytes().any(|b| b.is_ascii_lowercase()) {
            parse_method(raw.method.as_str())?
        } else {
            raw.method
        };

        Ok(Self {
            method,
            uri,
            headers: raw.headers,
            connection: raw.connection.unwrap_or_default(),
            config,
            body_store: None,
            params_store: None,
            files_store: None,
            query: OnceLock::new(),
            body: OnceLock::new(),
            cookies: OnceLock::new(),
            cookies_owned: None,
            params: OnceLock::new(),
            files: OnceLock::new(),
        })
    }

    // --- injection -------------------------------------------------------

    /// Hand over the parsed body. Ignored once `post()` has been read.
    pub fn set_body(&mut self, body: Map<String, Value>) {
        self.body_store = Some(body);
    }

    /// Hand over the router's captures. Ignored once `params()` has been read.
    pub fn set_params(&mut self, params: RouteParams) {
        self.params_store = Some(params);
    }

    /// Hand over parsed uploads. Ignored once files have been read.
    pub fn set_files(&mut self, files: FileBag) {
        self.files_store = Some(files);
    }

    /// Settings this request was wrapped with
    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    /// Parsed request target
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Transport descriptor, empty when none was supplied
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    // --- input -----------------------------------------------------------

    /// Query string as a map.
    ///
    /// Repeated keys overwrite, except `key[]` which collects into an array
    /// under `key`.
    pub fn get(&self) -> &Map<String, Value> {
        self.query
            .get_or_init(|| parse_query(self.uri.query().unwrap_or("")))
    }

    /// Parsed body, `{}` when none was injected.
    pub fn post(&self) -> &Map<String, Value> {
        self.body
            .get_or_init(|| self.body_store.clone().unwrap_or_default())
    }

    /// Query merged with body; body wins on collision.
    pub fn all(&self) -> Map<String, Value> {
        let mut merged = self.get().clone();
        for (key, value) in self.post() {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    /// A value from [`all`](Self::all). Dotted keys reach into nested
    /// objects and arrays (`user.emails.0`).
    pub fn input(&self, key: &str) -> Option<Value> {
        self.lookup(key).cloned()
    }

    /// Body first, then query, without building the merged map.
    fn lookup(&self, key: &str) -> Option<&Value> {
        let top = move |name: &str| self.post().get(name).or_else(|| self.get().get(name));
        if let Some(value) = top(key) {
            return Some(value);
        }

        let mut segments = key.split('.');
        let mut current = top(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// [`input`](Self::input) with a fallback.
    pub fn input_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.input(key).unwrap_or_else(|| default.into())
    }

    /// Entries of [`all`](Self::all) whose key is listed.
    pub fn only(&self, keys: &[&str]) -> Map<String, Value> {
        self.merged_where(|key| keys.contains(&key))
    }

    /// Entries of [`all`](Self::all) whose key is not listed.
    pub fn except(&self, keys: &[&str]) -> Map<String, Value> {
        self.merged_where(|key| !keys.contains(&key))
    }

    /// Whether [`input`](Self::input) would find `key`.
    pub fn has(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// [`all`](Self::all) restricted to keys passing `keep`, cloning only those.
    fn merged_where(&self, keep: impl Fn(&str) -> bool) -> Map<String, Value> {
        let mut merged = Map::new();
        for (key, value) in self.get().iter().chain(self.post()) {
            if keep(key.as_str()) {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    // --- headers ---------------------------------------------------------

    /// All headers; names are lower-case
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header; `None` when absent or not visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every value of a header, in the order received.
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    // --- cookies ---------------------------------------------------------

    /// Cookies sent with the request, parsed once.
    pub fn cookies(&self) -> &CookieJar {
        match &self.cookies_owned {
            Some(jar) => jar,
            None => self
                .cookies
                .get_or_init(|| CookieJar::from_headers(&self.headers)),
        }
    }

    /// The cached jar, for in-place edits visible to later `cookies()` calls.
    pub fn cookies_mut(&mut self) -> &mut CookieJar {
        let headers = &self.headers;
        let cached = &mut self.cookies;
        self.cookies_owned
            .get_or_insert_with(|| cached.take().unwrap_or_else(|| CookieJar::from_headers(headers)))
    }

    /// One cookie value from [`cookies`](Self::cookies)
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies().get(name)
    }

    // --- params & files --------------------------------------------------

    /// Route captures, empty until a router injects them
    pub fn params(&self) -> &RouteParams {
        self.params
            .get_or_init(|| self.params_store.clone().unwrap_or_default())
    }

    /// One route capture
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params().get(name)
    }

    fn file_bag(&self) -> &FileBag {
        self.files
            .get_or_init(|| self.files_store.clone().unwrap_or_default())
    }

    fn wrap_file(&self, descriptor: &crate::file::FileDescriptor) -> UploadedFile {
        let mut file = UploadedFile::new(descriptor.clone());
        let defaults = self.config.file_options();
        if !defaults.is_empty() {
            file.set_validation_options(&defaults);
        }
        file
    }

    /// Every upload, field order then part order.
    pub fn files(&self) -> Vec<UploadedFile> {
        self.file_bag().iter().map(|d| self.wrap_file(d)).collect()
    }

    /// The first upload for `field`, or an absent view.
    pub fn file(&self, field: &str) -> UploadedFile {
        match self.file_bag().get(field).first() {
            Some(descriptor) => self.wrap_file(descriptor),
            None => UploadedFile::absent(field),
        }
    }

    /// Every upload for a multi-file `field`.
    pub fn file_all(&self, field: &str) -> Vec<UploadedFile> {
        self.file_bag()
            .get(field)
            .iter()
            .map(|d| self.wrap_file(d))
            .collect()
    }

    // --- url & transport -------------------------------------------------

    /// Path without the query string.
    pub fn url(&self) -> &str {
        match self.uri.path() {
            "" => "/",
            path => path,
        }
    }

    /// Path and query string as received.
    pub fn original_url(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .filter(|pq| !pq.is_empty())
            .unwrap_or("/")
    }

    /// Upper-case method token.
    pub fn method(&self) -> &str {
        self.method.as_str()
    }

    /// Peer socket address
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.connection.remote_addr
    }

    fn trusts_proxy(&self) -> bool {
        self.config
            .trust_proxy
            .trusts(self.connection.remote_addr.map(|addr| addr.ip()))
    }

    /// First comma-separated entry of a proxy header, when the proxy is trusted.
    fn forwarded(&self, name: HeaderName) -> Option<&str> {
        if !self.trusts_proxy() {
            return None;
        }
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// TLS connection, or `X-Forwarded-Proto: https` from a trusted proxy.
    pub fn secure(&self) -> bool {
        self.connection.encrypted
            || self
                .forwarded(HeaderName::from_static("x-forwarded-proto"))
                .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
    }

    /// `https` or `http`, following [`secure`](Self::secure)
    pub fn protocol(&self) -> &'static str {
        if self.secure() {
            "https"
        } else {
            "http"
        }
    }

    /// `X-Requested-With: XMLHttpRequest`, any case
    pub fn ajax(&self) -> bool {
        self.header("x-requested-with")
            .is_some_and(|v| v.eq_ignore_ascii_case("xmlhttprequest"))
    }

    /// `X-PJAX` carries a value
    pub fn pjax(&self) -> bool {
        self.header("x-pjax").is_some_and(|v| !v.trim().is_empty())
    }

    /// Host without port. IPv6 literals keep their brackets.
    ///
    /// A trusted `X-Forwarded-Host` wins, then the authority of an
    /// absolute-form target, then the `Host` header.
    pub fn hostname(&self) -> Option<&str> {
        let host = self
            .forwarded(HeaderName::from_static("x-forwarded-host"))
            .or_else(|| self.uri.host())
            .or_else(|| self.header(header::HOST.as_str()))?;
        Some(strip_port(host.trim())).filter(|h| !h.is_empty())
    }

    /// Labels in front of the base domain.
    pub fn subdomains(&self) -> Vec<String> {
        self.config.subdomain_parser().parse(self.hostname())
    }

    // --- negotiation -----------------------------------------------------

    fn negotiator(&self) -> ContentNegotiator<'_> {
        ContentNegotiator::new(&self.headers)
    }

    /// The candidate matching the request `Content-Type`.
    pub fn is<'c>(&self, types: &[&'c str]) -> Option<&'c str> {
        self.negotiator().content_type_is(types)
    }

    /// Best media type for `Accept`; the first candidate without one
    pub fn accepts<'c>(&self, types: &[&'c str]) -> Option<&'c str> {
        self.negotiator().accepts(types)
    }

    /// Acceptable media types, most preferred first
    pub fn types(&self) -> Vec<String> {
        self.negotiator().types()
    }

    /// Best language for `Accept-Language`
    pub fn language<'c>(&self, languages: &[&'c str]) -> Option<&'c str> {
        self.negotiator().language(languages)
    }

    pub fn languages(&self) -> Vec<String> {
        self.negotiator().languages()
    }

    /// Best charset for `Accept-Charset`
    pub fn charset<'c>(&self, charsets: &[&'c str]) -> Option<&'c str> {
        self.negotiator().charset(charsets)
    }

    pub fn charsets(&self) -> Vec<String> {
        self.negotiator().charsets()
    }

    /// Best content coding for `Accept-Encoding`
    pub fn encoding<'c>(&self, encodings: &[&'c str]) -> Option<&'c str> {
        self.negotiator().encoding(encodings)
    }

    pub fn encodings(&self) -> Vec<String> {
        self.negotiator().encodings()
    }

    // --- freshness -------------------------------------------------------

    /// Whether the client's cached copy matches `validators`.
    pub fn fresh(&self, validators: &ResponseValidators) -> bool {
        FreshnessEvaluator::new(&self.method, &self.headers).is_fresh(validators)
    }

    /// Exactly `!fresh`
    pub fn stale(&self, validators: &ResponseValidators) -> bool {
        !self.fresh(validators)
    }

    // --- addresses -------------------------------------------------------

    /// Client address chain, client first.
    pub fn ips(&self) -> Vec<IpAddr> {
        let forwarded_for = self.header_all("x-forwarded-for");
        AddressResolver::new(&self.config.trust_proxy)
            .ips(self.connection.remote_addr.map(|a| a.ip()), &forwarded_for)
    }

    /// Best guess at the client address.
    pub fn ip(&self) -> Option<IpAddr> {
        let forwarded_for = self.header_all("x-forwarded-for");
        AddressResolver::new(&self.config.trust_proxy)
            .ip(self.connection.remote_addr.map(|a| a.ip()), &forwarded_for)
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("connection", &self.connection)
            .finish()
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    host.split(':').next().unwrap_or(host)
}

fn parse_query(query: &str) -> Map<String, Value> {
    let mut map = Map::new();
    if query.is_empty() {
        return map;
    }

    let pairs: Vec<(String, String)> = match serde_urlencoded::from_str(query) {
        Ok(pairs) => pairs,
        Err(_err) => {
            trace_debug!(error = %_err, "ignoring undecodable query string");
            return map;
        }
    };

    for (key, value) in pairs {
        match key.strip_suffix("[]") {
            Some(base) => match map
                .entry(base.to_string())
                .or_insert_with(|| Value::Array(Vec::new()))
            {
                Value::Array(items) => items.push(Value::String(value)),
                other => *other = Value::Array(vec![other.take(), Value::String(value)]),
            },
            None => {
                map.insert(key, Value::String(value));
            }
        }
    }
    map
}
