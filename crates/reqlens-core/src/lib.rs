//! # reqlens core
//!
//! A read-side facade over one incoming HTTP request, plus the protocol
//! rules behind it: conditional-GET freshness, content negotiation,
//! client-IP resolution through proxies, subdomain decomposition and
//! upload validation.
//!
//! This crate is not meant to be used directly. Use `reqlens` instead.

#[macro_use]
mod tracing_macros;

mod address;
mod config;
mod cookies;
mod error;
mod file;
mod freshness;
pub mod mime_table;
mod negotiate;
mod params;
mod request;
mod subdomain;

// Public API
pub use address::{AddressResolver, TrustProxy};
pub use config::{RequestConfig, ENV_PREFIX};
pub use cookies::CookieJar;
pub use error::{Error, Result};
pub use file::{
    FileBag, FileDescriptor, FileError, FileErrorKind, FileStatus, FileValidationOptions,
    UploadedFile,
};
pub use freshness::{format_http_date, parse_http_date, FreshnessEvaluator, ResponseValidators};
pub use negotiate::{AcceptEntry, AcceptHeader, ContentNegotiator};
pub use params::{RouteParams, STACK_PARAMS_CAPACITY};
pub use request::{Connection, RawRequest, RawRequestBuilder, Request};
pub use subdomain::{SubdomainParser, DEFAULT_SUBDOMAIN_OFFSET};
