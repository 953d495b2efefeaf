//! # reqlens
//!
//! Request inspection for HTTP servers. Wrap an incoming request once and
//! read derived views of it: query and body input, cookies, route
//! parameters, uploads, and the HTTP rules that are easy to get wrong.
//!
//! ## Quick Start
//!
//! ```rust
//! use reqlens::prelude::*;
//!
//! let raw = RawRequest::builder()
//!     .uri("/products?sort=price")
//!     .header("accept", "application/json, text/html;q=0.9")
//!     .header("if-none-match", "\"v1\"")
//!     .build()
//!     .unwrap();
//! let request = Request::new(raw).unwrap();
//!
//! assert_eq!(request.input("sort").unwrap(), "price");
//! assert_eq!(request.accepts(&["html", "json"]), Some("json"));
//! assert!(request.fresh(&ResponseValidators::new().etag("\"v1\"")));
//! ```
//!
//! ## Optional Features
//!
//! - `tracing` (default) - debug events for recovered malformed input and
//!   warnings for failed upload moves

// Re-export core functionality
pub use reqlens_core::*;

// Re-export commonly used external crates
pub use http;
pub use serde_json;

/// Prelude module - import everything you need with `use reqlens::prelude::*`
pub mod prelude {
    pub use reqlens_core::{
        Connection, ContentNegotiator, CookieJar, Error, FileBag, FileDescriptor, FileError,
        FileErrorKind, FileValidationOptions, FreshnessEvaluator, RawRequest, Request,
        RequestConfig, ResponseValidators, Result, RouteParams, SubdomainParser, TrustProxy,
        UploadedFile,
    };

    pub use serde_json::{json, Map, Value};
}
