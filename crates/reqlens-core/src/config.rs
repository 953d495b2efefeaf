//! Per-application request settings
//!
//! Settings can be built in code or loaded from `REQLENS_*` environment
//! variables:
//!
//! | variable | field |
//! |----------|-------|
//! | `REQLENS_TRUST_PROXY` | `true`, `false` or a comma-separated address list |
//! | `REQLENS_SUBDOMAIN_OFFSET` | base-domain label count |
//! | `REQLENS_MAX_FILE_SIZE` | upload byte ceiling |
//! | `REQLENS_ALLOWED_EXTNAMES` | comma-separated extension allow-list |
//!
//! # Example
//!
//! ```ignore
//! use reqlens_core::RequestConfig;
//!
//! let config = RequestConfig::from_env_with_dotenv()?;
//! let request = Request::with_config(raw, config)?;
//! ```

use crate::address::TrustProxy;
use crate::error::Result;
use crate::file::FileValidationOptions;
use crate::subdomain::{SubdomainParser, DEFAULT_SUBDOMAIN_OFFSET};
use serde::Deserialize;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "REQLENS_";

/// Settings consumed by the request facade.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Who may set forwarding headers
    pub trust_proxy: TrustProxy,
    /// Trailing hostname labels that form the base domain
    pub subdomain_offset: usize,
    /// Default byte ceiling for uploads
    pub max_file_size: Option<u64>,
    /// Default extension allow-list for uploads
    pub allowed_extnames: Option<Vec<String>>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            trust_proxy: TrustProxy::None,
            subdomain_offset: DEFAULT_SUBDOMAIN_OFFSET,
            max_file_size: None,
            allowed_extnames: None,
        }
    }
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trust_proxy(mut self, trust: TrustProxy) -> Self {
        self.trust_proxy = trust;
        self
    }

    pub fn subdomain_offset(mut self, offset: usize) -> Self {
        self.subdomain_offset = offset;
        self
    }

    /// Apply `options` as the default constraints for every upload.
    pub fn file_validation(mut self, options: FileValidationOptions) -> Self {
        self.max_file_size = options.size;
        self.allowed_extnames = options.extnames;
        self
    }

    /// Upload constraints as [`FileValidationOptions`]
    pub fn file_options(&self) -> FileValidationOptions {
        FileValidationOptions {
            size: self.max_file_size,
            extnames: self.allowed_extnames.clone(),
        }
    }

    pub fn subdomain_parser(&self) -> SubdomainParser {
        SubdomainParser::new(self.subdomain_offset)
    }

    /// Load from `REQLENS_*` environment variables; unset ones keep defaults.
    pub fn from_env() -> Result<Self> {
        let config = envy::prefixed(ENV_PREFIX).from_env::<Self>()?;
        trace_debug!(
            trust_proxy = ?config.trust_proxy,
            subdomain_offset = config.subdomain_offset,
            "loaded request config from environment"
        );
        Ok(config)
    }

    /// Load `.env` if present, then [`from_env`](Self::from_env).
    pub fn from_env_with_dotenv() -> Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                trace_warn!(error = %err, "failed to load .env file");
            }
        }
        Self::from_env()
    }

    /// Deserialize from an explicit variable list (`REQLENS_`-prefixed keys).
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::prefixed(ENV_PREFIX).from_iter(vars)?)
    }
}
