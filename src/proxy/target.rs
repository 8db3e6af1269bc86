//! Request-scoped values shared by the limiter, the dispatcher and the rewriters

use std::fmt;

use axum::http::{HeaderMap, Uri};
use url::Url;

use crate::error::{MirageError, Result};

/// Route that rewritten references point back to
pub const PROXY_PATH: &str = "/proxy";

/// A validated absolute http(s) URL requested through the proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUrl {
    raw: String,
    url: Url,
}

impl TargetUrl {
    /// Parse the `url` query parameter. Empty input counts as missing.
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let raw = match raw.map(str::trim) {
            Some(r) if !r.is_empty() => r,
            _ => return Err(MirageError::MissingUrl),
        };

        let url = Url::parse(raw).map_err(|e| MirageError::InvalidUrl(format!("{}: {}", raw, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(MirageError::InvalidUrl(format!(
                "{}: unsupported scheme {}",
                raw,
                url.scheme()
            )));
        }

        Ok(Self {
            raw: raw.to_string(),
            url,
        })
    }

    /// The value exactly as the client sent it
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The target without its fragment, used for rate-limit keys and logs
    pub fn normalized(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.into()
    }
}

impl fmt::Display for TargetUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// One throttling bucket: a client asking for one normalized target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub client: String,
    pub target: String,
}

impl RateKey {
    pub fn new(client: impl Into<String>, target: &TargetUrl) -> Self {
        Self {
            client: client.into(),
            target: target.normalized(),
        }
    }
}

/// `scheme://host/proxy?url=` for the proxy instance that received the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyBase(String);

impl ProxyBase {
    pub fn new(scheme: &str, host: &str) -> Self {
        Self(format!("{}://{}{}?url=", scheme, host, PROXY_PATH))
    }

    /// Derive the base from the inbound request. `X-Forwarded-Proto` wins over
    /// the URI scheme so that TLS-terminating front ends produce https links.
    /// The result is written into markup unescaped, so header values that are
    /// not a plain scheme or host fall back to the defaults.
    pub fn from_request(headers: &HeaderMap, uri: &Uri) -> Self {
        let scheme = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| v.eq_ignore_ascii_case("http") || v.eq_ignore_ascii_case("https"))
            .or_else(|| uri.scheme_str())
            .unwrap_or("http");

        let host = headers
            .get(axum::http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .filter(|v| is_markup_safe(v))
            .or_else(|| uri.authority().map(|a| a.as_str()))
            .unwrap_or("localhost");

        Self::new(scheme, host)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_markup_safe(value: &str) -> bool {
    !value.is_empty()
        && !value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '<' | '>' | '`'))
}

/// Immutable inputs for rewriting one upstream response
#[derive(Debug, Clone)]
pub struct RewriteContext {
    base: Url,
    proxy_base: ProxyBase,
}

impl RewriteContext {
    pub fn new(target: &TargetUrl, proxy_base: ProxyBase) -> Self {
        Self {
            base: target.url().clone(),
            proxy_base,
        }
    }

    /// Build a context from a bare base URL, mainly for rewriting outside a request
    pub fn from_parts(base: Url, proxy_base: ProxyBase) -> Self {
        Self { base, proxy_base }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn proxy_base(&self) -> &ProxyBase {
        &self.proxy_base
    }
}
