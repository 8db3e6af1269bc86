//! Upstream fetching and content-type dispatch
//!
//! The dispatcher issues a plain GET for the target, then routes the body
//! through the HTML or CSS rewriter or forwards it untouched.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{debug, error, instrument, warn};
use url::Url;

use crate::config::UpstreamConfig;
use crate::error::{MirageError, Result};
use crate::proxy::target::{RewriteContext, TargetUrl};
use crate::rewrite::{rewrite_css, rewrite_html};

/// Sent on every upstream request; inbound headers are never forwarded
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const WASM: &str = "application/wasm";
const OCTET_STREAM: &str = "application/octet-stream";

/// Raw response from the origin
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Network seam between the dispatcher and the origin
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetch `url` with a GET request and buffer the whole body
    async fn get(&self, url: &Url) -> Result<UpstreamResponse>;
}

/// reqwest-backed upstream with its own TLS and timeout settings
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        if config.accept_invalid_certs {
            warn!("Upstream TLS certificate validation is disabled");
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(config.accept_invalid_certs);
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| MirageError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn get(&self, url: &Url) -> Result<UpstreamResponse> {
        let response = self.client.get(url.clone()).send().await?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|e| MirageError::UpstreamFetch(e.to_string()))?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}

/// How a response body is handled, decided by its declared content type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Css,
    Script,
    Wasm,
    Other,
}

impl ContentKind {
    pub fn classify(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return Self::Other;
        };
        let media = content_type.trim().to_ascii_lowercase();

        if media.starts_with("text/html") {
            Self::Html
        } else if media.starts_with("text/css") {
            Self::Css
        } else if media.starts_with("application/javascript") || media.starts_with("text/javascript")
        {
            Self::Script
        } else if media.starts_with(WASM) {
            Self::Wasm
        } else {
            Self::Other
        }
    }
}

/// Response handed back to the transport
#[derive(Debug, Clone)]
pub struct ProxiedResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub body: Bytes,
}

impl IntoResponse for ProxiedResponse {
    fn into_response(self) -> Response {
        let content_type = HeaderValue::from_str(&self.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(OCTET_STREAM));

        (self.status, [(header::CONTENT_TYPE, content_type)], self.body).into_response()
    }
}

/// Fetches targets and applies the rewriter matching their content type
#[derive(Clone)]
pub struct FetchDispatcher {
    upstream: Arc<dyn Upstream>,
}

impl FetchDispatcher {
    pub fn new(upstream: Arc<dyn Upstream>) -> Self {
        Self { upstream }
    }

    /// Fetch `target` and rewrite the body for `ctx`.
    ///
    /// Non-2xx statuses are not errors: the body is handled like any other
    /// and the status is mirrored.
    #[instrument(skip_all, fields(url = %target))]
    pub async fn fetch(&self, target: &TargetUrl, ctx: &RewriteContext) -> Result<ProxiedResponse> {
        let upstream = self.upstream.get(target.url()).await.map_err(|e| {
            error!("Upstream fetch failed: {}", e);
            e
        })?;

        let kind = ContentKind::classify(upstream.content_type.as_deref());
        debug!(status = %upstream.status, ?kind, bytes = upstream.body.len(), "Upstream responded");

        Ok(dispatch(upstream, kind, ctx))
    }
}

fn dispatch(upstream: UpstreamResponse, kind: ContentKind, ctx: &RewriteContext) -> ProxiedResponse {
    let UpstreamResponse {
        status,
        content_type,
        body,
    } = upstream;

    let body = match kind {
        ContentKind::Html => Bytes::from(rewrite_html(&body, ctx)),
        ContentKind::Css => Bytes::from(rewrite_css(&body, ctx)),
        ContentKind::Script | ContentKind::Wasm | ContentKind::Other => body,
    };

    let content_type = match kind {
        ContentKind::Wasm => WASM.to_string(),
        _ => content_type.unwrap_or_else(|| OCTET_STREAM.to_string()),
    };

    ProxiedResponse {
        status,
        content_type,
        body,
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockUpstream;
    use super::*;
    use crate::proxy::target::ProxyBase;
    use crate::rewrite::interceptor_script;

    const PROXY_BASE: &str = "http://localhost:3000/proxy?url=";

    fn setup(upstream: MockUpstream) -> (Arc<MockUpstream>, FetchDispatcher, TargetUrl, RewriteContext) {
        let upstream = Arc::new(upstream);
        let dispatcher = FetchDispatcher::new(upstream.clone());
        let target = TargetUrl::parse(Some("https://example.com/dir/index.html#frag")).unwrap();
        let ctx = RewriteContext::new(&target, ProxyBase::new("http", "localhost:3000"));
        (upstream, dispatcher, target, ctx)
    }

    #[test]
    fn test_classify_content_types() {
        assert_eq!(ContentKind::classify(Some("text/html; charset=utf-8")), ContentKind::Html);
        assert_eq!(ContentKind::classify(Some("TEXT/HTML")), ContentKind::Html);
        assert_eq!(ContentKind::classify(Some("text/css")), ContentKind::Css);
        assert_eq!(
            ContentKind::classify(Some("application/javascript; charset=utf-8")),
            ContentKind::Script
        );
        assert_eq!(ContentKind::classify(Some("text/javascript")), ContentKind::Script);
        assert_eq!(ContentKind::classify(Some("application/wasm")), ContentKind::Wasm);
        assert_eq!(ContentKind::classify(Some("image/png")), ContentKind::Other);
        assert_eq!(ContentKind::classify(None), ContentKind::Other);
    }

    #[tokio::test]
    async fn test_html_is_rewritten_and_injected() {
        let (upstream, dispatcher, target, ctx) = setup(MockUpstream::ok(
            StatusCode::OK,
            Some("text/html; charset=utf-8"),
            r#"<html><body><a href="/page">p</a></body></html>"#,
        ));

        let response = dispatcher.fetch(&target, &ctx).await.unwrap();
        let body = String::from_utf8(response.body.to_vec()).unwrap();

        assert_eq!(upstream.calls(), 1);
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type, "text/html; charset=utf-8");
        assert!(body.contains(&format!(r#"href="{PROXY_BASE}https%3A%2F%2Fexample.com%2Fpage""#)));
        assert!(body.contains(&format!("{}</body>", interceptor_script())));
    }

    #[tokio::test]
    async fn test_css_is_rewritten() {
        let (_, dispatcher, target, ctx) = setup(MockUpstream::ok(
            StatusCode::OK,
            Some("text/css"),
            "a { background: url(img/x.png) }",
        ));

        let response = dispatcher.fetch(&target, &ctx).await.unwrap();
        assert_eq!(
            response.body,
            Bytes::from(format!(
                "a {{ background: url(\"{PROXY_BASE}https%3A%2F%2Fexample.com%2Fdir%2Fimg%2Fx.png\") }}"
            ))
        );
        assert_eq!(response.content_type, "text/css");
    }

    #[tokio::test]
    async fn test_script_is_forwarded_verbatim() {
        let script = r#"fetch("https://api.example.com/data"); var s = 'src="/x"';"#;
        let (_, dispatcher, target, ctx) = setup(MockUpstream::ok(
            StatusCode::OK,
            Some("application/javascript"),
            script,
        ));

        let response = dispatcher.fetch(&target, &ctx).await.unwrap();
        assert_eq!(response.body, Bytes::from(script));
        assert_eq!(response.content_type, "application/javascript");
    }

    #[tokio::test]
    async fn test_wasm_is_forwarded_byte_identical() {
        let payload: Vec<u8> = vec![0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, 0xff, 0xfe];
        let (_, dispatcher, target, ctx) = setup(MockUpstream::ok(
            StatusCode::OK,
            Some("application/wasm"),
            payload.clone(),
        ));

        let response = dispatcher.fetch(&target, &ctx).await.unwrap();
        assert_eq!(response.body.as_ref(), payload.as_slice());
        assert_eq!(response.content_type, "application/wasm");
    }

    #[tokio::test]
    async fn test_binary_passthrough_defaults_content_type() {
        let payload: Vec<u8> = vec![0x89, 0x50, 0x4e, 0x47, 0xc3, 0x28];
        let (_, dispatcher, target, ctx) =
            setup(MockUpstream::ok(StatusCode::OK, None, payload.clone()));

        let response = dispatcher.fetch(&target, &ctx).await.unwrap();
        assert_eq!(response.body.as_ref(), payload.as_slice());
        assert_eq!(response.content_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn test_error_status_is_mirrored_and_rewritten() {
        let (_, dispatcher, target, ctx) = setup(MockUpstream::ok(
            StatusCode::NOT_FOUND,
            Some("text/html"),
            r#"<a href="/home">home</a>"#,
        ));

        let response = dispatcher.fetch(&target, &ctx).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(String::from_utf8_lossy(&response.body).contains(PROXY_BASE));
    }

    #[tokio::test]
    async fn test_upstream_failure_surfaces_reason() {
        let (upstream, dispatcher, target, ctx) = setup(MockUpstream::failing("connection refused"));

        let err = dispatcher.fetch(&target, &ctx).await.unwrap_err();
        assert_eq!(upstream.calls(), 1);
        assert_eq!(err.to_string(), "Failed to fetch: connection refused");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_http_upstream_builds_with_and_without_timeout() {
        assert!(HttpUpstream::new(&UpstreamConfig::default()).is_ok());
        assert!(HttpUpstream::new(&UpstreamConfig {
            timeout_secs: 0,
            accept_invalid_certs: false,
        })
        .is_ok());
    }

    #[tokio::test]
    async fn test_latin1_html_keeps_bytes_and_charset() {
        let (_, dispatcher, target, ctx) = setup(MockUpstream::ok(
            StatusCode::OK,
            Some("text/html; charset=iso-8859-1"),
            &b"<p>caf\xe9</p><a href=\"/x\">x</a>"[..],
        ));

        let response = dispatcher.fetch(&target, &ctx).await.unwrap();
        assert_eq!(response.content_type, "text/html; charset=iso-8859-1");
        assert!(response.body.starts_with(b"<p>caf\xe9</p><a href=\""));
        assert!(response.body.ends_with(b"%2Fx\">x</a>"));
    }

    #[tokio::test]
    async fn test_refused_connection_is_a_fetch_error() {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let upstream = HttpUpstream::new(&UpstreamConfig {
            timeout_secs: 5,
            accept_invalid_certs: false,
        })
        .unwrap();
        let dispatcher = FetchDispatcher::new(Arc::new(upstream));
        let target = TargetUrl::parse(Some(&format!("http://{addr}/"))).unwrap();
        let ctx = RewriteContext::new(&target, ProxyBase::new("http", "localhost:3000"));

        let err = dispatcher.fetch(&target, &ctx).await.unwrap_err();
        assert!(matches!(err, MirageError::UpstreamFetch(_)));
        assert!(err.to_string().starts_with("Failed to fetch: "));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
