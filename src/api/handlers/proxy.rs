//! `GET /proxy?url=<absolute-url>`

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, Uri};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::api::server::AppState;
use crate::error::MirageError;
use crate::proxy::{ProxiedResponse, ProxyBase, RateKey, RewriteContext, TargetUrl};

/// Query parameters for the proxy route
#[derive(Debug, Deserialize, Default)]
pub struct ProxyQuery {
    pub url: Option<String>,
}

/// Fetch the requested target and return it rewritten for this proxy
#[instrument(skip_all)]
pub async fn proxy(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<ProxyQuery>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<ProxiedResponse, MirageError> {
    let target = TargetUrl::parse(query.url.as_deref()).inspect_err(|e| {
        if let MirageError::InvalidUrl(reason) = e {
            debug!(client = %addr.ip(), reason = %reason, "Rejected target url");
        }
    })?;

    if state.log_requests {
        info!(
            client = %addr.ip(),
            raw = target.raw(),
            normalized = %target.normalized(),
            "Proxying request"
        );
    }

    state
        .rate_limiter
        .check(&RateKey::new(addr.ip().to_string(), &target))?;

    let ctx = RewriteContext::new(&target, ProxyBase::from_request(&headers, &uri));
    state.dispatcher.fetch(&target, &ctx).await
}
