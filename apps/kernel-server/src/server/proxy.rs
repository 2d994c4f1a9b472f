// apps/kernel-server/src/server/proxy.rs
// Purpose: Reverse-proxies /trigger, /simulate/*, /mcp/tools to the external
// orchestration collaborator, stripping any upstream CORS headers so the
// browser observes only this gateway's CORS policy (spec.md §4.10, §6).
// Architecture: API layer
// Dependencies: reqwest

use axum::{
    body::Bytes,
    extract::{OriginalUri, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::server::auth::AuthorizedRequest;
use crate::server::AppState;

const STRIPPED_RESPONSE_HEADERS: &[&str] = &[
    "access-control-allow-origin",
    "access-control-allow-methods",
    "access-control-allow-headers",
    "access-control-allow-credentials",
    "access-control-expose-headers",
    "access-control-max-age",
];

pub async fn proxy_to_orchestrator(
    _auth: AuthorizedRequest,
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    method: axum::http::Method,
    body: Bytes,
) -> Response {
    let target = format!(
        "{}{}",
        state.config.external_orchestration_base_url.trim_end_matches('/'),
        uri.path_and_query().map(|p| p.as_str()).unwrap_or("")
    );

    let method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .unwrap_or(reqwest::Method::GET);

    let upstream = state
        .http_client
        .request(method, &target)
        .body(body)
        .send()
        .await;

    let upstream = match upstream {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("orchestration proxy failed: {}", e);
            return (
                StatusCode::BAD_GATEWAY,
                format!("upstream unavailable: {}", e),
            )
                .into_response();
        }
    };

    // reqwest 0.11 carries its own http 0.2 StatusCode, distinct from the
    // axum/http 1.0 type this handler returns; normalize through the integer.
    let status = StatusCode::from_u16(upstream.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    let mut headers = HeaderMap::new();
    for (name, value) in upstream.headers() {
        if STRIPPED_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        let name = HeaderName::from_bytes(name.as_str().as_bytes());
        let value = HeaderValue::from_bytes(value.as_bytes());
        if let (Ok(name), Ok(value)) = (name, value) {
            headers.insert(name, value);
        }
    }

    let body = upstream.bytes().await.unwrap_or_default();
    (status, headers, body).into_response()
}
