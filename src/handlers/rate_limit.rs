use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::warn;

use crate::metrics::RATE_LIMITED_TOTAL;
use crate::state::AppState;

// Peer address from the listener; requests without one share a single bucket
fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

// Fail fast with 429 when the client used up its window
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request);

    if !state.ingress.is_allowed(&ip) {
        RATE_LIMITED_TOTAL.inc();
        let retry_after = state
            .ingress
            .retry_after(&ip)
            .map(|wait| wait.as_secs_f64().ceil() as u64)
            .unwrap_or(1)
            .max(1);
        warn!(%ip, retry_after, "ingress rate limit exceeded");

        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after.to_string())],
            Json(serde_json::json!({ "detail": "Too many requests" })),
        )
            .into_response();
    }

    next.run(request).await
}
