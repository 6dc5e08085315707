use crate::auth::AuthUser;
use crate::error::ServerError;
use crate::state::ServerState;
use crate::telemetry::record_http_request;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use std::sync::Arc;

/// Bearer token authentication middleware.
///
/// Verifies the token, confirms the user still exists and inserts an
/// [`AuthUser`] for handlers.
pub async fn require_auth(
    State(state): State<Arc<ServerState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ServerError::Authentication(
                "Token required. Provide it in 'Authorization: Bearer <token>' header".to_string(),
            )
        })?;

    let claims = state.tokens.verify(token)?;
    let user = state
        .users
        .find_by_id(&claims.id)
        .await?
        .ok_or_else(|| ServerError::Authentication("User does not exist".to_string()))?;

    request.extensions_mut().insert(AuthUser {
        id: user.id,
        username: user.username,
    });
    Ok(next.run(request).await)
}

/// Identify the client for rate limiting.
///
/// The peer address, unless `trust_forwarded_for` is set and the request
/// carries an `X-Forwarded-For` header, in which case its first entry.
/// `anonymous` when neither is known.
pub fn client_key(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    let forwarded = trust_forwarded_for
        .then(|| headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    match (forwarded, peer) {
        (Some(forwarded), _) => forwarded.to_string(),
        (None, Some(peer)) => peer.ip().to_string(),
        (None, None) => "anonymous".to_string(),
    }
}

/// Fixed-window rate limiting middleware.
pub async fn rate_limit(
    State(state): State<Arc<ServerState>>,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(request.headers(), peer, state.config.trust_forwarded_for);
    if !state.check_rate_limit(&key) {
        tracing::debug!(client = %key, "rate limit exceeded");
        return Err(ServerError::RateLimitExceeded);
    }
    Ok(next.run(request).await)
}

/// Request ID injection middleware
pub async fn request_id(mut request: Request, next: Next) -> Response {
    // Generate or extract request ID
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    // Add to request extensions for handlers to access
    request.extensions_mut().insert(request_id.clone());

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }

    response
}

/// Logging middleware
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    // Get request ID if available
    let request_id = request
        .extensions()
        .get::<String>()
        .cloned()
        .unwrap_or_default();

    tracing::info!(
        method = %method,
        uri = %uri,
        request_id = %request_id,
        "Request started"
    );

    let response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        request_id = %request_id,
        "Request completed"
    );
    record_http_request(method.as_str(), status.as_u16(), duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_key_prefers_peer_address() {
        let peer: SocketAddr = "192.0.2.10:51234".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers, None, false), "anonymous");
        assert_eq!(client_key(&headers, Some(peer), false), "192.0.2.10");

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        assert_eq!(client_key(&headers, Some(peer), false), "192.0.2.10");
        assert_eq!(client_key(&headers, None, false), "anonymous");
    }

    #[test]
    fn client_key_uses_first_forwarded_address_behind_proxy() {
        let peer: SocketAddr = "10.0.0.1:8080".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers, Some(peer), true), "10.0.0.1");

        headers.insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"));
        assert_eq!(client_key(&headers, Some(peer), true), "203.0.113.7");

        headers.insert("x-forwarded-for", HeaderValue::from_static(""));
        assert_eq!(client_key(&headers, Some(peer), true), "10.0.0.1");
    }
}
