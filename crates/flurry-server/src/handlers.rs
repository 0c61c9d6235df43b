//! Request handlers for the broker's HTTP routes.
//!
//! Payloads stay opaque end to end; the handlers never parse signaling.
//! Session routing uses the `X-Session-ID` header chosen by the proxy.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use hyper::body::Bytes;
use tracing::debug;

use flurry_broker::{ops, AnswerOutcome, BrokerContext, ClientOutcome, PollOutcome};

/// Header used by proxies to name their rendezvous session.
pub const SESSION_ID_HEADER: &str = "X-Session-ID";

/// Headers a browser-based client may send on the signaling routes.
const ALLOWED_HEADERS: &str = "Content-Type, X-Session-ID";

/// POST `/client`: a client submits an offer and blocks for the answer.
///
/// The CORS allow-headers decoration goes on every response, success or
/// error, so browser clients can read the outcome.
pub async fn client_handler(State(ctx): State<Arc<BrokerContext>>, body: Bytes) -> Response {
    let (status, payload) = match ops::client_offer(&ctx, body).await {
        ClientOutcome::Matched(answer) => (StatusCode::OK, answer),
        ClientOutcome::NoProxies => (StatusCode::SERVICE_UNAVAILABLE, Bytes::new()),
        ClientOutcome::TimedOut => (StatusCode::GATEWAY_TIMEOUT, Bytes::new()),
    };
    (
        status,
        [(header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOWED_HEADERS)],
        payload,
    )
        .into_response()
}

/// POST `/proxy`: a volunteer proxy long-polls for a client offer.
pub async fn proxy_handler(
    State(ctx): State<Arc<BrokerContext>>,
    headers: HeaderMap,
) -> Response {
    let Some(id) = session_id(&headers) else {
        debug!("proxy poll without a session id");
        return StatusCode::BAD_REQUEST.into_response();
    };

    match ops::proxy_poll(&ctx, id).await {
        PollOutcome::Offer(offer) => (StatusCode::OK, offer).into_response(),
        PollOutcome::TimedOut => StatusCode::GATEWAY_TIMEOUT.into_response(),
    }
}

/// POST `/answer`: a matched proxy posts its answer for the waiting client.
pub async fn answer_handler(
    State(ctx): State<Arc<BrokerContext>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let id = session_id(&headers).unwrap_or_default();
    match ops::proxy_answer(&ctx, id, body) {
        AnswerOutcome::Delivered => StatusCode::OK.into_response(),
        AnswerOutcome::UnknownSession => StatusCode::GONE.into_response(),
        AnswerOutcome::EmptyBody => StatusCode::BAD_REQUEST.into_response(),
    }
}

/// GET `/debug`: plaintext snapshot of the availability pool.
pub async fn debug_handler(State(ctx): State<Arc<BrokerContext>>) -> String {
    let mut ids = ctx.session_ids();
    ids.sort();
    let mut out = format!("current snowflakes available: {}\n", ctx.available());
    for id in ids {
        out.push_str(&format!("snowflake: {id}\n"));
    }
    out
}

/// GET `/robots.txt`: the broker is not a site to index.
pub async fn robots_handler() -> &'static str {
    "User-agent: *\nDisallow: /\n"
}

/// Extracts a non-empty session id from the request headers.
fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_id_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id(&headers), None);

        headers.insert(SESSION_ID_HEADER, HeaderValue::from_static(""));
        assert_eq!(session_id(&headers), None);

        headers.insert(SESSION_ID_HEADER, HeaderValue::from_static("p1"));
        assert_eq!(session_id(&headers), Some("p1"));
    }

    #[tokio::test]
    async fn test_robots_disallows_everything() {
        let body = robots_handler().await;
        assert!(body.contains("Disallow: /"));
    }
}
