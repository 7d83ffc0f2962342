//! Assigns a correlation id to every inbound request (spec §5 "ordering
//! guarantees" - each request's stages log under one identifier).
//!
//! This middleware never rejects a request; it only attaches metadata for
//! downstream handlers and the tracing spans `tower_http::trace::TraceLayer`
//! opens around them.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// The per-request id, readable from `Request::extensions()` in handlers.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

/// Reuses an inbound `x-request-id` header if present and well-formed,
/// otherwise generates one. The id is stamped onto the request extensions
/// and echoed back on the response.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .unwrap_or_else(Uuid::new_v4);

    req.extensions_mut().insert(RequestId(id));

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    async fn handler() -> &'static str {
        "ok"
    }

    fn app() -> Router {
        Router::new().route("/", get(handler)).layer(axum::middleware::from_fn(request_id_middleware))
    }

    #[tokio::test]
    async fn generates_a_request_id_when_absent() {
        let response = app().oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap()).await.unwrap();
        let header = response.headers().get(REQUEST_ID_HEADER).expect("header present");
        assert!(Uuid::parse_str(header.to_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn echoes_back_a_well_formed_inbound_id() {
        let id = Uuid::new_v4();
        let request =
            HttpRequest::builder().uri("/").header(REQUEST_ID_HEADER, id.to_string()).body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        let header = response.headers().get(REQUEST_ID_HEADER).unwrap();
        assert_eq!(header.to_str().unwrap(), id.to_string());
    }
}
