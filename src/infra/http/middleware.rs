use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

const RESPONSE_TARGET: &str = "hugo_preview::http::response";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

/// Log 4xx and 5xx responses with the diagnostic their handler attached.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    let (source, messages) = response
        .extensions_mut()
        .remove::<ErrorReport>()
        .map_or(("unknown", Vec::new()), |report| {
            (report.source, report.messages)
        });
    let detail = messages
        .first()
        .map_or("no diagnostic available", String::as_str);

    macro_rules! log_failure {
        ($level:ident, $message:literal) => {
            $level!(
                target: RESPONSE_TARGET,
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms,
                source,
                detail,
                chain = ?messages,
                request_id = %request_id,
                $message
            )
        };
    }

    if status.is_server_error() {
        log_failure!(error, "request failed");
    } else {
        log_failure!(warn, "client request error");
    }

    response
}
