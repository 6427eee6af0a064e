use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode, Uri, header::CONTENT_TYPE},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::any,
};
use tracing::{debug, error};

use crate::application::{error::HttpError, repos::SiteRepository};

use super::middleware::{log_responses, set_request_context};

const SOURCE: &str = "infra::http::routes";
const PREVIEW_PREFIX: &str = "/preview/";
const JSON_CONTENT_TYPE: &str = "application/json; charset=utf8";

#[derive(Clone)]
pub struct GatewayState {
    pub repository: Arc<dyn SiteRepository>,
}

impl GatewayState {
    pub fn new(repository: Arc<dyn SiteRepository>) -> Self {
        Self { repository }
    }
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/", any(index))
        .route("/api/branches", any(list_branches))
        .route("/preview", any(preview))
        .route("/preview/", any(preview))
        .route("/preview/{*rest}", any(preview))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn index() -> &'static str {
    "index\n"
}

async fn list_branches(State(state): State<GatewayState>) -> Response {
    let branches = match state.repository.list_branches().await {
        Ok(branches) => branches,
        Err(err) => {
            return HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list branches",
                &err,
            )
            .into_response();
        }
    };

    match serde_json::to_vec(&branches) {
        Ok(body) => {
            let mut response = (StatusCode::OK, body).into_response();
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
            response
        }
        Err(err) => {
            error!(target = SOURCE, error = %err, "failed to encode branch list");
            HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list branches",
                &err,
            )
            .into_response()
        }
    }
}

/// Split `/preview/<commit>/<rest>` into the commit and the path the site
/// handler sees. `None` for the remainder means the trailing slash is missing.
fn split_preview_path(path: &str) -> (&str, Option<&str>) {
    let rest = path.strip_prefix(PREVIEW_PREFIX).unwrap_or_default();
    match rest.split_once('/') {
        Some((commit, remainder)) => (commit, Some(remainder)),
        None => (rest, None),
    }
}

fn rewrite_uri(uri: &Uri, remainder: &str) -> Option<Uri> {
    let path_and_query = match uri.query() {
        Some(query) => format!("/{remainder}?{query}"),
        None => format!("/{remainder}"),
    };
    path_and_query.parse().ok()
}

async fn preview(State(state): State<GatewayState>, mut request: Request<Body>) -> Response {
    let path = request.uri().path().to_owned();
    let (commit, remainder) = split_preview_path(&path);

    if commit.is_empty() {
        return HttpError::new(SOURCE, StatusCode::BAD_REQUEST, "No commit given.").into_response();
    }

    // Relative, so a path prefix in front of the gateway survives.
    let Some(remainder) = remainder else {
        return Redirect::permanent(&format!("{commit}/")).into_response();
    };

    let handler = match state.repository.site_handler(commit).await {
        Ok(handler) => handler,
        Err(err) => {
            return HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error getting site source",
                &err,
            )
            .into_response();
        }
    };

    let Some(uri) = rewrite_uri(request.uri(), remainder) else {
        return HttpError::new(SOURCE, StatusCode::BAD_REQUEST, "Invalid preview path.")
            .into_response();
    };
    debug!(target = SOURCE, commit, path = %uri, "delegating to site handler");
    *request.uri_mut() = uri;

    handler.serve(request).await
}
