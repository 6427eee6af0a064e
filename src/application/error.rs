use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{config::LoadError, infra::error::InfraError, infra::http::ServerError};

/// Diagnostic attached to error responses and consumed by the response logger.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }

    pub fn from_message(source: &'static str, message: impl Into<String>) -> Self {
        Self {
            source,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Plain-text HTTP failure whose body is shown to the client verbatim.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    body: String,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(source: &'static str, status: StatusCode, body: impl Into<String>) -> Self {
        let body = body.into();
        let report = ErrorReport::from_message(source, body.clone());
        Self {
            status,
            body,
            report,
        }
    }

    /// Prefix `error` with `context` for the body and keep the full source chain in the report.
    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        context: &str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, error);
        Self {
            status,
            body: format!("{context}: {error}"),
            report,
        }
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, format!("{}\n", self.body)).into_response();
        self.report.attach(&mut response);
        response
    }
}

/// Top-level failure of the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("outer failure")]
    struct Outer {
        #[source]
        inner: std::io::Error,
    }

    #[test]
    fn report_collects_source_chain() {
        let err = Outer {
            inner: std::io::Error::other("inner failure"),
        };
        let report = ErrorReport::from_error("test", &err);
        assert_eq!(report.messages, vec!["outer failure", "inner failure"]);
    }

    #[test]
    fn http_error_response_carries_body_and_report() {
        let err = Outer {
            inner: std::io::Error::other("inner failure"),
        };
        let error = HttpError::from_error(
            "test",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to list branches",
            &err,
        );
        assert_eq!(error.body(), "Failed to list branches: outer failure");

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.source, "test");
        assert_eq!(report.messages.len(), 2);
    }

    #[test]
    fn message_report_matches_body() {
        let response = HttpError::new("test", StatusCode::BAD_REQUEST, "No commit given.")
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.messages, vec!["No commit given."]);
    }
}
