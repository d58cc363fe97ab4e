use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use policy_rag_core::{DocumentError, PipelineError};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthenticated,

    #[error("Forbidden")]
    Forbidden,

    #[error("OpenAI API key not set")]
    MissingCredential,

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::MissingCredential => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Document(error) => document_status(error),
            ApiError::Pipeline(PipelineError::Document(error)) => document_status(error),
            ApiError::Pipeline(PipelineError::EmptyDocument) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match self {
            ApiError::Unauthenticated | ApiError::Forbidden | ApiError::MissingCredential => {
                self.to_string()
            }
            ApiError::Pipeline(PipelineError::EmptyDocument) => {
                "Document has no extractable text".to_string()
            }
            other if other.status().is_server_error() => format!("Processing error: {other}"),
            other => format!("Document error: {other}"),
        }
    }
}

fn document_status(error: &DocumentError) -> StatusCode {
    match error {
        DocumentError::NotFound(_) => StatusCode::NOT_FOUND,
        DocumentError::Download { .. } | DocumentError::Http(_) => StatusCode::BAD_GATEWAY,
        DocumentError::InvalidReference(_) => StatusCode::BAD_REQUEST,
        DocumentError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        DocumentError::PdfParse(_) | DocumentError::DocxParse(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        DocumentError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, error = %self, "request failed");
        }
        (status, Json(ErrorBody { detail: self.detail() })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_failure_class_has_its_own_status() {
        assert_eq!(ApiError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::MissingCredential.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(DocumentError::UnsupportedFormat("txt".to_string())).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            ApiError::from(DocumentError::NotFound("x.pdf".to_string())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(DocumentError::Download { status: 500 }).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(PipelineError::EmptyDocument).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(PipelineError::InvalidChunkConfig("bad".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn details_carry_the_cause() {
        assert_eq!(ApiError::Unauthenticated.detail(), "Unauthorized");
        assert_eq!(
            ApiError::MissingCredential.detail(),
            "OpenAI API key not set"
        );
        assert_eq!(
            ApiError::from(DocumentError::UnsupportedFormat("txt".to_string())).detail(),
            "Document error: unsupported file type: txt"
        );
        assert!(ApiError::from(PipelineError::InvalidChunkConfig("bad".to_string()))
            .detail()
            .starts_with("Processing error:"));
    }
}
