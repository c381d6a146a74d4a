//! Error → response mapping.
//!
//! Every failure becomes `{"error": <category>, "message": <text>}` with a
//! status chosen by category.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::orchestrator::RequestError;

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::NotFound(_) => StatusCode::NOT_FOUND,
            RequestError::UnknownAction(_)
            | RequestError::Resolve(_)
            | RequestError::Body(_)
            | RequestError::QueryString(_) => StatusCode::BAD_REQUEST,
            RequestError::Backend { .. } => StatusCode::BAD_GATEWAY,
            RequestError::Config(_) | RequestError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.category(),
            "message": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}
