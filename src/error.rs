use crate::services::StoreError;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Missing authorization header")]
    MissingCredential,
    #[error("Invalid authorization token")]
    InvalidCredential,
    #[error("failed to claim scheduled messages: {0}")]
    Claim(#[source] StoreError),
    #[error("{0}")]
    Internal(String),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::MissingCredential => StatusCode::UNAUTHORIZED,
            Self::InvalidCredential => StatusCode::FORBIDDEN,
            Self::Claim(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        let mut response = (status, body).into_response();
        if matches!(self, Self::MethodNotAllowed) {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("POST"));
        }
        response
    }
}
