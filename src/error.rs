//! Proxy error type and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("API key not configured on server. Please set NIM_API_KEY environment variable.")]
    NotConfigured,
    #[error("NVIDIA API Error")]
    Upstream {
        status: StatusCode,
        details: String,
        streaming: bool,
    },
    #[error("Request timed out")]
    Timeout,
    #[error("Request error: {0}")]
    Transport(String),
    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ProxyError>;

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotConfigured | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream { status, .. } => *status,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<tokio::time::error::Elapsed> for ProxyError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Upstream {
                status,
                details,
                streaming: false,
            } => json!({
                "error": self.to_string(),
                "details": details,
                "status_code": status.as_u16(),
            }),
            Self::Upstream {
                details,
                streaming: true,
                ..
            } => json!({ "error": details }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_upstream_error_envelope() {
        let err = ProxyError::Upstream {
            status: StatusCode::TOO_MANY_REQUESTS,
            details: "rate limited".to_string(),
            streaming: false,
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            body_json(response).await,
            json!({
                "error": "NVIDIA API Error",
                "details": "rate limited",
                "status_code": 429
            })
        );
    }

    #[tokio::test]
    async fn test_streaming_upstream_error_is_raw() {
        let err = ProxyError::Upstream {
            status: StatusCode::UNAUTHORIZED,
            details: "bad key".to_string(),
            streaming: true,
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await, json!({ "error": "bad key" }));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        assert_eq!(ProxyError::NotConfigured.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ProxyError::Timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ProxyError::Transport("connection refused".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ProxyError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let response = ProxyError::Timeout.into_response();
        assert_eq!(body_json(response).await, json!({ "error": "Request timed out" }));
    }
}
