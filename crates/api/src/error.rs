use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use choreo_core::ChoreoError;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Choreo(#[from] ChoreoError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Choreo(ChoreoError::MalformedComposition(_)) => {
                (StatusCode::BAD_REQUEST, "MALFORMED_COMPOSITION")
            }
            ApiError::Choreo(ChoreoError::UnboundVariable { .. }) => {
                (StatusCode::BAD_REQUEST, "UNBOUND_VARIABLE")
            }
            ApiError::Choreo(ChoreoError::Transport(_)) => (StatusCode::BAD_GATEWAY, "TRANSPORT_ERROR"),
            ApiError::Choreo(ChoreoError::Configuration(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR")
            }
            ApiError::Choreo(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();
        if status.is_server_error() {
            error!("请求失败: {self}");
        }

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type,
                "code": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}
