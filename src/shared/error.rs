use axum::http::StatusCode;
use axum::response::Json;
use serde_json::Value;

/// Service-wide error taxonomy. Handlers map each kind to an HTTP status;
/// background tasks record the kind on the affected job instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeetError {
    Validation(String),
    Auth(String),
    Authorization(String),
    NotFound(String),
    Conflict(String),
    Upstream(String),
    Storage(String),
    State(String),
}

impl std::fmt::Display for MeetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(e) => write!(f, "Validation error: {e}"),
            Self::Auth(e) => write!(f, "Authentication error: {e}"),
            Self::Authorization(e) => write!(f, "Authorization error: {e}"),
            Self::NotFound(e) => write!(f, "Not found: {e}"),
            Self::Conflict(e) => write!(f, "Conflict: {e}"),
            Self::Upstream(e) => write!(f, "Upstream error: {e}"),
            Self::Storage(e) => write!(f, "Storage error: {e}"),
            Self::State(e) => write!(f, "Invalid state: {e}"),
        }
    }
}

impl std::error::Error for MeetError {}

impl MeetError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) | Self::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub fn error_response(e: &MeetError) -> (StatusCode, Json<Value>) {
    (e.status(), Json(serde_json::json!({"error": e.to_string()})))
}
