use http::StatusCode;
use thiserror::Error;

/// Failure taxonomy surfaced to clients. Mapping to HTTP happens exactly
/// once, at the handler boundary; everything below it returns this type or
/// `anyhow::Error` wrapped into `Internal`.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0}")]
    BadRequest(String),
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),
    #[error("upstream exceeded the {0} second deadline")]
    UpstreamTimeout(u64),
    #[error("upstream response exceeded the {0} byte limit")]
    UpstreamPayloadTooLarge(usize),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ProxyError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::BadRequest(_) => "BadRequest",
            ProxyError::UpstreamUnreachable(_) => "UpstreamUnreachable",
            ProxyError::UpstreamTimeout(_) => "UpstreamTimeout",
            ProxyError::UpstreamPayloadTooLarge(_) => "UpstreamPayloadTooLarge",
            ProxyError::Internal(_) => "Internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UpstreamPayloadTooLarge(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_json_body(&self) -> String {
        serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        })
        .to_string()
    }
}
