use serde::{Deserialize, Serialize};

use crate::wh_api::PipelineError;

/// The envelope every synchronous API result is delivered in: `{ "ok": true, ...data }` on success, or
/// `{ "error": true, "errorCode": "...", "errorMessage": "..." }` on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApiResponse<T> {
    Ok(OkBody<T>),
    Error(ErrorBody),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OkBody<T> {
    pub ok: bool,
    #[serde(flatten)]
    pub data: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: bool,
    pub error_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse::Ok(OkBody { ok: true, data })
    }

    pub fn failure(e: &PipelineError) -> Self {
        ApiResponse::Error(ErrorBody {
            error: true,
            error_code: e.error_code().to_string(),
            error_message: Some(e.to_string()),
        })
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ApiResponse::Ok(_))
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            ApiResponse::Ok(_) => None,
            ApiResponse::Error(e) => Some(e.error_code.as_str()),
        }
    }
}

impl<T> From<Result<T, PipelineError>> for ApiResponse<T> {
    fn from(result: Result<T, PipelineError>) -> Self {
        match result {
            Ok(data) => ApiResponse::success(data),
            Err(e) => ApiResponse::failure(&e),
        }
    }
}
