//! # API 统一错误处理
//!
//! 将下层各 crate 的错误类型统一映射到 HTTP 状态码与 JSON 响应体。

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use desk_core::signal::error::SignalError;
use desk_manager::execution::error::ExecutionError;
use thiserror::Error;

use crate::types::ApiErrorResponse;

/// API 层统一错误枚举。第一个字段为稳定错误码。
#[derive(Error, Debug)]
pub enum ApiError {
    /// 资源未找到 (404)
    #[error("资源未找到: {1}")]
    NotFound(&'static str, String),

    /// 载荷违反实体约束 (422)
    #[error("请求参数错误: {1}")]
    Invalid(&'static str, String),

    /// 与当前状态冲突 (409)
    #[error("状态冲突: {1}")]
    Conflict(&'static str, String),

    /// 券商拒绝或不可达 (502)
    #[error("券商通道错误: {1}")]
    BadGateway(&'static str, String),

    /// 服务停机中 (503)
    #[error("服务不可用: {1}")]
    Unavailable(&'static str, String),

    /// 存储等下层错误 (500)
    #[error("内部服务错误: {1}")]
    Internal(&'static str, String),
}

/// 将 `ApiError` 转换为 axum 的 HTTP 响应
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound(code, msg) => (StatusCode::NOT_FOUND, code, msg),
            ApiError::Invalid(code, msg) => (StatusCode::UNPROCESSABLE_ENTITY, code, msg),
            ApiError::Conflict(code, msg) => (StatusCode::CONFLICT, code, msg),
            ApiError::BadGateway(code, msg) => (StatusCode::BAD_GATEWAY, code, msg),
            ApiError::Unavailable(code, msg) => (StatusCode::SERVICE_UNAVAILABLE, code, msg),
            ApiError::Internal(code, msg) => {
                // 内部错误只记录日志，不向客户端透传细节
                tracing::error!(code, "Internal server error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    code,
                    "服务器内部错误".to_string(),
                )
            }
        };

        let body = Json(ApiErrorResponse::from_msg(code, message));
        (status, body).into_response()
    }
}

/// 从 `SignalError` 转换
impl From<SignalError> for ApiError {
    fn from(err: SignalError) -> Self {
        let code = err.code();
        match err {
            SignalError::NotFound(_) => ApiError::NotFound(code, err.to_string()),
            SignalError::InvalidSignal(_) => ApiError::Invalid(code, err.to_string()),
            SignalError::DuplicateSignal(_) | SignalError::ImmutableSignal(_) => {
                ApiError::Conflict(code, err.to_string())
            }
            SignalError::Store(_) => ApiError::Internal(code, err.to_string()),
        }
    }
}

/// 从 `ExecutionError` 转换
impl From<ExecutionError> for ApiError {
    fn from(err: ExecutionError) -> Self {
        let code = err.code();
        match err {
            ExecutionError::Signal(inner) => ApiError::from(inner),
            ExecutionError::NotAccepted(_)
            | ExecutionError::AlreadySubmitted(_)
            | ExecutionError::SubmissionInFlight(_)
            | ExecutionError::NotResubmittable(_) => ApiError::Conflict(code, err.to_string()),
            ExecutionError::ShuttingDown => ApiError::Unavailable(code, err.to_string()),
            ExecutionError::SubmissionFailure { .. } | ExecutionError::Broker(_) => {
                ApiError::BadGateway(code, err.to_string())
            }
        }
    }
}
