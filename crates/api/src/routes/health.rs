use axum::Json;
use axum::extract::State;
use desk_core::broker::port::BrokerSession;

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{ApiResponse, HealthResponse};

/// 健康检查
///
/// 券商断连时进程仍视为存活，由 `broker_connected` 反映连接状态。
#[utoipa::path(
    get,
    path = "/health",
    tag = "系统 (System)",
    responses(
        (status = 200, description = "服务存活", body = ApiResponse<HealthResponse>)
    )
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<HealthResponse>>, ApiError> {
    let resp = HealthResponse {
        status: "ok".to_string(),
        broker_connected: state.session.is_connected().await,
        active_pollers: state.execution.active_pollers(),
    };
    Ok(Json(ApiResponse::ok(resp)))
}
