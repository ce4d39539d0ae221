//! # 信号路由控制器
//!
//! 实现 webhook 接入与 `/api/v1/signals` 路径下的审批、改量、提交接口。

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use desk_core::signal::entity::{NewSignal, SignalId};
use desk_manager::signal::DEFAULT_LIST_LIMIT;
use serde::Deserialize;

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{
    ActionResponse, ApiResponse, CreateSignalRequest, SignalResponse, UpdateUnitsRequest,
};

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ListSignalsQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct SubmitQuery {
    /// 为 true 时等待首次下单结果再返回
    pub wait: Option<bool>,
}

// ============================================================
//  接入
// ============================================================

/// 接收外部告警 webhook
///
/// 兼容旧版告警格式：`order_type` 可为 `MKT`/`LMT`。同一 `id` 重复推送返回 409。
#[utoipa::path(
    post,
    path = "/webhook",
    tag = "信号 (Signal)",
    request_body = CreateSignalRequest,
    responses(
        (status = 200, description = "信号已接收", body = ApiResponse<ActionResponse>),
        (status = 409, description = "信号已存在"),
        (status = 422, description = "信号字段不合法")
    )
)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    Json(req): Json<CreateSignalRequest>,
) -> Result<Json<ApiResponse<ActionResponse>>, ApiError> {
    let signal = state.signal_manager.create(NewSignal::from(req)).await?;
    tracing::info!(id = %signal.id, symbol = %signal.symbol, "Webhook signal received");
    Ok(Json(ApiResponse::ok(ActionResponse::new("received", &signal.id))))
}

/// 创建信号
#[utoipa::path(
    post,
    path = "/api/v1/signals",
    tag = "信号 (Signal)",
    request_body = CreateSignalRequest,
    responses(
        (status = 201, description = "信号创建成功", body = ApiResponse<SignalResponse>),
        (status = 409, description = "信号已存在"),
        (status = 422, description = "信号字段不合法")
    )
)]
pub async fn create_signal(
    State(state): State<AppState>,
    Json(req): Json<CreateSignalRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SignalResponse>>), ApiError> {
    let signal = state.signal_manager.create(NewSignal::from(req)).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(SignalResponse::from(&signal))),
    ))
}

// ============================================================
//  查询
// ============================================================

/// 列出信号
///
/// 读取时为旧记录补齐默认值，无法通过校验的记录被跳过。
#[utoipa::path(
    get,
    path = "/api/v1/signals",
    tag = "信号 (Signal)",
    params(
        ("limit" = Option<usize>, Query, description = "返回数量上限，默认 100")
    ),
    responses(
        (status = 200, description = "信号列表", body = ApiResponse<Vec<SignalResponse>>)
    )
)]
pub async fn list_signals(
    State(state): State<AppState>,
    Query(query): Query<ListSignalsQuery>,
) -> Result<Json<ApiResponse<Vec<SignalResponse>>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let signals = state.signal_manager.list(limit).await?;
    let responses = signals.iter().map(SignalResponse::from).collect();
    Ok(Json(ApiResponse::ok(responses)))
}

/// 获取单个信号详情，含执行与成交状态
#[utoipa::path(
    get,
    path = "/api/v1/signals/{id}",
    tag = "信号 (Signal)",
    params(
        ("id" = String, Path, description = "信号 ID")
    ),
    responses(
        (status = 200, description = "信号详情", body = ApiResponse<SignalResponse>),
        (status = 404, description = "信号不存在")
    )
)]
pub async fn get_signal(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SignalResponse>>, ApiError> {
    let signal = state.signal_manager.get(&SignalId(id)).await?;
    Ok(Json(ApiResponse::ok(SignalResponse::from(&signal))))
}

// ============================================================
//  审批
// ============================================================

/// 接受信号
///
/// 重复接受是幂等的。开启 `auto_submit_on_accept` 时随即在后台提交券商，
/// 提交失败不影响接受结果，可通过 `/submit` 重试。
#[utoipa::path(
    post,
    path = "/api/v1/signals/{id}/accept",
    tag = "信号 (Signal)",
    params(
        ("id" = String, Path, description = "信号 ID")
    ),
    responses(
        (status = 200, description = "信号已接受", body = ApiResponse<ActionResponse>),
        (status = 404, description = "信号不存在")
    )
)]
pub async fn accept_signal(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ActionResponse>>, ApiError> {
    let id = SignalId(id);
    let signal = state.signal_manager.accept(&id).await?;

    let mut status = "accepted";
    if state.auto_submit_on_accept && signal.broker_order_ref.is_none() {
        match state.execution.submit(&id).await {
            Ok(()) => status = "submitting",
            Err(e) => tracing::warn!(id = %id, code = e.code(), "Auto submit skipped: {}", e),
        }
    }
    Ok(Json(ApiResponse::ok(ActionResponse::new(status, &id))))
}

/// 拒绝信号
///
/// 已提交券商的信号不可拒绝 (409)。
#[utoipa::path(
    post,
    path = "/api/v1/signals/{id}/reject",
    tag = "信号 (Signal)",
    params(
        ("id" = String, Path, description = "信号 ID")
    ),
    responses(
        (status = 200, description = "信号已拒绝", body = ApiResponse<ActionResponse>),
        (status = 404, description = "信号不存在"),
        (status = 409, description = "信号已提交券商")
    )
)]
pub async fn reject_signal(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ActionResponse>>, ApiError> {
    let id = SignalId(id);
    state.signal_manager.reject(&id).await?;
    Ok(Json(ApiResponse::ok(ActionResponse::new("rejected", &id))))
}

/// 修改待审批信号的数量
#[utoipa::path(
    put,
    path = "/api/v1/signals/{id}/units",
    tag = "信号 (Signal)",
    params(
        ("id" = String, Path, description = "信号 ID")
    ),
    request_body = UpdateUnitsRequest,
    responses(
        (status = 200, description = "数量已更新", body = ApiResponse<ActionResponse>),
        (status = 404, description = "信号不存在"),
        (status = 409, description = "信号已审批，不可修改"),
        (status = 422, description = "数量不合法")
    )
)]
pub async fn update_units(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateUnitsRequest>,
) -> Result<Json<ApiResponse<ActionResponse>>, ApiError> {
    let id = SignalId(id);
    let signal = state.signal_manager.update_units(&id, req.units).await?;
    let mut resp = ActionResponse::new("updated", &id);
    resp.units = Some(signal.units.to_string());
    Ok(Json(ApiResponse::ok(resp)))
}

// ============================================================
//  执行
// ============================================================

/// 提交已接受的信号到券商
///
/// 默认后台执行并立即返回 202；`wait=true` 时等待首个订单 ID。
#[utoipa::path(
    post,
    path = "/api/v1/signals/{id}/submit",
    tag = "执行 (Execution)",
    params(
        ("id" = String, Path, description = "信号 ID"),
        ("wait" = Option<bool>, Query, description = "是否等待下单结果")
    ),
    responses(
        (status = 202, description = "已开始提交", body = ApiResponse<ActionResponse>),
        (status = 200, description = "下单成功", body = ApiResponse<ActionResponse>),
        (status = 404, description = "信号不存在"),
        (status = 409, description = "未接受、已提交或提交进行中"),
        (status = 503, description = "服务停机中")
    )
)]
pub async fn submit_signal(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<SubmitQuery>,
) -> Result<(StatusCode, Json<ApiResponse<ActionResponse>>), ApiError> {
    let id = SignalId(id);
    if query.wait.unwrap_or(false) {
        let perm_id = state.execution.submit_and_wait(&id).await?;
        let mut resp = ActionResponse::new("submitted", &id);
        resp.broker_order_ref = Some(perm_id.0);
        return Ok((StatusCode::OK, Json(ApiResponse::ok(resp))));
    }

    state.execution.submit(&id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::ok(ActionResponse::new("submitting", &id))),
    ))
}

/// 重新提交终态失败的信号
///
/// 仅当上次失败确定未到达券商网关时允许。
#[utoipa::path(
    post,
    path = "/api/v1/signals/{id}/resubmit",
    tag = "执行 (Execution)",
    params(
        ("id" = String, Path, description = "信号 ID")
    ),
    responses(
        (status = 202, description = "已开始重新提交", body = ApiResponse<ActionResponse>),
        (status = 404, description = "信号不存在"),
        (status = 409, description = "当前状态不可重新提交")
    )
)]
pub async fn resubmit_signal(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<ActionResponse>>), ApiError> {
    let id = SignalId(id);
    state.execution.resubmit(&id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::ok(ActionResponse::new("resubmitting", &id))),
    ))
}

/// 立即向券商查询一次并写回执行状态
///
/// 用于操作员手动刷新，不影响后台轮询。
#[utoipa::path(
    post,
    path = "/api/v1/signals/{id}/reconcile",
    tag = "执行 (Execution)",
    params(
        ("id" = String, Path, description = "信号 ID")
    ),
    responses(
        (status = 200, description = "对账后的信号详情", body = ApiResponse<SignalResponse>),
        (status = 404, description = "信号不存在"),
        (status = 502, description = "券商查询失败")
    )
)]
pub async fn reconcile_signal(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SignalResponse>>, ApiError> {
    let id = SignalId(id);
    let outcome = state.execution.reconcile(&id).await?;
    tracing::debug!(id = %id, ?outcome, "Manual reconciliation");
    let signal = state.signal_manager.get(&id).await?;
    Ok(Json(ApiResponse::ok(SignalResponse::from(&signal))))
}
