//! # DTO (Data Transfer Object) 层
//!
//! 将内部领域模型转化为面向前端 JSON 输出的轻量结构体。
//! 所有 DTO 必须派生 `utoipa::ToSchema` 以自动进入 Swagger 文档。

use desk_core::signal::entity::{Action, NewSignal, OrderType, Signal, SignalId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============================================================
//  信号相关 DTO
// ============================================================

/// 创建信号请求体，webhook 与 REST 入口共用
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateSignalRequest {
    /// 外部事件 ID，缺省时由服务端生成 UUID
    #[schema(example = "tv-alert-20240301-001")]
    pub id: Option<String>,
    /// 交易标的
    #[schema(example = "MSFT")]
    pub symbol: String,
    /// 数量 (带符号)
    #[schema(value_type = String, example = "10")]
    pub units: Decimal,
    /// 方向
    pub action: Action,
    /// 委托类型，兼容 MKT / LMT
    pub order_type: OrderType,
    /// 限价，仅 LIMIT 单填写
    #[schema(value_type = Option<String>, example = "410.25")]
    pub price: Option<Decimal>,
}

impl From<CreateSignalRequest> for NewSignal {
    fn from(req: CreateSignalRequest) -> Self {
        Self {
            id: req.id.map(SignalId),
            symbol: req.symbol,
            units: req.units,
            action: req.action,
            order_type: req.order_type,
            price: req.price,
        }
    }
}

/// 修改数量请求体
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateUnitsRequest {
    #[schema(value_type = String, example = "25")]
    pub units: Decimal,
}

/// 信号详情 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SignalResponse {
    #[schema(example = "tv-alert-20240301-001")]
    pub id: String,
    #[schema(example = "MSFT")]
    pub symbol: String,
    #[schema(example = "10")]
    pub units: String,
    #[schema(example = "BUY")]
    pub action: String,
    #[schema(example = "MARKET")]
    pub order_type: String,
    #[schema(example = "410.25")]
    pub price: Option<String>,
    /// PENDING / ACCEPTED / REJECTED
    #[schema(example = "ACCEPTED")]
    pub lifecycle: String,
    pub accepted: bool,
    pub rejected: bool,
    /// 券商永久订单 ID
    #[schema(example = 777)]
    pub broker_order_ref: Option<i64>,
    /// SUBMITTED / OPEN / FILLED / CANCELLED / UNKNOWN
    #[schema(example = "OPEN")]
    pub execution_status: Option<String>,
    pub submit_attempts: u32,
    pub resubmissions: u32,
    /// 最近一次提交失败的原因
    pub submit_error: Option<String>,
    /// 提交已终态失败，需要操作员处理
    pub submission_failed: bool,
    pub filled_quantity: Option<String>,
    pub avg_fill_price: Option<String>,
    #[schema(example = "2024-03-01T14:30:00Z")]
    pub created_at: String,
    #[schema(example = "2024-03-01T14:31:05Z")]
    pub updated_at: String,
}

impl From<&Signal> for SignalResponse {
    fn from(s: &Signal) -> Self {
        Self {
            id: s.id.to_string(),
            symbol: s.symbol.clone(),
            units: s.units.to_string(),
            action: s.action.as_str().to_string(),
            order_type: s.order_type.as_str().to_string(),
            price: s.price.map(|p| p.to_string()),
            lifecycle: s.lifecycle.as_str().to_string(),
            accepted: s.is_accepted(),
            rejected: s.is_rejected(),
            broker_order_ref: s.broker_order_ref.map(|p| p.0),
            execution_status: s.execution_status.map(|e| e.as_str().to_string()),
            submit_attempts: s.submission.attempts,
            resubmissions: s.submission.resubmissions,
            submit_error: s.submission.last_failure.as_ref().map(|f| f.cause.clone()),
            submission_failed: s.submission.terminal,
            filled_quantity: s.fill.as_ref().map(|f| f.filled_quantity.to_string()),
            avg_fill_price: s
                .fill
                .as_ref()
                .and_then(|f| f.avg_fill_price)
                .map(|p| p.to_string()),
            created_at: s.created_at.to_rfc3339(),
            updated_at: s.updated_at.to_rfc3339(),
        }
    }
}

/// 操作结果 DTO：状态 + 受影响的信号 ID
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActionResponse {
    /// received / accepted / rejected / updated / submitting / submitted / resubmitting
    #[schema(example = "accepted")]
    pub status: String,
    #[schema(example = "tv-alert-20240301-001")]
    pub id: String,
    /// 修改数量后的新值
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    /// 同步提交成功时的券商订单 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_order_ref: Option<i64>,
}

impl ActionResponse {
    pub fn new(status: &str, id: &SignalId) -> Self {
        Self {
            status: status.to_string(),
            id: id.to_string(),
            units: None,
            broker_order_ref: None,
        }
    }
}

/// 健康检查 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    /// 券商会话是否已连接
    pub broker_connected: bool,
    /// 正在对账轮询的信号数
    pub active_pollers: usize,
}

// ============================================================
//  通用响应 DTO
// ============================================================

/// 统一 API 响应包装器
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T: Serialize + ToSchema> {
    /// 是否成功
    pub success: bool,
    /// 数据载荷 (成功时)
    pub data: Option<T>,
    /// 错误信息 (失败时)
    pub error: Option<String>,
}

impl<T: Serialize + ToSchema> ApiResponse<T> {
    /// 构建成功响应
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// 构建失败响应 (不含泛型载荷)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiErrorResponse {
    /// 固定为 false
    pub success: bool,
    /// 错误描述信息
    pub error: String,
    /// 稳定的机器可读错误码，如 `DuplicateSignal`
    #[schema(example = "DuplicateSignal")]
    pub code: String,
}

impl ApiErrorResponse {
    /// 从错误码与错误信息构建
    pub fn from_msg(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: msg.into(),
            code: code.into(),
        }
    }
}
