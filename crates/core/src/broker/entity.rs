use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::signal::entity::{Action, ExecutionStatus, OrderType, Signal, SignalId};

/// # Summary
/// 券商分配的永久订单 ID。
///
/// # Invariants
/// - 在挂单列表和已完成列表之间保持稳定，对账只按此 ID 匹配。
#[derive(
    Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct PermId(pub i64);

impl fmt::Display for PermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// # Summary
/// 发往券商的下单请求。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// 本地信号 ID，仅作为客户端引用透传
    pub client_ref: SignalId,
    pub symbol: String,
    pub action: Action,
    pub order_type: OrderType,
    /// 委托数量 (绝对值)
    pub quantity: Decimal,
    /// 限价 (市价单为空)
    pub limit_price: Option<Decimal>,
}

impl OrderRequest {
    /// # Logic
    /// 方向取 `action`，数量取 `units` 的绝对值；二者不互相推导。
    pub fn from_signal(signal: &Signal) -> Self {
        Self {
            client_ref: signal.id.clone(),
            symbol: signal.symbol.clone(),
            action: signal.action,
            order_type: signal.order_type,
            quantity: signal.units.abs(),
            limit_price: signal.price,
        }
    }
}

/// # Summary
/// 券商侧的订单状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrokerOrderStatus {
    PendingSubmit,
    PreSubmitted,
    Submitted,
    Filled,
    Cancelled,
    ApiCancelled,
    Inactive,
}

impl BrokerOrderStatus {
    /// 映射为本地执行状态：工作中 -> OPEN，成交 -> FILLED，撤销/失效 -> CANCELLED
    pub fn to_execution_status(self) -> ExecutionStatus {
        match self {
            BrokerOrderStatus::PendingSubmit
            | BrokerOrderStatus::PreSubmitted
            | BrokerOrderStatus::Submitted => ExecutionStatus::Open,
            BrokerOrderStatus::Filled => ExecutionStatus::Filled,
            BrokerOrderStatus::Cancelled
            | BrokerOrderStatus::ApiCancelled
            | BrokerOrderStatus::Inactive => ExecutionStatus::Cancelled,
        }
    }
}

/// # Summary
/// 券商订单快照，挂单列表与已完成列表共用此结构。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerOrder {
    pub perm_id: PermId,
    pub status: BrokerOrderStatus,
    pub filled_quantity: Decimal,
    pub avg_fill_price: Option<Decimal>,
}
