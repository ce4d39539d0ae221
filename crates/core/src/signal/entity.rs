use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use super::error::SignalError;
use crate::broker::entity::PermId;

/// # Summary
/// 信号的系统内唯一标识，创建后不可变。
///
/// # Invariants
/// - 与券商分配的 `PermId` 完全独立，二者之间不做任何推导。
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct SignalId(pub String);

impl SignalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// # Summary
/// 交易方向。与 `units` 的正负号各自独立保存，互不推导。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(Action::Buy),
            "SELL" => Ok(Action::Sell),
            _ => Err(format!("Unknown action: {}", s)),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Summary
/// 委托类型。线上报文同时兼容 `MARKET`/`LIMIT` 与旧版的 `MKT`/`LMT`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum OrderType {
    #[serde(rename = "MARKET", alias = "MKT")]
    Market,
    #[serde(rename = "LIMIT", alias = "LMT")]
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        }
    }
}

impl FromStr for OrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "MARKET" | "MKT" => Ok(OrderType::Market),
            "LIMIT" | "LMT" => Ok(OrderType::Limit),
            _ => Err(format!("Unknown order type: {}", s)),
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Summary
/// 操作员审批维度的生命周期状态。
///
/// # Invariants
/// - 合法迁移：`Pending -> Accepted`、`Pending -> Rejected`、`Accepted <-> Rejected`。
/// - 任何状态都不能回到 `Pending`。
/// - 单一枚举字段保证 accepted / rejected 永远不会同时为真。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum LifecycleState {
    Pending,
    Accepted,
    Rejected,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Pending => "PENDING",
            LifecycleState::Accepted => "ACCEPTED",
            LifecycleState::Rejected => "REJECTED",
        }
    }

    /// 判断是否允许迁移到 `next`。同态迁移视为合法 (幂等)。
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        match (self, next) {
            (_, LifecycleState::Pending) => self == LifecycleState::Pending,
            _ => true,
        }
    }
}

impl FromStr for LifecycleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(LifecycleState::Pending),
            "ACCEPTED" => Ok(LifecycleState::Accepted),
            "REJECTED" => Ok(LifecycleState::Rejected),
            _ => Err(format!("Unknown lifecycle state: {}", s)),
        }
    }
}

/// # Summary
/// 券商成交维度的执行状态，由提交流程与对账轮询写入。
///
/// # Invariants
/// - 单调推进：`Submitted`/`Unknown` < `Open` < `Filled`/`Cancelled`，不允许回退。
/// - `Filled` 与 `Cancelled` 为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Submitted,
    Open,
    Filled,
    Cancelled,
    Unknown,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Submitted => "SUBMITTED",
            ExecutionStatus::Open => "OPEN",
            ExecutionStatus::Filled => "FILLED",
            ExecutionStatus::Cancelled => "CANCELLED",
            ExecutionStatus::Unknown => "UNKNOWN",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Filled | ExecutionStatus::Cancelled)
    }

    fn rank(self) -> u8 {
        match self {
            ExecutionStatus::Submitted | ExecutionStatus::Unknown => 1,
            ExecutionStatus::Open => 2,
            ExecutionStatus::Filled | ExecutionStatus::Cancelled => 3,
        }
    }

    /// # Summary
    /// 判断对账结果能否覆盖当前状态。
    ///
    /// # Logic
    /// 1. 终态不可再变。
    /// 2. `Unknown` 只能覆盖 `Submitted`，避免短暂的不可见窗口把 `Open` 打回去。
    /// 3. 其余情况只允许向更高的阶段推进。
    pub fn can_advance_to(self, next: ExecutionStatus) -> bool {
        if self.is_terminal() || self == next {
            return false;
        }
        if next == ExecutionStatus::Unknown {
            return self == ExecutionStatus::Submitted;
        }
        next.rank() > self.rank()
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SUBMITTED" => Ok(ExecutionStatus::Submitted),
            "OPEN" => Ok(ExecutionStatus::Open),
            "FILLED" => Ok(ExecutionStatus::Filled),
            "CANCELLED" => Ok(ExecutionStatus::Cancelled),
            "UNKNOWN" => Ok(ExecutionStatus::Unknown),
            _ => Err(format!("Unknown execution status: {}", s)),
        }
    }
}

/// # Summary
/// 一次提交失败的记录。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionFailure {
    /// 失败原因 (券商错误的文本)
    pub cause: String,
    /// 委托是否可能已经抵达券商网关 (超时等歧义情况)
    pub may_have_reached_gateway: bool,
}

/// # Summary
/// 提交流程的计数与失败记录。
///
/// # Invariants
/// - `terminal == true` 表示自动重试已耗尽或遇到歧义失败，只能由操作员手动重新提交。
/// - `pending == true` 表示某次下单调用已发出但结果尚未落库。没有券商 ID 时，
///   该信号可能已在券商侧生成订单，不允许再次提交。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionState {
    /// 当前这一轮提交已尝试的次数
    pub attempts: u32,
    /// 操作员手动重新提交的次数
    pub resubmissions: u32,
    /// 最近一次失败
    pub last_failure: Option<SubmissionFailure>,
    /// 是否已终态失败
    pub terminal: bool,
    /// 下单调用进行中 (调用前落库，结果写回时清除)
    #[serde(default)]
    pub pending: bool,
}

/// # Summary
/// 券商回报的成交明细。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillReport {
    pub filled_quantity: Decimal,
    pub avg_fill_price: Option<Decimal>,
}

/// # Summary
/// 入站信号载荷，由接入网关解析后交给生命周期管理器。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSignal {
    /// 外部事件可以自带 ID；缺省时由系统生成
    pub id: Option<SignalId>,
    pub symbol: String,
    pub units: Decimal,
    pub action: Action,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
}

/// # Summary
/// `Signal` 聚合根，系统内的工作单元。
///
/// # Invariants
/// - `order_type == Limit` 当且仅当 `price` 存在；创建与每次变更后都会校验。
/// - `units` 仅在 `Pending` 状态下可修改。
/// - `broker_order_ref` 只在提交成功后写入，之后不再变化。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub symbol: String,
    pub units: Decimal,
    pub action: Action,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub lifecycle: LifecycleState,
    pub broker_order_ref: Option<PermId>,
    pub execution_status: Option<ExecutionStatus>,
    pub submission: SubmissionState,
    pub fill: Option<FillReport>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Signal {
    /// # Summary
    /// 由入站载荷构造一个 `Pending` 状态的新信号。
    ///
    /// # Logic
    /// 1. 规整 symbol 首尾空白。
    /// 2. 组装实体，执行统一校验。
    ///
    /// # Returns
    /// * `Err(SignalError::InvalidSignal)` - 违反价格/委托类型耦合等约束。
    pub fn new(id: SignalId, payload: NewSignal, now: DateTime<Utc>) -> Result<Self, SignalError> {
        let signal = Self {
            id,
            symbol: payload.symbol.trim().to_string(),
            units: payload.units,
            action: payload.action,
            order_type: payload.order_type,
            price: payload.price,
            lifecycle: LifecycleState::Pending,
            broker_order_ref: None,
            execution_status: None,
            submission: SubmissionState::default(),
            fill: None,
            created_at: now,
            updated_at: now,
        };
        signal.validate()?;
        Ok(signal)
    }

    /// # Summary
    /// 校验实体不变量。
    ///
    /// # Logic
    /// 1. ID 与 symbol 非空。
    /// 2. `units` 非零。
    /// 3. LIMIT 必须带正的价格，MARKET 不得带价格。
    pub fn validate(&self) -> Result<(), SignalError> {
        if self.id.0.trim().is_empty() {
            return Err(SignalError::InvalidSignal("id must not be empty".into()));
        }
        if self.symbol.trim().is_empty() {
            return Err(SignalError::InvalidSignal("symbol must not be empty".into()));
        }
        if self.units.is_zero() {
            return Err(SignalError::InvalidSignal("units must not be zero".into()));
        }
        match (self.order_type, self.price) {
            (OrderType::Limit, None) => Err(SignalError::InvalidSignal(
                "price is required for LIMIT orders".into(),
            )),
            (OrderType::Limit, Some(p)) if p <= Decimal::ZERO => Err(SignalError::InvalidSignal(
                format!("LIMIT price must be positive, got {}", p),
            )),
            (OrderType::Market, Some(_)) => Err(SignalError::InvalidSignal(
                "price must be absent for MARKET orders".into(),
            )),
            _ => Ok(()),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.lifecycle == LifecycleState::Accepted
    }

    pub fn is_rejected(&self) -> bool {
        self.lifecycle == LifecycleState::Rejected
    }

    /// 是否仍有对账工作要做：已拿到券商 ID 且尚未进入终态
    pub fn awaits_reconciliation(&self) -> bool {
        self.broker_order_ref.is_some()
            && !self.execution_status.is_some_and(ExecutionStatus::is_terminal)
    }
}
