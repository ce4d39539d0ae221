use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::entity::{
    Action, ExecutionStatus, FillReport, LifecycleState, OrderType, Signal, SignalId,
    SubmissionFailure, SubmissionState,
};
use super::error::SignalError;
use crate::broker::entity::PermId;

/// # Summary
/// 存储层看到的原始信号记录。
///
/// 所有字段 (除 `id` 外) 都允许缺失，用于承载 schema 变更之前写入的旧数据。
/// 数值统一以字符串保存，避免浮点精度损失。
///
/// # Invariants
/// - 记录本身不保证满足实体约束，必须经 `into_signal` 重新校验后才能使用。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub id: String,
    pub symbol: Option<String>,
    pub units: Option<String>,
    pub action: Option<String>,
    pub order_type: Option<String>,
    pub price: Option<String>,
    pub lifecycle: Option<String>,
    pub broker_order_ref: Option<i64>,
    pub execution_status: Option<String>,
    pub submit_attempts: Option<i64>,
    pub resubmissions: Option<i64>,
    pub submit_error: Option<String>,
    pub submit_ambiguous: Option<bool>,
    pub submit_terminal: Option<bool>,
    pub submit_pending: Option<bool>,
    pub filled_quantity: Option<String>,
    pub avg_fill_price: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Signal> for SignalRecord {
    fn from(s: &Signal) -> Self {
        let failure = s.submission.last_failure.as_ref();
        Self {
            id: s.id.0.clone(),
            symbol: Some(s.symbol.clone()),
            units: Some(s.units.to_string()),
            action: Some(s.action.as_str().to_string()),
            order_type: Some(s.order_type.as_str().to_string()),
            price: s.price.map(|p| p.to_string()),
            lifecycle: Some(s.lifecycle.as_str().to_string()),
            broker_order_ref: s.broker_order_ref.map(|p| p.0),
            execution_status: s.execution_status.map(|e| e.as_str().to_string()),
            submit_attempts: Some(i64::from(s.submission.attempts)),
            resubmissions: Some(i64::from(s.submission.resubmissions)),
            submit_error: failure.map(|f| f.cause.clone()),
            submit_ambiguous: failure.map(|f| f.may_have_reached_gateway),
            submit_terminal: Some(s.submission.terminal),
            submit_pending: Some(s.submission.pending),
            filled_quantity: s.fill.as_ref().map(|f| f.filled_quantity.to_string()),
            avg_fill_price: s
                .fill
                .as_ref()
                .and_then(|f| f.avg_fill_price)
                .map(|p| p.to_string()),
            created_at: Some(s.created_at),
            updated_at: Some(s.updated_at),
        }
    }
}

fn invalid(id: &str, field: &str, detail: impl std::fmt::Display) -> SignalError {
    SignalError::InvalidSignal(format!("record {}: field `{}` {}", id, field, detail))
}

fn parse_decimal(id: &str, field: &str, raw: &str) -> Result<Decimal, SignalError> {
    Decimal::from_str(raw.trim()).map_err(|e| invalid(id, field, e))
}

fn to_counter(id: &str, field: &str, raw: Option<i64>) -> Result<u32, SignalError> {
    u32::try_from(raw.unwrap_or(0)).map_err(|e| invalid(id, field, e))
}

impl SignalRecord {
    /// # Summary
    /// 将原始记录还原为实体，缺失字段按文档化的默认值补齐。
    ///
    /// # Logic
    /// 1. 必填字段 (`symbol`、`units`、`action`) 缺失或无法解析时报错。
    /// 2. `order_type` 缺省为 MARKET，`price` 缺省为空，`lifecycle` 缺省为 PENDING。
    /// 3. 旧数据中 MARKET 单带有价格时清空价格，与原有数据的读取口径一致。
    /// 4. 执行/提交相关字段缺省为“未提交”。
    /// 5. 最后执行实体统一校验。
    ///
    /// # Returns
    /// * `Err(SignalError::InvalidSignal)` - 记录在补齐默认值后依然不合法。
    pub fn into_signal(self) -> Result<Signal, SignalError> {
        let id = self.id;

        let symbol = self
            .symbol
            .ok_or_else(|| invalid(&id, "symbol", "is missing"))?;
        let units = match self.units.as_deref() {
            Some(raw) => parse_decimal(&id, "units", raw)?,
            None => return Err(invalid(&id, "units", "is missing")),
        };
        let action: Action = self
            .action
            .as_deref()
            .ok_or_else(|| invalid(&id, "action", "is missing"))?
            .parse()
            .map_err(|e: String| invalid(&id, "action", e))?;
        let order_type: OrderType = match self.order_type.as_deref() {
            Some(raw) => raw.parse().map_err(|e: String| invalid(&id, "order_type", e))?,
            None => OrderType::Market,
        };
        let price = match (order_type, self.price.as_deref()) {
            (OrderType::Market, _) | (_, None) => None,
            (OrderType::Limit, Some(raw)) => Some(parse_decimal(&id, "price", raw)?),
        };
        let lifecycle: LifecycleState = match self.lifecycle.as_deref() {
            Some(raw) => raw.parse().map_err(|e: String| invalid(&id, "lifecycle", e))?,
            None => LifecycleState::Pending,
        };
        let execution_status = self
            .execution_status
            .as_deref()
            .map(ExecutionStatus::from_str)
            .transpose()
            .map_err(|e| invalid(&id, "execution_status", e))?;

        let submission = SubmissionState {
            attempts: to_counter(&id, "submit_attempts", self.submit_attempts)?,
            resubmissions: to_counter(&id, "resubmissions", self.resubmissions)?,
            last_failure: self.submit_error.map(|cause| SubmissionFailure {
                cause,
                may_have_reached_gateway: self.submit_ambiguous.unwrap_or(false),
            }),
            terminal: self.submit_terminal.unwrap_or(false),
            pending: self.submit_pending.unwrap_or(false),
        };

        let fill = match self.filled_quantity.as_deref() {
            Some(raw) => Some(FillReport {
                filled_quantity: parse_decimal(&id, "filled_quantity", raw)?,
                avg_fill_price: self
                    .avg_fill_price
                    .as_deref()
                    .map(|p| parse_decimal(&id, "avg_fill_price", p))
                    .transpose()?,
            }),
            None => None,
        };

        let created_at = self.created_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let signal = Signal {
            id: SignalId(id),
            symbol,
            units,
            action,
            order_type,
            price,
            lifecycle,
            broker_order_ref: self.broker_order_ref.map(PermId),
            execution_status,
            submission,
            fill,
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
        };
        signal.validate()?;
        Ok(signal)
    }
}
