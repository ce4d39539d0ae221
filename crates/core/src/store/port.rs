use super::error::StoreError;
use crate::broker::entity::PermId;
use crate::signal::entity::{
    ExecutionStatus, FillReport, LifecycleState, SignalId, SubmissionState,
};
use crate::signal::record::SignalRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// # Summary
/// `put_if_absent` 的结果。ID 冲突属于正常业务分支，不作为错误返回。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// # Summary
/// 条件更新的前置谓词，由存储实现在同一原子操作内求值。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateGuard {
    /// 无条件
    Any,
    /// 生命周期等于给定状态 (缺失视为 PENDING)
    Lifecycle(LifecycleState),
    /// 生命周期为 ACCEPTED 且尚未拿到券商 ID
    AcceptedUnsubmitted,
    /// 券商 ID 等于给定值
    BrokerRef(PermId),
}

impl UpdateGuard {
    /// 在内存记录上求值。SQL 实现需要给出等价的 WHERE 子句。
    pub fn matches(&self, record: &SignalRecord) -> bool {
        let lifecycle = record.lifecycle.as_deref().unwrap_or("PENDING");
        match self {
            UpdateGuard::Any => true,
            UpdateGuard::Lifecycle(state) => lifecycle == state.as_str(),
            UpdateGuard::AcceptedUnsubmitted => {
                lifecycle == LifecycleState::Accepted.as_str() && record.broker_order_ref.is_none()
            }
            UpdateGuard::BrokerRef(perm_id) => record.broker_order_ref == Some(perm_id.0),
        }
    }
}

/// # Summary
/// 部分字段更新。`None` 表示保持原值。
///
/// # Invariants
/// - 补丁只写入强类型的值，保证写回后的记录仍能通过实体校验。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalPatch {
    pub units: Option<Decimal>,
    pub lifecycle: Option<LifecycleState>,
    pub broker_order_ref: Option<PermId>,
    pub execution_status: Option<ExecutionStatus>,
    pub submission: Option<SubmissionState>,
    pub fill: Option<FillReport>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SignalPatch {
    /// 将补丁应用到内存记录上
    pub fn apply(&self, record: &mut SignalRecord) {
        if let Some(units) = self.units {
            record.units = Some(units.to_string());
        }
        if let Some(lifecycle) = self.lifecycle {
            record.lifecycle = Some(lifecycle.as_str().to_string());
        }
        if let Some(perm_id) = self.broker_order_ref {
            record.broker_order_ref = Some(perm_id.0);
        }
        if let Some(status) = self.execution_status {
            record.execution_status = Some(status.as_str().to_string());
        }
        if let Some(submission) = &self.submission {
            let failure = submission.last_failure.as_ref();
            record.submit_attempts = Some(i64::from(submission.attempts));
            record.resubmissions = Some(i64::from(submission.resubmissions));
            record.submit_error = failure.map(|f| f.cause.clone());
            record.submit_ambiguous = failure.map(|f| f.may_have_reached_gateway);
            record.submit_terminal = Some(submission.terminal);
            record.submit_pending = Some(submission.pending);
        }
        if let Some(fill) = &self.fill {
            record.filled_quantity = Some(fill.filled_quantity.to_string());
            record.avg_fill_price = fill.avg_fill_price.map(|p| p.to_string());
        }
        if let Some(ts) = self.updated_at {
            record.updated_at = Some(ts);
        }
    }
}

/// # Summary
/// 信号存储接口，按信号 ID 存取原始记录。
///
/// # Invariants
/// - `put_if_absent` 的“检查 + 插入”必须对同 ID 的并发创建保持原子性。
/// - `update_fields` 的“谓词求值 + 写入”必须在同一原子操作内完成。
/// - `list_all` 按插入顺序返回，且不做实体校验。
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// # Summary
    /// 按 ID 读取原始记录。
    ///
    /// # Returns
    /// 存在返回 `Some(SignalRecord)`，否则返回 `None`。
    async fn get(&self, id: &SignalId) -> Result<Option<SignalRecord>, StoreError>;

    /// # Summary
    /// 当 ID 不存在时插入记录。
    ///
    /// # Returns
    /// * `InsertOutcome::Duplicate` - ID 已存在，存储内容保持不变。
    async fn put_if_absent(&self, record: &SignalRecord) -> Result<InsertOutcome, StoreError>;

    /// # Summary
    /// 条件更新部分字段。
    ///
    /// # Arguments
    /// * `id` - 目标信号 ID。
    /// * `guard` - 前置谓词，不满足时不写入。
    /// * `patch` - 待写入的字段。
    ///
    /// # Returns
    /// 命中 (满足 ID 与谓词) 的记录数，0 或 1。
    async fn update_fields(
        &self,
        id: &SignalId,
        guard: &UpdateGuard,
        patch: &SignalPatch,
    ) -> Result<u64, StoreError>;

    /// # Summary
    /// 按插入顺序列出最多 `limit` 条原始记录。
    async fn list_all(&self, limit: usize) -> Result<Vec<SignalRecord>, StoreError>;
}
