use crate::lock::KeyedLocks;
use desk_core::common::time::TimeProvider;
use desk_core::signal::entity::{LifecycleState, NewSignal, Signal, SignalId};
use desk_core::signal::error::SignalError;
use desk_core::signal::record::SignalRecord;
use desk_core::store::port::{InsertOutcome, SignalPatch, SignalStore, UpdateGuard};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 列表接口的默认条数上限
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// 从存储读取并还原实体，不存在时返回 `NotFound`
pub(crate) async fn load_signal(
    store: &dyn SignalStore,
    id: &SignalId,
) -> Result<Signal, SignalError> {
    store
        .get(id)
        .await?
        .ok_or_else(|| SignalError::NotFound(id.to_string()))?
        .into_signal()
}

/// # Summary
/// 信号生命周期管理器，系统的应用服务层门面 (Facade)。
/// 编译期仅依赖 `desk-core` 中的 Trait 定义，存储与时钟通过构造函数注入。
///
/// # Invariants
/// - 同一 ID 的审批与改数量操作经 `KeyedLocks` 串行化，与执行桥共享同一张锁表。
/// - 每次写入都带前置谓词，存储层保证谓词求值与写入的原子性。
/// - 生命周期只会落在 PENDING / ACCEPTED / REJECTED 之一，不会出现同时接受与拒绝的组合。
pub struct SignalManager {
    store: Arc<dyn SignalStore>,
    clock: Arc<dyn TimeProvider>,
    locks: Arc<KeyedLocks>,
}

impl SignalManager {
    /// # Summary
    /// 创建 SignalManager 实例。
    ///
    /// # Arguments
    /// * `store` - 信号持久化接口的具体实现。
    /// * `clock` - 时间供给器。
    /// * `locks` - 与执行桥共享的按 ID 锁表。
    pub fn new(
        store: Arc<dyn SignalStore>,
        clock: Arc<dyn TimeProvider>,
        locks: Arc<KeyedLocks>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            clock,
            locks,
        })
    }

    /// # Summary
    /// 创建一个 PENDING 状态的新信号。
    ///
    /// # Logic
    /// 1. 载荷未带 ID 时生成 UUID v4。
    /// 2. 构造实体并校验价格与委托类型的耦合约束。
    /// 3. 通过 `put_if_absent` 原子地查重插入。
    ///
    /// # Returns
    /// * `Err(SignalError::InvalidSignal)` - 载荷违反实体约束，存储不变。
    /// * `Err(SignalError::DuplicateSignal)` - ID 已存在，存储不变。
    pub async fn create(&self, payload: NewSignal) -> Result<Signal, SignalError> {
        let id = payload
            .id
            .clone()
            .unwrap_or_else(|| SignalId(Uuid::new_v4().to_string()));
        let signal = Signal::new(id, payload, self.clock.now())?;

        match self.store.put_if_absent(&SignalRecord::from(&signal)).await? {
            InsertOutcome::Inserted => {
                info!(
                    signal_id = %signal.id,
                    symbol = %signal.symbol,
                    action = %signal.action,
                    order_type = %signal.order_type,
                    "Signal created"
                );
                Ok(signal)
            }
            InsertOutcome::Duplicate => {
                debug!(signal_id = %signal.id, "Duplicate signal ignored");
                Err(SignalError::DuplicateSignal(signal.id.to_string()))
            }
        }
    }

    /// 读取单个信号
    pub async fn get(&self, id: &SignalId) -> Result<Signal, SignalError> {
        load_signal(self.store.as_ref(), id).await
    }

    /// 接受信号。重复接受是无副作用的成功。
    pub async fn accept(&self, id: &SignalId) -> Result<Signal, SignalError> {
        self.decide(id, LifecycleState::Accepted).await
    }

    /// 拒绝信号。已经提交到券商的信号不能再被拒绝。
    pub async fn reject(&self, id: &SignalId) -> Result<Signal, SignalError> {
        self.decide(id, LifecycleState::Rejected).await
    }

    /// # Summary
    /// 操作员审批的统一入口。
    ///
    /// # Logic
    /// 1. 持有该 ID 的锁，读取当前状态。
    /// 2. 已处于目标状态时直接返回 (幂等)。
    /// 3. 已拿到券商订单 ID 时拒绝改判为 REJECTED。
    /// 4. 以“生命周期仍为读到的值”为前置谓词写入目标状态。
    async fn decide(&self, id: &SignalId, target: LifecycleState) -> Result<Signal, SignalError> {
        let _guard = self.locks.lock(id).await;
        let mut signal = load_signal(self.store.as_ref(), id).await?;

        if signal.lifecycle == target {
            return Ok(signal);
        }
        if target == LifecycleState::Rejected {
            if let Some(perm_id) = signal.broker_order_ref {
                return Err(SignalError::ImmutableSignal(format!(
                    "{} already has broker order {}",
                    id, perm_id
                )));
            }
        }
        if !signal.lifecycle.can_transition_to(target) {
            return Err(SignalError::ImmutableSignal(format!(
                "{} cannot move from {} to {}",
                id,
                signal.lifecycle.as_str(),
                target.as_str()
            )));
        }

        let now = self.clock.now();
        let patch = SignalPatch {
            lifecycle: Some(target),
            updated_at: Some(now),
            ..Default::default()
        };
        let matched = self
            .store
            .update_fields(id, &UpdateGuard::Lifecycle(signal.lifecycle), &patch)
            .await?;
        if matched == 0 {
            return Err(SignalError::ImmutableSignal(format!(
                "{} was modified concurrently",
                id
            )));
        }

        info!(
            signal_id = %id,
            from = signal.lifecycle.as_str(),
            to = target.as_str(),
            "Signal lifecycle changed"
        );
        signal.lifecycle = target;
        signal.updated_at = now;
        Ok(signal)
    }

    /// # Summary
    /// 修改 PENDING 信号的数量，其余字段保持不变。
    ///
    /// # Returns
    /// * `Err(SignalError::ImmutableSignal)` - 信号不在 PENDING 状态，存储不变。
    /// * `Err(SignalError::InvalidSignal)` - 新数量为零。
    pub async fn update_units(&self, id: &SignalId, units: Decimal) -> Result<Signal, SignalError> {
        let _guard = self.locks.lock(id).await;
        let mut signal = load_signal(self.store.as_ref(), id).await?;

        if signal.lifecycle != LifecycleState::Pending {
            return Err(SignalError::ImmutableSignal(format!(
                "{} is {}, units can only change while PENDING",
                id,
                signal.lifecycle.as_str()
            )));
        }

        let previous = signal.units;
        signal.units = units;
        signal.validate()?;

        let now = self.clock.now();
        let patch = SignalPatch {
            units: Some(units),
            updated_at: Some(now),
            ..Default::default()
        };
        let matched = self
            .store
            .update_fields(id, &UpdateGuard::Lifecycle(LifecycleState::Pending), &patch)
            .await?;
        if matched == 0 {
            return Err(SignalError::ImmutableSignal(format!(
                "{} left PENDING before the update",
                id
            )));
        }

        info!(signal_id = %id, %previous, %units, "Signal units updated");
        signal.updated_at = now;
        Ok(signal)
    }

    /// # Summary
    /// 按存储顺序列出信号。
    ///
    /// # Logic
    /// 1. 读取最多 `limit` 条原始记录。
    /// 2. 逐条补齐默认值并重新校验，不合法的记录记一条警告后跳过。
    pub async fn list(&self, limit: usize) -> Result<Vec<Signal>, SignalError> {
        let records = self.store.list_all(limit).await?;
        let total = records.len();

        let signals: Vec<Signal> = records
            .into_iter()
            .filter_map(|record| {
                let id = record.id.clone();
                match record.into_signal() {
                    Ok(signal) => Some(signal),
                    Err(e) => {
                        warn!(signal_id = %id, "Skipping invalid signal record: {}", e);
                        None
                    }
                }
            })
            .collect();

        if signals.len() < total {
            debug!(skipped = total - signals.len(), "Listing skipped invalid records");
        }
        Ok(signals)
    }
}
