use super::backoff::Backoff;
use super::error::ExecutionError;
use crate::lock::KeyedLocks;
use crate::signal::load_signal;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use desk_core::broker::entity::{BrokerOrder, OrderRequest, PermId};
use desk_core::broker::error::BrokerError;
use desk_core::broker::port::BrokerSession;
use desk_core::common::time::TimeProvider;
use desk_core::config::ExecutionConfig;
use desk_core::signal::entity::{
    ExecutionStatus, FillReport, Signal, SignalId, SubmissionFailure, SubmissionState,
};
use desk_core::signal::error::SignalError;
use desk_core::store::port::{SignalPatch, SignalStore, UpdateGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::AbortHandle;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// # Summary
/// 单次对账的结论。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// 执行状态已到终态 (FILLED / CANCELLED)
    Settled(ExecutionStatus),
    /// 订单仍在工作中，附带当前生效的执行状态
    Working(ExecutionStatus),
    /// 挂单与已完成列表都看不到该订单，稍后重查
    Unresolved,
    /// 信号已不存在或不再指向该券商订单
    Detached,
}

/// 提交进行中标记，drop 时自动清除
struct InFlightMarker {
    set: Arc<DashSet<SignalId>>,
    id: SignalId,
}

impl InFlightMarker {
    fn acquire(set: &Arc<DashSet<SignalId>>, id: &SignalId) -> Option<Self> {
        set.insert(id.clone()).then(|| Self {
            set: Arc::clone(set),
            id: id.clone(),
        })
    }
}

impl Drop for InFlightMarker {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

struct Submitter {
    generation: u64,
    abort: AbortHandle,
}

struct Poller {
    generation: u64,
    token: CancellationToken,
    abort: AbortHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    Fresh,
    Resubmit,
}

/// # Summary
/// 订单执行桥：把 ACCEPTED 信号提交为券商订单，并轮询对账其执行结果。
///
/// # Logic
/// - 提交：认领 (校验 + 打上进行中标记) 后逐次尝试下单，失败按指数退避重试，
///   耗尽或遇到歧义失败后标记终态失败。
/// - 对账：每个已提交信号一个轮询协程，先查挂单列表再查已完成列表，按永久订单 ID 匹配。
///
/// # Invariants
/// - 同一信号同一时刻最多一个提交流程 (`in_flight`)，最多一个轮询协程 (`pollers`)。
/// - 每次下单尝试前都在按 ID 锁内重新确认信号仍为 ACCEPTED 且未拿到券商 ID。
/// - 下单调用前落库 `pending`；带 `pending` 且没有券商 ID 的信号不再被认领。
/// - 执行状态只前进不后退，写入带 `BrokerRef` 谓词。
/// - 所有后台协程挂在同一个 `TaskTracker` 与取消令牌之下，`shutdown` 后不残留任何标记。
pub struct ExecutionBridge {
    store: Arc<dyn SignalStore>,
    session: Arc<dyn BrokerSession>,
    clock: Arc<dyn TimeProvider>,
    locks: Arc<KeyedLocks>,
    config: ExecutionConfig,
    in_flight: Arc<DashSet<SignalId>>,
    submitters: DashMap<SignalId, Submitter>,
    submit_seq: AtomicU64,
    pollers: DashMap<SignalId, Poller>,
    poller_seq: AtomicU64,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl ExecutionBridge {
    /// # Summary
    /// 创建执行桥实例。
    ///
    /// # Arguments
    /// * `store` - 信号持久化接口。
    /// * `session` - 进程内共享的券商会话。
    /// * `clock` - 时间供给器。
    /// * `locks` - 与 `SignalManager` 共享的按 ID 锁表。
    /// * `config` - 重试与轮询参数。
    pub fn new(
        store: Arc<dyn SignalStore>,
        session: Arc<dyn BrokerSession>,
        clock: Arc<dyn TimeProvider>,
        locks: Arc<KeyedLocks>,
        config: ExecutionConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            session,
            clock,
            locks,
            config,
            in_flight: Arc::new(DashSet::new()),
            submitters: DashMap::new(),
            submit_seq: AtomicU64::new(0),
            pollers: DashMap::new(),
            poller_seq: AtomicU64::new(0),
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        })
    }

    /// # Summary
    /// 提交信号，立即返回；下单与重试在后台协程中进行。
    ///
    /// # Returns
    /// * `Ok(())` - 认领成功，提交已排入后台。
    /// * `Err(ExecutionError)` - 信号不存在、未接受、已提交、已有提交在进行或已终态失败。
    pub async fn submit(self: &Arc<Self>, id: &SignalId) -> Result<(), ExecutionError> {
        let (signal, marker) = self.claim(id, Claim::Fresh).await?;
        self.spawn_submission(signal, marker);
        Ok(())
    }

    /// 提交信号并等待结果，返回券商分配的永久订单 ID
    pub async fn submit_and_wait(
        self: &Arc<Self>,
        id: &SignalId,
    ) -> Result<PermId, ExecutionError> {
        let (signal, marker) = self.claim(id, Claim::Fresh).await?;
        self.run_submission(signal, marker).await
    }

    /// # Summary
    /// 操作员对终态失败的信号发起重新提交。
    ///
    /// # Logic
    /// 1. 仅当信号终态失败、没有券商 ID、且最后一次失败确定没有抵达网关时允许。
    /// 2. 清零本轮尝试次数，`resubmissions` 加一并落库。
    /// 3. 在后台开始新一轮提交。
    pub async fn resubmit(self: &Arc<Self>, id: &SignalId) -> Result<(), ExecutionError> {
        let (signal, marker) = self.claim(id, Claim::Resubmit).await?;
        self.spawn_submission(signal, marker);
        Ok(())
    }

    /// 是否有提交正在进行
    pub fn is_submitting(&self, id: &SignalId) -> bool {
        self.in_flight.contains(id)
    }

    /// 是否有对账协程正在跟踪该信号
    pub fn is_polling(&self, id: &SignalId) -> bool {
        self.pollers.contains_key(id)
    }

    pub fn active_pollers(&self) -> usize {
        self.pollers.len()
    }

    /// 后台提交协程数
    pub fn active_submissions(&self) -> usize {
        self.submitters.len()
    }

    /// 停止某个信号的对账轮询，信号保留最后一次写入的状态
    pub fn cancel_polling(&self, id: &SignalId) -> bool {
        match self.pollers.remove(id) {
            Some((_, poller)) => {
                poller.token.cancel();
                info!(signal_id = %id, "Reconciliation polling cancelled");
                true
            }
            None => false,
        }
    }

    /// # Summary
    /// 进程启动时为所有已提交、尚未终态的信号重新挂上轮询协程。
    ///
    /// # Returns
    /// 新启动的轮询协程数。
    pub async fn resume_polling(self: &Arc<Self>) -> Result<usize, ExecutionError> {
        let records = self.store.list_all(usize::MAX).await?;
        let mut resumed = 0;
        for record in records {
            let id = record.id.clone();
            match record.into_signal() {
                Ok(signal) if signal.submission.pending && signal.broker_order_ref.is_none() => {
                    warn!(
                        signal_id = %id,
                        "Signal has an interrupted submission, order may exist at broker"
                    );
                }
                Ok(signal) if signal.awaits_reconciliation() => {
                    if let Some(perm_id) = signal.broker_order_ref {
                        if self.start_polling(&signal.id, perm_id) {
                            resumed += 1;
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(signal_id = %id, "Skipping invalid signal record on resume: {}", e),
            }
        }
        info!(resumed, "Reconciliation polling resumed");
        Ok(resumed)
    }

    /// # Summary
    /// 查询券商并把结果写回信号。
    ///
    /// # Returns
    /// 信号没有券商 ID 时返回 `Reconciliation::Detached`。
    pub async fn reconcile(&self, id: &SignalId) -> Result<Reconciliation, ExecutionError> {
        let signal = load_signal(self.store.as_ref(), id).await?;
        match signal.broker_order_ref {
            Some(perm_id) => self.reconcile_order(id, perm_id).await,
            None => Ok(Reconciliation::Detached),
        }
    }

    /// # Summary
    /// 优雅停机。
    ///
    /// # Logic
    /// 1. 触发取消令牌：重试等待与轮询等待立即结束，新的认领被拒绝。
    /// 2. 在 `shutdown_grace_ms` 内等待所有后台协程退出。
    /// 3. 超时则强制 abort 剩余协程。
    /// 4. 清空进行中与轮询标记。
    pub async fn shutdown(&self) {
        info!("Execution bridge shutting down");
        self.shutdown.cancel();
        self.tasks.close();

        if timeout(self.config.shutdown_grace(), self.tasks.wait()).await.is_err() {
            warn!(
                pending = self.tasks.len(),
                "Execution workers still running after grace period, aborting"
            );
            for poller in self.pollers.iter() {
                poller.abort.abort();
            }
            for submitter in self.submitters.iter() {
                submitter.value().abort.abort();
            }
        }

        self.pollers.clear();
        self.submitters.clear();
        self.in_flight.clear();
        self.locks.prune();
        info!("Execution bridge stopped");
    }

    /// # Summary
    /// 在按 ID 锁内校验信号可以提交，并打上进行中标记。
    async fn claim(
        &self,
        id: &SignalId,
        mode: Claim,
    ) -> Result<(Signal, InFlightMarker), ExecutionError> {
        if self.shutdown.is_cancelled() {
            return Err(ExecutionError::ShuttingDown);
        }

        let _guard = self.locks.lock(id).await;
        let mut signal = load_signal(self.store.as_ref(), id).await?;

        if !signal.is_accepted() {
            return Err(ExecutionError::NotAccepted(format!(
                "{} is {}",
                id,
                signal.lifecycle.as_str()
            )));
        }
        if let Some(perm_id) = signal.broker_order_ref {
            return Err(ExecutionError::AlreadySubmitted(format!(
                "{} has broker order {}",
                id, perm_id
            )));
        }
        let marker = InFlightMarker::acquire(&self.in_flight, id)
            .ok_or_else(|| ExecutionError::SubmissionInFlight(id.to_string()))?;

        match mode {
            Claim::Fresh => {
                if signal.submission.pending {
                    return Err(ExecutionError::SubmissionFailure {
                        attempts: signal.submission.attempts,
                        cause: "previous attempt was interrupted, order may exist at broker"
                            .to_string(),
                    });
                }
                if signal.submission.terminal {
                    let cause = signal
                        .submission
                        .last_failure
                        .as_ref()
                        .map(|f| f.cause.clone())
                        .unwrap_or_default();
                    return Err(ExecutionError::SubmissionFailure {
                        attempts: signal.submission.attempts,
                        cause,
                    });
                }
                // 非终态下残留的计数来自中断的上一轮，从头计数
                signal.submission.attempts = 0;
            }
            Claim::Resubmit => {
                let submission = &signal.submission;
                if submission.pending {
                    return Err(ExecutionError::NotResubmittable(format!(
                        "{}: previous attempt was interrupted, order may exist at broker",
                        id
                    )));
                }
                let reached = submission
                    .last_failure
                    .as_ref()
                    .map(|f| f.may_have_reached_gateway);
                match (submission.terminal, reached) {
                    (true, Some(false)) => {}
                    (true, _) => {
                        return Err(ExecutionError::NotResubmittable(format!(
                            "{}: last attempt may have reached the gateway",
                            id
                        )));
                    }
                    (false, _) => {
                        return Err(ExecutionError::NotResubmittable(format!(
                            "{}: no terminal submission failure",
                            id
                        )));
                    }
                }

                signal.submission = SubmissionState {
                    attempts: 0,
                    resubmissions: submission.resubmissions.saturating_add(1),
                    last_failure: None,
                    terminal: false,
                    pending: false,
                };
                let patch = SignalPatch {
                    submission: Some(signal.submission.clone()),
                    updated_at: Some(self.clock.now()),
                    ..Default::default()
                };
                let matched = self
                    .store
                    .update_fields(id, &UpdateGuard::AcceptedUnsubmitted, &patch)
                    .await?;
                if matched == 0 {
                    return Err(ExecutionError::NotAccepted(id.to_string()));
                }
                info!(
                    signal_id = %id,
                    resubmissions = signal.submission.resubmissions,
                    "Signal queued for resubmission"
                );
            }
        }

        Ok((signal, marker))
    }

    fn spawn_submission(self: &Arc<Self>, signal: Signal, marker: InFlightMarker) {
        let bridge = Arc::clone(self);
        let generation = self.submit_seq.fetch_add(1, Ordering::SeqCst);
        // 持有条目期间登记句柄，后台协程结束时的清理不会早于登记
        let slot = self.submitters.entry(signal.id.clone());
        let handle = self.tasks.spawn(async move {
            bridge.run_detached(signal, marker, generation).await;
        });
        slot.insert(Submitter {
            generation,
            abort: handle.abort_handle(),
        });
    }

    /// 进行中标记在 `run_submission` 返回时就已释放，新一轮认领可能已登记句柄，
    /// 因此只清除属于自己这一代的条目
    async fn run_detached(
        self: &Arc<Self>,
        signal: Signal,
        marker: InFlightMarker,
        generation: u64,
    ) {
        let id = signal.id.clone();
        if let Err(e) = self.run_submission(signal, marker).await {
            debug!(signal_id = %id, "Background submission ended: {}", e);
        }
        self.submitters.remove_if(&id, |_, s| s.generation == generation);
    }

    /// # Summary
    /// 提交主循环。
    ///
    /// # Logic
    /// 1. 每次尝试前持有按 ID 锁，重新读取信号：已被改判为拒绝则停止。
    /// 2. 下单前落库 `pending` 标记，调用中途被中断时信号不会被再次提交。
    /// 3. 调用券商下单：
    ///    - 成功：写入券商 ID 与 SUBMITTED，启动对账轮询；写入失败时标记为可能已抵达网关的终态失败。
    ///    - 失败：写入 UNKNOWN 与失败原因；歧义失败或次数耗尽时标记终态并返回错误，
    ///      否则释放锁后按退避等待再试。
    /// 4. 停机令牌触发时放弃剩余重试。
    async fn run_submission(
        self: &Arc<Self>,
        signal: Signal,
        marker: InFlightMarker,
    ) -> Result<PermId, ExecutionError> {
        let _marker = marker;
        let id = signal.id.clone();
        let request = OrderRequest::from_signal(&signal);
        let mut submission = signal.submission;
        let mut backoff = Backoff::from_millis(
            self.config.submit_backoff_initial_ms,
            self.config.submit_backoff_max_ms,
            self.config.backoff_multiplier
        );

        loop {
            if self.shutdown.is_cancelled() {
                return Err(ExecutionError::ShuttingDown);
            }

            let guard = self.locks.lock(&id).await;
            let current = load_signal(self.store.as_ref(), &id).await?;
            if !current.is_accepted() {
                info!(signal_id = %id, "Signal no longer accepted, submission stopped");
                return Err(ExecutionError::NotAccepted(format!(
                    "{} is {}",
                    id,
                    current.lifecycle.as_str()
                )));
            }
            if let Some(perm_id) = current.broker_order_ref {
                return Err(ExecutionError::AlreadySubmitted(format!(
                    "{} has broker order {}",
                    id, perm_id
                )));
            }

            submission.attempts = submission.attempts.saturating_add(1);
            submission.pending = true;
            let attempt = submission.attempts;
            let marked = self
                .store
                .update_fields(
                    &id,
                    &UpdateGuard::AcceptedUnsubmitted,
                    &SignalPatch {
                        submission: Some(submission.clone()),
                        updated_at: Some(self.clock.now()),
                        ..Default::default()
                    },
                )
                .await?;
            if marked == 0 {
                return Err(ExecutionError::NotAccepted(id.to_string()));
            }

            let placed = self.session.place_order(&request).await;
            let now = self.clock.now();

            match placed {
                Ok(perm_id) => {
                    submission.pending = false;
                    submission.last_failure = None;
                    submission.terminal = false;
                    let patch = SignalPatch {
                        broker_order_ref: Some(perm_id),
                        execution_status: Some(ExecutionStatus::Submitted),
                        submission: Some(submission.clone()),
                        updated_at: Some(now),
                        ..Default::default()
                    };
                    let written = self
                        .store
                        .update_fields(&id, &UpdateGuard::AcceptedUnsubmitted, &patch)
                        .await;
                    let unrecorded = match written {
                        Ok(0) => Some("signal record no longer matches".to_string()),
                        Ok(_) => None,
                        Err(e) => Some(e.to_string()),
                    };

                    if let Some(reason) = unrecorded {
                        error!(
                            signal_id = %id,
                            perm_id = perm_id.0,
                            "Order placed but not recorded, operator action required: {}",
                            reason
                        );
                        let cause =
                            format!("order {} placed but not recorded: {}", perm_id, reason);
                        submission.terminal = true;
                        submission.last_failure = Some(SubmissionFailure {
                            cause: cause.clone(),
                            may_have_reached_gateway: true,
                        });
                        let fallback = SignalPatch {
                            execution_status: Some(ExecutionStatus::Unknown),
                            submission: Some(submission),
                            updated_at: Some(now),
                            ..Default::default()
                        };
                        // 兜底写入也失败时，库里残留的 pending 标记仍会拦下再次提交
                        if let Err(e) = self
                            .store
                            .update_fields(&id, &UpdateGuard::Any, &fallback)
                            .await
                        {
                            error!(signal_id = %id, "Failed to mark unrecorded order: {}", e);
                        }
                        drop(guard);
                        return Err(ExecutionError::SubmissionFailure {
                            attempts: attempt,
                            cause,
                        });
                    }
                    drop(guard);

                    info!(
                        signal_id = %id,
                        perm_id = perm_id.0,
                        attempt,
                        "Order submitted to broker"
                    );
                    self.start_polling(&id, perm_id);
                    return Ok(perm_id);
                }
                Err(err) => {
                    let ambiguous = err.may_have_reached_gateway();
                    let exhausted = ambiguous || attempt >= self.config.max_submit_attempts;
                    submission.last_failure = Some(SubmissionFailure {
                        cause: err.to_string(),
                        may_have_reached_gateway: ambiguous,
                    });
                    submission.terminal = exhausted;
                    submission.pending = false;
                    let patch = SignalPatch {
                        execution_status: Some(ExecutionStatus::Unknown),
                        submission: Some(submission.clone()),
                        updated_at: Some(now),
                        ..Default::default()
                    };
                    self.store
                        .update_fields(&id, &UpdateGuard::AcceptedUnsubmitted, &patch)
                        .await?;
                    drop(guard);

                    if exhausted {
                        error!(
                            signal_id = %id,
                            attempts = attempt,
                            ambiguous,
                            "Submission failed terminally, operator action required: {}",
                            err
                        );
                        return Err(ExecutionError::SubmissionFailure {
                            attempts: attempt,
                            cause: err.to_string(),
                        });
                    }

                    let delay = backoff.next_delay();
                    warn!(
                        signal_id = %id,
                        attempt,
                        retry_in = ?delay,
                        "Submission attempt failed: {}",
                        err
                    );
                    tokio::select! {
                        () = self.shutdown.cancelled() => return Err(ExecutionError::ShuttingDown),
                        () = sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// 为信号启动轮询协程；已在轮询或正在停机时返回 `false`
    fn start_polling(self: &Arc<Self>, id: &SignalId, perm_id: PermId) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        match self.pollers.entry(id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let generation = self.poller_seq.fetch_add(1, Ordering::SeqCst);
                let token = self.shutdown.child_token();
                let bridge = Arc::clone(self);
                let task_id = id.clone();
                let task_token = token.clone();
                let handle = self.tasks.spawn(async move {
                    bridge
                        .poll_until_settled(task_id, perm_id, generation, task_token)
                        .await;
                });
                slot.insert(Poller {
                    generation,
                    token,
                    abort: handle.abort_handle(),
                });
                debug!(signal_id = %id, perm_id = perm_id.0, "Reconciliation polling started");
                true
            }
        }
    }

    /// # Summary
    /// 单个信号的轮询循环。
    ///
    /// # Logic
    /// 1. 按退避等待，期间可被取消。
    /// 2. 超过 `poll_timeout_secs` 时停止轮询，信号保留最后状态。
    /// 3. 观察到状态变化时退避回到初始值；到终态或信号脱钩时退出。
    /// 4. 退出时只清除属于自己这一代的轮询标记。
    async fn poll_until_settled(
        &self,
        id: SignalId,
        perm_id: PermId,
        generation: u64,
        token: CancellationToken,
    ) {
        let mut backoff = Backoff::from_millis(
            self.config.poll_initial_ms,
            self.config.poll_max_ms,
            self.config.backoff_multiplier
        );
        let deadline = self.config.poll_timeout().map(|t| Instant::now() + t);
        let mut last_status: Option<ExecutionStatus> = None;

        loop {
            let delay = backoff.next_delay();
            tokio::select! {
                () = token.cancelled() => {
                    debug!(signal_id = %id, "Polling loop cancelled");
                    break;
                }
                () = sleep(delay) => {}
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(
                    signal_id = %id,
                    perm_id = perm_id.0,
                    "Reconciliation timed out, polling stopped"
                );
                break;
            }

            match self.reconcile_order(&id, perm_id).await {
                Ok(Reconciliation::Settled(status)) => {
                    info!(
                        signal_id = %id,
                        perm_id = perm_id.0,
                        status = status.as_str(),
                        "Order settled, polling stopped"
                    );
                    break;
                }
                Ok(Reconciliation::Working(status)) => {
                    if last_status != Some(status) {
                        backoff.reset();
                        last_status = Some(status);
                    }
                }
                Ok(Reconciliation::Unresolved) => {
                    debug!(
                        signal_id = %id,
                        perm_id = perm_id.0,
                        "Order not visible yet, will retry"
                    );
                }
                Ok(Reconciliation::Detached) => {
                    warn!(
                        signal_id = %id,
                        perm_id = perm_id.0,
                        "Signal no longer tracks this order"
                    );
                    break;
                }
                Err(e) => {
                    warn!(
                        signal_id = %id,
                        perm_id = perm_id.0,
                        "Reconciliation attempt failed: {}",
                        e
                    );
                }
            }
        }

        self.pollers.remove_if(&id, |_, p| p.generation == generation);
    }

    /// 先查挂单列表，再查已完成列表
    async fn find_order(&self, perm_id: PermId) -> Result<Option<BrokerOrder>, BrokerError> {
        let open = self.session.list_open_orders().await?;
        if let Some(order) = open.into_iter().find(|o| o.perm_id == perm_id) {
            return Ok(Some(order));
        }
        let completed = self.session.list_completed_orders().await?;
        Ok(completed.into_iter().find(|o| o.perm_id == perm_id))
    }

    /// # Summary
    /// 对一个券商订单做一次对账并写回。
    ///
    /// # Logic
    /// 1. 锁外查询券商，避免慢查询阻塞操作员操作。
    /// 2. 锁内重新读取信号，确认券商 ID 未变、状态未到终态。
    /// 3. 没查到：当前仍为 SUBMITTED 时写入 UNKNOWN，返回 `Unresolved`。
    /// 4. 查到：状态能前进时写入新状态，同时刷新成交明细。
    async fn reconcile_order(
        &self,
        id: &SignalId,
        perm_id: PermId,
    ) -> Result<Reconciliation, ExecutionError> {
        let observed = self.find_order(perm_id).await?;

        let _guard = self.locks.lock(id).await;
        let signal = match load_signal(self.store.as_ref(), id).await {
            Ok(signal) => signal,
            Err(SignalError::NotFound(_)) => return Ok(Reconciliation::Detached),
            Err(e) => return Err(e.into()),
        };
        if signal.broker_order_ref != Some(perm_id) {
            return Ok(Reconciliation::Detached);
        }

        let current = signal.execution_status.unwrap_or(ExecutionStatus::Submitted);
        if current.is_terminal() {
            return Ok(Reconciliation::Settled(current));
        }

        let Some(order) = observed else {
            if current.can_advance_to(ExecutionStatus::Unknown) {
                let patch = SignalPatch {
                    execution_status: Some(ExecutionStatus::Unknown),
                    updated_at: Some(self.clock.now()),
                    ..Default::default()
                };
                self.store
                    .update_fields(id, &UpdateGuard::BrokerRef(perm_id), &patch)
                    .await?;
            }
            return Ok(Reconciliation::Unresolved);
        };

        let reported = order.status.to_execution_status();
        let fill = FillReport {
            filled_quantity: order.filled_quantity,
            avg_fill_price: order.avg_fill_price,
        };
        let advance = current.can_advance_to(reported);
        let fill_changed = signal.fill.as_ref() != Some(&fill);

        if advance || fill_changed {
            let patch = SignalPatch {
                execution_status: advance.then_some(reported),
                fill: Some(fill),
                updated_at: Some(self.clock.now()),
                ..Default::default()
            };
            self.store
                .update_fields(id, &UpdateGuard::BrokerRef(perm_id), &patch)
                .await?;
        }

        let effective = if advance {
            info!(
                signal_id = %id,
                perm_id = perm_id.0,
                from = current.as_str(),
                to = reported.as_str(),
                "Execution status advanced"
            );
            reported
        } else {
            if reported != current {
                debug!(
                    signal_id = %id,
                    current = current.as_str(),
                    reported = reported.as_str(),
                    "Ignoring non-advancing broker status"
                );
            }
            current
        };

        Ok(if effective.is_terminal() {
            Reconciliation::Settled(effective)
        } else {
            Reconciliation::Working(effective)
        })
    }
}
