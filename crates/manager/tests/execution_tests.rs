use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use desk_core::broker::entity::{BrokerOrderStatus, PermId};
use desk_core::broker::error::BrokerError;
use desk_core::broker::mock::ScriptedSession;
use desk_core::common::time::FakeClockProvider;
use desk_core::config::ExecutionConfig;
use desk_core::signal::entity::{
    Action, ExecutionStatus, FillReport, LifecycleState, NewSignal, OrderType, Signal, SignalId,
    SubmissionState,
};
use desk_core::signal::error::SignalError;
use desk_core::signal::record::SignalRecord;
use desk_core::store::error::StoreError;
use desk_core::store::port::{InsertOutcome, SignalPatch, SignalStore, UpdateGuard};
use desk_manager::execution::bridge::{ExecutionBridge, Reconciliation};
use desk_manager::execution::error::ExecutionError;
use desk_manager::lock::KeyedLocks;
use desk_manager::signal::SignalManager;
use desk_store::memory::MemorySignalStore;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::{Duration, sleep};

struct Desk {
    store: Arc<MemorySignalStore>,
    session: Arc<ScriptedSession>,
    manager: Arc<SignalManager>,
    bridge: Arc<ExecutionBridge>,
}

fn fast_config() -> ExecutionConfig {
    ExecutionConfig {
        max_submit_attempts: 3,
        submit_backoff_initial_ms: 100,
        submit_backoff_max_ms: 400,
        poll_initial_ms: 1_000,
        poll_max_ms: 8_000,
        backoff_multiplier: 2,
        poll_timeout_secs: 0,
        shutdown_grace_ms: 1_000,
        auto_submit_on_accept: false,
    }
}

fn wire(
    store: Arc<dyn SignalStore>,
    session: Arc<ScriptedSession>,
    config: ExecutionConfig,
) -> (Arc<SignalManager>, Arc<ExecutionBridge>) {
    let clock = Arc::new(FakeClockProvider::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap(),
    ));
    let locks = Arc::new(KeyedLocks::new());
    let manager = SignalManager::new(store.clone(), clock.clone(), locks.clone());
    let bridge = ExecutionBridge::new(store, session, clock, locks, config);
    (manager, bridge)
}

fn desk_with(session: ScriptedSession, config: ExecutionConfig) -> Desk {
    let store = Arc::new(MemorySignalStore::new());
    let session = Arc::new(session);
    let (manager, bridge) = wire(store.clone(), session.clone(), config);
    Desk {
        store,
        session,
        manager,
        bridge,
    }
}

fn msft(id: &str) -> NewSignal {
    NewSignal {
        id: Some(SignalId(id.to_string())),
        symbol: "MSFT".into(),
        units: dec!(10),
        action: Action::Buy,
        order_type: OrderType::Market,
        price: None,
    }
}

impl Desk {
    async fn accepted(&self, id: &str) -> SignalId {
        let signal = self.manager.create(msft(id)).await.unwrap();
        self.manager.accept(&signal.id).await.unwrap();
        signal.id
    }

    async fn load(&self, id: &SignalId) -> Signal {
        self.manager.get(id).await.unwrap()
    }
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_open_then_filled() {
    let desk = desk_with(ScriptedSession::new(777), fast_config());
    let id = desk.accepted("e2e").await;

    let perm_id = desk.bridge.submit_and_wait(&id).await.unwrap();
    assert_eq!(perm_id, PermId(777));

    let submitted = desk.load(&id).await;
    assert_eq!(submitted.broker_order_ref, Some(PermId(777)));
    assert_eq!(submitted.execution_status, Some(ExecutionStatus::Submitted));
    assert_eq!(submitted.submission.attempts, 1);
    assert!(desk.bridge.is_polling(&id));
    assert!(!desk.bridge.is_submitting(&id));

    // 下单请求按信号字段组装，数量取绝对值
    let placed = desk.session.placed_requests().await;
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].client_ref, id);
    assert_eq!(placed[0].symbol, "MSFT");
    assert_eq!(placed[0].action, Action::Buy);
    assert_eq!(placed[0].quantity, dec!(10));
    assert_eq!(placed[0].limit_price, None);

    // 券商侧挂单，第一次轮询 (t=1s) 后变为 OPEN
    desk.session
        .set_open(PermId(777), BrokerOrderStatus::Submitted, dec!(0));
    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(
        desk.load(&id).await.execution_status,
        Some(ExecutionStatus::Open)
    );

    // 成交后移入已完成列表
    desk.session.complete(
        PermId(777),
        BrokerOrderStatus::Filled,
        dec!(10),
        Some(dec!(410.25)),
    );
    sleep(Duration::from_secs(10)).await;

    let filled = desk.load(&id).await;
    assert_eq!(filled.execution_status, Some(ExecutionStatus::Filled));
    assert_eq!(
        filled.fill,
        Some(FillReport {
            filled_quantity: dec!(10),
            avg_fill_price: Some(dec!(410.25)),
        })
    );
    assert!(!desk.bridge.is_polling(&id));

    // 轮询已经停止
    let calls = desk.session.list_calls();
    sleep(Duration::from_secs(120)).await;
    assert_eq!(desk.session.list_calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_disconnected_session_exhausts_retries() {
    let session = ScriptedSession::new(1);
    session.set_connected(false);
    let desk = desk_with(session, fast_config());
    let id = desk.accepted("offline").await;

    let err = desk.bridge.submit_and_wait(&id).await.unwrap_err();
    match &err {
        ExecutionError::SubmissionFailure { attempts, cause } => {
            assert_eq!(*attempts, 3);
            assert!(cause.contains("not connected"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let signal = desk.load(&id).await;
    assert_eq!(signal.execution_status, Some(ExecutionStatus::Unknown));
    assert_eq!(signal.broker_order_ref, None);
    assert!(signal.submission.terminal);
    assert_eq!(signal.submission.attempts, 3);
    let failure = signal.submission.last_failure.unwrap();
    assert!(!failure.may_have_reached_gateway);
    assert_eq!(desk.session.place_calls(), 3);
    assert!(!desk.bridge.is_submitting(&id));

    // 不再自动重试
    sleep(Duration::from_secs(300)).await;
    assert_eq!(desk.session.place_calls(), 3);

    // 再次普通提交返回记录下的终态失败
    assert!(matches!(
        desk.bridge.submit(&id).await,
        Err(ExecutionError::SubmissionFailure { attempts: 3, .. })
    ));
    assert_eq!(desk.session.place_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_operator_resubmits_after_terminal_failure() {
    let session = ScriptedSession::new(5_001);
    session.set_connected(false);
    let desk = desk_with(session, fast_config());
    let id = desk.accepted("retry-me").await;
    desk.bridge.submit_and_wait(&id).await.unwrap_err();

    desk.session.set_connected(true);
    desk.bridge.resubmit(&id).await.unwrap();
    sleep(Duration::from_millis(10)).await;

    let signal = desk.load(&id).await;
    assert_eq!(signal.broker_order_ref, Some(PermId(5_001)));
    assert_eq!(signal.execution_status, Some(ExecutionStatus::Submitted));
    assert_eq!(signal.submission.resubmissions, 1);
    assert_eq!(signal.submission.attempts, 1);
    assert!(!signal.submission.terminal);
    assert_eq!(signal.submission.last_failure, None);

    assert!(matches!(
        desk.bridge.resubmit(&id).await,
        Err(ExecutionError::AlreadySubmitted(_))
    ));
    assert!(matches!(
        desk.bridge.submit(&id).await,
        Err(ExecutionError::AlreadySubmitted(_))
    ));
    assert_eq!(desk.session.place_calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_ambiguous_failure_is_not_retried() {
    let desk = desk_with(ScriptedSession::new(1), fast_config());
    desk.session
        .script_place(Err(BrokerError::Timeout("no ack within 5s".into())))
        .await;
    let id = desk.accepted("ambiguous").await;

    let err = desk.bridge.submit_and_wait(&id).await.unwrap_err();
    assert!(matches!(err, ExecutionError::SubmissionFailure { attempts: 1, .. }));
    assert_eq!(desk.session.place_calls(), 1);

    let signal = desk.load(&id).await;
    assert!(signal.submission.terminal);
    assert!(signal.submission.last_failure.unwrap().may_have_reached_gateway);

    // 可能已抵达网关，禁止直接重新提交
    assert!(matches!(
        desk.bridge.resubmit(&id).await,
        Err(ExecutionError::NotResubmittable(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_transient_rejection_then_success() {
    let desk = desk_with(ScriptedSession::new(900), fast_config());
    desk.session
        .script_place(Err(BrokerError::Rejected("margin check pending".into())))
        .await;
    let id = desk.accepted("flaky").await;

    let perm_id = desk.bridge.submit_and_wait(&id).await.unwrap();
    assert_eq!(perm_id, PermId(900));

    let signal = desk.load(&id).await;
    assert_eq!(signal.submission.attempts, 2);
    assert_eq!(signal.submission.last_failure, None);
    assert_eq!(signal.execution_status, Some(ExecutionStatus::Submitted));
    assert!(matches!(
        desk.bridge.resubmit(&id).await,
        Err(ExecutionError::AlreadySubmitted(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_submit_requires_accepted_signal() {
    let desk = desk_with(ScriptedSession::new(1), fast_config());
    let pending = desk.manager.create(msft("pending")).await.unwrap().id;
    assert!(matches!(
        desk.bridge.submit(&pending).await,
        Err(ExecutionError::NotAccepted(_))
    ));

    desk.manager.reject(&pending).await.unwrap();
    assert!(matches!(
        desk.bridge.submit_and_wait(&pending).await,
        Err(ExecutionError::NotAccepted(_))
    ));

    let missing = SignalId("missing".into());
    let err = desk.bridge.submit(&missing).await.unwrap_err();
    assert!(matches!(err, ExecutionError::Signal(SignalError::NotFound(_))));
    assert_eq!(err.code(), "NotFound");

    assert!(matches!(
        desk.bridge.resubmit(&pending).await,
        Err(ExecutionError::NotAccepted(_))
    ));
    assert_eq!(desk.session.place_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reject_after_submission_is_immutable() {
    let desk = desk_with(ScriptedSession::new(42), fast_config());
    let id = desk.accepted("locked").await;
    desk.bridge.submit_and_wait(&id).await.unwrap();

    assert!(matches!(
        desk.manager.reject(&id).await,
        Err(SignalError::ImmutableSignal(_))
    ));
    // 再次接受仍是幂等成功
    let signal = desk.manager.accept(&id).await.unwrap();
    assert_eq!(signal.lifecycle, LifecycleState::Accepted);
    assert_eq!(signal.broker_order_ref, Some(PermId(42)));
}

#[tokio::test(start_paused = true)]
async fn test_reject_during_backoff_stops_submission() {
    let session = ScriptedSession::new(1);
    session.set_connected(false);
    let mut config = fast_config();
    config.max_submit_attempts = 5;
    let desk = desk_with(session, config);
    let id = desk.accepted("overridden").await;

    desk.bridge.submit(&id).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(desk.session.place_calls(), 1);
    assert!(desk.bridge.is_submitting(&id));

    // 退避等待期间操作员改判为拒绝
    desk.manager.reject(&id).await.unwrap();
    desk.session.set_connected(true);
    sleep(Duration::from_secs(5)).await;

    let signal = desk.load(&id).await;
    assert_eq!(signal.lifecycle, LifecycleState::Rejected);
    assert_eq!(signal.broker_order_ref, None);
    assert_eq!(desk.session.place_calls(), 1);
    assert!(!desk.bridge.is_submitting(&id));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_submissions_place_one_order() {
    let desk = desk_with(ScriptedSession::new(300), fast_config());
    let id = desk.accepted("once").await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let bridge = desk.bridge.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move { bridge.submit_and_wait(&id).await }));
    }

    let mut placed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(perm_id) => {
                assert_eq!(perm_id, PermId(300));
                placed += 1;
            }
            Err(ExecutionError::SubmissionInFlight(_) | ExecutionError::AlreadySubmitted(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(placed, 1);
    assert_eq!(desk.session.place_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_order_missing_from_both_sets_is_unresolved() {
    let desk = desk_with(ScriptedSession::new(777), fast_config());
    let id = desk.accepted("window").await;
    desk.bridge.submit_and_wait(&id).await.unwrap();

    // 过渡窗口：两边都看不到
    desk.session.hide(PermId(777));
    sleep(Duration::from_millis(1_500)).await;
    let signal = desk.load(&id).await;
    assert_eq!(signal.execution_status, Some(ExecutionStatus::Unknown));
    assert!(desk.bridge.is_polling(&id));

    desk.session.complete(
        PermId(777),
        BrokerOrderStatus::Filled,
        dec!(10),
        Some(dec!(409.9)),
    );
    sleep(Duration::from_secs(10)).await;
    assert_eq!(
        desk.load(&id).await.execution_status,
        Some(ExecutionStatus::Filled)
    );
    assert!(!desk.bridge.is_polling(&id));
}

#[tokio::test(start_paused = true)]
async fn test_status_never_regresses() {
    let desk = desk_with(ScriptedSession::new(10), fast_config());
    let id = desk.accepted("mono").await;
    desk.bridge.submit_and_wait(&id).await.unwrap();

    assert_eq!(
        desk.bridge.reconcile(&id).await.unwrap(),
        Reconciliation::Working(ExecutionStatus::Open)
    );

    // 订单短暂消失，不回退为 UNKNOWN
    desk.session.hide(PermId(10));
    assert_eq!(
        desk.bridge.reconcile(&id).await.unwrap(),
        Reconciliation::Unresolved
    );
    assert_eq!(
        desk.load(&id).await.execution_status,
        Some(ExecutionStatus::Open)
    );

    desk.session
        .complete(PermId(10), BrokerOrderStatus::ApiCancelled, dec!(0), None);
    assert_eq!(
        desk.bridge.reconcile(&id).await.unwrap(),
        Reconciliation::Settled(ExecutionStatus::Cancelled)
    );

    // 终态之后券商再报挂单也不会改写
    desk.session
        .set_open(PermId(10), BrokerOrderStatus::Submitted, dec!(0));
    assert_eq!(
        desk.bridge.reconcile(&id).await.unwrap(),
        Reconciliation::Settled(ExecutionStatus::Cancelled)
    );
    assert_eq!(
        desk.load(&id).await.execution_status,
        Some(ExecutionStatus::Cancelled)
    );
}

#[tokio::test(start_paused = true)]
async fn test_partial_fill_is_recorded_while_open() {
    let desk = desk_with(ScriptedSession::new(11), fast_config());
    let id = desk.accepted("partial").await;
    desk.bridge.submit_and_wait(&id).await.unwrap();

    desk.session
        .set_open(PermId(11), BrokerOrderStatus::Submitted, dec!(4));
    desk.bridge.reconcile(&id).await.unwrap();

    let signal = desk.load(&id).await;
    assert_eq!(signal.execution_status, Some(ExecutionStatus::Open));
    assert_eq!(signal.fill.unwrap().filled_quantity, dec!(4));
}

#[tokio::test(start_paused = true)]
async fn test_poll_timeout_stops_polling() {
    let mut config = fast_config();
    config.poll_timeout_secs = 5;
    let desk = desk_with(ScriptedSession::new(55), config);
    let id = desk.accepted("stuck").await;
    desk.bridge.submit_and_wait(&id).await.unwrap();

    sleep(Duration::from_secs(60)).await;
    assert!(!desk.bridge.is_polling(&id));
    assert_eq!(
        desk.load(&id).await.execution_status,
        Some(ExecutionStatus::Open)
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_polling() {
    let desk = desk_with(ScriptedSession::new(60), fast_config());
    let id = desk.accepted("cancel").await;
    desk.bridge.submit_and_wait(&id).await.unwrap();

    assert!(desk.bridge.cancel_polling(&id));
    assert!(!desk.bridge.cancel_polling(&id));
    assert!(!desk.bridge.is_polling(&id));

    let calls = desk.session.list_calls();
    sleep(Duration::from_secs(30)).await;
    assert_eq!(desk.session.list_calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_resume_polling_after_restart() {
    let desk = desk_with(ScriptedSession::new(1), fast_config());

    let in_flight = SignalRecord {
        id: "restored".into(),
        symbol: Some("MSFT".into()),
        units: Some("10".into()),
        action: Some("BUY".into()),
        order_type: Some("MARKET".into()),
        lifecycle: Some("ACCEPTED".into()),
        broker_order_ref: Some(4_242),
        execution_status: Some("SUBMITTED".into()),
        ..Default::default()
    };
    let settled = SignalRecord {
        id: "settled".into(),
        broker_order_ref: Some(4_243),
        execution_status: Some("FILLED".into()),
        ..in_flight.clone()
    };
    desk.store.put_if_absent(&in_flight).await.unwrap();
    desk.store.put_if_absent(&settled).await.unwrap();

    desk.session.complete(
        PermId(4_242),
        BrokerOrderStatus::Filled,
        dec!(10),
        Some(dec!(400)),
    );

    assert_eq!(desk.bridge.resume_polling().await.unwrap(), 1);
    assert!(desk.bridge.is_polling(&SignalId("restored".into())));
    assert!(!desk.bridge.is_polling(&SignalId("settled".into())));
    // 重复调用不会重复挂载
    assert_eq!(desk.bridge.resume_polling().await.unwrap(), 0);

    sleep(Duration::from_secs(5)).await;
    let restored = desk.load(&SignalId("restored".into())).await;
    assert_eq!(restored.execution_status, Some(ExecutionStatus::Filled));
    assert_eq!(desk.bridge.active_pollers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_clears_markers_and_refuses_work() {
    let desk = desk_with(ScriptedSession::new(70), fast_config());
    let first = desk.accepted("a").await;
    let second = desk.accepted("b").await;
    desk.bridge.submit_and_wait(&first).await.unwrap();
    assert!(desk.bridge.is_polling(&first));

    desk.bridge.shutdown().await;

    assert!(!desk.bridge.is_polling(&first));
    assert_eq!(desk.bridge.active_pollers(), 0);
    assert!(matches!(
        desk.bridge.submit(&second).await,
        Err(ExecutionError::ShuttingDown)
    ));
    assert_eq!(desk.bridge.resume_polling().await.unwrap(), 0);

    let calls = desk.session.list_calls();
    sleep(Duration::from_secs(30)).await;
    assert_eq!(desk.session.list_calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_retry_backoff() {
    let session = ScriptedSession::new(1);
    session.set_connected(false);
    let mut config = fast_config();
    config.submit_backoff_initial_ms = 60_000;
    config.submit_backoff_max_ms = 60_000;
    let desk = desk_with(session, config);
    let id = desk.accepted("slow").await;

    desk.bridge.submit(&id).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert!(desk.bridge.is_submitting(&id));

    desk.bridge.shutdown().await;
    assert!(!desk.bridge.is_submitting(&id));
    assert_eq!(desk.session.place_calls(), 1);

    // 被中断的提交没有被标记为终态失败
    let signal = desk.load(&id).await;
    assert!(!signal.submission.terminal);
    assert_eq!(signal.execution_status, Some(ExecutionStatus::Unknown));
}

/// 第一次写入券商 ID 时报错，其余操作转发给内存存储
#[derive(Default)]
struct LosesBrokerRef {
    inner: MemorySignalStore,
    failed: AtomicBool,
}

#[async_trait]
impl SignalStore for LosesBrokerRef {
    async fn get(&self, id: &SignalId) -> Result<Option<SignalRecord>, StoreError> {
        self.inner.get(id).await
    }

    async fn put_if_absent(&self, record: &SignalRecord) -> Result<InsertOutcome, StoreError> {
        self.inner.put_if_absent(record).await
    }

    async fn update_fields(
        &self,
        id: &SignalId,
        guard: &UpdateGuard,
        patch: &SignalPatch,
    ) -> Result<u64, StoreError> {
        if patch.broker_order_ref.is_some() && !self.failed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Database("disk I/O error".into()));
        }
        self.inner.update_fields(id, guard, patch).await
    }

    async fn list_all(&self, limit: usize) -> Result<Vec<SignalRecord>, StoreError> {
        self.inner.list_all(limit).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_unrecorded_order_is_never_placed_twice() {
    let store = Arc::new(LosesBrokerRef::default());
    let session = Arc::new(ScriptedSession::new(31));
    let (manager, bridge) = wire(store, session.clone(), fast_config());
    let id = manager.create(msft("lost-ref")).await.unwrap().id;
    manager.accept(&id).await.unwrap();

    // 券商已受理，但券商 ID 没能落库
    let err = bridge.submit_and_wait(&id).await.unwrap_err();
    match &err {
        ExecutionError::SubmissionFailure { attempts, cause } => {
            assert_eq!(*attempts, 1);
            assert!(cause.contains("31"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(session.place_calls(), 1);
    assert!(!bridge.is_polling(&id));

    let signal = manager.get(&id).await.unwrap();
    assert_eq!(signal.broker_order_ref, None);
    assert_eq!(signal.execution_status, Some(ExecutionStatus::Unknown));
    assert!(signal.submission.terminal);
    assert!(!signal.submission.pending);
    assert!(signal.submission.last_failure.unwrap().may_have_reached_gateway);

    // 存储恢复后也不能再下第二笔
    assert!(matches!(
        bridge.submit(&id).await,
        Err(ExecutionError::SubmissionFailure { .. })
    ));
    assert!(matches!(
        bridge.resubmit(&id).await,
        Err(ExecutionError::NotResubmittable(_))
    ));
    sleep(Duration::from_secs(60)).await;
    assert_eq!(session.place_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_attempt_blocks_submission() {
    let desk = desk_with(ScriptedSession::new(1), fast_config());
    let id = desk.accepted("interrupted").await;

    // 进程在下单调用中途退出：pending 已落库，结果没有写回
    let patch = SignalPatch {
        submission: Some(SubmissionState {
            attempts: 1,
            pending: true,
            ..Default::default()
        }),
        ..Default::default()
    };
    let hit = desk
        .store
        .update_fields(&id, &UpdateGuard::AcceptedUnsubmitted, &patch)
        .await
        .unwrap();
    assert_eq!(hit, 1);

    assert_eq!(desk.bridge.resume_polling().await.unwrap(), 0);
    assert!(matches!(
        desk.bridge.submit(&id).await,
        Err(ExecutionError::SubmissionFailure { attempts: 1, .. })
    ));
    assert!(matches!(
        desk.bridge.submit_and_wait(&id).await,
        Err(ExecutionError::SubmissionFailure { .. })
    ));
    assert!(matches!(
        desk.bridge.resubmit(&id).await,
        Err(ExecutionError::NotResubmittable(_))
    ));
    assert!(!desk.bridge.is_submitting(&id));
    assert_eq!(desk.session.place_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_resubmit_keeps_its_own_background_handle() {
    let session = ScriptedSession::new(1);
    session.set_connected(false);
    let desk = desk_with(session, fast_config());
    let id = desk.accepted("twice").await;

    desk.bridge.submit(&id).await.unwrap();
    assert_eq!(desk.bridge.active_submissions(), 1);
    sleep(Duration::from_secs(5)).await;
    assert!(!desk.bridge.is_submitting(&id));
    assert_eq!(desk.bridge.active_submissions(), 0);
    assert_eq!(desk.session.place_calls(), 3);

    // 新一轮登记自己的句柄，上一轮的清理不会把它移走
    desk.bridge.resubmit(&id).await.unwrap();
    assert_eq!(desk.bridge.active_submissions(), 1);
    sleep(Duration::from_millis(10)).await;
    assert!(desk.bridge.is_submitting(&id));
    assert_eq!(desk.bridge.active_submissions(), 1);
    assert_eq!(desk.session.place_calls(), 4);

    desk.bridge.shutdown().await;
    assert_eq!(desk.bridge.active_submissions(), 0);
    assert!(!desk.bridge.is_submitting(&id));
    assert_eq!(desk.session.place_calls(), 4);
}
