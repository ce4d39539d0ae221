use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use desk_core::common::time::FakeClockProvider;
use desk_core::signal::entity::{Action, LifecycleState, NewSignal, OrderType, SignalId};
use desk_core::signal::error::SignalError;
use desk_core::signal::record::SignalRecord;
use desk_core::store::port::SignalStore;
use desk_manager::lock::KeyedLocks;
use desk_manager::signal::{DEFAULT_LIST_LIMIT, SignalManager};
use desk_store::memory::MemorySignalStore;
use desk_store::signal::SqliteSignalStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tempfile::tempdir;

struct Fixture {
    store: Arc<MemorySignalStore>,
    clock: Arc<FakeClockProvider>,
    manager: Arc<SignalManager>,
}

fn setup() -> Fixture {
    let store = Arc::new(MemorySignalStore::new());
    let clock = Arc::new(FakeClockProvider::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap(),
    ));
    let manager = SignalManager::new(store.clone(), clock.clone(), Arc::new(KeyedLocks::new()));
    Fixture {
        store,
        clock,
        manager,
    }
}

fn market(id: &str, symbol: &str, units: Decimal) -> NewSignal {
    NewSignal {
        id: Some(SignalId(id.to_string())),
        symbol: symbol.to_string(),
        units,
        action: Action::Buy,
        order_type: OrderType::Market,
        price: None,
    }
}

fn limit(id: &str, price: Option<Decimal>) -> NewSignal {
    NewSignal {
        id: Some(SignalId(id.to_string())),
        symbol: "AAPL".to_string(),
        units: dec!(-5),
        action: Action::Sell,
        order_type: OrderType::Limit,
        price,
    }
}

#[tokio::test]
async fn test_create_persists_pending_signal() {
    let fx = setup();
    let signal = fx.manager.create(market("s-1", "MSFT", dec!(10))).await.unwrap();

    assert_eq!(signal.lifecycle, LifecycleState::Pending);
    assert_eq!(signal.created_at, fx.clock_now());
    let stored = fx.manager.get(&signal.id).await.unwrap();
    assert_eq!(stored, signal);
}

#[tokio::test]
async fn test_create_generates_id_when_absent() {
    let fx = setup();
    let mut payload = market("ignored", "MSFT", dec!(1));
    payload.id = None;

    let a = fx.manager.create(payload.clone()).await.unwrap();
    let b = fx.manager.create(payload).await.unwrap();
    assert!(!a.id.0.is_empty());
    assert_ne!(a.id, b.id);
    assert_eq!(fx.store.len(), 2);
}

#[tokio::test]
async fn test_duplicate_create_keeps_single_record() {
    let fx = setup();
    fx.manager.create(market("dup", "MSFT", dec!(10))).await.unwrap();

    let err = fx
        .manager
        .create(market("dup", "TSLA", dec!(99)))
        .await
        .unwrap_err();
    assert!(matches!(err, SignalError::DuplicateSignal(_)));
    assert_eq!(err.code(), "DuplicateSignal");

    // 存储中只有第一条，内容未被覆盖
    let all = fx.manager.list(DEFAULT_LIST_LIMIT).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].symbol, "MSFT");
    assert_eq!(all[0].units, dec!(10));
}

#[tokio::test]
async fn test_price_coupling_is_enforced_on_create() {
    let fx = setup();

    let mut with_price = market("m-1", "MSFT", dec!(1));
    with_price.price = Some(dec!(100));
    assert!(matches!(
        fx.manager.create(with_price).await,
        Err(SignalError::InvalidSignal(_))
    ));
    assert!(matches!(
        fx.manager.create(limit("l-1", None)).await,
        Err(SignalError::InvalidSignal(_))
    ));
    assert!(matches!(
        fx.manager.create(limit("l-2", Some(dec!(0)))).await,
        Err(SignalError::InvalidSignal(_))
    ));
    assert!(matches!(
        fx.manager.create(market("z", "MSFT", dec!(0))).await,
        Err(SignalError::InvalidSignal(_))
    ));
    assert!(fx.store.is_empty());

    let ok = fx.manager.create(limit("l-3", Some(dec!(189.25)))).await.unwrap();
    assert_eq!(ok.price, Some(dec!(189.25)));
    assert_eq!(ok.units, dec!(-5));
    assert_eq!(ok.action, Action::Sell);
}

#[tokio::test]
async fn test_accept_then_reject_never_both() {
    let fx = setup();
    let id = fx.manager.create(market("s", "MSFT", dec!(10))).await.unwrap().id;

    let accepted = fx.manager.accept(&id).await.unwrap();
    assert!(accepted.is_accepted() && !accepted.is_rejected());

    let rejected = fx.manager.reject(&id).await.unwrap();
    assert!(!rejected.is_accepted() && rejected.is_rejected());

    let stored = fx.manager.get(&id).await.unwrap();
    assert_eq!(stored.lifecycle, LifecycleState::Rejected);

    // 操作员可以再次改判
    let again = fx.manager.accept(&id).await.unwrap();
    assert_eq!(again.lifecycle, LifecycleState::Accepted);
}

#[tokio::test]
async fn test_accept_is_idempotent() {
    let fx = setup();
    let id = fx.manager.create(market("s", "MSFT", dec!(10))).await.unwrap().id;

    let first = fx.manager.accept(&id).await.unwrap();
    fx.clock.advance(ChronoDuration::minutes(5));
    let second = fx.manager.accept(&id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(fx.manager.get(&id).await.unwrap(), first);
}

#[tokio::test]
async fn test_update_units_only_while_pending() {
    let fx = setup();
    let id = fx.manager.create(market("s", "MSFT", dec!(10))).await.unwrap().id;

    fx.clock.advance(ChronoDuration::seconds(30));
    let updated = fx.manager.update_units(&id, dec!(25)).await.unwrap();
    assert_eq!(updated.units, dec!(25));
    assert_eq!(updated.symbol, "MSFT");
    assert_eq!(updated.lifecycle, LifecycleState::Pending);
    assert!(updated.updated_at > updated.created_at);

    assert!(matches!(
        fx.manager.update_units(&id, dec!(0)).await,
        Err(SignalError::InvalidSignal(_))
    ));

    fx.manager.accept(&id).await.unwrap();
    let before = fx.store.get(&id).await.unwrap();
    let err = fx.manager.update_units(&id, dec!(50)).await.unwrap_err();
    assert!(matches!(err, SignalError::ImmutableSignal(_)));

    // 存储不变
    assert_eq!(fx.store.get(&id).await.unwrap(), before);
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let fx = setup();
    let id = SignalId("missing".into());
    assert!(matches!(fx.manager.accept(&id).await, Err(SignalError::NotFound(_))));
    assert!(matches!(fx.manager.reject(&id).await, Err(SignalError::NotFound(_))));
    assert!(matches!(
        fx.manager.update_units(&id, dec!(1)).await,
        Err(SignalError::NotFound(_))
    ));
    assert!(matches!(fx.manager.get(&id).await, Err(SignalError::NotFound(_))));
}

#[tokio::test]
async fn test_list_fills_defaults_and_skips_invalid_records() {
    let fx = setup();
    fx.manager.create(market("fresh", "MSFT", dec!(10))).await.unwrap();

    // 旧版本写入的记录：没有 order_type / lifecycle 字段
    let legacy = SignalRecord {
        id: "legacy".into(),
        symbol: Some("IBM".into()),
        units: Some("3".into()),
        action: Some("BUY".into()),
        ..Default::default()
    };
    // 旧数据里 MARKET 单带有价格，读取时清空
    let stray_price = SignalRecord {
        id: "stray".into(),
        symbol: Some("NVDA".into()),
        units: Some("1".into()),
        action: Some("SELL".into()),
        order_type: Some("MKT".into()),
        price: Some("880.0".into()),
        ..Default::default()
    };
    // 补齐默认值后仍不合法：LIMIT 缺价格
    let broken = SignalRecord {
        id: "broken".into(),
        symbol: Some("AMD".into()),
        units: Some("2".into()),
        action: Some("BUY".into()),
        order_type: Some("LIMIT".into()),
        ..Default::default()
    };
    // 缺少 action
    let no_action = SignalRecord {
        id: "no-action".into(),
        symbol: Some("AMD".into()),
        units: Some("2".into()),
        ..Default::default()
    };
    for record in [&legacy, &broken, &stray_price, &no_action] {
        fx.store.put_if_absent(record).await.unwrap();
    }

    let listed = fx.manager.list(DEFAULT_LIST_LIMIT).await.unwrap();
    let ids: Vec<&str> = listed.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["fresh", "legacy", "stray"]);

    let legacy = &listed[1];
    assert_eq!(legacy.order_type, OrderType::Market);
    assert_eq!(legacy.price, None);
    assert_eq!(legacy.lifecycle, LifecycleState::Pending);
    assert_eq!(legacy.broker_order_ref, None);
    assert_eq!(legacy.execution_status, None);
    assert_eq!(listed[2].price, None);

    let limited = fx.manager.list(2).await.unwrap();
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn test_concurrent_decisions_leave_consistent_state() {
    let fx = setup();
    let id = fx.manager.create(market("race", "MSFT", dec!(10))).await.unwrap().id;

    let mut handles = Vec::new();
    for i in 0..40 {
        let manager = fx.manager.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                manager.accept(&id).await
            } else {
                manager.reject(&id).await
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let signal = fx.manager.get(&id).await.unwrap();
    assert!(signal.is_accepted() ^ signal.is_rejected());
}

#[tokio::test]
async fn test_concurrent_creates_with_same_id() {
    let fx = setup();
    let mut handles = Vec::new();
    for _ in 0..16 {
        let manager = fx.manager.clone();
        handles.push(tokio::spawn(async move {
            manager.create(market("same", "MSFT", dec!(1))).await
        }));
    }
    let mut created = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(SignalError::DuplicateSignal(_)) => duplicates += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(duplicates, 15);
    assert_eq!(fx.store.len(), 1);
}

#[tokio::test]
async fn test_lifecycle_on_sqlite_store() -> anyhow::Result<()> {
    let tmp_dir = tempdir()?;
    let store = Arc::new(SqliteSignalStore::open(&tmp_dir.path().join("signals.db")).await?);
    let manager = SignalManager::new(
        store,
        Arc::new(FakeClockProvider::new(Utc::now())),
        Arc::new(KeyedLocks::new()),
    );

    let id = manager.create(limit("sql-1", Some(dec!(101.5)))).await?.id;
    assert!(matches!(
        manager.create(limit("sql-1", Some(dec!(1)))).await,
        Err(SignalError::DuplicateSignal(_))
    ));
    manager.update_units(&id, dec!(-7)).await?;
    manager.reject(&id).await?;

    let listed = manager.list(DEFAULT_LIST_LIMIT).await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].units, dec!(-7));
    assert_eq!(listed[0].price, Some(dec!(101.5)));
    assert_eq!(listed[0].lifecycle, LifecycleState::Rejected);
    Ok(())
}

impl Fixture {
    fn clock_now(&self) -> chrono::DateTime<Utc> {
        use desk_core::common::time::TimeProvider;
        self.clock.now()
    }
}
