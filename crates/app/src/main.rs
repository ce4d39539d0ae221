mod logging;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use desk_api::server::{AppState, start_server};
use desk_core::broker::port::BrokerSession;
use desk_core::common::time::RealTimeProvider;
use desk_core::config::StoreBackend;
use desk_core::store::port::SignalStore;
use desk_manager::execution::bridge::ExecutionBridge;
use desk_manager::lock::KeyedLocks;
use desk_manager::signal::SignalManager;
use desk_store::memory::MemorySignalStore;
use desk_store::signal::SqliteSignalStore;
use desk_trade::paper::PaperBroker;
use desk_trade::session::SerializedSession;
use tracing::{info, warn};

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
/// 负责实例化所有具体实现组件并通过 Arc<dyn Trait> 注入到 SignalManager 与 ExecutionBridge。
///
/// # Logic
/// 1. 加载分层配置并初始化全局日志。
/// 2. 实例化基础设施层 (Store、券商会话)。
/// 3. 构造应用服务层，恢复未完成的对账轮询。
/// 4. 启动 HTTP 服务，收到 Ctrl+C 后依次停止接入、停止执行桥、断开券商。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // 1. 配置与日志
    let config_path = std::env::var("DESK_CONFIG").ok();
    let config = settings::load(config_path.as_deref())?;
    let _log_guard = logging::init(&config.log)?;
    info!("Signal desk starting...");

    // 2. 存储
    let store: Arc<dyn SignalStore> = match config.database.backend {
        StoreBackend::Sqlite => {
            desk_store::config::set_root_dir(PathBuf::from(&config.database.data_dir));
            Arc::new(SqliteSignalStore::new().await?)
        }
        StoreBackend::Memory => {
            warn!("Using in-memory signal store, signals will not survive a restart");
            Arc::new(MemorySignalStore::new())
        }
    };

    // 3. 券商会话
    info!(
        host = %config.broker.host,
        port = config.broker.port,
        client_id = config.broker.client_id,
        "Connecting paper broker session"
    );
    let paper = Arc::new(PaperBroker::new(
        config.broker.starting_perm_id,
        config.broker.auto_fill,
    ));
    let session: Arc<dyn BrokerSession> = if config.broker.serialize_calls {
        Arc::new(SerializedSession::new(paper))
    } else {
        paper
    };
    if let Err(e) = session.connect().await {
        // 断连时仍可接收与审批信号，提交会走重试逻辑
        warn!("Broker session unavailable at startup: {}", e);
    }

    // 4. 应用服务层
    let clock = Arc::new(RealTimeProvider);
    let locks = Arc::new(KeyedLocks::new());
    let signal_manager = SignalManager::new(store.clone(), clock.clone(), locks.clone());
    let execution = ExecutionBridge::new(
        store,
        session.clone(),
        clock,
        locks,
        config.execution.clone(),
    );
    let resumed = execution.resume_polling().await?;
    info!(resumed, "Execution bridge ready");

    // 5. HTTP 服务
    let state = AppState {
        signal_manager,
        execution: execution.clone(),
        session: session.clone(),
        auto_submit_on_accept: config.execution.auto_submit_on_accept,
    };
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    start_server(state, &bind_addr, shutdown_signal()).await?;

    // 6. 停机
    info!("Shutdown signal received. Stopping execution bridge...");
    execution.shutdown().await;
    if let Err(e) = session.disconnect().await {
        warn!("Broker disconnect failed: {}", e);
    }
    info!("Signal desk stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
