//! # API 服务启动器
//!
//! 组装 axum 路由、挂载 Swagger UI、配置 CORS 并绑定 TCP 端口对外提供服务。
//! 本模块不直接启动 `main()`, 而是由 `crates/app` 的 DI 容器持有并调用。

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_swagger_ui::SwaggerUi;

use desk_core::broker::port::BrokerSession;
use desk_manager::execution::bridge::ExecutionBridge;
use desk_manager::signal::SignalManager;

use crate::routes::{health, signal};

// ============================================================
//  共享应用状态
// ============================================================

/// 全局应用状态，通过 axum 的 `State` 提取器注入到每个 Handler 中。
///
/// # Invariants
/// - 所有字段在服务启动前由 DI 容器注入，生命周期与进程等同。
#[derive(Clone)]
pub struct AppState {
    /// 信号生命周期管理 (Facade)
    pub signal_manager: Arc<SignalManager>,
    /// 订单提交与对账
    pub execution: Arc<ExecutionBridge>,
    /// 券商会话 (仅用于健康检查)
    pub session: Arc<dyn BrokerSession>,
    /// 接受后是否立即提交
    pub auto_submit_on_accept: bool,
}

// ============================================================
//  OpenAPI 文档定义
// ============================================================

/// 全局 OpenAPI 文档结构
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Signal Desk API",
        version = "0.1.0",
        description = "交易信号审批台。接收外部 webhook 信号，由操作员审批后提交券商并持续对账。",
        license(name = "MIT")
    ),
    tags(
        (name = "信号 (Signal)", description = "信号的接入、审批、改量与查询"),
        (name = "执行 (Execution)", description = "已接受信号的券商提交与重新提交"),
        (name = "系统 (System)", description = "健康检查")
    )
)]
pub struct ApiDoc;

// ============================================================
//  服务构建与启动
// ============================================================

/// 构建完整的 axum 应用路由树 (含 Swagger UI 与 CORS)。
pub fn build_router(state: AppState) -> Router {
    let signal_router = OpenApiRouter::new()
        .routes(routes!(signal::receive_webhook))
        .routes(routes!(signal::list_signals, signal::create_signal))
        .routes(routes!(signal::get_signal))
        .routes(routes!(signal::accept_signal))
        .routes(routes!(signal::reject_signal))
        .routes(routes!(signal::update_units));

    let execution_router = OpenApiRouter::new()
        .routes(routes!(signal::submit_signal))
        .routes(routes!(signal::resubmit_signal))
        .routes(routes!(signal::reconcile_signal));

    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(signal_router)
        .merge(execution_router)
        .routes(routes!(health::health_check))
        .with_state(state)
        .split_for_parts();

    // 操作员界面与 API 不同源部署
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        .layer(cors)
}

/// 绑定端口并启动 HTTP 监听，直到 `shutdown` 完成。
///
/// # Arguments
/// * `state` - 由外部 DI 容器注入的共享状态
/// * `bind_addr` - 监听的地址与端口，如 `"0.0.0.0:8000"`
/// * `shutdown` - 优雅停机信号，完成后停止接受新连接
pub async fn start_server<F>(
    state: AppState,
    bind_addr: &str,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);

    tracing::info!("Signal desk API listening on {}", bind_addr);
    tracing::info!("Swagger UI: http://{}/swagger-ui/", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
