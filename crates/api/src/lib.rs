//! # `desk-api` - HTTP 接入层
//!
//! 信号审批台的 HTTP/REST 服务入口。
//! 使用 `axum` 构建路由与控制器，通过 `utoipa` 自动生成 OpenAPI 3.0 Swagger 文档。
//!
//! ## 架构职责
//! - 接收外部 webhook 推送的信号与操作员界面的审批请求
//! - 调用下层 `SignalManager` 与 `ExecutionBridge` 完成业务操作
//! - 将领域模型转换为 DTO，将领域错误映射为 HTTP 状态码与稳定错误码

pub mod error;
pub mod routes;
pub mod server;
pub mod types;
