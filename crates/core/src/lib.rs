//! # `desk-core` - 领域核心
//!
//! 信号审批台的实体定义与端口 (Port) 抽象。
//! 本 crate 不包含任何基础设施实现，存储与券商通道均通过 Trait 注入。

pub mod broker;
pub mod common;
pub mod config;
pub mod signal;
pub mod store;
