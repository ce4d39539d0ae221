//! # `desk-store` - 信号存储适配器
//!
//! `SignalStore` 端口的两个实现：基于 SQLite 的持久化存储，以及基于 `DashMap` 的内存存储。

pub mod config;
pub mod memory;
pub mod signal;
