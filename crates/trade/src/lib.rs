//! # `desk-trade` - 券商会话适配器
//!
//! - `paper`: 模拟券商网关，维护挂单与已完成两个订单集合。
//! - `session`: 为非线程安全的会话实现提供串行化包装。

pub mod paper;
pub mod session;
