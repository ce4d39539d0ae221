use super::entity::{BrokerOrder, OrderRequest, PermId};
use super::error::BrokerError;
use async_trait::async_trait;

/// # Summary
/// 券商会话能力接口。整个进程共享同一个会话，由 DI 容器显式管理其连接生命周期。
///
/// # Invariants
/// - 实现必须可被多个提交/轮询协程并发调用；不具备线程安全的实现应包一层串行化适配器。
/// - 挂单列表与已完成列表在任一时刻不保证一致，同一订单可能短暂地在两者中都不出现。
#[async_trait]
pub trait BrokerSession: Send + Sync {
    /// 建立与网关的连接
    async fn connect(&self) -> Result<(), BrokerError>;

    /// 断开连接
    async fn disconnect(&self) -> Result<(), BrokerError>;

    /// 会话当前是否可用
    async fn is_connected(&self) -> bool;

    /// 提交一笔委托
    ///
    /// # Returns
    /// * `Ok(PermId)` - 网关分配的永久订单 ID
    /// * `Err(BrokerError)` - 未连接、被拒或通讯失败
    async fn place_order(&self, request: &OrderRequest) -> Result<PermId, BrokerError>;

    /// 查询仍在工作中的订单
    async fn list_open_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError>;

    /// 查询已完结 (成交/撤销/失效) 的订单
    async fn list_completed_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError>;
}
