use async_trait::async_trait;
use desk_core::broker::entity::{BrokerOrder, OrderRequest, PermId};
use desk_core::broker::error::BrokerError;
use desk_core::broker::port::BrokerSession;
use std::sync::Arc;
use tokio::sync::Mutex;

/// # Summary
/// 串行化包装：所有调用排队经过同一把异步互斥锁，
/// 用于底层会话实现不支持并发调用的情况。
///
/// # Invariants
/// - 任一时刻最多只有一个调用进入 `inner`。
pub struct SerializedSession {
    inner: Arc<dyn BrokerSession>,
    gate: Mutex<()>,
}

impl SerializedSession {
    pub fn new(inner: Arc<dyn BrokerSession>) -> Self {
        Self {
            inner,
            gate: Mutex::new(()),
        }
    }
}

#[async_trait]
impl BrokerSession for SerializedSession {
    async fn connect(&self) -> Result<(), BrokerError> {
        let _turn = self.gate.lock().await;
        self.inner.connect().await
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        let _turn = self.gate.lock().await;
        self.inner.disconnect().await
    }

    async fn is_connected(&self) -> bool {
        let _turn = self.gate.lock().await;
        self.inner.is_connected().await
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<PermId, BrokerError> {
        let _turn = self.gate.lock().await;
        self.inner.place_order(request).await
    }

    async fn list_open_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
        let _turn = self.gate.lock().await;
        self.inner.list_open_orders().await
    }

    async fn list_completed_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
        let _turn = self.gate.lock().await;
        self.inner.list_completed_orders().await
    }
}
