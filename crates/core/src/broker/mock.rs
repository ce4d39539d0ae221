//! 测试用的可编排券商会话，仅在 `test-utils` feature 下编译。

use super::entity::{BrokerOrder, BrokerOrderStatus, OrderRequest, PermId};
use super::error::BrokerError;
use super::port::BrokerSession;
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// # Summary
/// 可编排的内存券商会话。
///
/// # Logic
/// - `place_order` 优先消费预先编排的结果；队列为空时分配递增的 PermId 并放入挂单列表。
/// - 测试可以直接操纵挂单/已完成两个集合，模拟券商侧的异步状态迁移。
pub struct ScriptedSession {
    connected: AtomicBool,
    next_perm_id: AtomicI64,
    place_script: Mutex<VecDeque<Result<PermId, BrokerError>>>,
    placed: Mutex<Vec<OrderRequest>>,
    place_calls: AtomicUsize,
    list_calls: AtomicUsize,
    open: DashMap<PermId, BrokerOrder>,
    completed: DashMap<PermId, BrokerOrder>,
}

impl ScriptedSession {
    pub fn new(first_perm_id: i64) -> Self {
        Self {
            connected: AtomicBool::new(true),
            next_perm_id: AtomicI64::new(first_perm_id),
            place_script: Mutex::new(VecDeque::new()),
            placed: Mutex::new(Vec::new()),
            place_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            open: DashMap::new(),
            completed: DashMap::new(),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// 追加一个 `place_order` 的预设结果
    pub async fn script_place(&self, result: Result<PermId, BrokerError>) {
        self.place_script.lock().await.push_back(result);
    }

    /// 把订单放入挂单列表 (覆盖同 ID 的旧快照)
    pub fn set_open(&self, perm_id: PermId, status: BrokerOrderStatus, filled: Decimal) {
        self.completed.remove(&perm_id);
        self.open.insert(
            perm_id,
            BrokerOrder {
                perm_id,
                status,
                filled_quantity: filled,
                avg_fill_price: None,
            },
        );
    }

    /// 把订单移入已完成列表
    pub fn complete(
        &self,
        perm_id: PermId,
        status: BrokerOrderStatus,
        filled: Decimal,
        avg_price: Option<Decimal>,
    ) {
        self.open.remove(&perm_id);
        self.completed.insert(
            perm_id,
            BrokerOrder {
                perm_id,
                status,
                filled_quantity: filled,
                avg_fill_price: avg_price,
            },
        );
    }

    /// 让订单从两个集合中同时消失，模拟券商侧的过渡窗口
    pub fn hide(&self, perm_id: PermId) {
        self.open.remove(&perm_id);
        self.completed.remove(&perm_id);
    }

    pub async fn placed_requests(&self) -> Vec<OrderRequest> {
        self.placed.lock().await.clone()
    }

    pub fn place_calls(&self) -> usize {
        self.place_calls.load(Ordering::SeqCst)
    }

    /// `list_open_orders` 被调用的次数，用于断言轮询已停止
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl BrokerSession for ScriptedSession {
    async fn connect(&self) -> Result<(), BrokerError> {
        self.set_connected(true);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        self.set_connected(false);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<PermId, BrokerError> {
        self.place_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.place_script.lock().await.pop_front() {
            if let Ok(perm_id) = &result {
                self.placed.lock().await.push(request.clone());
                self.set_open(*perm_id, BrokerOrderStatus::PreSubmitted, Decimal::ZERO);
            }
            return result;
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BrokerError::NotConnected);
        }
        let perm_id = PermId(self.next_perm_id.fetch_add(1, Ordering::SeqCst));
        self.placed.lock().await.push(request.clone());
        self.set_open(perm_id, BrokerOrderStatus::PreSubmitted, Decimal::ZERO);
        Ok(perm_id)
    }

    async fn list_open_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BrokerError::NotConnected);
        }
        Ok(self.open.iter().map(|e| e.value().clone()).collect())
    }

    async fn list_completed_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BrokerError::NotConnected);
        }
        Ok(self.completed.iter().map(|e| e.value().clone()).collect())
    }
}
