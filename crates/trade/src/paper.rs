use async_trait::async_trait;
use desk_core::broker::entity::{BrokerOrder, BrokerOrderStatus, OrderRequest, PermId};
use desk_core::broker::error::BrokerError;
use desk_core::broker::port::BrokerSession;
use desk_core::signal::entity::OrderType;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 已完成列表默认保留的订单数
pub const DEFAULT_COMPLETED_RETENTION: usize = 1_000;

/// 模拟订单在券商侧所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// 工作中，出现在挂单列表
    Working,
    /// 刚完结，两个列表里都暂时看不到
    InTransit,
    /// 已完结，出现在已完成列表
    Done,
}

#[derive(Debug, Clone)]
struct PaperOrder {
    request: OrderRequest,
    status: BrokerOrderStatus,
    filled: Decimal,
    avg_price: Option<Decimal>,
    phase: Phase,
    listed_open: bool,
    /// 完结顺序，裁剪已完成列表时先丢最早完结的
    finished_seq: u64,
}

impl PaperOrder {
    fn snapshot(&self, perm_id: PermId) -> BrokerOrder {
        BrokerOrder {
            perm_id,
            status: self.status,
            filled_quantity: self.filled,
            avg_fill_price: self.avg_price,
        }
    }

    /// 以给定价格全量成交，进入过渡窗口
    fn fill(&mut self, price: Option<Decimal>, seq: u64) {
        self.filled = self.request.quantity;
        self.avg_price = price.or(self.request.limit_price);
        self.status = BrokerOrderStatus::Filled;
        self.finish(seq);
    }

    fn finish(&mut self, seq: u64) {
        self.phase = Phase::InTransit;
        self.finished_seq = seq;
    }
}

/// # Summary
/// 纸面交易用的模拟券商网关，实现 `BrokerSession`。
///
/// # Logic
/// - 下单后订单进入挂单列表，状态为 `Submitted`。
/// - 成交或撤销后订单先进入过渡窗口：下一次查询已完成列表时仍不可见，再下一次才出现，
///   以复现真实网关中两个列表不一致的时刻。
/// - 开启 `auto_fill` 时，市价单在被挂单查询看到一次之后自动成交。
/// - 已完成列表只保留最近完结的 `completed_retention` 笔订单，更早的从内存中删除。
///
/// # Invariants
/// - 永久订单 ID 单调递增，永不复用。
/// - 内存中的订单数不超过工作中订单数加 `completed_retention`。
/// - 断开连接时所有调用返回 `BrokerError::NotConnected`。
pub struct PaperBroker {
    connected: AtomicBool,
    next_perm_id: AtomicI64,
    auto_fill: bool,
    completed_retention: usize,
    finished_seq: AtomicU64,
    orders: RwLock<HashMap<PermId, PaperOrder>>,
    mark_prices: RwLock<HashMap<String, Decimal>>,
}

impl PaperBroker {
    pub fn new(starting_perm_id: i64, auto_fill: bool) -> Self {
        Self {
            connected: AtomicBool::new(false),
            next_perm_id: AtomicI64::new(starting_perm_id),
            auto_fill,
            completed_retention: DEFAULT_COMPLETED_RETENTION,
            finished_seq: AtomicU64::new(0),
            orders: RwLock::new(HashMap::new()),
            mark_prices: RwLock::new(HashMap::new()),
        }
    }

    /// 调整已完成列表的保留上限，至少保留一笔
    pub fn with_completed_retention(mut self, retention: usize) -> Self {
        self.completed_retention = retention.max(1);
        self
    }

    /// 设置标的的参考价，自动成交的市价单按此价格计算均价
    pub async fn set_mark_price(&self, symbol: &str, price: Decimal) {
        self.mark_prices.write().await.insert(symbol.to_string(), price);
    }

    /// # Summary
    /// 手动成交一笔工作中的订单。
    ///
    /// # Returns
    /// 订单存在且仍在工作中时返回 `true`。
    pub async fn fill_order(&self, perm_id: PermId, price: Option<Decimal>) -> bool {
        let mut guard = self.orders.write().await;
        match guard.get_mut(&perm_id) {
            Some(order) if order.phase == Phase::Working => {
                order.fill(price, self.next_finished_seq());
                info!(perm_id = perm_id.0, "Paper order filled");
                true
            }
            _ => false,
        }
    }

    /// 撤销一笔工作中的订单
    pub async fn cancel_order(&self, perm_id: PermId) -> bool {
        let mut guard = self.orders.write().await;
        match guard.get_mut(&perm_id) {
            Some(order) if order.phase == Phase::Working => {
                order.status = BrokerOrderStatus::Cancelled;
                order.finish(self.next_finished_seq());
                info!(perm_id = perm_id.0, "Paper order cancelled");
                true
            }
            _ => false,
        }
    }

    /// 内存中仍保留的订单数
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    fn next_finished_seq(&self) -> u64 {
        self.finished_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// 删除超出保留上限、最早完结的 `Done` 订单
    fn prune_completed(&self, orders: &mut HashMap<PermId, PaperOrder>) {
        let mut done: Vec<(u64, PermId)> = orders
            .iter()
            .filter(|(_, o)| o.phase == Phase::Done)
            .map(|(perm_id, o)| (o.finished_seq, *perm_id))
            .collect();
        if done.len() <= self.completed_retention {
            return;
        }
        done.sort_unstable_by_key(|(seq, _)| *seq);
        let excess = done.len() - self.completed_retention;
        for (_, perm_id) in done.into_iter().take(excess) {
            orders.remove(&perm_id);
        }
        debug!(pruned = excess, "Paper completed orders pruned");
    }

    fn ensure_connected(&self) -> Result<(), BrokerError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }
}

#[async_trait]
impl BrokerSession for PaperBroker {
    async fn connect(&self) -> Result<(), BrokerError> {
        self.connected.store(true, Ordering::SeqCst);
        info!("Paper broker session connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        self.connected.store(false, Ordering::SeqCst);
        info!("Paper broker session disconnected");
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// # Logic
    /// 1. 校验连接状态。
    /// 2. 数量必须为正；限价单必须带价格，市价单不得带价格。否则视为网关拒单。
    /// 3. 分配永久 ID 并放入挂单列表。
    async fn place_order(&self, request: &OrderRequest) -> Result<PermId, BrokerError> {
        self.ensure_connected()?;

        if request.quantity <= Decimal::ZERO {
            return Err(BrokerError::Rejected(format!(
                "quantity must be positive, got {}",
                request.quantity
            )));
        }
        match (request.order_type, request.limit_price) {
            (OrderType::Limit, None) => {
                return Err(BrokerError::Rejected("limit order without price".into()));
            }
            (OrderType::Market, Some(_)) => {
                return Err(BrokerError::Rejected("market order with price".into()));
            }
            _ => {}
        }

        let perm_id = PermId(self.next_perm_id.fetch_add(1, Ordering::SeqCst));
        self.orders.write().await.insert(
            perm_id,
            PaperOrder {
                request: request.clone(),
                status: BrokerOrderStatus::Submitted,
                filled: Decimal::ZERO,
                avg_price: None,
                phase: Phase::Working,
                listed_open: false,
                finished_seq: 0,
            },
        );
        debug!(perm_id = perm_id.0, client_ref = %request.client_ref, "Paper order accepted");
        Ok(perm_id)
    }

    async fn list_open_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
        self.ensure_connected()?;

        let marks = self.mark_prices.read().await.clone();
        let mut guard = self.orders.write().await;
        let mut open = Vec::new();
        for (perm_id, order) in guard.iter_mut() {
            if order.phase != Phase::Working {
                continue;
            }
            if self.auto_fill
                && order.listed_open
                && order.request.order_type == OrderType::Market
            {
                let mark = marks.get(&order.request.symbol).copied();
                order.fill(mark, self.next_finished_seq());
                debug!(perm_id = perm_id.0, "Paper market order auto-filled");
                continue;
            }
            order.listed_open = true;
            open.push(order.snapshot(*perm_id));
        }
        Ok(open)
    }

    /// # Logic
    /// 1. 返回已经 `Done` 的订单。
    /// 2. 把过渡窗口中的订单推进为 `Done`。
    /// 3. 按保留上限裁剪最早完结的订单。
    async fn list_completed_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
        self.ensure_connected()?;

        let mut guard = self.orders.write().await;
        let completed = guard
            .iter()
            .filter(|(_, o)| o.phase == Phase::Done)
            .map(|(perm_id, o)| o.snapshot(*perm_id))
            .collect();
        for order in guard.values_mut() {
            if order.phase == Phase::InTransit {
                order.phase = Phase::Done;
            }
        }
        self.prune_completed(&mut guard);
        Ok(completed)
    }
}
