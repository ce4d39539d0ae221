use dashmap::DashMap;
use desk_core::signal::entity::SignalId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// # Summary
/// 按信号 ID 划分的异步互斥锁表。
///
/// # Invariants
/// - 同一 ID 的所有写操作 (审批、改数量、提交认领、对账写回) 串行执行。
/// - 不同 ID 之间互不阻塞。
pub struct KeyedLocks {
    locks: DashMap<SignalId, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// 获取某个 ID 的锁，返回的守卫在 drop 时释放
    pub async fn lock(&self, id: &SignalId) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// 清理当前无人持有的锁，返回剩余条目数
    pub fn prune(&self) -> usize {
        self.locks.retain(|_, m| Arc::strong_count(m) > 1);
        self.locks.len()
    }
}

impl Default for KeyedLocks {
    fn default() -> Self {
        Self::new()
    }
}
