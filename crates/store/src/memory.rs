use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use desk_core::signal::entity::SignalId;
use desk_core::signal::record::SignalRecord;
use desk_core::store::error::StoreError;
use desk_core::store::port::{InsertOutcome, SignalPatch, SignalStore, UpdateGuard};
use std::sync::atomic::{AtomicU64, Ordering};

/// # Summary
/// 基于 DashMap 的内存信号存储，适用于测试与无持久化的部署。
///
/// # Invariants
/// - 查重插入通过 `entry` API 完成，分片锁保证同 ID 并发创建只有一个成功。
/// - 条件更新在持有分片写锁的 `get_mut` 内完成谓词求值与写入。
/// - 每条记录附带单调递增的序号，用于还原插入顺序。
pub struct MemorySignalStore {
    records: DashMap<String, (u64, SignalRecord)>,
    next_seq: AtomicU64,
}

impl MemorySignalStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for MemorySignalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalStore for MemorySignalStore {
    async fn get(&self, id: &SignalId) -> Result<Option<SignalRecord>, StoreError> {
        Ok(self.records.get(id.as_str()).map(|e| e.value().1.clone()))
    }

    async fn put_if_absent(&self, record: &SignalRecord) -> Result<InsertOutcome, StoreError> {
        match self.records.entry(record.id.clone()) {
            Entry::Occupied(_) => Ok(InsertOutcome::Duplicate),
            Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
                slot.insert((seq, record.clone()));
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn update_fields(
        &self,
        id: &SignalId,
        guard: &UpdateGuard,
        patch: &SignalPatch,
    ) -> Result<u64, StoreError> {
        match self.records.get_mut(id.as_str()) {
            Some(mut entry) if guard.matches(&entry.1) => {
                patch.apply(&mut entry.1);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn list_all(&self, limit: usize) -> Result<Vec<SignalRecord>, StoreError> {
        let mut rows: Vec<(u64, SignalRecord)> =
            self.records.iter().map(|e| e.value().clone()).collect();
        rows.sort_by_key(|(seq, _)| *seq);
        Ok(rows.into_iter().take(limit).map(|(_, r)| r).collect())
    }
}
