use thiserror::Error;

/// # Summary
/// 信号存储失败。
///
/// # Invariants
/// - 记录不存在用 `Ok(None)` 表达，ID 冲突用 `InsertOutcome::Duplicate` 表达，二者都不是错误。
/// - 携带的字符串只用于日志，不回传给 HTTP 调用方。
#[derive(Error, Debug)]
pub enum StoreError {
    /// 读写语句执行失败
    #[error("Database error: {0}")]
    Database(String),
    /// 建目录、建连接池或建表失败
    #[error("Initialization error: {0}")]
    InitError(String),
}
