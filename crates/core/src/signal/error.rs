use crate::store::error::StoreError;
use thiserror::Error;

/// # Summary
/// 信号生命周期错误。
///
/// # Invariants
/// - 除 `Store` 外均为调用方错误，直接返回且不做自动重试。
#[derive(Error, Debug)]
pub enum SignalError {
    /// 违反 schema 或实体约束 (如价格与委托类型不匹配)
    #[error("Invalid signal: {0}")]
    InvalidSignal(String),
    /// 创建时 ID 冲突
    #[error("Signal already exists: {0}")]
    DuplicateSignal(String),
    /// 操作了不存在的 ID
    #[error("Signal not found: {0}")]
    NotFound(String),
    /// 在不允许变更的状态下尝试修改
    #[error("Signal is immutable in its current state: {0}")]
    ImmutableSignal(String),
    /// 底层存储失败
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl SignalError {
    /// 给 API 层使用的稳定错误码
    pub fn code(&self) -> &'static str {
        match self {
            SignalError::InvalidSignal(_) => "InvalidSignal",
            SignalError::DuplicateSignal(_) => "DuplicateSignal",
            SignalError::NotFound(_) => "NotFound",
            SignalError::ImmutableSignal(_) => "ImmutableSignal",
            SignalError::Store(_) => "StoreError",
        }
    }
}
