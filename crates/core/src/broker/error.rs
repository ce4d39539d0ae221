use thiserror::Error;

/// # Summary
/// 券商会话错误。
///
/// # Invariants
/// - `NotConnected` 与 `Rejected` 表示委托确定没有生成订单，可安全重试。
/// - `Timeout` 与 `Transport` 是歧义失败，委托可能已经抵达网关。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Broker session is not connected")]
    NotConnected,
    #[error("Order rejected by gateway: {0}")]
    Rejected(String),
    #[error("Broker call timed out: {0}")]
    Timeout(String),
    #[error("Broker transport error: {0}")]
    Transport(String),
}

impl BrokerError {
    pub fn may_have_reached_gateway(&self) -> bool {
        matches!(self, BrokerError::Timeout(_) | BrokerError::Transport(_))
    }
}
