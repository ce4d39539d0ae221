use desk_core::broker::error::BrokerError;
use desk_core::signal::error::SignalError;
use desk_core::store::error::StoreError;
use thiserror::Error;

/// # Summary
/// 执行桥接层的统一错误类型。
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(transparent)]
    Signal(#[from] SignalError),
    /// 信号未处于 ACCEPTED 状态
    #[error("Signal is not accepted: {0}")]
    NotAccepted(String),
    /// 信号已经拿到券商订单 ID
    #[error("Signal already submitted: {0}")]
    AlreadySubmitted(String),
    /// 同一信号已有提交在进行
    #[error("Submission already in flight: {0}")]
    SubmissionInFlight(String),
    /// 自动重试耗尽或遇到歧义失败，需要操作员介入
    #[error("Submission failed after {attempts} attempt(s): {cause}")]
    SubmissionFailure { attempts: u32, cause: String },
    /// 不满足手动重新提交的条件
    #[error("Signal cannot be resubmitted: {0}")]
    NotResubmittable(String),
    #[error("Execution bridge is shutting down")]
    ShuttingDown,
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}

impl From<StoreError> for ExecutionError {
    fn from(e: StoreError) -> Self {
        ExecutionError::Signal(SignalError::Store(e))
    }
}

impl ExecutionError {
    /// 给 API 层使用的稳定错误码
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::Signal(e) => e.code(),
            ExecutionError::NotAccepted(_) => "NotAccepted",
            ExecutionError::AlreadySubmitted(_) => "AlreadySubmitted",
            ExecutionError::SubmissionInFlight(_) => "SubmissionInFlight",
            ExecutionError::SubmissionFailure { .. } => "SubmissionFailure",
            ExecutionError::NotResubmittable(_) => "NotResubmittable",
            ExecutionError::ShuttingDown => "ShuttingDown",
            ExecutionError::Broker(_) => "BrokerError",
        }
    }
}
