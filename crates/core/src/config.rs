use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub broker: BrokerConfig,
    pub execution: ExecutionConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// 存储后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub data_dir: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            data_dir: "data".to_string(),
        }
    }
}

/// 券商网关连接参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: i32,
    /// 会话实现不具备线程安全时，由桥接层串行化所有调用
    pub serialize_calls: bool,
    /// 模拟盘：市价单在下一次查询时自动成交
    pub auto_fill: bool,
    /// 模拟盘：第一个分配的永久订单 ID
    pub starting_perm_id: i64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7497,
            client_id: 121,
            serialize_calls: false,
            auto_fill: true,
            starting_perm_id: 1_000,
        }
    }
}

/// # Summary
/// 执行桥接层的重试与轮询参数。
///
/// # Invariants
/// - `max_submit_attempts >= 1`。
/// - `*_initial_ms <= *_max_ms`。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_submit_attempts: u32,
    pub submit_backoff_initial_ms: u64,
    pub submit_backoff_max_ms: u64,
    pub poll_initial_ms: u64,
    pub poll_max_ms: u64,
    pub backoff_multiplier: u32,
    /// 单个信号的对账总时长上限，0 表示不限
    pub poll_timeout_secs: u64,
    pub shutdown_grace_ms: u64,
    /// 接受信号后立即提交 (原型 UI 的行为)
    pub auto_submit_on_accept: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_submit_attempts: 5,
            submit_backoff_initial_ms: 500,
            submit_backoff_max_ms: 8_000,
            poll_initial_ms: 2_000,
            poll_max_ms: 30_000,
            backoff_multiplier: 2,
            poll_timeout_secs: 0,
            shutdown_grace_ms: 5_000,
            auto_submit_on_accept: false,
        }
    }
}

impl ExecutionConfig {
    pub fn poll_timeout(&self) -> Option<Duration> {
        (self.poll_timeout_secs > 0).then(|| Duration::from_secs(self.poll_timeout_secs))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// 默认日志级别，`RUST_LOG` 优先
    pub level: String,
    /// 滚动日志目录，为空则只输出到终端
    pub dir: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}
