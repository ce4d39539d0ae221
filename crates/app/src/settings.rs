use config::{Config, ConfigError, Environment, File, FileFormat};
use desk_core::config::AppConfig;

/// 环境变量前缀，如 `DESK__SERVER__PORT=9000`
const ENV_PREFIX: &str = "DESK";

/// 未指定 `DESK_CONFIG` 时尝试读取的配置文件
const DEFAULT_CONFIG_FILE: &str = "config/default.toml";

/// # Summary
/// 分层加载应用配置。
///
/// # Logic
/// 优先级从低到高：结构体默认值 < 配置文件 < 环境变量。
/// 配置文件缺失时静默跳过，格式错误则返回错误。
///
/// # Arguments
/// * `path` - 显式指定的配置文件路径 (通常来自 `DESK_CONFIG`)。
pub fn load(path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let (file, required) = match path {
        Some(p) => (p, true),
        None => (DEFAULT_CONFIG_FILE, false),
    };

    Config::builder()
        .add_source(File::new(file, FileFormat::Toml).required(required))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}
