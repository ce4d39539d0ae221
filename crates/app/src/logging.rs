use desk_core::config::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// # Summary
/// 初始化全局日志：终端输出，配置了 `log.dir` 时额外按天滚动写文件。
///
/// # Returns
/// 文件写入器的 guard，必须在 `main` 中持有到进程退出，否则尾部日志会丢失。
pub fn init(
    cfg: &LogConfig,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
    // RUST_LOG 优先于配置文件
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))?
        .add_directive("sqlx=warn".parse()?);

    let (file_layer, guard) = match cfg.dir.as_deref() {
        Some(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "signal-desk.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).compact())
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
