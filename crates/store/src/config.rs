use std::path::PathBuf;
use std::sync::OnceLock;

static ROOT_DIR: OnceLock<PathBuf> = OnceLock::new();

/// 设置存储层的数据根目录。
///
/// # Logic
/// 进程内只生效一次，重复设置会被忽略并记录日志。
///
/// # Arguments
/// * `path` - 存储数据的根目录路径。
pub fn set_root_dir(path: PathBuf) {
    if let Err(rejected) = ROOT_DIR.set(path) {
        tracing::debug!("Store root already set, ignoring {}", rejected.display());
    }
}

/// 获取当前配置的数据根目录，未设置时回落到 "data"。
pub(crate) fn get_root_dir() -> PathBuf {
    ROOT_DIR
        .get()
        .cloned()
        .unwrap_or_else(|| PathBuf::from("data"))
}
