//! 跨领域共享的基础设施无关工具。

pub mod time;
