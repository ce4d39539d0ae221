pub mod execution;
pub mod lock;
pub mod signal;
