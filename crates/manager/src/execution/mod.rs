pub mod backoff;
pub mod bridge;
pub mod error;
