pub mod health;
pub mod signal;
