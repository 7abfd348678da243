#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod fetch;
pub mod fetch_worker;
pub mod worker;

/// the current app version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
