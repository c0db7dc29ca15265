pub mod config;
pub mod core_chat;
pub mod core_store;
pub mod http;
pub mod logging;

pub use config::Config;
pub use logging::{init_logging, LogLevel};
