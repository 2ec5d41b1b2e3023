//! Core types, configuration, and utilities for the mailsift daemon.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_DASHBOARD_URL, DEFAULT_LOG_LEVEL, DEFAULT_SUPABASE_PUBLISHABLE_KEY,
    DEFAULT_SUPABASE_URL,
};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging;
pub use paths::Paths;
