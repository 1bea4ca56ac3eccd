//! Infrastructure - configuration, metrics, and diagnostics
//!
//! - `config` - Application configuration (TOML loading, defaults)
//! - `metrics` - Lock-free run counters
//! - `diagnostics` - Log of locally recovered conditions

pub mod config;
pub mod diagnostics;
pub mod metrics;

// Re-export commonly used types
pub use config::Config;
pub use diagnostics::{Diagnostic, Diagnostics};
pub use metrics::{RunMetrics, RunSummary};
