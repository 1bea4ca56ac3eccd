//! IO modules - file inputs and outputs of a run
//!
//! - `trajectory` - per-camera trajectory files from the upstream tracker
//! - `site` - zone, offset and topology files, plus the run input loader
//! - `egress` - enriched events (JSONL) and identity assignment output
//! - `report` - run report with per-identity camera paths

pub mod egress;
pub mod report;
pub mod site;
pub mod trajectory;

// Re-export commonly used types
pub use egress::{read_events, Egress};
pub use report::RunReport;
pub use site::load_run_inputs;
pub use trajectory::load_trajectories;
