//! Services - the processing stages of a run
//!
//! - `time_sync` - per-camera clock offsets onto the run timeline
//! - `zone_index` - polygon zones and containment tests
//! - `intrusion` - debounced zone intrusion state machine
//! - `topology` - camera reachability gate for identity matching
//! - `identity` - incremental appearance clustering into global identities
//! - `enricher` - identity join, neighbor context and cross-zone dedup
//! - `pipeline` - orchestration of the stages above

pub mod enricher;
pub mod identity;
pub mod intrusion;
pub mod pipeline;
pub mod time_sync;
pub mod topology;
pub mod zone_index;

// Re-export commonly used types
pub use enricher::EventEnricher;
pub use identity::{IdentityMatcher, IdentityRegistry};
pub use intrusion::IntrusionStateMachine;
pub use pipeline::{Pipeline, RunInputs, RunOutput};
pub use time_sync::TimeSync;
pub use topology::CameraTopologyGate;
pub use zone_index::ZoneIndex;
