//! Domain models - tracks, zones and intrusion events
//!
//! - `Track` / `Sample` - one object's observation on one camera
//! - `Zone` - named polygon on a camera's image plane
//! - `Event` / `EnrichedEvent` - intrusion transitions and their enriched form
//! - `EventLog` - ordered log the enricher and egress replay

pub mod event;
pub mod types;

// Re-export commonly used types at module level
pub use event::{EnrichedEvent, Event, EventLog, EventType};
pub use types::{CameraId, GlobalId, ObjectClass, Track, TrackKey, TrackRef, Zone, ZoneId};
