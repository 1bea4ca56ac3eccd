//! Recovered-error log
//!
//! Every condition the run recovers from locally is recorded here and logged
//! once. Nothing in this module aborts a run; fatal errors stay in the outer
//! shell as `anyhow::Error`.

use crate::domain::types::{CameraId, TrackRef, ZoneId};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Locally recovered conditions
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Diagnostic {
    #[error("zone {zone_id} on camera {camera_id} is malformed: {reason}")]
    MalformedZone { camera_id: CameraId, zone_id: ZoneId, reason: String },

    #[error("camera {camera_id} has no time offset, using 0")]
    UnknownCamera { camera_id: CameraId },

    #[error("track {track} has no appearance embedding")]
    MissingEmbedding { track: TrackRef },

    #[error("event at seq {seq} references unknown track {track}")]
    InconsistentJoin { seq: u64, track: TrackRef },

    #[error("corrupt track record in {source_name}: {reason}")]
    CorruptTrackRecord { source_name: String, reason: String },
}

impl Diagnostic {
    /// Stable snake_case name used in logs and the run report
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::MalformedZone { .. } => "malformed_zone",
            Diagnostic::UnknownCamera { .. } => "unknown_camera",
            Diagnostic::MissingEmbedding { .. } => "missing_embedding",
            Diagnostic::InconsistentJoin { .. } => "inconsistent_join",
            Diagnostic::CorruptTrackRecord { .. } => "corrupt_track_record",
        }
    }
}

/// Shared diagnostics sink, safe to record into from camera workers
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Mutex<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log and keep a diagnostic
    pub fn record(&self, diagnostic: Diagnostic) {
        match &diagnostic {
            // expected for tracks the embedder skipped
            Diagnostic::MissingEmbedding { .. } => {
                debug!(kind = diagnostic.kind(), detail = %diagnostic, "diagnostic")
            }
            _ => warn!(kind = diagnostic.kind(), detail = %diagnostic, "diagnostic"),
        }
        self.entries.lock().push(diagnostic);
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Count of recorded diagnostics per kind, sorted by kind
    pub fn counts_by_kind(&self) -> BTreeMap<&'static str, u64> {
        let mut counts = BTreeMap::new();
        for d in self.entries.lock().iter() {
            *counts.entry(d.kind()).or_insert(0) += 1;
        }
        counts
    }
}
