//! Per-camera clock alignment
//!
//! Every camera records in its own local time. A fixed offset per camera maps
//! local time onto the shared run timeline: `sync_time = local_time + offset`.

use crate::domain::types::{CameraId, Track};
use crate::infra::diagnostics::{Diagnostic, Diagnostics};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct TimeSync {
    /// Offsets keyed by normalized camera key
    offsets: FxHashMap<String, f64>,
}

impl TimeSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(camera, seconds)` pairs; later pairs win
    pub fn from_offsets<I, S>(offsets: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let mut sync = Self::new();
        for (camera, offset) in offsets {
            sync.set_offset(&CameraId::new(camera.as_ref()), offset);
        }
        sync
    }

    pub fn set_offset(&mut self, camera_id: &CameraId, offset: f64) {
        self.offsets.insert(camera_id.key(), offset);
    }

    pub fn offset(&self, camera_id: &CameraId) -> Option<f64> {
        self.offsets.get(&camera_id.key()).copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Map a camera-local time onto the run timeline (offset 0 when unknown)
    #[inline]
    pub fn to_sync(&self, camera_id: &CameraId, local_time: f64) -> f64 {
        local_time + self.offset(camera_id).unwrap_or(0.0)
    }

    /// Recompute `sync_time` of every sample.
    ///
    /// Cameras without an offset are synced with offset 0 and reported once
    /// each as `UnknownCamera`.
    pub fn sync_tracks(&self, tracks: &mut [Track], diagnostics: &Diagnostics) {
        let mut reported: FxHashSet<String> = FxHashSet::default();

        for track in tracks.iter_mut() {
            let offset = match self.offset(&track.camera_id) {
                Some(offset) => offset,
                None => {
                    if reported.insert(track.camera_id.key()) {
                        diagnostics
                            .record(Diagnostic::UnknownCamera { camera_id: track.camera_id.clone() });
                    }
                    0.0
                }
            };
            for sample in track.samples.iter_mut() {
                sample.sync_time = sample.local_time + offset;
            }
        }

        debug!(tracks = %tracks.len(), cameras_unknown = %reported.len(), "tracks_synced");
    }
}
