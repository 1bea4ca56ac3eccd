//! Trajectory file loader
//!
//! One JSON file per camera, as written by the upstream tracker:
//!
//! ```json
//! {"video_id": "CAMERA_HALL",
//!  "trajectories": [{"track_id": 3, "class_name": "person",
//!                    "frames": [{"frame": 12, "t": 0.48, "bbox": [x1, y1, x2, y2]}],
//!                    "embeddings": [[...]]}]}
//! ```
//!
//! Tracks are validated one by one. A bad track is reported and dropped
//! without affecting the rest of its file; an unreadable file is reported and
//! skipped.

use crate::domain::types::{BBox, CameraId, ObjectClass, Sample, Track, TrackKey, TrackRef};
use crate::infra::diagnostics::{Diagnostic, Diagnostics};
use crate::infra::metrics::RunMetrics;
use anyhow::Context;
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct RawFile {
    #[serde(default)]
    video_id: Option<String>,
    #[serde(default)]
    trajectories: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTrackId {
    Number(u64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    track_id: RawTrackId,
    #[serde(default)]
    class_name: Option<String>,
    #[serde(default)]
    frames: Vec<RawFrame>,
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    frame: Option<serde_json::Value>,
    #[serde(default)]
    x: Option<f64>,
    #[serde(default)]
    y: Option<f64>,
    #[serde(default)]
    t: Option<f64>,
    #[serde(default)]
    bbox: Option<Vec<f64>>,
}

/// Resolve the class and numeric id of a track.
///
/// Accepts `3`, `"3"` and the legacy composite `"person:3"`.
fn track_key(id: &RawTrackId, class_name: Option<&str>) -> Result<TrackKey, String> {
    let declared = class_name.map(str::parse::<ObjectClass>).transpose().map_err(|e| e.to_string())?;

    let (embedded, number) = match id {
        RawTrackId::Number(n) => (None, *n),
        RawTrackId::Text(text) => match text.split_once(':') {
            Some((class, n)) => {
                let class = class.parse::<ObjectClass>().map_err(|e| e.to_string())?;
                let n = n.trim().parse::<u64>().map_err(|_| format!("bad track id `{}`", text))?;
                (Some(class), n)
            }
            None => {
                let n = text.trim().parse::<u64>().map_err(|_| format!("bad track id `{}`", text))?;
                (None, n)
            }
        },
    };

    let class = match (declared, embedded) {
        (Some(a), Some(b)) if a != b => {
            return Err(format!("class_name `{}` contradicts track id class `{}`", a, b))
        }
        (Some(a), _) | (None, Some(a)) => a,
        (None, None) => ObjectClass::Person,
    };
    Ok(TrackKey::new(class, number))
}

/// Frame number as a non-negative integer; `12` and `12.0` both qualify
fn frame_number(value: &serde_json::Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
            .map(|f| f as u64)
    })
}

fn build_track(camera_id: &CameraId, raw: RawTrack) -> Result<Track, String> {
    let key = track_key(&raw.track_id, raw.class_name.as_deref())?;
    let mut track = Track::new(camera_id.clone(), key);

    for frame in raw.frames {
        // a frame without a usable number or detection box is skipped on its own
        let Some(frame_index) = frame.frame.as_ref().and_then(frame_number) else {
            continue;
        };
        let Some(coords) = frame.bbox else {
            continue;
        };
        let bbox = match coords.as_slice() {
            &[x1, y1, x2, y2] => BBox::new(x1, y1, x2, y2),
            other => return Err(format!("frame {} bbox has {} values", frame_index, other.len())),
        };
        if !bbox.is_valid() {
            return Err(format!("frame {} has an invalid bbox", frame_index));
        }
        if let Some(prev) = track.samples.last() {
            if frame_index <= prev.frame_index {
                return Err(format!("frame {} does not follow frame {}", frame_index, prev.frame_index));
            }
        }
        let local_time = frame.t.unwrap_or(frame_index as f64);
        if !local_time.is_finite() {
            return Err(format!("frame {} has a non-finite time", frame_index));
        }
        let position = match (frame.x, frame.y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => [x, y],
            _ => bbox.center(),
        };
        track.samples.push(Sample {
            frame_index,
            local_time,
            sync_time: local_time,
            position,
            bbox,
        });
    }
    if track.samples.is_empty() {
        return Err("track has no usable frames".to_string());
    }

    if let Some(first) = raw.embeddings.first() {
        let dim = first.len();
        if dim == 0 {
            return Err("empty embedding vector".to_string());
        }
        for e in &raw.embeddings {
            if e.len() != dim {
                return Err(format!("embedding length {} differs from {}", e.len(), dim));
            }
            if e.iter().any(|v| !v.is_finite()) {
                return Err("embedding has a non-finite value".to_string());
            }
        }
    }
    track.embeddings = raw.embeddings;
    Ok(track)
}

/// Parse one trajectory document.
///
/// `fallback_camera` names the camera when the document has no `video_id`.
pub fn parse_trajectories(
    content: &str,
    source_name: &str,
    fallback_camera: &str,
    diagnostics: &Diagnostics,
) -> anyhow::Result<Vec<Track>> {
    let file: RawFile = serde_json::from_str(content)
        .with_context(|| format!("Failed to parse trajectory file {}", source_name))?;
    let camera_id = CameraId::new(
        file.video_id.filter(|v| !v.trim().is_empty()).unwrap_or_else(|| fallback_camera.to_string()),
    );

    let mut seen: FxHashSet<TrackKey> = FxHashSet::default();
    let mut tracks = Vec::with_capacity(file.trajectories.len());
    for (idx, value) in file.trajectories.into_iter().enumerate() {
        let built = serde_json::from_value::<RawTrack>(value)
            .map_err(|e| format!("trajectory #{}: {}", idx, e))
            .and_then(|raw| build_track(&camera_id, raw).map_err(|e| format!("trajectory #{}: {}", idx, e)));
        match built {
            Ok(track) if !seen.insert(track.key) => {
                diagnostics.record(Diagnostic::CorruptTrackRecord {
                    source_name: source_name.to_string(),
                    reason: format!("duplicate track {}", track.key),
                });
            }
            Ok(track) => tracks.push(track),
            Err(reason) => diagnostics.record(Diagnostic::CorruptTrackRecord {
                source_name: source_name.to_string(),
                reason,
            }),
        }
    }
    debug!(source = %source_name, camera_id = %camera_id, tracks = %tracks.len(), "trajectory_parsed");
    Ok(tracks)
}

/// `*.json` files of a directory, sorted by name
fn trajectory_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read trajectory directory {}", dir.display()))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")))
        .collect();
    files.sort();
    Ok(files)
}

/// Load every trajectory file of `dir`.
///
/// Only a missing or unreadable directory is an error. Bad files and bad
/// tracks become diagnostics.
pub fn load_trajectories(
    dir: &Path,
    diagnostics: &Diagnostics,
    metrics: &RunMetrics,
) -> anyhow::Result<Vec<Track>> {
    let files = trajectory_files(dir)?;
    let mut tracks = Vec::new();
    let mut seen: FxHashSet<TrackRef> = FxHashSet::default();
    let before = diagnostics.len();

    for path in &files {
        let source_name = path.display().to_string();
        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let parsed = fs::read_to_string(path)
            .with_context(|| format!("Failed to read trajectory file {}", source_name))
            .and_then(|content| parse_trajectories(&content, &source_name, &stem, diagnostics));

        match parsed {
            Ok(file_tracks) => {
                for track in file_tracks {
                    if seen.insert(track.track_ref()) {
                        tracks.push(track);
                    } else {
                        diagnostics.record(Diagnostic::CorruptTrackRecord {
                            source_name: source_name.clone(),
                            reason: format!("track {} already loaded from another file", track.track_ref()),
                        });
                    }
                }
            }
            Err(e) => diagnostics.record(Diagnostic::CorruptTrackRecord {
                source_name: source_name.clone(),
                reason: format!("{:#}", e),
            }),
        }
    }

    let dropped = diagnostics.snapshot()[before..]
        .iter()
        .filter(|d| matches!(d, Diagnostic::CorruptTrackRecord { .. }))
        .count();
    for _ in 0..dropped {
        metrics.record_track_dropped();
    }

    info!(
        dir = %dir.display(),
        files = %files.len(),
        tracks = %tracks.len(),
        dropped = %dropped,
        "trajectories_loaded"
    );
    Ok(tracks)
}
