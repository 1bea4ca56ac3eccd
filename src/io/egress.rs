//! Run egress - writes enriched events, identities and the run report
//!
//! Events are written in JSONL format (one JSON object per line). Every file
//! is rewritten from scratch on each run so that re-running over the same
//! inputs leaves byte-identical output.

use crate::domain::event::EnrichedEvent;
use crate::domain::types::{CameraId, GlobalId, TrackKey};
use crate::services::identity::{ClusterMember, IdentityRegistry};
use anyhow::Context;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One track -> identity row of the identities file
#[derive(Debug, Serialize)]
struct AssignmentRow<'a> {
    camera_id: &'a CameraId,
    #[serde(flatten)]
    track: TrackKey,
    global_identity: GlobalId,
}

#[derive(Debug, Serialize)]
struct ClusterRow<'a> {
    global_identity: GlobalId,
    members: &'a [ClusterMember],
}

#[derive(Debug, Serialize)]
struct IdentitiesDocument<'a> {
    assignments: Vec<AssignmentRow<'a>>,
    clusters: Vec<ClusterRow<'a>>,
}

/// Serialize events as JSONL, in slice order
pub fn events_to_jsonl(events: &[EnrichedEvent]) -> anyhow::Result<String> {
    let mut out = String::new();
    for event in events {
        let line = serde_json::to_string(event)
            .with_context(|| format!("Failed to serialize event {}", event.seq))?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

/// Read back a JSONL event file. Blank lines are skipped.
pub fn read_events(path: &Path) -> anyhow::Result<Vec<EnrichedEvent>> {
    let file = File::open(path).with_context(|| format!("Failed to open event file {}", path.display()))?;
    let mut events = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: EnrichedEvent = serde_json::from_str(&line)
            .with_context(|| format!("Invalid event at {}:{}", path.display(), idx + 1))?;
        events.push(event);
    }
    Ok(events)
}

/// Egress writer for one output file
pub struct Egress {
    file_path: PathBuf,
}

impl Egress {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        let file_path = file_path.into();
        debug!(file_path = %file_path.display(), "egress_initialized");
        Self { file_path }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Replace the file with one line per event
    pub fn write_events(&self, events: &[EnrichedEvent]) -> anyhow::Result<usize> {
        let body = events_to_jsonl(events)?;
        self.replace(body.as_bytes())?;
        info!(file = %self.file_path.display(), events = %events.len(), "events_egressed");
        Ok(events.len())
    }

    /// Replace the file with the track assignments and identity clusters
    pub fn write_identities(&self, registry: &IdentityRegistry) -> anyhow::Result<()> {
        let pairs = registry.assignments();
        let doc = IdentitiesDocument {
            assignments: pairs
                .iter()
                .map(|(track_ref, id)| AssignmentRow {
                    camera_id: &track_ref.camera_id,
                    track: track_ref.track,
                    global_identity: *id,
                })
                .collect(),
            clusters: registry
                .clusters()
                .iter()
                .map(|c| ClusterRow { global_identity: c.id(), members: c.members() })
                .collect(),
        };
        self.write_json(&doc)?;
        info!(file = %self.file_path.display(), identities = %registry.len(), "identities_egressed");
        Ok(())
    }

    /// Replace the file with a pretty-printed JSON document
    pub fn write_json<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        let mut body = serde_json::to_string_pretty(value)
            .with_context(|| format!("Failed to serialize {}", self.file_path.display()))?;
        body.push('\n');
        self.replace(body.as_bytes())
    }

    fn replace(&self, bytes: &[u8]) -> anyhow::Result<()> {
        let path = self.file_path.as_path();

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;
        debug!(file = %path.display(), bytes = %bytes.len(), "egress_written");
        Ok(())
    }
}
