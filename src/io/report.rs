//! Run report: one JSON document summarizing a finished (or cancelled) run

use crate::domain::event::{EnrichedEvent, EventType};
use crate::domain::types::{CameraId, GlobalId, Track};
use crate::infra::diagnostics::Diagnostics;
use crate::infra::metrics::RunSummary;
use crate::services::pipeline::RunOutput;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventSummary {
    pub total: u64,
    pub deduplicated: u64,
    pub enriched: u64,
    pub by_type: BTreeMap<String, u64>,
    pub by_class: BTreeMap<String, u64>,
    pub by_zone: BTreeMap<String, u64>,
    pub by_camera: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackSummary {
    pub total: u64,
    pub with_identity: u64,
    pub by_class: BTreeMap<String, u64>,
}

/// One stop of an identity's walk through the site
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryStep {
    pub camera_id: CameraId,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityStory {
    pub global_identity: GlobalId,
    /// Cameras in order of first appearance, consecutive repeats merged
    pub path: Vec<StoryStep>,
    pub intrusions: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub build: String,
    pub generated_at: DateTime<Utc>,
    pub cancelled: bool,
    pub tracks: TrackSummary,
    pub events: EventSummary,
    pub identities: u64,
    pub unique_identities_per_camera: BTreeMap<String, u64>,
    pub diagnostics: BTreeMap<&'static str, u64>,
    pub stories: Vec<IdentityStory>,
    pub metrics: RunSummary,
}

impl RunReport {
    pub fn build(output: &RunOutput, diagnostics: &Diagnostics, metrics: RunSummary) -> Self {
        Self {
            run_id: Uuid::now_v7().to_string(),
            build: env!("GIT_HASH").to_string(),
            generated_at: Utc::now(),
            cancelled: output.cancelled,
            tracks: summarize_tracks(&output.tracks),
            events: summarize_events(&output.events),
            identities: output.registry.len() as u64,
            unique_identities_per_camera: unique_identities_per_camera(&output.tracks),
            diagnostics: diagnostics.counts_by_kind(),
            stories: stories(&output.tracks, &output.events),
            metrics,
        }
    }
}

pub fn summarize_tracks(tracks: &[Track]) -> TrackSummary {
    let mut summary = TrackSummary { total: tracks.len() as u64, ..Default::default() };
    for track in tracks {
        if track.global_identity.is_some() {
            summary.with_identity += 1;
        }
        *summary.by_class.entry(track.class().to_string()).or_default() += 1;
    }
    summary
}

pub fn summarize_events(events: &[EnrichedEvent]) -> EventSummary {
    let mut summary = EventSummary { total: events.len() as u64, ..Default::default() };
    for e in events {
        summary.deduplicated += u64::from(e.deduplicated);
        summary.enriched += u64::from(e.enriched);
        *summary.by_type.entry(e.event.event_type.as_str().to_string()).or_default() += 1;
        *summary.by_class.entry(e.event.track.class.to_string()).or_default() += 1;
        let zone = e.zone_name.clone().unwrap_or_else(|| e.event.zone_id.to_string());
        *summary.by_zone.entry(zone).or_default() += 1;
        *summary.by_camera.entry(e.event.camera_id.to_string()).or_default() += 1;
    }
    summary
}

/// Distinct identities seen by each camera; cameras with no identified track report 0
pub fn unique_identities_per_camera(tracks: &[Track]) -> BTreeMap<String, u64> {
    let mut seen: BTreeMap<String, FxHashSet<GlobalId>> = BTreeMap::new();
    for track in tracks {
        let ids = seen.entry(track.camera_id.to_string()).or_default();
        if let Some(id) = track.global_identity {
            ids.insert(id);
        }
    }
    seen.into_iter().map(|(camera, ids)| (camera, ids.len() as u64)).collect()
}

pub fn stories(tracks: &[Track], events: &[EnrichedEvent]) -> Vec<IdentityStory> {
    let mut spans: BTreeMap<GlobalId, Vec<StoryStep>> = BTreeMap::new();
    for track in tracks {
        let (Some(id), Some((start, end))) = (track.global_identity, track.sync_interval()) else {
            continue;
        };
        spans.entry(id).or_default().push(StoryStep { camera_id: track.camera_id.clone(), start, end });
    }

    let mut intrusions: BTreeMap<GlobalId, u64> = BTreeMap::new();
    for e in events {
        if let Some(id) = e.global_identity {
            if !e.deduplicated && e.event.event_type == EventType::Confirmed {
                *intrusions.entry(id).or_default() += 1;
            }
        }
    }

    spans
        .into_iter()
        .map(|(id, mut steps)| {
            steps.sort_by(|a, b| a.start.total_cmp(&b.start).then_with(|| a.camera_id.cmp(&b.camera_id)));
            let mut path: Vec<StoryStep> = Vec::with_capacity(steps.len());
            for step in steps {
                match path.last_mut() {
                    Some(last) if last.camera_id.same_camera(&step.camera_id) => {
                        last.end = last.end.max(step.end);
                    }
                    _ => path.push(step),
                }
            }
            IdentityStory { global_identity: id, path, intrusions: intrusions.get(&id).copied().unwrap_or(0) }
        })
        .collect()
}
