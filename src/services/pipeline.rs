//! Batch run orchestration
//!
//! Stages, in order:
//! 1. align every track onto the run timeline
//! 2. per-camera intrusion workers (blocking pool, bounded by `runtime.workers`)
//! 3. barrier: all workers finish, events merge into the log in camera order
//! 4. identity matching (one sequential pass)
//! 5. enrichment of the merged log
//!
//! Shutdown is checked between tracks and between events. A cancelled run
//! still returns whatever each stage completed.

use crate::domain::event::{Event, EventLog, EventType, EnrichedEvent};
use crate::domain::types::{CameraId, Track};
use crate::infra::config::Config;
use crate::infra::diagnostics::Diagnostics;
use crate::infra::metrics::RunMetrics;
use crate::services::enricher::EventEnricher;
use crate::services::identity::{IdentityMatcher, IdentityRegistry};
use crate::services::intrusion::IntrusionStateMachine;
use crate::services::time_sync::TimeSync;
use crate::services::topology::CameraTopologyGate;
use crate::services::zone_index::ZoneIndex;
use anyhow::Context;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Everything a run consumes
pub struct RunInputs {
    pub tracks: Vec<Track>,
    pub zones: ZoneIndex,
    pub time_sync: TimeSync,
    pub gate: CameraTopologyGate,
}

/// Everything a run produces
pub struct RunOutput {
    pub log: EventLog,
    pub events: Vec<EnrichedEvent>,
    pub registry: IdentityRegistry,
    /// Synced tracks with identities applied
    pub tracks: Vec<Track>,
    pub cancelled: bool,
}

pub struct Pipeline {
    config: Config,
    metrics: Arc<RunMetrics>,
    diagnostics: Arc<Diagnostics>,
}

impl Pipeline {
    pub fn new(config: Config, metrics: Arc<RunMetrics>, diagnostics: Arc<Diagnostics>) -> Self {
        Self { config, metrics, diagnostics }
    }

    pub async fn run(
        &self,
        inputs: RunInputs,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<RunOutput> {
        let RunInputs { mut tracks, zones, time_sync, gate } = inputs;

        time_sync.sync_tracks(&mut tracks, &self.diagnostics);
        self.metrics.record_tracks_loaded(tracks.len() as u64);

        let tracks = Arc::new(tracks);
        let zones = Arc::new(zones);

        let (log, mut cancelled) = self.detect_intrusions(&tracks, &zones, &shutdown).await?;

        let registry = if cancelled {
            IdentityRegistry::new()
        } else {
            let (registry, matcher_cancelled) = self.match_identities(&tracks, gate, &shutdown).await?;
            cancelled |= matcher_cancelled;
            registry
        };

        let mut tracks = Arc::try_unwrap(tracks).unwrap_or_else(|shared| (*shared).clone());
        registry.apply(&mut tracks);

        let events = if cancelled {
            Vec::new()
        } else {
            let enricher = EventEnricher::new(&tracks, &zones, self.config.dedup_window_s());
            let (events, enrich_cancelled) =
                enricher.enrich_with_shutdown(&log, &self.diagnostics, &shutdown);
            cancelled |= enrich_cancelled;
            for e in &events {
                if e.enriched {
                    self.metrics.record_event_enriched();
                }
                if e.deduplicated {
                    self.metrics.record_event_deduplicated();
                }
            }
            events
        };

        if cancelled {
            warn!(events = %log.len(), enriched = %events.len(), "run_cancelled");
        }

        Ok(RunOutput { log, events, registry, tracks, cancelled })
    }

    /// Fan out one blocking worker per camera and merge their events by camera id
    async fn detect_intrusions(
        &self,
        tracks: &Arc<Vec<Track>>,
        zones: &Arc<ZoneIndex>,
        shutdown: &watch::Receiver<bool>,
    ) -> anyhow::Result<(EventLog, bool)> {
        let mut by_camera: BTreeMap<CameraId, Vec<usize>> = BTreeMap::new();
        for (idx, track) in tracks.iter().enumerate() {
            by_camera.entry(track.camera_id.clone()).or_default().push(idx);
        }

        let workers = self.config.workers();
        let permits = Arc::new(Semaphore::new(workers));
        let mut set: JoinSet<(CameraId, Vec<Event>, bool)> = JoinSet::new();
        info!(cameras = %by_camera.len(), workers = %workers, "intrusion_stage_started");

        for (camera_id, mut indices) in by_camera {
            let permit = permits.clone().acquire_owned().await.context("worker pool closed")?;
            let tracks = Arc::clone(tracks);
            let zones = Arc::clone(zones);
            let metrics = Arc::clone(&self.metrics);
            let shutdown = shutdown.clone();
            let config = self.config.intrusion();

            set.spawn_blocking(move || {
                let _permit = permit;
                let started = Instant::now();
                indices.sort_by_key(|&i| tracks[i].key);

                let mut machine = IntrusionStateMachine::new(camera_id.clone(), &zones, config);
                let mut events = Vec::new();
                let mut stopped = false;
                for idx in indices {
                    if *shutdown.borrow() {
                        stopped = true;
                        break;
                    }
                    let track = &tracks[idx];
                    metrics.record_samples(track.samples.len() as u64);
                    events.extend(machine.process_track(track));
                }

                metrics.record_camera_processed(started.elapsed().as_micros() as u64);
                info!(camera_id = %camera_id, events = %events.len(), "camera_processed");
                (camera_id, events, stopped)
            });
        }

        // barrier: every camera finishes before anything downstream runs
        let mut results: BTreeMap<CameraId, Vec<Event>> = BTreeMap::new();
        let mut cancelled = false;
        while let Some(joined) = set.join_next().await {
            let (camera_id, events, stopped) = joined.context("camera worker failed")?;
            cancelled |= stopped;
            results.insert(camera_id, events);
        }

        let mut log = EventLog::new();
        for event in results.into_values().flatten() {
            match event.event_type {
                EventType::Confirmed => self.metrics.record_event_confirmed(),
                EventType::Ended => self.metrics.record_event_ended(),
            }
            log.append(event);
        }
        info!(events = %log.len(), "intrusion_stage_complete");
        Ok((log, cancelled))
    }

    async fn match_identities(
        &self,
        tracks: &Arc<Vec<Track>>,
        gate: CameraTopologyGate,
        shutdown: &watch::Receiver<bool>,
    ) -> anyhow::Result<(IdentityRegistry, bool)> {
        let tracks = Arc::clone(tracks);
        let shutdown = shutdown.clone();
        let diagnostics = Arc::clone(&self.diagnostics);
        let mut matcher = IdentityMatcher::new(self.config.matcher(), gate, Arc::clone(&self.metrics));

        tokio::task::spawn_blocking(move || {
            let cancelled = matcher.run(&tracks, &shutdown, &diagnostics);
            (matcher.into_registry(), cancelled)
        })
        .await
        .context("identity matcher failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{BBox, GlobalId, ObjectClass, Sample, TrackKey, Zone, ZoneId};
    use crate::infra::config::ContainmentPolicy;

    fn track(camera: &str, id: u64, frames: &[(u64, f64, BBox)], embedding: Option<Vec<f32>>) -> Track {
        let mut t = Track::new(CameraId::from(camera), TrackKey::new(ObjectClass::Person, id));
        for &(frame, local, bbox) in frames {
            t.samples.push(Sample {
                frame_index: frame,
                local_time: local,
                sync_time: local,
                position: bbox.center(),
                bbox,
            });
        }
        t.embeddings = embedding.into_iter().collect();
        t
    }

    fn zone(camera: &str, id: &str) -> Zone {
        Zone {
            zone_id: ZoneId::from(id),
            display_name: id.to_string(),
            camera_id: CameraId::from(camera),
            points: vec![[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0]],
            active: true,
        }
    }

    const IN: BBox = BBox { x1: 10.0, y1: 10.0, x2: 20.0, y2: 20.0 };
    const OUT: BBox = BBox { x1: 300.0, y1: 300.0, x2: 310.0, y2: 310.0 };

    fn inputs() -> RunInputs {
        let diagnostics = Diagnostics::new();
        RunInputs {
            tracks: vec![
                track("B", 1, &[(0, 3.0, OUT), (1, 8.0, OUT)], Some(vec![1.0, 0.05])),
                track("A", 1, &[(0, 5.0, IN), (1, 7.0, IN), (2, 8.0, OUT)], Some(vec![1.0, 0.0])),
                track("A", 2, &[(0, 1.0, IN), (1, 4.0, IN)], None),
            ],
            zones: ZoneIndex::new(vec![zone("A", "Z1")], ContainmentPolicy::Overlap, &diagnostics),
            time_sync: TimeSync::from_offsets([("A", 0.0), ("B", 10.0)]),
            gate: CameraTopologyGate::default(),
        }
    }

    fn pipeline(config: Config) -> Pipeline {
        Pipeline::new(config, Arc::new(RunMetrics::new()), Arc::new(Diagnostics::new()))
    }

    #[tokio::test]
    async fn test_run_produces_ordered_enriched_log() {
        let (_tx, rx) = watch::channel(false);
        let p = pipeline(Config::default().with_min_duration_s(0.0));
        let out = p.run(inputs(), rx).await.unwrap();

        assert!(!out.cancelled);
        let seqs: Vec<u64> = out.events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, (0..out.log.len() as u64).collect::<Vec<_>>());

        // track A:1 confirms at t=5, A:2 at t=1; ordered by track key within camera
        let first = &out.events[0];
        assert_eq!(first.event.track.id, 1);
        assert_eq!(first.global_identity, Some(GlobalId(1)));
        let next = first.next_camera_context.as_ref().unwrap();
        assert_eq!(next.camera_id.as_str(), "B");
        assert_eq!((next.interval_start, next.interval_end), (13.0, 18.0));
        assert!(first.prev_camera_context.is_none());

        let a2: Vec<_> = out.events.iter().filter(|e| e.event.track.id == 2).collect();
        assert!(a2.iter().all(|e| !e.enriched));
        assert_eq!(out.registry.len(), 1);
        assert_eq!(out.tracks.iter().filter(|t| t.global_identity.is_some()).count(), 2);
    }

    #[tokio::test]
    async fn test_single_worker_matches_parallel() {
        let (_tx, rx) = watch::channel(false);
        let parallel = pipeline(Config::default()).run(inputs(), rx.clone()).await.unwrap();
        let serial = pipeline(Config::default().with_workers(1)).run(inputs(), rx).await.unwrap();

        assert_eq!(parallel.events, serial.events);
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_early() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let out = pipeline(Config::default()).run(inputs(), rx).await.unwrap();

        assert!(out.cancelled);
        assert!(out.log.is_empty());
        assert!(out.events.is_empty());
        assert!(out.registry.is_empty());
    }
}
