//! Post-hoc event enrichment
//!
//! Runs after identity matching. Each raw event is joined to its track's
//! global identity, given the nearest appearance of the same identity on
//! another camera before and after it, and checked against events from
//! overlapping cameras that watch the same physical area.
//!
//! Enrichment reads only the base event fields, so running it again over an
//! already enriched log reproduces the same records.

use crate::domain::event::{CameraContext, EnrichedEvent, EventLog, EventType};
use crate::domain::types::{CameraId, GlobalId, Track, TrackRef, ZoneId};
use crate::infra::diagnostics::{Diagnostic, Diagnostics};
use crate::services::zone_index::ZoneIndex;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use tokio::sync::watch;
use tracing::{debug, info};

pub struct EventEnricher {
    /// Every known track and its identity, if any
    tracks: FxHashMap<TrackRef, Option<GlobalId>>,
    /// Appearances per identity, sorted by (start, camera, track)
    appearances: FxHashMap<GlobalId, Vec<CameraContext>>,
    /// `(camera key, zone id)` -> display name
    zone_names: FxHashMap<(String, ZoneId), String>,
    dedup_window_s: f64,
}

impl EventEnricher {
    /// Index the track population. Identities are read from `Track::global_identity`.
    pub fn new(tracks: &[Track], zones: &ZoneIndex, dedup_window_s: f64) -> Self {
        let mut index = FxHashMap::default();
        let mut appearances: FxHashMap<GlobalId, Vec<CameraContext>> = FxHashMap::default();

        for track in tracks {
            index.insert(track.track_ref(), track.global_identity);
            if let (Some(gid), Some((start, end))) = (track.global_identity, track.sync_interval()) {
                appearances.entry(gid).or_default().push(CameraContext {
                    camera_id: track.camera_id.clone(),
                    track: track.key,
                    interval_start: start,
                    interval_end: end,
                });
            }
        }
        for list in appearances.values_mut() {
            list.sort_by(|a, b| {
                a.interval_start
                    .total_cmp(&b.interval_start)
                    .then_with(|| a.camera_id.cmp(&b.camera_id))
                    .then_with(|| a.track.cmp(&b.track))
            });
        }

        let zone_names = zones
            .iter()
            .map(|z| ((z.camera_id.key(), z.zone_id.clone()), z.display_name.clone()))
            .collect();

        Self { tracks: index, appearances, zone_names, dedup_window_s }
    }

    /// Enrich the whole log
    pub fn enrich(&self, log: &EventLog, diagnostics: &Diagnostics) -> Vec<EnrichedEvent> {
        self.enrich_until(log, diagnostics, || false).0
    }

    /// Enrich the log, stopping between events once `shutdown` is set.
    ///
    /// Returns the enriched prefix and whether the run was cut short.
    pub fn enrich_with_shutdown(
        &self,
        log: &EventLog,
        diagnostics: &Diagnostics,
        shutdown: &watch::Receiver<bool>,
    ) -> (Vec<EnrichedEvent>, bool) {
        self.enrich_until(log, diagnostics, || *shutdown.borrow())
    }

    fn enrich_until(
        &self,
        log: &EventLog,
        diagnostics: &Diagnostics,
        cancelled: impl Fn() -> bool,
    ) -> (Vec<EnrichedEvent>, bool) {
        let mut out = Vec::with_capacity(log.len());
        let mut stopped = false;

        for entry in log.iter() {
            if cancelled() {
                stopped = true;
                break;
            }
            let mut record = EnrichedEvent::raw(entry.seq, entry.event.clone());

            let track_ref = TrackRef::new(record.event.camera_id.clone(), record.event.track);
            let joined = self.tracks.get(&track_ref);
            if joined.is_some() {
                record.zone_name = self.zone_name(&record.event.camera_id, &record.event.zone_id);
            }
            match joined {
                // no matching track: the event goes out exactly as logged
                None => {
                    diagnostics.record(Diagnostic::InconsistentJoin { seq: entry.seq, track: track_ref });
                }
                Some(None) => {}
                Some(Some(gid)) => {
                    record.global_identity = Some(*gid);
                    record.enriched = true;
                    let (prev, next) = self.neighbors(*gid, &record.event.camera_id, record.event.sync_time);
                    record.prev_camera_context = prev;
                    record.next_camera_context = next;
                }
            }
            out.push(record);
        }

        let deduplicated = self.deduplicate(&mut out);
        info!(
            events = %out.len(),
            enriched = %out.iter().filter(|e| e.enriched).count(),
            deduplicated = %deduplicated,
            cancelled = %stopped,
            "events_enriched"
        );
        (out, stopped)
    }

    fn zone_name(&self, camera_id: &CameraId, zone_id: &ZoneId) -> Option<String> {
        self.zone_names.get(&(camera_id.key(), zone_id.clone())).cloned()
    }

    /// Closest appearance on another camera ending before `t` and starting after `t`
    fn neighbors(
        &self,
        gid: GlobalId,
        camera_id: &CameraId,
        t: f64,
    ) -> (Option<CameraContext>, Option<CameraContext>) {
        let Some(list) = self.appearances.get(&gid) else {
            return (None, None);
        };
        let mut prev: Option<&CameraContext> = None;
        let mut next: Option<&CameraContext> = None;

        for app in list.iter().filter(|a| !a.camera_id.same_camera(camera_id)) {
            if app.interval_end < t && prev.map_or(true, |p| app.interval_end > p.interval_end) {
                prev = Some(app);
            }
            if app.interval_start > t && next.map_or(true, |n| app.interval_start < n.interval_start) {
                next = Some(app);
            }
        }
        (prev.cloned(), next.cloned())
    }

    /// Mark repeats of the same identity in same-named zones on other cameras.
    ///
    /// Within each (display name, identity, event type) group, events are
    /// visited by (sync time, seq). An event is a duplicate when an earlier
    /// kept event from a different (camera, zone) lies within the window.
    fn deduplicate(&self, events: &mut [EnrichedEvent]) -> usize {
        let mut groups: BTreeMap<(String, GlobalId, EventType), Vec<usize>> = BTreeMap::new();
        for (idx, e) in events.iter().enumerate() {
            if let (Some(name), Some(gid)) = (&e.zone_name, e.global_identity) {
                groups.entry((name.clone(), gid, e.event.event_type)).or_default().push(idx);
            }
        }

        let mut marked = 0;
        for mut members in groups.into_values() {
            members.sort_by(|&a, &b| {
                events[a]
                    .event
                    .sync_time
                    .total_cmp(&events[b].event.sync_time)
                    .then_with(|| events[a].seq.cmp(&events[b].seq))
            });

            let mut kept: Vec<usize> = Vec::new();
            for idx in members {
                let e = &events[idx];
                let source = (e.event.camera_id.key(), &e.event.zone_id);
                let duplicate = kept.iter().any(|&k| {
                    let canonical = &events[k];
                    (canonical.event.camera_id.key(), &canonical.event.zone_id) != source
                        && e.event.sync_time - canonical.event.sync_time <= self.dedup_window_s
                });
                if duplicate {
                    debug!(seq = %e.seq, zone = ?e.zone_name, "event_deduplicated");
                    events[idx].deduplicated = true;
                    marked += 1;
                } else {
                    kept.push(idx);
                }
            }
        }
        marked
    }
}
