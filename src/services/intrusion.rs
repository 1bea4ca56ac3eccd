//! Zone intrusion state machine
//!
//! One machine per camera. Each (track, zone) pair moves through
//! `NotPresent -> Pending -> Confirmed -> NotPresent`; only confirmed
//! intrusions produce events, so short pass-throughs are debounced away.

use crate::domain::event::{Event, EventType};
use crate::domain::types::{CameraId, ObjectClass, Sample, Track, TrackKey, ZoneId};
use crate::services::zone_index::ZoneIndex;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct IntrusionConfig {
    /// Seconds a track must stay in a zone before the intrusion is confirmed
    pub min_duration_s: f64,
    /// Frames a track may go unobserved before it leaves its zones (0 disables)
    pub max_missing_frames: u64,
    /// Classes that can raise intrusions (empty = all)
    pub classes: Vec<ObjectClass>,
}

impl Default for IntrusionConfig {
    fn default() -> Self {
        Self { min_duration_s: 2.0, max_missing_frames: 0, classes: Vec::new() }
    }
}

impl IntrusionConfig {
    #[inline]
    pub fn admits(&self, class: ObjectClass) -> bool {
        self.classes.is_empty() || self.classes.contains(&class)
    }
}

/// State of one (track, zone) pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntrusionState {
    NotPresent,
    Pending { entry_time: f64 },
    Confirmed { entry_time: f64, confirm_time: f64 },
}

/// Open intrusions and last observation of one track
#[derive(Debug, Default)]
struct TrackZones {
    zones: BTreeMap<ZoneId, IntrusionState>,
    last: Option<Sample>,
}

pub struct IntrusionStateMachine<'a> {
    camera_id: CameraId,
    zones: &'a ZoneIndex,
    config: IntrusionConfig,
    tracks: FxHashMap<TrackKey, TrackZones>,
}

impl<'a> IntrusionStateMachine<'a> {
    pub fn new(camera_id: CameraId, zones: &'a ZoneIndex, config: IntrusionConfig) -> Self {
        Self { camera_id, zones, config, tracks: FxHashMap::default() }
    }

    pub fn camera_id(&self) -> &CameraId {
        &self.camera_id
    }

    /// Current state of a (track, zone) pair
    pub fn state(&self, track: &TrackKey, zone_id: &ZoneId) -> IntrusionState {
        self.tracks
            .get(track)
            .and_then(|t| t.zones.get(zone_id))
            .copied()
            .unwrap_or(IntrusionState::NotPresent)
    }

    /// Run a whole track through the machine and flush it
    pub fn process_track(&mut self, track: &Track) -> Vec<Event> {
        let mut out = Vec::new();
        if !self.config.admits(track.class()) {
            return out;
        }
        for sample in &track.samples {
            self.observe(track.key, sample, &mut out);
        }
        self.finish_track(track.key, &mut out);
        out
    }

    /// Feed one sample of `track`, appending any transitions to `out`
    pub fn observe(&mut self, track: TrackKey, sample: &Sample, out: &mut Vec<Event>) {
        let inside = self.zones.zones_containing(&self.camera_id, &sample.bbox);
        let min_duration = self.config.min_duration_s;
        let max_missing = self.config.max_missing_frames;
        let camera_id = &self.camera_id;

        let state = self.tracks.entry(track).or_default();

        // unobserved too long: leave every zone at the last seen sample
        if let Some(last) = &state.last {
            let missing = sample.frame_index.saturating_sub(last.frame_index).saturating_sub(1);
            if max_missing > 0 && missing > max_missing {
                debug!(camera_id = %camera_id, track = %track, missing = %missing, "track_gap_exit");
                close_all(camera_id, track, &mut state.zones, last, out);
            }
        }

        let t = sample.sync_time;
        for zone_id in &inside {
            let current = state.zones.get(zone_id).copied().unwrap_or(IntrusionState::NotPresent);
            let next = match current {
                IntrusionState::NotPresent if min_duration <= 0.0 => {
                    out.push(event(camera_id, track, zone_id, EventType::Confirmed, 0.0, sample));
                    IntrusionState::Confirmed { entry_time: t, confirm_time: t }
                }
                IntrusionState::NotPresent => IntrusionState::Pending { entry_time: t },
                IntrusionState::Pending { entry_time } if t - entry_time >= min_duration => {
                    out.push(event(
                        camera_id,
                        track,
                        zone_id,
                        EventType::Confirmed,
                        t - entry_time,
                        sample,
                    ));
                    IntrusionState::Confirmed { entry_time, confirm_time: t }
                }
                other => other,
            };
            state.zones.insert(zone_id.clone(), next);
        }

        let exited: Vec<ZoneId> =
            state.zones.keys().filter(|z| !inside.contains(z)).cloned().collect();
        for zone_id in exited {
            if let Some(IntrusionState::Confirmed { entry_time, .. }) = state.zones.remove(&zone_id) {
                out.push(event(camera_id, track, &zone_id, EventType::Ended, t - entry_time, sample));
            }
        }

        state.last = Some(sample.clone());
    }

    /// Track terminated: end confirmed intrusions at the last sample, drop pending ones
    pub fn finish_track(&mut self, track: TrackKey, out: &mut Vec<Event>) {
        if let Some(mut state) = self.tracks.remove(&track) {
            if let Some(last) = &state.last {
                close_all(&self.camera_id, track, &mut state.zones, last, out);
            }
        }
    }
}

fn close_all(
    camera_id: &CameraId,
    track: TrackKey,
    zones: &mut BTreeMap<ZoneId, IntrusionState>,
    at: &Sample,
    out: &mut Vec<Event>,
) {
    for (zone_id, state) in std::mem::take(zones) {
        if let IntrusionState::Confirmed { entry_time, .. } = state {
            out.push(event(camera_id, track, &zone_id, EventType::Ended, at.sync_time - entry_time, at));
        }
    }
}

fn event(
    camera_id: &CameraId,
    track: TrackKey,
    zone_id: &ZoneId,
    event_type: EventType,
    duration: f64,
    sample: &Sample,
) -> Event {
    debug!(
        camera_id = %camera_id,
        track = %track,
        zone_id = %zone_id,
        duration = %duration,
        "intrusion_{}",
        event_type.as_str()
    );
    Event {
        event_type,
        camera_id: camera_id.clone(),
        track,
        zone_id: zone_id.clone(),
        duration,
        frame_index: sample.frame_index,
        local_time: sample.local_time,
        sync_time: sample.sync_time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{BBox, Zone};
    use crate::infra::config::ContainmentPolicy;
    use crate::infra::diagnostics::Diagnostics;

    const IN: BBox = BBox { x1: 10.0, y1: 10.0, x2: 20.0, y2: 20.0 };
    const IN_BOTH: BBox = BBox { x1: 110.0, y1: 10.0, x2: 120.0, y2: 20.0 };
    const OUT: BBox = BBox { x1: 500.0, y1: 500.0, x2: 510.0, y2: 510.0 };

    fn zone(id: &str, x: f64, width: f64) -> Zone {
        Zone {
            zone_id: ZoneId::from(id),
            display_name: id.to_string(),
            camera_id: CameraId::from("A"),
            points: vec![[x, 0.0], [x + width, 0.0], [x + width, 100.0], [x, 100.0]],
            active: true,
        }
    }

    fn index() -> ZoneIndex {
        // Z1 covers x 0..121 and Z2 covers x 100..200, so IN_BOTH sits in both
        let zones = vec![zone("Z2", 100.0, 100.0), zone("Z1", 0.0, 121.0)];
        ZoneIndex::new(zones, ContainmentPolicy::Overlap, &Diagnostics::new())
    }

    fn track(class: ObjectClass, samples: &[(u64, f64, BBox)]) -> Track {
        let mut t = Track::new(CameraId::from("A"), TrackKey::new(class, 1));
        for &(frame, time, bbox) in samples {
            t.samples.push(Sample {
                frame_index: frame,
                local_time: time,
                sync_time: time,
                position: bbox.center(),
                bbox,
            });
        }
        t
    }

    fn config(min_duration_s: f64) -> IntrusionConfig {
        IntrusionConfig { min_duration_s, ..Default::default() }
    }

    fn summary(events: &[Event]) -> Vec<(EventType, &str, f64, u64)> {
        events.iter().map(|e| (e.event_type, e.zone_id.0.as_str(), e.duration, e.frame_index)).collect()
    }

    #[test]
    fn test_debounce_confirms_after_min_duration() {
        let zones = index();
        let mut sm = IntrusionStateMachine::new(CameraId::from("A"), &zones, config(2.0));
        let t = track(
            ObjectClass::Person,
            &[(0, 0.0, IN), (1, 1.0, IN), (2, 1.9, IN), (3, 2.0, IN), (4, 3.0, IN), (5, 4.0, OUT)],
        );

        let events = sm.process_track(&t);
        assert_eq!(
            summary(&events),
            vec![(EventType::Confirmed, "Z1", 2.0, 3), (EventType::Ended, "Z1", 4.0, 5)]
        );
    }

    #[test]
    fn test_immediate_mode_confirms_with_zero_duration() {
        let zones = index();
        let mut sm = IntrusionStateMachine::new(CameraId::from("A"), &zones, config(0.0));
        let t = track(ObjectClass::Person, &[(7, 5.0, IN), (8, 6.0, IN)]);

        let events = sm.process_track(&t);
        assert_eq!(
            summary(&events),
            vec![(EventType::Confirmed, "Z1", 0.0, 7), (EventType::Ended, "Z1", 1.0, 8)]
        );
    }

    #[test]
    fn test_pending_exit_emits_nothing() {
        let zones = index();
        let mut sm = IntrusionStateMachine::new(CameraId::from("A"), &zones, config(2.0));
        let mut out = Vec::new();
        let t = track(ObjectClass::Person, &[(0, 0.0, IN), (1, 1.0, OUT)]);

        sm.observe(t.key, &t.samples[0], &mut out);
        assert!(matches!(
            sm.state(&t.key, &ZoneId::from("Z1")),
            IntrusionState::Pending { entry_time } if entry_time == 0.0
        ));
        sm.observe(t.key, &t.samples[1], &mut out);
        assert!(out.is_empty());
        assert_eq!(sm.state(&t.key, &ZoneId::from("Z1")), IntrusionState::NotPresent);
    }

    #[test]
    fn test_final_flush_ends_confirmed_and_drops_pending() {
        let zones = index();
        let mut sm = IntrusionStateMachine::new(CameraId::from("A"), &zones, config(1.0));
        // Z1 confirmed from t=0, Z2 entered at t=1.5 and still pending at the end
        let t = track(ObjectClass::Person, &[(0, 0.0, IN), (1, 1.0, IN), (2, 1.5, IN_BOTH), (3, 2.0, IN_BOTH)]);

        let events = sm.process_track(&t);
        assert_eq!(
            summary(&events),
            vec![(EventType::Confirmed, "Z1", 1.0, 1), (EventType::Ended, "Z1", 2.0, 3)]
        );
    }

    #[test]
    fn test_confirmations_precede_endings_in_zone_order() {
        let zones = index();
        let mut sm = IntrusionStateMachine::new(CameraId::from("A"), &zones, config(0.0));
        let t = track(ObjectClass::Person, &[(0, 0.0, IN_BOTH), (1, 1.0, IN), (2, 2.0, OUT)]);

        let events = sm.process_track(&t);
        assert_eq!(
            summary(&events),
            vec![
                (EventType::Confirmed, "Z1", 0.0, 0),
                (EventType::Confirmed, "Z2", 0.0, 0),
                (EventType::Ended, "Z2", 1.0, 1),
                (EventType::Ended, "Z1", 2.0, 2),
            ]
        );
    }

    #[test]
    fn test_frame_gap_exits_at_last_observed_sample() {
        let zones = index();
        let cfg = IntrusionConfig { min_duration_s: 0.0, max_missing_frames: 5, classes: vec![] };
        let mut sm = IntrusionStateMachine::new(CameraId::from("A"), &zones, cfg);
        let t = track(ObjectClass::Person, &[(0, 0.0, IN), (3, 0.3, IN), (20, 2.0, IN)]);

        let events = sm.process_track(&t);
        assert_eq!(
            summary(&events),
            vec![
                (EventType::Confirmed, "Z1", 0.0, 0),
                (EventType::Ended, "Z1", 0.3, 3),
                (EventType::Confirmed, "Z1", 0.0, 20),
                (EventType::Ended, "Z1", 0.0, 20),
            ]
        );
    }

    #[test]
    fn test_class_filter() {
        let zones = index();
        let cfg = IntrusionConfig {
            min_duration_s: 0.0,
            max_missing_frames: 0,
            classes: vec![ObjectClass::Person],
        };
        let mut sm = IntrusionStateMachine::new(CameraId::from("A"), &zones, cfg);

        assert!(sm.process_track(&track(ObjectClass::Suitcase, &[(0, 0.0, IN)])).is_empty());
        assert_eq!(sm.process_track(&track(ObjectClass::Person, &[(0, 0.0, IN)])).len(), 2);
    }
}
