//! Intrusion events and the ordered event log

use crate::domain::types::{CameraId, GlobalId, TrackKey, ZoneId};
use serde::{Deserialize, Serialize};

/// State transition reported by the intrusion state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    #[serde(alias = "intrusion_confirmed")]
    Confirmed,
    #[serde(alias = "intrusion_ended")]
    Ended,
}

impl EventType {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Confirmed => "confirmed",
            EventType::Ended => "ended",
        }
    }
}

/// Raw intrusion event, one per state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub camera_id: CameraId,
    #[serde(flatten)]
    pub track: TrackKey,
    pub zone_id: ZoneId,
    /// Seconds since zone entry
    pub duration: f64,
    pub frame_index: u64,
    pub local_time: f64,
    pub sync_time: f64,
}

/// Neighboring appearance of the same identity on another camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraContext {
    pub camera_id: CameraId,
    #[serde(flatten)]
    pub track: TrackKey,
    pub interval_start: f64,
    pub interval_end: f64,
}

/// Event plus identity, neighbor context and dedup flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedEvent {
    /// Position in the event log
    pub seq: u64,
    #[serde(flatten)]
    pub event: Event,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_identity: Option<GlobalId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_camera_context: Option<CameraContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_camera_context: Option<CameraContext>,
    #[serde(default)]
    pub deduplicated: bool,
    #[serde(default)]
    pub enriched: bool,
}

impl EnrichedEvent {
    /// Wrap a raw event with every enrichment field cleared
    pub fn raw(seq: u64, event: Event) -> Self {
        Self {
            seq,
            event,
            zone_name: None,
            global_identity: None,
            prev_camera_context: None,
            next_camera_context: None,
            deduplicated: false,
            enriched: false,
        }
    }
}

/// Entry of the event log
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub seq: u64,
    pub event: Event,
}

/// Append-only event log with monotonic positions.
///
/// Positions are assigned at append time and never reused, so downstream
/// passes (enrichment, egress) can be rerun against the same log and produce
/// the same records in the same order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Vec<LogEntry>,
    next_seq: u64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and return its position
    pub fn append(&mut self, event: Event) -> u64 {
        let seq = self.next_seq;
        self.entries.push(LogEntry { seq, event });
        self.next_seq += 1;
        seq
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            self.append(event);
        }
    }

    /// Rebuild the log from previously enriched records, keeping their positions.
    ///
    /// Records are ordered by position; a record whose position is not greater
    /// than the previous one is dropped.
    pub fn from_enriched(records: &[EnrichedEvent]) -> Self {
        let mut sorted: Vec<&EnrichedEvent> = records.iter().collect();
        sorted.sort_by_key(|r| r.seq);

        let mut log = Self::new();
        for record in sorted {
            if !log.entries.is_empty() && record.seq < log.next_seq {
                continue;
            }
            log.entries.push(LogEntry { seq: record.seq, event: record.event.clone() });
            log.next_seq = record.seq + 1;
        }
        log
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
