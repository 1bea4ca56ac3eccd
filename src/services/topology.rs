//! Camera reachability gate
//!
//! A directed graph of camera transitions with optional travel-time windows.
//! The identity matcher consults it before merging tracks from two cameras;
//! an empty graph disables gating. A camera named by no edge is not gated.

use crate::domain::types::CameraId;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Directed transition `from -> to` with an optional travel-time window (seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraEdge {
    pub from: CameraId,
    pub to: CameraId,
    #[serde(default, rename = "min_s", skip_serializing_if = "Option::is_none")]
    pub min_gap_s: Option<f64>,
    #[serde(default, rename = "max_s", skip_serializing_if = "Option::is_none")]
    pub max_gap_s: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    #[serde(default)]
    pub edges: Vec<CameraEdge>,
    /// Upper bound for edges that carry no max of their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_max_gap_s: Option<f64>,
    #[serde(default = "default_allow_same_camera_match")]
    pub allow_same_camera_match: bool,
}

fn default_allow_same_camera_match() -> bool {
    true
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            edges: Vec::new(),
            default_max_gap_s: None,
            allow_same_camera_match: default_allow_same_camera_match(),
        }
    }
}

/// Time extent of one track on one camera
#[derive(Debug, Clone, Copy)]
pub struct TrackSpan<'a> {
    pub camera_id: &'a CameraId,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone)]
pub struct CameraTopologyGate {
    /// `(from_key, to_key)` -> windows `(min, max)`
    windows: FxHashMap<(String, String), Vec<(f64, f64)>>,
    /// Keys of every camera named by an edge
    cameras: FxHashSet<String>,
    allow_same_camera_match: bool,
}

impl Default for CameraTopologyGate {
    fn default() -> Self {
        Self::new(&TopologyConfig::default())
    }
}

impl CameraTopologyGate {
    pub fn new(config: &TopologyConfig) -> Self {
        let mut windows: FxHashMap<(String, String), Vec<(f64, f64)>> = FxHashMap::default();
        let mut cameras = FxHashSet::default();
        for edge in &config.edges {
            let min = edge.min_gap_s.unwrap_or(0.0);
            let max = edge.max_gap_s.or(config.default_max_gap_s).unwrap_or(f64::INFINITY);
            let (from, to) = (edge.from.key(), edge.to.key());
            cameras.insert(from.clone());
            cameras.insert(to.clone());
            windows.entry((from, to)).or_default().push((min, max));
        }
        Self { windows, cameras, allow_same_camera_match: config.allow_same_camera_match }
    }

    /// No edges: every cross-camera transition is allowed
    pub fn is_open(&self) -> bool {
        self.windows.is_empty()
    }

    /// Is `camera_id` named by any edge
    pub fn knows(&self, camera_id: &CameraId) -> bool {
        self.cameras.contains(&camera_id.key())
    }

    /// Can a subject seen on `prev` reappear on `next` after `dt_s` seconds
    pub fn allowed(&self, prev: &CameraId, next: &CameraId, dt_s: f64) -> bool {
        if prev.same_camera(next) {
            return self.allow_same_camera_match;
        }
        if self.is_open() {
            return true;
        }
        // cameras outside the graph are not gated
        if !self.knows(prev) || !self.knows(next) {
            return true;
        }
        match self.windows.get(&(prev.key(), next.key())) {
            Some(windows) => windows.iter().any(|&(min, max)| min <= dt_s && dt_s <= max),
            None => false,
        }
    }

    /// Gate two tracks: the earlier-starting one is `prev`, `dt = max(0, later.start - earlier.end)`.
    ///
    /// Tracks starting at the same instant pass if either direction is allowed.
    pub fn transition_allowed(&self, a: TrackSpan<'_>, b: TrackSpan<'_>) -> bool {
        let forward = |prev: &TrackSpan<'_>, next: &TrackSpan<'_>| {
            let dt = (next.start - prev.end).max(0.0);
            self.allowed(prev.camera_id, next.camera_id, dt)
        };
        if a.start < b.start {
            forward(&a, &b)
        } else if b.start < a.start {
            forward(&b, &a)
        } else {
            forward(&a, &b) || forward(&b, &a)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(from: &str, to: &str, min: Option<f64>, max: Option<f64>) -> CameraEdge {
        CameraEdge { from: CameraId::from(from), to: CameraId::from(to), min_gap_s: min, max_gap_s: max }
    }

    fn gate(edges: Vec<CameraEdge>) -> CameraTopologyGate {
        CameraTopologyGate::new(&TopologyConfig { edges, ..Default::default() })
    }

    #[test]
    fn test_window_bounds() {
        let gate = gate(vec![edge("A", "B", Some(3.0), Some(120.0))]);
        let (a, b) = (CameraId::from("A"), CameraId::from("B"));
        assert!(!gate.allowed(&a, &b, 200.0));
        assert!(gate.allowed(&a, &b, 50.0));
        assert!(gate.allowed(&a, &b, 3.0));
        assert!(gate.allowed(&a, &b, 120.0));
        assert!(!gate.allowed(&a, &b, 2.9));
        // directed
        assert!(!gate.allowed(&b, &a, 50.0));
    }

    #[test]
    fn test_open_gate_and_same_camera() {
        let open = CameraTopologyGate::default();
        assert!(open.is_open());
        assert!(open.allowed(&CameraId::from("A"), &CameraId::from("Z"), 1e6));

        let strict = CameraTopologyGate::new(&TopologyConfig {
            allow_same_camera_match: false,
            ..Default::default()
        });
        assert!(!strict.allowed(&CameraId::from("A"), &CameraId::from("CAMERA_A"), 0.0));
        assert!(strict.allowed(&CameraId::from("A"), &CameraId::from("B"), 0.0));
    }

    #[test]
    fn test_missing_max_uses_default_gap() {
        let gate = CameraTopologyGate::new(&TopologyConfig {
            edges: vec![edge("A", "B", None, None), edge("B", "C", None, Some(500.0))],
            default_max_gap_s: Some(60.0),
            allow_same_camera_match: true,
        });
        assert!(gate.allowed(&CameraId::from("A"), &CameraId::from("B"), 60.0));
        assert!(!gate.allowed(&CameraId::from("A"), &CameraId::from("B"), 61.0));
        assert!(gate.allowed(&CameraId::from("B"), &CameraId::from("C"), 400.0));
        // A and C are both in the graph but have no edge between them
        assert!(!gate.allowed(&CameraId::from("A"), &CameraId::from("C"), 1.0));
    }

    #[test]
    fn test_camera_outside_graph_is_not_gated() {
        let gate = gate(vec![edge("CAMERA_A", "CAMERA_B", Some(3.0), Some(120.0))]);
        let (a, b, d) = (CameraId::from("A"), CameraId::from("B"), CameraId::from("CAMERA_D"));

        assert!(gate.knows(&a));
        assert!(!gate.knows(&d));
        assert!(gate.allowed(&a, &d, 10.0));
        assert!(gate.allowed(&d, &b, 1e6));
        // known pairs are still gated
        assert!(!gate.allowed(&b, &a, 10.0));
        assert!(!gate.allowed(&a, &b, 200.0));
    }

    #[test]
    fn test_any_window_admits() {
        let gate = gate(vec![
            edge("A", "B", Some(0.0), Some(10.0)),
            edge("A", "B", Some(100.0), Some(200.0)),
        ]);
        let (a, b) = (CameraId::from("A"), CameraId::from("B"));
        assert!(gate.allowed(&a, &b, 5.0));
        assert!(!gate.allowed(&a, &b, 50.0));
        assert!(gate.allowed(&a, &b, 150.0));
    }

    #[test]
    fn test_transition_orders_by_start_and_clamps_overlap() {
        let gate = gate(vec![edge("A", "B", Some(3.0), Some(120.0))]);
        let (a, b) = (CameraId::from("A"), CameraId::from("B"));
        let on_a = TrackSpan { camera_id: &a, start: 0.0, end: 10.0 };

        let later_b = TrackSpan { camera_id: &b, start: 60.0, end: 70.0 };
        assert!(gate.transition_allowed(later_b, on_a));

        // overlapping spans give dt 0, below the 3 s minimum
        let overlapping_b = TrackSpan { camera_id: &b, start: 5.0, end: 30.0 };
        assert!(!gate.transition_allowed(on_a, overlapping_b));

        // B first, then A: no B -> A edge
        let earlier_b = TrackSpan { camera_id: &b, start: -100.0, end: -50.0 };
        assert!(!gate.transition_allowed(on_a, earlier_b));
    }

    #[test]
    fn test_deserialize_file_shape() {
        let config: TopologyConfig = serde_json::from_str(
            r#"{"edges":[{"from":"A","to":"B","min_s":3,"max_s":120}],"default_max_gap_s":600}"#,
        )
        .unwrap();
        assert_eq!(config.edges[0].min_gap_s, Some(3.0));
        assert_eq!(config.default_max_gap_s, Some(600.0));
        assert!(config.allow_same_camera_match);
    }
}
