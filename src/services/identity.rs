//! Cross-camera identity resolution
//!
//! Tracks are clustered incrementally by appearance. Each track is reduced to
//! one unit-length representative (the normalized mean of its first few
//! embeddings) and compared by cosine distance against every identity seen so
//! far. The closest identity under the threshold absorbs the track; otherwise
//! a new identity is minted. Identities are never merged or deleted within a
//! run.
//!
//! Candidate identities can be vetoed by the camera topology gate: an identity
//! is only eligible if at least one of its member tracks could plausibly have
//! walked to (or from) the candidate track's camera in the elapsed time.

use crate::domain::types::{CameraId, GlobalId, Track, TrackKey, TrackRef};
use crate::infra::config::MatchOrder;
use crate::infra::diagnostics::{Diagnostic, Diagnostics};
use crate::infra::metrics::RunMetrics;
use crate::services::topology::{CameraTopologyGate, TrackSpan};
use rustc_hash::FxHashMap;
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Distances closer than this are treated as equal; the lower id wins
const TIE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct MatcherConfig {
    /// Cosine distance a match must stay strictly below
    pub threshold: f64,
    /// Leading embeddings averaged into a track representative
    pub track_embeddings: usize,
    /// Embeddings kept per identity for its representative
    pub cluster_window: usize,
    pub order: MatchOrder,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self { threshold: 0.3, track_embeddings: 5, cluster_window: 10, order: MatchOrder::Chronological }
    }
}

/// One track absorbed into an identity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterMember {
    pub camera_id: CameraId,
    #[serde(flatten)]
    pub track: TrackKey,
    pub interval_start: f64,
    pub interval_end: f64,
}

impl ClusterMember {
    fn span(&self) -> TrackSpan<'_> {
        TrackSpan { camera_id: &self.camera_id, start: self.interval_start, end: self.interval_end }
    }
}

#[derive(Debug, Clone)]
pub struct IdentityCluster {
    id: GlobalId,
    window: VecDeque<Vec<f64>>,
    representative: Vec<f64>,
    members: SmallVec<[ClusterMember; 4]>,
}

impl IdentityCluster {
    fn new(id: GlobalId, representative: Vec<f64>, member: ClusterMember) -> Self {
        let mut window = VecDeque::new();
        window.push_back(representative.clone());
        let mut members = SmallVec::new();
        members.push(member);
        Self { id, window, representative, members }
    }

    pub fn id(&self) -> GlobalId {
        self.id
    }

    pub fn representative(&self) -> &[f64] {
        &self.representative
    }

    pub fn members(&self) -> &[ClusterMember] {
        &self.members
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    fn absorb(&mut self, embedding: Vec<f64>, member: ClusterMember, window: usize) {
        self.window.push_back(embedding);
        while self.window.len() > window {
            self.window.pop_front();
        }
        // a window that averages to zero keeps the previous representative
        if let Some(rep) = normalized_mean(self.window.iter().map(Vec::as_slice)) {
            self.representative = rep;
        }
        self.members.push(member);
    }
}

/// Why a track did not take part in matching
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoEmbeddings,
    NoSamples,
    ZeroNorm,
    DimensionMismatch { expected: usize, found: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Joined { id: GlobalId, distance: f64 },
    Created { id: GlobalId },
    Skipped(SkipReason),
}

impl MatchOutcome {
    pub fn global_id(&self) -> Option<GlobalId> {
        match self {
            MatchOutcome::Joined { id, .. } | MatchOutcome::Created { id } => Some(*id),
            MatchOutcome::Skipped(_) => None,
        }
    }
}

/// Element-wise mean of `vectors`, scaled to unit length. `None` if the mean is zero.
fn normalized_mean<'a>(vectors: impl Iterator<Item = &'a [f64]>) -> Option<Vec<f64>> {
    let mut sum: Vec<f64> = Vec::new();
    let mut n = 0usize;
    for v in vectors {
        if sum.is_empty() {
            sum = vec![0.0; v.len()];
        }
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += x;
        }
        n += 1;
    }
    if n == 0 {
        return None;
    }
    let norm = sum.iter().map(|x| x * x).sum::<f64>().sqrt();
    if !norm.is_finite() || norm <= f64::EPSILON {
        return None;
    }
    Some(sum.into_iter().map(|x| x / norm).collect())
}

/// Cosine distance between two unit vectors
#[inline]
fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    1.0 - a.iter().zip(b).map(|(x, y)| x * y).sum::<f64>()
}

/// Unit-length representative of a track's first `m` embeddings
pub fn track_representative(track: &Track, m: usize) -> Result<Vec<f64>, SkipReason> {
    let first = track.embeddings.first().ok_or(SkipReason::NoEmbeddings)?;
    let dim = first.len();
    let used: Vec<Vec<f64>> = track
        .embeddings
        .iter()
        .take(m.max(1))
        .map(|e| e.iter().map(|&x| x as f64).collect())
        .collect();
    if let Some(bad) = used.iter().find(|e| e.len() != dim) {
        return Err(SkipReason::DimensionMismatch { expected: dim, found: bad.len() });
    }
    normalized_mean(used.iter().map(Vec::as_slice)).ok_or(SkipReason::ZeroNorm)
}

/// All identities of one run plus the track -> identity assignment
#[derive(Debug, Clone)]
pub struct IdentityRegistry {
    /// Ordered by id
    clusters: Vec<IdentityCluster>,
    next_id: u64,
    assignment: FxHashMap<TrackRef, GlobalId>,
    dimension: Option<usize>,
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self { clusters: Vec::new(), next_id: 1, assignment: FxHashMap::default(), dimension: None }
    }

    pub fn clusters(&self) -> &[IdentityCluster] {
        &self.clusters
    }

    pub fn cluster(&self, id: GlobalId) -> Option<&IdentityCluster> {
        self.clusters.binary_search_by_key(&id, |c| c.id).ok().map(|i| &self.clusters[i])
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn assignment(&self, track: &TrackRef) -> Option<GlobalId> {
        self.assignment.get(track).copied()
    }

    /// Assignment pairs sorted by track reference
    pub fn assignments(&self) -> Vec<(TrackRef, GlobalId)> {
        let mut pairs: Vec<_> = self.assignment.iter().map(|(k, v)| (k.clone(), *v)).collect();
        pairs.sort();
        pairs
    }

    /// Write assigned identities onto the tracks
    pub fn apply(&self, tracks: &mut [Track]) {
        for track in tracks.iter_mut() {
            track.global_identity = self.assignment(&track.track_ref());
        }
    }

    fn mint(&mut self, representative: Vec<f64>, member: ClusterMember) -> GlobalId {
        let id = GlobalId(self.next_id);
        self.next_id += 1;
        self.clusters.push(IdentityCluster::new(id, representative, member));
        id
    }
}

/// Sequential matcher over a fixed track order
pub struct IdentityMatcher {
    config: MatcherConfig,
    gate: CameraTopologyGate,
    metrics: Arc<RunMetrics>,
    registry: IdentityRegistry,
}

impl IdentityMatcher {
    pub fn new(config: MatcherConfig, gate: CameraTopologyGate, metrics: Arc<RunMetrics>) -> Self {
        Self { config, gate, metrics, registry: IdentityRegistry::new() }
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn into_registry(self) -> IdentityRegistry {
        self.registry
    }

    /// Indices of `tracks` in matching order
    pub fn processing_order(&self, tracks: &[Track]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..tracks.len()).collect();
        match self.config.order {
            MatchOrder::Chronological => order.sort_by(|&a, &b| {
                let start = |t: &Track| t.sync_interval().map(|(s, _)| s).unwrap_or(f64::INFINITY);
                start(&tracks[a])
                    .total_cmp(&start(&tracks[b]))
                    .then_with(|| tracks[a].camera_id.cmp(&tracks[b].camera_id))
                    .then_with(|| tracks[a].key.cmp(&tracks[b].key))
            }),
            MatchOrder::Camera => order.sort_by(|&a, &b| {
                tracks[a]
                    .camera_id
                    .cmp(&tracks[b].camera_id)
                    .then_with(|| tracks[a].key.cmp(&tracks[b].key))
            }),
        }
        order
    }

    /// Match one track against the registry
    pub fn assign(&mut self, track: &Track) -> MatchOutcome {
        let Some((start, end)) = track.sync_interval() else {
            return MatchOutcome::Skipped(SkipReason::NoSamples);
        };
        let representative = match track_representative(track, self.config.track_embeddings) {
            Ok(rep) => rep,
            Err(reason) => return MatchOutcome::Skipped(reason),
        };
        if let Some(expected) = self.registry.dimension {
            if representative.len() != expected {
                return MatchOutcome::Skipped(SkipReason::DimensionMismatch {
                    expected,
                    found: representative.len(),
                });
            }
        }

        let span = TrackSpan { camera_id: &track.camera_id, start, end };
        let mut best: Option<(usize, f64)> = None;
        for (idx, cluster) in self.registry.clusters.iter().enumerate() {
            if !cluster.members.iter().any(|m| self.gate.transition_allowed(span, m.span())) {
                self.metrics.record_gate_rejection();
                continue;
            }
            let distance = cosine_distance(&representative, &cluster.representative);
            if distance >= self.config.threshold {
                continue;
            }
            let better = match best {
                None => true,
                Some((_, best_distance)) => distance < best_distance - TIE_EPSILON,
            };
            if better {
                best = Some((idx, distance));
            }
        }

        let track_ref = track.track_ref();
        let member = ClusterMember {
            camera_id: track.camera_id.clone(),
            track: track.key,
            interval_start: start,
            interval_end: end,
        };
        let window = self.config.cluster_window.max(1);

        let outcome = match best {
            Some((idx, distance)) => {
                let cluster = &mut self.registry.clusters[idx];
                cluster.absorb(representative, member, window);
                self.metrics.record_identity_match();
                MatchOutcome::Joined { id: cluster.id, distance }
            }
            None => {
                if self.registry.dimension.is_none() {
                    self.registry.dimension = Some(representative.len());
                }
                let id = self.registry.mint(representative, member);
                self.metrics.record_identity_created();
                MatchOutcome::Created { id }
            }
        };

        if let Some(id) = outcome.global_id() {
            debug!(track = %track_ref, global_identity = %id, outcome = ?outcome, "identity_assigned");
            self.registry.assignment.insert(track_ref, id);
        }
        outcome
    }

    /// Match every track in processing order.
    ///
    /// Checks `shutdown` between tracks; returns `true` if the run was cut
    /// short, in which case the registry holds a consistent prefix.
    pub fn run(
        &mut self,
        tracks: &[Track],
        shutdown: &watch::Receiver<bool>,
        diagnostics: &Diagnostics,
    ) -> bool {
        if !self.gate.is_open() {
            let ungated: BTreeSet<&CameraId> =
                tracks.iter().map(|t| &t.camera_id).filter(|c| !self.gate.knows(c)).collect();
            for camera_id in ungated {
                warn!(camera_id = %camera_id, "topology_camera_ungated");
            }
        }

        let order = self.processing_order(tracks);
        for idx in order {
            if *shutdown.borrow() {
                info!(identities = %self.registry.len(), "identity_matching_cancelled");
                return true;
            }
            let track = &tracks[idx];
            if let MatchOutcome::Skipped(reason) = self.assign(track) {
                self.metrics.record_identity_skipped();
                report_skip(track, reason, diagnostics);
            }
        }

        info!(
            identities = %self.registry.len(),
            assigned = %self.registry.assignment.len(),
            gate_rejections = %self.metrics.gate_rejections(),
            "identity_matching_complete"
        );
        false
    }
}

fn report_skip(track: &Track, reason: SkipReason, diagnostics: &Diagnostics) {
    let track_ref = track.track_ref();
    match reason {
        SkipReason::NoEmbeddings if track.class().embeds_appearance() => {
            diagnostics.record(Diagnostic::MissingEmbedding { track: track_ref })
        }
        // other classes never carry embeddings
        SkipReason::NoEmbeddings | SkipReason::NoSamples => {}
        SkipReason::ZeroNorm => diagnostics.record(Diagnostic::CorruptTrackRecord {
            source_name: track_ref.to_string(),
            reason: "embedding mean has zero norm".to_string(),
        }),
        SkipReason::DimensionMismatch { expected, found } => {
            diagnostics.record(Diagnostic::CorruptTrackRecord {
                source_name: track_ref.to_string(),
                reason: format!("embedding dimension {} does not match {}", found, expected),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{BBox, ObjectClass, Sample};
    use crate::services::topology::{CameraEdge, TopologyConfig};

    fn track(camera: &str, id: u64, start: f64, end: f64, embeddings: Vec<Vec<f32>>) -> Track {
        let mut t = Track::new(CameraId::from(camera), TrackKey::new(ObjectClass::Person, id));
        for (i, time) in [start, end].into_iter().enumerate() {
            t.samples.push(Sample {
                frame_index: i as u64,
                local_time: time,
                sync_time: time,
                position: [0.0, 0.0],
                bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
            });
        }
        t.embeddings = embeddings;
        t
    }

    fn matcher(threshold: f64) -> IdentityMatcher {
        IdentityMatcher::new(
            MatcherConfig { threshold, ..Default::default() },
            CameraTopologyGate::default(),
            Arc::new(RunMetrics::new()),
        )
    }

    fn gated(edges: Vec<CameraEdge>, allow_same: bool) -> IdentityMatcher {
        let gate = CameraTopologyGate::new(&TopologyConfig {
            edges,
            default_max_gap_s: None,
            allow_same_camera_match: allow_same,
        });
        IdentityMatcher::new(MatcherConfig::default(), gate, Arc::new(RunMetrics::new()))
    }

    fn run(m: &mut IdentityMatcher, tracks: &[Track]) -> Diagnostics {
        let (_tx, rx) = watch::channel(false);
        let diagnostics = Diagnostics::new();
        assert!(!m.run(tracks, &rx, &diagnostics));
        diagnostics
    }

    fn gid(m: &IdentityMatcher, camera: &str, id: u64) -> Option<u64> {
        m.registry()
            .assignment(&TrackRef::new(CameraId::from(camera), TrackKey::new(ObjectClass::Person, id)))
            .map(|g| g.0)
    }

    #[test]
    fn test_threshold_is_strict() {
        // orthogonal vectors are exactly distance 1.0 apart
        let tracks = vec![
            track("A", 1, 0.0, 1.0, vec![vec![1.0, 0.0]]),
            track("B", 1, 2.0, 3.0, vec![vec![0.0, 1.0]]),
        ];

        let mut at_boundary = matcher(1.0);
        run(&mut at_boundary, &tracks);
        assert_eq!(at_boundary.registry().len(), 2);

        let mut above = matcher(1.001);
        run(&mut above, &tracks);
        assert_eq!(above.registry().len(), 1);
        assert_eq!(gid(&above, "B", 1), Some(1));
    }

    #[test]
    fn test_ids_are_monotonic_from_one() {
        let mut m = matcher(0.3);
        let tracks = vec![
            track("A", 1, 0.0, 1.0, vec![vec![1.0, 0.0, 0.0]]),
            track("A", 2, 1.0, 2.0, vec![vec![0.0, 1.0, 0.0]]),
            track("B", 7, 5.0, 6.0, vec![vec![0.0, 0.0, 1.0]]),
            track("B", 8, 9.0, 9.5, vec![vec![0.05, 0.99, 0.0]]),
        ];
        run(&mut m, &tracks);
        assert_eq!(gid(&m, "A", 1), Some(1));
        assert_eq!(gid(&m, "A", 2), Some(2));
        assert_eq!(gid(&m, "B", 7), Some(3));
        assert_eq!(gid(&m, "B", 8), Some(2));
        assert_eq!(m.registry().cluster(GlobalId(2)).map(|c| c.members().len()), Some(2));
    }

    #[test]
    fn test_tie_prefers_lower_id() {
        let mut m = matcher(0.3);
        let diag = std::f32::consts::FRAC_1_SQRT_2;
        let tracks = vec![
            track("A", 1, 0.0, 1.0, vec![vec![1.0, 0.0]]),
            track("A", 2, 2.0, 3.0, vec![vec![0.0, 1.0]]),
            track("B", 3, 4.0, 5.0, vec![vec![diag, diag]]),
        ];
        run(&mut m, &tracks);
        assert_eq!(gid(&m, "B", 3), Some(1));
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut m = IdentityMatcher::new(
            MatcherConfig { cluster_window: 2, ..Default::default() },
            CameraTopologyGate::default(),
            Arc::new(RunMetrics::new()),
        );
        let tracks: Vec<Track> = (0..4)
            .map(|i| track("A", i, i as f64, i as f64 + 0.5, vec![vec![1.0, 0.01 * i as f32]]))
            .collect();
        run(&mut m, &tracks);
        let cluster = &m.registry().clusters()[0];
        assert_eq!(m.registry().len(), 1);
        assert_eq!(cluster.window_len(), 2);
        assert_eq!(cluster.members().len(), 4);
        let norm: f64 = cluster.representative().iter().map(|x| x * x).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_track_representative_uses_first_m() {
        let t = track("A", 1, 0.0, 1.0, vec![vec![3.0, 0.0], vec![0.0, 3.0], vec![0.0, -100.0]]);
        let rep = track_representative(&t, 2).unwrap();
        let expected = std::f64::consts::FRAC_1_SQRT_2;
        assert!((rep[0] - expected).abs() < 1e-12);
        assert!((rep[1] - expected).abs() < 1e-12);

        let zero = track("A", 2, 0.0, 1.0, vec![vec![1.0, 0.0], vec![-1.0, 0.0]]);
        assert_eq!(track_representative(&zero, 5), Err(SkipReason::ZeroNorm));
    }

    #[test]
    fn test_gate_excludes_out_of_window_clusters() {
        let edges = vec![CameraEdge {
            from: CameraId::from("A"),
            to: CameraId::from("B"),
            min_gap_s: Some(3.0),
            max_gap_s: Some(120.0),
        }];
        let mut m = gated(edges, true);
        let same = vec![1.0, 0.0];
        let tracks = vec![
            track("A", 1, 0.0, 10.0, vec![same.clone()]),
            // 190 s after A ends: outside the window
            track("B", 1, 200.0, 210.0, vec![same.clone()]),
        ];
        run(&mut m, &tracks);
        assert_eq!(gid(&m, "A", 1), Some(1));
        assert_eq!(gid(&m, "B", 1), Some(2));

        // 50 s after A ends: inside the window
        let mut m = gated(
            vec![CameraEdge {
                from: CameraId::from("A"),
                to: CameraId::from("B"),
                min_gap_s: Some(3.0),
                max_gap_s: Some(120.0),
            }],
            true,
        );
        run(&mut m, &[track("A", 1, 0.0, 10.0, vec![same.clone()]), track("B", 1, 60.0, 70.0, vec![same])]);
        assert_eq!(gid(&m, "B", 1), Some(1));
    }

    #[test]
    fn test_camera_outside_topology_matches_freely() {
        let edges = vec![CameraEdge {
            from: CameraId::from("A"),
            to: CameraId::from("B"),
            min_gap_s: Some(3.0),
            max_gap_s: Some(120.0),
        }];
        let mut m = gated(edges, true);
        let same = vec![1.0, 0.0];
        run(&mut m, &[track("A", 1, 0.0, 5.0, vec![same.clone()]), track("D", 1, 15.0, 20.0, vec![same])]);

        assert_eq!(m.registry().len(), 1);
        assert_eq!(gid(&m, "D", 1), Some(1));
    }

    #[test]
    fn test_candidates_at_threshold_do_not_win_ties() {
        // two near-identical clusters kept apart by the same-camera rule
        let tracks = vec![
            track("A", 1, 0.0, 1.0, vec![vec![100.0, 1.0]]),
            track("A", 2, 2.0, 3.0, vec![vec![100.00001, 1.0]]),
            track("B", 1, 4.0, 5.0, vec![vec![1.0, 0.0]]),
        ];
        let rep = |t: &Track| track_representative(t, 5).unwrap();
        let d1 = cosine_distance(&rep(&tracks[2]), &rep(&tracks[0]));
        let d2 = cosine_distance(&rep(&tracks[2]), &rep(&tracks[1]));
        assert!(d2 < d1 && d1 - d2 < TIE_EPSILON);

        // cluster 1 sits exactly on the threshold, cluster 2 just below it
        let gate = CameraTopologyGate::new(&TopologyConfig { allow_same_camera_match: false, ..Default::default() });
        let mut m = IdentityMatcher::new(
            MatcherConfig { threshold: d1, ..Default::default() },
            gate,
            Arc::new(RunMetrics::new()),
        );
        run(&mut m, &tracks);

        assert_eq!(m.registry().len(), 2);
        assert_eq!(gid(&m, "B", 1), Some(2));
    }

    #[test]
    fn test_same_camera_flag_applies_to_open_gate() {
        let mut m = gated(Vec::new(), false);
        let e = vec![1.0, 0.0];
        run(&mut m, &[track("A", 1, 0.0, 1.0, vec![e.clone()]), track("A", 2, 5.0, 6.0, vec![e])]);
        assert_eq!(m.registry().len(), 2);
    }

    #[test]
    fn test_skips_are_diagnosed() {
        let mut m = matcher(0.3);
        let mut cup = track("A", 9, 0.0, 1.0, vec![]);
        cup.key = TrackKey::new(ObjectClass::Cup, 9);
        let tracks = vec![
            track("A", 1, 0.0, 1.0, vec![vec![1.0, 0.0, 0.0]]),
            track("A", 2, 1.0, 2.0, vec![]),
            track("A", 3, 2.0, 3.0, vec![vec![1.0, 0.0]]),
            cup,
        ];
        let diagnostics = run(&mut m, &tracks);
        let counts = diagnostics.counts_by_kind();
        assert_eq!(counts.get("missing_embedding"), Some(&1));
        assert_eq!(counts.get("corrupt_track_record"), Some(&1));
        assert_eq!(m.registry().len(), 1);
        assert_eq!(gid(&m, "A", 2), None);
    }

    #[test]
    fn test_deterministic_across_input_order() {
        let tracks = vec![
            track("B", 1, 13.0, 18.0, vec![vec![0.9, 0.1, 0.0]]),
            track("A", 1, 5.0, 9.0, vec![vec![1.0, 0.0, 0.0]]),
            track("C", 4, 5.0, 7.0, vec![vec![0.0, 1.0, 0.0]]),
            track("A", 2, 20.0, 25.0, vec![vec![0.0, 0.95, 0.05]]),
        ];
        let mut reversed = tracks.clone();
        reversed.reverse();

        let mut first = matcher(0.3);
        run(&mut first, &tracks);
        let mut second = matcher(0.3);
        run(&mut second, &reversed);

        assert_eq!(first.registry().assignments(), second.registry().assignments());
        assert_eq!(gid(&first, "A", 1), Some(1));
        assert_eq!(gid(&first, "C", 4), Some(2));
    }

    #[test]
    fn test_cancelled_before_start_assigns_nothing() {
        let mut m = matcher(0.3);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let cancelled = m.run(&[track("A", 1, 0.0, 1.0, vec![vec![1.0]])], &rx, &Diagnostics::new());
        assert!(cancelled);
        assert!(m.registry().is_empty());
    }

    #[test]
    fn test_apply_writes_identities() {
        let mut m = matcher(0.3);
        let mut tracks = vec![track("A", 1, 0.0, 1.0, vec![vec![1.0, 0.0]]), track("A", 2, 0.0, 1.0, vec![])];
        run(&mut m, &tracks);
        m.registry().apply(&mut tracks);
        assert_eq!(tracks[0].global_identity, Some(GlobalId(1)));
        assert_eq!(tracks[1].global_identity, None);
    }
}
