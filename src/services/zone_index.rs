//! Zone registry and polygon containment
//!
//! Zones are validated once at load time. Invalid polygons are dropped and
//! reported; they never reach the intrusion state machine.

use crate::domain::types::{BBox, CameraId, Zone, ZoneId};
use crate::infra::config::ContainmentPolicy;
use crate::infra::diagnostics::{Diagnostic, Diagnostics};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::info;

const EPS: f64 = 1e-9;

/// Why a polygon was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolygonError {
    #[error("polygon has {0} points, need at least 3")]
    TooFewPoints(usize),
    #[error("polygon has a non-finite coordinate")]
    NonFinite,
    #[error("polygon has zero area")]
    ZeroArea,
    #[error("polygon edges {0} and {1} intersect")]
    SelfIntersecting(usize, usize),
}

/// Check that a polygon is simple with positive area
pub fn validate_polygon(points: &[[f64; 2]]) -> Result<(), PolygonError> {
    let n = points.len();
    if n < 3 {
        return Err(PolygonError::TooFewPoints(n));
    }
    if points.iter().any(|p| !p[0].is_finite() || !p[1].is_finite()) {
        return Err(PolygonError::NonFinite);
    }
    if signed_area(points).abs() <= EPS {
        return Err(PolygonError::ZeroArea);
    }
    for i in 0..n {
        for j in (i + 1)..n {
            // adjacent edges share a vertex by construction
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            let (a, b) = (points[i], points[(i + 1) % n]);
            let (c, d) = (points[j], points[(j + 1) % n]);
            if segments_intersect(a, b, c, d) {
                return Err(PolygonError::SelfIntersecting(i, j));
            }
        }
    }
    Ok(())
}

/// Shoelace area (positive when counter-clockwise)
fn signed_area(points: &[[f64; 2]]) -> f64 {
    let n = points.len();
    let mut sum = 0.0;
    for i in 0..n {
        let p = points[i];
        let q = points[(i + 1) % n];
        sum += p[0] * q[1] - q[0] * p[1];
    }
    sum / 2.0
}

#[inline]
fn cross(o: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
}

#[inline]
fn orientation(o: [f64; 2], a: [f64; 2], b: [f64; 2]) -> i8 {
    let c = cross(o, a, b);
    if c > EPS {
        1
    } else if c < -EPS {
        -1
    } else {
        0
    }
}

/// `p` lies on segment `a-b` (assumes collinearity was checked)
#[inline]
fn within_box(a: [f64; 2], b: [f64; 2], p: [f64; 2]) -> bool {
    p[0] >= a[0].min(b[0]) - EPS
        && p[0] <= a[0].max(b[0]) + EPS
        && p[1] >= a[1].min(b[1]) - EPS
        && p[1] <= a[1].max(b[1]) + EPS
}

/// Closed segment intersection, touching included
fn segments_intersect(a: [f64; 2], b: [f64; 2], c: [f64; 2], d: [f64; 2]) -> bool {
    let o1 = orientation(a, b, c);
    let o2 = orientation(a, b, d);
    let o3 = orientation(c, d, a);
    let o4 = orientation(c, d, b);

    if o1 != o2 && o3 != o4 {
        return true;
    }
    (o1 == 0 && within_box(a, b, c))
        || (o2 == 0 && within_box(a, b, d))
        || (o3 == 0 && within_box(c, d, a))
        || (o4 == 0 && within_box(c, d, b))
}

/// Point in polygon; points on the boundary count as inside
pub fn point_in_polygon(p: [f64; 2], polygon: &[[f64; 2]]) -> bool {
    let n = polygon.len();
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (polygon[i], polygon[j]);
        if orientation(a, b, p) == 0 && within_box(a, b, p) {
            return true;
        }
        if (a[1] > p[1]) != (b[1] > p[1]) {
            let x_cross = (b[0] - a[0]) * (p[1] - a[1]) / (b[1] - a[1]) + a[0];
            if p[0] < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Box and polygon share at least one point
pub fn bbox_overlaps_polygon(bbox: &BBox, polygon: &[[f64; 2]]) -> bool {
    if polygon.iter().any(|&p| bbox.contains_point(p)) {
        return true;
    }
    let corners = bbox.corners();
    if corners.iter().any(|&c| point_in_polygon(c, polygon)) {
        return true;
    }
    let n = polygon.len();
    for i in 0..n {
        let (a, b) = (polygon[i], polygon[(i + 1) % n]);
        for k in 0..4 {
            if segments_intersect(a, b, corners[k], corners[(k + 1) % 4]) {
                return true;
            }
        }
    }
    false
}

/// Evaluate one containment policy
pub fn contains(policy: ContainmentPolicy, bbox: &BBox, polygon: &[[f64; 2]]) -> bool {
    match policy {
        ContainmentPolicy::Center => point_in_polygon(bbox.center(), polygon),
        ContainmentPolicy::BottomCenter => point_in_polygon(bbox.bottom_center(), polygon),
        ContainmentPolicy::AnyCorner => bbox.corners().iter().any(|&c| point_in_polygon(c, polygon)),
        ContainmentPolicy::Overlap => bbox_overlaps_polygon(bbox, polygon),
    }
}

/// Valid zones grouped by camera, sorted by zone id
#[derive(Debug, Clone, Default)]
pub struct ZoneIndex {
    by_camera: FxHashMap<String, Vec<Zone>>,
    policy: ContainmentPolicy,
}

impl ZoneIndex {
    /// Build the index, dropping (and reporting) malformed or duplicate zones
    pub fn new(zones: Vec<Zone>, policy: ContainmentPolicy, diagnostics: &Diagnostics) -> Self {
        let mut by_camera: FxHashMap<String, Vec<Zone>> = FxHashMap::default();
        let mut accepted = 0usize;

        for zone in zones {
            if let Err(e) = validate_polygon(&zone.points) {
                diagnostics.record(Diagnostic::MalformedZone {
                    camera_id: zone.camera_id.clone(),
                    zone_id: zone.zone_id.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
            let entry = by_camera.entry(zone.camera_id.key()).or_default();
            if entry.iter().any(|z| z.zone_id == zone.zone_id) {
                diagnostics.record(Diagnostic::MalformedZone {
                    camera_id: zone.camera_id.clone(),
                    zone_id: zone.zone_id.clone(),
                    reason: "duplicate zone id".to_string(),
                });
                continue;
            }
            entry.push(zone);
            accepted += 1;
        }

        for zones in by_camera.values_mut() {
            zones.sort_by(|a, b| a.zone_id.cmp(&b.zone_id));
        }

        info!(zones = %accepted, cameras = %by_camera.len(), policy = ?policy, "zones_indexed");
        Self { by_camera, policy }
    }

    pub fn policy(&self) -> ContainmentPolicy {
        self.policy
    }

    /// All zones of a camera, inactive ones included
    pub fn zones_for(&self, camera_id: &CameraId) -> &[Zone] {
        self.by_camera.get(&camera_id.key()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn zone(&self, camera_id: &CameraId, zone_id: &ZoneId) -> Option<&Zone> {
        self.zones_for(camera_id).iter().find(|z| &z.zone_id == zone_id)
    }

    /// Active zones of `camera_id` containing `bbox`, in zone-id order
    pub fn zones_containing(&self, camera_id: &CameraId, bbox: &BBox) -> SmallVec<[ZoneId; 4]> {
        self.zones_for(camera_id)
            .iter()
            .filter(|z| z.active && contains(self.policy, bbox, &z.points))
            .map(|z| z.zone_id.clone())
            .collect()
    }

    /// Every indexed zone, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.by_camera.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_camera.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
