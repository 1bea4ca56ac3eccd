//! Shared types for camtrail

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Camera identifier as it appears in trajectory files and site configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(pub String);

impl CameraId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lookup key shared by zones, offsets and topology.
    ///
    /// Trims whitespace and strips a case-insensitive `CAMERA_` prefix, so
    /// `CAMERA_HALL` recorded by the tracker matches `HALL` in a zone file.
    pub fn key(&self) -> String {
        let trimmed = self.0.trim();
        match trimmed.get(..7) {
            Some(prefix) if prefix.eq_ignore_ascii_case("CAMERA_") => trimmed[7..].to_string(),
            _ => trimmed.to_string(),
        }
    }

    /// True if both ids refer to the same physical camera
    pub fn same_camera(&self, other: &CameraId) -> bool {
        self.key() == other.key()
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CameraId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Newtype wrapper for zone ids
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub String);

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ZoneId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Global identity minted by the identity matcher (monotonic within a run)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobalId(pub u64);

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Object classes the upstream detector keeps (COCO subset)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    Person,
    Backpack,
    Handbag,
    Suitcase,
    Bottle,
    Cup,
    Laptop,
    CellPhone,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown object class `{0}`")]
pub struct UnknownClass(pub String);

impl ObjectClass {
    pub const ALL: [ObjectClass; 8] = [
        ObjectClass::Person,
        ObjectClass::Backpack,
        ObjectClass::Handbag,
        ObjectClass::Suitcase,
        ObjectClass::Bottle,
        ObjectClass::Cup,
        ObjectClass::Laptop,
        ObjectClass::CellPhone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectClass::Person => "person",
            ObjectClass::Backpack => "backpack",
            ObjectClass::Handbag => "handbag",
            ObjectClass::Suitcase => "suitcase",
            ObjectClass::Bottle => "bottle",
            ObjectClass::Cup => "cup",
            ObjectClass::Laptop => "laptop",
            ObjectClass::CellPhone => "cell_phone",
        }
    }

    /// Whether the upstream embedder produces appearance vectors for this class
    #[inline]
    pub fn embeds_appearance(&self) -> bool {
        matches!(self, ObjectClass::Person)
    }
}

impl FromStr for ObjectClass {
    type Err = UnknownClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(' ', "_");
        ObjectClass::ALL
            .into_iter()
            .find(|class| class.as_str() == normalized)
            .ok_or_else(|| UnknownClass(s.to_string()))
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Track id namespaced by object class.
///
/// The tracker numbers tracks per class, so `person 3` and `cup 3` are
/// different objects on the same camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackKey {
    #[serde(rename = "class_label")]
    pub class: ObjectClass,
    #[serde(rename = "track_id")]
    pub id: u64,
}

impl TrackKey {
    #[inline]
    pub fn new(class: ObjectClass, id: u64) -> Self {
        Self { class, id }
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class, self.id)
    }
}

/// Run-wide track reference: camera plus class-namespaced track id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackRef {
    pub camera_id: CameraId,
    #[serde(flatten)]
    pub track: TrackKey,
}

impl TrackRef {
    pub fn new(camera_id: CameraId, track: TrackKey) -> Self {
        Self { camera_id, track }
    }
}

impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.camera_id, self.track)
    }
}

/// Axis-aligned bounding box in image pixels, `(x1, y1)` top-left
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn is_valid(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2].iter().all(|v| v.is_finite())
            && self.x2 >= self.x1
            && self.y2 >= self.y1
    }

    #[inline]
    pub fn center(&self) -> [f64; 2] {
        [(self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0]
    }

    /// Foot point of the box (bottom edge midpoint)
    #[inline]
    pub fn bottom_center(&self) -> [f64; 2] {
        [(self.x1 + self.x2) / 2.0, self.y2]
    }

    pub fn corners(&self) -> [[f64; 2]; 4] {
        [[self.x1, self.y1], [self.x2, self.y1], [self.x2, self.y2], [self.x1, self.y2]]
    }

    #[inline]
    pub fn contains_point(&self, p: [f64; 2]) -> bool {
        p[0] >= self.x1 && p[0] <= self.x2 && p[1] >= self.y1 && p[1] <= self.y2
    }
}

/// One observation of a track
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub frame_index: u64,
    /// Camera-local seconds
    pub local_time: f64,
    /// Seconds on the shared run timeline (set by TimeSync)
    pub sync_time: f64,
    pub position: [f64; 2],
    pub bbox: BBox,
}

/// One continuous observation of one object within one camera
#[derive(Debug, Clone)]
pub struct Track {
    pub camera_id: CameraId,
    pub key: TrackKey,
    pub samples: Vec<Sample>,
    pub embeddings: Vec<Vec<f32>>,
    pub global_identity: Option<GlobalId>,
}

impl Track {
    pub fn new(camera_id: CameraId, key: TrackKey) -> Self {
        Self { camera_id, key, samples: Vec::new(), embeddings: Vec::new(), global_identity: None }
    }

    #[inline]
    pub fn class(&self) -> ObjectClass {
        self.key.class
    }

    pub fn track_ref(&self) -> TrackRef {
        TrackRef::new(self.camera_id.clone(), self.key)
    }

    /// Earliest and latest sync time over all samples
    pub fn sync_interval(&self) -> Option<(f64, f64)> {
        self.samples.iter().map(|s| s.sync_time).fold(None, |acc, t| match acc {
            None => Some((t, t)),
            Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
        })
    }
}

/// Named polygon scoped to one camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub zone_id: ZoneId,
    pub display_name: String,
    pub camera_id: CameraId,
    pub points: Vec<[f64; 2]>,
    pub active: bool,
}
