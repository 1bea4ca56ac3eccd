//! Site description loaders: zones, camera offsets and camera topology
//!
//! Each loader takes an optional path. A path that is not configured yields
//! the neutral value (no zones, no offsets, open gate).

use crate::domain::types::{CameraId, Zone, ZoneId};
use crate::infra::config::Config;
use crate::infra::diagnostics::{Diagnostic, Diagnostics};
use crate::infra::metrics::RunMetrics;
use crate::io::trajectory::load_trajectories;
use crate::services::pipeline::RunInputs;
use crate::services::time_sync::TimeSync;
use crate::services::topology::{CameraEdge, CameraTopologyGate, TopologyConfig};
use crate::services::zone_index::ZoneIndex;
use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct RawZone {
    #[serde(default)]
    zone_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    camera_id: String,
    polygon: Vec<[f64; 2]>,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

fn read_json(path: &Path, what: &str) -> anyhow::Result<Value> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {} file {}", what, path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {} file {}", what, path.display()))
}

/// Zone records from a JSON object keyed by zone id or a JSON array.
///
/// Records missing required fields are reported as malformed and skipped.
/// Geometry is validated later by the zone index.
pub fn parse_zones(doc: Value, diagnostics: &Diagnostics) -> Vec<Zone> {
    let records: Vec<(Option<String>, Value)> = match doc {
        Value::Object(map) => map.into_iter().map(|(k, v)| (Some(k), v)).collect(),
        Value::Array(items) => items.into_iter().map(|v| (None, v)).collect(),
        other => {
            diagnostics.record(Diagnostic::MalformedZone {
                camera_id: CameraId::new(""),
                zone_id: ZoneId(String::new()),
                reason: format!("zone document must be an object or array, got {}", json_kind(&other)),
            });
            return Vec::new();
        }
    };

    let mut zones = Vec::with_capacity(records.len());
    for (idx, (key, value)) in records.into_iter().enumerate() {
        let label = key.clone().unwrap_or_else(|| format!("#{}", idx));
        let camera_hint = value.get("camera_id").and_then(Value::as_str).unwrap_or_default().to_string();
        match serde_json::from_value::<RawZone>(value) {
            Ok(raw) => {
                let Some(zone_id) = raw.zone_id.or(key) else {
                    diagnostics.record(Diagnostic::MalformedZone {
                        camera_id: CameraId::new(raw.camera_id),
                        zone_id: ZoneId(label),
                        reason: "missing zone_id".to_string(),
                    });
                    continue;
                };
                zones.push(Zone {
                    display_name: raw.name.unwrap_or_else(|| zone_id.clone()),
                    zone_id: ZoneId(zone_id),
                    camera_id: CameraId::new(raw.camera_id),
                    points: raw.polygon,
                    active: raw.active,
                });
            }
            Err(e) => diagnostics.record(Diagnostic::MalformedZone {
                camera_id: CameraId::new(camera_hint),
                zone_id: ZoneId(label),
                reason: e.to_string(),
            }),
        }
    }
    zones
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Zones of the configured file. An unreadable file leaves the run without zones.
pub fn load_zones(path: Option<&Path>, diagnostics: &Diagnostics) -> Vec<Zone> {
    let Some(path) = path else {
        return Vec::new();
    };
    match read_json(path, "zone") {
        Ok(doc) => {
            let zones = parse_zones(doc, diagnostics);
            info!(file = %path.display(), zones = %zones.len(), "zones_loaded");
            zones
        }
        Err(e) => {
            warn!(error = %format!("{:#}", e), "zones_file_ignored");
            Vec::new()
        }
    }
}

fn read_offsets(path: &Path) -> anyhow::Result<BTreeMap<String, f64>> {
    serde_json::from_value(read_json(path, "offset")?)
        .with_context(|| format!("Offset file {} must map camera ids to seconds", path.display()))
}

/// Offsets from the JSON table, overridden by the inline TOML entries.
///
/// An unreadable file contributes nothing; cameras it would have covered fall
/// back to offset 0 and are reported by the time sync.
pub fn load_offsets(path: Option<&Path>, inline: &BTreeMap<String, f64>) -> TimeSync {
    let mut merged = match path.map(read_offsets) {
        Some(Ok(table)) => table,
        Some(Err(e)) => {
            warn!(error = %format!("{:#}", e), "offsets_file_ignored");
            BTreeMap::new()
        }
        None => BTreeMap::new(),
    };
    for (camera, offset) in inline {
        merged.insert(camera.clone(), *offset);
    }
    merged.retain(|camera, offset| {
        let finite = offset.is_finite();
        if !finite {
            warn!(camera_id = %camera, "offset_not_finite");
        }
        finite
    });
    info!(cameras = %merged.len(), "offsets_loaded");
    TimeSync::from_offsets(merged)
}

/// Lenient topology parse: a bad edge is skipped, a bad document is `None`.
pub fn parse_topology(doc: &Value) -> Option<TopologyConfig> {
    let obj = doc.as_object()?;
    let mut edges = Vec::new();
    if let Some(items) = obj.get("edges").and_then(Value::as_array) {
        for item in items {
            match serde_json::from_value::<CameraEdge>(item.clone()) {
                Ok(edge) if edge_is_sane(&edge) => edges.push(edge),
                Ok(_) | Err(_) => warn!(edge = %item, "topology_edge_skipped"),
            }
        }
    }
    Some(TopologyConfig {
        edges,
        default_max_gap_s: obj.get("default_max_gap_s").and_then(Value::as_f64).filter(|v| *v >= 0.0),
        allow_same_camera_match: obj.get("allow_same_camera_match").and_then(Value::as_bool).unwrap_or(true),
    })
}

fn edge_is_sane(edge: &CameraEdge) -> bool {
    let min = edge.min_gap_s.unwrap_or(0.0);
    let max_ok = edge.max_gap_s.map_or(true, |max| max.is_finite() && max >= min);
    min.is_finite() && min >= 0.0 && max_ok
}

/// Topology from the JSON file merged with the inline `[topology]` section.
///
/// Edges from both sources are kept; scalar settings from the inline section
/// win. A missing or unreadable file leaves the gate open.
pub fn load_topology(path: Option<&Path>, inline: Option<&TopologyConfig>) -> CameraTopologyGate {
    let from_file = path.and_then(|path| match read_json(path, "topology") {
        Ok(doc) => {
            let parsed = parse_topology(&doc);
            if parsed.is_none() {
                warn!(file = %path.display(), "topology_file_ignored");
            }
            parsed
        }
        Err(e) => {
            warn!(error = %format!("{:#}", e), "topology_file_ignored");
            None
        }
    });

    let config = match (from_file, inline) {
        (None, None) => TopologyConfig::default(),
        (Some(file), None) => file,
        (None, Some(inline)) => inline.clone(),
        (Some(mut file), Some(inline)) => {
            file.edges.extend(inline.edges.iter().cloned());
            file.default_max_gap_s = inline.default_max_gap_s.or(file.default_max_gap_s);
            file.allow_same_camera_match = inline.allow_same_camera_match;
            file
        }
    };
    let gate = CameraTopologyGate::new(&config);
    info!(edges = %config.edges.len(), open = %gate.is_open(), "topology_loaded");
    gate
}

/// Load every input a run needs, as configured
pub fn load_run_inputs(
    config: &Config,
    diagnostics: &Diagnostics,
    metrics: &RunMetrics,
) -> anyhow::Result<RunInputs> {
    let tracks = load_trajectories(config.trajectories_dir(), diagnostics, metrics)?;
    let zones = ZoneIndex::new(load_zones(config.zones_file(), diagnostics), config.containment(), diagnostics);
    let time_sync = load_offsets(config.offsets_file(), config.offsets());
    let gate = load_topology(config.topology_file(), config.topology());
    Ok(RunInputs { tracks, zones, time_sync, gate })
}
