//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/camtrail.toml

use crate::domain::types::ObjectClass;
use crate::services::identity::MatcherConfig;
use crate::services::intrusion::IntrusionConfig;
use crate::services::topology::TopologyConfig;
use anyhow::Context;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// How a bounding box is tested against a zone polygon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainmentPolicy {
    /// Box center inside the polygon
    Center,
    /// Foot point (bottom edge midpoint) inside the polygon
    BottomCenter,
    /// Any box corner inside the polygon
    AnyCorner,
    /// Box and polygon intersect; touching counts
    #[default]
    Overlap,
}

/// Order in which tracks are fed to the identity matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOrder {
    /// Track start time, then camera id, then track key
    #[default]
    Chronological,
    /// Camera id, then track key
    Camera,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_trajectories_dir")]
    pub trajectories_dir: String,
    #[serde(default)]
    pub zones_file: Option<String>,
    #[serde(default)]
    pub offsets_file: Option<String>,
    #[serde(default)]
    pub topology_file: Option<String>,
}

fn default_trajectories_dir() -> String {
    "data/trajectories".to_string()
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            trajectories_dir: default_trajectories_dir(),
            zones_file: None,
            offsets_file: None,
            topology_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
    /// Enriched events (JSONL), relative to `dir`
    #[serde(default = "default_events_file")]
    pub events_file: String,
    #[serde(default = "default_identities_file")]
    pub identities_file: String,
    #[serde(default = "default_report_file")]
    pub report_file: String,
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_events_file() -> String {
    "events.jsonl".to_string()
}

fn default_identities_file() -> String {
    "identities.json".to_string()
}

fn default_report_file() -> String {
    "run_report.json".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            events_file: default_events_file(),
            identities_file: default_identities_file(),
            report_file: default_report_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntrusionSection {
    #[serde(default = "default_min_duration_s")]
    pub min_duration_s: f64,
    /// Frame gap after which an unobserved track leaves its zones (0 disables)
    #[serde(default)]
    pub max_missing_frames: u64,
    #[serde(default)]
    pub containment: ContainmentPolicy,
    /// Classes that can raise intrusions (empty = all)
    #[serde(default)]
    pub classes: Vec<ObjectClass>,
}

fn default_min_duration_s() -> f64 {
    2.0
}

impl Default for IntrusionSection {
    fn default() -> Self {
        Self {
            min_duration_s: default_min_duration_s(),
            max_missing_frames: 0,
            containment: ContainmentPolicy::default(),
            classes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSection {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Embeddings averaged into a track representative
    #[serde(default = "default_track_embeddings")]
    pub track_embeddings: usize,
    /// Rolling window of embeddings kept per identity
    #[serde(default = "default_cluster_window")]
    pub cluster_window: usize,
    #[serde(default)]
    pub order: MatchOrder,
}

fn default_threshold() -> f64 {
    0.3
}

fn default_track_embeddings() -> usize {
    5
}

fn default_cluster_window() -> usize {
    10
}

impl Default for MatchingSection {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            track_embeddings: default_track_embeddings(),
            cluster_window: default_cluster_window(),
            order: MatchOrder::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentSection {
    #[serde(default = "default_dedup_window_s")]
    pub dedup_window_s: f64,
}

fn default_dedup_window_s() -> f64 {
    5.0
}

impl Default for EnrichmentSection {
    fn default() -> Self {
        Self { dedup_window_s: default_dedup_window_s() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RuntimeSection {
    /// Concurrent camera workers (0 = available parallelism)
    #[serde(default)]
    pub workers: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub intrusion: IntrusionSection,
    #[serde(default)]
    pub matching: MatchingSection,
    #[serde(default)]
    pub enrichment: EnrichmentSection,
    /// Camera time offsets in seconds, keyed by camera id
    #[serde(default)]
    pub offsets: BTreeMap<String, f64>,
    #[serde(default)]
    pub topology: Option<TopologyConfig>,
    #[serde(default)]
    pub runtime: RuntimeSection,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    config_file: String,
    trajectories_dir: PathBuf,
    zones_file: Option<PathBuf>,
    offsets_file: Option<PathBuf>,
    topology_file: Option<PathBuf>,
    output_dir: PathBuf,
    events_file: String,
    identities_file: String,
    report_file: String,
    min_duration_s: f64,
    max_missing_frames: u64,
    containment: ContainmentPolicy,
    intrusion_classes: Vec<ObjectClass>,
    threshold: f64,
    track_embeddings: usize,
    cluster_window: usize,
    match_order: MatchOrder,
    dedup_window_s: f64,
    offsets: BTreeMap<String, f64>,
    topology: Option<TopologyConfig>,
    workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/camtrail.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    /// Load configuration from an explicit path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "config_fallback_to_defaults");
                Self::default()
            }
        }
    }

    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let TomlConfig { input, output, intrusion, matching, enrichment, offsets, topology, runtime } =
            toml_config;

        Self {
            config_file,
            trajectories_dir: PathBuf::from(input.trajectories_dir),
            zones_file: input.zones_file.map(PathBuf::from),
            offsets_file: input.offsets_file.map(PathBuf::from),
            topology_file: input.topology_file.map(PathBuf::from),
            output_dir: PathBuf::from(output.dir),
            events_file: output.events_file,
            identities_file: output.identities_file,
            report_file: output.report_file,
            min_duration_s: intrusion.min_duration_s,
            max_missing_frames: intrusion.max_missing_frames,
            containment: intrusion.containment,
            intrusion_classes: intrusion.classes,
            threshold: matching.threshold,
            track_embeddings: matching.track_embeddings.max(1),
            cluster_window: matching.cluster_window.max(1),
            match_order: matching.order,
            dedup_window_s: enrichment.dedup_window_s,
            offsets,
            topology,
            workers: runtime.workers,
        }
    }

    /// Override the trajectory directory (CLI flag)
    pub fn with_trajectories_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.trajectories_dir = dir.into();
        self
    }

    /// Override the output directory (CLI flag)
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn trajectories_dir(&self) -> &Path {
        &self.trajectories_dir
    }

    pub fn zones_file(&self) -> Option<&Path> {
        self.zones_file.as_deref()
    }

    pub fn offsets_file(&self) -> Option<&Path> {
        self.offsets_file.as_deref()
    }

    pub fn topology_file(&self) -> Option<&Path> {
        self.topology_file.as_deref()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn events_path(&self) -> PathBuf {
        self.output_dir.join(&self.events_file)
    }

    pub fn identities_path(&self) -> PathBuf {
        self.output_dir.join(&self.identities_file)
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join(&self.report_file)
    }

    pub fn min_duration_s(&self) -> f64 {
        self.min_duration_s
    }

    pub fn containment(&self) -> ContainmentPolicy {
        self.containment
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn match_order(&self) -> MatchOrder {
        self.match_order
    }

    pub fn dedup_window_s(&self) -> f64 {
        self.dedup_window_s
    }

    /// Inline offsets from the `[offsets]` table
    pub fn offsets(&self) -> &BTreeMap<String, f64> {
        &self.offsets
    }

    /// Inline `[topology]` section, if any
    pub fn topology(&self) -> Option<&TopologyConfig> {
        self.topology.as_ref()
    }

    /// Camera worker limit, resolved against the machine when unset
    pub fn workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    }

    pub fn intrusion(&self) -> IntrusionConfig {
        IntrusionConfig {
            min_duration_s: self.min_duration_s,
            max_missing_frames: self.max_missing_frames,
            classes: self.intrusion_classes.clone(),
        }
    }

    pub fn matcher(&self) -> MatcherConfig {
        MatcherConfig {
            threshold: self.threshold,
            track_embeddings: self.track_embeddings,
            cluster_window: self.cluster_window,
            order: self.match_order,
        }
    }

    /// Builder method for tests to set the debounce duration
    #[cfg(test)]
    pub fn with_min_duration_s(mut self, s: f64) -> Self {
        self.min_duration_s = s;
        self
    }

    /// Builder method for tests to pin the camera worker count
    #[cfg(test)]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.trajectories_dir(), Path::new("data/trajectories"));
        assert_eq!(config.events_path(), PathBuf::from("output/events.jsonl"));
        assert_eq!(config.min_duration_s(), 2.0);
        assert_eq!(config.threshold(), 0.3);
        assert_eq!(config.containment(), ContainmentPolicy::Overlap);
        assert_eq!(config.match_order(), MatchOrder::Chronological);
        assert_eq!(config.dedup_window_s(), 5.0);
        assert!(config.topology().is_none());
        assert!(config.workers() >= 1);
    }

    #[test]
    fn test_matcher_and_intrusion_sections() {
        let config = Config::default().with_min_duration_s(0.0);
        let intrusion = config.intrusion();
        assert_eq!(intrusion.min_duration_s, 0.0);
        assert_eq!(intrusion.max_missing_frames, 0);
        assert!(intrusion.classes.is_empty());

        let matcher = config.matcher();
        assert_eq!(matcher.track_embeddings, 5);
        assert_eq!(matcher.cluster_window, 10);
    }

    #[test]
    fn test_resolve_config_path_default() {
        let args: Vec<String> = vec!["camtrail".to_string()];
        if env::var("CONFIG_FILE").is_err() {
            assert_eq!(Config::resolve_config_path(&args), "config/camtrail.toml");
        }
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> =
            vec!["camtrail".to_string(), "--config".to_string(), "config/site.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/site.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> = vec!["camtrail".to_string(), "--config=config/lab.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/lab.toml");
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::default().with_trajectories_dir("/data/in").with_output_dir("/data/out");
        assert_eq!(config.trajectories_dir(), Path::new("/data/in"));
        assert_eq!(config.report_path(), PathBuf::from("/data/out/run_report.json"));
    }

    #[test]
    fn test_containment_policy_names() {
        let section: IntrusionSection =
            toml::from_str("containment = \"bottom_center\"\nclasses = [\"person\", \"cell_phone\"]")
                .unwrap();
        assert_eq!(section.containment, ContainmentPolicy::BottomCenter);
        assert_eq!(section.classes, vec![ObjectClass::Person, ObjectClass::CellPhone]);
        assert_eq!(section.min_duration_s, 2.0);
    }
}
