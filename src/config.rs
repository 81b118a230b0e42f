//! JSON configuration for the vigild daemon.
//!
//! A config file declares sources (with their filters, controls and
//! failure policy) and snapshot targets. Loading resolves every omitted
//! field to a default, applies `VIGIL_*` environment overrides, validates
//! cross references, and can then build the live pipeline.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::controls::{Controls, SoftwareControls};
use crate::filter::{
    AddText, Average, ChromaKey, Filter, Grayscale, GrayscaleMode, MirrorH, MirrorV, MotionMarker,
    TextPosition,
};
use crate::source::{FailureHook, FailurePolicy, Source, SourceKind, SourceSettings};
use crate::target::SnapshotTarget;

const DEFAULT_MAX_FPS: f64 = -1.0;
const DEFAULT_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_JPEG_QUALITY: u8 = 85;
const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 1_000;
const DEFAULT_EXEC_COOLDOWN_S: u64 = 60;
const DEFAULT_TEXT_POSITION: &str = "lower-left";
const DEFAULT_V4L2_DEVICE: &str = "/dev/video0";

// ----------------------------------------------------------------------------
// file format
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    sources: Option<Vec<SourceEntry>>,
    targets: Option<Vec<TargetEntry>>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceEntry {
    id: Option<String>,
    descr: Option<String>,
    kind: Option<String>,
    url: Option<String>,
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    max_fps: Option<f64>,
    timeout_ms: Option<u64>,
    resize_width: Option<u32>,
    resize_height: Option<u32>,
    keep_aspect: Option<bool>,
    jpeg_quality: Option<u8>,
    on_demand: Option<bool>,
    watchdog_ms: Option<u64>,
    software_controls: Option<bool>,
    failure: Option<FailureEntry>,
    filters: Option<Vec<FilterEntry>>,
}

#[derive(Debug, Deserialize, Default)]
struct FailureEntry {
    mode: Option<String>,
    message: Option<String>,
    position: Option<String>,
    bitmap: Option<PathBuf>,
    exec: Option<String>,
    exec_cooldown_s: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct FilterEntry {
    kind: Option<String>,
    text: Option<String>,
    position: Option<String>,
    mode: Option<String>,
    depth: Option<usize>,
    threshold: Option<u8>,
    background: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TargetEntry {
    id: Option<String>,
    descr: Option<String>,
    source: Option<String>,
    dir: Option<PathBuf>,
    interval_ms: Option<u64>,
}

// ----------------------------------------------------------------------------
// resolved configuration
// ----------------------------------------------------------------------------

/// Backend selector as configured. Unlike [`SourceKind`] this is not
/// feature-gated: a config may name a backend the binary was built
/// without, and building the pipeline reports that cleanly.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKindConfig {
    Synthetic,
    Pushed,
    Http { url: String },
    V4l2 { device: String },
    Rtsp { url: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterConfig {
    Text { text: String, position: TextPosition },
    MirrorH,
    MirrorV,
    Grayscale { mode: GrayscaleMode },
    Average { depth: usize },
    MotionMarker { threshold: u8 },
    ChromaKey { background: String },
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub id: String,
    pub descr: String,
    pub kind: SourceKindConfig,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub max_fps: f64,
    pub timeout: Duration,
    pub resize: Option<(u32, u32)>,
    pub keep_aspect: bool,
    pub jpeg_quality: u8,
    pub on_demand: bool,
    pub watchdog: Option<Duration>,
    pub failure: FailurePolicy,
    pub exec_failure: Option<FailureHook>,
    pub software_controls: bool,
    pub filters: Vec<FilterConfig>,
}

impl SourceConfig {
    fn chroma_backgrounds(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().filter_map(|f| match f {
            FilterConfig::ChromaKey { background } => Some(background.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub id: String,
    pub descr: String,
    pub source: String,
    pub dir: PathBuf,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct VigilConfig {
    pub sources: Vec<SourceConfig>,
    pub targets: Vec<TargetConfig>,
}

impl VigilConfig {
    /// Load from `path`, from `$VIGIL_CONFIG` when no path is given, or
    /// fall back to a single synthetic demo source.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("VIGIL_CONFIG").ok();
        let effective = path.map(Path::to_path_buf).or(env_path.map(PathBuf::from));

        let file_cfg = match &effective {
            Some(p) => Some(read_config_file(p)?),
            None => None,
        };

        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConfigFile) -> Result<Self> {
        let source_entries = file.sources.unwrap_or_else(|| {
            // no config at all: one synthetic camera so the daemon does
            // something visible out of the box
            vec![SourceEntry {
                id: Some("demo".to_string()),
                descr: Some("synthetic demo camera".to_string()),
                width: Some(640),
                height: Some(480),
                max_fps: Some(10.0),
                ..SourceEntry::default()
            }]
        });

        let mut sources = Vec::with_capacity(source_entries.len());
        for entry in source_entries {
            sources.push(parse_source(entry)?);
        }

        let mut targets = Vec::new();
        for entry in file.targets.unwrap_or_default() {
            targets.push(parse_target(entry)?);
        }

        Ok(Self { sources, targets })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(ms) = std::env::var("VIGIL_TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| anyhow!("VIGIL_TIMEOUT_MS must be an integer number of ms"))?;
            for s in &mut self.sources {
                s.timeout = Duration::from_millis(ms);
            }
        }
        if let Ok(q) = std::env::var("VIGIL_JPEG_QUALITY") {
            let q: u8 = q
                .parse()
                .map_err(|_| anyhow!("VIGIL_JPEG_QUALITY must be an integer"))?;
            for s in &mut self.sources {
                s.jpeg_quality = q;
            }
        }
        if let Ok(ms) = std::env::var("VIGIL_WATCHDOG_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| anyhow!("VIGIL_WATCHDOG_MS must be an integer number of ms"))?;
            let wd = (ms > 0).then(|| Duration::from_millis(ms));
            for s in &mut self.sources {
                s.watchdog = wd;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for s in &self.sources {
            if !ids.insert(s.id.as_str()) {
                bail!("duplicate source id {:?}", s.id);
            }
            if !(1..=100).contains(&s.jpeg_quality) {
                bail!("source {}: jpeg quality {} outside 1..=100", s.id, s.jpeg_quality);
            }
            if s.width.is_some() != s.height.is_some() {
                bail!("source {}: width and height go together", s.id);
            }
            for bg in s.chroma_backgrounds() {
                if bg == s.id {
                    bail!("source {}: chroma key background is the source itself", s.id);
                }
                if !self.sources.iter().any(|other| other.id == bg) {
                    bail!("source {}: chroma key background {bg:?} does not exist", s.id);
                }
            }
        }

        let mut target_ids = HashSet::new();
        for t in &self.targets {
            if !target_ids.insert(t.id.as_str()) {
                bail!("duplicate target id {:?}", t.id);
            }
            if !self.sources.iter().any(|s| s.id == t.source) {
                bail!("target {}: source {:?} does not exist", t.id, t.source);
            }
            if t.interval.is_zero() {
                bail!("target {}: interval must be greater than zero", t.id);
            }
        }
        Ok(())
    }

    /// Construct every source and target. Sources referenced as chroma key
    /// backgrounds are built before their dependents; circular references
    /// are an error.
    pub fn build(&self) -> Result<Pipeline> {
        let mut sources: Vec<Arc<Source>> = Vec::with_capacity(self.sources.len());
        let mut pending: Vec<&SourceConfig> = self.sources.iter().collect();

        while !pending.is_empty() {
            let mut progressed = false;
            let mut next = Vec::new();

            for sc in pending {
                let deps_ready = sc
                    .chroma_backgrounds()
                    .all(|bg| sources.iter().any(|s| s.id() == bg));
                if deps_ready {
                    sources.push(build_source(sc, &sources)?);
                    progressed = true;
                } else {
                    next.push(sc);
                }
            }

            if !progressed {
                bail!("chroma key backgrounds reference each other in a cycle");
            }
            pending = next;
        }

        let mut targets = Vec::with_capacity(self.targets.len());
        for tc in &self.targets {
            let source = sources
                .iter()
                .find(|s| s.id() == tc.source)
                .with_context(|| format!("target {}: source {:?} missing", tc.id, tc.source))?;
            targets.push(SnapshotTarget::new(
                &tc.id,
                &tc.descr,
                Arc::clone(source),
                tc.dir.clone(),
                tc.interval,
            )?);
        }

        Ok(Pipeline { sources, targets })
    }
}

/// The built but not yet started object graph.
pub struct Pipeline {
    pub sources: Vec<Arc<Source>>,
    pub targets: Vec<Arc<SnapshotTarget>>,
}

impl Pipeline {
    pub fn source(&self, id: &str) -> Option<&Arc<Source>> {
        self.sources.iter().find(|s| s.id() == id)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("sources", &self.sources.iter().map(|s| s.id()).collect::<Vec<_>>())
            .field("targets", &self.targets.iter().map(|t| t.id()).collect::<Vec<_>>())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// parsing
// ----------------------------------------------------------------------------

fn parse_source(entry: SourceEntry) -> Result<SourceConfig> {
    let id = entry
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow!("every source needs an id"))?;

    let kind = match entry.kind.as_deref().unwrap_or("synthetic") {
        "synthetic" => SourceKindConfig::Synthetic,
        "pushed" => SourceKindConfig::Pushed,
        "http" => SourceKindConfig::Http {
            url: entry
                .url
                .clone()
                .ok_or_else(|| anyhow!("source {id}: http needs a url"))?,
        },
        "v4l2" => SourceKindConfig::V4l2 {
            device: entry
                .device
                .clone()
                .unwrap_or_else(|| DEFAULT_V4L2_DEVICE.to_string()),
        },
        "rtsp" => SourceKindConfig::Rtsp {
            url: entry
                .url
                .clone()
                .ok_or_else(|| anyhow!("source {id}: rtsp needs a url"))?,
        },
        other => bail!("source {id}: unknown kind {other:?}"),
    };

    let resize = match (entry.resize_width, entry.resize_height) {
        (Some(w), Some(h)) => Some((w, h)),
        (None, None) => None,
        _ => bail!("source {id}: resize_width and resize_height go together"),
    };

    let failure_entry = entry.failure.unwrap_or_default();
    let failure = FailurePolicy {
        mode: match failure_entry.mode.as_deref() {
            Some(mode) => mode
                .parse()
                .with_context(|| format!("source {id}: failure mode"))?,
            None => FailurePolicy::default().mode,
        },
        message: failure_entry
            .message
            .unwrap_or_else(|| FailurePolicy::default().message),
        position: match failure_entry.position.as_deref() {
            Some(pos) => pos
                .parse()
                .with_context(|| format!("source {id}: failure position"))?,
            None => FailurePolicy::default().position,
        },
        bitmap: failure_entry.bitmap,
    };

    let exec_failure = failure_entry.exec.map(|command| FailureHook {
        command,
        cooldown: Duration::from_secs(
            failure_entry.exec_cooldown_s.unwrap_or(DEFAULT_EXEC_COOLDOWN_S),
        ),
    });

    let mut filters = Vec::new();
    for f in entry.filters.unwrap_or_default() {
        filters.push(parse_filter(&id, f)?);
    }

    Ok(SourceConfig {
        descr: entry.descr.unwrap_or_default(),
        kind,
        width: entry.width,
        height: entry.height,
        max_fps: entry.max_fps.unwrap_or(DEFAULT_MAX_FPS),
        timeout: Duration::from_millis(entry.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)),
        resize,
        keep_aspect: entry.keep_aspect.unwrap_or(false),
        jpeg_quality: entry.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
        on_demand: entry.on_demand.unwrap_or(false),
        watchdog: entry.watchdog_ms.filter(|ms| *ms > 0).map(Duration::from_millis),
        failure,
        exec_failure,
        software_controls: entry.software_controls.unwrap_or(false),
        filters,
        id,
    })
}

fn parse_filter(owner: &str, entry: FilterEntry) -> Result<FilterConfig> {
    Ok(match entry.kind.as_deref().unwrap_or_default() {
        "text" => FilterConfig::Text {
            text: entry
                .text
                .ok_or_else(|| anyhow!("source {owner}: text filter needs text"))?,
            position: entry
                .position
                .as_deref()
                .unwrap_or(DEFAULT_TEXT_POSITION)
                .parse()
                .with_context(|| format!("source {owner}: text position"))?,
        },
        "mirror-h" => FilterConfig::MirrorH,
        "mirror-v" => FilterConfig::MirrorV,
        "grayscale" => FilterConfig::Grayscale {
            mode: entry
                .mode
                .as_deref()
                .unwrap_or("cie1931")
                .parse()
                .with_context(|| format!("source {owner}: grayscale mode"))?,
        },
        "average" => FilterConfig::Average {
            depth: entry.depth.unwrap_or(3),
        },
        "motion-marker" => FilterConfig::MotionMarker {
            threshold: entry.threshold.unwrap_or(12),
        },
        "chromakey" => FilterConfig::ChromaKey {
            background: entry
                .background
                .ok_or_else(|| anyhow!("source {owner}: chroma key needs a background source"))?,
        },
        other => bail!("source {owner}: unknown filter kind {other:?}"),
    })
}

fn parse_target(entry: TargetEntry) -> Result<TargetConfig> {
    let id = entry
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow!("every target needs an id"))?;

    Ok(TargetConfig {
        descr: entry.descr.unwrap_or_default(),
        source: entry
            .source
            .ok_or_else(|| anyhow!("target {id}: needs a source"))?,
        dir: entry.dir.ok_or_else(|| anyhow!("target {id}: needs a dir"))?,
        interval: Duration::from_millis(
            entry.interval_ms.unwrap_or(DEFAULT_SNAPSHOT_INTERVAL_MS),
        ),
        id,
    })
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {e}", path.display()))
}

// ----------------------------------------------------------------------------
// building
// ----------------------------------------------------------------------------

fn build_source(sc: &SourceConfig, built: &[Arc<Source>]) -> Result<Arc<Source>> {
    let kind = match &sc.kind {
        SourceKindConfig::Synthetic => SourceKind::Synthetic,
        SourceKindConfig::Pushed => SourceKind::Pushed,
        SourceKindConfig::Http { url } => {
            #[cfg(feature = "source-http")]
            {
                SourceKind::Http { url: url.clone() }
            }
            #[cfg(not(feature = "source-http"))]
            {
                let _ = url;
                bail!("source {}: http support not built in", sc.id)
            }
        }
        SourceKindConfig::V4l2 { device } => {
            #[cfg(feature = "source-v4l2")]
            {
                SourceKind::V4l2 { device: device.clone() }
            }
            #[cfg(not(feature = "source-v4l2"))]
            {
                let _ = device;
                bail!("source {}: v4l2 support not built in", sc.id)
            }
        }
        SourceKindConfig::Rtsp { url } => {
            #[cfg(feature = "source-rtsp")]
            {
                SourceKind::Rtsp { url: url.clone() }
            }
            #[cfg(not(feature = "source-rtsp"))]
            {
                let _ = url;
                bail!("source {}: rtsp support not built in", sc.id)
            }
        }
    };

    let mut filters: Vec<Box<dyn Filter>> = Vec::with_capacity(sc.filters.len());
    for fc in &sc.filters {
        filters.push(build_filter(&sc.id, fc, built)?);
    }

    let controls = sc
        .software_controls
        .then(|| Arc::new(SoftwareControls::default()) as Arc<dyn Controls>);

    Source::new(SourceSettings {
        id: sc.id.clone(),
        descr: sc.descr.clone(),
        kind,
        width: sc.width,
        height: sc.height,
        max_fps: sc.max_fps,
        timeout: sc.timeout,
        resize: sc.resize,
        keep_aspect: sc.keep_aspect,
        jpeg_quality: sc.jpeg_quality,
        failure: sc.failure.clone(),
        filters,
        controls,
        on_demand: sc.on_demand,
        exec_failure: sc.exec_failure.clone(),
    })
}

fn build_filter(owner: &str, fc: &FilterConfig, built: &[Arc<Source>]) -> Result<Box<dyn Filter>> {
    Ok(match fc {
        FilterConfig::Text { text, position } => Box::new(AddText::new(text.clone(), *position)),
        FilterConfig::MirrorH => Box::new(MirrorH),
        FilterConfig::MirrorV => Box::new(MirrorV),
        FilterConfig::Grayscale { mode } => Box::new(Grayscale::new(*mode)),
        FilterConfig::Average { depth } => Box::new(Average::new(*depth)),
        FilterConfig::MotionMarker { threshold } => Box::new(MotionMarker::new(*threshold)),
        FilterConfig::ChromaKey { background } => {
            let bg = built
                .iter()
                .find(|s| s.id() == background.as_str())
                .with_context(|| {
                    format!("source {owner}: chroma key background {background:?} not built")
                })?;
            Box::new(ChromaKey::new(Arc::clone(bg)))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FailureMode;

    fn parse(json: &str) -> Result<VigilConfig> {
        let file: ConfigFile = serde_json::from_str(json).expect("json");
        let cfg = VigilConfig::from_file(file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[test]
    fn empty_config_yields_demo_source() {
        let cfg = parse("{}").expect("config");
        assert_eq!(cfg.sources.len(), 1);
        assert_eq!(cfg.sources[0].id, "demo");
        assert_eq!(cfg.sources[0].kind, SourceKindConfig::Synthetic);
        assert_eq!(cfg.sources[0].width, Some(640));
        assert!(cfg.targets.is_empty());
    }

    #[test]
    fn full_source_round_trips() {
        let cfg = parse(
            r#"{
                "sources": [{
                    "id": "front",
                    "descr": "front door",
                    "kind": "pushed",
                    "width": 1280, "height": 720,
                    "max_fps": 5.0,
                    "timeout_ms": 1500,
                    "resize_width": 640, "resize_height": 360,
                    "keep_aspect": true,
                    "jpeg_quality": 70,
                    "on_demand": true,
                    "watchdog_ms": 10000,
                    "software_controls": true,
                    "failure": {
                        "mode": "simple",
                        "message": "offline",
                        "position": "upper-right",
                        "exec": "/usr/local/bin/notify",
                        "exec_cooldown_s": 120
                    },
                    "filters": [
                        {"kind": "text", "text": "$id$ %H:%M:%S"},
                        {"kind": "grayscale", "mode": "pal"},
                        {"kind": "average", "depth": 4},
                        {"kind": "mirror-h"}
                    ]
                }],
                "targets": [{
                    "id": "snap",
                    "source": "front",
                    "dir": "/tmp/vigil-snaps",
                    "interval_ms": 2000
                }]
            }"#,
        )
        .expect("config");

        let s = &cfg.sources[0];
        assert_eq!(s.timeout, Duration::from_millis(1500));
        assert_eq!(s.resize, Some((640, 360)));
        assert!(s.keep_aspect);
        assert_eq!(s.jpeg_quality, 70);
        assert!(s.on_demand);
        assert_eq!(s.watchdog, Some(Duration::from_secs(10)));
        assert!(s.software_controls);
        assert_eq!(s.failure.mode, FailureMode::Simple);
        assert_eq!(s.failure.position, TextPosition::UpperRight);
        let hook = s.exec_failure.as_ref().expect("hook");
        assert_eq!(hook.cooldown, Duration::from_secs(120));
        assert_eq!(s.filters.len(), 4);
        assert_eq!(s.filters[1], FilterConfig::Grayscale { mode: GrayscaleMode::PalNtsc });

        let t = &cfg.targets[0];
        assert_eq!(t.source, "front");
        assert_eq!(t.interval, Duration::from_secs(2));
    }

    #[test]
    fn duplicate_source_ids_rejected() {
        let err = parse(r#"{"sources": [{"id": "a"}, {"id": "a"}]}"#).unwrap_err();
        assert!(err.to_string().contains("duplicate source id"));
    }

    #[test]
    fn target_must_reference_existing_source() {
        let err = parse(
            r#"{"sources": [{"id": "a"}],
                "targets": [{"id": "t", "source": "ghost", "dir": "/tmp/x"}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn lopsided_dimensions_rejected() {
        let err = parse(r#"{"sources": [{"id": "a", "width": 640}]}"#).unwrap_err();
        assert!(err.to_string().contains("width and height go together"));
    }

    #[test]
    fn unknown_filter_kind_rejected() {
        let err = parse(r#"{"sources": [{"id": "a", "filters": [{"kind": "sharpen"}]}]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unknown filter kind"));
    }

    #[test]
    fn chroma_key_background_must_exist() {
        let err = parse(
            r#"{"sources": [{"id": "a", "filters": [{"kind": "chromakey", "background": "b"}]}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn chroma_key_cycle_detected_at_build() {
        let cfg = parse(
            r#"{"sources": [
                {"id": "a", "kind": "pushed",
                 "filters": [{"kind": "chromakey", "background": "b"}]},
                {"id": "b", "kind": "pushed",
                 "filters": [{"kind": "chromakey", "background": "a"}]}
            ]}"#,
        )
        .expect("config");

        let err = cfg.build().unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn pipeline_debug_lists_component_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = parse(&format!(
            r#"{{"sources": [{{"id": "front", "kind": "pushed"}}],
                "targets": [{{"id": "snap", "source": "front", "dir": {:?}}}]}}"#,
            dir.path().join("snaps")
        ))
        .expect("config");

        let dump = format!("{:?}", cfg.build().expect("pipeline"));
        assert!(dump.contains("front"), "missing source id in {dump}");
        assert!(dump.contains("snap"), "missing target id in {dump}");
    }

    #[test]
    fn builds_pipeline_with_chroma_dependency_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = parse(&format!(
            r#"{{"sources": [
                {{"id": "a", "kind": "pushed",
                  "filters": [{{"kind": "chromakey", "background": "bg"}}]}},
                {{"id": "bg", "kind": "pushed"}}
            ],
            "targets": [{{"id": "t", "source": "a", "dir": {:?}}}]}}"#,
            dir.path().join("snaps")
        ))
        .expect("config");

        let pipeline = cfg.build().expect("pipeline");
        assert_eq!(pipeline.sources.len(), 2);
        // dependency built first despite config order
        assert_eq!(pipeline.sources[0].id(), "bg");
        assert!(pipeline.source("a").is_some());
        assert_eq!(pipeline.targets.len(), 1);
    }
}
