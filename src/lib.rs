//! EcoSort core
//!
//! This crate implements the sorting core for a waste-classification service.
//! An external object-detection model (a black box behind
//! [`detect::DetectorBackend`]) emits detections; everything downstream of the
//! model output lives here:
//!
//! 1. **Class catalog**: immutable mapping from detector class ids to names
//!    and Organic/Inorganic categories, built once at startup.
//! 2. **Sorting decision**: threshold filter over detections, category set
//!    reduction to a single GREEN/RED/MIXED/IDLE signal.
//! 3. **Detection log**: rolling session log with filtering, statistics,
//!    retention pruning and CSV export.
//! 4. **Local API**: loopback HTTP endpoints for classification, log access
//!    and system status.
//!
//! # Module Structure
//!
//! - `catalog`: ClassCatalog and class-name discipline
//! - `decision`: threshold filter + category reducer
//! - `detect`: detector backend trait, registry, stub backend
//! - `storage`: log store trait, SQLite and in-memory stores
//! - `export`: CSV rendering of log entries and statistics
//! - `api`: loopback HTTP server
//! - `config`, `monitor`: daemon configuration and system status

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod api;
pub mod catalog;
pub mod config;
pub mod decision;
pub mod detect;
pub mod export;
pub mod monitor;
pub mod storage;

pub use catalog::{CatalogEntry, ClassCatalog};
pub use decision::{evaluate, reduce, Classification, SortingDecision};
pub use detect::{BackendRegistry, DetectorBackend, StubBackend};
pub use storage::{
    InMemoryLogStore, LogEntry, LogFilter, LogStatistics, LogStore, SqliteLogStore,
};

// -------------------- Categories & Signals --------------------

/// Coarse waste grouping that drives the physical sorting stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(alias = "organic", alias = "ORGANIC")]
    Organic,
    #[serde(alias = "inorganic", alias = "INORGANIC")]
    Inorganic,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Organic => "Organic",
            Category::Inorganic => "Inorganic",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "organic" => Ok(Category::Organic),
            "inorganic" => Ok(Category::Inorganic),
            other => Err(anyhow::anyhow!(
                "unknown category '{}' (expected organic or inorganic)",
                other
            )),
        }
    }
}

/// Aggregate signal over one batch of detections.
///
/// Computed fresh per call; the reducer carries no state between invocations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortingSignal {
    /// Every detected item is inorganic.
    Green,
    /// Every detected item is organic.
    Red,
    /// Both categories present.
    Mixed,
    /// No detection at or above the threshold.
    Idle,
}

impl SortingSignal {
    /// The downstream routing paired with each signal.
    pub fn route(&self) -> StreamRoute {
        match self {
            SortingSignal::Green => StreamRoute::InorganicStream,
            SortingSignal::Red => StreamRoute::OrganicStream,
            SortingSignal::Mixed => StreamRoute::SeparateStreams,
            SortingSignal::Idle => StreamRoute::NoDetection,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamRoute {
    InorganicStream,
    OrganicStream,
    SeparateStreams,
    NoDetection,
}

// -------------------- Detections --------------------

/// Pixel-space box with x1 <= x2 and y1 <= y2.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Result<Self, SortError> {
        let bbox = Self { x1, y1, x2, y2 };
        bbox.validate()?;
        Ok(bbox)
    }

    /// Corner ordering check. NaN coordinates fail the comparison and are
    /// rejected along with inverted boxes.
    pub fn validate(&self) -> Result<(), SortError> {
        if !(self.x1 <= self.x2 && self.y1 <= self.y2) {
            return Err(SortError::InvalidBoundingBox {
                x1: self.x1,
                y1: self.y1,
                x2: self.x2,
                y2: self.y2,
            });
        }
        Ok(())
    }
}

/// Raw model output: one recognized object instance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// A detection that passed the threshold and resolved against the catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedDetection {
    pub class_id: u32,
    pub class_name: String,
    pub category: Category,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

// -------------------- Error Taxonomy --------------------

/// Core errors. Configuration errors mean the detector's output space and
/// the catalog disagree and must be fixed in configuration, never retried;
/// input errors mean the caller sent a malformed request.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum SortError {
    #[error("class id {0} has no catalog entry; detector output space and catalog disagree")]
    UnknownClass(u32),
    #[error("confidence threshold {0} is outside [0, 1]")]
    InvalidThreshold(f32),
    #[error("bounding box ({x1}, {y1})..({x2}, {y2}) is inverted")]
    InvalidBoundingBox { x1: f32, y1: f32, x2: f32, y2: f32 },
    #[error("class catalog must not be empty")]
    EmptyCatalog,
    #[error("duplicate catalog entry for class id {0}")]
    DuplicateClass(u32),
    #[error("class name {0:?} must match ^[a-z0-9_]{{1,64}}$")]
    InvalidClassName(String),
}

impl SortError {
    /// True when the error is a catalog/detector mismatch rather than bad
    /// caller input. Drives the HTTP status split in the API layer.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SortError::UnknownClass(_)
                | SortError::EmptyCatalog
                | SortError::DuplicateClass(_)
                | SortError::InvalidClassName(_)
        )
    }
}

// -------------------- Engine --------------------

/// Owns the immutable catalog, the default threshold and the detection log.
///
/// `classify` is pure and takes `&self`; only logging mutates. Share between
/// threads behind `Arc<Mutex<_>>`.
pub struct Engine {
    catalog: ClassCatalog,
    default_threshold: f32,
    store: Box<dyn LogStore>,
}

impl Engine {
    /// Open an engine backed by the configured SQLite log.
    pub fn open(cfg: &config::SortdConfig) -> Result<Self> {
        let store = Box::new(SqliteLogStore::open(&cfg.db_path)?);
        Ok(Self::with_store(cfg.catalog()?, cfg.threshold, store)?)
    }

    pub fn with_store(
        catalog: ClassCatalog,
        default_threshold: f32,
        store: Box<dyn LogStore>,
    ) -> Result<Self, SortError> {
        decision::validate_threshold(default_threshold)?;
        Ok(Self {
            catalog,
            default_threshold,
            store,
        })
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    pub fn default_threshold(&self) -> f32 {
        self.default_threshold
    }

    pub fn session_id(&self) -> String {
        self.store.session_id().to_string()
    }

    /// Classify one batch of detections. Pure; no log writes.
    pub fn classify(
        &self,
        detections: &[Detection],
        threshold: Option<f32>,
    ) -> Result<Classification, SortError> {
        let threshold = threshold.unwrap_or(self.default_threshold);
        decision::evaluate(&self.catalog, detections, threshold)
    }

    /// Classify and append the surviving detections to the log.
    pub fn classify_and_log(
        &mut self,
        detections: &[Detection],
        threshold: Option<f32>,
    ) -> Result<Classification> {
        let outcome = self.classify(detections, threshold)?;
        if !outcome.detections.is_empty() {
            self.store.append_batch(&outcome.detections)?;
        }
        Ok(outcome)
    }

    pub fn logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>> {
        self.store.query(filter)
    }

    pub fn log_count(&self) -> Result<u64> {
        self.store.count()
    }

    pub fn statistics(&self) -> Result<LogStatistics> {
        self.store.statistics()
    }

    pub fn export_csv(&self) -> Result<String> {
        let entries = self.store.query(&LogFilter::default())?;
        Ok(export::render_csv(&entries))
    }

    /// Clear the log and start a new session. Returns the new session id.
    pub fn clear_logs(&mut self) -> Result<String> {
        self.store.clear()
    }

    /// Drop log entries older than the retention window.
    pub fn prune(&mut self, retention: Duration) -> Result<u64> {
        self.store.prune(retention)
    }
}
