use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::catalog::{CatalogEntry, ClassCatalog};
use crate::{decision, Category, SortError};

const DEFAULT_DB_PATH: &str = "ecosort.db";
const DEFAULT_API_ADDR: &str = "127.0.0.1:8960";
const DEFAULT_THRESHOLD: f32 = 0.75;
const DEFAULT_RETENTION_SECS: u64 = 60 * 60 * 24 * 7;
const DEFAULT_SIMULATE_FPS: u32 = 5;

#[derive(Debug, Deserialize, Default)]
struct SortdConfigFile {
    db_path: Option<String>,
    threshold: Option<f32>,
    api: Option<ApiConfigFile>,
    retention: Option<RetentionConfigFile>,
    simulate: Option<SimulateConfigFile>,
    classes: Option<Vec<ClassConfigFile>>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RetentionConfigFile {
    seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SimulateConfigFile {
    enabled: Option<bool>,
    fps: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ClassConfigFile {
    id: u32,
    name: String,
    category: Category,
}

/// Daemon configuration.
///
/// The catalog and the default threshold are externally supplied data, not
/// architectural constants: the values below are the observed sample
/// deployment, and a config file or environment override replaces them.
#[derive(Debug, Clone)]
pub struct SortdConfig {
    pub db_path: String,
    pub api_addr: String,
    pub threshold: f32,
    pub retention: Duration,
    pub simulate: SimulateSettings,
    pub classes: Vec<CatalogEntry>,
}

#[derive(Debug, Clone)]
pub struct SimulateSettings {
    pub enabled: bool,
    pub fps: u32,
}

impl SortdConfig {
    /// Load from the file named by `SORTD_CONFIG` (TOML, optional), then
    /// apply environment overrides, then validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SORTD_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// The observed six-class waste catalog.
    pub fn default_classes() -> Vec<CatalogEntry> {
        let classes = [
            (0, "bag", Category::Inorganic),
            (1, "banana_peel", Category::Organic),
            (2, "bottle", Category::Inorganic),
            (3, "can", Category::Inorganic),
            (4, "eggshell", Category::Organic),
            (5, "leaves", Category::Organic),
        ];
        classes
            .into_iter()
            .map(|(class_id, class_name, category)| CatalogEntry {
                class_id,
                class_name: class_name.to_string(),
                category,
            })
            .collect()
    }

    /// Build the validated, immutable catalog from the configured classes.
    pub fn catalog(&self) -> Result<ClassCatalog, SortError> {
        ClassCatalog::new(self.classes.clone())
    }

    fn from_file(file: SortdConfigFile) -> Result<Self> {
        let db_path = file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let threshold = file.threshold.unwrap_or(DEFAULT_THRESHOLD);
        let api_addr = file
            .api
            .and_then(|api| api.addr)
            .unwrap_or_else(|| DEFAULT_API_ADDR.to_string());
        let retention = Duration::from_secs(
            file.retention
                .and_then(|retention| retention.seconds)
                .unwrap_or(DEFAULT_RETENTION_SECS),
        );
        let simulate = SimulateSettings {
            enabled: file
                .simulate
                .as_ref()
                .and_then(|simulate| simulate.enabled)
                .unwrap_or(false),
            fps: file
                .simulate
                .and_then(|simulate| simulate.fps)
                .unwrap_or(DEFAULT_SIMULATE_FPS),
        };
        let classes = match file.classes {
            Some(classes) => classes
                .into_iter()
                .map(|class| CatalogEntry {
                    class_id: class.id,
                    class_name: class.name,
                    category: class.category,
                })
                .collect(),
            None => Self::default_classes(),
        };
        Ok(Self {
            db_path,
            api_addr,
            threshold,
            retention,
            simulate,
            classes,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("SORTD_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(addr) = std::env::var("SORTD_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(threshold) = std::env::var("SORTD_THRESHOLD") {
            let value: f32 = threshold
                .parse()
                .map_err(|_| anyhow!("SORTD_THRESHOLD must be a number in [0, 1]"))?;
            self.threshold = value;
        }
        if let Ok(retention) = std::env::var("SORTD_RETENTION_SECS") {
            let seconds: u64 = retention.parse().map_err(|_| {
                anyhow!("SORTD_RETENTION_SECS must be an integer number of seconds")
            })?;
            self.retention = Duration::from_secs(seconds);
        }
        if let Ok(simulate) = std::env::var("SORTD_SIMULATE") {
            self.simulate.enabled = matches!(simulate.trim(), "1" | "true" | "yes");
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        decision::validate_threshold(self.threshold)?;

        // Catalog construction runs the full class discipline (names, ids).
        self.catalog()?;

        if self.retention.as_secs() == 0 {
            return Err(anyhow!("retention must be greater than zero"));
        }
        if self.simulate.fps == 0 {
            return Err(anyhow!("simulate fps must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SortdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
