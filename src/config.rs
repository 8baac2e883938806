/*!
 * Configuration support for the KPI pipeline
 *
 * Settings are layered: built-in defaults, then an optional TOML file, then
 * `SNFKPI_`-prefixed environment variables.
 */

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::{ExportFormat, Result, SnfError, kpi::KpiRegistry};

/// Prefix for environment overrides, e.g. `SNFKPI_TRAILING_WINDOW=6`
pub const ENV_PREFIX: &str = "SNFKPI";

/// Runtime configuration for ingestion, KPI computation and storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Whether to show progress bars while reading workbooks
    #[serde(default = "default_enable_progress_bar")]
    pub enable_progress_bar: bool,

    /// Number of threads for KPI recomputation (None = use all available)
    #[serde(default)]
    pub parallel_threads: Option<usize>,

    /// Default export format
    #[serde(default)]
    pub default_export_format: ExportFormat,

    /// SQLite fact store location
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Largest accepted workbook, in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Relative slope under which a trend is reported as stable
    #[serde(default = "default_trend_threshold")]
    pub trend_threshold: f64,

    /// Months in the trailing window used by trend queries
    #[serde(default = "default_trailing_window")]
    pub trailing_window: usize,

    /// Replace a period's rows inside a single transaction
    #[serde(default = "default_true")]
    pub transactional_replace: bool,

    /// Skip malformed facility sheets instead of failing the workbook
    #[serde(default = "default_true")]
    pub skip_invalid_sheets: bool,

    /// Optional TOML file replacing the standard KPI registry
    #[serde(default)]
    pub registry_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enable_progress_bar: default_enable_progress_bar(),
            parallel_threads: None,
            default_export_format: ExportFormat::Json,
            database_path: None,
            max_upload_bytes: default_max_upload_bytes(),
            trend_threshold: default_trend_threshold(),
            trailing_window: default_trailing_window(),
            transactional_replace: true,
            skip_invalid_sheets: true,
            registry_path: None,
        }
    }
}

// Default value functions for serde
fn default_enable_progress_bar() -> bool {
    true
}

fn default_max_upload_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_trend_threshold() -> f64 {
    crate::statistics::DEFAULT_TREND_THRESHOLD
}

fn default_trailing_window() -> usize {
    12
}

fn default_true() -> bool {
    true
}

fn config_error(context: &str, err: impl std::fmt::Display) -> SnfError {
    SnfError::Configuration {
        message: format!("{}: {}", context, err),
        suggestion: Some(format!(
            "Check the TOML file and any {}_* environment variables",
            ENV_PREFIX
        )),
    }
}

impl PipelineConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `SNFKPI_*` environment variables
    ///
    /// Supported variables mirror the field names, for example
    /// `SNFKPI_ENABLE_PROGRESS_BAR`, `SNFKPI_PARALLEL_THREADS`,
    /// `SNFKPI_DATABASE_PATH`, `SNFKPI_MAX_UPLOAD_BYTES`,
    /// `SNFKPI_TREND_THRESHOLD` and `SNFKPI_TRAILING_WINDOW`.
    pub fn from_env() -> Result<Self> {
        Self::layered(None)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SnfError::file_not_found_with_suggestion(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| SnfError::Configuration {
                message: format!("Failed to parse config file: {}", e),
                suggestion: Some("Check that the file is valid TOML format".to_string()),
            })
    }

    /// Defaults, then `file` (when given and present), then the environment
    pub fn layered(file: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default())
            .map_err(|e| config_error("Failed to seed defaults", e))?;
        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(false));
        }
        builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| config_error("Failed to read configuration", e))?
            .try_deserialize()
            .map_err(|e| config_error("Failed to deserialize configuration", e))
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| SnfError::Configuration {
                message: format!("Failed to serialize config: {}", e),
                suggestion: None,
            })?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/snfkpi/config.toml` on Unix-like systems
    /// or `%APPDATA%\snfkpi\config.toml` on Windows
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "snfkpi")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Default location for the fact store when none is configured
    pub fn default_database_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "snfkpi")
            .map(|dirs| dirs.data_dir().join("facts.sqlite"))
            .unwrap_or_else(|| PathBuf::from("snfkpi.sqlite"))
    }

    /// Load from the default file location and environment
    ///
    /// Falls back to defaults when the layered sources cannot be read.
    pub fn load() -> Self {
        let path = Self::default_config_path();
        match Self::layered(path.as_deref()) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{}; using default configuration", e);
                Self::default()
            }
        }
    }

    /// Configured database path, or the platform default
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(Self::default_database_path)
    }

    /// The KPI registry this configuration selects
    pub fn load_registry(&self) -> Result<KpiRegistry> {
        match &self.registry_path {
            Some(path) => {
                if !path.exists() {
                    return Err(SnfError::file_not_found_with_suggestion(path.clone()));
                }
                KpiRegistry::from_toml_str(&std::fs::read_to_string(path)?)
            }
            None => Ok(KpiRegistry::standard()),
        }
    }

    /// Create a configuration optimized for throughput
    pub fn performance() -> Self {
        Self {
            enable_progress_bar: false,
            parallel_threads: None, // Use all available
            transactional_replace: true,
            skip_invalid_sheets: true,
            ..Self::default()
        }
    }

    /// Create a configuration that fails loudly and runs single-threaded
    pub fn safe() -> Self {
        Self {
            enable_progress_bar: true,
            parallel_threads: Some(1),
            transactional_replace: true,
            skip_invalid_sheets: false,
            max_upload_bytes: 10 * 1024 * 1024,
            ..Self::default()
        }
    }
}

// Global configuration support
use std::sync::RwLock;

lazy_static::lazy_static! {
    static ref GLOBAL_CONFIG: RwLock<Option<PipelineConfig>> = RwLock::new(None);
}

/// Set the global configuration
pub fn set_global_config(config: PipelineConfig) {
    *GLOBAL_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = Some(config);
}

/// Get the global configuration (or the loaded default if not set)
pub fn global_config() -> PipelineConfig {
    GLOBAL_CONFIG.read()
        .unwrap_or_else(|e| e.into_inner())
        .as_ref()
        .cloned()
        .unwrap_or_else(PipelineConfig::load)
}

/// Clear the global configuration
pub fn clear_global_config() {
    *GLOBAL_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = None;
}

/// Builder for customizing configuration
#[derive(Default)]
pub struct ConfigBuilder {
    config: PipelineConfig,
}

impl ConfigBuilder {
    /// Start building a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set progress bar enabled
    pub fn progress_bar(mut self, enabled: bool) -> Self {
        self.config.enable_progress_bar = enabled;
        self
    }

    /// Set number of parallel threads
    pub fn parallel_threads(mut self, threads: Option<usize>) -> Self {
        self.config.parallel_threads = threads;
        self
    }

    pub fn export_format(mut self, format: ExportFormat) -> Self {
        self.config.default_export_format = format;
        self
    }

    pub fn database_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.database_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the workbook size cap
    pub fn max_upload_bytes(mut self, limit: u64) -> Self {
        self.config.max_upload_bytes = limit;
        self
    }

    pub fn trend_threshold(mut self, threshold: f64) -> Self {
        self.config.trend_threshold = threshold;
        self
    }

    pub fn trailing_window(mut self, months: usize) -> Self {
        self.config.trailing_window = months;
        self
    }

    pub fn transactional_replace(mut self, enabled: bool) -> Self {
        self.config.transactional_replace = enabled;
        self
    }

    pub fn skip_invalid_sheets(mut self, skip: bool) -> Self {
        self.config.skip_invalid_sheets = skip;
        self
    }

    pub fn registry_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.registry_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Build the configuration
    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PipelineConfig::default();
        assert!(config.enable_progress_bar);
        assert!(config.transactional_replace);
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(config.trailing_window, 12);
        assert_eq!(config.trend_threshold, 0.01);
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .progress_bar(false)
            .parallel_threads(Some(4))
            .trailing_window(6)
            .skip_invalid_sheets(false)
            .export_format(ExportFormat::Csv)
            .build();

        assert!(!config.enable_progress_bar);
        assert_eq!(config.parallel_threads, Some(4));
        assert_eq!(config.trailing_window, 6);
        assert!(!config.skip_invalid_sheets);
        assert_eq!(config.default_export_format, ExportFormat::Csv);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = ConfigBuilder::new()
            .trend_threshold(0.05)
            .database_path("/tmp/facts.sqlite")
            .build();
        config.save(&path).unwrap();

        assert_eq!(PipelineConfig::from_file(&path).unwrap(), config);
        assert!(PipelineConfig::from_file(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "trailing_window = 3\n").unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.trailing_window, 3);
        assert!(config.transactional_replace);
    }

    #[test]
    fn test_registry_selection() {
        let config = PipelineConfig::default();
        assert_eq!(config.load_registry().unwrap().len(), 20);

        let missing = ConfigBuilder::new().registry_path("/nonexistent/kpis.toml").build();
        assert!(missing.load_registry().is_err());
    }
}
