use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use aeolus_mesh::{LoadOptions, UpAxis};
use aeolus_raster::{DEFAULT_WINDOW, RasterSettings};
use aeolus_runtime::{
    DesignOption, FailurePolicy, RetryPolicy, RunSettings, ScoreOrder, WindRose, default_workers,
};
use serde::Deserialize;
use thiserror::Error;

/// Environment variable read when `[analysis] token` is not set.
pub const TOKEN_ENV: &str = "AEOLUS_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct AeolusConfig {
    #[serde(default)]
    pub raster: RasterSettings,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    pub run: RunConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default = "default_options")]
    pub options: Vec<DesignOption>,
}

fn default_options() -> Vec<DesignOption> {
    vec![DesignOption::default()]
}

#[derive(Clone, Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Project the analysis is billed against, sent as `authcontext`.
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub wind_rose: WindRose,
}

fn default_window() -> usize {
    DEFAULT_WINDOW
}
fn default_timeout_secs() -> u64 {
    60
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            endpoint: None,
            project: None,
            token: None,
            timeout_secs: default_timeout_secs(),
            retry: RetryConfig::default(),
            wind_rose: WindRose::default(),
        }
    }
}

impl AnalysisConfig {
    /// Configured token, else the `AEOLUS_TOKEN` environment variable.
    pub fn token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| env::var(TOKEN_ENV).ok())
            .filter(|t| !t.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RunConfig {
    /// Defaults to the available cores, at most 4.
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    pub rank_order: ScoreOrder,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub empty_score: f64,
}

fn default_top_n() -> usize {
    5
}

#[derive(Clone, Debug, Deserialize)]
pub struct AssetsConfig {
    #[serde(default = "default_terrain")]
    pub terrain: PathBuf,
    #[serde(default = "default_surroundings")]
    pub surroundings: PathBuf,
    #[serde(default)]
    pub up_axis: UpAxis,
}

fn default_terrain() -> PathBuf {
    PathBuf::from("terrain.glb")
}
fn default_surroundings() -> PathBuf {
    PathBuf::from("surroundings.glb")
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            terrain: default_terrain(),
            surroundings: default_surroundings(),
            up_axis: UpAxis::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

impl AeolusConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cell = self.raster.cell_size;
        if !(cell.is_finite() && cell > 0.0) {
            return Err(invalid(format!("raster.cell_size must be positive, got {cell}")));
        }
        if self.analysis.window == 0 {
            return Err(invalid("analysis.window must be at least 1"));
        }
        if self.analysis.retry.max_attempts == 0 {
            return Err(invalid("analysis.retry.max_attempts must be at least 1"));
        }
        if self.run.workers == Some(0) {
            return Err(invalid("run.workers must be at least 1"));
        }
        if self.options.is_empty() {
            return Err(invalid("at least one [[options]] row is required"));
        }
        Ok(())
    }

    pub fn run_settings(&self) -> RunSettings {
        let mut s = RunSettings::new(self.run.rank_order);
        s.raster = self.raster;
        s.load = LoadOptions {
            up_axis: self.assets.up_axis,
        };
        s.window = self.analysis.window;
        s.workers = self.run.workers.unwrap_or_else(default_workers);
        s.top_n = self.run.top_n;
        s.failure_policy = self.run.failure_policy;
        s.empty_score = self.run.empty_score;
        s.wind_rose = self.analysis.wind_rose.clone();
        s.retry = self.analysis.retry.policy();
        s
    }

    // Relative paths are taken from the directory holding the config file.
    fn resolve_paths(&mut self, base: &Path) {
        for p in [
            &mut self.assets.terrain,
            &mut self.assets.surroundings,
            &mut self.output.dir,
        ] {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

pub fn parse_config(text: &str, origin: &Path) -> Result<AeolusConfig, ConfigError> {
    let cfg: AeolusConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
        path: origin.to_path_buf(),
        source,
    })?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn load_config(path: &Path) -> Result<AeolusConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cfg = parse_config(&text, path)?;
    if let Some(base) = path.parent() {
        cfg.resolve_paths(base);
    }
    log::info!(
        "loaded {}: {} options, window {}, cell size {}",
        path.display(),
        cfg.options.len(),
        cfg.analysis.window,
        cfg.raster.cell_size
    );
    Ok(cfg)
}
