use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::source::DEFAULT_ENDPOINT;
use crate::timeline::{SpacingRules, UnknownDatePlacement};
use crate::viewport::ViewportConfig;

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "GoalTimeline";
const APP_NAME: &str = "goaltl";

pub const CONFIG_ENV: &str = "GOALTL_CONFIG";
pub const STATE_ENV: &str = "GOALTL_STATE";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            default_cfg.post_load();
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load();
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub state_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let override_state = env::var(STATE_ENV).ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let state_dir = override_state.unwrap_or_else(|| {
            project_dirs
                .state_dir()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| project_dirs.data_local_dir().join("state"))
        });

        Ok(Self::resolve(
            override_config,
            project_dirs.config_dir().to_path_buf(),
            state_dir,
        ))
    }

    /// Applies an optional config override to the default config dir. An
    /// override that looks like a file is used as-is, otherwise it names the
    /// directory holding `config.toml`.
    fn resolve(override_config: Option<PathBuf>, default_dir: PathBuf, state_dir: PathBuf) -> Self {
        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or(default_dir);

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let log_dir = state_dir.join("logs");
        Self {
            config_dir,
            config_file,
            state_dir,
            log_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.state_dir, &self.log_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join("goaltl.log")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub timeline: TimelineOptions,
    pub spacing: SpacingRules,
    pub viewport: ViewportConfig,
    pub ui: UiOptions,
}

impl AppConfig {
    fn post_load(&mut self) {
        let viewport = &mut self.viewport;
        if !(viewport.threshold > 0.0 && viewport.threshold <= 1.0) {
            tracing::warn!(
                threshold = viewport.threshold,
                "viewport threshold outside (0, 1], using 0.5"
            );
            viewport.threshold = ViewportConfig::default().threshold;
        }

        let spacing = &mut self.spacing;
        if !spacing.floor.is_finite() || spacing.floor < 0.0 {
            tracing::warn!(floor = spacing.floor, "negative spacing floor, using 0");
            spacing.floor = 0.0;
        }
        if !spacing.scale_per_day.is_finite() || spacing.scale_per_day < 0.0 {
            tracing::warn!(
                scale = spacing.scale_per_day,
                "negative spacing scale, using default"
            );
            spacing.scale_per_day = SpacingRules::default().scale_per_day;
        }
        if !(spacing.units_per_row.is_finite() && spacing.units_per_row > 0.0) {
            tracing::warn!(
                units_per_row = spacing.units_per_row,
                "units_per_row must be positive, using default"
            );
            spacing.units_per_row = SpacingRules::default().units_per_row;
        }

        if self.ui.tick_rate_ms < MIN_TICK_RATE_MS {
            tracing::warn!(
                tick_rate_ms = self.ui.tick_rate_ms,
                "tick rate too small, clamping to {MIN_TICK_RATE_MS}ms"
            );
            self.ui.tick_rate_ms = MIN_TICK_RATE_MS;
        }
        if self.source.timeout_secs == 0 {
            tracing::warn!("source timeout of 0s, using default");
            self.source.timeout_secs = SourceConfig::default().timeout_secs;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    #[default]
    Graphql,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub endpoint: String,
    /// Goals document used when `kind = "file"`; `-` reads stdin.
    pub file: Option<PathBuf>,
    pub default_user: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Graphql,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            file: None,
            default_user: None,
            timeout_secs: 30,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineOptions {
    pub unknown_dates: UnknownDatePlacement,
    /// Initial state of the spacing toggle.
    pub spacing_enabled: bool,
}

impl Default for TimelineOptions {
    fn default() -> Self {
        Self {
            unknown_dates: UnknownDatePlacement::Epoch,
            spacing_enabled: true,
        }
    }
}

const MIN_TICK_RATE_MS: u64 = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiOptions {
    pub tick_rate_ms: u64,
}

impl Default for UiOptions {
    fn default() -> Self {
        Self { tick_rate_ms: 100 }
    }
}

impl UiOptions {
    pub fn tick_rate(&self) -> Duration {
        Duration::from_millis(self.tick_rate_ms)
    }
}
