use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding the uploaded PDFs.
    pub library_dir: Option<PathBuf>,
    /// Where "save a copy" writes documents from the reader.
    pub download_dir: Option<PathBuf>,
    pub zoom: ZoomConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ZoomConfig {
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub step: f32,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            min: 0.5,
            max: 5.0,
            default: 1.0,
            step: 0.1,
        }
    }
}

impl ZoomConfig {
    pub fn contains(&self, zoom: f32) -> bool {
        zoom.is_finite() && zoom >= self.min && zoom <= self.max
    }

    pub fn clamp(&self, zoom: f32) -> f32 {
        if zoom.is_finite() {
            zoom.clamp(self.min, self.max)
        } else {
            self.default
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Rendered pages kept per open document.
    pub render_pages: usize,
    /// Documents tracked by the bookmark/annotation registries; 0 is unbounded.
    pub registry_documents: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            render_pages: 10,
            registry_documents: 0,
        }
    }
}

impl CacheConfig {
    pub fn registry_capacity(&self) -> Option<usize> {
        (self.registry_documents > 0).then_some(self.registry_documents)
    }
}

impl Config {
    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("failed to decode config file {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_default(dirs: &ProjectDirs) -> Result<Self> {
        Self::load(&dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    pub fn validate(&self) -> Result<()> {
        let zoom = &self.zoom;
        if !(zoom.min.is_finite() && zoom.max.is_finite() && zoom.step.is_finite()) {
            bail!("zoom settings must be finite numbers");
        }
        if zoom.min <= 0.0 {
            bail!("zoom.min must be positive (got {})", zoom.min);
        }
        if zoom.min > zoom.max {
            bail!("zoom.min ({}) exceeds zoom.max ({})", zoom.min, zoom.max);
        }
        if !zoom.contains(zoom.default) {
            bail!(
                "zoom.default ({}) must lie within {}..={}",
                zoom.default,
                zoom.min,
                zoom.max
            );
        }
        if zoom.step <= 0.0 {
            bail!("zoom.step must be positive (got {})", zoom.step);
        }
        Ok(())
    }

    pub fn library_dir(&self, dirs: &ProjectDirs) -> PathBuf {
        self.library_dir
            .clone()
            .unwrap_or_else(|| dirs.data_local_dir().join("books"))
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(|| {
                UserDirs::new().and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
            })
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
