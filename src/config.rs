//! Configuration management.
//!
//! Loads the three process-local options from the External Interfaces'
//! Configuration surface table (`cache_memory_budget`, `per_frame_upload_budget`,
//! `worker_count`) plus the mipmap resample filter choice, from an INI file.
//! Follows the teacher's own `Config::load_or_create` idiom verbatim: try the
//! executable's directory first, fall back to the platform config directory,
//! default and continue on any parse failure rather than refuse to start.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use tracing::{info, warn};

use crate::error::StreamerError;
use crate::mipmap::ResampleFilter;
use crate::worker_pool::default_worker_count;

/// Everything a `StreamerController` needs at construction time.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamerConfig {
    /// Ceiling for cumulative resident mipmap bytes across all textures.
    pub cache_memory_budget: u64,
    /// Wall-time cap on Step E's result-draining loop.
    pub per_frame_upload_budget: Duration,
    /// Size of the worker pool.
    pub worker_count: usize,
    /// Downsample filter used by the Mipmap Pyramid Generator.
    pub resample_filter: ResampleFilter,
    config_path: PathBuf,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            cache_memory_budget: 512 * 1024 * 1024,
            per_frame_upload_budget: Duration::from_millis(5),
            worker_count: default_worker_count(),
            resample_filter: ResampleFilter::Bilinear,
            config_path: default_config_path(),
        }
    }
}

impl StreamerConfig {
    /// Load from the default config path, creating it with defaults if
    /// absent; any parse failure is logged and defaults are used for the
    /// affected fields rather than refusing to start.
    pub fn load_or_create() -> Self {
        let config_path = default_config_path();

        if config_path.exists() {
            match Self::load_from_file(&config_path) {
                Ok(config) => {
                    info!(path = %config_path.display(), "configuration loaded");
                    return config;
                }
                Err(error) => {
                    warn!(path = %config_path.display(), %error, "failed to load configuration, using defaults");
                }
            }
        }

        let config = Self::default();
        if let Err(error) = config.save() {
            warn!(path = %config_path.display(), %error, "failed to write default configuration");
        } else {
            info!(path = %config_path.display(), "wrote default configuration");
        }
        config
    }

    fn load_from_file(path: &Path) -> Result<Self, StreamerError> {
        let ini = Ini::load_from_file(path).map_err(|e| StreamerError::ConfigLoad {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        let mut config = Self::default();
        config.config_path = path.to_path_buf();

        if let Some(section) = ini.section(Some("Streamer")) {
            if let Some(val) = section.get("CacheMemoryBudgetBytes") {
                config.cache_memory_budget = val.parse().unwrap_or(config.cache_memory_budget);
            }
            if let Some(val) = section.get("PerFrameUploadBudgetMs") {
                if let Ok(ms) = val.parse::<u64>() {
                    config.per_frame_upload_budget = Duration::from_millis(ms);
                }
            }
            if let Some(val) = section.get("WorkerCount") {
                match val.parse::<usize>() {
                    Ok(0) | Err(_) => {} // 0 or unparseable means "keep the hardware-derived default".
                    Ok(n) => config.worker_count = n,
                }
            }
            if let Some(val) = section.get("ResampleFilter") {
                if let Some(filter) = ResampleFilter::from_str(val) {
                    config.resample_filter = filter;
                }
            }
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), StreamerError> {
        let mut ini = Ini::new();
        ini.with_section(Some("Streamer"))
            .set("CacheMemoryBudgetBytes", self.cache_memory_budget.to_string())
            .set(
                "PerFrameUploadBudgetMs",
                self.per_frame_upload_budget.as_millis().to_string(),
            )
            .set("WorkerCount", self.worker_count.to_string())
            .set("ResampleFilter", self.resample_filter.as_str());

        ini.write_to_file(&self.config_path).map_err(|e| StreamerError::ConfigLoad {
            path: self.config_path.clone(),
            source: Box::new(e),
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

fn default_config_path() -> PathBuf {
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            return exe_dir.join("texture-streamer.ini");
        }
    }

    if let Some(dirs) = directories::ProjectDirs::from("", "", "texture-streamer") {
        let config_dir = dirs.config_dir();
        std::fs::create_dir_all(config_dir).ok();
        return config_dir.join("config.ini");
    }

    PathBuf::from("texture-streamer.ini")
}
