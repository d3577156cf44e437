// Engine settings
//
// Layered as: built-in defaults, then an optional TOML file, then DRIVE_ERASER_* environment
// variables. Only tuning knobs live here; what to wipe always comes from the WipeRequest.

use crate::{WipeError, WipeResult};
use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "DRIVE_ERASER";
const ALIGNMENT: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Bytes per write. Smaller chunks cancel faster at higher syscall cost.
    pub chunk_size: usize,

    /// Leading bytes overwritten by legacy-fast mode.
    pub metadata_window_bytes: u64,

    /// Minimum time between two progress events of the same pass.
    pub progress_interval_ms: u64,

    /// Number of recent chunks averaged for throughput and ETA.
    pub throughput_window: usize,

    /// Bypass the page cache when the target is a block device.
    pub direct_io: bool,

    /// Size of each junk file written during the free-space fill.
    pub fill_file_size: u64,

    /// Skip the free-space fill below this many free bytes.
    pub min_free_space_fill: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            chunk_size: 4 * 1024 * 1024,
            metadata_window_bytes: 16 * 1024 * 1024,
            progress_interval_ms: 500,
            throughput_window: 16,
            direct_io: true,
            fill_file_size: 32 * 1024 * 1024,
            min_free_space_fill: 1024 * 1024,
        }
    }
}

impl EngineSettings {
    /// Default location of the settings file, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "drive-eraser").map(|dirs| dirs.config_dir().join("engine.toml"))
    }

    /// Load settings. An explicit file must exist; the default file is optional.
    pub fn load(explicit: Option<&Path>) -> WipeResult<Self> {
        let mut builder = Config::builder();

        match explicit {
            Some(path) => {
                builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
            }
            None => {
                if let Some(path) = Self::default_path() {
                    builder = builder
                        .add_source(File::from(path.as_path()).format(FileFormat::Toml).required(false));
                }
            }
        }

        let settings: EngineSettings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .and_then(Config::try_deserialize::<EngineSettings>)
            .map_err(|e| WipeError::Config(e.to_string()))?;

        settings.validate()?;
        log::debug!("Engine settings: {:?}", settings);
        Ok(settings)
    }

    pub fn validate(&self) -> WipeResult<()> {
        if self.chunk_size == 0 || self.chunk_size % ALIGNMENT != 0 {
            return Err(WipeError::Config(format!(
                "chunk_size must be a non-zero multiple of {}, got {}",
                ALIGNMENT, self.chunk_size
            )));
        }
        if self.throughput_window == 0 {
            return Err(WipeError::Config("throughput_window must be at least 1".to_string()));
        }
        if self.metadata_window_bytes == 0 {
            return Err(WipeError::Config(
                "metadata_window_bytes must be non-zero".to_string(),
            ));
        }
        if self.fill_file_size < self.chunk_size as u64 {
            return Err(WipeError::Config(format!(
                "fill_file_size ({}) must be at least one chunk ({})",
                self.fill_file_size, self.chunk_size
            )));
        }
        Ok(())
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}
