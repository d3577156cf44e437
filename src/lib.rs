//! Erasure engine for block devices and partitions.
//!
//! The engine classifies candidate targets, validates a [`WipeRequest`] against them,
//! runs the per-mode overwrite schedule in fixed-size chunks and finally hands the
//! target to an external formatter. Progress is reported through an [`ui::EventSink`].

pub mod algorithms;
pub mod cancellation;
pub mod drives;
pub mod io;
pub mod safety;
pub mod settings;
pub mod ui;
pub mod wipe_orchestrator;

// Re-export main entry points for convenience
pub use cancellation::CancellationToken;
pub use drives::DriveDetector;
pub use safety::{SafetyGuard, TargetLease, TargetRegistry, ValidationError};
pub use settings::EngineSettings;
pub use wipe_orchestrator::{WipeOrchestrator, WipeOutcome, WipeReport, WipeSession, WipeState};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Exit code reserved for operator-cancelled runs.
pub const EXIT_CANCELLED: i32 = 130;

/// Lowest and highest accepted Paranoid pass count.
pub const MIN_PASSES: u32 = 1;
pub const MAX_PASSES: u32 = 10;
pub const DEFAULT_PASSES: u32 = 3;

#[derive(Error, Debug)]
pub enum WipeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Insufficient permissions: {0}")]
    PermissionDenied(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Write failed on {device} at offset {offset}: {source}")]
    WriteFailed {
        device: String,
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Format failed: {0}")]
    FormatFailed(String),

    #[error("Allocation release failed: {0}")]
    ReleaseFailed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Illegal state transition: {0}")]
    InvalidTransition(String),
}

impl WipeError {
    /// Process exit code for this failure. Never 0 and never [`EXIT_CANCELLED`].
    pub fn exit_code(&self) -> i32 {
        match self {
            WipeError::Validation(_) => 2,
            WipeError::PermissionDenied(_) => 3,
            WipeError::IoError(_) | WipeError::WriteFailed { .. } | WipeError::ReleaseFailed(_) => 4,
            WipeError::FormatFailed(_) => 5,
            WipeError::Config(_) | WipeError::InvalidTransition(_) => 1,
        }
    }

    /// Map an error from opening a target, separating privilege problems and devices held
    /// by someone else from the rest.
    pub(crate) fn from_open(path: &str, err: std::io::Error) -> Self {
        if err.raw_os_error() == Some(libc::EBUSY) {
            return WipeError::Validation(ValidationError::TargetBusy(path.to_string()));
        }

        match err.kind() {
            std::io::ErrorKind::PermissionDenied => WipeError::PermissionDenied(format!(
                "cannot open {} for writing: {}",
                path, err
            )),
            _ => WipeError::IoError(std::io::Error::new(
                err.kind(),
                format!("cannot open {}: {}", path, err),
            )),
        }
    }
}

pub type WipeResult<T> = Result<T, WipeError>;

/// Assurance level of a wipe. The phase sequence is fixed per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WipeMode {
    Quick,      // release allocation, no overwrite
    Secure,     // one full pass + free-space fill
    Paranoid,   // N alternating full passes
    LegacyFast, // zero the leading metadata window
}

impl WipeMode {
    pub const ALL: [WipeMode; 4] = [
        WipeMode::Quick,
        WipeMode::Secure,
        WipeMode::Paranoid,
        WipeMode::LegacyFast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WipeMode::Quick => "quick",
            WipeMode::Secure => "secure",
            WipeMode::Paranoid => "paranoid",
            WipeMode::LegacyFast => "legacy-fast",
        }
    }
}

impl fmt::Display for WipeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WipeMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quick" => Ok(WipeMode::Quick),
            "secure" => Ok(WipeMode::Secure),
            "paranoid" => Ok(WipeMode::Paranoid),
            "legacy-fast" | "legacy_fast" | "legacyfast" => Ok(WipeMode::LegacyFast),
            other => Err(ValidationError::UnknownMode(other.to_string())),
        }
    }
}

/// Filesystems the post-wipe formatter knows how to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filesystem {
    Ext2,
    Ext3,
    Ext4,
    Xfs,
    Btrfs,
    Vfat,
    Exfat,
    Ntfs,
}

impl Filesystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Filesystem::Ext2 => "ext2",
            Filesystem::Ext3 => "ext3",
            Filesystem::Ext4 => "ext4",
            Filesystem::Xfs => "xfs",
            Filesystem::Btrfs => "btrfs",
            Filesystem::Vfat => "vfat",
            Filesystem::Exfat => "exfat",
            Filesystem::Ntfs => "ntfs",
        }
    }
}

impl fmt::Display for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Filesystem {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ext2" => Ok(Filesystem::Ext2),
            "ext3" => Ok(Filesystem::Ext3),
            "ext4" => Ok(Filesystem::Ext4),
            "xfs" => Ok(Filesystem::Xfs),
            "btrfs" => Ok(Filesystem::Btrfs),
            "vfat" | "fat32" | "fat" => Ok(Filesystem::Vfat),
            "exfat" => Ok(Filesystem::Exfat),
            "ntfs" => Ok(Filesystem::Ntfs),
            other => Err(ValidationError::UnknownFilesystem(other.to_string())),
        }
    }
}

/// One candidate target as seen by the last inventory scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveRecord {
    #[serde(rename = "devicePathOrMount")]
    pub path: String,
    pub label: String,
    pub filesystem_type: String,
    pub total_bytes: u64,
    pub is_system_volume: bool,
    pub is_removable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_point: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_device: Option<String>,
}

impl DriveRecord {
    /// Whole-disk identity used for the one-session-per-target rule.
    pub fn physical_device(&self) -> &str {
        self.parent_device.as_deref().unwrap_or(&self.path)
    }
}

/// A single invocation's wipe parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WipeRequest {
    pub target_path: String,
    pub mode: WipeMode,
    pub target_filesystem: Option<Filesystem>,
    pub passes: u32,
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl WipeRequest {
    pub fn new(target_path: impl Into<String>, mode: WipeMode, filesystem: Filesystem) -> Self {
        Self {
            target_path: target_path.into(),
            mode,
            target_filesystem: Some(filesystem),
            passes: DEFAULT_PASSES,
            dry_run: false,
            label: None,
        }
    }

    pub fn with_passes(mut self, passes: u32) -> Self {
        self.passes = passes;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Build a request from raw invocation strings, rejecting unknown modes and filesystems.
    pub fn from_args(
        target_path: &str,
        mode: &str,
        filesystem: Option<&str>,
        passes: Option<u32>,
        dry_run: bool,
    ) -> Result<Self, ValidationError> {
        let mode = mode.parse::<WipeMode>()?;
        let target_filesystem = filesystem.map(str::parse::<Filesystem>).transpose()?;

        Ok(Self {
            target_path: target_path.to_string(),
            mode,
            target_filesystem,
            passes: passes.unwrap_or(DEFAULT_PASSES),
            dry_run,
            label: None,
        })
    }
}
