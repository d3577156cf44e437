// Request validation and per-device session exclusion
//
// Every check here runs before a session is created and before the target is opened.
// The guard does not assume any caller-side confirmation happened.

use crate::{DriveRecord, WipeRequest, MAX_PASSES, MIN_PASSES};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("target not found: {0}")]
    TargetNotFound(String),

    #[error("target {0} matches more than one device")]
    AmbiguousTarget(String),

    #[error("refused: system volume {0}")]
    SystemVolume(String),

    #[error("passes must be between {min} and {max}, got {0}", min = MIN_PASSES, max = MAX_PASSES)]
    PassesOutOfRange(u32),

    #[error("unknown wipe mode: {0}")]
    UnknownMode(String),

    #[error("unknown filesystem: {0}")]
    UnknownFilesystem(String),

    #[error("a target filesystem is required")]
    MissingFilesystem,

    #[error("target {0} reports zero capacity")]
    ZeroCapacity(String),

    #[error("target {0} already has an active wipe session")]
    TargetBusy(String),
}

/// Devices with a live session. Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl TargetRegistry {
    /// A registry that shares nothing with any other
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry every default `SafetyGuard` in this process uses.
    ///
    /// The devices themselves are process-wide, so their leases are too. Other processes
    /// are kept out by the exclusive open of the block device.
    pub fn process() -> Self {
        static PROCESS: OnceLock<TargetRegistry> = OnceLock::new();
        PROCESS.get_or_init(TargetRegistry::new).clone()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `device` until the returned lease is dropped.
    pub fn acquire(&self, device: &str) -> Result<TargetLease, ValidationError> {
        if !self.lock().insert(device.to_string()) {
            return Err(ValidationError::TargetBusy(device.to_string()));
        }
        log::debug!("Acquired session lease on {}", device);
        Ok(TargetLease {
            device: device.to_string(),
            registry: self.clone(),
        })
    }

    pub fn is_active(&self, device: &str) -> bool {
        self.lock().contains(device)
    }
}

/// Exclusive claim on one physical device
#[derive(Debug)]
pub struct TargetLease {
    device: String,
    registry: TargetRegistry,
}

impl TargetLease {
    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Drop for TargetLease {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.device);
        log::debug!("Released session lease on {}", self.device);
    }
}

#[derive(Debug, Clone)]
pub struct SafetyGuard {
    registry: TargetRegistry,
}

impl Default for SafetyGuard {
    fn default() -> Self {
        Self::new(TargetRegistry::process())
    }
}

impl SafetyGuard {
    pub fn new(registry: TargetRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    /// Check a request against the inventory without claiming the target.
    pub fn validate<'a>(
        &self,
        request: &WipeRequest,
        drives: &'a [DriveRecord],
    ) -> Result<&'a DriveRecord, ValidationError> {
        let record = resolve_target(&request.target_path, drives)?;

        if record.is_system_volume {
            return Err(ValidationError::SystemVolume(record.path.clone()));
        }
        if !(MIN_PASSES..=MAX_PASSES).contains(&request.passes) {
            return Err(ValidationError::PassesOutOfRange(request.passes));
        }
        if request.target_filesystem.is_none() {
            return Err(ValidationError::MissingFilesystem);
        }
        if record.total_bytes == 0 {
            return Err(ValidationError::ZeroCapacity(record.path.clone()));
        }

        Ok(record)
    }

    /// Validate and claim the target's physical device.
    pub fn authorize(
        &self,
        request: &WipeRequest,
        drives: &[DriveRecord],
    ) -> Result<(DriveRecord, TargetLease), ValidationError> {
        let record = self.validate(request, drives)?;
        let lease = self.registry.acquire(record.physical_device())?;
        Ok((record.clone(), lease))
    }
}

fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// Find the single record a path names: its device path, its mount point, or either of
/// those after following symlinks.
pub fn resolve_target<'a>(
    path: &str,
    drives: &'a [DriveRecord],
) -> Result<&'a DriveRecord, ValidationError> {
    let wanted = normalize(path);

    let direct = matches_for(wanted, drives);
    let matches = if direct.is_empty() {
        match std::fs::canonicalize(Path::new(wanted)) {
            Ok(canonical) => matches_for(normalize(&canonical.to_string_lossy()), drives),
            Err(_) => direct,
        }
    } else {
        direct
    };

    match matches.as_slice() {
        [] => Err(ValidationError::TargetNotFound(path.to_string())),
        [record] => Ok(record),
        _ => Err(ValidationError::AmbiguousTarget(path.to_string())),
    }
}

fn matches_for<'a>(wanted: &str, drives: &'a [DriveRecord]) -> Vec<&'a DriveRecord> {
    let mut found: Vec<&DriveRecord> = drives
        .iter()
        .filter(|d| {
            normalize(&d.path) == wanted
                || d.mount_point.as_deref().map(normalize) == Some(wanted)
        })
        .collect();
    found.dedup_by(|a, b| a.path == b.path);
    found
}
