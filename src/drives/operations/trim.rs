use super::run_tool;
use crate::{DriveRecord, WipeError, WipeResult};
use std::fmt;
use std::path::{Path, PathBuf};

/// How quick mode releases a target's allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseMethod {
    /// Discard every block (blkdiscard)
    Discard,
    /// Erase filesystem and partition-table signatures (wipefs)
    SignatureErase,
}

impl fmt::Display for ReleaseMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseMethod::Discard => f.write_str("discard"),
            ReleaseMethod::SignatureErase => f.write_str("signature erase"),
        }
    }
}

/// Releases a target's allocation without overwriting it
pub trait AllocationRelease: Send + Sync {
    fn release(&self, target: &DriveRecord) -> WipeResult<ReleaseMethod>;
}

pub struct TrimOperations {
    sys_block: PathBuf,
}

impl Default for TrimOperations {
    fn default() -> Self {
        Self::new()
    }
}

impl TrimOperations {
    pub fn new() -> Self {
        Self::with_sysfs_root("/sys/block")
    }

    /// Read queue attributes from a different sysfs tree
    pub fn with_sysfs_root(sys_block: impl Into<PathBuf>) -> Self {
        Self {
            sys_block: sys_block.into(),
        }
    }

    /// Check if the whole disk behind `target` accepts discard requests
    pub fn supports_discard(&self, target: &DriveRecord) -> bool {
        let disk = disk_name(target.physical_device());
        let attr = self.sys_block.join(disk).join("queue/discard_max_bytes");

        std::fs::read_to_string(&attr)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|max| max > 0)
            .unwrap_or(false)
    }

    /// Method is decided once, before anything runs. A failed discard is not
    /// followed by a signature erase.
    pub fn choose_method(&self, target: &DriveRecord) -> ReleaseMethod {
        if self.supports_discard(target) {
            ReleaseMethod::Discard
        } else {
            ReleaseMethod::SignatureErase
        }
    }

    pub(crate) fn command_for(method: ReleaseMethod, device: &str) -> (&'static str, Vec<String>) {
        match method {
            ReleaseMethod::Discard => ("blkdiscard", vec!["-f".to_string(), device.to_string()]),
            ReleaseMethod::SignatureErase => {
                ("wipefs", vec!["--all".to_string(), "--force".to_string(), device.to_string()])
            }
        }
    }
}

impl AllocationRelease for TrimOperations {
    fn release(&self, target: &DriveRecord) -> WipeResult<ReleaseMethod> {
        let method = self.choose_method(target);
        log::info!("Releasing allocation on {} via {}", target.path, method);

        let (program, args) = Self::command_for(method, &target.path);
        run_tool(program, &args).map_err(WipeError::ReleaseFailed)?;
        Ok(method)
    }
}

fn disk_name(device: &str) -> &str {
    Path::new(device)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(device)
}
