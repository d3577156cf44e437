use super::run_tool;
use crate::{Filesystem, WipeError, WipeResult};
use std::io;
use std::path::Path;

/// Filesystem creation and mounting, performed by external utilities.
pub trait Formatter: Send + Sync {
    /// Create `filesystem` on `device`, blocking until the tool exits.
    fn format(&self, device: &str, filesystem: Filesystem, label: Option<&str>) -> WipeResult<()>;

    fn mount(&self, device: &str, mount_point: &Path) -> WipeResult<()>;

    /// Unmount a device or mount point
    fn unmount(&self, target: &str) -> WipeResult<()>;
}

/// Formatter backed by the mkfs.* family
#[derive(Debug, Default, Clone, Copy)]
pub struct MkfsFormatter;

impl MkfsFormatter {
    /// Non-interactive mkfs invocation for one filesystem
    pub fn mkfs_command(
        filesystem: Filesystem,
        device: &str,
        label: Option<&str>,
    ) -> (&'static str, Vec<String>) {
        let (program, force, label_flag): (&str, Vec<&str>, &str) = match filesystem {
            Filesystem::Ext2 => ("mkfs.ext2", vec!["-F"], "-L"),
            Filesystem::Ext3 => ("mkfs.ext3", vec!["-F"], "-L"),
            Filesystem::Ext4 => ("mkfs.ext4", vec!["-F"], "-L"),
            Filesystem::Xfs => ("mkfs.xfs", vec!["-f"], "-L"),
            Filesystem::Btrfs => ("mkfs.btrfs", vec!["-f"], "-L"),
            Filesystem::Vfat => ("mkfs.vfat", vec!["-I", "-F", "32"], "-n"),
            Filesystem::Exfat => ("mkfs.exfat", vec![], "-L"),
            // -Q: quick format, skip zeroing
            Filesystem::Ntfs => ("mkfs.ntfs", vec!["-Q", "-F"], "-L"),
        };

        let mut args: Vec<String> = force.into_iter().map(String::from).collect();
        if let Some(label) = label {
            args.push(label_flag.to_string());
            args.push(label.to_string());
        }
        args.push(device.to_string());

        (program, args)
    }
}

impl Formatter for MkfsFormatter {
    fn format(&self, device: &str, filesystem: Filesystem, label: Option<&str>) -> WipeResult<()> {
        let (program, args) = Self::mkfs_command(filesystem, device, label);
        log::info!("Creating {} filesystem on {}", filesystem, device);
        run_tool(program, &args).map_err(WipeError::FormatFailed)
    }

    fn mount(&self, device: &str, mount_point: &Path) -> WipeResult<()> {
        let args = vec![device.to_string(), mount_point.display().to_string()];
        run_tool("mount", &args).map_err(|e| WipeError::IoError(io::Error::other(e)))
    }

    fn unmount(&self, target: &str) -> WipeResult<()> {
        run_tool("umount", &[target.to_string()])
            .map_err(|e| WipeError::IoError(io::Error::other(e)))
    }
}
