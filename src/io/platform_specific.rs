// Platform-specific I/O implementations

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;

/// Platform-specific device access
pub trait PlatformIO: Send + Sync {
    /// Open a target for writing, bypassing the page cache when `direct_io` is set
    fn open_for_wipe(&self, path: &str, direct_io: bool) -> io::Result<File>;

    /// Write the whole slice at `offset`; returns only once every byte is accepted
    fn write_chunk_at(&self, file: &File, data: &[u8], offset: u64) -> io::Result<()> {
        file.write_all_at(data, offset)
    }

    /// Flush written data to stable storage
    fn sync_data(&self, file: &File) -> io::Result<()> {
        file.sync_data()
    }

    fn platform_name(&self) -> &str;
}

// ============= LINUX IMPLEMENTATION =============

#[cfg(target_os = "linux")]
pub struct LinuxIO;

#[cfg(target_os = "linux")]
impl LinuxIO {
    /// Extra open(2) flags for a wipe handle.
    ///
    /// O_EXCL on a block device makes the kernel refuse the open with EBUSY while the
    /// device is mounted or held open exclusively by anyone else, in any process.
    pub fn open_flags(direct_io: bool, block_device: bool) -> i32 {
        let mut flags = 0;
        if direct_io {
            flags |= libc::O_DIRECT;
        }
        if block_device {
            flags |= libc::O_EXCL;
        }
        flags
    }
}

#[cfg(target_os = "linux")]
impl PlatformIO for LinuxIO {
    fn open_for_wipe(&self, path: &str, direct_io: bool) -> io::Result<File> {
        use std::os::unix::fs::OpenOptionsExt;

        OpenOptions::new()
            .write(true)
            .custom_flags(Self::open_flags(direct_io, is_block_device(path)))
            .open(path)
    }

    fn platform_name(&self) -> &str {
        "Linux"
    }
}

// ============= MACOS IMPLEMENTATION =============

#[cfg(target_os = "macos")]
pub struct MacOSIO;

#[cfg(target_os = "macos")]
impl PlatformIO for MacOSIO {
    fn open_for_wipe(&self, path: &str, direct_io: bool) -> io::Result<File> {
        use std::os::unix::io::AsRawFd;

        let file = OpenOptions::new().write(true).open(path)?;

        if direct_io {
            // F_NOCACHE to bypass buffer cache on macOS
            // SAFETY: fd is owned by `file` and valid here
            let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_NOCACHE, 1) };
            if rc == -1 {
                return Err(io::Error::last_os_error());
            }
        }

        Ok(file)
    }

    fn sync_data(&self, file: &File) -> io::Result<()> {
        use std::os::unix::io::AsRawFd;

        // F_FULLFSYNC on macOS for guaranteed persistence
        // SAFETY: fd is owned by `file` and valid here
        let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_FULLFSYNC) };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn platform_name(&self) -> &str {
        "macOS"
    }
}

// ============= OTHER UNIX =============

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub struct PortableIO;

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
impl PlatformIO for PortableIO {
    fn open_for_wipe(&self, path: &str, _direct_io: bool) -> io::Result<File> {
        OpenOptions::new().write(true).open(path)
    }

    fn platform_name(&self) -> &str {
        "Unix (buffered)"
    }
}

// ============= HELPERS =============

pub fn is_block_device(path: &str) -> bool {
    use std::os::unix::fs::FileTypeExt;

    std::fs::metadata(path)
        .map(|m| m.file_type().is_block_device())
        .unwrap_or(false)
}

// ============= PLATFORM FACTORY =============

pub fn get_platform_io() -> Box<dyn PlatformIO> {
    #[cfg(target_os = "linux")]
    {
        Box::new(LinuxIO)
    }

    #[cfg(target_os = "macos")]
    {
        Box::new(MacOSIO)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        Box::new(PortableIO)
    }
}
