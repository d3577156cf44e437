/// Mock drive infrastructure for testing
///
/// A mock drive is a temp file pre-filled with a recognizable byte so tests can tell
/// overwritten regions from untouched ones. Its `DriveRecord` points at the file.
use drive_eraser::DriveRecord;
use std::io::{Seek, SeekFrom, Write};
use tempfile::NamedTempFile;

/// Byte every mock drive starts out filled with
pub const STALE_BYTE: u8 = 0xAB;

/// Mock drive configuration
pub struct MockDriveConfig {
    pub size_bytes: u64,
    pub label: String,
    pub filesystem_type: String,
    pub is_system_volume: bool,
    pub is_removable: bool,
}

impl Default for MockDriveConfig {
    fn default() -> Self {
        Self {
            size_bytes: 64 * 1024,
            label: "MOCK".to_string(),
            filesystem_type: "ext4".to_string(),
            is_system_volume: false,
            is_removable: true,
        }
    }
}

/// Mock drive instance
pub struct MockDrive {
    pub config: MockDriveConfig,
    pub temp_file: NamedTempFile,
}

impl MockDrive {
    /// Create a new mock drive with the specified configuration
    pub fn new(config: MockDriveConfig) -> std::io::Result<Self> {
        let mut temp_file = NamedTempFile::new()?;

        let chunk = vec![STALE_BYTE; 64 * 1024];
        let mut written = 0u64;
        while written < config.size_bytes {
            let write_size = (config.size_bytes - written).min(chunk.len() as u64);
            temp_file.write_all(&chunk[..write_size as usize])?;
            written += write_size;
        }

        temp_file.flush()?;
        temp_file.seek(SeekFrom::Start(0))?;

        Ok(Self { config, temp_file })
    }

    /// Create a removable data drive of `size_bytes`
    pub fn removable(size_bytes: u64) -> std::io::Result<Self> {
        Self::new(MockDriveConfig {
            size_bytes,
            ..Default::default()
        })
    }

    /// Create a drive classified as the running system's volume
    pub fn system_volume(size_bytes: u64) -> std::io::Result<Self> {
        Self::new(MockDriveConfig {
            size_bytes,
            label: "ROOT".to_string(),
            is_system_volume: true,
            is_removable: false,
            ..Default::default()
        })
    }

    /// Get the path to the mock drive file
    pub fn path(&self) -> &std::path::Path {
        self.temp_file.path()
    }

    /// Get the path as a string
    pub fn path_str(&self) -> &str {
        self.path().to_str().unwrap()
    }

    /// Get the size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.config.size_bytes
    }

    /// Inventory record the engine sees for this drive
    pub fn record(&self) -> DriveRecord {
        DriveRecord {
            path: self.path_str().to_string(),
            label: self.config.label.clone(),
            filesystem_type: self.config.filesystem_type.clone(),
            total_bytes: self.config.size_bytes,
            is_system_volume: self.config.is_system_volume,
            is_removable: self.config.is_removable,
            mount_point: None,
            parent_device: None,
        }
    }

    /// Current contents of the backing file
    pub fn contents(&self) -> Vec<u8> {
        std::fs::read(self.path()).unwrap()
    }
}
