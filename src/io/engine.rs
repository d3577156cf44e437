// Chunked sequential write engine

use super::buffer::{AlignedBuffer, PAGE_SIZE};
use super::platform_specific::{get_platform_io, is_block_device, PlatformIO};
use crate::cancellation::CancellationToken;
use crate::settings::EngineSettings;
use crate::{WipeError, WipeResult};
use std::fs::File;
use std::time::{Duration, Instant};

/// I/O Configuration
#[derive(Debug, Clone)]
pub struct IOConfig {
    /// Use Direct I/O (O_DIRECT) - only honoured for block devices
    pub use_direct_io: bool,

    /// Bytes per write call
    pub chunk_size: usize,
}

impl Default for IOConfig {
    fn default() -> Self {
        Self::from(&EngineSettings::default())
    }
}

impl From<&EngineSettings> for IOConfig {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            use_direct_io: settings.direct_io,
            chunk_size: settings.chunk_size,
        }
    }
}

/// Result of one completed chunk write
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkStats {
    /// Bytes acknowledged by this write
    pub bytes: u64,
    /// Offset just past this chunk
    pub end_offset: u64,
    /// Time spent inside the write call
    pub elapsed: Duration,
}

/// How a sequential write ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Completed { bytes_written: u64 },
    Cancelled { bytes_written: u64 },
}

impl WriteOutcome {
    pub fn bytes_written(&self) -> u64 {
        match *self {
            WriteOutcome::Completed { bytes_written } | WriteOutcome::Cancelled { bytes_written } => {
                bytes_written
            }
        }
    }
}

/// Open target plus the single buffer reused for every chunk
pub struct IOHandle {
    file: File,
    platform_io: Box<dyn PlatformIO>,
    buffer: AlignedBuffer,
    chunk_size: usize,
    direct_io: bool,
    pub(crate) device_path: String,
}

impl IOHandle {
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn is_direct(&self) -> bool {
        self.direct_io
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Sync all data to disk
    pub fn sync(&self) -> WipeResult<()> {
        self.platform_io
            .sync_data(&self.file)
            .map_err(|source| WipeError::WriteFailed {
                device: self.device_path.clone(),
                offset: 0,
                source,
            })
    }
}

/// Sequential chunked writer
pub struct ChunkedIO;

impl ChunkedIO {
    /// Open a device or file for a wipe pass
    pub fn open(device_path: &str, config: &IOConfig) -> WipeResult<IOHandle> {
        if config.chunk_size == 0 {
            return Err(WipeError::Config("chunk size must be non-zero".to_string()));
        }

        let platform_io = get_platform_io();
        let direct_io = config.use_direct_io && is_block_device(device_path);

        log::debug!(
            "Opening {} on {} (direct I/O: {}, chunk: {} bytes)",
            device_path,
            platform_io.platform_name(),
            direct_io,
            config.chunk_size
        );

        let file = platform_io
            .open_for_wipe(device_path, direct_io)
            .map_err(|e| WipeError::from_open(device_path, e))?;

        let buffer = AlignedBuffer::new(config.chunk_size, PAGE_SIZE)?;

        Ok(IOHandle {
            file,
            platform_io,
            buffer,
            chunk_size: config.chunk_size,
            direct_io,
            device_path: device_path.to_string(),
        })
    }

    /// Write `total_size` bytes from offset 0, one chunk at a time.
    ///
    /// `fill` produces the bytes for each chunk; it receives a slice exactly as long as the
    /// chunk about to be written. `on_chunk` runs after every acknowledged write. The
    /// cancellation token is checked before each chunk, never during one, so the returned
    /// byte count is always a whole number of completed chunks.
    pub fn sequential_write<F, C>(
        handle: &mut IOHandle,
        total_size: u64,
        cancel: &CancellationToken,
        mut fill: F,
        mut on_chunk: C,
    ) -> WipeResult<WriteOutcome>
    where
        F: FnMut(&mut [u8]),
        C: FnMut(ChunkStats),
    {
        let IOHandle {
            file,
            platform_io,
            buffer,
            chunk_size,
            device_path,
            ..
        } = handle;

        let chunk_size = *chunk_size as u64;
        let mut offset = 0u64;

        while offset < total_size {
            if cancel.is_cancelled() {
                log::info!("Stopping {} at chunk boundary {}", device_path, offset);
                return Ok(WriteOutcome::Cancelled {
                    bytes_written: offset,
                });
            }

            let write_size = (total_size - offset).min(chunk_size) as usize;
            let chunk = &mut buffer.as_mut_slice()[..write_size];
            fill(chunk);

            let start = Instant::now();
            platform_io
                .write_chunk_at(file, chunk, offset)
                .map_err(|source| WipeError::WriteFailed {
                    device: device_path.clone(),
                    offset,
                    source,
                })?;
            let elapsed = start.elapsed();

            offset += write_size as u64;
            on_chunk(ChunkStats {
                bytes: write_size as u64,
                end_offset: offset,
                elapsed,
            });
        }

        Ok(WriteOutcome::Completed {
            bytes_written: offset,
        })
    }
}
