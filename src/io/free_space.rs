// Free-space fill on a mounted filesystem
//
// Junk files are written until the budget is spent or the filesystem reports ENOSPC.
// Running out of space is the expected way for the fill to end. The junk files are
// removed afterwards whatever the outcome.

use super::engine::ChunkStats;
use crate::cancellation::CancellationToken;
use crate::{WipeError, WipeResult};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Bytes available to an unprivileged writer under `dir`.
pub fn available_bytes(dir: &Path) -> WipeResult<u64> {
    let stats = nix::sys::statvfs::statvfs(dir)
        .map_err(|errno| WipeError::IoError(io::Error::from(errno)))?;

    #[allow(clippy::unnecessary_cast)]
    let bytes = stats.blocks_available() as u64 * stats.fragment_size() as u64;
    Ok(bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FillOutcome {
    pub bytes_written: u64,
    pub files: usize,
    pub cancelled: bool,
    /// The filesystem ran out of space before the budget was spent
    pub hit_enospc: bool,
}

pub struct FreeSpaceFiller {
    dir: PathBuf,
    file_size: u64,
    chunk_size: usize,
}

impl FreeSpaceFiller {
    pub fn new(dir: impl Into<PathBuf>, file_size: u64, chunk_size: usize) -> Self {
        Self {
            dir: dir.into(),
            file_size: file_size.max(chunk_size as u64),
            chunk_size: chunk_size.max(1),
        }
    }

    fn junk_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("junk_fill_{}.tmp", index))
    }

    /// Fill up to `budget` bytes, then remove every junk file.
    pub fn fill<F, C>(
        &self,
        budget: u64,
        cancel: &CancellationToken,
        fill: F,
        on_chunk: C,
    ) -> WipeResult<FillOutcome>
    where
        F: FnMut(&mut [u8]),
        C: FnMut(ChunkStats),
    {
        let mut created = Vec::new();
        let result = self.fill_files(budget, cancel, fill, on_chunk, &mut created);

        for path in &created {
            if let Err(e) = std::fs::remove_file(path) {
                log::warn!("Failed to remove junk file {}: {}", path.display(), e);
            }
        }
        log::debug!("Removed {} junk files from {}", created.len(), self.dir.display());

        result
    }

    fn fill_files<F, C>(
        &self,
        budget: u64,
        cancel: &CancellationToken,
        mut fill: F,
        mut on_chunk: C,
        created: &mut Vec<PathBuf>,
    ) -> WipeResult<FillOutcome>
    where
        F: FnMut(&mut [u8]),
        C: FnMut(ChunkStats),
    {
        let mut buffer = vec![0u8; self.chunk_size];
        let mut outcome = FillOutcome::default();

        'files: while outcome.bytes_written < budget {
            let path = self.junk_path(created.len());
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if is_enospc(&e) => {
                    outcome.hit_enospc = true;
                    break;
                }
                Err(e) => return Err(WipeError::IoError(e)),
            };
            created.push(path.clone());
            outcome.files += 1;

            let mut in_file = 0u64;
            while in_file < self.file_size && outcome.bytes_written < budget {
                if cancel.is_cancelled() {
                    outcome.cancelled = true;
                    break 'files;
                }

                let remaining = (self.file_size - in_file).min(budget - outcome.bytes_written);
                let len = remaining.min(self.chunk_size as u64) as usize;
                let chunk = &mut buffer[..len];
                fill(chunk);

                let start = Instant::now();
                match file.write_all(chunk) {
                    Ok(()) => {}
                    Err(e) if is_enospc(&e) => {
                        outcome.hit_enospc = true;
                        break 'files;
                    }
                    Err(e) => return Err(write_failed(&path, in_file, e)),
                }
                let elapsed = start.elapsed();

                in_file += len as u64;
                outcome.bytes_written += len as u64;
                on_chunk(ChunkStats {
                    bytes: len as u64,
                    end_offset: outcome.bytes_written,
                    elapsed,
                });
            }

            finish_file(&file, &path)?;
        }

        log::info!(
            "Free-space fill wrote {} bytes in {} files (enospc: {}, cancelled: {})",
            outcome.bytes_written,
            outcome.files,
            outcome.hit_enospc,
            outcome.cancelled
        );
        Ok(outcome)
    }
}

fn finish_file(file: &File, path: &Path) -> WipeResult<()> {
    match file.sync_all() {
        Ok(()) => Ok(()),
        // Delayed allocation can surface a full disk only at flush time
        Err(e) if is_enospc(&e) => Ok(()),
        Err(e) => Err(write_failed(path, 0, e)),
    }
}

fn write_failed(path: &Path, offset: u64, source: io::Error) -> WipeError {
    WipeError::WriteFailed {
        device: path.display().to_string(),
        offset,
        source,
    }
}

fn is_enospc(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENOSPC)
}
