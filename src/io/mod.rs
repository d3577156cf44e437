pub mod buffer;
pub mod engine;
pub mod free_space;
pub mod metrics;
pub mod platform_specific;


// Re-exports
pub use buffer::{AlignedBuffer, PAGE_SIZE, SECTOR_SIZE};
pub use engine::{ChunkStats, ChunkedIO, IOConfig, IOHandle, WriteOutcome};
pub use free_space::{available_bytes, FillOutcome, FreeSpaceFiller};
pub use metrics::ThroughputTracker;
