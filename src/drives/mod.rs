// Drive inventory and drive-level operations
//
// - detection.rs: lsblk-based inventory and system volume classification
// - operations/: allocation release, mkfs, mount/unmount

// Core functionality
pub mod detection;


// Drive operations
pub mod operations;

// Re-exports for convenience
pub use detection::DriveDetector;
pub use operations::{AllocationRelease, Formatter, MkfsFormatter, ReleaseMethod, TrimOperations};
