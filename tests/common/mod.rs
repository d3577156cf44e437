/// Common test utilities and mock infrastructure
///
/// This module provides shared functionality for integration tests including:
/// - Mock drives backed by temp files
/// - Recording stand-ins for the formatter, allocation release and event sink
/// - Content check helpers

pub mod mock_drive;
pub mod mock_tools;
pub mod test_helpers;
