// Drive operations delegated to external tools
//
// The engine never implements filesystem creation or discard itself; it sequences these
// utilities and treats their exit status as authoritative.

pub mod format; // mkfs / mount / umount
pub mod trim; // discard or signature erase for quick mode

// Re-exports for convenience
pub use format::{Formatter, MkfsFormatter};
pub use trim::{AllocationRelease, ReleaseMethod, TrimOperations};

use std::process::Command;

/// Run a tool to completion. On failure returns its diagnostic text.
pub(crate) fn run_tool(program: &str, args: &[String]) -> Result<(), String> {
    log::debug!("Running {} {}", program, args.join(" "));

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| format!("{} could not be started: {}", program, e))?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let detail = if stderr.is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    } else {
        stderr
    };
    Err(format!("{} exited with {}: {}", program, output.status, detail))
}
