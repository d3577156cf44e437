use anyhow::{Context, Result};
use clap::Parser;
use drive_eraser::ui::{ChannelReporter, EventSink, JsonLineReporter, WipeEvent};
use drive_eraser::{
    CancellationToken, DriveDetector, EngineSettings, WipeOrchestrator, WipeRequest,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "drive-eraser")]
#[command(about = "Erase a drive or partition and leave it freshly formatted")]
#[command(version)]
struct Cli {
    /// Device path or mount point of the target (e.g. /dev/sdb1 or /media/usb)
    #[arg(long, required_unless_present = "list_drives")]
    path: Option<String>,

    /// Wipe mode: quick, secure, paranoid or legacy-fast
    #[arg(long, required_unless_present = "list_drives")]
    mode: Option<String>,

    /// Filesystem to create after wiping (ext4, xfs, btrfs, vfat, exfat, ntfs, ...)
    #[arg(long, required_unless_present = "list_drives")]
    filesystem: Option<String>,

    /// Overwrite passes for paranoid mode (1-10)
    #[arg(long)]
    passes: Option<u32>,

    /// Volume label for the new filesystem
    #[arg(long)]
    label: Option<String>,

    /// Print the drive inventory as a single `drives` event and exit
    #[arg(long, conflicts_with = "path")]
    list_drives: bool,

    /// Validate and print the plan without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Engine settings file (TOML)
    #[arg(long, env = "DRIVE_ERASER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

/// What one invocation does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    ListDrives,
    Wipe,
}

impl Cli {
    // Listing never writes, so it wins over --dry-run
    fn action(&self) -> Action {
        if self.list_drives {
            Action::ListDrives
        } else {
            Action::Wipe
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let stdout = JsonLineReporter::stdout();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            stdout.emit(WipeEvent::error(format!("{:#}", e)));
            1
        }
    };

    std::process::exit(code);
}

/// Logs go to stderr so stdout carries nothing but events.
fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .target(env_logger::Target::Stderr)
        .init();
}

async fn run(cli: Cli) -> Result<i32> {
    let stdout = JsonLineReporter::stdout();

    if cli.action() == Action::ListDrives {
        let items = tokio::task::spawn_blocking(DriveDetector::list_drives)
            .await
            .context("drive inventory task panicked")?;
        stdout.emit(WipeEvent::Drives { items });
        return Ok(0);
    }

    let request = match build_request(&cli) {
        Ok(request) => request,
        Err(e) => {
            stdout.emit(WipeEvent::error(e.to_string()));
            return Ok(2);
        }
    };

    let settings = EngineSettings::load(cli.config.as_deref())
        .with_context(|| "failed to load engine settings")?;

    if unsafe { libc::geteuid() } != 0 && !request.dry_run {
        log::warn!("Not running as root; opening {} will likely fail", request.target_path);
    }

    let cancel = CancellationToken::new();
    setup_signal_handlers(cancel.clone())?;

    let (reporter, mut events) = ChannelReporter::new();
    let orchestrator = WipeOrchestrator::new(request, settings)
        .with_reporter(Arc::new(reporter))
        .with_cancellation(cancel);

    let session = tokio::task::spawn_blocking(move || {
        let drives = DriveDetector::list_drives();
        orchestrator.execute(&drives)
    });

    // Sender lives in the orchestrator, so the stream ends when the session does
    while let Some(event) = events.recv().await {
        stdout.emit(event);
    }

    let report = session.await.context("wipe task panicked")?;
    Ok(report.exit_code())
}

fn build_request(cli: &Cli) -> Result<WipeRequest, drive_eraser::ValidationError> {
    let path = cli.path.as_deref().unwrap_or_default();
    let request = WipeRequest::from_args(
        path,
        cli.mode.as_deref().unwrap_or_default(),
        cli.filesystem.as_deref(),
        cli.passes,
        cli.dry_run,
    )?;

    Ok(match &cli.label {
        Some(label) => request.with_label(label.as_str()),
        None => request,
    })
}

// SIGINT/SIGTERM stop the session at the next chunk boundary
fn setup_signal_handlers(cancel: CancellationToken) -> Result<()> {
    use signal_hook::{
        consts::{SIGINT, SIGTERM},
        iterator::Signals,
    };

    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            log::warn!("Signal {} received, stopping after the current chunk", sig);
            cancel.request_cancellation();
        }
    });

    Ok(())
}
