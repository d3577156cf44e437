// Wipe Orchestrator - runs one validated request through its mode's step sequence
//
// The orchestrator owns the session state machine. It validates the request, claims the
// target, executes each planned step, hands the device to the formatter and reports a
// single terminal outcome. Nothing is retried: any failure ends the session.

use crate::algorithms::{PassPattern, PatternGenerator, PlannedStep, WipePlan, WipeStep};
use crate::cancellation::CancellationToken;
use crate::drives::{AllocationRelease, Formatter, MkfsFormatter, TrimOperations};
use crate::io::{available_bytes, ChunkedIO, FreeSpaceFiller, IOConfig, ThroughputTracker, WriteOutcome};
use crate::safety::SafetyGuard;
use crate::settings::EngineSettings;
use crate::ui::progress::{human_bytes, percentage};
use crate::ui::{EventSink, NullReporter, ProgressThrottle, ProgressUpdate, WipeEvent};
use crate::{DriveRecord, WipeError, WipeRequest, WipeResult, EXIT_CANCELLED};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum WipeState {
    Idle,
    Validating,
    Wiping { pass: u32, total: u32 },
    Formatting,
    Completed,
    Cancelled,
    Failed,
}

impl WipeState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WipeState::Completed | WipeState::Cancelled | WipeState::Failed
        )
    }

    /// Edges of the session state machine.
    ///
    /// `Validating -> Completed` only happens for dry runs. `Formatting -> Wiping` is the
    /// free-space fill that follows the first format in secure mode.
    pub fn can_transition_to(&self, next: &WipeState) -> bool {
        use WipeState::*;

        match (*self, *next) {
            (Idle, Validating) => true,
            (Validating, Wiping { pass: 1, total }) => total >= 1,
            (Validating, Completed | Cancelled | Failed) => true,
            (Wiping { pass, total }, Wiping { pass: p2, total: t2 }) => {
                t2 == total && p2 == pass + 1 && p2 <= total
            }
            (Wiping { .. }, Formatting | Cancelled | Failed) => true,
            (Formatting, Wiping { pass, total }) => pass <= total,
            (Formatting, Completed | Cancelled | Failed) => true,
            _ => false,
        }
    }
}

/// Live state of one wipe
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WipeSession {
    pub session_id: Uuid,
    pub state: WipeState,
    pub current_pass: u32,
    pub bytes_written_in_pass: u64,
    /// Bytes the current pass will write when it completes
    pub pass_extent_bytes: u64,
    pub total_bytes_for_target: u64,
    /// Sum over every pass, including the free-space fill
    pub total_bytes_written: u64,
    pub start_time: DateTime<Utc>,
    pub cancellation_requested: bool,
    pub format_invocations: u32,
    #[serde(skip)]
    started: Instant,
}

impl Default for WipeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl WipeSession {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            state: WipeState::Idle,
            current_pass: 0,
            bytes_written_in_pass: 0,
            pass_extent_bytes: 0,
            total_bytes_for_target: 0,
            total_bytes_written: 0,
            start_time: Utc::now(),
            cancellation_requested: false,
            format_invocations: 0,
            started: Instant::now(),
        }
    }

    pub fn transition(&mut self, next: WipeState) -> WipeResult<()> {
        if !self.state.can_transition_to(&next) {
            return Err(WipeError::InvalidTransition(format!(
                "{:?} -> {:?}",
                self.state, next
            )));
        }

        if let WipeState::Wiping { pass, .. } = next {
            // Pass numbers advance by exactly one, also across an intervening format
            if pass != self.current_pass + 1 {
                return Err(WipeError::InvalidTransition(format!(
                    "pass {} cannot follow pass {}",
                    pass, self.current_pass
                )));
            }
            self.current_pass = pass;
            self.bytes_written_in_pass = 0;
            self.pass_extent_bytes = 0;
        }

        log::debug!("Session {}: {:?} -> {:?}", self.session_id, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Set the byte extent of the pass that just started
    pub fn begin_pass(&mut self, extent: u64) {
        self.pass_extent_bytes = extent;
        self.bytes_written_in_pass = 0;
    }

    pub fn record_chunk(&mut self, bytes: u64) {
        self.bytes_written_in_pass += bytes;
        self.total_bytes_written += bytes;
    }

    pub fn percentage(&self) -> f64 {
        percentage(self.bytes_written_in_pass, self.pass_extent_bytes)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn terminate(&mut self, terminal: WipeState) {
        if let Err(e) = self.transition(terminal) {
            log::warn!("Forcing terminal state: {}", e);
            self.state = terminal;
        }
    }
}

#[derive(Debug)]
pub enum WipeOutcome {
    Completed,
    Cancelled,
    Failed(WipeError),
}

impl WipeOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            WipeOutcome::Completed => 0,
            WipeOutcome::Cancelled => EXIT_CANCELLED,
            WipeOutcome::Failed(e) => e.exit_code(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, WipeOutcome::Completed)
    }
}

/// Final snapshot handed back to the caller
#[derive(Debug)]
pub struct WipeReport {
    pub session: WipeSession,
    pub outcome: WipeOutcome,
    /// The record the request resolved to, if validation got that far
    pub target: Option<DriveRecord>,
}

impl WipeReport {
    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }
}

enum RunEnd {
    Completed,
    Cancelled,
}

/// Main wipe orchestrator
pub struct WipeOrchestrator {
    request: WipeRequest,
    settings: EngineSettings,
    guard: SafetyGuard,
    formatter: Arc<dyn Formatter>,
    releaser: Arc<dyn AllocationRelease>,
    reporter: Arc<dyn EventSink>,
    cancel: CancellationToken,
}

impl WipeOrchestrator {
    pub fn new(request: WipeRequest, settings: EngineSettings) -> Self {
        Self {
            request,
            settings,
            guard: SafetyGuard::default(),
            formatter: Arc::new(MkfsFormatter),
            releaser: Arc::new(TrimOperations::new()),
            reporter: Arc::new(NullReporter),
            cancel: CancellationToken::new(),
        }
    }

    /// Share a guard (and its active-target registry) with other orchestrators
    pub fn with_guard(mut self, guard: SafetyGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_releaser(mut self, releaser: Arc<dyn AllocationRelease>) -> Self {
        self.releaser = releaser;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn EventSink>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops this session at the next chunk boundary
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn request(&self) -> &WipeRequest {
        &self.request
    }

    /// Run the request to a terminal state against a fresh inventory snapshot.
    pub fn execute(self, drives: &[DriveRecord]) -> WipeReport {
        let mut session = WipeSession::new();
        let mut target = None;

        log::info!(
            "Session {}: {} wipe of {}",
            session.session_id,
            self.request.mode,
            self.request.target_path
        );

        let outcome = match self.run(&mut session, drives, &mut target) {
            Ok(RunEnd::Completed) => WipeOutcome::Completed,
            Ok(RunEnd::Cancelled) => WipeOutcome::Cancelled,
            Err(e) => WipeOutcome::Failed(e),
        };

        match &outcome {
            WipeOutcome::Completed => {
                session.terminate(WipeState::Completed);
                self.reporter.emit(WipeEvent::status("completed"));
            }
            WipeOutcome::Cancelled => {
                session.cancellation_requested = true;
                session.terminate(WipeState::Cancelled);
                self.reporter.emit(WipeEvent::status("cancelled"));
            }
            WipeOutcome::Failed(e) => {
                session.terminate(WipeState::Failed);
                self.reporter.emit(WipeEvent::error(e.to_string()));
            }
        }

        log::info!(
            "Session {} ended {:?} after {:.1}s ({} bytes written)",
            session.session_id,
            session.state,
            session.elapsed().as_secs_f64(),
            session.total_bytes_written
        );

        WipeReport {
            session,
            outcome,
            target,
        }
    }

    fn run(
        &self,
        session: &mut WipeSession,
        drives: &[DriveRecord],
        target_slot: &mut Option<DriveRecord>,
    ) -> WipeResult<RunEnd> {
        session.transition(WipeState::Validating)?;

        // Lease is held until the session ends
        let (target, _lease) = self.guard.authorize(&self.request, drives)?;
        session.total_bytes_for_target = target.total_bytes;
        *target_slot = Some(target.clone());

        let plan = WipePlan::for_request(&self.request, &self.settings);

        if self.request.dry_run {
            self.report_dry_run(&target, &plan);
            return Ok(RunEnd::Completed);
        }

        if self.cancel.is_cancelled() {
            return Ok(RunEnd::Cancelled);
        }

        self.unmount_target(&target, drives)?;

        for planned in plan.steps() {
            if self.cancel.is_cancelled() {
                return Ok(RunEnd::Cancelled);
            }

            if let Some((pass, total)) = planned.step.wiping_pass() {
                session.transition(WipeState::Wiping { pass, total })?;
            } else {
                session.transition(WipeState::Formatting)?;
            }

            let cancelled = match planned.step {
                WipeStep::ReleaseAllocation => {
                    self.reporter.emit(WipeEvent::status(planned.start_message()));
                    let method = self.releaser.release(&target)?;
                    log::info!("Allocation on {} released via {}", target.path, method);
                    false
                }
                WipeStep::Overwrite {
                    pattern, extent, ..
                } => {
                    self.reporter.emit(WipeEvent::status(planned.start_message()));
                    let len = extent.resolve(target.total_bytes);
                    self.overwrite(session, &target, &planned.phase, pattern, len)?
                }
                WipeStep::Format { .. } => {
                    self.format(session, &target, planned)?;
                    false
                }
                WipeStep::FillFreeSpace { pattern, .. } => {
                    self.reporter.emit(WipeEvent::status(planned.start_message()));
                    self.fill_free_space(session, &target, &planned.phase, pattern)?
                }
            };

            if cancelled {
                return Ok(RunEnd::Cancelled);
            }
        }

        Ok(RunEnd::Completed)
    }

    fn report_dry_run(&self, target: &DriveRecord, plan: &WipePlan) {
        self.reporter.emit(WipeEvent::status(format!(
            "dry run: {} wipe of {} ({}) validated, nothing will be written",
            plan.mode(),
            target.path,
            human_bytes(target.total_bytes as f64)
        )));
        for planned in plan.steps() {
            self.reporter
                .emit(WipeEvent::status(format!("dry run: {}", planned.start_message())));
        }
    }

    /// Unmount the target and, for a whole disk, any of its mounted partitions
    fn unmount_target(&self, target: &DriveRecord, drives: &[DriveRecord]) -> WipeResult<()> {
        let children = drives
            .iter()
            .filter(|d| d.parent_device.as_deref() == Some(target.path.as_str()));

        for record in children.chain(std::iter::once(target)) {
            if let Some(mount_point) = &record.mount_point {
                self.reporter
                    .emit(WipeEvent::status(format!("unmounting {}", mount_point)));
                self.formatter.unmount(mount_point)?;
            }
        }
        Ok(())
    }

    fn emit_progress(&self, phase: &str, session: &WipeSession, tracker: &ThroughputTracker) {
        let remaining = session
            .pass_extent_bytes
            .saturating_sub(session.bytes_written_in_pass);
        self.reporter.emit(WipeEvent::Progress(ProgressUpdate::new(
            phase,
            session.percentage(),
            tracker.bytes_per_second(),
            tracker.eta(remaining),
        )));
    }

    /// One overwrite pass over the first `len` bytes. Returns true if cancelled.
    fn overwrite(
        &self,
        session: &mut WipeSession,
        target: &DriveRecord,
        phase: &str,
        pattern: PassPattern,
        len: u64,
    ) -> WipeResult<bool> {
        let mut handle = ChunkedIO::open(&target.path, &IOConfig::from(&self.settings))?;
        let mut generator = PatternGenerator::new(pattern, len);
        let mut tracker = ThroughputTracker::new(self.settings.throughput_window);
        let mut throttle = ProgressThrottle::new(self.settings.progress_interval());

        session.begin_pass(len);
        log::info!("{}: {} over {} bytes of {}", phase, pattern, len, target.path);

        let outcome = ChunkedIO::sequential_write(
            &mut handle,
            len,
            &self.cancel,
            |buf| {
                generator.fill(buf);
            },
            |stats| {
                session.record_chunk(stats.bytes);
                tracker.record(stats.bytes, stats.elapsed);
                if throttle.should_emit(stats.end_offset == len) {
                    self.emit_progress(phase, session, &tracker);
                }
            },
        )?;

        handle.sync()?;
        Ok(matches!(outcome, WriteOutcome::Cancelled { .. }))
    }

    fn format(
        &self,
        session: &mut WipeSession,
        target: &DriveRecord,
        planned: &PlannedStep,
    ) -> WipeResult<()> {
        let filesystem = self
            .request
            .target_filesystem
            .ok_or(crate::ValidationError::MissingFilesystem)?;

        let purpose = match planned.step {
            WipeStep::Format { final_format: false } => " for the free-space fill",
            _ => "",
        };
        self.reporter.emit(WipeEvent::status(format!(
            "{}: creating {} filesystem on {}{}",
            planned.phase, filesystem, target.path, purpose
        )));

        session.format_invocations += 1;
        self.formatter
            .format(&target.path, filesystem, self.request.label.as_deref())
            .map_err(|e| match e {
                WipeError::FormatFailed(detail) => WipeError::FormatFailed(format!(
                    "target was wiped but has no filesystem: {}",
                    detail
                )),
                other => other,
            })?;

        self.reporter.emit(WipeEvent::Progress(ProgressUpdate::new(
            planned.phase.as_str(),
            100.0,
            0,
            Some(0),
        )));
        Ok(())
    }

    /// Mount the fresh filesystem on a scratch directory and fill its free space.
    fn fill_free_space(
        &self,
        session: &mut WipeSession,
        target: &DriveRecord,
        phase: &str,
        pattern: PassPattern,
    ) -> WipeResult<bool> {
        let mount_dir = tempfile::Builder::new()
            .prefix("drive-eraser-")
            .tempdir()?;

        self.formatter.mount(&target.path, mount_dir.path())?;
        let filled = self.fill_mounted(session, target, phase, pattern, mount_dir.path());
        let unmounted = self
            .formatter
            .unmount(&mount_dir.path().display().to_string());

        let cancelled = filled?;
        unmounted?;
        Ok(cancelled)
    }

    fn fill_mounted(
        &self,
        session: &mut WipeSession,
        target: &DriveRecord,
        phase: &str,
        pattern: PassPattern,
        dir: &Path,
    ) -> WipeResult<bool> {
        let budget = available_bytes(dir)?.min(target.total_bytes);
        if budget < self.settings.min_free_space_fill {
            self.reporter.emit(WipeEvent::status(format!(
                "{}: skipped, only {} free",
                phase,
                human_bytes(budget as f64)
            )));
            return Ok(false);
        }

        self.reporter.emit(WipeEvent::status(format!(
            "Available free space: {}",
            human_bytes(budget as f64)
        )));

        let filler = FreeSpaceFiller::new(dir, self.settings.fill_file_size, self.settings.chunk_size);
        let mut generator = PatternGenerator::new(pattern, budget);
        let mut tracker = ThroughputTracker::new(self.settings.throughput_window);
        let mut throttle = ProgressThrottle::new(self.settings.progress_interval());

        session.begin_pass(budget);

        let outcome = filler.fill(
            budget,
            &self.cancel,
            |buf| {
                generator.fill(buf);
            },
            |stats| {
                session.record_chunk(stats.bytes);
                tracker.record(stats.bytes, stats.elapsed);
                if throttle.should_emit(stats.end_offset == budget) {
                    self.emit_progress(phase, session, &tracker);
                }
            },
        )?;

        if outcome.cancelled {
            return Ok(true);
        }

        if session.bytes_written_in_pass < budget {
            // Filesystem filled up before the estimate; what fit is the whole extent
            session.pass_extent_bytes = session.bytes_written_in_pass;
            self.emit_progress(phase, session, &tracker);
        }

        self.reporter.emit(WipeEvent::status(format!(
            "{}: wrote {} in {} temporary files, removed",
            phase,
            human_bytes(outcome.bytes_written as f64),
            outcome.files
        )));
        Ok(false)
    }
}
