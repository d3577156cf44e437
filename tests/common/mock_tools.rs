/// Stand-ins for the external tools and the event consumer
///
/// None of these run a process: the formatter and releaser record their calls, the
/// sink records every event and can trip cancellation when a given phase starts.
use drive_eraser::drives::{AllocationRelease, Formatter, ReleaseMethod};
use drive_eraser::ui::{EventSink, ProgressUpdate, WipeEvent};
use drive_eraser::{CancellationToken, DriveRecord, WipeError, WipeResult};
use drive_eraser::{EngineSettings, Filesystem};
use std::path::Path;
use std::sync::Mutex;

/// Settings sized for temp-file targets
pub fn test_settings() -> EngineSettings {
    EngineSettings {
        chunk_size: 4096,
        direct_io: false,
        progress_interval_ms: 0,
        fill_file_size: 16 * 1024,
        min_free_space_fill: 0,
        metadata_window_bytes: 16 * 1024,
        ..Default::default()
    }
}

/// Formatter that records calls instead of running mkfs
#[derive(Default)]
pub struct RecordingFormatter {
    pub formats: Mutex<Vec<(String, Filesystem, Option<String>)>>,
    pub mounts: Mutex<Vec<String>>,
    pub unmounts: Mutex<Vec<String>>,
    /// Make every format call fail with this tool output
    pub fail_with: Option<String>,
}

impl RecordingFormatter {
    pub fn failing(stderr: &str) -> Self {
        Self {
            fail_with: Some(stderr.to_string()),
            ..Default::default()
        }
    }

    pub fn format_count(&self) -> usize {
        self.formats.lock().unwrap().len()
    }
}

impl Formatter for RecordingFormatter {
    fn format(&self, device: &str, fs: Filesystem, label: Option<&str>) -> WipeResult<()> {
        self.formats
            .lock()
            .unwrap()
            .push((device.to_string(), fs, label.map(str::to_string)));
        match &self.fail_with {
            Some(stderr) => Err(WipeError::FormatFailed(stderr.clone())),
            None => Ok(()),
        }
    }

    fn mount(&self, device: &str, _mount_point: &Path) -> WipeResult<()> {
        self.mounts.lock().unwrap().push(device.to_string());
        Ok(())
    }

    fn unmount(&self, target: &str) -> WipeResult<()> {
        self.unmounts.lock().unwrap().push(target.to_string());
        Ok(())
    }
}

/// Allocation release that records the targets it was asked to release
#[derive(Default)]
pub struct RecordingReleaser {
    pub released: Mutex<Vec<String>>,
}

impl AllocationRelease for RecordingReleaser {
    fn release(&self, target: &DriveRecord) -> WipeResult<ReleaseMethod> {
        self.released.lock().unwrap().push(target.path.clone());
        Ok(ReleaseMethod::Discard)
    }
}

/// Event sink that keeps every event in order
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<WipeEvent>>,
    cancel_on_phase: Option<(String, CancellationToken)>,
}

impl RecordingSink {
    /// Request cancellation on the first progress event of `phase`
    pub fn cancelling_on(phase: &str, token: CancellationToken) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            cancel_on_phase: Some((phase.to_string(), token)),
        }
    }

    pub fn events(&self) -> Vec<WipeEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<ProgressUpdate> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                WipeEvent::Progress(update) => Some(update),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                WipeEvent::Status { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Phases in the order their first progress event arrived
    pub fn phases(&self) -> Vec<String> {
        let mut phases: Vec<String> = Vec::new();
        for update in self.progress() {
            if phases.last() != Some(&update.phase) {
                phases.push(update.phase);
            }
        }
        phases
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: WipeEvent) {
        if let (Some((phase, token)), WipeEvent::Progress(update)) = (&self.cancel_on_phase, &event) {
            if &update.phase == phase {
                token.request_cancellation();
            }
        }
        self.events.lock().unwrap().push(event);
    }
}
