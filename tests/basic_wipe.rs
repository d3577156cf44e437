/// Basic wipe operation integration tests
///
/// Tests end-to-end sessions against mock drives: every mode's phase sequence, the
/// terminal outcome and exit code, and what ends up on the target.
use drive_eraser::ui::{EventSink, JsonLineReporter, WipeEvent};
use drive_eraser::{
    CancellationToken, DriveRecord, Filesystem, SafetyGuard, WipeMode, WipeOrchestrator,
    WipeReport, WipeRequest, WipeState, EXIT_CANCELLED,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::thread;

// Import common test utilities
// Note: In integration tests, common modules must be in tests/common/
#[path = "common/mod.rs"]
mod common;

use common::mock_drive::{MockDrive, STALE_BYTE};
use common::mock_tools::{test_settings, RecordingFormatter, RecordingReleaser, RecordingSink};
use common::test_helpers::{all_bytes_are, entropy, verify_all_zeros};

struct Harness {
    formatter: Arc<RecordingFormatter>,
    releaser: Arc<RecordingReleaser>,
    sink: Arc<RecordingSink>,
    cancel: CancellationToken,
}

impl Harness {
    fn new() -> Self {
        Self::with_sink(RecordingSink::default(), CancellationToken::new())
    }

    fn with_sink(sink: RecordingSink, cancel: CancellationToken) -> Self {
        Self {
            formatter: Arc::new(RecordingFormatter::default()),
            releaser: Arc::new(RecordingReleaser::default()),
            sink: Arc::new(sink),
            cancel,
        }
    }

    fn run(&self, request: WipeRequest, drives: &[DriveRecord]) -> WipeReport {
        WipeOrchestrator::new(request, test_settings())
            .with_formatter(self.formatter.clone())
            .with_releaser(self.releaser.clone())
            .with_reporter(self.sink.clone())
            .with_cancellation(self.cancel.clone())
            .execute(drives)
    }
}

fn request(mock: &MockDrive, mode: WipeMode) -> WipeRequest {
    WipeRequest::new(mock.path_str(), mode, Filesystem::Ext4)
}

#[test]
fn test_quick_releases_allocation_without_overwrite() {
    let mock = MockDrive::removable(64 * 1024).unwrap();
    let harness = Harness::new();

    let report = harness.run(request(&mock, WipeMode::Quick), &[mock.record()]);

    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.session.state, WipeState::Completed);
    assert_eq!(report.session.total_bytes_written, 0);
    assert_eq!(*harness.releaser.released.lock().unwrap(), vec![mock.path_str().to_string()]);
    assert_eq!(harness.formatter.format_count(), 1);

    let releasing = harness
        .sink
        .statuses()
        .iter()
        .filter(|m| m.as_str() == "releasing allocation")
        .count();
    assert_eq!(releasing, 1);
    assert!(
        harness.sink.progress().iter().all(|p| p.phase == "Format"),
        "Quick mode writes no pattern"
    );
    assert!(all_bytes_are(&mock.contents(), STALE_BYTE));
}

#[test]
fn test_secure_runs_all_four_phases() {
    let mock = MockDrive::removable(64 * 1024).unwrap();
    let harness = Harness::new();

    let report = harness.run(request(&mock, WipeMode::Secure), &[mock.record()]);

    assert!(report.outcome.is_success(), "{:?}", report.outcome);
    assert_eq!(
        harness.sink.phases(),
        vec!["Overwrite", "Format", "Free-space fill", "Final format"]
    );
    assert_eq!(harness.formatter.format_count(), 2);
    assert_eq!(report.session.format_invocations, 2);
    assert!(report.session.total_bytes_written >= mock.size_bytes());

    let overwrite_done = harness
        .sink
        .progress()
        .iter()
        .any(|p| p.phase == "Overwrite" && p.percentage == 100.0);
    assert!(overwrite_done);

    let statuses = harness.sink.statuses();
    assert!(statuses.contains(&format!(
        "Format: creating ext4 filesystem on {} for the free-space fill",
        mock.path_str()
    )));
    assert!(statuses.contains(&format!(
        "Final format: creating ext4 filesystem on {}",
        mock.path_str()
    )));

    // Device pass is all ones; the fill lands in the mounted filesystem, not here
    assert!(all_bytes_are(&mock.contents(), 0xFF));
    assert_eq!(harness.formatter.mounts.lock().unwrap().len(), 1);
}

#[test]
fn test_paranoid_passes_in_order() {
    let mock = MockDrive::removable(64 * 1024).unwrap();
    let harness = Harness::new();

    let report = harness.run(
        request(&mock, WipeMode::Paranoid).with_passes(5),
        &[mock.record()],
    );

    assert!(report.outcome.is_success(), "{:?}", report.outcome);
    assert_eq!(
        harness.sink.phases(),
        vec!["Pass 1/5", "Pass 2/5", "Pass 3/5", "Pass 4/5", "Pass 5/5", "Format"]
    );
    assert_eq!(report.session.total_bytes_written, 5 * mock.size_bytes());
    assert_eq!(harness.formatter.format_count(), 1);

    // Round 5 is the random round
    assert!(entropy(&mock.contents()) > 7.0);
}

#[test]
fn test_progress_is_monotonic_within_a_pass() {
    let mock = MockDrive::removable(64 * 1024).unwrap();
    let harness = Harness::new();

    harness.run(
        request(&mock, WipeMode::Paranoid).with_passes(2),
        &[mock.record()],
    );

    for phase in ["Pass 1/2", "Pass 2/2"] {
        let percentages: Vec<f64> = harness
            .sink
            .progress()
            .into_iter()
            .filter(|p| p.phase == phase)
            .map(|p| p.percentage)
            .collect();

        assert!(percentages.windows(2).all(|w| w[0] <= w[1]), "{:?}", percentages);
        assert_eq!(percentages.last().copied(), Some(100.0));
    }
}

#[test]
fn test_legacy_fast_zeroes_leading_window() {
    let mock = MockDrive::removable(64 * 1024).unwrap();
    let harness = Harness::new();
    let window = test_settings().metadata_window_bytes as usize;

    let report = harness.run(request(&mock, WipeMode::LegacyFast), &[mock.record()]);

    assert!(report.outcome.is_success());
    let contents = mock.contents();
    assert!(all_bytes_are(&contents[..window], 0x00));
    assert!(all_bytes_are(&contents[window..], STALE_BYTE));
    assert_eq!(report.session.total_bytes_written, window as u64);
}

#[test]
fn test_legacy_fast_window_capped_at_capacity() {
    let mock = MockDrive::removable(8 * 1024).unwrap();
    let harness = Harness::new();

    let report = harness.run(request(&mock, WipeMode::LegacyFast), &[mock.record()]);

    assert!(report.outcome.is_success());
    assert_eq!(report.session.total_bytes_written, 8 * 1024);
    assert!(verify_all_zeros(mock.path()).unwrap());
}

#[test]
fn test_cancellation_stops_at_chunk_boundary() {
    let mock = MockDrive::removable(64 * 1024).unwrap();
    let cancel = CancellationToken::new();
    let harness = Harness::with_sink(RecordingSink::cancelling_on("Pass 2/5", cancel.clone()), cancel);
    let chunk = test_settings().chunk_size as u64;

    let report = harness.run(
        request(&mock, WipeMode::Paranoid).with_passes(5),
        &[mock.record()],
    );

    assert_eq!(report.exit_code(), EXIT_CANCELLED);
    assert_eq!(report.session.state, WipeState::Cancelled);
    assert!(report.session.cancellation_requested);
    assert_eq!(report.session.current_pass, 2);
    assert!(report.session.bytes_written_in_pass > 0);
    assert_eq!(report.session.bytes_written_in_pass % chunk, 0);
    assert!(report.session.bytes_written_in_pass < mock.size_bytes());
    assert_eq!(harness.formatter.format_count(), 0, "No format after cancellation");

    assert_eq!(
        harness.sink.events().last(),
        Some(&WipeEvent::status("cancelled"))
    );
    assert!(!harness.sink.phases().contains(&"Pass 3/5".to_string()));
}

#[test]
fn test_system_volume_refused_untouched() {
    let mock = MockDrive::system_volume(16 * 1024).unwrap();
    let harness = Harness::new();

    let report = harness.run(request(&mock, WipeMode::Paranoid), &[mock.record()]);

    assert_eq!(report.exit_code(), 2);
    assert_eq!(report.session.state, WipeState::Failed);

    let events = harness.sink.events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        WipeEvent::Error { message } => assert!(message.starts_with("refused: system volume")),
        other => panic!("expected error event, got {:?}", other),
    }
    assert!(all_bytes_are(&mock.contents(), STALE_BYTE));
    assert_eq!(harness.formatter.format_count(), 0);
}

#[test]
fn test_passes_out_of_range_refused() {
    let mock = MockDrive::removable(16 * 1024).unwrap();
    let harness = Harness::new();

    let report = harness.run(
        request(&mock, WipeMode::Paranoid).with_passes(11),
        &[mock.record()],
    );

    assert_eq!(report.exit_code(), 2);
    assert_eq!(report.session.total_bytes_written, 0);
    assert!(all_bytes_are(&mock.contents(), STALE_BYTE));
}

#[test]
fn test_dry_run_writes_nothing() {
    let mock = MockDrive::removable(16 * 1024).unwrap();
    let harness = Harness::new();

    let report = harness.run(
        request(&mock, WipeMode::Secure).dry_run(true),
        &[mock.record()],
    );

    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.session.total_bytes_written, 0);
    assert_eq!(harness.formatter.format_count(), 0);
    assert!(harness.sink.progress().is_empty());
    assert!(harness
        .sink
        .statuses()
        .iter()
        .any(|m| m.starts_with("dry run:")));
    assert!(all_bytes_are(&mock.contents(), STALE_BYTE));
}

#[test]
fn test_format_failure_exit_code() {
    let mock = MockDrive::removable(16 * 1024).unwrap();
    let harness = Harness {
        formatter: Arc::new(RecordingFormatter::failing("mkfs.ext4: bad superblock")),
        ..Harness::new()
    };

    let report = harness.run(request(&mock, WipeMode::LegacyFast), &[mock.record()]);

    assert_eq!(report.exit_code(), 5);
    match harness.sink.events().last() {
        Some(WipeEvent::Error { message }) => assert!(message.contains("bad superblock")),
        other => panic!("expected error event, got {:?}", other),
    }
}

#[test]
fn test_label_forwarded_to_formatter() {
    let mock = MockDrive::removable(16 * 1024).unwrap();
    let harness = Harness::new();

    harness.run(
        WipeRequest::new(mock.path_str(), WipeMode::Quick, Filesystem::Exfat).with_label("BACKUP"),
        &[mock.record()],
    );

    let formats = harness.formatter.formats.lock().unwrap();
    assert_eq!(formats.len(), 1);
    assert_eq!(formats[0].1, Filesystem::Exfat);
    assert_eq!(formats[0].2.as_deref(), Some("BACKUP"));
}

#[test]
fn test_mounted_target_unmounted_first() {
    let mock = MockDrive::removable(16 * 1024).unwrap();
    let mut record = mock.record();
    record.mount_point = Some("/media/mock".to_string());
    let harness = Harness::new();

    let report = harness.run(request(&mock, WipeMode::Quick), &[record]);

    assert!(report.outcome.is_success());
    assert_eq!(
        harness.formatter.unmounts.lock().unwrap().first().map(String::as_str),
        Some("/media/mock")
    );
    assert_eq!(harness.sink.statuses()[0], "unmounting /media/mock");
}

/// Starts a second default session on the same target at the first progress event
struct OverlappingSession {
    request: WipeRequest,
    drives: Vec<DriveRecord>,
    second_exit: Mutex<Option<i32>>,
}

impl EventSink for OverlappingSession {
    fn emit(&self, event: WipeEvent) {
        if !matches!(event, WipeEvent::Progress(_)) {
            return;
        }
        let mut slot = self.second_exit.lock().unwrap();
        if slot.is_none() {
            let report = WipeOrchestrator::new(self.request.clone(), test_settings())
                .with_formatter(Arc::new(RecordingFormatter::default()))
                .execute(&self.drives);
            *slot = Some(report.exit_code());
        }
    }
}

#[test]
fn test_second_default_session_on_same_target_refused() {
    let mock = MockDrive::removable(32 * 1024).unwrap();
    let wipe = request(&mock, WipeMode::Paranoid).with_passes(2);
    let sink = Arc::new(OverlappingSession {
        request: wipe.clone(),
        drives: vec![mock.record()],
        second_exit: Mutex::new(None),
    });

    let report = WipeOrchestrator::new(wipe.clone(), test_settings())
        .with_formatter(Arc::new(RecordingFormatter::default()))
        .with_reporter(sink.clone())
        .execute(&[mock.record()]);

    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.session.total_bytes_written, 2 * mock.size_bytes());
    assert_eq!(*sink.second_exit.lock().unwrap(), Some(2), "Busy target is a validation failure");

    // Lease is gone once the first session ends
    let again = WipeOrchestrator::new(wipe.dry_run(true), test_settings()).execute(&[mock.record()]);
    assert_eq!(again.exit_code(), 0);
}

#[cfg(target_os = "linux")]
#[test]
fn test_write_failure_ends_session_without_format() {
    if !std::path::Path::new("/dev/full").exists() {
        return;
    }
    let record = DriveRecord {
        path: "/dev/full".to_string(),
        label: "FULL".to_string(),
        filesystem_type: String::new(),
        total_bytes: 64 * 1024,
        is_system_volume: false,
        is_removable: true,
        mount_point: None,
        parent_device: None,
    };
    let harness = Harness::new();
    let chunk = test_settings().chunk_size as u64;

    let report = harness.run(
        WipeRequest::new("/dev/full", WipeMode::Paranoid, Filesystem::Ext4).with_passes(2),
        &[record],
    );

    assert_eq!(report.session.state, WipeState::Failed);
    assert_eq!(report.exit_code(), 4);
    assert_eq!(report.session.current_pass, 1);
    assert_eq!(report.session.bytes_written_in_pass % chunk, 0);
    assert_eq!(harness.formatter.format_count(), 0);

    match harness.sink.events().last() {
        Some(WipeEvent::Error { message }) => {
            assert!(message.contains("/dev/full"), "{}", message);
            assert!(message.contains("offset"), "{}", message);
        }
        other => panic!("expected error event, got {:?}", other),
    }
}

#[test]
fn test_distinct_targets_wipe_concurrently() {
    let first = MockDrive::removable(32 * 1024).unwrap();
    let second = MockDrive::removable(32 * 1024).unwrap();
    let drives = vec![first.record(), second.record()];
    let guard = SafetyGuard::default();

    let handles: Vec<_> = [first.path_str().to_string(), second.path_str().to_string()]
        .into_iter()
        .map(|path| {
            let drives = drives.clone();
            let guard = guard.clone();
            thread::spawn(move || {
                WipeOrchestrator::new(
                    WipeRequest::new(path, WipeMode::Paranoid, Filesystem::Ext4).with_passes(1),
                    test_settings(),
                )
                .with_guard(guard)
                .with_formatter(Arc::new(RecordingFormatter::default()))
                .execute(&drives)
                .exit_code()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 0);
    }
    assert!(all_bytes_are(&first.contents(), 0x55));
    assert!(all_bytes_are(&second.contents(), 0x55));
}

#[test]
fn test_json_event_stream_shape() {
    let mock = MockDrive::removable(16 * 1024).unwrap();
    let reporter = Arc::new(JsonLineReporter::new(Vec::new()));

    let report = WipeOrchestrator::new(
        request(&mock, WipeMode::Paranoid).with_passes(1),
        test_settings(),
    )
    .with_formatter(Arc::new(RecordingFormatter::default()))
    .with_reporter(reporter.clone())
    .execute(&[mock.record()]);
    assert!(report.outcome.is_success());

    let bytes = Arc::try_unwrap(reporter)
        .ok()
        .expect("orchestrator dropped its reporter")
        .into_inner();
    let text = String::from_utf8(bytes).unwrap();

    let events: Vec<Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(!events.is_empty());

    for event in &events {
        match event["type"].as_str() {
            Some("progress") => {
                let keys: Vec<&str> = event.as_object().unwrap().keys().map(String::as_str).collect();
                assert_eq!(keys.len(), 5, "{:?}", keys);
                assert!(event["percentage"].as_f64().unwrap() <= 100.0);
                assert!(event["speed"].as_str().unwrap().ends_with("/s"));
                assert!(event["eta"].is_string());
            }
            Some("status") | Some("error") => assert!(event["message"].is_string()),
            other => panic!("unexpected event type {:?}", other),
        }
    }

    assert_eq!(events.last().unwrap()["message"], "completed");
}
