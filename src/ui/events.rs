// Engine event protocol
//
// Events go to an `EventSink`. The binary writes them as one JSON object per line;
// embedders can receive them as typed values over a channel instead.

use super::progress::{format_eta, format_speed};
use crate::DriveRecord;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub phase: String,
    pub percentage: f64,
    pub speed: String,
    pub eta: String,
    #[serde(skip)]
    pub bytes_per_second: u64,
    #[serde(skip)]
    pub eta_seconds: Option<u64>,
}

impl ProgressUpdate {
    pub fn new(
        phase: impl Into<String>,
        percentage: f64,
        bytes_per_second: u64,
        eta_seconds: Option<u64>,
    ) -> Self {
        Self {
            phase: phase.into(),
            percentage,
            speed: format_speed(bytes_per_second),
            eta: format_eta(eta_seconds),
            bytes_per_second,
            eta_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WipeEvent {
    Progress(ProgressUpdate),
    Status { message: String },
    Error { message: String },
    Drives { items: Vec<DriveRecord> },
}

impl WipeEvent {
    pub fn status(message: impl Into<String>) -> Self {
        WipeEvent::Status {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        WipeEvent::Error {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WipeEvent::Progress(_) => "progress",
            WipeEvent::Status { .. } => "status",
            WipeEvent::Error { .. } => "error",
            WipeEvent::Drives { .. } => "drives",
        }
    }

    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Destination for engine events. Emitting must not block beyond the write itself.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: WipeEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl EventSink for NullReporter {
    fn emit(&self, _event: WipeEvent) {}
}

/// Writes one JSON object per line
pub struct JsonLineReporter<W: Write + Send> {
    out: Mutex<W>,
}

impl JsonLineReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonLineReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_event(&self, event: &WipeEvent) -> io::Result<()> {
        let line = event.to_json_line()?;
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(out, "{}", line)?;
        out.flush()
    }
}

impl<W: Write + Send> EventSink for JsonLineReporter<W> {
    fn emit(&self, event: WipeEvent) {
        if let Err(e) = self.write_event(&event) {
            log::warn!("Failed to write {} event: {}", event.kind(), e);
        }
    }
}

/// Forwards events over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: UnboundedSender<WipeEvent>,
}

impl ChannelReporter {
    pub fn new() -> (Self, UnboundedReceiver<WipeEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelReporter {
    fn emit(&self, event: WipeEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("Event receiver dropped");
        }
    }
}
