use super::pattern::PassPattern;
use crate::settings::EngineSettings;
use crate::{WipeMode, WipeRequest};
use std::fmt;

/// How much of the target an overwrite covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent {
    FullDevice,
    /// First N bytes, capped at the target's capacity
    Leading(u64),
}

impl Extent {
    pub fn resolve(&self, capacity: u64) -> u64 {
        match *self {
            Extent::FullDevice => capacity,
            Extent::Leading(bytes) => bytes.min(capacity),
        }
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extent::FullDevice => f.write_str("full device"),
            Extent::Leading(bytes) => write!(f, "first {} bytes", bytes),
        }
    }
}

/// One step of a wipe. Steps that write bytes carry the pass number the session
/// reports while they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WipeStep {
    ReleaseAllocation,
    Overwrite {
        pass: u32,
        total_passes: u32,
        pattern: PassPattern,
        extent: Extent,
    },
    Format {
        final_format: bool,
    },
    FillFreeSpace {
        pass: u32,
        total_passes: u32,
        pattern: PassPattern,
    },
}

impl WipeStep {
    /// (pass, total) for steps that run in the `Wiping` state
    pub fn wiping_pass(&self) -> Option<(u32, u32)> {
        match *self {
            WipeStep::ReleaseAllocation => Some((1, 1)),
            WipeStep::Overwrite {
                pass, total_passes, ..
            }
            | WipeStep::FillFreeSpace {
                pass, total_passes, ..
            } => Some((pass, total_passes)),
            WipeStep::Format { .. } => None,
        }
    }

    pub fn is_format(&self) -> bool {
        matches!(self, WipeStep::Format { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    /// Label carried by progress events of this step
    pub phase: String,
    pub step: WipeStep,
}

impl PlannedStep {
    fn new(phase: impl Into<String>, step: WipeStep) -> Self {
        Self {
            phase: phase.into(),
            step,
        }
    }

    /// Milestone text announced when the step begins
    pub fn start_message(&self) -> String {
        match &self.step {
            WipeStep::ReleaseAllocation => "releasing allocation".to_string(),
            WipeStep::Overwrite {
                pattern, extent, ..
            } => format!("{}: writing {} over {}", self.phase, pattern, extent),
            WipeStep::Format { final_format: true } => {
                format!("{}: creating filesystem", self.phase)
            }
            WipeStep::Format { final_format: false } => format!(
                "{}: creating scratch filesystem for the free-space fill",
                self.phase
            ),
            WipeStep::FillFreeSpace { pattern, .. } => {
                format!("{}: writing {} into free space", self.phase, pattern)
            }
        }
    }
}

/// Fixed step sequence for one mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WipePlan {
    mode: WipeMode,
    steps: Vec<PlannedStep>,
}

impl WipePlan {
    pub fn new(mode: WipeMode, passes: u32, metadata_window: u64) -> Self {
        let steps = match mode {
            WipeMode::Quick => vec![
                PlannedStep::new("Release allocation", WipeStep::ReleaseAllocation),
                PlannedStep::new("Format", WipeStep::Format { final_format: true }),
            ],
            WipeMode::Secure => vec![
                PlannedStep::new(
                    "Overwrite",
                    WipeStep::Overwrite {
                        pass: 1,
                        total_passes: 2,
                        pattern: PassPattern::SECURE,
                        extent: Extent::FullDevice,
                    },
                ),
                PlannedStep::new("Format", WipeStep::Format { final_format: false }),
                PlannedStep::new(
                    "Free-space fill",
                    WipeStep::FillFreeSpace {
                        pass: 2,
                        total_passes: 2,
                        pattern: PassPattern::Random,
                    },
                ),
                PlannedStep::new("Final format", WipeStep::Format { final_format: true }),
            ],
            WipeMode::Paranoid => {
                let mut steps: Vec<PlannedStep> = (1..=passes)
                    .map(|pass| {
                        PlannedStep::new(
                            format!("Pass {}/{}", pass, passes),
                            WipeStep::Overwrite {
                                pass,
                                total_passes: passes,
                                pattern: PassPattern::for_paranoid_round(pass),
                                extent: Extent::FullDevice,
                            },
                        )
                    })
                    .collect();
                steps.push(PlannedStep::new(
                    "Format",
                    WipeStep::Format { final_format: true },
                ));
                steps
            }
            WipeMode::LegacyFast => vec![
                PlannedStep::new(
                    "Metadata overwrite",
                    WipeStep::Overwrite {
                        pass: 1,
                        total_passes: 1,
                        pattern: PassPattern::ZERO,
                        extent: Extent::Leading(metadata_window),
                    },
                ),
                PlannedStep::new("Format", WipeStep::Format { final_format: true }),
            ],
        };

        Self { mode, steps }
    }

    pub fn for_request(request: &WipeRequest, settings: &EngineSettings) -> Self {
        Self::new(request.mode, request.passes, settings.metadata_window_bytes)
    }

    pub fn mode(&self) -> WipeMode {
        self.mode
    }

    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    pub fn overwrite_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.step, WipeStep::Overwrite { .. }))
            .count()
    }

    pub fn format_count(&self) -> usize {
        self.steps.iter().filter(|s| s.step.is_format()).count()
    }
}
