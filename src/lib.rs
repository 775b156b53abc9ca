// Allow complex types where needed for channel and outcome plumbing
#![allow(clippy::type_complexity)]

pub mod coordinator;
pub mod drives;
pub mod elevation;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod report;
pub mod settings;
pub mod ui;

// Re-export the main entry points for convenience
pub use coordinator::{Confirmation, FreeSpaceOffer, OperationCoordinator};
pub use engine::{EngineCommand, ProcessOrchestrator};
pub use error::{FailureKind, OperationFailure, OperationOutcome};
pub use protocol::{ProgressDecoder, ProgressEvent};
pub use report::{ClearanceReport, ReportKind};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Number of irreversible operations currently running.
#[derive(Debug, Default)]
pub struct InFlightCounter {
    active: AtomicUsize,
}

impl InFlightCounter {
    pub const fn new() -> Self {
        Self {
            active: AtomicUsize::new(0),
        }
    }

    pub fn enter(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    pub fn leave(&self) {
        // Saturate at zero so an unmatched leave cannot wrap
        let _ = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.count() > 0
    }
}

static DESTRUCTIVE_IN_FLIGHT: InFlightCounter = InFlightCounter::new();

/// Check whether any wipe or delete is currently running
pub fn is_destructive_in_flight() -> bool {
    DESTRUCTIVE_IN_FLIGHT.is_active()
}

/// Counts as one running destructive operation for as long as it lives.
pub struct DestructiveGuard {
    _private: (),
}

impl DestructiveGuard {
    pub fn acquire() -> Self {
        DESTRUCTIVE_IN_FLIGHT.enter();
        Self { _private: () }
    }
}

impl Drop for DestructiveGuard {
    fn drop(&mut self) {
        DESTRUCTIVE_IN_FLIGHT.leave();
    }
}

/// Host-side errors. Engine failures never surface here; they are
/// `OperationOutcome::Failure` values instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation slot busy: {0}")]
    Busy(String),

    #[error("Current clearance report has not been exported or discarded")]
    ReportPending,

    #[error("No files selected")]
    NothingSelected,

    #[error("Free-space wipe offer no longer matches the current report")]
    OfferExpired,

    #[error("No clearance report available")]
    NoReport,

    #[error("No scan results available")]
    NoScan,

    #[error("Privilege elevation failed: {0}")]
    Elevation(String),
}

impl From<settings::SettingsError> for PipelineError {
    fn from(err: settings::SettingsError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Erasure intensity tier passed to the Engine as `--level <N>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum WipeLevel {
    /// Removable media, single overwrite pass
    Removable,
    /// Internal non-OS volume, standard purge
    Purge,
    /// Mounted OS volume, in-place clearing
    OsVolumeClear,
    /// Space vacated by deleted files only
    FreeSpace,
}

impl WipeLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            WipeLevel::Removable => 1,
            WipeLevel::Purge => 2,
            WipeLevel::OsVolumeClear => 3,
            WipeLevel::FreeSpace => 5,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            WipeLevel::Removable => "Removable media overwrite",
            WipeLevel::Purge => "Internal volume purge",
            WipeLevel::OsVolumeClear => "OS volume in-place clear",
            WipeLevel::FreeSpace => "Free-space wipe",
        }
    }
}

impl From<WipeLevel> for u8 {
    fn from(level: WipeLevel) -> Self {
        level.as_u8()
    }
}

impl TryFrom<u8> for WipeLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(WipeLevel::Removable),
            2 => Ok(WipeLevel::Purge),
            3 => Ok(WipeLevel::OsVolumeClear),
            5 => Ok(WipeLevel::FreeSpace),
            other => Err(format!("unsupported wipe level {}", other)),
        }
    }
}

impl fmt::Display for WipeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Level {}", self.as_u8())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WipePattern {
    #[default]
    Zeros,
    Random,
}

impl WipePattern {
    pub fn as_str(self) -> &'static str {
        match self {
            WipePattern::Zeros => "zeros",
            WipePattern::Random => "random",
        }
    }
}

impl fmt::Display for WipePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WipePattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zeros" | "zero" => Ok(WipePattern::Zeros),
            "random" => Ok(WipePattern::Random),
            other => Err(format!("unknown pattern '{}' (expected zeros or random)", other)),
        }
    }
}

/// What kind of work occupies an operation slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Scan,
    Delete,
    Wipe,
}

impl OperationKind {
    /// Two operations on the same drive may overlap only when both are scans.
    pub fn conflicts_with(self, other: OperationKind) -> bool {
        !(self == OperationKind::Scan && other == OperationKind::Scan)
    }

    pub fn is_destructive(self) -> bool {
        matches!(self, OperationKind::Delete | OperationKind::Wipe)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Scan => write!(f, "scan"),
            OperationKind::Delete => write!(f, "delete"),
            OperationKind::Wipe => write!(f, "wipe"),
        }
    }
}
