/// Failure classification for Engine operations
///
/// Each failure kind dictates what the user sees and whether a retry makes
/// sense. Wipe failures are never silently dropped: the coordinator still
/// turns them into a (failed) clearance report.
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Executable missing or unstartable
    SpawnError,

    /// Engine ran and signaled failure (non-zero exit or killed by a signal)
    NonZeroExit,

    /// Exit 0 but no extractable payload on stdout
    ParseError,

    /// Companion script or resource absent on disk, checked before spawn
    NotFound,

    /// Elevation required and not obtainable
    PermissionDenied,

    /// Exit 0, but the payload reports failure or lacks a required field
    EngineRejected,
}

impl FailureKind {
    /// Get human-readable description of the failure kind
    pub fn description(&self) -> &'static str {
        match self {
            FailureKind::SpawnError => "Engine could not be started",
            FailureKind::NonZeroExit => "Engine reported failure",
            FailureKind::ParseError => "Engine output contained no result",
            FailureKind::NotFound => "Engine component missing on disk",
            FailureKind::PermissionDenied => "Administrator rights required",
            FailureKind::EngineRejected => "Engine result was rejected",
        }
    }

    /// Whether re-running the same request can reasonably succeed.
    ///
    /// Missing components and permission problems need operator action first.
    pub fn allows_retry(&self) -> bool {
        matches!(
            self,
            FailureKind::NonZeroExit | FailureKind::ParseError | FailureKind::EngineRejected
        )
    }

    /// Spawn-time failures mean nothing ran at all.
    pub fn engine_ran(&self) -> bool {
        !matches!(
            self,
            FailureKind::SpawnError | FailureKind::NotFound | FailureKind::PermissionDenied
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::SpawnError => write!(f, "SpawnError"),
            FailureKind::NonZeroExit => write!(f, "NonZeroExit"),
            FailureKind::ParseError => write!(f, "ParseError"),
            FailureKind::NotFound => write!(f, "NotFound"),
            FailureKind::PermissionDenied => write!(f, "PermissionDenied"),
            FailureKind::EngineRejected => write!(f, "EngineRejected"),
        }
    }
}

/// A failed operation together with whatever the Engine printed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationFailure {
    pub kind: FailureKind,

    /// stderr text for `NonZeroExit`, a short explanation otherwise
    pub message: String,

    /// Full stdout, kept for diagnosis
    #[serde(default)]
    pub raw_output: String,

    /// Exit code when the process ran to completion
    #[serde(default)]
    pub exit_code: Option<i32>,
}

impl OperationFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            raw_output: String::new(),
            exit_code: None,
        }
    }

    pub fn with_raw_output(mut self, raw_output: impl Into<String>) -> Self {
        self.raw_output = raw_output.into();
        self
    }

    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    /// Message suitable for an inline error line.
    pub fn user_message(&self) -> String {
        let detail = self.message.trim();
        if detail.is_empty() {
            self.kind.description().to_string()
        } else {
            format!("{}: {}", self.kind.description(), detail)
        }
    }
}

impl fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.user_message())
    }
}

impl std::error::Error for OperationFailure {}
