/// Engine failure taxonomy and the typed outcome every Engine invocation
/// resolves to.
///
/// The orchestrator never returns a Rust error for a subprocess problem.
/// Spawn failures, non-zero exits, unparseable output and missing companion
/// scripts all become `OperationOutcome::Failure`, so callers can render a
/// result without matching on `std::io::Error` variants.
///
/// ```text
/// spawn ──┬─ missing script ─────────────→ Failure{NotFound}
///         ├─ spawn error ────────────────→ Failure{SpawnError}
///         └─ exit ─┬─ code != 0 / signal ─→ Failure{NonZeroExit}
///                  └─ code == 0 ─┬─ no payload ─→ Failure{ParseError}
///                                └─ payload ───→ Success{payload}
/// ```
pub mod classification;

pub use classification::{FailureKind, OperationFailure};

use serde::{Deserialize, Serialize};

/// Result of one Engine invocation (or of a host-side operation that follows
/// the same contract).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationOutcome<T> {
    Success { payload: T },
    Failure(OperationFailure),
}

impl<T> OperationOutcome<T> {
    pub fn success(payload: T) -> Self {
        OperationOutcome::Success { payload }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        OperationOutcome::Failure(OperationFailure::new(kind, message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationOutcome::Success { .. })
    }

    pub fn payload(&self) -> Option<&T> {
        match self {
            OperationOutcome::Success { payload } => Some(payload),
            OperationOutcome::Failure(_) => None,
        }
    }

    pub fn failure_ref(&self) -> Option<&OperationFailure> {
        match self {
            OperationOutcome::Success { .. } => None,
            OperationOutcome::Failure(failure) => Some(failure),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationOutcome<U> {
        match self {
            OperationOutcome::Success { payload } => OperationOutcome::success(f(payload)),
            OperationOutcome::Failure(failure) => OperationOutcome::Failure(failure),
        }
    }

    /// Chain a conversion that may itself reject the payload.
    pub fn and_then<U>(
        self,
        f: impl FnOnce(T) -> Result<U, OperationFailure>,
    ) -> OperationOutcome<U> {
        match self {
            OperationOutcome::Success { payload } => match f(payload) {
                Ok(converted) => OperationOutcome::success(converted),
                Err(failure) => OperationOutcome::Failure(failure),
            },
            OperationOutcome::Failure(failure) => OperationOutcome::Failure(failure),
        }
    }

    pub fn into_result(self) -> Result<T, OperationFailure> {
        match self {
            OperationOutcome::Success { payload } => Ok(payload),
            OperationOutcome::Failure(failure) => Err(failure),
        }
    }
}
