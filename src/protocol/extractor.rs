use super::decoder::is_progress_line;
use crate::error::{FailureKind, OperationFailure, OperationOutcome};
use serde_json::Value;

/// Drop protocol lines; whatever remains is diagnostics and payload.
pub fn strip_progress_lines(stdout: &str) -> String {
    stdout
        .lines()
        .filter(|line| !is_progress_line(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Recover the JSON object from cleaned stdout.
///
/// Tries the whole text first, then the suffix starting at the last `{`.
/// Earlier braces are never tried: diagnostics may contain stray `{`.
pub fn extract_payload(cleaned: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        if value.is_object() {
            return Some(value);
        }
    }

    let last_brace = cleaned.rfind('{')?;
    let tail = cleaned[last_brace..].trim();
    match serde_json::from_str::<Value>(tail) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

/// Turn a finished process's output into a typed outcome.
pub fn extract_outcome(stdout: &str, stderr: &str, exit_code: i32) -> OperationOutcome<Value> {
    if exit_code != 0 {
        let message = if stderr.trim().is_empty() {
            format!("Engine exited with code {}", exit_code)
        } else {
            stderr.trim().to_string()
        };
        return OperationOutcome::Failure(
            OperationFailure::new(FailureKind::NonZeroExit, message)
                .with_raw_output(stdout)
                .with_exit_code(Some(exit_code)),
        );
    }

    let cleaned = strip_progress_lines(stdout);
    match extract_payload(&cleaned) {
        Some(payload) => OperationOutcome::success(payload),
        None => {
            tracing::debug!(bytes = stdout.len(), "No JSON payload in engine output");
            OperationOutcome::Failure(
                OperationFailure::new(FailureKind::ParseError, "Failed to parse engine result JSON")
                    .with_raw_output(stdout)
                    .with_exit_code(Some(exit_code)),
            )
        }
    }
}
