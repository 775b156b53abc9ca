// Clearance reports
//
// - mod.rs: the report schema and the aggregator that builds it from an
//   operation outcome
// - export.rs: JSON export envelopes for reports and scans
// - certificate.rs: human-readable certificate with digest and signature

pub mod certificate;
pub mod export;


pub use certificate::{CertificateGenerator, ClearanceCertificate};
pub use export::{ClearanceExport, ScanExport, SystemInfo};

use crate::drives::file_name_of;
use crate::error::{FailureKind, OperationFailure, OperationOutcome};
use crate::{WipeLevel, WipePattern};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Operation a report documents. Serialized as `delete_selected` or
/// `level_<N>_wipe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ReportKind {
    DeleteSelected,
    Wipe(WipeLevel),
}

impl ReportKind {
    pub fn is_wipe(self) -> bool {
        matches!(self, ReportKind::Wipe(_))
    }

    pub fn level(self) -> Option<WipeLevel> {
        match self {
            ReportKind::Wipe(level) => Some(level),
            ReportKind::DeleteSelected => None,
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportKind::DeleteSelected => write!(f, "delete_selected"),
            ReportKind::Wipe(level) => write!(f, "level_{}_wipe", level.as_u8()),
        }
    }
}

impl From<ReportKind> for String {
    fn from(kind: ReportKind) -> Self {
        kind.to_string()
    }
}

impl TryFrom<String> for ReportKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == "delete_selected" {
            return Ok(ReportKind::DeleteSelected);
        }
        let level = value
            .strip_prefix("level_")
            .and_then(|rest| rest.strip_suffix("_wipe"))
            .and_then(|n| n.parse::<u8>().ok())
            .ok_or_else(|| format!("unknown report operation '{}'", value))?;
        WipeLevel::try_from(level).map(ReportKind::Wipe)
    }
}

/// Result for one file of a delete batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub path: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileOutcome {
    pub fn deleted(path: &str, size: u64) -> Self {
        Self {
            path: path.to_string(),
            name: file_name_of(path),
            size,
            success: true,
            error: None,
        }
    }

    pub fn failed(path: &str, size: u64, error: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            name: file_name_of(path),
            size,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Bytes cleared under one folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRollup {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub files: u64,
}

/// The single clearance artifact of an operation.
///
/// Numeric fields are always present (zero when unknown) so exporters never
/// branch on operation kind beyond choosing sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearanceReport {
    pub id: Uuid,
    pub operation: ReportKind,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub drive: Option<String>,
    pub bytes_written: u64,
    pub files_created: u64,
    pub pattern: Option<WipePattern>,
    pub total: u64,
    pub deleted: u64,
    pub failed: u64,
    pub items: Vec<FileOutcome>,
    pub folders: Vec<FolderRollup>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    /// Delete report this one replaced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<Uuid>,
}

impl ClearanceReport {
    pub fn is_wipe(&self) -> bool {
        self.operation.is_wipe()
    }

    pub fn failed_items(&self) -> impl Iterator<Item = &FileOutcome> {
        self.items.iter().filter(|i| !i.success)
    }
}

/// What the aggregator needs beyond the outcome itself.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub kind: ReportKind,
    pub started_at: DateTime<Utc>,
    pub drive: Option<String>,
    /// Pattern passed to the Engine; used when the payload omits one
    pub requested_pattern: Option<WipePattern>,
    pub supersedes: Option<Uuid>,
}

impl ReportContext {
    pub fn delete(started_at: DateTime<Utc>) -> Self {
        Self {
            kind: ReportKind::DeleteSelected,
            started_at,
            drive: None,
            requested_pattern: None,
            supersedes: None,
        }
    }

    pub fn wipe(level: WipeLevel, drive: &str, pattern: WipePattern, started_at: DateTime<Utc>) -> Self {
        Self {
            kind: ReportKind::Wipe(level),
            started_at,
            drive: Some(drive.to_string()),
            requested_pattern: Some(pattern),
            supersedes: None,
        }
    }

    pub fn superseding(mut self, report: Uuid) -> Self {
        self.supersedes = Some(report);
        self
    }
}

/// Validated statistics of a wipe that really happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WipeStats {
    pub bytes_written: u64,
    pub files_created: u64,
    pub pattern: WipePattern,
    pub duration_seconds: Option<f64>,
    pub folders: Vec<FolderRollup>,
}

fn as_u64(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Turn a raw wipe outcome into typed statistics.
///
/// A success without `bytes_written`, or one whose payload says
/// `success: false`, is not a success.
pub fn validate_wipe(
    outcome: &OperationOutcome<Value>,
    requested: WipePattern,
) -> OperationOutcome<WipeStats> {
    outcome.clone().and_then(|payload| {
        if payload.get("success").and_then(Value::as_bool) == Some(false) {
            let message = payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("Engine reported an unsuccessful wipe");
            return Err(OperationFailure::new(FailureKind::EngineRejected, message)
                .with_raw_output(payload.to_string()));
        }

        let bytes_written = as_u64(payload.get("bytes_written")).ok_or_else(|| {
            OperationFailure::new(
                FailureKind::EngineRejected,
                "Wipe result is missing bytes_written",
            )
            .with_raw_output(payload.to_string())
        })?;

        let pattern = payload
            .get("pattern")
            .and_then(Value::as_str)
            .and_then(|p| p.parse().ok())
            .unwrap_or(requested);

        Ok(WipeStats {
            bytes_written,
            files_created: as_u64(payload.get("files_created")).unwrap_or(0),
            pattern,
            duration_seconds: payload.get("duration_seconds").and_then(Value::as_f64),
            folders: folder_rollups(&payload),
        })
    })
}

/// Folder rollups from a wipe payload: its own `folders` list when present,
/// otherwise grouped from a `files` list by parent directory.
pub fn folder_rollups(payload: &Value) -> Vec<FolderRollup> {
    if let Some(folders) = payload.get("folders").and_then(Value::as_array) {
        return folders
            .iter()
            .filter_map(|f| {
                let path = f.get("path").and_then(Value::as_str)?.to_string();
                let name = f
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| file_name_of(&path));
                Some(FolderRollup {
                    name,
                    size_bytes: as_u64(f.get("size_bytes").or_else(|| f.get("size"))).unwrap_or(0),
                    files: as_u64(f.get("files")).unwrap_or(0),
                    path,
                })
            })
            .collect();
    }

    let Some(files) = payload.get("files").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut grouped: BTreeMap<String, FolderRollup> = BTreeMap::new();
    for file in files {
        let Some(path) = file.get("path").and_then(Value::as_str) else {
            continue;
        };
        let parent = parent_of(path);
        let entry = grouped.entry(parent.clone()).or_insert_with(|| FolderRollup {
            name: file_name_of(&parent),
            path: parent.clone(),
            size_bytes: 0,
            files: 0,
        });
        entry.size_bytes += as_u64(file.get("size")).unwrap_or(0);
        entry.files += 1;
    }
    grouped.into_values().collect()
}

fn parent_of(path: &str) -> String {
    let trimmed = path.trim_end_matches(['/', '\\']);
    match trimmed.rfind(['/', '\\']) {
        Some(0) => trimmed[..1].to_string(),
        Some(idx) => {
            let parent = &trimmed[..idx];
            // Keep the separator on bare drive roots ("C:" -> "C:\")
            if parent.len() == 2 && parent.ends_with(':') {
                trimmed[..=idx].to_string()
            } else {
                parent.to_string()
            }
        }
        None => String::new(),
    }
}

fn delete_items(payload: &Value) -> Vec<FileOutcome> {
    payload
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<FileOutcome>(item.clone()).ok())
                .map(|mut item| {
                    if item.name.is_empty() {
                        item.name = file_name_of(&item.path);
                    }
                    item
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_time(payload: &Value, key: &str) -> Option<DateTime<Utc>> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Normalize any operation outcome into a [`ClearanceReport`].
///
/// Never fails: a failed operation yields a report with `success: false` and
/// zeroed counts.
pub fn to_report(outcome: &OperationOutcome<Value>, context: &ReportContext) -> ClearanceReport {
    let now = Utc::now();
    let mut report = ClearanceReport {
        id: Uuid::new_v4(),
        operation: context.kind,
        started_at: context.started_at,
        completed_at: now,
        drive: context.drive.clone(),
        bytes_written: 0,
        files_created: 0,
        pattern: context.requested_pattern,
        total: 0,
        deleted: 0,
        failed: 0,
        items: Vec::new(),
        folders: Vec::new(),
        success: false,
        duration_seconds: None,
        error: None,
        failure_kind: None,
        supersedes: context.supersedes,
    };

    match context.kind {
        ReportKind::DeleteSelected => match outcome {
            OperationOutcome::Success { payload } => {
                let items = delete_items(payload);
                let deleted = items.iter().filter(|i| i.success).count() as u64;
                let failed = items.len() as u64 - deleted;
                report.total = as_u64(payload.get("total")).unwrap_or(items.len() as u64);
                report.deleted = deleted;
                report.failed = failed;
                report.success = failed == 0;
                report.items = items;
                if let Some(started) = parse_time(payload, "started_at") {
                    report.started_at = started;
                }
                if let Some(completed) = parse_time(payload, "completed_at") {
                    report.completed_at = completed;
                }
            }
            OperationOutcome::Failure(failure) => {
                report.error = Some(failure.user_message());
                report.failure_kind = Some(failure.kind);
            }
        },
        ReportKind::Wipe(_) => {
            let requested = context.requested_pattern.unwrap_or_default();
            match validate_wipe(outcome, requested) {
                OperationOutcome::Success { payload: stats } => {
                    report.bytes_written = stats.bytes_written;
                    report.files_created = stats.files_created;
                    report.pattern = Some(stats.pattern);
                    report.duration_seconds = stats.duration_seconds;
                    report.folders = stats.folders;
                    report.success = true;
                }
                OperationOutcome::Failure(failure) => {
                    report.pattern = Some(requested);
                    report.error = Some(failure.user_message());
                    report.failure_kind = Some(failure.kind);
                }
            }
        }
    }

    if report.duration_seconds.is_none() {
        let elapsed = report.completed_at - report.started_at;
        report.duration_seconds = Some(elapsed.num_milliseconds().max(0) as f64 / 1000.0);
    }

    report
}
