use super::location::PhysicalLocation;
use crate::error::{FailureKind, OperationFailure};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// A file surfaced by a scan, search or locate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub size: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(
        default,
        deserialize_with = "deserialize_location",
        skip_serializing_if = "Option::is_none"
    )]
    pub physical_location: Option<PhysicalLocation>,

    /// Fields the host does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// Accept both our own tagged form and the raw Engine shapes
fn deserialize_location<'de, D>(deserializer: D) -> Result<Option<PhysicalLocation>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    if raw.is_null() {
        return Ok(None);
    }
    if let Ok(tagged) = serde_json::from_value::<PhysicalLocation>(raw.clone()) {
        return Ok(Some(tagged));
    }
    Ok(PhysicalLocation::from_engine(&raw))
}

impl FileRecord {
    pub fn new(path: impl Into<String>, size: u64) -> Self {
        let path = path.into();
        let name = file_name_of(&path);
        Self {
            path,
            name,
            size,
            category: None,
            physical_location: None,
            extra: Map::new(),
        }
    }

    /// Path shown to users; the Engine may provide a friendlier one.
    pub fn display_path(&self) -> &str {
        self.extra
            .get("readable_path")
            .and_then(Value::as_str)
            .unwrap_or(&self.path)
    }
}

/// Last path component, tolerant of both separator styles.
pub fn file_name_of(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .find(|part| !part.is_empty())
        .unwrap_or(path)
        .to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileAnalysis {
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryStats>,
    #[serde(default)]
    pub largest_files: Vec<FileRecord>,
    #[serde(default)]
    pub sensitive_files: Vec<FileRecord>,
    #[serde(default)]
    pub skipped_errors: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One scanned volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedDrive {
    /// Volume root
    pub drive: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub filesystem: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub total_space: Option<u64>,
    #[serde(default)]
    pub used_space: Option<u64>,
    #[serde(default)]
    pub free_space: Option<u64>,
    #[serde(default)]
    pub usage_percentage: f64,
    #[serde(default)]
    pub scan_mode: Option<String>,
    #[serde(default)]
    pub count_accuracy: Option<String>,
    #[serde(default)]
    pub scan_duration_seconds: Option<f64>,
    #[serde(default)]
    pub file_analysis: FileAnalysis,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScannedDrive {
    pub fn files(&self) -> impl Iterator<Item = &FileRecord> {
        self.file_analysis
            .largest_files
            .iter()
            .chain(self.file_analysis.sensitive_files.iter())
    }

    pub fn is_exact(&self) -> bool {
        self.count_accuracy.as_deref() == Some("Exact")
    }
}

/// Aggregated scan tree across one or more roots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    #[serde(default)]
    pub drives: Vec<ScannedDrive>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScanResult {
    pub fn from_payload(payload: Value) -> Result<Self, OperationFailure> {
        // Some Engine builds emit the drive list bare
        let payload = match payload {
            Value::Array(drives) => serde_json::json!({ "drives": drives }),
            other => other,
        };
        serde_json::from_value(payload.clone()).map_err(|e| {
            OperationFailure::new(FailureKind::ParseError, format!("scan tree: {}", e))
                .with_raw_output(payload.to_string())
        })
    }

    /// Fold another partial scan into this one. A root scanned twice keeps
    /// the later result.
    pub fn merge(&mut self, other: ScanResult) {
        for drive in other.drives {
            match self.drives.iter_mut().find(|d| d.drive == drive.drive) {
                Some(existing) => *existing = drive,
                None => self.drives.push(drive),
            }
        }
        self.extra.extend(other.extra);
    }

    pub fn roots(&self) -> Vec<String> {
        self.drives.iter().map(|d| d.drive.clone()).collect()
    }

    pub fn files(&self) -> impl Iterator<Item = &FileRecord> {
        self.drives.iter().flat_map(ScannedDrive::files)
    }

    pub fn find_file(&self, path: &str) -> Option<&FileRecord> {
        self.files().find(|f| f.path == path)
    }

    pub fn total_files(&self) -> u64 {
        self.drives
            .iter()
            .flat_map(|d| d.file_analysis.categories.values())
            .map(|c| c.count)
            .sum()
    }
}

/// Parse the `results` list of a `--search` payload.
pub fn search_results(payload: &Value) -> Result<Vec<FileRecord>, OperationFailure> {
    match payload.get("results") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(results) => serde_json::from_value(results.clone()).map_err(|e| {
            OperationFailure::new(FailureKind::ParseError, format!("search results: {}", e))
                .with_raw_output(payload.to_string())
        }),
    }
}

/// Parse a `--list-drives` payload, `{drives: [...]}` with string or object
/// entries.
pub fn listed_drives(payload: &Value) -> Vec<String> {
    let entries = payload
        .get("drives")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    entries
        .into_iter()
        .filter_map(|entry| match entry {
            Value::String(s) => Some(s),
            Value::Object(map) => map
                .get("drive")
                .or_else(|| map.get("root"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect()
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").to_ascii_lowercase()
}

/// Volume root that hosts `path`.
///
/// Prefers the longest known root that prefixes the path; otherwise falls
/// back to the path's own root component (`C:\` or `/`).
pub fn drive_root_for(path: &str, known_roots: &[String]) -> String {
    let target = normalize(path);
    let best = known_roots
        .iter()
        .filter(|root| {
            let root_norm = normalize(root);
            let root_norm = root_norm.trim_end_matches('/');
            target == root_norm
                || target.starts_with(&format!("{}/", root_norm))
                || (root_norm.is_empty() && target.starts_with('/'))
        })
        .max_by_key(|root| root.len());
    if let Some(root) = best {
        return root.clone();
    }

    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return format!("{}:\\", path[..1].to_ascii_uppercase());
    }
    Path::new(path)
        .ancestors()
        .last()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "/".to_string())
}
