use super::ClearanceReport;
use crate::drives::ScanResult;
use crate::PipelineResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use sysinfo::System;

/// Host details stamped on every export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub hostname: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
    pub arch: String,
    pub user: Option<String>,
}

impl SystemInfo {
    pub fn gather() -> Self {
        Self {
            hostname: System::host_name(),
            os_name: System::name(),
            os_version: System::os_version(),
            kernel_version: System::kernel_version(),
            arch: std::env::consts::ARCH.to_string(),
            user: std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .ok(),
        }
    }
}

/// `{type, generated_at, system_info, report}` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearanceExport {
    #[serde(rename = "type")]
    pub kind: String,
    pub generated_at: DateTime<Utc>,
    pub system_info: SystemInfo,
    pub report: ClearanceReport,
}

impl ClearanceExport {
    pub const TYPE: &'static str = "clearance_report";

    /// Snapshot of `report`; later changes to the session do not affect it.
    pub fn new(report: &ClearanceReport) -> Self {
        Self {
            kind: Self::TYPE.to_string(),
            generated_at: Utc::now(),
            system_info: SystemInfo::gather(),
            report: report.clone(),
        }
    }

    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        write_pretty(path, self)
    }

    pub fn load(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Scan tree with the reviewer's remarks and the latest deletion report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanExport {
    #[serde(rename = "type")]
    pub kind: String,
    pub generated_at: DateTime<Utc>,
    pub system_info: SystemInfo,
    pub scan: ScanResult,
    pub user_remarks: BTreeMap<String, String>,
    pub deletion_report: Option<ClearanceReport>,
}

impl ScanExport {
    pub const TYPE: &'static str = "scan_report";

    pub fn new(
        scan: &ScanResult,
        remarks: &BTreeMap<String, String>,
        deletion_report: Option<&ClearanceReport>,
    ) -> Self {
        Self {
            kind: Self::TYPE.to_string(),
            generated_at: Utc::now(),
            system_info: SystemInfo::gather(),
            scan: scan.clone(),
            user_remarks: remarks.clone(),
            deletion_report: deletion_report.cloned(),
        }
    }

    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        write_pretty(path, self)
    }
}

fn write_pretty<T: Serialize>(path: &Path, value: &T) -> PipelineResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    tracing::info!(path = %path.display(), "Export written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperationOutcome;
    use crate::report::{to_report, ReportContext};
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_report() -> ClearanceReport {
        to_report(
            &OperationOutcome::success(json!({
                "items": [{"path": "/tmp/a", "size": 3, "success": true}]
            })),
            &ReportContext::delete(Utc::now()),
        )
    }

    #[test]
    fn test_envelope_shape() {
        let export = ClearanceExport::new(&sample_report());
        let value = serde_json::to_value(&export).unwrap();
        assert_eq!(value["type"], "clearance_report");
        assert!(value["generated_at"].is_string());
        assert_eq!(value["report"]["operation"], "delete_selected");
        assert_eq!(value["system_info"]["arch"], std::env::consts::ARCH);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("report.json");
        let export = ClearanceExport::new(&sample_report());
        export.save(&path).unwrap();

        let loaded = ClearanceExport::load(&path).unwrap();
        assert_eq!(loaded.report, export.report);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"type\""), "export should be pretty printed");
    }

    #[test]
    fn test_scan_export_carries_remarks_and_deletion() {
        let dir = TempDir::new().unwrap();
        let scan = ScanResult::from_payload(json!({"drives": [{"drive": "/mnt/a"}]})).unwrap();
        let mut remarks = BTreeMap::new();
        remarks.insert("/mnt/a/x.doc".to_string(), "contains PII".to_string());
        let report = sample_report();

        let export = ScanExport::new(&scan, &remarks, Some(&report));
        let path = dir.path().join("scan.json");
        export.save(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["type"], "scan_report");
        assert_eq!(value["user_remarks"]["/mnt/a/x.doc"], "contains PII");
        assert_eq!(value["deletion_report"]["deleted"], 1);
        assert_eq!(value["scan"]["drives"][0]["drive"], "/mnt/a");
    }
}
