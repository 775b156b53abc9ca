use crate::drives::ScanResult;
use crate::report::ClearanceReport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the user has done with the current report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportDisposition {
    Pending,
    Exported,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSlot {
    pub report: ClearanceReport,
    pub disposition: ReportDisposition,
}

/// Workflow state owned by the coordinator.
///
/// Nothing outside `OperationCoordinator` mutates it; readers get clones.
#[derive(Debug, Default, Clone)]
pub struct Session {
    pub(crate) known_drives: Vec<String>,
    pub(crate) scan: Option<ScanResult>,
    /// Selected paths in selection order
    pub(crate) selection: Vec<String>,
    pub(crate) remarks: BTreeMap<String, String>,
    pub(crate) report: Option<ReportSlot>,
    /// Last delete report, kept for scan exports even after a wipe supersedes it
    pub(crate) deletion_report: Option<ClearanceReport>,
}

impl Session {
    pub fn scan(&self) -> Option<&ScanResult> {
        self.scan.as_ref()
    }

    pub fn selection(&self) -> &[String] {
        &self.selection
    }

    pub fn remarks(&self) -> &BTreeMap<String, String> {
        &self.remarks
    }

    pub fn report(&self) -> Option<&ClearanceReport> {
        self.report.as_ref().map(|slot| &slot.report)
    }

    pub fn deletion_report(&self) -> Option<&ClearanceReport> {
        self.deletion_report.as_ref()
    }

    /// A new report may only replace an exported one.
    pub fn report_pending(&self) -> bool {
        matches!(
            self.report,
            Some(ReportSlot {
                disposition: ReportDisposition::Pending,
                ..
            })
        )
    }

    pub(crate) fn store_report(&mut self, report: ClearanceReport) {
        self.report = Some(ReportSlot {
            report,
            disposition: ReportDisposition::Pending,
        });
    }

    pub(crate) fn select(&mut self, path: &str) -> bool {
        if self.selection.iter().any(|p| p == path) {
            return false;
        }
        self.selection.push(path.to_string());
        true
    }

    pub(crate) fn deselect(&mut self, path: &str) -> bool {
        let before = self.selection.len();
        self.selection.retain(|p| p != path);
        before != self.selection.len()
    }

    pub(crate) fn set_remark(&mut self, path: &str, remark: &str) {
        let remark = remark.trim();
        if remark.is_empty() {
            self.remarks.remove(path);
        } else {
            self.remarks.insert(path.to_string(), remark.to_string());
        }
    }

    /// Roots the free-space offer may resolve a deleted path against.
    pub(crate) fn known_roots(&self) -> Vec<String> {
        let mut roots = self.known_drives.clone();
        if let Some(scan) = &self.scan {
            for root in scan.roots() {
                if !roots.contains(&root) {
                    roots.push(root);
                }
            }
        }
        roots
    }
}
