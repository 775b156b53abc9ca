/// Custom assertions for clearance reports
use seve_clear::error::FailureKind;
use seve_clear::report::ClearanceReport;

/// Assert delete counters and that the items agree with them
pub fn assert_delete_counts(report: &ClearanceReport, total: u64, deleted: u64, failed: u64) {
    assert_eq!(
        (report.total, report.deleted, report.failed),
        (total, deleted, failed),
        "unexpected counters in report {}",
        report.id
    );
    let ok = report.items.iter().filter(|i| i.success).count() as u64;
    assert_eq!(ok, deleted, "items disagree with deleted counter");
    assert_eq!(report.success, failed == 0);
}

/// Assert a failed report carries zeros, not missing values
#[allow(dead_code)]
pub fn assert_failed_with_zero_counts(report: &ClearanceReport, kind: FailureKind) {
    assert!(!report.success, "report {} should be a failure", report.id);
    assert_eq!(report.failure_kind, Some(kind));
    assert_eq!(report.bytes_written, 0);
    assert_eq!(report.files_created, 0);

    let value = serde_json::to_value(report).expect("report serializes");
    assert!(value["bytes_written"].is_u64(), "bytes_written must be numeric");
    assert!(value["files_created"].is_u64(), "files_created must be numeric");
}
