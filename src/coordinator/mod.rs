// Operation Lifecycle Coordinator
//
// Sequences the user-facing workflow: scan, review, delete, optional
// free-space wipe, full-drive wipe, and report export. Owns the session
// state and the operation slots; every Engine call goes through the
// process orchestrator and resolves to a typed outcome.
//
// - session.rs: selection, remarks, scan tree and the current report slot
// - slots.rs: single-flight admission of operations
// - preview.rs: bounded local file preview for the review step

pub mod preview;
pub mod session;
pub mod slots;


pub use preview::{FilePreview, PreviewContent};
pub use session::{ReportDisposition, Session};
pub use slots::{OperationSlots, SlotGuard};

use crate::drives::{
    drive_root_for, listed_drives, search_results, DriveDescriptor, FileRecord, PhysicalLocation,
    ScanResult,
};
use crate::engine::{EngineCommand, ProcessOrchestrator, ProgressHub};
use crate::error::{FailureKind, OperationFailure, OperationOutcome};
use crate::protocol::strip_progress_lines;
use crate::report::{
    to_report, CertificateGenerator, ClearanceCertificate, ClearanceExport, ClearanceReport,
    FileOutcome, ReportContext, ReportKind, ScanExport,
};
use crate::settings::PipelineConfig;
use crate::{
    DestructiveGuard, OperationKind, PipelineError, PipelineResult, WipeLevel, WipePattern,
};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

/// Phrase the user must type before an irreversible operation.
pub const CONFIRMATION_PHRASE: &str = "DESTROY";

/// Proof that the user confirmed an irreversible operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    _private: (),
}

impl Confirmation {
    pub fn from_phrase(input: &str) -> Option<Self> {
        (input.trim() == CONFIRMATION_PHRASE).then_some(Self { _private: () })
    }

    /// For non-interactive runs (`--yes`).
    pub fn assumed() -> Self {
        Self { _private: () }
    }
}

/// Offer of a level 5 wipe following a delete.
///
/// Only valid while the delete report it was made for is still the current
/// report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeSpaceOffer {
    report_id: Uuid,
    drive: String,
    pattern: WipePattern,
    deleted: u64,
}

impl FreeSpaceOffer {
    pub fn drive(&self) -> &str {
        &self.drive
    }

    pub fn pattern(&self) -> WipePattern {
        self.pattern
    }

    pub fn deleted(&self) -> u64 {
        self.deleted
    }

    pub fn level(&self) -> WipeLevel {
        WipeLevel::FreeSpace
    }
}

pub struct OperationCoordinator {
    config: PipelineConfig,
    orchestrator: ProcessOrchestrator,
    slots: OperationSlots,
    session: Mutex<Session>,
}

impl OperationCoordinator {
    pub fn new(config: PipelineConfig) -> Self {
        let orchestrator = ProcessOrchestrator::new(config.engine.clone())
            .with_diagnostics_dir(config.diagnostics_dir.clone());
        Self::with_orchestrator(config, orchestrator)
    }

    pub fn with_orchestrator(config: PipelineConfig, orchestrator: ProcessOrchestrator) -> Self {
        Self {
            slots: OperationSlots::new(config.allow_concurrent_scans),
            config,
            orchestrator,
            session: Mutex::new(Session::default()),
        }
    }

    pub fn hub(&self) -> &ProgressHub {
        self.orchestrator.hub()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn slots(&self) -> &OperationSlots {
        &self.slots
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Point-in-time copy of the session.
    pub fn snapshot(&self) -> Session {
        self.session().clone()
    }

    // ==================== DISCOVERY ====================

    pub async fn list_drives(&self) -> OperationOutcome<Vec<String>> {
        let outcome = match self.orchestrator.run(&EngineCommand::ListDrives).await {
            OperationOutcome::Success { payload } => OperationOutcome::success(listed_drives(&payload)),
            OperationOutcome::Failure(failure) if failure.kind == FailureKind::ParseError => {
                // Older Engines print the roots as plain text
                let drives: Vec<String> = strip_progress_lines(&failure.raw_output)
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
                if drives.is_empty() {
                    OperationOutcome::Failure(failure)
                } else {
                    OperationOutcome::success(drives)
                }
            }
            OperationOutcome::Failure(failure) => OperationOutcome::Failure(failure),
        };

        if let Some(drives) = outcome.payload() {
            info!(count = drives.len(), "Drives listed");
            self.session().known_drives = drives.clone();
        }
        outcome
    }

    /// Re-query a drive's attributes. Never cached.
    pub async fn drive_info(&self, drive: &str) -> OperationOutcome<DriveDescriptor> {
        self.orchestrator
            .run(&EngineCommand::DriveInfo {
                drive: drive.to_string(),
            })
            .await
            .and_then(|payload| DriveDescriptor::from_engine_payload(drive, payload))
    }

    pub async fn scan(&self, roots: Vec<String>) -> PipelineResult<OperationOutcome<ScanResult>> {
        if roots.is_empty() {
            return Err(PipelineError::NothingSelected);
        }
        let _slot = self.slots.try_acquire(OperationKind::Scan, &roots)?;
        let started = Utc::now();

        let outcome = if self.config.allow_concurrent_scans && roots.len() > 1 {
            self.scan_each(&roots).await
        } else {
            self.orchestrator
                .run(&EngineCommand::Scan {
                    roots: roots.clone(),
                })
                .await
                .and_then(ScanResult::from_payload)
        };

        match &outcome {
            OperationOutcome::Success { payload } => {
                info!(
                    roots = roots.len(),
                    drives = payload.drives.len(),
                    elapsed_ms = (Utc::now() - started).num_milliseconds(),
                    "Scan complete"
                );
                self.session().scan = Some(payload.clone());
            }
            OperationOutcome::Failure(failure) => {
                warn!(kind = %failure.kind, error = %failure.message, "Scan failed");
            }
        }
        Ok(outcome)
    }

    /// One Engine process per root, merged in root order.
    async fn scan_each(&self, roots: &[String]) -> OperationOutcome<ScanResult> {
        let parallelism = self.config.scan_parallelism.max(1);
        let mut partials: Vec<(usize, String, OperationOutcome<ScanResult>)> =
            stream::iter(roots.iter().cloned().enumerate())
                .map(|(index, root)| async move {
                    let outcome = self
                        .orchestrator
                        .run(&EngineCommand::Scan {
                            roots: vec![root.clone()],
                        })
                        .await
                        .and_then(ScanResult::from_payload);
                    (index, root, outcome)
                })
                .buffer_unordered(parallelism)
                .collect()
                .await;
        partials.sort_by_key(|(index, _, _)| *index);

        let mut merged = ScanResult::default();
        for (_, root, outcome) in partials {
            match outcome {
                OperationOutcome::Success { payload } => merged.merge(payload),
                OperationOutcome::Failure(mut failure) => {
                    failure.message = format!("{}: {}", root, failure.message);
                    return OperationOutcome::Failure(failure);
                }
            }
        }
        OperationOutcome::success(merged)
    }

    pub async fn search(&self, root: &str, query: &str) -> OperationOutcome<Vec<FileRecord>> {
        self.orchestrator
            .run(&EngineCommand::Search {
                root: root.to_string(),
                query: query.to_string(),
            })
            .await
            .and_then(|payload| search_results(&payload))
    }

    pub async fn locate(&self, path: &str) -> OperationOutcome<PhysicalLocation> {
        self.orchestrator
            .run(&EngineCommand::Locate {
                path: path.to_string(),
            })
            .await
            .and_then(|payload| {
                if payload.get("success").and_then(Value::as_bool) == Some(false) {
                    let message = payload
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("location unavailable");
                    return Err(OperationFailure::new(FailureKind::EngineRejected, message)
                        .with_raw_output(payload.to_string()));
                }
                let raw = payload.get("physical_location").unwrap_or(&payload);
                PhysicalLocation::from_engine(raw).ok_or_else(|| {
                    OperationFailure::new(FailureKind::ParseError, "unrecognised physical location")
                        .with_raw_output(payload.to_string())
                })
            })
    }

    // ==================== REVIEW ====================

    pub fn select(&self, path: &str) -> bool {
        self.session().select(path)
    }

    pub fn deselect(&self, path: &str) -> bool {
        self.session().deselect(path)
    }

    pub fn clear_selection(&self) {
        self.session().selection.clear();
    }

    pub fn selection(&self) -> Vec<String> {
        self.session().selection.clone()
    }

    /// Empty remark removes it.
    pub fn set_remark(&self, path: &str, remark: &str) {
        self.session().set_remark(path, remark);
    }

    pub async fn preview_file(&self, path: &Path) -> PipelineResult<FilePreview> {
        Ok(preview::read_preview(path).await?)
    }

    // ==================== DELETE ====================

    /// Delete every selected file, one at a time.
    ///
    /// Per-file failures are recorded and never stop the batch.
    pub async fn delete_selected(
        &self,
        _confirmation: Confirmation,
    ) -> PipelineResult<ClearanceReport> {
        let paths = {
            let session = self.session();
            if session.report_pending() {
                return Err(PipelineError::ReportPending);
            }
            if session.selection.is_empty() {
                return Err(PipelineError::NothingSelected);
            }
            session.selection.clone()
        };

        let _slot = self.slots.try_acquire(OperationKind::Delete, &[])?;
        if self.session().report_pending() {
            return Err(PipelineError::ReportPending);
        }
        let _destructive = DestructiveGuard::acquire();
        let started = Utc::now();
        info!(files = paths.len(), "Deleting selected files");

        let mut items = Vec::with_capacity(paths.len());
        for path in &paths {
            let outcome = delete_one(path).await;
            if let Some(error) = &outcome.error {
                warn!(path = %path, error = %error, "File not deleted");
            }
            items.push(outcome);
        }

        let payload = json!({
            "operation": "delete_selected",
            "total": items.len(),
            "items": items,
        });
        let report = to_report(&OperationOutcome::success(payload), &ReportContext::delete(started));
        info!(
            report = %report.id,
            total = report.total,
            deleted = report.deleted,
            failed = report.failed,
            "Delete finished"
        );

        let mut session = self.session();
        session
            .selection
            .retain(|p| !report.items.iter().any(|item| item.success && &item.path == p));
        session.deletion_report = Some(report.clone());
        session.store_report(report.clone());
        Ok(report)
    }

    /// Level 5 offer for the current delete report, if anything was deleted.
    pub fn free_space_wipe_offer(&self) -> Option<FreeSpaceOffer> {
        let session = self.session();
        let report = session.report()?;
        if report.operation != ReportKind::DeleteSelected || report.deleted == 0 {
            return None;
        }
        let first_deleted = report.items.iter().find(|item| item.success)?;
        Some(FreeSpaceOffer {
            report_id: report.id,
            drive: drive_root_for(&first_deleted.path, &session.known_roots()),
            pattern: self.config.free_space_pattern,
            deleted: report.deleted,
        })
    }

    /// Run an accepted free-space offer. The wipe report replaces the delete
    /// report it follows.
    pub async fn free_space_wipe(
        &self,
        offer: &FreeSpaceOffer,
        _confirmation: Confirmation,
    ) -> PipelineResult<ClearanceReport> {
        {
            let session = self.session();
            if session.report().map(|r| r.id) != Some(offer.report_id) {
                return Err(PipelineError::OfferExpired);
            }
        }

        let drives = [offer.drive.clone()];
        let _slot = self.slots.try_acquire(OperationKind::Wipe, &drives)?;
        if self.session().report().map(|r| r.id) != Some(offer.report_id) {
            return Err(PipelineError::OfferExpired);
        }
        let context = ReportContext::wipe(WipeLevel::FreeSpace, &offer.drive, offer.pattern, Utc::now())
            .superseding(offer.report_id);
        let report = self.run_wipe(&context, WipeLevel::FreeSpace, offer.pattern).await;

        self.session().store_report(report.clone());
        Ok(report)
    }

    // ==================== WIPE ====================

    /// Classify the drive afresh and wipe it at the selected level.
    ///
    /// Always yields a report once admitted, including when classification
    /// or the wipe itself fails.
    pub async fn wipe_drive(
        &self,
        drive: &str,
        pattern: WipePattern,
        _confirmation: Confirmation,
    ) -> PipelineResult<ClearanceReport> {
        if self.session().report_pending() {
            return Err(PipelineError::ReportPending);
        }
        let drives = [drive.to_string()];
        let _slot = self.slots.try_acquire(OperationKind::Wipe, &drives)?;
        // A wipe that finished since the first check has filed its report by now
        if self.session().report_pending() {
            return Err(PipelineError::ReportPending);
        }
        let started = Utc::now();

        let report = match self.drive_info(drive).await {
            OperationOutcome::Success { payload } => {
                let level = payload.recommended_level();
                info!(
                    drive = %drive,
                    level = level.as_u8(),
                    removable = payload.attributes.is_removable,
                    os_volume = payload.attributes.is_operating_system_volume,
                    "Drive classified"
                );
                let context = ReportContext::wipe(level, drive, pattern, started);
                self.run_wipe(&context, level, pattern).await
            }
            OperationOutcome::Failure(failure) => {
                // Unclassified drives are reported at the most conservative level
                warn!(drive = %drive, kind = %failure.kind, "Drive classification failed; wipe not started");
                let context = ReportContext::wipe(WipeLevel::OsVolumeClear, drive, pattern, started);
                to_report(&OperationOutcome::Failure(failure), &context)
            }
        };

        self.session().store_report(report.clone());
        Ok(report)
    }

    async fn run_wipe(
        &self,
        context: &ReportContext,
        level: WipeLevel,
        pattern: WipePattern,
    ) -> ClearanceReport {
        let drive = context.drive.clone().unwrap_or_default();
        let _destructive = DestructiveGuard::acquire();
        info!(drive = %drive, level = level.as_u8(), pattern = %pattern, "Wipe started");

        let outcome = self
            .orchestrator
            .run(&EngineCommand::Wipe {
                level,
                drive: drive.clone(),
                pattern,
            })
            .await;
        let report = to_report(&outcome, context);

        if report.success {
            info!(
                drive = %drive,
                level = level.as_u8(),
                bytes_written = report.bytes_written,
                files_created = report.files_created,
                "Wipe complete"
            );
        } else {
            warn!(
                drive = %drive,
                level = level.as_u8(),
                error = report.error.as_deref().unwrap_or(""),
                "Wipe failed"
            );
        }
        report
    }

    /// Overwrite one file in place. Does not touch the report slot.
    pub async fn wipe_file(
        &self,
        path: &str,
        passes: u32,
        pattern: WipePattern,
        _confirmation: Confirmation,
    ) -> PipelineResult<OperationOutcome<Value>> {
        let drive = {
            let session = self.session();
            drive_root_for(path, &session.known_roots())
        };
        let _slot = self.slots.try_acquire(OperationKind::Wipe, &[drive])?;
        let _destructive = DestructiveGuard::acquire();
        info!(path = %path, passes, pattern = %pattern, "File wipe started");

        let outcome = self
            .orchestrator
            .run(&EngineCommand::WipeFile {
                path: path.to_string(),
                passes: passes.max(1),
                pattern,
            })
            .await
            .and_then(|payload| {
                if payload.get("success").and_then(Value::as_bool) == Some(false) {
                    let message = payload
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("file wipe failed");
                    return Err(OperationFailure::new(FailureKind::EngineRejected, message)
                        .with_raw_output(payload.to_string()));
                }
                Ok(payload)
            });
        Ok(outcome)
    }

    // ==================== REPORTS ====================

    pub fn current_report(&self) -> Option<ClearanceReport> {
        self.session().report().cloned()
    }

    pub fn report_disposition(&self) -> Option<ReportDisposition> {
        self.session().report.as_ref().map(|slot| slot.disposition)
    }

    pub fn export_report(&self, path: &Path) -> PipelineResult<ClearanceExport> {
        let export = {
            let session = self.session();
            let report = session.report().ok_or(PipelineError::NoReport)?;
            ClearanceExport::new(report)
        };
        export.save(path)?;

        let mut session = self.session();
        if let Some(slot) = session.report.as_mut() {
            if slot.report.id == export.report.id {
                slot.disposition = ReportDisposition::Exported;
            }
        }
        Ok(export)
    }

    /// Drop the current report without exporting it.
    pub fn discard_report(&self) -> PipelineResult<ClearanceReport> {
        let slot = self.session().report.take().ok_or(PipelineError::NoReport)?;
        info!(report = %slot.report.id, operation = %slot.report.operation, "Report discarded");
        Ok(slot.report)
    }

    pub fn certificate(&self, generator: &CertificateGenerator) -> PipelineResult<ClearanceCertificate> {
        let report = self.current_report().ok_or(PipelineError::NoReport)?;
        generator.generate_certificate(&report)
    }

    pub fn export_scan(&self, path: &Path) -> PipelineResult<ScanExport> {
        let export = {
            let session = self.session();
            let scan = session.scan().ok_or(PipelineError::NoScan)?;
            ScanExport::new(scan, session.remarks(), session.deletion_report())
        };
        export.save(path)?;
        Ok(export)
    }
}

async fn delete_one(path: &str) -> FileOutcome {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return FileOutcome::failed(path, 0, "Not found");
        }
        Err(e) => return FileOutcome::failed(path, 0, e.to_string()),
    };
    if !metadata.is_file() {
        return FileOutcome::failed(path, metadata.len(), "Not a file");
    }

    let size = metadata.len();
    match tokio::fs::remove_file(path).await {
        Ok(()) => FileOutcome::deleted(path, size),
        Err(e) => FileOutcome::failed(path, 0, e.to_string()),
    }
}
