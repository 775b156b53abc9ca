use super::{ClearanceReport, FolderRollup, ReportKind};
use crate::settings::CertificateSettings;
use crate::ui::progress::human_bytes;
use crate::PipelineResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::Path;
use uuid::Uuid;

pub const CERTIFICATE_TITLE: &str = "Certificate of Data Clearance";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateFileLine {
    pub path: String,
    pub size: u64,
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearanceCertificate {
    pub certificate_id: String,
    pub title: String,
    pub issuer: String,
    pub issued_at: DateTime<Utc>,
    pub operation: String,
    pub drive: Option<String>,
    pub success: bool,
    pub summary: Vec<String>,
    pub folders: Vec<FolderRollup>,
    pub files: Vec<CertificateFileLine>,
    /// Files left out of `files` because of the listing cap
    pub omitted_files: usize,
    pub report_id: Uuid,
    /// SHA-256 of the report as exported
    pub report_digest: String,
    pub signature: String,
}

pub struct CertificateGenerator {
    issuer: String,
    signing_key: String,
    max_listed_files: usize,
}

impl Default for CertificateGenerator {
    fn default() -> Self {
        Self::new(&CertificateSettings::default())
    }
}

fn operation_label(kind: ReportKind) -> String {
    match kind {
        ReportKind::DeleteSelected => "Selected file deletion".to_string(),
        ReportKind::Wipe(level) => format!("{} ({})", level, level.description()),
    }
}

impl CertificateGenerator {
    pub fn new(settings: &CertificateSettings) -> Self {
        Self {
            issuer: settings.issuer.clone(),
            signing_key: settings.signing_key.clone(),
            max_listed_files: settings.max_listed_files.max(1),
        }
    }

    pub fn generate_certificate(&self, report: &ClearanceReport) -> PipelineResult<ClearanceCertificate> {
        let mut summary = Vec::new();
        if report.is_wipe() {
            summary.push(format!(
                "Bytes written: {} ({} bytes)",
                human_bytes(report.bytes_written),
                report.bytes_written
            ));
            summary.push(format!("Files created: {}", report.files_created));
            if let Some(pattern) = report.pattern {
                summary.push(format!("Pattern: {}", pattern.as_str().to_uppercase()));
            }
        } else {
            summary.push(format!("Files deleted: {} / {}", report.deleted, report.total));
            if report.failed > 0 {
                summary.push(format!("Files failed: {}", report.failed));
            }
        }
        summary.push(format!(
            "Status: {}",
            if report.success { "COMPLETED" } else { "FAILED" }
        ));
        if let Some(error) = &report.error {
            summary.push(format!("Error: {}", error));
        }

        let files: Vec<CertificateFileLine> = report
            .items
            .iter()
            .take(self.max_listed_files)
            .map(|item| CertificateFileLine {
                path: item.path.clone(),
                size: item.size,
                failed: !item.success,
            })
            .collect();
        let omitted_files = report.items.len().saturating_sub(files.len());

        let mut certificate = ClearanceCertificate {
            certificate_id: Uuid::new_v4().to_string(),
            title: CERTIFICATE_TITLE.to_string(),
            issuer: self.issuer.clone(),
            issued_at: Utc::now(),
            operation: operation_label(report.operation),
            drive: report.drive.clone(),
            success: report.success,
            summary,
            folders: report.folders.clone(),
            files,
            omitted_files,
            report_id: report.id,
            report_digest: self.calculate_report_digest(report)?,
            signature: String::new(),
        };

        certificate.signature = self.sign_certificate(&certificate)?;
        Ok(certificate)
    }

    fn calculate_report_digest(&self, report: &ClearanceReport) -> PipelineResult<String> {
        let json = serde_json::to_string(report)?;
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    fn sign_certificate(&self, certificate: &ClearanceCertificate) -> PipelineResult<String> {
        let mut signing_data = certificate.clone();
        signing_data.signature = String::new();

        let json_data = serde_json::to_string(&signing_data)?;

        let mut hasher = Sha256::new();
        hasher.update(json_data.as_bytes());
        hasher.update(self.signing_key.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    pub fn verify_certificate(&self, certificate: &ClearanceCertificate) -> PipelineResult<bool> {
        Ok(self.sign_certificate(certificate)? == certificate.signature)
    }

    /// Whether `certificate` was issued for exactly this report.
    pub fn matches_report(
        &self,
        certificate: &ClearanceCertificate,
        report: &ClearanceReport,
    ) -> PipelineResult<bool> {
        Ok(certificate.report_id == report.id
            && certificate.report_digest == self.calculate_report_digest(report)?)
    }

    pub fn save_certificate(&self, certificate: &ClearanceCertificate, path: &Path) -> PipelineResult<()> {
        let json_data = serde_json::to_string_pretty(certificate)?;
        std::fs::write(path, json_data)?;
        Ok(())
    }

    pub fn save_text(&self, certificate: &ClearanceCertificate, path: &Path) -> PipelineResult<()> {
        std::fs::write(path, render_text(certificate))?;
        Ok(())
    }
}

/// Plain-text layout of a certificate.
pub fn render_text(certificate: &ClearanceCertificate) -> String {
    let rule = "=".repeat(64);
    let mut out = String::new();

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "{:^64}", certificate.title);
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Certificate ID: {}", certificate.certificate_id);
    let _ = writeln!(out, "Issued by:      {}", certificate.issuer);
    let _ = writeln!(
        out,
        "Issued at:      {}",
        certificate.issued_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out, "Operation:      {}", certificate.operation);
    if let Some(drive) = &certificate.drive {
        let _ = writeln!(out, "Drive:          {}", drive);
    }
    let _ = writeln!(out);

    for line in &certificate.summary {
        let _ = writeln!(out, "  {}", line);
    }

    if !certificate.folders.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Cleared folders:");
        let _ = writeln!(out, "  {:<24} {:>12}  {}", "Name", "Size", "Path");
        for folder in &certificate.folders {
            let _ = writeln!(
                out,
                "  {:<24} {:>12}  {}",
                folder.name,
                human_bytes(folder.size_bytes),
                folder.path
            );
        }
    }

    if !certificate.files.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Files:");
        for file in &certificate.files {
            let marker = if file.failed { " (FAILED)" } else { "" };
            let _ = writeln!(out, "  {} [{}]{}", file.path, human_bytes(file.size), marker);
        }
        if certificate.omitted_files > 0 {
            let _ = writeln!(out, "  ... and {} more file(s) not listed", certificate.omitted_files);
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Report ID:     {}", certificate.report_id);
    let _ = writeln!(out, "Report SHA256: {}", certificate.report_digest);
    let _ = writeln!(out, "Signature:     {}", certificate.signature);
    let _ = writeln!(out, "{}", rule);
    out
}
