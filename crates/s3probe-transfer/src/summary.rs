//! End-of-run summary

use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use s3probe_core::MIB;

use crate::telemetry::{PhaseStats, RunTelemetry};
use crate::uploader::UploadReport;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub elapsed_secs: f64,
    pub file_id: String,
    pub original_path: String,
    pub bucket: String,
    pub part_size_mib: u64,
    pub part_count: u64,
    pub plaintext_size: u64,
    pub encrypted_size: u64,
    pub growth_percent: f64,
    /// Base64 of the symmetric file secret
    pub file_secret: String,
    pub upload: Option<PhaseStats>,
    pub download: Option<PhaseStats>,
    pub dangling_uploads: usize,
    pub object_deleted: bool,
}

impl RunSummary {
    pub fn new(
        elapsed: Duration,
        original_path: &Path,
        report: &UploadReport,
        telemetry: &RunTelemetry,
    ) -> Self {
        let original_path = std::fs::canonicalize(original_path)
            .unwrap_or_else(|_| original_path.to_path_buf())
            .display()
            .to_string();
        Self {
            elapsed_secs: elapsed.as_secs_f64(),
            file_id: report.key.clone(),
            original_path,
            bucket: report.bucket.clone(),
            part_size_mib: report.part_size / MIB,
            part_count: report.part_count,
            plaintext_size: report.plaintext_size,
            encrypted_size: report.encrypted_size,
            growth_percent: growth_percent(report.plaintext_size, report.encrypted_size),
            file_secret: report.secret.to_base64(),
            upload: telemetry.upload.stats(),
            download: telemetry.download.stats(),
            dangling_uploads: 0,
            object_deleted: false,
        }
    }

    /// Label/value pairs in display order
    pub fn lines(&self) -> Vec<(&'static str, String)> {
        let mut lines = vec![("Elapsed time", format!("{:.2} seconds", self.elapsed_secs))];
        for (phase, stats) in [("Upload", &self.upload), ("Download", &self.download)] {
            if let Some(s) = stats {
                lines.push((
                    if phase == "Upload" { "Avg Part Upload" } else { "Avg Part Download" },
                    format!("{:.2} seconds ({:.2} MiB/s)", s.avg_part_secs, s.avg_mib_per_sec),
                ));
                lines.push((
                    if phase == "Upload" {
                        "Fastest, Slowest Upload"
                    } else {
                        "Fastest, Slowest Download"
                    },
                    format!(
                        "{:.2} seconds, {:.2} seconds",
                        s.fastest_part_secs, s.slowest_part_secs
                    ),
                ));
            }
        }
        lines.extend([
            ("File UUID", self.file_id.clone()),
            ("Original filesystem path", self.original_path.clone()),
            ("Part Size", format!("{} MiB", self.part_size_mib)),
            ("Unencrypted file size", format!("{} bytes", self.plaintext_size)),
            (
                "Encrypted file size",
                format!(
                    "{} bytes ({:.2}% change)",
                    self.encrypted_size, self.growth_percent
                ),
            ),
            ("Symmetric file encryption secret", self.file_secret.clone()),
        ]);
        if self.dangling_uploads > 0 {
            lines.push(("Dangling multipart uploads", self.dangling_uploads.to_string()));
        }
        if self.object_deleted {
            lines.push(("Validation object", "deleted".to_string()));
        }
        lines
    }

    pub fn log(&self) {
        tracing::info!("SUMMARY:");
        for (label, value) in self.lines() {
            tracing::info!("\t {label}: {value}");
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn growth_percent(plaintext: u64, encrypted: u64) -> f64 {
    if plaintext == 0 {
        return 0.0;
    }
    100.0 * (encrypted as f64 / plaintext as f64 - 1.0)
}
