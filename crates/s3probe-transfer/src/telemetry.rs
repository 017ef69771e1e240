//! Per-run transfer timing

use serde::Serialize;
use std::time::Duration;

use s3probe_core::MIB;

/// Timing of one transferred part
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartSample {
    pub part_number: u32,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl PartSample {
    pub fn mib_per_sec(&self) -> f64 {
        mib_per_sec(self.bytes, self.elapsed)
    }
}

fn mib_per_sec(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return 0.0;
    }
    bytes as f64 / MIB as f64 / secs
}

/// Samples for one phase (upload or download), in part order
#[derive(Debug, Clone, Default)]
pub struct PhaseTelemetry {
    samples: Vec<PartSample>,
}

/// Aggregates over one phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhaseStats {
    pub parts: usize,
    pub bytes: u64,
    pub total_secs: f64,
    pub avg_part_secs: f64,
    pub fastest_part_secs: f64,
    pub slowest_part_secs: f64,
    pub avg_mib_per_sec: f64,
}

impl PhaseTelemetry {
    pub fn record(&mut self, part_number: u32, bytes: u64, elapsed: Duration) -> PartSample {
        let sample = PartSample {
            part_number,
            bytes,
            elapsed,
        };
        self.samples.push(sample);
        sample
    }

    pub fn samples(&self) -> &[PartSample] {
        &self.samples
    }

    /// `None` when no part was transferred
    pub fn stats(&self) -> Option<PhaseStats> {
        if self.samples.is_empty() {
            return None;
        }
        let secs: Vec<f64> = self.samples.iter().map(|s| s.elapsed.as_secs_f64()).collect();
        let total: Duration = self.samples.iter().map(|s| s.elapsed).sum();
        let bytes: u64 = self.samples.iter().map(|s| s.bytes).sum();
        Some(PhaseStats {
            parts: self.samples.len(),
            bytes,
            total_secs: total.as_secs_f64(),
            avg_part_secs: total.as_secs_f64() / self.samples.len() as f64,
            fastest_part_secs: secs.iter().copied().fold(f64::INFINITY, f64::min),
            slowest_part_secs: secs.iter().copied().fold(0.0, f64::max),
            avg_mib_per_sec: mib_per_sec(bytes, total),
        })
    }
}

/// Telemetry of one validation run, created per run and handed to the
/// summary
#[derive(Debug, Clone, Default)]
pub struct RunTelemetry {
    pub upload: PhaseTelemetry,
    pub download: PhaseTelemetry,
}
