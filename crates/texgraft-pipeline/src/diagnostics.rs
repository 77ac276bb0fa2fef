//! Transplant diagnostics: per-pair outcome, counts and timing.
//!
//! Every run that gets past region ranking produces a
//! [`TransplantReport`]. Skipped pairs are reported here rather than as
//! errors, so a caller can tell "nothing happened" from "two of three
//! pairs applied".
//!
//! Timestamps are captured via the `web-time` crate, which uses
//! `performance.now()` on WASM and `std::time::Instant` on native.
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transform::DegenerateTransform;
use crate::types::{Dimensions, WarpMethod};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Why a region pair was not composited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The boundary correspondences could not support the warp method.
    Degenerate(DegenerateTransform),
    /// Shrinking left the source region without a usable boundary.
    EmptySourceRegion,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Degenerate(reason) => write!(f, "degenerate transform: {reason}"),
            Self::EmptySourceRegion => f.write_str("source region vanished after shrinking"),
        }
    }
}

/// Outcome of one region pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum PairStatus {
    /// Warped and composited onto the canvas.
    Applied,
    /// Left out; the canvas is unchanged by this pair.
    Skipped {
        /// What went wrong.
        reason: SkipReason,
    },
}

/// Diagnostics for one region pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairReport {
    /// Rank of the destination region (0 = largest).
    pub destination_rank: usize,
    /// Rank of the source region it was paired with.
    pub source_rank: usize,
    /// Boundary points per contour after resampling.
    pub point_count: usize,
    /// Applied or skipped.
    pub status: PairStatus,
    /// Wall-clock time for shrink, resample, fit and warp (seconds).
    #[serde(with = "duration_serde")]
    pub prepare_duration: Duration,
}

/// Diagnostics for a whole transplant run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransplantReport {
    /// Warp method used for every pair.
    pub method: WarpMethod,
    /// Destination canvas size.
    pub canvas: Dimensions,
    /// Source regions surviving the confidence filter and cleaning.
    pub source_regions: usize,
    /// Destination regions surviving the confidence filter and cleaning.
    pub destination_regions: usize,
    /// One entry per attempted pair, in destination rank order.
    pub pairs: Vec<PairReport>,
    /// Wall-clock time spent cleaning and ranking both sides (seconds).
    #[serde(with = "duration_serde")]
    pub ranking_duration: Duration,
    /// Total wall-clock time of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

impl TransplantReport {
    /// Number of pairs composited onto the canvas.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.pairs
            .iter()
            .filter(|p| p.status == PairStatus::Applied)
            .count()
    }

    /// Number of pairs left out.
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.pairs.len() - self.applied_count()
    }

    /// Format the report as a human-readable table.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Transplant Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Canvas: {}  |  Method: {}  |  Regions: {} source, {} destination",
            self.canvas, self.method, self.source_regions, self.destination_regions,
        ));
        lines.push(format!(
            "Ranking: {:.3}ms  |  Total: {:.3}ms",
            duration_ms(self.ranking_duration),
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<6} {:<6} {:>6} {:>10}  {}",
            "Dst", "Src", "Points", "Prepare", "Status"
        ));
        lines.push("-".repeat(60));
        for pair in &self.pairs {
            let status = match &pair.status {
                PairStatus::Applied => "applied".to_string(),
                PairStatus::Skipped { reason } => format!("skipped ({reason})"),
            };
            lines.push(format!(
                "{:<6} {:<6} {:>6} {:>8.3}ms  {status}",
                pair.destination_rank,
                pair.source_rank,
                pair.point_count,
                duration_ms(pair.prepare_duration),
            ));
        }

        lines.push(String::new());
        lines.push(format!(
            "Applied: {}  |  Skipped: {}",
            self.applied_count(),
            self.skipped_count(),
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_report() -> TransplantReport {
        TransplantReport {
            method: WarpMethod::Projective,
            canvas: Dimensions::new(64, 48),
            source_regions: 3,
            destination_regions: 2,
            pairs: vec![
                PairReport {
                    destination_rank: 0,
                    source_rank: 0,
                    point_count: 40,
                    status: PairStatus::Applied,
                    prepare_duration: Duration::from_millis(12),
                },
                PairReport {
                    destination_rank: 1,
                    source_rank: 1,
                    point_count: 40,
                    status: PairStatus::Skipped {
                        reason: SkipReason::Degenerate(DegenerateTransform::Collinear),
                    },
                    prepare_duration: Duration::from_millis(3),
                },
            ],
            ranking_duration: Duration::from_millis(20),
            total_duration: Duration::from_millis(40),
        }
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let d = Duration::from_millis(1234);
        let ms = duration_ms(d);
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn counts_applied_and_skipped() {
        let report = sample_report();
        assert_eq!(report.applied_count(), 1);
        assert_eq!(report.skipped_count(), 1);
    }

    #[test]
    fn report_mentions_skip_reason() {
        let text = sample_report().report();
        assert!(text.contains("Transplant Report"));
        assert!(text.contains("64x48"));
        assert!(text.contains("points are collinear"));
        assert!(text.contains("Applied: 1  |  Skipped: 1"));
    }

    #[test]
    fn json_uses_fractional_seconds() {
        let json = serde_json::to_value(sample_report()).unwrap();
        assert_eq!(json["method"], "projective");
        assert!((json["total_duration"].as_f64().unwrap() - 0.04).abs() < 1e-9);
        assert_eq!(json["pairs"][0]["status"]["status"], "applied");
        assert_eq!(
            json["pairs"][1]["status"]["reason"]["degenerate"],
            "collinear"
        );
    }

    #[test]
    fn negative_duration_is_rejected() {
        let mut json = serde_json::to_value(sample_report()).unwrap();
        json["total_duration"] = serde_json::json!(-1.0);
        assert!(serde_json::from_value::<TransplantReport>(json).is_err());
    }
}
