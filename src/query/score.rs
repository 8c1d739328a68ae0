//! Windowed health scoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resource::HealthRecord;

/// Response body of `/compute_health`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub health_score: f64,
    pub unhealthy_records: usize,
    pub healthy_records: usize,
}

/// Records with `from < timestamp <= to`. Unset records never match.
pub fn select_window(records: &[HealthRecord], from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<HealthRecord> {
    records
        .iter()
        .filter(|record| matches!(record.timestamp, Some(ts) if from < ts && ts <= to))
        .copied()
        .collect()
}

/// Score a selection: the fraction of records that are not unhealthy, or 0
/// for an empty selection.
pub fn evaluate_health(selected: &[HealthRecord]) -> HealthSummary {
    let unhealthy = selected.iter().filter(|r| r.healthy == Some(false)).count();
    let healthy = selected.len() - unhealthy;
    let health_score = if selected.is_empty() {
        0.0
    } else {
        healthy as f64 / selected.len() as f64
    };

    HealthSummary {
        health_score,
        unhealthy_records: unhealthy,
        healthy_records: healthy,
    }
}
