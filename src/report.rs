// Copyright 2025 Cowboy AI, LLC.

//! The final run report
//!
//! Bundles the persisted graph output with the user-visible summary:
//! templates that never fired, population outliers, feedback loops whose
//! observed correlation disagreed with their declared polarity, and every
//! cascade or placement failure seen along the way.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::distribution::DistributionSnapshot;
use crate::enrichment::{EnrichmentRecord, EraNarrativeRecord};
use crate::feedback::{FeedbackLoop, LoopPolarity, LoopTarget};
use crate::graph::GraphSnapshot;
use crate::history::HistoryRecord;
use crate::tracker::MetricEntry;

/// |correlation| below this is noise, not a mismatch
pub const CORRELATION_TOLERANCE: f64 = 0.05;

/// Why the run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCause {
    /// Every era ran to completion
    Completed,
    /// The tick ceiling was reached
    MaxTicks,
    /// The population safety valve fired
    SafetyValve,
    /// The run was cancelled from outside
    Cancelled,
}

/// One population outlier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierEntry {
    /// Metric key
    pub key: String,
    /// Final count
    pub count: f64,
    /// Declared target
    pub target: f64,
    /// Final deviation
    pub deviation: f64,
}

impl OutlierEntry {
    /// Build from a tracked metric
    pub fn from_metric(key: &str, entry: &MetricEntry) -> Self {
        Self {
            key: key.to_string(),
            count: entry.count,
            target: entry.target,
            deviation: entry.deviation,
        }
    }
}

/// A feedback loop whose observed behaviour disagreed with its polarity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackMismatch {
    /// Loop id
    pub loop_id: String,
    /// Declared polarity
    pub declared: LoopPolarity,
    /// Observed delta correlation between source and target series
    pub correlation: f64,
}

/// One per-tick sample of every pressure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureSample {
    /// Tick of the sample
    pub tick: u64,
    /// Pressure values at that tick
    pub values: IndexMap<String, f64>,
}

/// Everything a finished run hands back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique id of this run
    pub run_id: Uuid,
    /// Wall-clock start, metadata only
    pub started_at: DateTime<Utc>,
    /// Wall-clock finish, metadata only
    pub finished_at: DateTime<Utc>,
    /// Seed the run used
    pub seed: u64,
    /// Ticks executed
    pub ticks: u64,
    /// Era in effect when the run stopped
    pub final_era: Option<String>,
    /// Why the run stopped
    pub stop: StopCause,
    /// Final entity count
    pub entity_count: usize,
    /// Final active relationship count
    pub relationship_count: usize,
    /// Templates that never fired once
    pub templates_never_fired: Vec<String>,
    /// Populations above their outlier threshold
    pub overpopulated: Vec<OutlierEntry>,
    /// Populations below their outlier threshold
    pub underpopulated: Vec<OutlierEntry>,
    /// Feedback loops whose observed correlation disagreed with polarity
    pub feedback_mismatches: Vec<FeedbackMismatch>,
    /// Placement cascades observed
    pub cascade_events: usize,
    /// Placement failures observed
    pub placement_failures: usize,
    /// Distribution shape at run end
    pub distribution: DistributionSnapshot,
    /// One pressure sample per tick
    pub pressure_timeline: Vec<PressureSample>,
    /// The full history log
    pub history: Vec<HistoryRecord>,
    /// Outbound enrichment snapshots queued during the run
    pub enrichment_outbound: Vec<EnrichmentRecord>,
    /// Outbound era narrative records queued during the run
    pub era_narratives: Vec<EraNarrativeRecord>,
    /// The persisted graph
    pub graph: GraphSnapshot,
}

/// Pearson correlation between the first differences of two series
///
/// Returns 0 when either delta series is constant or the series are too
/// short to correlate.
pub fn delta_correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 3 {
        return 0.0;
    }
    let da: Vec<f64> = a.windows(2).take(n - 1).map(|w| w[1] - w[0]).collect();
    let db: Vec<f64> = b.windows(2).take(n - 1).map(|w| w[1] - w[0]).collect();
    let len = da.len() as f64;
    let mean_a = da.iter().sum::<f64>() / len;
    let mean_b = db.iter().sum::<f64>() / len;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..da.len() {
        let xa = da[i] - mean_a;
        let xb = db[i] - mean_b;
        cov += xa * xb;
        var_a += xa * xa;
        var_b += xb * xb;
    }
    if var_a <= 1e-12 || var_b <= 1e-12 {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

/// Find loops whose observed source/target correlation disagrees with
/// their declared polarity
///
/// Only metric-to-metric loops are evaluated; loops targeting a template
/// or system by name have no target series to correlate.
pub fn evaluate_feedback_loops(
    loops: &[FeedbackLoop],
    series: &IndexMap<String, Vec<f64>>,
) -> Vec<FeedbackMismatch> {
    let mut mismatches = Vec::new();
    for lp in loops {
        let LoopTarget::Metric(target_key) = lp.parsed_target() else {
            continue;
        };
        let (Some(source), Some(target)) = (series.get(&lp.source), series.get(target_key))
        else {
            continue;
        };
        let correlation = delta_correlation(source, target);
        if correlation.abs() < CORRELATION_TOLERANCE {
            continue;
        }
        let mismatch = match lp.polarity {
            LoopPolarity::Negative => correlation > 0.0,
            LoopPolarity::Positive => correlation < 0.0,
        };
        if mismatch {
            mismatches.push(FeedbackMismatch {
                loop_id: lp.id.clone(),
                declared: lp.polarity,
                correlation,
            });
        }
    }
    mismatches
}
