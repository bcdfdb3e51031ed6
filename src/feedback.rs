// Copyright 2025 Cowboy AI, LLC.

//! The feedback-loop controller
//!
//! Feedback loops are data, not code: each declares a polarity, a source
//! metric, a target, a strength, and a delay. The controller turns
//! source-metric deviations into scale factors applied on top of the era's
//! base weights. It never replaces an era modifier, only scales it, and
//! every output is clamped.
//!
//! Targets come in two shapes. A metric key (`entity:npc`,
//! `relationship:member_of`, `pressure:conflict`) adjusts every template or
//! system that declares it produces or affects that metric. A direct key
//! (`template:<id>`, `system:<id>`) adjusts one template or system by name.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::tracker::PopulationTracker;

/// Floor for system modifiers after scaling
pub const SYSTEM_MODIFIER_MIN: f64 = 0.2;
/// Ceiling for system modifiers after scaling
pub const SYSTEM_MODIFIER_MAX: f64 = 2.0;

/// Whether source growth amplifies or suppresses the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoopPolarity {
    /// Source above target pushes the target up
    Positive,
    /// Source above target pushes the target down
    Negative,
}

/// One declared feedback loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FeedbackLoop {
    /// Loop id, for validation and reporting
    pub id: String,
    /// Polarity of the response
    pub polarity: LoopPolarity,
    /// Source metric key, e.g. `entity:npc` or `pressure:conflict`
    pub source: String,
    /// Target: a metric key, or `template:<id>` / `system:<id>`
    pub target: String,
    /// Response strength; scales the source deviation
    pub strength: f64,
    /// Ticks between observation and effect
    #[serde(default)]
    pub delay: u64,
}

/// The target half of a feedback loop, parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopTarget<'a> {
    /// One growth template's weight, by id
    Template(&'a str),
    /// One simulation system's modifier, by id
    System(&'a str),
    /// Every template/system touching this metric key
    Metric(&'a str),
}

impl FeedbackLoop {
    /// Parse the target key
    pub fn parsed_target(&self) -> LoopTarget<'_> {
        if let Some(id) = self.target.strip_prefix("template:") {
            LoopTarget::Template(id)
        } else if let Some(id) = self.target.strip_prefix("system:") {
            LoopTarget::System(id)
        } else {
            LoopTarget::Metric(&self.target)
        }
    }
}

#[derive(Debug, Clone)]
struct PendingAdjustment {
    apply_at_tick: u64,
    target: String,
    factor: f64,
}

/// Turns tracked deviations into era-modifier scale factors
#[derive(Debug, Clone)]
pub struct FeedbackController {
    loops: Vec<FeedbackLoop>,
    correction_strength: f64,
    min_template_weight: f64,
    max_template_weight: f64,
    pending: VecDeque<PendingAdjustment>,
    scales: IndexMap<String, f64>,
}

impl FeedbackController {
    /// Controller over the declared loops
    pub fn new(
        loops: Vec<FeedbackLoop>,
        correction_strength: f64,
        min_template_weight: f64,
        max_template_weight: f64,
    ) -> Self {
        Self {
            loops,
            correction_strength: correction_strength.max(0.0),
            min_template_weight,
            max_template_weight,
            pending: VecDeque::new(),
            scales: IndexMap::new(),
        }
    }

    /// The declared loops
    pub fn loops(&self) -> &[FeedbackLoop] {
        &self.loops
    }

    /// Observe the current metrics, queueing adjustments after their
    /// declared delay, then apply everything that has come due
    pub fn update(&mut self, tick: u64, tracker: &PopulationTracker) {
        for lp in &self.loops {
            let deviation = tracker.deviation(&lp.source);
            let raw = (deviation * lp.strength)
                .clamp(-self.correction_strength, self.correction_strength);
            let factor = match lp.polarity {
                LoopPolarity::Positive => 1.0 + raw,
                LoopPolarity::Negative => 1.0 - raw,
            };
            self.pending.push_back(PendingAdjustment {
                apply_at_tick: tick + lp.delay,
                target: lp.target.clone(),
                factor,
            });
        }

        // Apply everything due; later observations win.
        let mut keep = VecDeque::with_capacity(self.pending.len());
        while let Some(adj) = self.pending.pop_front() {
            if adj.apply_at_tick <= tick {
                debug!(target = %adj.target, factor = adj.factor, "feedback adjustment applied");
                self.scales.insert(adj.target, adj.factor.max(0.0));
            } else {
                keep.push_back(adj);
            }
        }
        self.pending = keep;
    }

    /// Current scale for a raw target key; identity when no loop has fired
    fn scale(&self, target: &str) -> f64 {
        self.scales.get(target).copied().unwrap_or(1.0)
    }

    /// Combined scale: the direct key times every produced-metric key
    fn combined_scale(&self, direct_key: &str, metric_keys: &[String]) -> f64 {
        let mut factor = self.scale(direct_key);
        for key in metric_keys {
            factor *= self.scale(key);
        }
        factor
    }

    /// Effective weight of a template: era base scaled by its direct key
    /// and its produced metrics, then clamped
    pub fn template_weight(
        &self,
        template_id: &str,
        era_base: f64,
        produced_metrics: &[String],
    ) -> f64 {
        let scale = self.combined_scale(&format!("template:{template_id}"), produced_metrics);
        (era_base * scale).clamp(self.min_template_weight, self.max_template_weight)
    }

    /// Effective modifier of a system: era base scaled by its direct key
    /// and its affected metrics, then clamped to [0.2, 2.0]
    pub fn system_modifier(
        &self,
        system_id: &str,
        era_base: f64,
        affected_metrics: &[String],
    ) -> f64 {
        let scale = self.combined_scale(&format!("system:{system_id}"), affected_metrics);
        (era_base * scale).clamp(SYSTEM_MODIFIER_MIN, SYSTEM_MODIFIER_MAX)
    }
}
