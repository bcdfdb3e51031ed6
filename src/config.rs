// Copyright 2025 Cowboy AI, LLC.

//! Engine configuration
//!
//! Split in two: [`EngineSettings`] is pure data (loadable from JSON,
//! schema-described), while [`EngineConfig`] adds the code-shaped parts a
//! run needs: the domain schema, growth templates, simulation systems, and
//! per-kind registries with their ancestor finders.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::distribution::DistributionTargets;
use crate::entity::Entity;
use crate::feedback::FeedbackLoop;
use crate::graph::GraphView;
use crate::runtime::{GrowthTemplate, SimulationSystem};
use crate::schema::DomainSchema;

/// One era in sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EraConfig {
    /// Era id, recorded on history records and `active_during` links
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Base template weights for the era; unlisted templates weigh 1.0
    #[serde(default)]
    pub template_weights: Vec<WeightEntry>,
    /// Base system modifiers for the era; unlisted systems run at 1.0
    #[serde(default)]
    pub system_modifiers: Vec<WeightEntry>,
    /// Epochs this era runs; the engine-wide `epoch_length` otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch_override: Option<u32>,
    /// Distribution-target overrides while the era runs; numeric fields
    /// only, anything else is ignored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_overrides: Option<serde_json::Value>,
}

/// A template or system id with its era base weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WeightEntry {
    /// Template or system id
    pub id: String,
    /// Base weight
    pub weight: f64,
}

impl EraConfig {
    /// Base weight of a template in this era
    pub fn template_weight(&self, template_id: &str) -> f64 {
        self.template_weights
            .iter()
            .find(|w| w.id == template_id)
            .map_or(1.0, |w| w.weight)
    }

    /// Base modifier of a system in this era
    pub fn system_modifier(&self, system_id: &str) -> f64 {
        self.system_modifiers
            .iter()
            .find(|w| w.id == system_id)
            .map_or(1.0, |w| w.weight)
    }
}

/// One named pressure with its dynamics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PressureConfig {
    /// Pressure name
    pub name: String,
    /// Starting value
    #[serde(default)]
    pub initial: f64,
    /// Flat growth added each epoch
    #[serde(default)]
    pub growth_per_epoch: f64,
    /// Fraction of the current value shed each epoch, in [0, 1]
    #[serde(default)]
    pub decay: f64,
}

/// Knobs for the feedback machinery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TuningConfig {
    /// Cap on any single feedback adjustment
    #[serde(default = "default_correction_strength")]
    pub correction_strength: f64,
    /// Floor for effective template weights
    #[serde(default = "default_min_template_weight")]
    pub min_template_weight: f64,
    /// Ceiling for effective template weights
    #[serde(default = "default_max_template_weight")]
    pub max_template_weight: f64,
    /// Diversity attenuation strength in the target selector
    #[serde(default = "default_diversity_strength")]
    pub diversity_strength: f64,
    /// EWMA smoothing for metric trends
    #[serde(default = "default_trend_smoothing")]
    pub trend_smoothing: f64,
    /// Metric history window, in ticks
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// |deviation| at which a population counts as an outlier
    #[serde(default = "default_outlier_threshold")]
    pub outlier_threshold: f64,
}

fn default_correction_strength() -> f64 {
    0.5
}
fn default_min_template_weight() -> f64 {
    0.1
}
fn default_max_template_weight() -> f64 {
    5.0
}
fn default_diversity_strength() -> f64 {
    0.5
}
fn default_trend_smoothing() -> f64 {
    0.3
}
fn default_history_window() -> usize {
    20
}
fn default_outlier_threshold() -> f64 {
    0.5
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            correction_strength: default_correction_strength(),
            min_template_weight: default_min_template_weight(),
            max_template_weight: default_max_template_weight(),
            diversity_strength: default_diversity_strength(),
            trend_smoothing: default_trend_smoothing(),
            history_window: default_history_window(),
            outlier_threshold: default_outlier_threshold(),
        }
    }
}

/// The data half of a run's configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EngineSettings {
    /// Root seed; equal seeds give equal runs
    #[serde(default)]
    pub seed: u64,
    /// Epochs per era (unless an era overrides it); at least 1
    pub epoch_length: u32,
    /// Simulation ticks before each growth tick; at least 1
    pub simulation_ticks_per_growth: u32,
    /// Population target per declared kind; at least 1
    pub target_entities_per_kind: u32,
    /// Hard tick ceiling for the run
    pub max_ticks: u64,
    /// Multiplier on population targets for the safety valve
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,
    /// Eras in order
    pub eras: Vec<EraConfig>,
    /// Declared pressures
    #[serde(default)]
    pub pressures: Vec<PressureConfig>,
    /// Declared feedback loops
    #[serde(default)]
    pub feedback_loops: Vec<FeedbackLoop>,
    /// Distribution targets; defaults apply when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_targets: Option<DistributionTargets>,
    /// Feedback tuning
    #[serde(default)]
    pub tuning: TuningConfig,
}

fn default_scale_factor() -> f64 {
    1.0
}

/// Finds the ancestor an entity descends from, for lineage links
pub type AncestorFinder =
    Box<dyn Fn(&GraphView<'_>, &Entity) -> Option<String> + Send + Sync>;

/// Lineage policy for one registry
pub struct LineageSpec {
    /// Relationship kind the lineage pass creates
    pub relationship_kind: String,
    /// Ancestor lookup
    pub find_ancestor: AncestorFinder,
}

impl fmt::Debug for LineageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineageSpec")
            .field("relationship_kind", &self.relationship_kind)
            .finish_non_exhaustive()
    }
}

/// Population registry for one (kind, subtype?) bucket
#[derive(Debug)]
pub struct EntityRegistry {
    /// Entity kind
    pub kind: String,
    /// Subtype scope; the whole kind when absent
    pub subtype: Option<String>,
    /// Population target
    pub target: u32,
    /// Lineage policy, when entities of this bucket descend from ancestors
    pub lineage: Option<LineageSpec>,
}

impl EntityRegistry {
    /// Registry for a whole kind
    pub fn new(kind: impl Into<String>, target: u32) -> Self {
        Self {
            kind: kind.into(),
            subtype: None,
            target,
            lineage: None,
        }
    }

    /// Narrow the registry to one subtype
    pub fn scoped(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    /// Attach a lineage policy
    pub fn with_lineage(mut self, lineage: LineageSpec) -> Self {
        self.lineage = Some(lineage);
        self
    }

    /// Whether this registry covers the given (kind, subtype)
    pub fn covers(&self, kind: &str, subtype: Option<&str>) -> bool {
        if self.kind != kind {
            return false;
        }
        match (&self.subtype, subtype) {
            (Some(mine), Some(theirs)) => mine == theirs,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// Everything one run needs
pub struct EngineConfig {
    /// The immutable domain description
    pub domain: DomainSchema,
    /// Data settings
    pub settings: EngineSettings,
    /// Population registries
    pub registries: Vec<EntityRegistry>,
    /// Growth templates
    pub templates: Vec<Box<dyn GrowthTemplate>>,
    /// Simulation systems
    pub systems: Vec<Box<dyn SimulationSystem>>,
    /// Entities present before the first tick
    pub seed_entities: Vec<Entity>,
}
