// Copyright 2025 Cowboy AI, LLC.

//! Population tracking
//!
//! One [`MetricEntry`] per declared entity (kind, subtype), relationship
//! kind, and pressure. Entries exist from the first tick even at zero count,
//! so feedback loops always find their source metrics. The tracker
//! re-measures from the graph after every tick; deviation and a smoothed
//! trend drive the feedback controller and the outlier report.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::graph::WorldGraph;

/// What a metric entry measures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetricSource {
    /// Entities of one kind, optionally narrowed to a subtype
    EntityKind {
        /// Entity kind
        kind: String,
        /// Subtype narrowing, when the registry is subtype-scoped
        subtype: Option<String>,
    },
    /// Active relationships of one kind
    RelationshipKind {
        /// Relationship kind
        kind: String,
    },
    /// One named pressure
    Pressure {
        /// Pressure name
        name: String,
    },
}

impl MetricSource {
    /// The canonical metric key feedback loops reference
    pub fn key(&self) -> String {
        match self {
            MetricSource::EntityKind {
                kind,
                subtype: Some(subtype),
            } => format!("entity:{kind}/{subtype}"),
            MetricSource::EntityKind { kind, subtype: None } => format!("entity:{kind}"),
            MetricSource::RelationshipKind { kind } => format!("relationship:{kind}"),
            MetricSource::Pressure { name } => format!("pressure:{name}"),
        }
    }
}

/// Rolling state for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    /// What is measured
    pub source: MetricSource,
    /// Latest measured value
    pub count: f64,
    /// Declared target; zero means untargeted
    pub target: f64,
    /// `(count - target) / target`, zero when untargeted and empty
    pub deviation: f64,
    /// Exponentially-weighted moving average of recent deltas
    pub trend: f64,
    /// Last `window` measured values, oldest first
    pub history: VecDeque<f64>,
}

impl MetricEntry {
    fn new(source: MetricSource, target: f64) -> Self {
        Self {
            source,
            count: 0.0,
            target,
            deviation: Self::deviation_of(0.0, target),
            trend: 0.0,
            history: VecDeque::new(),
        }
    }

    fn deviation_of(count: f64, target: f64) -> f64 {
        if target > 0.0 {
            (count - target) / target
        } else if count > 0.0 {
            // Untargeted but present: report the raw count as the surplus.
            count
        } else {
            0.0
        }
    }
}

/// Entries beyond the deviation threshold, split by sign
#[derive(Debug, Clone, Default)]
pub struct Outliers {
    /// Deviation at or above the threshold
    pub overpopulated: Vec<(String, MetricEntry)>,
    /// Deviation at or below the negated threshold
    pub underpopulated: Vec<(String, MetricEntry)>,
}

/// Per-kind, per-relationship, per-pressure metrics, re-measured every tick
#[derive(Debug, Clone)]
pub struct PopulationTracker {
    entries: IndexMap<String, MetricEntry>,
    window: usize,
    smoothing: f64,
}

impl PopulationTracker {
    /// Tracker with a history window and EWMA smoothing factor in (0, 1]
    pub fn new(window: usize, smoothing: f64) -> Self {
        Self {
            entries: IndexMap::new(),
            window: window.max(1),
            smoothing: smoothing.clamp(0.01, 1.0),
        }
    }

    /// Declare a metric up front, so it exists at zero before anything is
    /// measured
    pub fn declare(&mut self, source: MetricSource, target: f64) {
        let key = source.key();
        self.entries
            .entry(key)
            .or_insert_with(|| MetricEntry::new(source, target));
    }

    /// Read one entry
    pub fn get(&self, key: &str) -> Option<&MetricEntry> {
        self.entries.get(key)
    }

    /// Deviation of one metric; zero when unknown
    pub fn deviation(&self, key: &str) -> f64 {
        self.entries.get(key).map_or(0.0, |e| e.deviation)
    }

    /// Whether a metric key is tracked
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// All entries keyed canonically
    pub fn entries(&self) -> &IndexMap<String, MetricEntry> {
        &self.entries
    }

    /// Re-measure every entry from the graph, updating deviation, trend,
    /// and history; pressures present in the graph but undeclared are
    /// picked up with a zero target
    pub fn measure(&mut self, graph: &WorldGraph) {
        for name in graph.pressures().keys() {
            let source = MetricSource::Pressure { name: name.clone() };
            let key = source.key();
            if !self.entries.contains_key(&key) {
                self.entries.insert(key, MetricEntry::new(source, 0.0));
            }
        }

        for entry in self.entries.values_mut() {
            let count = match &entry.source {
                MetricSource::EntityKind { kind, subtype } => {
                    graph.count_kind(kind, subtype.as_deref()) as f64
                }
                MetricSource::RelationshipKind { kind } => graph
                    .find_relationships(&crate::graph::RelationshipCriteria::kind(kind.clone()))
                    .len() as f64,
                MetricSource::Pressure { name } => graph.pressure(name),
            };
            let delta = count - entry.count;
            entry.trend = self.smoothing * delta + (1.0 - self.smoothing) * entry.trend;
            entry.count = count;
            entry.deviation = MetricEntry::deviation_of(count, entry.target);
            entry.history.push_back(count);
            while entry.history.len() > self.window {
                entry.history.pop_front();
            }
        }
    }

    /// Entries whose |deviation| meets the threshold, split into over- and
    /// under-populated
    pub fn outliers(&self, threshold: f64) -> Outliers {
        let mut out = Outliers::default();
        for (key, entry) in &self.entries {
            if entry.deviation >= threshold {
                out.overpopulated.push((key.clone(), entry.clone()));
            } else if entry.deviation <= -threshold {
                out.underpopulated.push((key.clone(), entry.clone()));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;

    fn graph_with(npcs: usize, factions: usize) -> WorldGraph {
        let mut g = WorldGraph::new([]);
        for i in 0..npcs {
            g.set_entity(Entity::new(format!("npc_{i:05}"), "npc", "wanderer", 0));
        }
        for i in 0..factions {
            g.set_entity(Entity::new(format!("faction_{i:05}"), "faction", "guild", 0));
        }
        g
    }

    /// Test metric keys are canonical
    #[test]
    fn test_metric_keys() {
        assert_eq!(
            MetricSource::EntityKind {
                kind: "npc".to_string(),
                subtype: None
            }
            .key(),
            "entity:npc"
        );
        assert_eq!(
            MetricSource::EntityKind {
                kind: "npc".to_string(),
                subtype: Some("bandit".to_string())
            }
            .key(),
            "entity:npc/bandit"
        );
        assert_eq!(
            MetricSource::RelationshipKind {
                kind: "member_of".to_string()
            }
            .key(),
            "relationship:member_of"
        );
        assert_eq!(
            MetricSource::Pressure {
                name: "conflict".to_string()
            }
            .key(),
            "pressure:conflict"
        );
    }

    /// Test declared entries exist at zero before measurement
    #[test]
    fn test_zero_initialisation() {
        let mut tracker = PopulationTracker::new(10, 0.3);
        tracker.declare(
            MetricSource::EntityKind {
                kind: "npc".to_string(),
                subtype: None,
            },
            10.0,
        );
        let entry = tracker.get("entity:npc").unwrap();
        assert_eq!(entry.count, 0.0);
        assert_eq!(entry.deviation, -1.0);
    }

    /// Test deviation math against targets
    #[test]
    fn test_deviation() {
        let mut tracker = PopulationTracker::new(10, 0.3);
        tracker.declare(
            MetricSource::EntityKind {
                kind: "npc".to_string(),
                subtype: None,
            },
            10.0,
        );
        tracker.declare(
            MetricSource::EntityKind {
                kind: "faction".to_string(),
                subtype: None,
            },
            10.0,
        );

        let g = graph_with(20, 5);
        tracker.measure(&g);

        assert_eq!(tracker.deviation("entity:npc"), 1.0);
        assert_eq!(tracker.deviation("entity:faction"), -0.5);
        assert_eq!(tracker.deviation("entity:unknown"), 0.0);
    }

    /// Test trend smooths recent deltas
    #[test]
    fn test_trend_ewma() {
        let mut tracker = PopulationTracker::new(10, 0.5);
        tracker.declare(
            MetricSource::EntityKind {
                kind: "npc".to_string(),
                subtype: None,
            },
            0.0,
        );

        tracker.measure(&graph_with(4, 0));
        // First delta 4, trend = 0.5 * 4 = 2.
        assert_eq!(tracker.get("entity:npc").unwrap().trend, 2.0);

        tracker.measure(&graph_with(4, 0));
        // Delta 0: trend halves.
        assert_eq!(tracker.get("entity:npc").unwrap().trend, 1.0);
    }

    /// Test the history window is bounded
    #[test]
    fn test_history_window() {
        let mut tracker = PopulationTracker::new(3, 0.5);
        tracker.declare(
            MetricSource::EntityKind {
                kind: "npc".to_string(),
                subtype: None,
            },
            0.0,
        );
        for n in 0..5 {
            tracker.measure(&graph_with(n, 0));
        }
        let entry = tracker.get("entity:npc").unwrap();
        assert_eq!(entry.history.len(), 3);
        assert_eq!(entry.history, VecDeque::from(vec![2.0, 3.0, 4.0]));
    }

    /// Test outlier split by deviation sign
    #[test]
    fn test_outliers() {
        let mut tracker = PopulationTracker::new(10, 0.3);
        tracker.declare(
            MetricSource::EntityKind {
                kind: "npc".to_string(),
                subtype: None,
            },
            10.0,
        );
        tracker.declare(
            MetricSource::EntityKind {
                kind: "faction".to_string(),
                subtype: None,
            },
            10.0,
        );
        tracker.measure(&graph_with(20, 5));

        let outliers = tracker.outliers(0.5);
        assert_eq!(outliers.overpopulated.len(), 1);
        assert_eq!(outliers.overpopulated[0].0, "entity:npc");
        assert_eq!(outliers.underpopulated.len(), 1);
        assert_eq!(outliers.underpopulated[0].0, "entity:faction");

        // A larger threshold drops both.
        let outliers = tracker.outliers(1.1);
        assert!(outliers.overpopulated.is_empty());
        assert!(outliers.underpopulated.is_empty());
    }

    /// Test undeclared pressures are picked up from the graph
    #[test]
    fn test_pressure_pickup() {
        let mut tracker = PopulationTracker::new(10, 0.3);
        let mut g = graph_with(0, 0);
        g.set_pressure("conflict", 42.0);
        tracker.measure(&g);
        assert_eq!(tracker.get("pressure:conflict").unwrap().count, 42.0);
    }

    /// Test subtype-scoped entries count only their subtype
    #[test]
    fn test_subtype_scoping() {
        let mut tracker = PopulationTracker::new(10, 0.3);
        tracker.declare(
            MetricSource::EntityKind {
                kind: "npc".to_string(),
                subtype: Some("captain".to_string()),
            },
            5.0,
        );
        let mut g = graph_with(3, 0);
        g.set_entity(Entity::new("npc_90000", "npc", "captain", 0));
        tracker.measure(&g);
        assert_eq!(tracker.get("entity:npc/captain").unwrap().count, 1.0);
    }
}
