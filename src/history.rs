// Copyright 2025 Cowboy AI, LLC.

//! History log records
//!
//! The graph keeps one append-only history log per run. Every growth, every
//! system fire, every era transition, and every noteworthy miss (skipped
//! template, failed placement, contract warning) leaves exactly one record.

use serde::{Deserialize, Serialize};

/// One entry in the run's append-only history log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryRecord {
    /// A growth template fired
    Growth {
        /// Tick the growth happened on
        tick: u64,
        /// Template that fired
        template_id: String,
        /// Ids of the entities it created
        created_entities: Vec<String>,
        /// How many relationships it created (lineage included)
        created_relationships: usize,
        /// Template-provided narration
        description: String,
    },
    /// A template was considered and skipped
    TemplateSkipped {
        /// Tick of the attempt
        tick: u64,
        /// Template that was skipped
        template_id: String,
        /// Gate, saturation, or applicability reason
        reason: String,
    },
    /// A simulation system fired
    SystemFired {
        /// Tick the system ran on
        tick: u64,
        /// System that ran
        system_id: String,
        /// Effective modifier it ran under
        modifier: f64,
        /// Relationships it added
        relationships_added: usize,
        /// Entities it modified
        entities_modified: usize,
        /// System-provided narration
        description: String,
    },
    /// The driver advanced to a new era
    EraTransition {
        /// Tick of the transition
        tick: u64,
        /// Previous era, absent at the first transition
        from: Option<String>,
        /// New era
        to: String,
    },
    /// Era cleanup archived temporal relationships
    EraArchived {
        /// Tick of the cleanup
        tick: u64,
        /// Era whose relationships were archived
        era_id: String,
        /// How many relationships moved to historical
        relationships_archived: usize,
    },
    /// The safety valve stopped the run
    SafetyValve {
        /// Tick the valve fired on
        tick: u64,
        /// Entity count at the time
        entity_count: usize,
        /// The configured limit
        limit: usize,
    },
    /// The run was cancelled from outside
    Cancelled {
        /// Tick the cancellation was observed on
        tick: u64,
    },
    /// Placement cascaded off its preferred plane
    PlacementCascade {
        /// Tick of the placement
        tick: u64,
        /// Kind being placed
        entity_kind: String,
        /// Saturated plane
        from_plane: String,
        /// Plane that accepted the entity
        to_plane: String,
    },
    /// Placement exhausted its budget (and any fallback)
    PlacementFailure {
        /// Tick of the attempt
        tick: u64,
        /// Template whose placement failed
        template_id: String,
        /// Kind that could not be placed
        entity_kind: String,
    },
    /// An affects-contract check disagreed with realised output
    ContractWarning {
        /// Tick of the check
        tick: u64,
        /// Template whose contract disagreed
        template_id: String,
        /// What disagreed
        message: String,
    },
    /// Tag-coverage enforcement suggested an adjustment
    TagSuggestion {
        /// Tick of the suggestion
        tick: u64,
        /// Entity the suggestion applies to
        entity_id: String,
        /// The suggested adjustment
        message: String,
    },
}

impl HistoryRecord {
    /// The tick this record was logged on
    pub fn tick(&self) -> u64 {
        match self {
            HistoryRecord::Growth { tick, .. }
            | HistoryRecord::TemplateSkipped { tick, .. }
            | HistoryRecord::SystemFired { tick, .. }
            | HistoryRecord::EraTransition { tick, .. }
            | HistoryRecord::EraArchived { tick, .. }
            | HistoryRecord::SafetyValve { tick, .. }
            | HistoryRecord::Cancelled { tick }
            | HistoryRecord::PlacementCascade { tick, .. }
            | HistoryRecord::PlacementFailure { tick, .. }
            | HistoryRecord::ContractWarning { tick, .. }
            | HistoryRecord::TagSuggestion { tick, .. } => *tick,
        }
    }

    /// Whether this record marks a run-ending condition
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HistoryRecord::SafetyValve { .. } | HistoryRecord::Cancelled { .. }
        )
    }
}
