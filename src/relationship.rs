// Copyright 2025 Cowboy AI, LLC.

//! Relationship types for edges in the world graph

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Framework relationship kind: lineage between generations of an entity
pub const REL_SUPERSEDES: &str = "supersedes";
/// Framework relationship kind: containment
pub const REL_PART_OF: &str = "part_of";
/// Framework relationship kind: temporal membership in an era
pub const REL_ACTIVE_DURING: &str = "active_during";

/// Default strength when a relationship is created without one
pub const DEFAULT_STRENGTH: f64 = 0.5;

/// Current-state vs. archived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipStatus {
    /// Participates in current-state analytics
    Active,
    /// Archived; kept for the history log only
    Historical,
}

/// Broad classification used by diversity analytics and culling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipCategory {
    /// Never revised by systems (lineage, geography)
    ImmutableFact,
    /// Power and governance ties
    Political,
    /// Personal ties
    Social,
    /// Organisational ties
    Institutional,
}

impl fmt::Display for RelationshipCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelationshipCategory::ImmutableFact => "immutable_fact",
            RelationshipCategory::Political => "political",
            RelationshipCategory::Social => "social",
            RelationshipCategory::Institutional => "institutional",
        };
        f.write_str(s)
    }
}

/// An edge in the world graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Domain-defined relationship kind
    pub kind: String,
    /// Source entity id
    pub src: String,
    /// Destination entity id
    pub dst: String,
    /// Tie strength in [0, 1]
    pub strength: f64,
    /// Cognitive/spatial similarity in [0, 1]; lower is closer. Set on
    /// lineage links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Broad classification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<RelationshipCategory>,
    /// Tick the relationship was created on
    pub created_at: u64,
    /// Active vs. archived
    pub status: RelationshipStatus,
    /// Tick the relationship was archived on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<u64>,
    /// Id of the catalyst entity that caused this relationship
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalyzed_by: Option<String>,
}

impl Relationship {
    /// Create an active relationship with default strength
    pub fn new(
        kind: impl Into<String>,
        src: impl Into<String>,
        dst: impl Into<String>,
        tick: u64,
    ) -> Self {
        Self {
            kind: kind.into(),
            src: src.into(),
            dst: dst.into(),
            strength: DEFAULT_STRENGTH,
            distance: None,
            category: None,
            created_at: tick,
            status: RelationshipStatus::Active,
            archived_at: None,
            catalyzed_by: None,
        }
    }

    /// Set the strength, clamped to [0, 1]
    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength.clamp(0.0, 1.0);
        self
    }

    /// Set the lineage distance, clamped to [0, 1]
    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance.clamp(0.0, 1.0));
        self
    }

    /// Set the category
    pub fn with_category(mut self, category: RelationshipCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Set the causing catalyst
    pub fn with_catalyst(mut self, entity_id: impl Into<String>) -> Self {
        self.catalyzed_by = Some(entity_id.into());
        self
    }

    /// Whether this edge participates in current-state analytics
    pub fn is_active(&self) -> bool {
        self.status == RelationshipStatus::Active
    }

    /// The identifying triple
    pub fn triple(&self) -> (&str, &str, &str) {
        (self.kind.as_str(), self.src.as_str(), self.dst.as_str())
    }

    /// Whether this edge touches the given entity
    pub fn touches(&self, entity_id: &str) -> bool {
        self.src == entity_id || self.dst == entity_id
    }

    /// Move to historical, stamping the archival tick. No-op when already
    /// archived.
    pub fn archive(&mut self, tick: u64) {
        if self.status == RelationshipStatus::Active {
            self.status = RelationshipStatus::Historical;
            self.archived_at = Some(tick);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test builder defaults
    #[test]
    fn test_relationship_defaults() {
        let r = Relationship::new("member_of", "npc_00001", "faction_00001", 7);
        assert_eq!(r.strength, DEFAULT_STRENGTH);
        assert_eq!(r.distance, None);
        assert_eq!(r.status, RelationshipStatus::Active);
        assert!(r.is_active());
        assert_eq!(r.created_at, 7);
        assert_eq!(r.triple(), ("member_of", "npc_00001", "faction_00001"));
    }

    /// Test strength and distance clamping
    #[test]
    fn test_clamping() {
        let r = Relationship::new("rival_of", "a", "b", 0)
            .with_strength(1.7)
            .with_distance(-0.3);
        assert_eq!(r.strength, 1.0);
        assert_eq!(r.distance, Some(0.0));
    }

    /// Test archiving stamps exactly once
    #[test]
    fn test_archive() {
        let mut r = Relationship::new("active_during", "npc_00001", "era_00001", 2);
        r.archive(30);
        assert_eq!(r.status, RelationshipStatus::Historical);
        assert_eq!(r.archived_at, Some(30));
        assert!(!r.is_active());

        // Second archive keeps the original stamp.
        r.archive(99);
        assert_eq!(r.archived_at, Some(30));
    }

    /// Test touches checks both endpoints
    #[test]
    fn test_touches() {
        let r = Relationship::new("part_of", "loc_00002", "loc_00001", 0);
        assert!(r.touches("loc_00002"));
        assert!(r.touches("loc_00001"));
        assert!(!r.touches("loc_00003"));
    }

    /// Test serde round trip including optional fields
    #[test]
    fn test_relationship_serde() {
        let r = Relationship::new("supersedes", "rules_00002", "rules_00001", 14)
            .with_distance(0.25)
            .with_category(RelationshipCategory::ImmutableFact)
            .with_catalyst("npc_00009");
        let json = serde_json::to_string(&r).unwrap();
        let back: Relationship = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);

        // Optional fields are omitted when unset.
        let bare = Relationship::new("rival_of", "a", "b", 0);
        let json = serde_json::to_string(&bare).unwrap();
        assert!(!json.contains("archived_at"));
        assert!(!json.contains("catalyzed_by"));
    }

    /// Test category display names
    #[test]
    fn test_category_display() {
        assert_eq!(RelationshipCategory::ImmutableFact.to_string(), "immutable_fact");
        assert_eq!(RelationshipCategory::Political.to_string(), "political");
        assert_eq!(RelationshipCategory::Social.to_string(), "social");
        assert_eq!(
            RelationshipCategory::Institutional.to_string(),
            "institutional"
        );
    }
}
