// Copyright 2025 Cowboy AI, LLC.

//! The domain schema registry
//!
//! An immutable description of the domain, loaded once at startup: which
//! entity kinds exist and what subtypes and statuses they allow, which
//! relationship kinds connect them, which cultures and coordinate spaces the
//! world uses, and the tag vocabulary. The engine core is domain-agnostic;
//! this registry is the only place domain vocabulary lives.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::coord::CoordinateSpaceDef;
use crate::coord::placement::ManifoldConfig;
use crate::entity::{Entity, KIND_ERA, KIND_OCCURRENCE};
use crate::relationship::{
    RelationshipCategory, DEFAULT_STRENGTH, REL_ACTIVE_DURING, REL_PART_OF, REL_SUPERSEDES,
};
use crate::tags::TagRegistry;

/// Whether a relationship kind may be revised after creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Mutability {
    /// Never revised once created
    Immutable,
    /// Systems may adjust strength or archive it
    Mutable,
}

/// Inclusive range for lineage distances
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DistanceRange {
    /// Lower bound
    pub min: f64,
    /// Upper bound
    pub max: f64,
}

/// A relationship the kind expects each entity to carry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RequiredRelationship {
    /// Relationship kind expected
    pub relationship_kind: String,
    /// Minimum count per entity
    #[serde(default = "one")]
    pub min: usize,
}

fn one() -> usize {
    1
}

/// Fields captured when an entity is snapshotted for enrichment
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct SnapshotConfig {
    /// Whether the prose description ships with the snapshot
    #[serde(default)]
    pub include_description: bool,
    /// How many related entity names to include as context
    #[serde(default)]
    pub max_related: usize,
}

/// One declared entity kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EntityKindDef {
    /// Kind id
    pub kind: String,
    /// Allowed subtypes; at least one required
    pub subtypes: Vec<String>,
    /// Allowed status values; at least one required
    pub statuses: Vec<String>,
    /// Status assigned when a template does not set one
    pub default_status: String,
    /// Whether entities of this kind carry a culture
    #[serde(default)]
    pub cultured: bool,
    /// Relationships the validator expects each entity to carry
    #[serde(default)]
    pub required_relationships: Vec<RequiredRelationship>,
    /// Enrichment snapshot policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotConfig>,
}

/// One declared relationship kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RelationshipKindDef {
    /// Kind id
    pub kind: String,
    /// Entity kinds allowed at the source end
    pub src_kinds: Vec<String>,
    /// Entity kinds allowed at the destination end
    pub dst_kinds: Vec<String>,
    /// Whether systems may revise it
    pub mutability: Mutability,
    /// Protected kinds are never culled or archived
    #[serde(default)]
    pub protected: bool,
    /// Whether this kind records lineage (ancestor links)
    #[serde(default)]
    pub is_lineage: bool,
    /// Expected lineage distance range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_range: Option<DistanceRange>,
    /// Default strength for new relationships of this kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
    /// Broad classification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<RelationshipCategory>,
    /// Whether several parallel edges may share one (src, dst) pair
    #[serde(default)]
    pub allow_parallel: bool,
    /// Era-scoped kinds are archived when the era they were created in
    /// ends (protected kinds are exempt)
    #[serde(default)]
    pub era_scoped: bool,
    /// Kinds that may not coexist with this one on the same pair
    #[serde(default)]
    pub conflicts_with: Vec<String>,
}

/// An occurrence spawned when a pressure crosses a threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OccurrenceTrigger {
    /// Trigger id, used as the occurrence name stem
    pub id: String,
    /// Pressure watched
    pub pressure: String,
    /// Value at or above which the trigger fires
    pub threshold: f64,
    /// Subtype of the spawned occurrence entity
    pub occurrence_subtype: String,
}

/// The immutable domain description loaded at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DomainSchema {
    /// Domain id
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Domain version string
    pub version: String,
    /// Declared entity kinds
    pub entity_kinds: Vec<EntityKindDef>,
    /// Declared relationship kinds
    pub relationship_kinds: Vec<RelationshipKindDef>,
    /// Declared cultures
    #[serde(default)]
    pub cultures: Vec<String>,
    /// Declared coordinate spaces
    #[serde(default)]
    pub coordinate_spaces: Vec<CoordinateSpaceDef>,
    /// Plane hierarchy for cascade placement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifold: Option<ManifoldConfig>,
    /// Registered tags
    #[serde(default)]
    pub tags: TagRegistry,
    /// Action domains catalysts may operate in
    #[serde(default)]
    pub action_domains: Vec<String>,
    /// Occurrence triggers watched by the driver
    #[serde(default)]
    pub occurrence_triggers: Vec<OccurrenceTrigger>,
}

impl DomainSchema {
    /// The framework relationship kinds every domain carries
    pub fn framework_relationship_kinds() -> [&'static str; 3] {
        [REL_SUPERSEDES, REL_PART_OF, REL_ACTIVE_DURING]
    }

    /// The framework entity kinds every domain carries
    pub fn framework_entity_kinds() -> [&'static str; 2] {
        [KIND_ERA, KIND_OCCURRENCE]
    }

    /// Look up one entity kind
    pub fn entity_kind(&self, kind: &str) -> Option<&EntityKindDef> {
        self.entity_kinds.iter().find(|k| k.kind == kind)
    }

    /// Look up one relationship kind
    pub fn relationship_kind(&self, kind: &str) -> Option<&RelationshipKindDef> {
        self.relationship_kinds.iter().find(|k| k.kind == kind)
    }

    /// Look up one coordinate space
    pub fn coordinate_space(&self, id: &str) -> Option<&CoordinateSpaceDef> {
        self.coordinate_spaces.iter().find(|s| s.id == id)
    }

    /// The space an entity kind is placed in by default
    pub fn default_space_for_kind(&self, kind: &str) -> Option<&CoordinateSpaceDef> {
        self.coordinate_spaces
            .iter()
            .find(|s| s.default_for_kinds.iter().any(|k| k == kind))
    }

    /// All relationship kinds flagged protected, framework lineage included
    pub fn protected_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self
            .relationship_kinds
            .iter()
            .filter(|k| k.protected)
            .map(|k| k.kind.clone())
            .collect();
        for framework in Self::framework_relationship_kinds() {
            if !kinds.iter().any(|k| k == framework) {
                kinds.push(framework.to_string());
            }
        }
        kinds
    }

    /// Default strength for a relationship kind
    pub fn relationship_strength(&self, kind: &str) -> f64 {
        self.relationship_kind(kind)
            .and_then(|k| k.strength)
            .unwrap_or(DEFAULT_STRENGTH)
    }

    /// Declared category for a relationship kind
    pub fn relationship_category(&self, kind: &str) -> Option<RelationshipCategory> {
        self.relationship_kind(kind).and_then(|k| k.category)
    }

    /// Expected lineage distance range for a relationship kind
    pub fn expected_distance_range(&self, kind: &str) -> Option<DistanceRange> {
        self.relationship_kind(kind).and_then(|k| k.distance_range)
    }

    /// First member of `existing_kinds` that conflicts with adding
    /// `new_kind` on the same pair
    pub fn check_relationship_conflict(
        &self,
        existing_kinds: &[String],
        new_kind: &str,
    ) -> Option<String> {
        let def = self.relationship_kind(new_kind)?;
        for existing in existing_kinds {
            if def.conflicts_with.iter().any(|c| c == existing) {
                return Some(existing.clone());
            }
            // Conflicts are symmetric even when declared on one side only.
            if let Some(other) = self.relationship_kind(existing) {
                if other.conflicts_with.iter().any(|c| c == new_kind) {
                    return Some(existing.clone());
                }
            }
        }
        None
    }

    /// Check an entity against its kind's declared structure
    ///
    /// Returns the list of violations; empty means the entity is
    /// structurally valid.
    pub fn validate_entity_structure(&self, entity: &Entity) -> Vec<String> {
        let mut issues = Vec::new();
        let Some(kind) = self.entity_kind(&entity.kind) else {
            issues.push(format!("unknown entity kind '{}'", entity.kind));
            return issues;
        };
        if !kind.subtypes.iter().any(|s| s == &entity.subtype) {
            issues.push(format!(
                "subtype '{}' is not declared for kind '{}'",
                entity.subtype, entity.kind
            ));
        }
        if !kind.statuses.iter().any(|s| s == &entity.status) {
            issues.push(format!(
                "status '{}' is not declared for kind '{}'",
                entity.status, entity.kind
            ));
        }
        match (&entity.culture, kind.cultured) {
            (Some(culture), _) => {
                if !self.cultures.iter().any(|c| c == culture) {
                    issues.push(format!("unknown culture '{culture}'"));
                }
            }
            (None, true) => {
                issues.push(format!(
                    "kind '{}' expects a culture and none is set",
                    entity.kind
                ));
            }
            (None, false) => {}
        }
        for (space_id, _) in &entity.coordinates {
            if self.coordinate_space(space_id).is_none() {
                issues.push(format!("unknown coordinate space '{space_id}'"));
            }
        }
        issues
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::coord::simple_space;

    pub(crate) fn schema() -> DomainSchema {
        DomainSchema {
            id: "tidelands".to_string(),
            name: "The Tidelands".to_string(),
            version: "1".to_string(),
            entity_kinds: vec![
                EntityKindDef {
                    kind: "npc".to_string(),
                    subtypes: vec!["wanderer".to_string(), "captain".to_string()],
                    statuses: vec!["active".to_string(), "historical".to_string()],
                    default_status: "active".to_string(),
                    cultured: true,
                    required_relationships: vec![],
                    snapshot: None,
                },
                EntityKindDef {
                    kind: "faction".to_string(),
                    subtypes: vec!["guild".to_string()],
                    statuses: vec!["active".to_string(), "historical".to_string()],
                    default_status: "active".to_string(),
                    cultured: false,
                    required_relationships: vec![],
                    snapshot: None,
                },
            ],
            relationship_kinds: vec![
                RelationshipKindDef {
                    kind: "member_of".to_string(),
                    src_kinds: vec!["npc".to_string()],
                    dst_kinds: vec!["faction".to_string()],
                    mutability: Mutability::Mutable,
                    protected: false,
                    is_lineage: false,
                    distance_range: None,
                    strength: Some(0.7),
                    category: Some(RelationshipCategory::Institutional),
                    allow_parallel: false,
                    era_scoped: false,
                    conflicts_with: vec!["exiled_from".to_string()],
                },
                RelationshipKindDef {
                    kind: "exiled_from".to_string(),
                    src_kinds: vec!["npc".to_string()],
                    dst_kinds: vec!["faction".to_string()],
                    mutability: Mutability::Mutable,
                    protected: false,
                    is_lineage: false,
                    distance_range: None,
                    strength: None,
                    category: Some(RelationshipCategory::Political),
                    allow_parallel: false,
                    era_scoped: false,
                    conflicts_with: vec![],
                },
                RelationshipKindDef {
                    kind: "derived_from".to_string(),
                    src_kinds: vec!["npc".to_string()],
                    dst_kinds: vec!["npc".to_string()],
                    mutability: Mutability::Immutable,
                    protected: true,
                    is_lineage: true,
                    distance_range: Some(DistanceRange { min: 0.1, max: 0.4 }),
                    strength: None,
                    category: Some(RelationshipCategory::ImmutableFact),
                    allow_parallel: false,
                    era_scoped: false,
                    conflicts_with: vec![],
                },
            ],
            cultures: vec!["tidewalker".to_string(), "duneborn".to_string()],
            coordinate_spaces: vec![simple_space(
                "physical",
                &["overworld"],
                100.0,
                &["surface"],
            )],
            manifold: None,
            tags: TagRegistry::default(),
            action_domains: vec!["warfare".to_string()],
            occurrence_triggers: vec![],
        }
    }

    /// Test lookups and strength/category/distance helpers
    #[test]
    fn test_lookups() {
        let s = schema();
        assert!(s.entity_kind("npc").is_some());
        assert!(s.entity_kind("dragon").is_none());
        assert_eq!(s.relationship_strength("member_of"), 0.7);
        assert_eq!(s.relationship_strength("exiled_from"), DEFAULT_STRENGTH);
        assert_eq!(
            s.relationship_category("member_of"),
            Some(RelationshipCategory::Institutional)
        );
        let range = s.expected_distance_range("derived_from").unwrap();
        assert_eq!(range.min, 0.1);
        assert_eq!(range.max, 0.4);
    }

    /// Test protected kinds always include the framework lineage kinds
    #[test]
    fn test_protected_kinds() {
        let s = schema();
        let protected = s.protected_kinds();
        assert!(protected.contains(&"derived_from".to_string()));
        for framework in DomainSchema::framework_relationship_kinds() {
            assert!(protected.contains(&framework.to_string()));
        }
    }

    /// Test conflicts apply symmetrically
    #[test]
    fn test_relationship_conflict() {
        let s = schema();
        // Declared on member_of's side.
        assert_eq!(
            s.check_relationship_conflict(&["exiled_from".to_string()], "member_of"),
            Some("exiled_from".to_string())
        );
        // Checked from the other side too.
        assert_eq!(
            s.check_relationship_conflict(&["member_of".to_string()], "exiled_from"),
            Some("member_of".to_string())
        );
        assert_eq!(
            s.check_relationship_conflict(&["derived_from".to_string()], "member_of"),
            None
        );
    }

    /// Test structural validation of entities
    #[test]
    fn test_validate_entity_structure() {
        let s = schema();

        let ok = Entity::new("npc_00001", "npc", "wanderer", 0)
            .with_status("active")
            .with_culture("tidewalker");
        assert!(s.validate_entity_structure(&ok).is_empty());

        let bad = Entity::new("npc_00002", "npc", "lich", 0)
            .with_status("undead")
            .with_culture("void");
        let issues = s.validate_entity_structure(&bad);
        assert_eq!(issues.len(), 3);

        let unknown_kind = Entity::new("x", "dragon", "elder", 0);
        let issues = s.validate_entity_structure(&unknown_kind);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("dragon"));

        // Cultured kinds must carry a culture.
        let uncultured = Entity::new("npc_00003", "npc", "wanderer", 0).with_status("active");
        let issues = s.validate_entity_structure(&uncultured);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("culture"));
    }

    /// Test the schema deserialises from the documented JSON shape
    #[test]
    fn test_schema_from_json() {
        let json = serde_json::json!({
            "id": "minimal",
            "name": "Minimal",
            "version": "1",
            "entity_kinds": [{
                "kind": "npc",
                "subtypes": ["wanderer"],
                "statuses": ["active"],
                "default_status": "active"
            }],
            "relationship_kinds": [{
                "kind": "knows",
                "src_kinds": ["npc"],
                "dst_kinds": ["npc"],
                "mutability": "mutable"
            }]
        });
        let s: DomainSchema = serde_json::from_value(json).unwrap();
        assert_eq!(s.entity_kinds.len(), 1);
        assert!(!s.relationship_kind("knows").unwrap().protected);
        assert!(s.cultures.is_empty());
    }
}
