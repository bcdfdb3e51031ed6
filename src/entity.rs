// Copyright 2025 Cowboy AI, LLC.

//! Entity types with identity and lifecycle
//!
//! Entities are the nodes of the world graph. Their `kind`, `subtype`,
//! `status`, and `culture` vocabularies are domain-defined and validated
//! against the [`DomainSchema`](crate::schema::DomainSchema); the engine
//! itself only reserves the framework kinds `era` and `occurrence`.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::coord::Coordinate;

/// Framework entity kind for eras
pub const KIND_ERA: &str = "era";
/// Framework entity kind for occurrences (dated events in the world)
pub const KIND_OCCURRENCE: &str = "occurrence";

/// Five-level narrative importance
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Prominence {
    /// Nobody remembers this ever existed
    Forgotten,
    /// Known only locally
    Marginal,
    /// Known within its sphere
    Recognized,
    /// Widely known
    Renowned,
    /// Legend-grade
    Mythic,
}

impl Prominence {
    /// All prominence levels, lowest first
    pub const ALL: [Prominence; 5] = [
        Prominence::Forgotten,
        Prominence::Marginal,
        Prominence::Recognized,
        Prominence::Renowned,
        Prominence::Mythic,
    ];

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Prominence::Forgotten => "forgotten",
            Prominence::Marginal => "marginal",
            Prominence::Recognized => "recognized",
            Prominence::Renowned => "renowned",
            Prominence::Mythic => "mythic",
        }
    }
}

impl fmt::Display for Prominence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tag value: either a bare flag or a labelled string
///
/// On the wire a flag is the JSON literal `true` and a labelled value is a
/// string, matching the tag maps consumed by the enrichment collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagValue {
    /// Presence-only tag
    Flag,
    /// Tag carrying a string value
    Labelled(String),
}

impl TagValue {
    /// The string value, when labelled
    pub fn label(&self) -> Option<&str> {
        match self {
            TagValue::Flag => None,
            TagValue::Labelled(s) => Some(s),
        }
    }
}

impl Serialize for TagValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TagValue::Flag => serializer.serialize_bool(true),
            TagValue::Labelled(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for TagValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TagValueVisitor;

        impl Visitor<'_> for TagValueVisitor {
            type Value = TagValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("true or a string")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<TagValue, E> {
                if v {
                    Ok(TagValue::Flag)
                } else {
                    Err(E::custom("tag flags must be true"))
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<TagValue, E> {
                Ok(TagValue::Labelled(v.to_string()))
            }
        }

        deserializer.deserialize_any(TagValueVisitor)
    }
}

/// Tag map keyed by tag name, iteration order preserved
pub type TagMap = IndexMap<String, TagValue>;

/// Collapse `name:*` tag keys into the single wildcard bucket used by
/// saturation accounting and the tag index
pub fn normalize_tag_key(key: &str) -> &str {
    if key.starts_with("name:") {
        "name:*"
    } else {
        key
    }
}

/// Direction of a cached link relative to its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkDirection {
    /// Owner is the relationship source
    Outbound,
    /// Owner is the relationship destination
    Inbound,
}

/// A cached view of one relationship touching an entity
///
/// The graph store maintains these; every link mirrors a relationship in the
/// global list with the same `(src, dst, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityLink {
    /// Relationship kind
    pub kind: String,
    /// Source entity id
    pub src: String,
    /// Destination entity id
    pub dst: String,
    /// Which end the owning entity is
    pub direction: LinkDirection,
}

impl EntityLink {
    /// The id at the far end of the link
    pub fn other(&self) -> &str {
        match self.direction {
            LinkDirection::Outbound => &self.dst,
            LinkDirection::Inbound => &self.src,
        }
    }
}

/// One event caused by a catalyst entity, append-only
///
/// Holds only ids of other entities, never back-pointers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalystEvent {
    /// Tick the event happened on
    pub tick: u64,
    /// Action domain the event falls under
    pub domain: String,
    /// What happened
    pub description: String,
    /// Entities involved, by id
    pub involved: Vec<String>,
}

/// Can-act marker carried by entities able to cause events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Catalyst {
    /// Whether the entity can currently act
    pub can_act: bool,
    /// Action domains this catalyst operates in
    pub domains: Vec<String>,
    /// Influence scalar in [0, 1]
    pub influence: f64,
    /// History of caused events, oldest first
    pub history: Vec<CatalystEvent>,
}

impl Catalyst {
    /// Append a caused event to the history
    pub fn record(&mut self, event: CatalystEvent) {
        self.history.push(event);
    }
}

/// Temporal extent for eras and occurrences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalSpan {
    /// First tick of the span
    pub start_tick: u64,
    /// Last tick, `None` while still open
    pub end_tick: Option<u64>,
}

/// A node in the world graph
///
/// ```mermaid
/// graph TD
///     E[Entity] -->|classified by| K[kind / subtype]
///     E -->|narrative weight| P[prominence]
///     E -->|cached view| L[links]
///     E -->|multi-space| C[coordinates]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable opaque id, unique within a run
    pub id: String,
    /// Domain-defined primary classification
    pub kind: String,
    /// Domain-defined secondary classification within the kind
    pub subtype: String,
    /// Display name
    pub name: String,
    /// Prose description
    pub description: String,
    /// Domain-defined status within the kind
    pub status: String,
    /// Narrative importance
    pub prominence: Prominence,
    /// Domain-defined culture, when the kind carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub culture: Option<String>,
    /// Tag map; enforcement targets 3 to 5 entries
    #[serde(default)]
    pub tags: TagMap,
    /// Cached inbound/outbound relationship view, graph-maintained
    #[serde(default)]
    pub links: Vec<EntityLink>,
    /// Tick the entity was created on
    pub created_at: u64,
    /// Tick the entity was last mutated on
    pub updated_at: u64,
    /// Can-act marker, for entities able to cause events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalyst: Option<Catalyst>,
    /// Temporal extent, for eras and occurrences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalSpan>,
    /// Position per coordinate space
    #[serde(default)]
    pub coordinates: IndexMap<String, Coordinate>,
}

impl Entity {
    /// Create an entity with the minimum identity fields; everything else
    /// takes neutral defaults
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        subtype: impl Into<String>,
        tick: u64,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            subtype: subtype.into(),
            name: String::new(),
            description: String::new(),
            status: String::new(),
            prominence: Prominence::Marginal,
            culture: None,
            tags: TagMap::new(),
            links: Vec::new(),
            created_at: tick,
            updated_at: tick,
            catalyst: None,
            temporal: None,
            coordinates: IndexMap::new(),
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the status
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    /// Set the prominence
    pub fn with_prominence(mut self, prominence: Prominence) -> Self {
        self.prominence = prominence;
        self
    }

    /// Set the culture
    pub fn with_culture(mut self, culture: impl Into<String>) -> Self {
        self.culture = Some(culture.into());
        self
    }

    /// Add a flag tag
    pub fn with_tag(mut self, key: impl Into<String>) -> Self {
        self.tags.insert(key.into(), TagValue::Flag);
        self
    }

    /// Add a labelled tag
    pub fn with_labelled_tag(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.tags.insert(key.into(), TagValue::Labelled(value.into()));
        self
    }

    /// Set the coordinate in one space
    pub fn with_coordinate(mut self, space: impl Into<String>, coordinate: Coordinate) -> Self {
        self.coordinates.insert(space.into(), coordinate);
        self
    }

    /// Total relationships touching this entity, per the link cache
    pub fn total_relationships(&self) -> usize {
        self.links.len()
    }

    /// Count links of one relationship kind, either direction
    pub fn link_count(&self, kind: &str) -> usize {
        self.links.iter().filter(|l| l.kind == kind).count()
    }

    /// Whether a tag key is present (after `name:*` normalisation neither
    /// side is collapsed; this is the raw key)
    pub fn has_tag(&self, key: &str) -> bool {
        self.tags.contains_key(key)
    }
}

/// A partial update applied through `WorldGraph::update_entity`
///
/// `None` fields are left untouched; `tags` and `coordinates` replace the
/// whole map when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityPatch {
    /// New subtype
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// New name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// New prominence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prominence: Option<Prominence>,
    /// New culture
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub culture: Option<String>,
    /// Full replacement tag map
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagMap>,
    /// Full replacement coordinate map
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<IndexMap<String, Coordinate>>,
    /// New catalyst state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalyst: Option<Catalyst>,
    /// New temporal span
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalSpan>,
}

impl EntityPatch {
    /// Patch that only changes the status
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }

    /// Patch that only changes the prominence
    pub fn prominence(prominence: Prominence) -> Self {
        Self {
            prominence: Some(prominence),
            ..Self::default()
        }
    }

    /// Apply this patch to an entity in place
    pub(crate) fn apply_to(&self, entity: &mut Entity) {
        if let Some(v) = &self.subtype {
            entity.subtype = v.clone();
        }
        if let Some(v) = &self.name {
            entity.name = v.clone();
        }
        if let Some(v) = &self.description {
            entity.description = v.clone();
        }
        if let Some(v) = &self.status {
            entity.status = v.clone();
        }
        if let Some(v) = self.prominence {
            entity.prominence = v;
        }
        if let Some(v) = &self.culture {
            entity.culture = Some(v.clone());
        }
        if let Some(v) = &self.tags {
            entity.tags = v.clone();
        }
        if let Some(v) = &self.coordinates {
            entity.coordinates = v.clone();
        }
        if let Some(v) = &self.catalyst {
            entity.catalyst = Some(v.clone());
        }
        if let Some(v) = self.temporal {
            entity.temporal = Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test tag values serialise to `true` / string and back
    #[test]
    fn test_tag_value_serde() {
        let json = serde_json::to_string(&TagValue::Flag).unwrap();
        assert_eq!(json, "true");
        let json = serde_json::to_string(&TagValue::Labelled("coastal".to_string())).unwrap();
        assert_eq!(json, "\"coastal\"");

        let v: TagValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, TagValue::Flag);
        let v: TagValue = serde_json::from_str("\"ruined\"").unwrap();
        assert_eq!(v, TagValue::Labelled("ruined".to_string()));
        assert!(serde_json::from_str::<TagValue>("false").is_err());
    }

    /// Test the name wildcard normalisation
    #[test]
    fn test_normalize_tag_key() {
        assert_eq!(normalize_tag_key("name:harbor"), "name:*");
        assert_eq!(normalize_tag_key("name:"), "name:*");
        assert_eq!(normalize_tag_key("biome:tundra"), "biome:tundra");
        assert_eq!(normalize_tag_key("renamed"), "renamed");
    }

    /// Test prominence ordering and round trip
    #[test]
    fn test_prominence() {
        assert!(Prominence::Forgotten < Prominence::Mythic);
        assert_eq!(Prominence::ALL.len(), 5);
        for p in Prominence::ALL {
            let json = serde_json::to_string(&p).unwrap();
            assert_eq!(json, format!("\"{p}\""));
            let back: Prominence = serde_json::from_str(&json).unwrap();
            assert_eq!(back, p);
        }
    }

    /// Test link direction resolution
    #[test]
    fn test_entity_link_other() {
        let link = EntityLink {
            kind: "member_of".to_string(),
            src: "npc_00001".to_string(),
            dst: "faction_00001".to_string(),
            direction: LinkDirection::Outbound,
        };
        assert_eq!(link.other(), "faction_00001");

        let link = EntityLink {
            direction: LinkDirection::Inbound,
            ..link
        };
        assert_eq!(link.other(), "npc_00001");
    }

    /// Test entity builder defaults and counters
    #[test]
    fn test_entity_builder() {
        let e = Entity::new("npc_00001", "npc", "wanderer", 3)
            .with_name("Brine Karsk")
            .with_status("active")
            .with_prominence(Prominence::Recognized)
            .with_culture("tidewalker")
            .with_tag("seafarer")
            .with_labelled_tag("role", "navigator");

        assert_eq!(e.created_at, 3);
        assert_eq!(e.updated_at, 3);
        assert_eq!(e.tags.len(), 2);
        assert!(e.has_tag("seafarer"));
        assert_eq!(e.tags["role"], TagValue::Labelled("navigator".to_string()));
        assert_eq!(e.total_relationships(), 0);
    }

    /// Test per-kind link counting
    #[test]
    fn test_link_count() {
        let mut e = Entity::new("npc_00001", "npc", "wanderer", 0);
        for i in 0..3 {
            e.links.push(EntityLink {
                kind: "member_of".to_string(),
                src: e.id.clone(),
                dst: format!("faction_{i:05}"),
                direction: LinkDirection::Outbound,
            });
        }
        e.links.push(EntityLink {
            kind: "rival_of".to_string(),
            src: "npc_00002".to_string(),
            dst: e.id.clone(),
            direction: LinkDirection::Inbound,
        });

        assert_eq!(e.link_count("member_of"), 3);
        assert_eq!(e.link_count("rival_of"), 1);
        assert_eq!(e.total_relationships(), 4);
    }

    /// Test patches only touch the fields they carry
    #[test]
    fn test_entity_patch() {
        let mut e = Entity::new("npc_00001", "npc", "wanderer", 0)
            .with_name("Brine Karsk")
            .with_status("active");

        EntityPatch::status("historical").apply_to(&mut e);
        assert_eq!(e.status, "historical");
        assert_eq!(e.name, "Brine Karsk");

        let patch = EntityPatch {
            subtype: Some("captain".to_string()),
            prominence: Some(Prominence::Renowned),
            ..EntityPatch::default()
        };
        patch.apply_to(&mut e);
        assert_eq!(e.subtype, "captain");
        assert_eq!(e.prominence, Prominence::Renowned);
        assert_eq!(e.status, "historical");
    }

    /// Test catalyst history is append-only in order
    #[test]
    fn test_catalyst_history() {
        let mut c = Catalyst {
            can_act: true,
            domains: vec!["warfare".to_string()],
            influence: 0.7,
            history: Vec::new(),
        };
        c.record(CatalystEvent {
            tick: 10,
            domain: "warfare".to_string(),
            description: "razed the harbor".to_string(),
            involved: vec!["location_00004".to_string()],
        });
        c.record(CatalystEvent {
            tick: 12,
            domain: "warfare".to_string(),
            description: "sued for peace".to_string(),
            involved: vec![],
        });
        assert_eq!(c.history.len(), 2);
        assert!(c.history[0].tick < c.history[1].tick);
    }

    /// Test entity serde round trip
    #[test]
    fn test_entity_serde_round_trip() {
        let e = Entity::new("loc_00001", "location", "harbor", 5)
            .with_name("Graywater")
            .with_status("active")
            .with_tag("coastal")
            .with_labelled_tag("name:style", "nautical");
        let json = serde_json::to_string(&e).unwrap();
        let back: Entity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
