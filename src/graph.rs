// Copyright 2025 Cowboy AI, LLC.

//! The world graph store
//!
//! Sole authority over entities and relationships. Everything else in the
//! engine reads through [`GraphView`] and mutates through the operations
//! here, which keep three derived structures synchronous with every write:
//!
//! - the **tag index** (normalised tag key to entity ids),
//! - the **relationship indices** (by kind, and by kind + source),
//! - the per-entity **link caches** (the inbound/outbound view).
//!
//! Reads hand out owned clones, so callers can never mutate the store
//! through aliasing; borrow-only iteration goes through
//! [`for_each_entity`](WorldGraph::for_each_entity).

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::entity::{normalize_tag_key, Entity, EntityLink, EntityPatch, LinkDirection, Prominence};
use crate::errors::{EngineError, EngineResult};
use crate::history::HistoryRecord;
use crate::relationship::{Relationship, RelationshipCategory};

/// Filter for entity queries; populated fields AND together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityCriteria {
    /// Match this kind
    pub kind: Option<String>,
    /// Match this subtype
    pub subtype: Option<String>,
    /// Match this status
    pub status: Option<String>,
    /// Match this prominence
    pub prominence: Option<Prominence>,
    /// Match this culture
    pub culture: Option<String>,
    /// Match entities carrying this tag key (pre-normalisation key)
    pub tag: Option<String>,
    /// Never match these ids
    pub exclude_ids: Vec<String>,
}

impl EntityCriteria {
    /// Criteria matching one kind
    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    /// Add a subtype filter
    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    /// Add a status filter
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Add a prominence filter
    pub fn with_prominence(mut self, prominence: Prominence) -> Self {
        self.prominence = Some(prominence);
        self
    }

    /// Add a culture filter
    pub fn with_culture(mut self, culture: impl Into<String>) -> Self {
        self.culture = Some(culture.into());
        self
    }

    /// Add a tag filter
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Exclude ids from the result
    pub fn excluding(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.exclude_ids.extend(ids);
        self
    }

    fn matches(&self, entity: &Entity) -> bool {
        if let Some(kind) = &self.kind {
            if &entity.kind != kind {
                return false;
            }
        }
        if let Some(subtype) = &self.subtype {
            if &entity.subtype != subtype {
                return false;
            }
        }
        if let Some(status) = &self.status {
            if &entity.status != status {
                return false;
            }
        }
        if let Some(prominence) = self.prominence {
            if entity.prominence != prominence {
                return false;
            }
        }
        if let Some(culture) = &self.culture {
            if entity.culture.as_deref() != Some(culture.as_str()) {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            let wanted = normalize_tag_key(tag);
            if !entity
                .tags
                .keys()
                .any(|k| normalize_tag_key(k) == wanted)
            {
                return false;
            }
        }
        if self.exclude_ids.iter().any(|id| id == &entity.id) {
            return false;
        }
        true
    }
}

/// Filter for relationship queries; populated fields AND together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationshipCriteria {
    /// Match this kind
    pub kind: Option<String>,
    /// Match this source id
    pub src: Option<String>,
    /// Match this destination id
    pub dst: Option<String>,
    /// Match this category
    pub category: Option<RelationshipCategory>,
    /// Match strength at or above this
    pub min_strength: Option<f64>,
    /// Include archived relationships; current-state only by default
    pub include_historical: bool,
}

impl RelationshipCriteria {
    /// Criteria matching one kind
    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    /// Add a source filter
    pub fn with_src(mut self, src: impl Into<String>) -> Self {
        self.src = Some(src.into());
        self
    }

    /// Add a destination filter
    pub fn with_dst(mut self, dst: impl Into<String>) -> Self {
        self.dst = Some(dst.into());
        self
    }

    /// Add a category filter
    pub fn with_category(mut self, category: RelationshipCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Add a strength floor
    pub fn with_min_strength(mut self, min_strength: f64) -> Self {
        self.min_strength = Some(min_strength);
        self
    }

    fn matches(&self, rel: &Relationship) -> bool {
        if !self.include_historical && !rel.is_active() {
            return false;
        }
        if let Some(kind) = &self.kind {
            if &rel.kind != kind {
                return false;
            }
        }
        if let Some(src) = &self.src {
            if &rel.src != src {
                return false;
            }
        }
        if let Some(dst) = &self.dst {
            if &rel.dst != dst {
                return false;
            }
        }
        if let Some(category) = self.category {
            if rel.category != Some(category) {
                return false;
            }
        }
        if let Some(min) = self.min_strength {
            if rel.strength < min {
                return false;
            }
        }
        true
    }
}

/// Serialisable snapshot of the graph, the shape persisted at run end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// All entities
    pub entities: Vec<Entity>,
    /// All relationships, archived included
    pub relationships: Vec<Relationship>,
    /// Pressure values at snapshot time
    pub pressures: IndexMap<String, f64>,
    /// Tick counter at snapshot time
    pub tick: u64,
    /// Epoch counter at snapshot time
    pub epoch: u64,
    /// Era id at snapshot time
    pub current_era: Option<String>,
}

/// Typed entity/relationship container with dual indexing
pub struct WorldGraph {
    entities: IndexMap<String, Entity>,
    relationships: IndexMap<u64, Relationship>,
    next_relationship_id: u64,
    tag_index: IndexMap<String, IndexSet<String>>,
    rel_by_kind: IndexMap<String, Vec<u64>>,
    rel_by_kind_src: IndexMap<(String, String), Vec<u64>>,
    protected_kinds: IndexSet<String>,
    tick: u64,
    epoch: u64,
    current_era: Option<String>,
    pressures: IndexMap<String, f64>,
    history: Vec<HistoryRecord>,
}

impl WorldGraph {
    /// Empty graph; `protected_kinds` are the relationship kinds that no
    /// removal or archival may touch
    pub fn new(protected_kinds: impl IntoIterator<Item = String>) -> Self {
        Self {
            entities: IndexMap::new(),
            relationships: IndexMap::new(),
            next_relationship_id: 0,
            tag_index: IndexMap::new(),
            rel_by_kind: IndexMap::new(),
            rel_by_kind_src: IndexMap::new(),
            protected_kinds: protected_kinds.into_iter().collect(),
            tick: 0,
            epoch: 0,
            current_era: None,
            pressures: IndexMap::new(),
            history: Vec::new(),
        }
    }

    // ---- clock, era, pressures, history -----------------------------------

    /// Current tick; the sole clock of a run
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Current epoch
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Current era id
    pub fn current_era(&self) -> Option<&str> {
        self.current_era.as_deref()
    }

    /// Advance the tick counter by one
    pub fn advance_tick(&mut self) {
        self.tick += 1;
    }

    /// Advance the epoch counter by one
    pub fn advance_epoch(&mut self) {
        self.epoch += 1;
    }

    /// Enter an era
    pub fn set_era(&mut self, era_id: impl Into<String>) {
        self.current_era = Some(era_id.into());
    }

    /// Read one pressure; absent pressures read as zero
    pub fn pressure(&self, name: &str) -> f64 {
        self.pressures.get(name).copied().unwrap_or(0.0)
    }

    /// All pressures
    pub fn pressures(&self) -> &IndexMap<String, f64> {
        &self.pressures
    }

    /// Set one pressure
    pub fn set_pressure(&mut self, name: impl Into<String>, value: f64) {
        self.pressures.insert(name.into(), value);
    }

    /// Add a delta to one pressure
    pub fn apply_pressure_delta(&mut self, name: &str, delta: f64) {
        let v = self.pressure(name) + delta;
        self.pressures.insert(name.to_string(), v);
    }

    /// Append a history record
    pub fn record(&mut self, record: HistoryRecord) {
        self.history.push(record);
    }

    /// The append-only history log
    pub fn history(&self) -> &[HistoryRecord] {
        &self.history
    }

    // ---- entity reads -----------------------------------------------------

    /// Owned copy of one entity
    pub fn get_entity(&self, id: &str) -> Option<Entity> {
        self.entities.get(id).cloned()
    }

    /// Whether an entity exists
    pub fn has_entity(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// Number of entities
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Owned copies of all entities, insertion order
    pub fn get_entities(&self) -> Vec<Entity> {
        self.entities.values().cloned().collect()
    }

    /// All entity ids, insertion order
    pub fn entity_ids(&self) -> Vec<String> {
        self.entities.keys().cloned().collect()
    }

    /// Borrow-only iteration over entities
    pub fn for_each_entity(&self, mut f: impl FnMut(&Entity)) {
        for entity in self.entities.values() {
            f(entity);
        }
    }

    /// Entities matching the criteria; consults the tag index before
    /// scanning when a tag filter is present
    pub fn find_entities(&self, criteria: &EntityCriteria) -> Vec<Entity> {
        if let Some(tag) = &criteria.tag {
            let key = normalize_tag_key(tag);
            let Some(ids) = self.tag_index.get(key) else {
                return Vec::new();
            };
            return ids
                .iter()
                .filter_map(|id| self.entities.get(id))
                .filter(|e| criteria.matches(e))
                .cloned()
                .collect();
        }
        self.entities
            .values()
            .filter(|e| criteria.matches(e))
            .cloned()
            .collect()
    }

    /// All entities of one kind
    pub fn entities_by_kind(&self, kind: &str) -> Vec<Entity> {
        self.find_entities(&EntityCriteria::kind(kind))
    }

    /// Count entities of one kind, optionally narrowed to a subtype
    pub fn count_kind(&self, kind: &str, subtype: Option<&str>) -> usize {
        self.entities
            .values()
            .filter(|e| e.kind == kind && subtype.map_or(true, |s| e.subtype == s))
            .count()
    }

    /// Entities connected to `id` via active relationships, optionally
    /// narrowed to one relationship kind
    pub fn connected_entities(&self, id: &str, rel_kind: Option<&str>) -> Vec<Entity> {
        let Some(entity) = self.entities.get(id) else {
            return Vec::new();
        };
        let mut seen: IndexSet<&str> = IndexSet::new();
        let mut out = Vec::new();
        for link in &entity.links {
            if let Some(kind) = rel_kind {
                if link.kind != kind {
                    continue;
                }
            }
            let other = link.other();
            if other != id && seen.insert(other) {
                if let Some(e) = self.entities.get(other) {
                    out.push(e.clone());
                }
            }
        }
        out
    }

    // ---- entity mutation --------------------------------------------------

    /// Insert or replace an entity
    ///
    /// The link cache is graph-owned: any links on the incoming value are
    /// discarded and rebuilt from the relationship store.
    pub fn set_entity(&mut self, mut entity: Entity) {
        entity.updated_at = self.tick;
        let id = entity.id.clone();
        if let Some(previous) = self.entities.get(&id) {
            let old_tags: Vec<String> = previous.tags.keys().cloned().collect();
            self.unindex_tags(&id, &old_tags);
        }
        let new_tags: Vec<String> = entity.tags.keys().cloned().collect();
        entity.links = self.links_of(&id);
        self.entities.insert(id.clone(), entity);
        self.index_tags(&id, &new_tags);
    }

    /// Apply a partial update; `false` when the entity does not exist
    pub fn update_entity(&mut self, id: &str, patch: &EntityPatch) -> bool {
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        let old_tags: Vec<String> = entity.tags.keys().cloned().collect();
        patch.apply_to(entity);
        entity.updated_at = self.tick;
        let new_tags: Vec<String> = entity.tags.keys().cloned().collect();
        if old_tags != new_tags {
            let id = id.to_string();
            self.unindex_tags(&id, &old_tags);
            self.index_tags(&id, &new_tags);
        }
        true
    }

    /// Delete an entity and every relationship touching it; `false` when
    /// the entity does not exist
    pub fn delete_entity(&mut self, id: &str) -> bool {
        let Some(entity) = self.entities.shift_remove(id) else {
            return false;
        };
        let tags: Vec<String> = entity.tags.keys().cloned().collect();
        self.unindex_tags(id, &tags);

        // Endpoint existence is an invariant, so the edges go with the node.
        let doomed: Vec<u64> = self
            .relationships
            .iter()
            .filter(|(_, r)| r.touches(id))
            .map(|(rel_id, _)| *rel_id)
            .collect();
        for rel_id in doomed {
            self.remove_relationship_by_id(rel_id);
        }
        true
    }

    // ---- relationship reads -----------------------------------------------

    /// Owned copies of all active relationships
    pub fn relationships(&self) -> Vec<Relationship> {
        self.relationships
            .values()
            .filter(|r| r.is_active())
            .cloned()
            .collect()
    }

    /// Owned copies of every relationship, archived included
    pub fn all_relationships(&self) -> Vec<Relationship> {
        self.relationships.values().cloned().collect()
    }

    /// Number of active relationships
    pub fn relationship_count(&self) -> usize {
        self.relationships.values().filter(|r| r.is_active()).count()
    }

    /// Relationships matching the criteria; consults the kind and
    /// kind+source indices before scanning
    pub fn find_relationships(&self, criteria: &RelationshipCriteria) -> Vec<Relationship> {
        let from_index: Option<&Vec<u64>> = match (&criteria.kind, &criteria.src) {
            (Some(kind), Some(src)) => self
                .rel_by_kind_src
                .get(&(kind.clone(), src.clone())),
            (Some(kind), None) => self.rel_by_kind.get(kind),
            _ => None,
        };
        match from_index {
            Some(ids) => ids
                .iter()
                .filter_map(|id| self.relationships.get(id))
                .filter(|r| criteria.matches(r))
                .cloned()
                .collect(),
            None if criteria.kind.is_some() => Vec::new(),
            None => self
                .relationships
                .values()
                .filter(|r| criteria.matches(r))
                .cloned()
                .collect(),
        }
    }

    /// Active relationships touching one entity, optionally one direction
    pub fn entity_relationships(
        &self,
        id: &str,
        direction: Option<LinkDirection>,
    ) -> Vec<Relationship> {
        self.relationships
            .values()
            .filter(|r| r.is_active())
            .filter(|r| match direction {
                Some(LinkDirection::Outbound) => r.src == id,
                Some(LinkDirection::Inbound) => r.dst == id,
                None => r.touches(id),
            })
            .cloned()
            .collect()
    }

    /// Whether an active relationship exists between two entities,
    /// optionally of one kind
    pub fn has_relationship(&self, src: &str, dst: &str, kind: Option<&str>) -> bool {
        if let Some(kind) = kind {
            if let Some(ids) = self
                .rel_by_kind_src
                .get(&(kind.to_string(), src.to_string()))
            {
                return ids.iter().any(|id| {
                    self.relationships
                        .get(id)
                        .is_some_and(|r| r.is_active() && r.dst == dst)
                });
            }
            return false;
        }
        self.relationships
            .values()
            .any(|r| r.is_active() && r.src == src && r.dst == dst)
    }

    /// Active relationship kinds present between a pair, either direction
    pub fn kinds_between(&self, a: &str, b: &str) -> Vec<String> {
        let mut kinds: IndexSet<String> = IndexSet::new();
        for r in self.relationships.values().filter(|r| r.is_active()) {
            if (r.src == a && r.dst == b) || (r.src == b && r.dst == a) {
                kinds.insert(r.kind.clone());
            }
        }
        kinds.into_iter().collect()
    }

    // ---- relationship mutation --------------------------------------------

    /// Insert a fully-formed relationship; rejected (`false`) when either
    /// endpoint is unknown
    pub fn push_relationship(&mut self, rel: Relationship) -> bool {
        if !self.entities.contains_key(&rel.src) || !self.entities.contains_key(&rel.dst) {
            warn!(
                kind = %rel.kind,
                src = %rel.src,
                dst = %rel.dst,
                "rejected relationship with unknown endpoint"
            );
            return false;
        }
        let rel_id = self.next_relationship_id;
        self.next_relationship_id += 1;

        self.rel_by_kind
            .entry(rel.kind.clone())
            .or_default()
            .push(rel_id);
        self.rel_by_kind_src
            .entry((rel.kind.clone(), rel.src.clone()))
            .or_default()
            .push(rel_id);

        if rel.is_active() {
            self.add_links_for(&rel);
        }
        let tick = self.tick;
        if let Some(e) = self.entities.get_mut(&rel.src) {
            e.updated_at = tick;
        }
        if let Some(e) = self.entities.get_mut(&rel.dst) {
            e.updated_at = tick;
        }
        self.relationships.insert(rel_id, rel);
        true
    }

    /// Create and insert a relationship with the given attributes
    pub fn add_relationship(
        &mut self,
        kind: impl Into<String>,
        src: impl Into<String>,
        dst: impl Into<String>,
        strength: Option<f64>,
        distance: Option<f64>,
        category: Option<RelationshipCategory>,
    ) -> bool {
        let mut rel = Relationship::new(kind, src, dst, self.tick);
        if let Some(s) = strength {
            rel = rel.with_strength(s);
        }
        if let Some(d) = distance {
            rel = rel.with_distance(d);
        }
        if let Some(c) = category {
            rel = rel.with_category(c);
        }
        self.push_relationship(rel)
    }

    /// Remove the first active relationship matching the triple; protected
    /// kinds are never removed
    pub fn remove_relationship(&mut self, src: &str, dst: &str, kind: &str) -> bool {
        if self.protected_kinds.contains(kind) {
            warn!(kind, "refused to remove protected relationship");
            return false;
        }
        let Some(rel_id) = self.find_relationship_id(src, dst, kind) else {
            return false;
        };
        self.remove_relationship_by_id(rel_id);
        true
    }

    /// Archive the first active relationship matching the triple; protected
    /// kinds are never archived
    pub fn archive_relationship(&mut self, src: &str, dst: &str, kind: &str) -> bool {
        if self.protected_kinds.contains(kind) {
            return false;
        }
        let Some(rel_id) = self.find_relationship_id(src, dst, kind) else {
            return false;
        };
        let tick = self.tick;
        let rel = match self.relationships.get_mut(&rel_id) {
            Some(r) => {
                r.archive(tick);
                r.clone()
            }
            None => return false,
        };
        // Archived edges leave the current-state link view.
        self.remove_links_for(&rel);
        true
    }

    /// Replace the entire relationship list, rebuilding all indices and
    /// link caches; relationships with unknown endpoints are dropped
    pub fn set_relationships(&mut self, relationships: Vec<Relationship>) {
        self.relationships.clear();
        self.rel_by_kind.clear();
        self.rel_by_kind_src.clear();
        self.next_relationship_id = 0;
        for entity in self.entities.values_mut() {
            entity.links.clear();
        }
        for rel in relationships {
            self.push_relationship(rel);
        }
    }

    /// Whether a relationship kind is protected from removal and archival
    pub fn is_protected_kind(&self, kind: &str) -> bool {
        self.protected_kinds.contains(kind)
    }

    /// How many entities carry a tag key (post `name:*` normalisation)
    pub fn tag_usage(&self, key: &str) -> usize {
        self.tag_index
            .get(normalize_tag_key(key))
            .map_or(0, IndexSet::len)
    }

    // ---- snapshot and audit ------------------------------------------------

    /// Serialisable copy of the whole graph
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            entities: self.get_entities(),
            relationships: self.all_relationships(),
            pressures: self.pressures.clone(),
            tick: self.tick,
            epoch: self.epoch,
            current_era: self.current_era.clone(),
        }
    }

    /// Verify the structural invariants; a failure here is a core bug and
    /// aborts the run
    pub fn audit(&self) -> EngineResult<()> {
        for (key, entity) in &self.entities {
            if key != &entity.id {
                return Err(EngineError::InvariantViolation(format!(
                    "entity stored under key {key} carries id {}",
                    entity.id
                )));
            }
            for link in &entity.links {
                let backed = self.relationships.values().any(|r| {
                    r.is_active() && r.kind == link.kind && r.src == link.src && r.dst == link.dst
                });
                if !backed {
                    return Err(EngineError::InvariantViolation(format!(
                        "link {} {} -> {} on {} has no backing relationship",
                        link.kind, link.src, link.dst, entity.id
                    )));
                }
            }
        }
        for rel in self.relationships.values() {
            if !self.entities.contains_key(&rel.src) || !self.entities.contains_key(&rel.dst) {
                return Err(EngineError::InvariantViolation(format!(
                    "relationship {} {} -> {} references a missing entity",
                    rel.kind, rel.src, rel.dst
                )));
            }
            if rel.is_active() {
                let mirrored = self
                    .entities
                    .get(&rel.src)
                    .is_some_and(|e| {
                        e.links.iter().any(|l| {
                            l.kind == rel.kind && l.src == rel.src && l.dst == rel.dst
                        })
                    });
                if !mirrored {
                    return Err(EngineError::InvariantViolation(format!(
                        "relationship {} {} -> {} is not mirrored in the source link cache",
                        rel.kind, rel.src, rel.dst
                    )));
                }
            }
        }
        Ok(())
    }

    // ---- internals ---------------------------------------------------------

    fn find_relationship_id(&self, src: &str, dst: &str, kind: &str) -> Option<u64> {
        let ids = self
            .rel_by_kind_src
            .get(&(kind.to_string(), src.to_string()))?;
        ids.iter()
            .find(|id| {
                self.relationships
                    .get(*id)
                    .is_some_and(|r| r.is_active() && r.dst == dst)
            })
            .copied()
    }

    fn remove_relationship_by_id(&mut self, rel_id: u64) {
        let Some(rel) = self.relationships.shift_remove(&rel_id) else {
            return;
        };
        if let Some(ids) = self.rel_by_kind.get_mut(&rel.kind) {
            ids.retain(|id| *id != rel_id);
        }
        if let Some(ids) = self
            .rel_by_kind_src
            .get_mut(&(rel.kind.clone(), rel.src.clone()))
        {
            ids.retain(|id| *id != rel_id);
        }
        self.remove_links_for(&rel);
    }

    fn add_links_for(&mut self, rel: &Relationship) {
        let outbound = EntityLink {
            kind: rel.kind.clone(),
            src: rel.src.clone(),
            dst: rel.dst.clone(),
            direction: LinkDirection::Outbound,
        };
        if let Some(e) = self.entities.get_mut(&rel.src) {
            e.links.push(outbound);
        }
        if rel.src != rel.dst {
            let inbound = EntityLink {
                kind: rel.kind.clone(),
                src: rel.src.clone(),
                dst: rel.dst.clone(),
                direction: LinkDirection::Inbound,
            };
            if let Some(e) = self.entities.get_mut(&rel.dst) {
                e.links.push(inbound);
            }
        }
    }

    fn remove_links_for(&mut self, rel: &Relationship) {
        let strip = |links: &mut Vec<EntityLink>| {
            if let Some(pos) = links
                .iter()
                .position(|l| l.kind == rel.kind && l.src == rel.src && l.dst == rel.dst)
            {
                links.remove(pos);
            }
        };
        if let Some(e) = self.entities.get_mut(&rel.src) {
            strip(&mut e.links);
        }
        if rel.src != rel.dst {
            if let Some(e) = self.entities.get_mut(&rel.dst) {
                strip(&mut e.links);
            }
        }
    }

    /// Rebuild the link view for one entity from the relationship store
    fn links_of(&self, id: &str) -> Vec<EntityLink> {
        let mut links = Vec::new();
        for rel in self.relationships.values().filter(|r| r.is_active()) {
            if rel.src == id {
                links.push(EntityLink {
                    kind: rel.kind.clone(),
                    src: rel.src.clone(),
                    dst: rel.dst.clone(),
                    direction: LinkDirection::Outbound,
                });
            } else if rel.dst == id {
                links.push(EntityLink {
                    kind: rel.kind.clone(),
                    src: rel.src.clone(),
                    dst: rel.dst.clone(),
                    direction: LinkDirection::Inbound,
                });
            }
        }
        links
    }

    fn index_tags(&mut self, id: &str, tag_keys: &[String]) {
        for key in tag_keys {
            self.tag_index
                .entry(normalize_tag_key(key).to_string())
                .or_default()
                .insert(id.to_string());
        }
    }

    fn unindex_tags(&mut self, id: &str, tag_keys: &[String]) {
        for key in tag_keys {
            let normalized = normalize_tag_key(key);
            if let Some(set) = self.tag_index.get_mut(normalized) {
                set.shift_remove(id);
                if set.is_empty() {
                    self.tag_index.shift_remove(normalized);
                }
            }
        }
    }
}

/// Read-only facade over the graph
///
/// Templates, systems, and contract predicates reach the graph only through
/// this view, so they can never mutate mid-tick.
#[derive(Clone, Copy)]
pub struct GraphView<'a> {
    graph: &'a WorldGraph,
}

impl<'a> GraphView<'a> {
    /// Wrap a graph
    pub fn new(graph: &'a WorldGraph) -> Self {
        Self { graph }
    }

    /// Current tick
    pub fn tick(&self) -> u64 {
        self.graph.tick()
    }

    /// Current epoch
    pub fn epoch(&self) -> u64 {
        self.graph.epoch()
    }

    /// Current era id
    pub fn current_era(&self) -> Option<&str> {
        self.graph.current_era()
    }

    /// Read one pressure
    pub fn pressure(&self, name: &str) -> f64 {
        self.graph.pressure(name)
    }

    /// All pressures
    pub fn pressures(&self) -> &IndexMap<String, f64> {
        self.graph.pressures()
    }

    /// The history log so far
    pub fn history(&self) -> &[HistoryRecord] {
        self.graph.history()
    }

    /// Owned copy of one entity
    pub fn get_entity(&self, id: &str) -> Option<Entity> {
        self.graph.get_entity(id)
    }

    /// Whether an entity exists
    pub fn has_entity(&self, id: &str) -> bool {
        self.graph.has_entity(id)
    }

    /// Number of entities
    pub fn entity_count(&self) -> usize {
        self.graph.entity_count()
    }

    /// Entities matching the criteria
    pub fn find_entities(&self, criteria: &EntityCriteria) -> Vec<Entity> {
        self.graph.find_entities(criteria)
    }

    /// All entities of one kind
    pub fn entities_by_kind(&self, kind: &str) -> Vec<Entity> {
        self.graph.entities_by_kind(kind)
    }

    /// Count entities of one kind, optionally narrowed to a subtype
    pub fn count_kind(&self, kind: &str, subtype: Option<&str>) -> usize {
        self.graph.count_kind(kind, subtype)
    }

    /// Entities connected to `id` via active relationships
    pub fn connected_entities(&self, id: &str, rel_kind: Option<&str>) -> Vec<Entity> {
        self.graph.connected_entities(id, rel_kind)
    }

    /// Relationships matching the criteria
    pub fn find_relationships(&self, criteria: &RelationshipCriteria) -> Vec<Relationship> {
        self.graph.find_relationships(criteria)
    }

    /// Active relationships touching one entity
    pub fn entity_relationships(
        &self,
        id: &str,
        direction: Option<LinkDirection>,
    ) -> Vec<Relationship> {
        self.graph.entity_relationships(id, direction)
    }

    /// Whether an active relationship exists between two entities
    pub fn has_relationship(&self, src: &str, dst: &str, kind: Option<&str>) -> bool {
        self.graph.has_relationship(src, dst, kind)
    }

    /// Active relationship kinds present between a pair
    pub fn kinds_between(&self, a: &str, b: &str) -> Vec<String> {
        self.graph.kinds_between(a, b)
    }

    /// Number of active relationships
    pub fn relationship_count(&self) -> usize {
        self.graph.relationship_count()
    }
}
