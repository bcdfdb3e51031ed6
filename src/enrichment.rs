// Copyright 2025 Cowboy AI, LLC.

//! Enrichment side-channel
//!
//! The enrichment collaborator rewrites names and descriptions outside the
//! core. The core's half of the contract is small: a non-blocking outbound
//! queue of per-entity snapshots and per-era narrative records, and an
//! inbound merge queue drained between ticks. The safe-merge pass applies
//! only non-structural fields: name, description, and tag values. Ids,
//! kinds, and links never change through this channel.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::entity::{Entity, TagValue};
use crate::graph::WorldGraph;
use crate::schema::DomainSchema;

/// Outbound per-entity snapshot for the enrichment collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    /// Entity the record describes
    pub entity_id: String,
    /// Entity kind
    pub kind: String,
    /// Name before enrichment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_name: Option<String>,
    /// Name after enrichment, when already known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    /// Description snapshot, when the kind's policy ships one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tag keys at snapshot time
    #[serde(default)]
    pub tags: Vec<String>,
    /// Names of related entities, for context
    #[serde(default)]
    pub related_names: Vec<String>,
    /// Free-form notes for the collaborator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lore_notes: Option<String>,
    /// Tick the snapshot was taken on
    pub tick: u64,
}

/// Outbound per-era narrative record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EraNarrativeRecord {
    /// Era id
    pub era_id: String,
    /// Era display name
    pub name: String,
    /// First tick of the era
    pub start_tick: u64,
    /// Last tick, absent while the era is still running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_tick: Option<u64>,
    /// Entity ids prominent during the era
    #[serde(default)]
    pub notable_entities: Vec<String>,
}

/// Inbound enrichment result; only non-structural fields
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnrichmentMerge {
    /// Entity to update
    pub entity_id: String,
    /// Replacement name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Replacement description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Replacement values for existing labelled tags, by key
    #[serde(default)]
    pub tag_values: Vec<(String, String)>,
}

/// Both directions of the side-channel
#[derive(Debug, Default)]
pub struct EnrichmentChannel {
    outbound: Vec<EnrichmentRecord>,
    outbound_eras: Vec<EraNarrativeRecord>,
    inbound: VecDeque<EnrichmentMerge>,
}

impl EnrichmentChannel {
    /// Empty channel
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot an entity onto the outbound queue; non-blocking
    ///
    /// `related_names` is context the caller gathered (names of connected
    /// entities); the kind's snapshot policy caps how many ship.
    pub fn enqueue_entity(
        &mut self,
        schema: &DomainSchema,
        entity: &Entity,
        mut related_names: Vec<String>,
        tick: u64,
    ) {
        let policy = schema
            .entity_kind(&entity.kind)
            .and_then(|k| k.snapshot.as_ref());
        related_names.truncate(policy.map_or(0, |p| p.max_related));
        let record = EnrichmentRecord {
            entity_id: entity.id.clone(),
            kind: entity.kind.clone(),
            old_name: if entity.name.is_empty() {
                None
            } else {
                Some(entity.name.clone())
            },
            new_name: None,
            description: policy.and_then(|p| {
                if p.include_description && !entity.description.is_empty() {
                    Some(entity.description.clone())
                } else {
                    None
                }
            }),
            tags: entity.tags.keys().cloned().collect(),
            related_names,
            lore_notes: None,
            tick,
        };
        self.outbound.push(record);
    }

    /// Queue an era narrative record; non-blocking
    pub fn enqueue_era(&mut self, record: EraNarrativeRecord) {
        self.outbound_eras.push(record);
    }

    /// Hand an enrichment result back to the core
    pub fn submit_merge(&mut self, merge: EnrichmentMerge) {
        self.inbound.push_back(merge);
    }

    /// Pending inbound merges
    pub fn pending_merges(&self) -> usize {
        self.inbound.len()
    }

    /// Take everything queued for the collaborator
    pub fn take_outbound(&mut self) -> (Vec<EnrichmentRecord>, Vec<EraNarrativeRecord>) {
        (
            std::mem::take(&mut self.outbound),
            std::mem::take(&mut self.outbound_eras),
        )
    }

    /// Drain inbound merges into the graph; returns how many entities
    /// changed
    ///
    /// The pass may only touch `name`, `description`, and the values of
    /// tags the entity already carries. Merges for unknown entities are
    /// dropped.
    pub fn drain_merges(&mut self, graph: &mut WorldGraph) -> usize {
        let mut applied = 0;
        while let Some(merge) = self.inbound.pop_front() {
            let Some(mut entity) = graph.get_entity(&merge.entity_id) else {
                debug!(entity = %merge.entity_id, "enrichment merge for unknown entity dropped");
                continue;
            };
            let mut changed = false;
            if let Some(name) = &merge.name {
                if &entity.name != name {
                    entity.name = name.clone();
                    changed = true;
                }
            }
            if let Some(description) = &merge.description {
                if &entity.description != description {
                    entity.description = description.clone();
                    changed = true;
                }
            }
            for (key, value) in &merge.tag_values {
                // Only values of existing keys; the tag set itself is
                // structural and stays put.
                if entity.tags.contains_key(key) {
                    entity
                        .tags
                        .insert(key.clone(), TagValue::Labelled(value.clone()));
                    changed = true;
                }
            }
            if changed {
                graph.set_entity(entity);
                applied += 1;
            }
        }
        applied
    }
}
