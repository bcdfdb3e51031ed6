// Copyright 2025 Cowboy AI, LLC.

//! Template and system runtime
//!
//! Growth templates propose new entities and relationships; simulation
//! systems transform what already exists. The runtime owns the tick
//! mechanics around both: weighting, gating, target selection, id
//! assignment, placement, the lineage pass, committing through the graph
//! API, and the advisory affects check.
//!
//! Templates never see the mutable graph. They receive a [`GraphView`] and
//! return an [`Expansion`]; the runtime is the only writer.

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::config::{EntityRegistry, EraConfig};
use crate::contract::{
    check_contract_enabled_by, check_saturation, lineage_pass, validate_affects, ProducedKind,
    RealizedEffects, TemplateContract,
};
use crate::coord::placement::{
    ExistingPoint, PlacementBatch, PlacementEngine, PlacementScheme,
};
use crate::entity::{Entity, EntityPatch};
use crate::errors::{EngineError, EngineResult};
use crate::feedback::FeedbackController;
use crate::graph::{GraphView, WorldGraph};
use crate::history::HistoryRecord;
use crate::relationship::Relationship;
use crate::rng::EngineRng;
use crate::schema::DomainSchema;
use crate::selector::{TargetSelector, TargetSpec};
use crate::tags::TagCoverageSuggestion;

/// Placeholder prefix templates use to reference entities created in the
/// same expansion, by index: `$new:0`, `$new:1`, ...
pub const NEW_ENTITY_REF: &str = "$new:";

/// Declarative facts about a template, consulted by saturation, the
/// feedback controller, and the validator
#[derive(Debug, Clone, Default)]
pub struct TemplateMetadata {
    /// Entity kinds the template produces
    pub produces: Vec<ProducedKind>,
    /// Relationship kinds the template produces
    pub produces_relationships: Vec<String>,
}

impl TemplateMetadata {
    /// Metric keys for everything this template produces, the handles
    /// metric-targeted feedback loops adjust through
    pub fn metric_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .produces
            .iter()
            .map(|p| match &p.subtype {
                Some(subtype) => format!("entity:{}/{subtype}", p.kind),
                None => format!("entity:{}", p.kind),
            })
            .collect();
        keys.extend(
            self.produces_relationships
                .iter()
                .map(|kind| format!("relationship:{kind}")),
        );
        keys
    }
}

/// What one template firing proposes
#[derive(Debug, Default)]
pub struct Expansion {
    /// New entities; empty ids are assigned by the runtime
    pub new_entities: Vec<Entity>,
    /// New relationships; endpoints may use `$new:<index>` placeholders
    pub new_relationships: Vec<Relationship>,
    /// Pressure deltas the firing applies
    pub pressure_changes: Vec<(String, f64)>,
    /// Narration for the history log
    pub description: String,
}

/// A declarative generator of new entities and relationships
pub trait GrowthTemplate: Send + Sync {
    /// Stable template id
    fn id(&self) -> &str;

    /// Cheap applicability check run after contract gating
    fn can_apply(&self, _view: &GraphView<'_>) -> bool {
        true
    }

    /// Target selection spec; the anti-hub selector resolves it
    fn target_spec(&self, _view: &GraphView<'_>) -> Option<TargetSpec> {
        None
    }

    /// Produce the expansion for this firing
    fn expand(
        &self,
        view: &GraphView<'_>,
        targets: &[Entity],
        rng: &mut EngineRng,
    ) -> EngineResult<Expansion>;

    /// Gate conditions and declared effects
    fn contract(&self) -> Option<&TemplateContract> {
        None
    }

    /// Declarative production facts
    fn metadata(&self) -> Option<&TemplateMetadata> {
        None
    }

    /// Placement scheme for entities the template leaves unplaced
    fn placement(&self) -> Option<&PlacementScheme> {
        None
    }

    /// Simpler scheme tried once when the primary placement exhausts
    fn fallback_placement(&self) -> Option<&PlacementScheme> {
        None
    }
}

/// What one system application proposes
#[derive(Debug, Default)]
pub struct SystemOutcome {
    /// Relationships to add
    pub relationships: Vec<Relationship>,
    /// Entity patches to apply
    pub entity_modifications: Vec<(String, EntityPatch)>,
    /// Pressure deltas to apply
    pub pressure_changes: Vec<(String, f64)>,
    /// Narration for the history log
    pub description: String,
}

/// A recurring transformer of graph state
pub trait SimulationSystem: Send + Sync {
    /// Stable system id
    fn id(&self) -> &str;

    /// Run once under the given modifier
    fn apply(
        &self,
        view: &GraphView<'_>,
        modifier: f64,
        rng: &mut EngineRng,
    ) -> EngineResult<SystemOutcome>;

    /// Gate conditions
    fn contract(&self) -> Option<&TemplateContract> {
        None
    }

    /// Metric keys this system moves, the handles metric-targeted feedback
    /// loops adjust through
    fn affected_metrics(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Summary of one growth tick
#[derive(Debug, Clone, Default)]
pub struct GrowthOutcome {
    /// Template that fired
    pub template_id: String,
    /// Ids of the entities created
    pub created_ids: Vec<String>,
    /// Relationships committed (lineage included)
    pub relationships_added: usize,
}

/// Deterministic per-kind id mint
#[derive(Debug, Default)]
pub struct IdSequence {
    counters: IndexMap<String, u64>,
}

impl IdSequence {
    /// Fresh sequence
    pub fn new() -> Self {
        Self::default()
    }

    /// Next unused id for a kind; skips ids already present in the graph
    pub fn next(&mut self, kind: &str, graph: &WorldGraph) -> String {
        loop {
            let counter = self.counters.entry(kind.to_string()).or_insert(0);
            *counter += 1;
            let id = format!("{kind}_{counter:05}");
            if !graph.has_entity(&id) {
                return id;
            }
        }
    }
}

/// Gathers every placed coordinate in one space, for placement exclusion
pub fn placement_points(graph: &WorldGraph, space_id: &str) -> Vec<ExistingPoint> {
    let mut points = Vec::new();
    graph.for_each_entity(|entity| {
        if let Some(coordinate) = entity.coordinates.get(space_id) {
            points.push(ExistingPoint {
                id: Some(entity.id.clone()),
                kind: entity.kind.clone(),
                coordinate: coordinate.clone(),
            });
        }
    });
    points
}

/// Executes growth and system ticks against the graph
pub struct TemplateRuntime {
    selector: TargetSelector,
    ids: IdSequence,
}

impl TemplateRuntime {
    /// Runtime with the given selector diversity strength
    pub fn new(diversity_strength: f64) -> Self {
        Self {
            selector: TargetSelector::new(diversity_strength),
            ids: IdSequence::new(),
        }
    }

    /// Mint an id from the runtime's shared sequence, for callers that
    /// create framework entities (eras, occurrences) outside a template
    pub fn mint_id(&mut self, kind: &str, graph: &WorldGraph) -> String {
        self.ids.next(kind, graph)
    }

    /// Run one growth tick: weight, gate, sample, select targets, expand,
    /// place, run lineage, commit, and validate affects
    ///
    /// Returns `Ok(None)` when no template is eligible this tick.
    #[allow(clippy::too_many_arguments)]
    pub fn growth_tick(
        &mut self,
        graph: &mut WorldGraph,
        templates: &[Box<dyn GrowthTemplate>],
        era: &EraConfig,
        feedback: &FeedbackController,
        placement: &mut PlacementEngine<'_>,
        registries: &[EntityRegistry],
        schema: &DomainSchema,
        rng: &mut EngineRng,
    ) -> EngineResult<Option<GrowthOutcome>> {
        let tick = graph.tick();

        // Phase 1: score every template, recording skips.
        let mut eligible: Vec<(usize, f64)> = Vec::new();
        let mut skips: Vec<HistoryRecord> = Vec::new();
        {
            let view = GraphView::new(graph);
            for (index, template) in templates.iter().enumerate() {
                let produced = template
                    .metadata()
                    .map(TemplateMetadata::metric_keys)
                    .unwrap_or_default();
                let weight = feedback.template_weight(
                    template.id(),
                    era.template_weight(template.id()),
                    &produced,
                );
                if weight <= 0.0 {
                    continue;
                }
                if let Some(contract) = template.contract() {
                    let decision = check_contract_enabled_by(&view, contract);
                    if !decision.allowed {
                        skips.push(HistoryRecord::TemplateSkipped {
                            tick,
                            template_id: template.id().to_string(),
                            reason: decision
                                .reason
                                .unwrap_or_else(|| "contract gate failed".to_string()),
                        });
                        continue;
                    }
                }
                if let Some(metadata) = template.metadata() {
                    if !metadata.produces.is_empty() {
                        let decision =
                            check_saturation(&view, &metadata.produces, registries);
                        if decision.saturated {
                            skips.push(HistoryRecord::TemplateSkipped {
                                tick,
                                template_id: template.id().to_string(),
                                reason: format!("saturated: {}", decision.detail),
                            });
                            continue;
                        }
                    }
                }
                if !template.can_apply(&view) {
                    skips.push(HistoryRecord::TemplateSkipped {
                        tick,
                        template_id: template.id().to_string(),
                        reason: "can_apply returned false".to_string(),
                    });
                    continue;
                }
                eligible.push((index, weight));
            }
        }
        for record in skips {
            graph.record(record);
        }
        if eligible.is_empty() {
            debug!(tick, "no eligible growth template");
            return Ok(None);
        }

        // Phase 2: weighted-random sample.
        let weights: Vec<f64> = eligible.iter().map(|(_, w)| *w).collect();
        let Some(winner) = rng.pick_weighted(&weights) else {
            return Ok(None);
        };
        let template = &templates[eligible[winner].0];

        // Phase 3: resolve targets, manufacturing replacements if the
        // selector says everyone is saturated.
        let mut targets: Vec<Entity> = Vec::new();
        let mut factory_made: Vec<Entity> = Vec::new();
        {
            let view = GraphView::new(graph);
            if let Some(spec) = template.target_spec(&view) {
                let outcome = self.selector.select(&view, schema, &spec, rng);
                targets = outcome.targets;
                factory_made = outcome.created;
            }
        }
        for entity in &mut factory_made {
            if entity.id.is_empty() {
                entity.id = self.ids.next(&entity.kind, graph);
            }
        }
        targets.extend(factory_made.iter().cloned());

        // Phase 4: expand.
        let expansion = {
            let view = GraphView::new(graph);
            template.expand(&view, &targets, rng)?
        };
        let Expansion {
            new_entities: expansion_entities,
            new_relationships: proposed_relationships,
            pressure_changes,
            description,
        } = expansion;

        // Factory-made targets are new entities too: they join the commit
        // pipeline ahead of the expansion's own. Placeholder indices refer
        // to the expansion's entities, so they sit past the factory's.
        let placeholder_offset = factory_made.len();
        let mut new_entities = factory_made;
        new_entities.extend(expansion_entities);

        // Phase 5: assign ids, stamp, default statuses, enforce tag
        // saturation, place.
        let mut placeholder_ids: Vec<String> = Vec::new();
        let mut placement_records: Vec<HistoryRecord> = Vec::new();
        let mut batch = PlacementBatch::new();
        for entity in &mut new_entities {
            if entity.id.is_empty() {
                entity.id = self.ids.next(&entity.kind, graph);
            }
            placeholder_ids.push(entity.id.clone());
            entity.created_at = tick;
            entity.updated_at = tick;
            if entity.status.is_empty() {
                if let Some(kind) = schema.entity_kind(&entity.kind) {
                    entity.status = kind.default_status.clone();
                }
            }

            let keys: Vec<String> = entity.tags.keys().cloned().collect();
            let saturation = schema
                .tags
                .check_tag_saturation(&keys, |key| graph.tag_usage(key));
            if !saturation.allowed {
                for rejected in &saturation.rejected {
                    entity
                        .tags
                        .retain(|key, _| crate::entity::normalize_tag_key(key) != rejected.as_str());
                }
                placement_records.push(HistoryRecord::TagSuggestion {
                    tick,
                    entity_id: entity.id.clone(),
                    message: format!("tags at capacity dropped: {}", saturation.rejected.join(", ")),
                });
            }

            self.place_entity(
                entity,
                template.as_ref(),
                placement,
                graph,
                schema,
                &mut batch,
                &mut placement_records,
                rng,
            )?;
        }
        for record in placement_records {
            graph.record(record);
        }

        // Phase 6: resolve placeholders in proposed relationships.
        let resolve = |id: &str| -> EngineResult<String> {
            if let Some(index) = id.strip_prefix(NEW_ENTITY_REF) {
                let index: usize = index.parse().map_err(|_| EngineError::InvalidExpansion {
                    source_id: template.id().to_string(),
                    reason: format!("bad placeholder '{id}'"),
                })?;
                placeholder_ids
                    .get(placeholder_offset + index)
                    .cloned()
                    .ok_or_else(|| EngineError::InvalidExpansion {
                        source_id: template.id().to_string(),
                        reason: format!("placeholder '{id}' is out of range"),
                    })
            } else {
                Ok(id.to_string())
            }
        };
        let mut relationships: Vec<Relationship> = Vec::new();
        for mut rel in proposed_relationships {
            rel.src = resolve(&rel.src)?;
            rel.dst = resolve(&rel.dst)?;
            rel.created_at = tick;
            relationships.push(rel);
        }

        // Phase 7: commit entities, then the lineage pass over them.
        for entity in &new_entities {
            graph.set_entity(entity.clone());
        }
        {
            let view = GraphView::new(graph);
            let lineage = lineage_pass(&view, &new_entities, registries, schema, rng);
            relationships.extend(lineage);
        }

        // Phase 8: commit relationships and pressures.
        let mut committed_relationships: Vec<Relationship> = Vec::new();
        for rel in relationships {
            if self.commit_relationship(graph, schema, &rel) {
                committed_relationships.push(rel);
            }
        }
        for (name, delta) in &pressure_changes {
            graph.apply_pressure_delta(name, *delta);
        }

        // Phase 9: tag enforcement suggestions (coverage, orphans,
        // taxonomy). All advisory; the graph keeps what was committed.
        for entity in &new_entities {
            match schema.tags.enforce_tag_coverage(entity) {
                TagCoverageSuggestion::WithinRange => {}
                TagCoverageSuggestion::AddTags(n) => graph.record(HistoryRecord::TagSuggestion {
                    tick,
                    entity_id: entity.id.clone(),
                    message: format!("add {n} tag(s) to reach coverage"),
                }),
                TagCoverageSuggestion::RemoveTags(keys) => {
                    graph.record(HistoryRecord::TagSuggestion {
                        tick,
                        entity_id: entity.id.clone(),
                        message: format!("drop tags: {}", keys.join(", ")),
                    })
                }
            }
            if !schema.tags.tags.is_empty() {
                let orphans = schema.tags.check_tag_orphans(entity);
                if !orphans.is_empty() {
                    graph.record(HistoryRecord::TagSuggestion {
                        tick,
                        entity_id: entity.id.clone(),
                        message: format!("unregistered tags: {}", orphans.join(", ")),
                    });
                }
            }
            for (a, b) in schema.tags.validate_tag_taxonomy(entity) {
                graph.record(HistoryRecord::TagSuggestion {
                    tick,
                    entity_id: entity.id.clone(),
                    message: format!("mutually exclusive tags: {a} and {b}"),
                });
            }
        }

        // Phase 10: advisory affects validation.
        if let Some(affects) = template.contract().and_then(|c| c.affects.as_ref()) {
            let realized =
                realized_effects(&new_entities, &committed_relationships, &pressure_changes);
            for warning in validate_affects(affects, &realized) {
                graph.record(HistoryRecord::ContractWarning {
                    tick,
                    template_id: template.id().to_string(),
                    message: warning,
                });
            }
        }

        let outcome = GrowthOutcome {
            template_id: template.id().to_string(),
            created_ids: new_entities.iter().map(|e| e.id.clone()).collect(),
            relationships_added: committed_relationships.len(),
        };
        graph.record(HistoryRecord::Growth {
            tick,
            template_id: outcome.template_id.clone(),
            created_entities: outcome.created_ids.clone(),
            created_relationships: outcome.relationships_added,
            description,
        });
        Ok(Some(outcome))
    }

    /// Run one system tick: every gated-in system fires in weighted order
    #[allow(clippy::too_many_arguments)]
    pub fn system_tick(
        &mut self,
        graph: &mut WorldGraph,
        systems: &[Box<dyn SimulationSystem>],
        era: &EraConfig,
        feedback: &FeedbackController,
        schema: &DomainSchema,
        rng: &mut EngineRng,
    ) -> EngineResult<()> {
        let tick = graph.tick();

        // Weighted order, declared order on ties.
        let mut order: Vec<(usize, f64)> = systems
            .iter()
            .enumerate()
            .map(|(index, system)| {
                let modifier = feedback.system_modifier(
                    system.id(),
                    era.system_modifier(system.id()),
                    &system.affected_metrics(),
                );
                (index, modifier)
            })
            .collect();
        order.sort_by(|(ia, ma), (ib, mb)| {
            mb.partial_cmp(ma)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(ia.cmp(ib))
        });

        for (index, modifier) in order {
            let system = &systems[index];
            let outcome = {
                let view = GraphView::new(graph);
                if let Some(contract) = system.contract() {
                    let decision = check_contract_enabled_by(&view, contract);
                    if !decision.allowed {
                        continue;
                    }
                }
                system.apply(&view, modifier, rng)?
            };

            let mut added = 0usize;
            for mut rel in outcome.relationships {
                rel.created_at = tick;
                if self.commit_relationship(graph, schema, &rel) {
                    added += 1;
                }
            }
            let mut modified = 0usize;
            for (id, patch) in &outcome.entity_modifications {
                if graph.update_entity(id, patch) {
                    modified += 1;
                }
            }
            for (name, delta) in &outcome.pressure_changes {
                graph.apply_pressure_delta(name, *delta);
            }

            if added > 0 || modified > 0 || !outcome.pressure_changes.is_empty() {
                graph.record(HistoryRecord::SystemFired {
                    tick,
                    system_id: system.id().to_string(),
                    modifier,
                    relationships_added: added,
                    entities_modified: modified,
                    description: outcome.description,
                });
            }
        }
        Ok(())
    }

    /// Commit one relationship, honouring duplicate and conflict rules
    fn commit_relationship(
        &self,
        graph: &mut WorldGraph,
        schema: &DomainSchema,
        rel: &Relationship,
    ) -> bool {
        let allow_parallel = schema
            .relationship_kind(&rel.kind)
            .is_some_and(|def| def.allow_parallel);
        if !allow_parallel && graph.has_relationship(&rel.src, &rel.dst, Some(&rel.kind)) {
            debug!(kind = %rel.kind, src = %rel.src, dst = %rel.dst, "duplicate skipped");
            return false;
        }
        let existing = graph.kinds_between(&rel.src, &rel.dst);
        if let Some(conflicting) = schema.check_relationship_conflict(&existing, &rel.kind) {
            warn!(
                kind = %rel.kind,
                conflicting = %conflicting,
                src = %rel.src,
                dst = %rel.dst,
                "relationship conflicts with an existing kind"
            );
            return false;
        }
        graph.push_relationship(rel.clone())
    }

    /// Place one new entity when it carries no coordinates
    #[allow(clippy::too_many_arguments)]
    fn place_entity(
        &self,
        entity: &mut Entity,
        template: &dyn GrowthTemplate,
        placement: &mut PlacementEngine<'_>,
        graph: &WorldGraph,
        schema: &DomainSchema,
        batch: &mut PlacementBatch,
        records: &mut Vec<HistoryRecord>,
        rng: &mut EngineRng,
    ) -> EngineResult<()> {
        if !entity.coordinates.is_empty() {
            return Ok(());
        }

        let Some(scheme) = template.placement() else {
            // No declared scheme: the kind's default space places the
            // entity at its default coordinate.
            if let Some(space) = schema.default_space_for_kind(&entity.kind) {
                entity
                    .coordinates
                    .insert(space.id.clone(), space.default_coordinate());
            }
            return Ok(());
        };

        let space_id = scheme.space_id().to_string();
        let existing = placement_points(graph, &space_id);
        let mut result = placement.execute(scheme, &entity.kind, &existing, batch, rng)?;
        if result.is_none() {
            if let Some(fallback) = template.fallback_placement() {
                result = placement.execute(fallback, &entity.kind, &existing, batch, rng)?;
            }
        }

        match result {
            Some(placed) => {
                if let Some(from) = &placed.diagnostics.cascaded_from {
                    let to_plane = placed
                        .coordinates
                        .plane
                        .as_id()
                        .unwrap_or_default()
                        .to_string();
                    records.push(HistoryRecord::PlacementCascade {
                        tick: graph.tick(),
                        entity_kind: entity.kind.clone(),
                        from_plane: from.clone(),
                        to_plane,
                    });
                }
                batch.push(entity.kind.clone(), placed.coordinates.clone());
                entity.coordinates.insert(space_id, placed.coordinates);
            }
            None => {
                warn!(entity = %entity.id, template = template.id(), "placement failed");
                records.push(HistoryRecord::PlacementFailure {
                    tick: graph.tick(),
                    template_id: template.id().to_string(),
                    entity_kind: entity.kind.clone(),
                });
            }
        }
        Ok(())
    }
}

fn realized_effects(
    new_entities: &[Entity],
    relationships: &[Relationship],
    pressure_changes: &[(String, f64)],
) -> RealizedEffects {
    let mut effects = RealizedEffects::default();
    for entity in new_entities {
        match effects
            .entities_by_kind
            .iter_mut()
            .find(|(kind, _)| kind == &entity.kind)
        {
            Some((_, count)) => *count += 1,
            None => effects.entities_by_kind.push((entity.kind.clone(), 1)),
        }
    }
    for rel in relationships {
        match effects
            .relationships_by_kind
            .iter_mut()
            .find(|(kind, _)| kind == &rel.kind)
        {
            Some((_, count)) => *count += 1,
            None => effects.relationships_by_kind.push((rel.kind.clone(), 1)),
        }
    }
    effects.pressure_deltas = pressure_changes.to_vec();
    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{EnabledBy, PressureThreshold};
    use crate::schema::tests::schema;

    struct SpawnNpc {
        contract: Option<TemplateContract>,
        metadata: TemplateMetadata,
    }

    impl SpawnNpc {
        fn new() -> Self {
            Self {
                contract: None,
                metadata: TemplateMetadata {
                    produces: vec![ProducedKind {
                        kind: "npc".to_string(),
                        subtype: None,
                    }],
                    produces_relationships: vec![],
                },
            }
        }

        fn gated(threshold: f64) -> Self {
            let mut template = Self::new();
            template.contract = Some(TemplateContract {
                enabled_by: Some(EnabledBy {
                    pressures: vec![PressureThreshold {
                        name: "conflict".to_string(),
                        threshold,
                    }],
                    ..EnabledBy::default()
                }),
                affects: None,
            });
            template
        }
    }

    impl GrowthTemplate for SpawnNpc {
        fn id(&self) -> &str {
            "spawn_npc"
        }

        fn expand(
            &self,
            _view: &GraphView<'_>,
            _targets: &[Entity],
            _rng: &mut EngineRng,
        ) -> EngineResult<Expansion> {
            let npc = Entity::new("", "npc", "wanderer", 0).with_culture("tidewalker");
            Ok(Expansion {
                new_entities: vec![npc],
                new_relationships: vec![],
                pressure_changes: vec![],
                description: "a stranger arrives".to_string(),
            })
        }

        fn contract(&self) -> Option<&TemplateContract> {
            self.contract.as_ref()
        }

        fn metadata(&self) -> Option<&TemplateMetadata> {
            Some(&self.metadata)
        }
    }

    struct FoundFaction;

    impl GrowthTemplate for FoundFaction {
        fn id(&self) -> &str {
            "found_faction"
        }

        fn target_spec(&self, _view: &GraphView<'_>) -> Option<TargetSpec> {
            Some(TargetSpec::new("npc", 1))
        }

        fn expand(
            &self,
            _view: &GraphView<'_>,
            targets: &[Entity],
            _rng: &mut EngineRng,
        ) -> EngineResult<Expansion> {
            let faction = Entity::new("", "faction", "guild", 0);
            let mut relationships = Vec::new();
            if let Some(founder) = targets.first() {
                relationships.push(Relationship::new(
                    "member_of",
                    founder.id.clone(),
                    format!("{NEW_ENTITY_REF}0"),
                    0,
                ));
            }
            Ok(Expansion {
                new_entities: vec![faction],
                new_relationships: relationships,
                pressure_changes: vec![("order".to_string(), 2.0)],
                description: "a guild forms".to_string(),
            })
        }
    }

    struct NoOpSystem;

    impl SimulationSystem for NoOpSystem {
        fn id(&self) -> &str {
            "no_op"
        }

        fn apply(
            &self,
            _view: &GraphView<'_>,
            _modifier: f64,
            _rng: &mut EngineRng,
        ) -> EngineResult<SystemOutcome> {
            Ok(SystemOutcome::default())
        }
    }

    struct RivalrySystem;

    impl SimulationSystem for RivalrySystem {
        fn id(&self) -> &str {
            "rivalry"
        }

        fn apply(
            &self,
            view: &GraphView<'_>,
            _modifier: f64,
            _rng: &mut EngineRng,
        ) -> EngineResult<SystemOutcome> {
            let npcs = view.entities_by_kind("npc");
            let mut outcome = SystemOutcome {
                description: "old grudges surface".to_string(),
                ..SystemOutcome::default()
            };
            if npcs.len() >= 2 {
                outcome.relationships.push(Relationship::new(
                    "exiled_from",
                    npcs[0].id.clone(),
                    "faction_00001".to_string(),
                    0,
                ));
                outcome
                    .pressure_changes
                    .push(("conflict".to_string(), 1.5));
            }
            Ok(outcome)
        }
    }

    use crate::schema::DomainSchema;

    fn era() -> EraConfig {
        EraConfig {
            id: "expansion".to_string(),
            name: "Expansion".to_string(),
            template_weights: vec![],
            system_modifiers: vec![],
            epoch_override: None,
            distribution_overrides: None,
        }
    }

    fn harness() -> (WorldGraph, DomainSchema, FeedbackController) {
        let mut graph = WorldGraph::new([]);
        graph.set_era("expansion");
        let schema = schema();
        let feedback = FeedbackController::new(vec![], 0.5, 0.1, 5.0);
        (graph, schema, feedback)
    }

    /// Test a growth tick commits entities with assigned ids and stamps
    #[test]
    fn test_growth_commits_entities() {
        let (mut graph, schema, feedback) = harness();
        let templates: Vec<Box<dyn GrowthTemplate>> = vec![Box::new(SpawnNpc::new())];
        let spaces = schema.coordinate_spaces.clone();
        let mut placement = PlacementEngine::new(&spaces, None);
        let mut runtime = TemplateRuntime::new(0.5);
        let mut rng = EngineRng::new(42);
        for _ in 0..3 {
            graph.advance_tick();
        }

        let outcome = runtime
            .growth_tick(
                &mut graph,
                &templates,
                &era(),
                &feedback,
                &mut placement,
                &[],
                &schema,
                &mut rng,
            )
            .unwrap()
            .unwrap();

        assert_eq!(outcome.template_id, "spawn_npc");
        assert_eq!(outcome.created_ids, vec!["npc_00001".to_string()]);
        let npc = graph.get_entity("npc_00001").unwrap();
        assert_eq!(npc.created_at, 3);
        // Empty status picked up the schema default.
        assert_eq!(npc.status, "active");
        assert!(matches!(
            graph.history().last(),
            Some(HistoryRecord::Growth { .. })
        ));
        graph.audit().unwrap();
    }

    /// Test gated templates are skipped with a recorded reason
    #[test]
    fn test_growth_gate_skip() {
        let (mut graph, schema, feedback) = harness();
        graph.set_pressure("conflict", 30.0);
        let templates: Vec<Box<dyn GrowthTemplate>> = vec![Box::new(SpawnNpc::gated(50.0))];
        let spaces = schema.coordinate_spaces.clone();
        let mut placement = PlacementEngine::new(&spaces, None);
        let mut runtime = TemplateRuntime::new(0.5);
        let mut rng = EngineRng::new(42);

        let outcome = runtime
            .growth_tick(
                &mut graph,
                &templates,
                &era(),
                &feedback,
                &mut placement,
                &[],
                &schema,
                &mut rng,
            )
            .unwrap();
        assert!(outcome.is_none());
        assert!(graph.history().iter().any(|r| matches!(
            r,
            HistoryRecord::TemplateSkipped { template_id, .. } if template_id == "spawn_npc"
        )));
    }

    /// Test saturated templates are skipped
    #[test]
    fn test_growth_saturation_skip() {
        let (mut graph, schema, feedback) = harness();
        for i in 0..20 {
            graph.set_entity(Entity::new(format!("npc_{i:05}"), "npc", "wanderer", 0));
        }
        let templates: Vec<Box<dyn GrowthTemplate>> = vec![Box::new(SpawnNpc::new())];
        let registries = vec![EntityRegistry::new("npc", 10)];
        let spaces = schema.coordinate_spaces.clone();
        let mut placement = PlacementEngine::new(&spaces, None);
        let mut runtime = TemplateRuntime::new(0.5);
        let mut rng = EngineRng::new(42);

        let outcome = runtime
            .growth_tick(
                &mut graph,
                &templates,
                &era(),
                &feedback,
                &mut placement,
                &registries,
                &schema,
                &mut rng,
            )
            .unwrap();
        assert!(outcome.is_none());
        assert!(graph.history().iter().any(|r| matches!(
            r,
            HistoryRecord::TemplateSkipped { reason, .. } if reason.starts_with("saturated")
        )));
    }

    /// Test placeholder endpoints resolve to assigned ids
    #[test]
    fn test_placeholder_resolution() {
        let (mut graph, schema, feedback) = harness();
        graph.set_entity(
            Entity::new("npc_00001", "npc", "wanderer", 0)
                .with_status("active")
                .with_culture("tidewalker"),
        );
        let templates: Vec<Box<dyn GrowthTemplate>> = vec![Box::new(FoundFaction)];
        let spaces = schema.coordinate_spaces.clone();
        let mut placement = PlacementEngine::new(&spaces, None);
        let mut runtime = TemplateRuntime::new(0.5);
        let mut rng = EngineRng::new(42);

        let outcome = runtime
            .growth_tick(
                &mut graph,
                &templates,
                &era(),
                &feedback,
                &mut placement,
                &[],
                &schema,
                &mut rng,
            )
            .unwrap()
            .unwrap();

        assert_eq!(outcome.relationships_added, 1);
        let faction_id = &outcome.created_ids[0];
        assert!(graph.has_relationship("npc_00001", faction_id, Some("member_of")));
        assert_eq!(graph.pressure("order"), 2.0);
        graph.audit().unwrap();
    }

    /// Test a no-op system leaves the graph untouched
    #[test]
    fn test_noop_system() {
        let (mut graph, schema, feedback) = harness();
        graph.set_entity(Entity::new("npc_00001", "npc", "wanderer", 0));
        let before = graph.snapshot();

        let systems: Vec<Box<dyn SimulationSystem>> = vec![Box::new(NoOpSystem)];
        let mut runtime = TemplateRuntime::new(0.5);
        let mut rng = EngineRng::new(42);
        runtime
            .system_tick(&mut graph, &systems, &era(), &feedback, &schema, &mut rng)
            .unwrap();

        assert_eq!(graph.snapshot(), before);
        assert!(graph.history().is_empty());
    }

    /// Test systems commit relationships, modifications, and pressures
    #[test]
    fn test_system_commits() {
        let (mut graph, schema, feedback) = harness();
        graph.set_entity(Entity::new("npc_00001", "npc", "wanderer", 0));
        graph.set_entity(Entity::new("npc_00002", "npc", "wanderer", 0));
        graph.set_entity(Entity::new("faction_00001", "faction", "guild", 0));

        let systems: Vec<Box<dyn SimulationSystem>> = vec![Box::new(RivalrySystem)];
        let mut runtime = TemplateRuntime::new(0.5);
        let mut rng = EngineRng::new(42);
        runtime
            .system_tick(&mut graph, &systems, &era(), &feedback, &schema, &mut rng)
            .unwrap();

        assert!(graph.has_relationship("npc_00001", "faction_00001", Some("exiled_from")));
        assert_eq!(graph.pressure("conflict"), 1.5);
        assert!(graph.history().iter().any(|r| matches!(
            r,
            HistoryRecord::SystemFired { system_id, .. } if system_id == "rivalry"
        )));
    }

    /// Test conflicting relationship kinds are refused at commit
    #[test]
    fn test_conflict_refusal() {
        let (mut graph, schema, feedback) = harness();
        graph.set_entity(Entity::new("npc_00001", "npc", "wanderer", 0));
        graph.set_entity(Entity::new("npc_00002", "npc", "wanderer", 0));
        graph.set_entity(Entity::new("faction_00001", "faction", "guild", 0));
        // Existing membership conflicts with the exile the system proposes.
        graph.add_relationship("member_of", "npc_00001", "faction_00001", None, None, None);

        let systems: Vec<Box<dyn SimulationSystem>> = vec![Box::new(RivalrySystem)];
        let mut runtime = TemplateRuntime::new(0.5);
        let mut rng = EngineRng::new(42);
        runtime
            .system_tick(&mut graph, &systems, &era(), &feedback, &schema, &mut rng)
            .unwrap();

        assert!(!graph.has_relationship("npc_00001", "faction_00001", Some("exiled_from")));
        // The pressure delta still lands; only the edge was refused.
        assert_eq!(graph.pressure("conflict"), 1.5);
    }

    /// Test duplicate (src, dst, kind) triples are skipped
    #[test]
    fn test_duplicate_skip() {
        let (mut graph, schema, feedback) = harness();
        graph.set_entity(Entity::new("npc_00001", "npc", "wanderer", 0));
        graph.set_entity(Entity::new("npc_00002", "npc", "wanderer", 0));
        graph.set_entity(Entity::new("faction_00001", "faction", "guild", 0));
        graph.add_relationship("exiled_from", "npc_00001", "faction_00001", None, None, None);

        let systems: Vec<Box<dyn SimulationSystem>> = vec![Box::new(RivalrySystem)];
        let mut runtime = TemplateRuntime::new(0.5);
        let mut rng = EngineRng::new(42);
        runtime
            .system_tick(&mut graph, &systems, &era(), &feedback, &schema, &mut rng)
            .unwrap();

        // Still exactly one exile edge.
        assert_eq!(
            graph
                .find_relationships(
                    &crate::graph::RelationshipCriteria::kind("exiled_from")
                )
                .len(),
            1
        );
    }

    /// Test id minting skips ids already present
    #[test]
    fn test_id_sequence_skips_taken() {
        let mut graph = WorldGraph::new([]);
        graph.set_entity(Entity::new("npc_00001", "npc", "wanderer", 0));
        let mut ids = IdSequence::new();
        assert_eq!(ids.next("npc", &graph), "npc_00002");
        assert_eq!(ids.next("npc", &graph), "npc_00003");
        assert_eq!(ids.next("faction", &graph), "faction_00001");
    }
}
