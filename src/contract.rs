// Copyright 2025 Cowboy AI, LLC.

//! Template contracts
//!
//! A contract declares when a template may fire (`enabled_by`) and what it
//! claims to do (`affects`). Gating is hard: a failed condition skips the
//! template with a recorded reason. Affects validation is advisory: the
//! realised output is compared against the declaration and disagreements
//! become history warnings, never blocks.
//!
//! The saturation rule lives here too: a template is saturated only when
//! every kind it produces sits at or above twice its registered target.

use std::fmt;

use crate::config::EntityRegistry;
use crate::entity::Entity;
use crate::graph::GraphView;
use crate::relationship::Relationship;
use crate::rng::EngineRng;
use crate::schema::DomainSchema;

/// Saturation multiple: produced kinds must all be at `2 x target`
pub const SATURATION_MULTIPLE: f64 = 2.0;

/// Tolerance applied to declared relationship counts (entities get none)
pub const RELATIONSHIP_TOLERANCE: f64 = 0.2;

/// A pressure gate: the named pressure must meet the threshold
#[derive(Debug, Clone, PartialEq)]
pub struct PressureThreshold {
    /// Pressure name
    pub name: String,
    /// Minimum value required
    pub threshold: f64,
}

/// An entity-count gate
#[derive(Debug, Clone, PartialEq)]
pub struct EntityCountRequirement {
    /// Entity kind counted
    pub kind: String,
    /// Narrow the count to one subtype
    pub subtype: Option<String>,
    /// Minimum count required
    pub min: usize,
    /// Maximum count allowed
    pub max: Option<usize>,
}

/// Custom gate over the read-only view
pub type ContractPredicate = Box<dyn Fn(&GraphView<'_>) -> bool + Send + Sync>;

/// When a template may fire; all populated conditions must pass
#[derive(Default)]
pub struct EnabledBy {
    /// Required pressure levels
    pub pressures: Vec<PressureThreshold>,
    /// Required entity counts
    pub entity_counts: Vec<EntityCountRequirement>,
    /// Era whitelist; any era when empty
    pub eras: Vec<String>,
    /// Custom predicate
    pub predicate: Option<ContractPredicate>,
}

impl fmt::Debug for EnabledBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnabledBy")
            .field("pressures", &self.pressures)
            .field("entity_counts", &self.entity_counts)
            .field("eras", &self.eras)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Declared effect direction on a pressure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureDirection {
    /// The template claims to raise the pressure
    Increase,
    /// The template claims to lower the pressure
    Decrease,
}

/// Declared pressure effect
#[derive(Debug, Clone, PartialEq)]
pub struct PressureEffect {
    /// Pressure name
    pub name: String,
    /// Claimed direction
    pub direction: PressureDirection,
}

/// Declared creation count for one kind
#[derive(Debug, Clone, PartialEq)]
pub struct CountRange {
    /// Entity or relationship kind
    pub kind: String,
    /// Minimum claimed
    pub min: usize,
    /// Maximum claimed
    pub max: Option<usize>,
}

/// What the template claims to do, checked after the fact
#[derive(Debug, Default)]
pub struct Affects {
    /// Claimed entity creations per kind
    pub entities: Vec<CountRange>,
    /// Claimed relationship creations per kind
    pub relationships: Vec<CountRange>,
    /// Claimed pressure directions
    pub pressures: Vec<PressureEffect>,
}

/// The full contract a template carries
#[derive(Debug, Default)]
pub struct TemplateContract {
    /// Gate conditions
    pub enabled_by: Option<EnabledBy>,
    /// Declared effects
    pub affects: Option<Affects>,
}

/// One (kind, subtype?) a template produces
#[derive(Debug, Clone, PartialEq)]
pub struct ProducedKind {
    /// Entity kind
    pub kind: String,
    /// Subtype, when the template is subtype-specific
    pub subtype: Option<String>,
}

/// Outcome of a gate check
#[derive(Debug, Clone, PartialEq)]
pub struct GateDecision {
    /// Whether the template may fire
    pub allowed: bool,
    /// Why not, when blocked
    pub reason: Option<String>,
}

impl GateDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn blocked(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Outcome of a saturation check
#[derive(Debug, Clone, PartialEq)]
pub struct SaturationDecision {
    /// Whether every produced kind is at `2 x target` or beyond
    pub saturated: bool,
    /// Human-readable accounting
    pub detail: String,
}

/// Evaluate a contract's gate conditions against the view
///
/// Conditions AND together; the first failure wins and its reason names
/// the offending condition with both observed and required values.
pub fn check_contract_enabled_by(
    view: &GraphView<'_>,
    contract: &TemplateContract,
) -> GateDecision {
    let Some(enabled_by) = &contract.enabled_by else {
        return GateDecision::allowed();
    };

    for gate in &enabled_by.pressures {
        let current = view.pressure(&gate.name);
        if current < gate.threshold {
            return GateDecision::blocked(format!(
                "pressure '{}' is {} but the template requires {}",
                gate.name, current, gate.threshold
            ));
        }
    }

    for gate in &enabled_by.entity_counts {
        let count = view.count_kind(&gate.kind, gate.subtype.as_deref());
        if count < gate.min {
            return GateDecision::blocked(format!(
                "only {} of kind '{}' exist, {} required",
                count, gate.kind, gate.min
            ));
        }
        if let Some(max) = gate.max {
            if count > max {
                return GateDecision::blocked(format!(
                    "{} of kind '{}' exist, at most {} allowed",
                    count, gate.kind, max
                ));
            }
        }
    }

    if !enabled_by.eras.is_empty() {
        let era = view.current_era().unwrap_or("");
        if !enabled_by.eras.iter().any(|e| e == era) {
            return GateDecision::blocked(format!(
                "era '{era}' is not in the template's era whitelist"
            ));
        }
    }

    if let Some(predicate) = &enabled_by.predicate {
        if !predicate(view) {
            return GateDecision::blocked("custom predicate returned false".to_string());
        }
    }

    GateDecision::allowed()
}

/// Check whether every kind the template produces is saturated
///
/// A kind without a registered target cannot saturate. One produced kind
/// under `2 x target` keeps the whole template eligible.
pub fn check_saturation(
    view: &GraphView<'_>,
    produces: &[ProducedKind],
    registries: &[EntityRegistry],
) -> SaturationDecision {
    let mut accounted = Vec::new();
    let mut any_target = false;

    for produced in produces {
        let registry = registries
            .iter()
            .find(|r| r.covers(&produced.kind, produced.subtype.as_deref()));
        let Some(registry) = registry else {
            continue;
        };
        any_target = true;
        // Subtype-scoped registries count their subtype only.
        let count = view.count_kind(&registry.kind, registry.subtype.as_deref());
        let ceiling = f64::from(registry.target) * SATURATION_MULTIPLE;
        accounted.push((produced, count, ceiling));
        if (count as f64) < ceiling {
            return SaturationDecision {
                saturated: false,
                detail: format!(
                    "kind '{}' is at {} of a {} ceiling",
                    produced.kind, count, ceiling
                ),
            };
        }
    }

    if !any_target {
        return SaturationDecision {
            saturated: false,
            detail: "no produced kind carries a target".to_string(),
        };
    }

    SaturationDecision {
        saturated: true,
        detail: accounted
            .iter()
            .map(|(p, count, ceiling)| format!("{}={count}/{ceiling}", p.kind))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// Run the lineage pass over freshly-created entities
///
/// For every new entity whose (kind, subtype) registry declares lineage,
/// the registry's ancestor finder runs; a found ancestor yields one lineage
/// relationship from the new entity to it, with a distance drawn uniformly
/// from the kind's declared range.
pub fn lineage_pass(
    view: &GraphView<'_>,
    new_entities: &[Entity],
    registries: &[EntityRegistry],
    schema: &DomainSchema,
    rng: &mut EngineRng,
) -> Vec<Relationship> {
    let mut lineage = Vec::new();
    for entity in new_entities {
        let registry = registries
            .iter()
            .find(|r| r.covers(&entity.kind, Some(entity.subtype.as_str())));
        let Some(spec) = registry.and_then(|r| r.lineage.as_ref()) else {
            continue;
        };
        let Some(ancestor) = (spec.find_ancestor)(view, entity) else {
            continue;
        };
        let (min, max) = schema
            .expected_distance_range(&spec.relationship_kind)
            .map_or((0.0, 1.0), |r| (r.min, r.max));
        let distance = rng.range_f64(min, max);
        lineage.push(
            Relationship::new(
                spec.relationship_kind.clone(),
                entity.id.clone(),
                ancestor,
                view.tick(),
            )
            .with_strength(schema.relationship_strength(&spec.relationship_kind))
            .with_distance(distance),
        );
    }
    lineage
}

/// Realised effects of one template firing
#[derive(Debug, Clone, Default)]
pub struct RealizedEffects {
    /// Entities created, by kind
    pub entities_by_kind: Vec<(String, usize)>,
    /// Relationships created, by kind
    pub relationships_by_kind: Vec<(String, usize)>,
    /// Pressure deltas applied
    pub pressure_deltas: Vec<(String, f64)>,
}

impl RealizedEffects {
    fn entity_count(&self, kind: &str) -> usize {
        self.entities_by_kind
            .iter()
            .find(|(k, _)| k == kind)
            .map_or(0, |(_, n)| *n)
    }

    fn relationship_count(&self, kind: &str) -> usize {
        self.relationships_by_kind
            .iter()
            .find(|(k, _)| k == kind)
            .map_or(0, |(_, n)| *n)
    }

    fn pressure_delta(&self, name: &str) -> f64 {
        self.pressure_deltas
            .iter()
            .find(|(n, _)| n == name)
            .map_or(0.0, |(_, d)| *d)
    }
}

/// Compare realised output against the declared affects
///
/// Entity counts are exact; relationship counts get a 20% tolerance; a
/// pressure warning fires when the realised delta's sign disagrees with the
/// declared direction. Warnings never block.
pub fn validate_affects(affects: &Affects, realized: &RealizedEffects) -> Vec<String> {
    let mut warnings = Vec::new();

    for claim in &affects.entities {
        let count = realized.entity_count(&claim.kind);
        if count < claim.min {
            warnings.push(format!(
                "declared at least {} '{}' entities, created {}",
                claim.min, claim.kind, count
            ));
        }
        if let Some(max) = claim.max {
            if count > max {
                warnings.push(format!(
                    "declared at most {} '{}' entities, created {}",
                    max, claim.kind, count
                ));
            }
        }
    }

    for claim in &affects.relationships {
        let count = realized.relationship_count(&claim.kind) as f64;
        let min = claim.min as f64 * (1.0 - RELATIONSHIP_TOLERANCE);
        if count < min {
            warnings.push(format!(
                "declared at least {} '{}' relationships, created {}",
                claim.min, claim.kind, count
            ));
        }
        if let Some(max) = claim.max {
            let max = max as f64 * (1.0 + RELATIONSHIP_TOLERANCE);
            if count > max {
                warnings.push(format!(
                    "declared at most {} '{}' relationships, created {}",
                    claim.max.unwrap_or(0),
                    claim.kind,
                    count
                ));
            }
        }
    }

    for claim in &affects.pressures {
        let delta = realized.pressure_delta(&claim.name);
        let mismatch = match claim.direction {
            PressureDirection::Increase => delta < 0.0,
            PressureDirection::Decrease => delta > 0.0,
        };
        if mismatch {
            warnings.push(format!(
                "declared pressure '{}' to {}, observed delta {}",
                claim.name,
                match claim.direction {
                    PressureDirection::Increase => "increase",
                    PressureDirection::Decrease => "decrease",
                },
                delta
            ));
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LineageSpec;
    use crate::graph::WorldGraph;
    use crate::schema::tests::schema;

    fn world() -> WorldGraph {
        let mut g = WorldGraph::new([]);
        g.set_pressure("conflict", 30.0);
        g.set_era("expansion");
        for i in 0..20 {
            g.set_entity(Entity::new(format!("npc_{i:05}"), "npc", "wanderer", 0));
        }
        for i in 0..5 {
            g.set_entity(Entity::new(format!("faction_{i:05}"), "faction", "guild", 0));
        }
        g
    }

    /// Test the pressure gate reports observed and required values
    #[test]
    fn test_pressure_gate_denies() {
        let g = world();
        let view = GraphView::new(&g);
        let contract = TemplateContract {
            enabled_by: Some(EnabledBy {
                pressures: vec![PressureThreshold {
                    name: "conflict".to_string(),
                    threshold: 50.0,
                }],
                ..EnabledBy::default()
            }),
            affects: None,
        };

        let decision = check_contract_enabled_by(&view, &contract);
        assert!(!decision.allowed);
        let reason = decision.reason.unwrap();
        assert!(reason.contains("conflict"));
        assert!(reason.contains("30"));
        assert!(reason.contains("50"));
    }

    /// Test entity-count and era gates
    #[test]
    fn test_count_and_era_gates() {
        let g = world();
        let view = GraphView::new(&g);

        let contract = TemplateContract {
            enabled_by: Some(EnabledBy {
                entity_counts: vec![EntityCountRequirement {
                    kind: "faction".to_string(),
                    subtype: None,
                    min: 10,
                    max: None,
                }],
                ..EnabledBy::default()
            }),
            affects: None,
        };
        let decision = check_contract_enabled_by(&view, &contract);
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("faction"));

        let contract = TemplateContract {
            enabled_by: Some(EnabledBy {
                eras: vec!["collapse".to_string()],
                ..EnabledBy::default()
            }),
            affects: None,
        };
        assert!(!check_contract_enabled_by(&view, &contract).allowed);

        let contract = TemplateContract {
            enabled_by: Some(EnabledBy {
                eras: vec!["expansion".to_string()],
                pressures: vec![PressureThreshold {
                    name: "conflict".to_string(),
                    threshold: 10.0,
                }],
                ..EnabledBy::default()
            }),
            affects: None,
        };
        assert!(check_contract_enabled_by(&view, &contract).allowed);
    }

    /// Test the custom predicate gate
    #[test]
    fn test_predicate_gate() {
        let g = world();
        let view = GraphView::new(&g);
        let contract = TemplateContract {
            enabled_by: Some(EnabledBy {
                predicate: Some(Box::new(|v| v.entity_count() > 100)),
                ..EnabledBy::default()
            }),
            affects: None,
        };
        assert!(!check_contract_enabled_by(&view, &contract).allowed);
    }

    /// Test an empty contract always passes
    #[test]
    fn test_empty_contract_allows() {
        let g = world();
        let view = GraphView::new(&g);
        assert!(check_contract_enabled_by(&view, &TemplateContract::default()).allowed);
    }

    /// Test saturation requires every produced kind at twice its target
    ///
    /// ```mermaid
    /// graph TD
    ///     A[npc 20 / target 10] -->|saturated| C{all saturated?}
    ///     B[faction 5 / target 10] -->|eligible| C
    ///     C -->|no| D[template stays eligible]
    /// ```
    #[test]
    fn test_saturation_needs_all_kinds() {
        let g = world();
        let view = GraphView::new(&g);
        let registries = vec![
            EntityRegistry::new("npc", 10),
            EntityRegistry::new("faction", 10),
        ];
        let produces = vec![
            ProducedKind {
                kind: "npc".to_string(),
                subtype: None,
            },
            ProducedKind {
                kind: "faction".to_string(),
                subtype: None,
            },
        ];

        let decision = check_saturation(&view, &produces, &registries);
        assert!(!decision.saturated);
        assert!(decision.detail.contains("faction"));

        // npc alone is at 20 = 2 x 10: saturated.
        let decision = check_saturation(&view, &produces[..1], &registries);
        assert!(decision.saturated);
    }

    /// Test kinds without targets never saturate
    #[test]
    fn test_saturation_without_targets() {
        let g = world();
        let view = GraphView::new(&g);
        let produces = vec![ProducedKind {
            kind: "npc".to_string(),
            subtype: None,
        }];
        let decision = check_saturation(&view, &produces, &[]);
        assert!(!decision.saturated);
    }

    /// Test the lineage pass creates one link with an in-range distance
    #[test]
    fn test_lineage_pass() {
        let g = world();
        let view = GraphView::new(&g);
        let s = schema();
        let mut rng = EngineRng::new(42);

        let registries = vec![EntityRegistry::new("npc", 10).with_lineage(LineageSpec {
            relationship_kind: "derived_from".to_string(),
            find_ancestor: Box::new(|_, _| Some("npc_00000".to_string())),
        })];

        let newcomer = Entity::new("npc_99999", "npc", "wanderer", 9);
        let links = lineage_pass(&view, &[newcomer], &registries, &s, &mut rng);

        assert_eq!(links.len(), 1);
        assert_eq!(links[0].kind, "derived_from");
        assert_eq!(links[0].src, "npc_99999");
        assert_eq!(links[0].dst, "npc_00000");
        let d = links[0].distance.unwrap();
        assert!((0.1..=0.4).contains(&d));
    }

    /// Test the lineage pass skips kinds without a lineage registry and
    /// entities without ancestors
    #[test]
    fn test_lineage_pass_skips() {
        let g = world();
        let view = GraphView::new(&g);
        let s = schema();
        let mut rng = EngineRng::new(42);

        // No lineage in the registry.
        let registries = vec![EntityRegistry::new("npc", 10)];
        let newcomer = Entity::new("npc_99999", "npc", "wanderer", 9);
        assert!(lineage_pass(&view, &[newcomer.clone()], &registries, &s, &mut rng).is_empty());

        // Finder returns no ancestor.
        let registries = vec![EntityRegistry::new("npc", 10).with_lineage(LineageSpec {
            relationship_kind: "derived_from".to_string(),
            find_ancestor: Box::new(|_, _| None),
        })];
        assert!(lineage_pass(&view, &[newcomer], &registries, &s, &mut rng).is_empty());
    }

    /// Test affects validation tolerances: exact for entities, 20% for
    /// relationships
    #[test]
    fn test_affects_tolerances() {
        let affects = Affects {
            entities: vec![CountRange {
                kind: "npc".to_string(),
                min: 2,
                max: Some(3),
            }],
            relationships: vec![CountRange {
                kind: "member_of".to_string(),
                min: 5,
                max: Some(5),
            }],
            pressures: vec![],
        };

        // Entities: one short is a warning.
        let realized = RealizedEffects {
            entities_by_kind: vec![("npc".to_string(), 1)],
            relationships_by_kind: vec![("member_of".to_string(), 4)],
            ..RealizedEffects::default()
        };
        let warnings = validate_affects(&affects, &realized);
        // 4 >= 5 * 0.8, so the relationship claim passes; the entity claim
        // does not.
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("npc"));

        // Relationships beyond the 20% band do warn.
        let realized = RealizedEffects {
            entities_by_kind: vec![("npc".to_string(), 2)],
            relationships_by_kind: vec![("member_of".to_string(), 7)],
            ..RealizedEffects::default()
        };
        let warnings = validate_affects(&affects, &realized);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("member_of"));
    }

    /// Test pressure sign mismatches warn
    #[test]
    fn test_affects_pressure_signs() {
        let affects = Affects {
            pressures: vec![PressureEffect {
                name: "conflict".to_string(),
                direction: PressureDirection::Increase,
            }],
            ..Affects::default()
        };

        let realized = RealizedEffects {
            pressure_deltas: vec![("conflict".to_string(), -4.0)],
            ..RealizedEffects::default()
        };
        let warnings = validate_affects(&affects, &realized);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("conflict"));

        // Zero delta is not a sign disagreement.
        let realized = RealizedEffects {
            pressure_deltas: vec![("conflict".to_string(), 0.0)],
            ..RealizedEffects::default()
        };
        assert!(validate_affects(&affects, &realized).is_empty());
    }
}
