// Copyright 2025 Cowboy AI, LLC.

//! Anti-hub target selection
//!
//! Templates that act on existing entities do not pick them directly; they
//! declare a [`TargetSpec`] and the selector scores every candidate. The
//! scoring multiplies preference bonuses, then attenuates exponentially by
//! how many penalised relationships the candidate already carries, so
//! well-connected entities stop absorbing every new storyline. A hard cap
//! excludes true hubs outright, and a diversity memory attenuates entities
//! picked recently under the same tracking id.
//!
//! When even the best candidate scores below the configured threshold, the
//! spec's factory may manufacture fresh entities instead.

use indexmap::IndexMap;
use lru::LruCache;
use std::fmt;
use std::num::NonZeroUsize;

use crate::entity::{Entity, Prominence};
use crate::graph::{EntityCriteria, GraphView};
use crate::rng::EngineRng;
use crate::schema::DomainSchema;

/// Bounded per-tracking-id memory of recent selections
const DIVERSITY_CAPACITY: usize = 256;

/// One preference with its multiplicative bonus
#[derive(Debug, Clone, PartialEq)]
pub struct PreferredAttribute {
    /// Multiplier applied when the candidate matches
    pub bonus: f64,
    /// What must match
    pub preference: Preference,
}

/// Attributes a spec may prefer
#[derive(Debug, Clone, PartialEq)]
pub enum Preference {
    /// Candidate has this subtype
    Subtype(String),
    /// Candidate carries this tag key
    Tag(String),
    /// Candidate has this prominence
    Prominence(Prominence),
    /// Candidate sits near a reference entity in one space
    SameLocation {
        /// Reference entity id
        entity_id: String,
        /// Coordinate space to measure in
        space: String,
        /// Sector-space distance considered "same location"
        max_distance: f64,
    },
}

/// Exponential penalty on existing relationships
#[derive(Debug, Clone, PartialEq)]
pub struct AvoidSpec {
    /// Relationship kinds that count against the candidate
    pub relationship_kinds: Vec<String>,
    /// Exponent scale: `exp(-penalty_strength * count)`
    pub penalty_strength: f64,
    /// Candidates at or beyond this many total relationships score zero
    pub hard_cap: usize,
}

/// Exclude candidates already related to one entity
#[derive(Debug, Clone, PartialEq)]
pub struct ExcludeRelated {
    /// The entity candidates must not already be related to
    pub entity_id: String,
    /// Narrow the exclusion to one relationship kind
    pub relationship_kind: Option<String>,
}

/// Factory signature for manufactured targets; ids are left empty and
/// assigned by the caller
pub type TargetFactory = Box<dyn Fn(&GraphView<'_>, &mut EngineRng) -> Vec<Entity> + Send + Sync>;

/// Escape hatch when every candidate is saturated
pub struct CreateIfSaturated {
    /// Fire when the best score falls below this
    pub threshold: f64,
    /// Manufacture at most this many entities
    pub max_created: usize,
    /// Builds the partial entities
    pub factory: TargetFactory,
}

impl fmt::Debug for CreateIfSaturated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateIfSaturated")
            .field("threshold", &self.threshold)
            .field("max_created", &self.max_created)
            .finish_non_exhaustive()
    }
}

/// What a template wants picked
#[derive(Debug, Default)]
pub struct TargetSpec {
    /// Candidate entity kind
    pub kind: String,
    /// How many targets to return
    pub count: usize,
    /// Narrow candidates to one subtype
    pub subtype: Option<String>,
    /// Narrow candidates to one status
    pub status: Option<String>,
    /// Preference bonuses
    pub preferred: Vec<PreferredAttribute>,
    /// Anti-hub penalty
    pub avoid: Option<AvoidSpec>,
    /// Relatedness exclusion
    pub exclude_related_to: Option<ExcludeRelated>,
    /// Diversity memory key; specs sharing an id share the memory
    pub tracking_id: Option<String>,
    /// Factory escape hatch
    pub create_if_saturated: Option<CreateIfSaturated>,
}

impl TargetSpec {
    /// Spec picking `count` entities of `kind`
    pub fn new(kind: impl Into<String>, count: usize) -> Self {
        Self {
            kind: kind.into(),
            count,
            ..Self::default()
        }
    }
}

/// Scoring summary for the history log
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectionDiagnostics {
    /// Best candidate score observed
    pub best_score: f64,
    /// Worst candidate score observed
    pub worst_score: f64,
    /// Mean candidate score
    pub avg_score: f64,
    /// Whether the factory fired
    pub creation_triggered: bool,
}

/// Result of one selection
#[derive(Debug, Default)]
pub struct SelectionOutcome {
    /// Existing entities picked, best first
    pub targets: Vec<Entity>,
    /// Factory-made partial entities; ids are assigned by the caller
    pub created: Vec<Entity>,
    /// Scoring summary
    pub diagnostics: SelectionDiagnostics,
}

/// Scores and picks targets, remembering recent picks per tracking id
pub struct TargetSelector {
    diversity: IndexMap<String, LruCache<String, u32>>,
    diversity_strength: f64,
}

impl TargetSelector {
    /// Selector with the given diversity attenuation strength
    pub fn new(diversity_strength: f64) -> Self {
        Self {
            diversity: IndexMap::new(),
            diversity_strength: diversity_strength.max(0.0),
        }
    }

    /// Score one candidate under a spec; zero means excluded
    pub fn score(
        &self,
        view: &GraphView<'_>,
        schema: &DomainSchema,
        spec: &TargetSpec,
        candidate: &Entity,
    ) -> f64 {
        let mut score = 1.0;

        for pref in &spec.preferred {
            if self.preference_matches(view, schema, &pref.preference, candidate) {
                score *= pref.bonus;
            }
        }

        if let Some(avoid) = &spec.avoid {
            if candidate.total_relationships() >= avoid.hard_cap {
                return 0.0;
            }
            let penalised: usize = avoid
                .relationship_kinds
                .iter()
                .map(|kind| candidate.link_count(kind))
                .sum();
            score *= (-avoid.penalty_strength * penalised as f64).exp();
        }

        if let Some(exclude) = &spec.exclude_related_to {
            let kind = exclude.relationship_kind.as_deref();
            let related = view.has_relationship(&candidate.id, &exclude.entity_id, kind)
                || view.has_relationship(&exclude.entity_id, &candidate.id, kind);
            if related {
                return 0.0;
            }
        }

        if let Some(tracking_id) = &spec.tracking_id {
            if let Some(memory) = self.diversity.get(tracking_id) {
                if let Some(recent) = memory.peek(&candidate.id) {
                    score *= (-self.diversity_strength * f64::from(*recent)).exp();
                }
            }
        }

        score
    }

    fn preference_matches(
        &self,
        view: &GraphView<'_>,
        schema: &DomainSchema,
        preference: &Preference,
        candidate: &Entity,
    ) -> bool {
        match preference {
            Preference::Subtype(subtype) => &candidate.subtype == subtype,
            Preference::Tag(tag) => candidate.has_tag(tag),
            Preference::Prominence(prominence) => candidate.prominence == *prominence,
            Preference::SameLocation {
                entity_id,
                space,
                max_distance,
            } => {
                let Some(space_def) = schema.coordinate_space(space) else {
                    return false;
                };
                let Some(reference) = view.get_entity(entity_id) else {
                    return false;
                };
                match (
                    candidate.coordinates.get(space),
                    reference.coordinates.get(space),
                ) {
                    (Some(a), Some(b)) => space_def.distance(a, b) <= *max_distance,
                    _ => false,
                }
            }
        }
    }

    /// Pick the spec's targets from the view
    ///
    /// Candidates are scored, zero scores dropped, and the top `count`
    /// returned best-first (ties broken by id for determinism). When the
    /// best surviving score is below the saturation threshold, the factory
    /// manufactures replacements instead.
    pub fn select(
        &mut self,
        view: &GraphView<'_>,
        schema: &DomainSchema,
        spec: &TargetSpec,
        rng: &mut EngineRng,
    ) -> SelectionOutcome {
        let mut criteria = EntityCriteria::kind(spec.kind.clone());
        if let Some(subtype) = &spec.subtype {
            criteria = criteria.with_subtype(subtype.clone());
        }
        if let Some(status) = &spec.status {
            criteria = criteria.with_status(status.clone());
        }
        let candidates = view.find_entities(&criteria);

        let mut scored: Vec<(f64, Entity)> = candidates
            .into_iter()
            .map(|c| (self.score(view, schema, spec, &c), c))
            .collect();

        let diagnostics_pool: Vec<f64> = scored.iter().map(|(s, _)| *s).collect();
        let best_score = diagnostics_pool.iter().copied().fold(0.0, f64::max);
        let worst_score = diagnostics_pool
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        let avg_score = if diagnostics_pool.is_empty() {
            0.0
        } else {
            diagnostics_pool.iter().sum::<f64>() / diagnostics_pool.len() as f64
        };

        let mut diagnostics = SelectionDiagnostics {
            best_score,
            worst_score: if worst_score.is_finite() {
                worst_score
            } else {
                0.0
            },
            avg_score,
            creation_triggered: false,
        };

        // Hard-capped and excluded candidates never come back.
        scored.retain(|(score, _)| *score > 0.0);
        scored.sort_by(|(sa, ea), (sb, eb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| ea.id.cmp(&eb.id))
        });

        let saturated = match &spec.create_if_saturated {
            Some(create) => scored.first().map_or(true, |(s, _)| *s < create.threshold),
            None => false,
        };

        let mut created = Vec::new();
        if saturated {
            if let Some(create) = &spec.create_if_saturated {
                created = (create.factory)(view, rng);
                created.truncate(create.max_created);
                diagnostics.creation_triggered = !created.is_empty();
            }
        }

        let targets: Vec<Entity> = scored
            .into_iter()
            .take(spec.count)
            .map(|(_, e)| e)
            .collect();

        if let Some(tracking_id) = &spec.tracking_id {
            let memory = self
                .diversity
                .entry(tracking_id.clone())
                .or_insert_with(|| {
                    LruCache::new(
                        NonZeroUsize::new(DIVERSITY_CAPACITY).unwrap_or(NonZeroUsize::MIN),
                    )
                });
            for entity in &targets {
                let next = memory.get(&entity.id).copied().unwrap_or(0) + 1;
                memory.put(entity.id.clone(), next);
            }
        }

        SelectionOutcome {
            targets,
            created,
            diagnostics,
        }
    }
}
