// Copyright (c) 2025 - Cowboy AI, LLC.

//! # Chronicle Engine
//!
//! Tick-driven procedural world generation: a typed entity-relationship
//! graph evolved under population targets, narrative pressures, and era
//! progression. The engine is domain-agnostic; a [`DomainSchema`] declares
//! which entity kinds, relationship kinds, cultures, and coordinate spaces
//! exist, and the engine supplies the machinery:
//!
//! - **World graph**: typed entities and relationships with dual indexing
//!   and link-consistency invariants
//! - **Simulation loop**: eras contain epochs, epochs alternate simulation
//!   ticks with growth ticks, until the eras run out or a valve fires
//! - **Template scheduling**: contract gating, saturation, weighted
//!   selection, and anti-hub target picking
//! - **Feedback control**: population and distribution tracking feeding
//!   declarative loops that scale era weights
//! - **Coordinates and placement**: multi-space six-axis coordinates with
//!   Poisson-disk, Halton, jittered-grid, Gaussian, co-location,
//!   exclusion-aware, and cascade placement
//!
//! ## Design Principles
//!
//! 1. **Determinism**: one seed, one counter-based generator, identical
//!    graphs on identical inputs
//! 2. **Single writer**: templates and systems read through [`GraphView`];
//!    only the runtime commits
//! 3. **Declarative pressure**: contracts, feedback loops, and targets are
//!    data the engine interprets, not code it trusts
//! 4. **Domain at the edges**: vocabulary lives in the schema; the core
//!    never hard-codes a kind beyond the `era`/`occurrence` framework pair

#![warn(missing_docs)]

mod config;
mod contract;
mod distribution;
mod driver;
mod enrichment;
mod entity;
mod errors;
mod feedback;
mod graph;
mod history;
mod relationship;
mod report;
mod rng;
mod runtime;
mod selector;
mod tags;
mod tracker;
mod validator;
pub mod coord;
pub mod schema;

// Re-export core types
pub use config::{
    AncestorFinder, EngineConfig, EngineSettings, EntityRegistry, EraConfig, LineageSpec,
    PressureConfig, TuningConfig, WeightEntry,
};
pub use contract::{
    check_contract_enabled_by, check_saturation, lineage_pass, validate_affects, Affects,
    ContractPredicate, CountRange, EnabledBy, EntityCountRequirement, GateDecision,
    PressureDirection, PressureEffect, PressureThreshold, ProducedKind, RealizedEffects,
    SaturationDecision, TemplateContract, RELATIONSHIP_TOLERANCE, SATURATION_MULTIPLE,
};
pub use distribution::{
    ConnectivityMetrics, CorrectionWeights, DistributionSnapshot, DistributionTargets,
    DistributionTracker, DiversityMetrics, KindRatio, ProminenceRatio,
    DEFAULT_CLUSTERING_THRESHOLD,
};
pub use driver::{CancellationToken, SimulationDriver};
pub use enrichment::{
    EnrichmentChannel, EnrichmentMerge, EnrichmentRecord, EraNarrativeRecord,
};
pub use entity::{
    normalize_tag_key, Catalyst, CatalystEvent, Entity, EntityLink, EntityPatch, LinkDirection,
    Prominence, TagMap, TagValue, TemporalSpan, KIND_ERA, KIND_OCCURRENCE,
};
pub use errors::{EngineError, EngineResult};
pub use feedback::{
    FeedbackController, FeedbackLoop, LoopPolarity, LoopTarget, SYSTEM_MODIFIER_MAX,
    SYSTEM_MODIFIER_MIN,
};
pub use graph::{
    EntityCriteria, GraphSnapshot, GraphView, RelationshipCriteria, WorldGraph,
};
pub use history::HistoryRecord;
pub use relationship::{
    Relationship, RelationshipCategory, RelationshipStatus, DEFAULT_STRENGTH, REL_ACTIVE_DURING,
    REL_PART_OF, REL_SUPERSEDES,
};
pub use report::{
    delta_correlation, evaluate_feedback_loops, FeedbackMismatch, OutlierEntry, PressureSample,
    RunReport, StopCause, CORRELATION_TOLERANCE,
};
pub use rng::EngineRng;
pub use runtime::{
    placement_points, Expansion, GrowthOutcome, GrowthTemplate, IdSequence, SimulationSystem,
    SystemOutcome, TemplateMetadata, TemplateRuntime, NEW_ENTITY_REF,
};
pub use selector::{
    AvoidSpec, CreateIfSaturated, ExcludeRelated, Preference, PreferredAttribute,
    SelectionDiagnostics, SelectionOutcome, TargetFactory, TargetSelector, TargetSpec,
};
pub use tags::{
    TagCoverageSuggestion, TagDef, TagRegistry, TagSaturationCheck, MAX_TAGS, MIN_TAGS,
};
pub use tracker::{MetricEntry, MetricSource, Outliers, PopulationTracker};
pub use validator::{validate_config, ValidationWarning};

// Coordinate surface, re-exported flat for downstream convenience
pub use coord::placement::{
    ClusterCenter, ExclusionZone, ExistingPoint, KindSpacing, ManifoldConfig, ManifoldPlane,
    Placement, PlacementBatch, PlacementDiagnostics, PlacementEngine, PlacementScheme,
    SaturationStrategy, DEFAULT_SAMPLES_PER_POINT,
};
pub use coord::spatial::{compute_centroid, find_nearest, find_within_radius, SpatialQueryOptions};
pub use coord::{
    simple_space, Axis, AxisDef, AxisSemantics, AxisValue, AxisWeights, Coordinate,
    CoordinateSpaceDef, EnumAxisValue, SectorBounds,
};
pub use schema::{
    DistanceRange, DomainSchema, EntityKindDef, Mutability, OccurrenceTrigger,
    RelationshipKindDef, RequiredRelationship, SnapshotConfig,
};
