// Copyright 2025 Cowboy AI, LLC.

//! The simulation driver
//!
//! Owns the tick loop. For each era in order it runs `epoch_length` epochs;
//! each epoch runs `simulation_ticks_per_growth` simulation ticks (system
//! phase) followed by one growth tick. After every tick the population
//! tracker re-measures and the feedback controller re-computes. The driver
//! stops when every era completes, the tick ceiling is hit, the safety
//! valve fires, or the cancellation signal is observed between ticks.
//!
//! Single-threaded by design: nothing else mutates the graph while a run
//! is in flight, and the tick counter is the only clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{EngineConfig, EraConfig};
use crate::coord::placement::PlacementEngine;
use crate::distribution::{DistributionSnapshot, DistributionTargets, DistributionTracker};
use crate::entity::{Entity, TemporalSpan, KIND_ERA, KIND_OCCURRENCE};
use crate::enrichment::{EnrichmentChannel, EraNarrativeRecord};
use crate::errors::EngineResult;
use crate::feedback::{FeedbackController, LoopTarget};
use crate::graph::WorldGraph;
use crate::history::HistoryRecord;
use crate::relationship::{Relationship, REL_ACTIVE_DURING};
use crate::report::{
    evaluate_feedback_loops, OutlierEntry, PressureSample, RunReport, StopCause,
};
use crate::rng::EngineRng;
use crate::runtime::TemplateRuntime;
use crate::tracker::{MetricSource, PopulationTracker};
use crate::validator::{validate_config, ValidationWarning};

/// Cooperative cancellation signal, polled between ticks
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Fresh, un-cancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the driver stops at the next tick boundary
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Drives one full simulation run
pub struct SimulationDriver {
    config: EngineConfig,
    graph: WorldGraph,
    tracker: PopulationTracker,
    distribution: DistributionTracker,
    base_distribution_targets: DistributionTargets,
    feedback: FeedbackController,
    runtime: TemplateRuntime,
    rng: EngineRng,
    enrichment: EnrichmentChannel,
    cancellation: CancellationToken,
    pressure_timeline: Vec<PressureSample>,
    metric_series: IndexMap<String, Vec<f64>>,
    fired_templates: IndexSet<String>,
    fired_triggers: IndexSet<String>,
    placement_failures_by_plane: IndexMap<String, u32>,
    latest_distribution: DistributionSnapshot,
}

impl SimulationDriver {
    /// Validate the configuration and build a driver; startup warnings are
    /// returned alongside
    pub fn new(config: EngineConfig) -> EngineResult<(Self, Vec<ValidationWarning>)> {
        let mut warnings = validate_config(&config)?;

        let mut graph = WorldGraph::new(config.domain.protected_kinds());
        for pressure in &config.settings.pressures {
            graph.set_pressure(pressure.name.clone(), pressure.initial);
        }
        for entity in &config.seed_entities {
            for issue in config.domain.validate_entity_structure(entity) {
                warnings.push(format!("seed entity '{}': {issue}", entity.id));
            }
            graph.set_entity(entity.clone());
        }

        let tuning = &config.settings.tuning;
        let mut tracker = PopulationTracker::new(tuning.history_window, tuning.trend_smoothing);
        // Every declared kind is tracked from tick zero; registries refine
        // targets and add subtype-scoped entries.
        for kind in &config.domain.entity_kinds {
            let target = config
                .registries
                .iter()
                .find(|r| r.kind == kind.kind && r.subtype.is_none())
                .map_or(
                    f64::from(config.settings.target_entities_per_kind),
                    |r| f64::from(r.target),
                );
            tracker.declare(
                MetricSource::EntityKind {
                    kind: kind.kind.clone(),
                    subtype: None,
                },
                target,
            );
        }
        for registry in config.registries.iter().filter(|r| r.subtype.is_some()) {
            tracker.declare(
                MetricSource::EntityKind {
                    kind: registry.kind.clone(),
                    subtype: registry.subtype.clone(),
                },
                f64::from(registry.target),
            );
        }
        for rel in &config.domain.relationship_kinds {
            tracker.declare(
                MetricSource::RelationshipKind {
                    kind: rel.kind.clone(),
                },
                0.0,
            );
        }
        for pressure in &config.settings.pressures {
            tracker.declare(
                MetricSource::Pressure {
                    name: pressure.name.clone(),
                },
                0.0,
            );
        }

        let base_distribution_targets = config
            .settings
            .distribution_targets
            .clone()
            .unwrap_or_default();
        let distribution = DistributionTracker::new(base_distribution_targets.clone());
        let feedback = FeedbackController::new(
            config.settings.feedback_loops.clone(),
            tuning.correction_strength,
            tuning.min_template_weight,
            tuning.max_template_weight,
        );
        let runtime = TemplateRuntime::new(tuning.diversity_strength);
        let rng = EngineRng::new(config.settings.seed);

        Ok((
            Self {
                config,
                graph,
                tracker,
                distribution,
                base_distribution_targets,
                feedback,
                runtime,
                rng,
                enrichment: EnrichmentChannel::new(),
                cancellation: CancellationToken::new(),
                pressure_timeline: Vec::new(),
                metric_series: IndexMap::new(),
                fired_templates: IndexSet::new(),
                fired_triggers: IndexSet::new(),
                placement_failures_by_plane: IndexMap::new(),
                latest_distribution: DistributionSnapshot::default(),
            },
            warnings,
        ))
    }

    /// The cancellation token for this run
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// The enrichment side-channel
    pub fn enrichment(&mut self) -> &mut EnrichmentChannel {
        &mut self.enrichment
    }

    /// Read-only access to the graph mid-run (between `run` calls)
    pub fn graph(&self) -> &WorldGraph {
        &self.graph
    }

    /// The latest distribution measurement
    pub fn distribution_snapshot(&self) -> &DistributionSnapshot {
        &self.latest_distribution
    }

    /// Execute the whole run and produce the final report
    pub fn run(mut self) -> EngineResult<RunReport> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        info!(%run_id, seed = self.config.settings.seed, "run starting");

        let eras = self.config.settings.eras.clone();
        let mut stop = StopCause::Completed;

        'eras: for era in &eras {
            let era_entity_id = self.begin_era(era);
            let era_start_tick = self.graph.tick();
            let epochs = era.epoch_override.unwrap_or(self.config.settings.epoch_length);

            for _ in 0..epochs {
                for phase in 0..=self.config.settings.simulation_ticks_per_growth {
                    if let Some(cause) = self.tick_boundary() {
                        stop = cause;
                        break 'eras;
                    }
                    self.graph.advance_tick();

                    // Simulation ticks first, then the epoch's growth tick.
                    if phase < self.config.settings.simulation_ticks_per_growth {
                        self.system_phase(era)?;
                    } else {
                        self.growth_phase(era, &era_entity_id)?;
                    }
                    self.measure_and_adjust();

                    #[cfg(debug_assertions)]
                    self.graph.audit()?;
                }
                self.graph.advance_epoch();
                self.epoch_epilogue();
            }

            self.end_era(era, &era_entity_id, era_start_tick);
        }

        if stop == StopCause::Cancelled {
            let tick = self.graph.tick();
            self.graph.record(HistoryRecord::Cancelled { tick });
        }

        info!(ticks = self.graph.tick(), ?stop, "run finished");
        Ok(self.into_report(run_id, started_at, stop))
    }

    /// Pre-tick checks; a returned cause ends the run
    fn tick_boundary(&mut self) -> Option<StopCause> {
        if self.cancellation.is_cancelled() {
            return Some(StopCause::Cancelled);
        }
        if self.graph.tick() >= self.config.settings.max_ticks {
            return Some(StopCause::MaxTicks);
        }
        if let Some(limit) = self.safety_limit() {
            if self.graph.entity_count() > limit {
                let tick = self.graph.tick();
                let entity_count = self.graph.entity_count();
                self.graph.record(HistoryRecord::SafetyValve {
                    tick,
                    entity_count,
                    limit,
                });
                return Some(StopCause::SafetyValve);
            }
        }
        // Enrichment results arrive asynchronously; merge them between
        // ticks only.
        self.enrichment.drain_merges(&mut self.graph);
        None
    }

    fn safety_limit(&self) -> Option<usize> {
        let kind_count = self.config.domain.entity_kinds.len();
        if kind_count == 0 {
            return None;
        }
        let limit = f64::from(self.config.settings.target_entities_per_kind)
            * self.config.settings.scale_factor
            * kind_count as f64
            * 3.0;
        Some(limit as usize)
    }

    fn system_phase(&mut self, era: &EraConfig) -> EngineResult<()> {
        self.runtime.system_tick(
            &mut self.graph,
            &self.config.systems,
            era,
            &self.feedback,
            &self.config.domain,
            &mut self.rng,
        )
    }

    fn growth_phase(&mut self, era: &EraConfig, era_entity_id: &str) -> EngineResult<()> {
        let mut placement = PlacementEngine::new(
            &self.config.domain.coordinate_spaces,
            self.config.domain.manifold.as_ref(),
        );
        // Failure counters persist across ticks; the engine itself is
        // rebuilt each growth phase because it borrows the schema.
        placement.set_failure_counts(std::mem::take(&mut self.placement_failures_by_plane));
        let outcome = self.runtime.growth_tick(
            &mut self.graph,
            &self.config.templates,
            era,
            &self.feedback,
            &mut placement,
            &self.config.registries,
            &self.config.domain,
            &mut self.rng,
        )?;
        self.placement_failures_by_plane = placement.take_failure_counts();

        if let Some(outcome) = outcome {
            self.fired_templates.insert(outcome.template_id.clone());
            let tick = self.graph.tick();
            for id in &outcome.created_ids {
                // New entities belong to the era that made them.
                self.graph.push_relationship(Relationship::new(
                    REL_ACTIVE_DURING,
                    id.clone(),
                    era_entity_id.to_string(),
                    tick,
                ));
                if let Some(entity) = self.graph.get_entity(id) {
                    let related: Vec<String> = self
                        .graph
                        .connected_entities(id, None)
                        .into_iter()
                        .filter(|e| !e.name.is_empty())
                        .map(|e| e.name)
                        .collect();
                    self.enrichment
                        .enqueue_entity(&self.config.domain, &entity, related, tick);
                }
            }
        }
        Ok(())
    }

    fn measure_and_adjust(&mut self) {
        self.tracker.measure(&self.graph);
        self.latest_distribution = self.distribution.measure(&self.graph);

        let tick = self.graph.tick();
        self.feedback.update(tick, &self.tracker);

        self.pressure_timeline.push(PressureSample {
            tick,
            values: self.graph.pressures().clone(),
        });
        self.record_metric_series();
    }

    /// Track per-tick series for every metric a feedback loop touches, so
    /// the report can check observed correlations against polarity
    fn record_metric_series(&mut self) {
        let mut keys: Vec<String> = Vec::new();
        for lp in self.feedback.loops() {
            keys.push(lp.source.clone());
            if let LoopTarget::Metric(key) = lp.parsed_target() {
                keys.push(key.to_string());
            }
        }
        for key in keys {
            let value = self.tracker.get(&key).map_or(0.0, |e| e.count);
            self.metric_series.entry(key).or_default().push(value);
        }
    }

    /// Per-epoch pressure dynamics and occurrence triggers
    fn epoch_epilogue(&mut self) {
        for pressure in &self.config.settings.pressures.clone() {
            let current = self.graph.pressure(&pressure.name);
            let next = current + pressure.growth_per_epoch - pressure.decay * current;
            self.graph.set_pressure(pressure.name.clone(), next);
        }

        for trigger in &self.config.domain.occurrence_triggers.clone() {
            let value = self.graph.pressure(&trigger.pressure);
            if value >= trigger.threshold {
                if self.fired_triggers.insert(trigger.id.clone()) {
                    self.spawn_occurrence(trigger.id.clone(), trigger.occurrence_subtype.clone());
                }
            } else {
                // Falling below the threshold re-arms the trigger.
                self.fired_triggers.shift_remove(&trigger.id);
            }
        }
    }

    fn spawn_occurrence(&mut self, trigger_id: String, subtype: String) {
        let tick = self.graph.tick();
        let id = self.runtime.mint_id(KIND_OCCURRENCE, &self.graph);
        debug!(%id, trigger = %trigger_id, "occurrence triggered");
        let mut occurrence = Entity::new(id, KIND_OCCURRENCE, subtype, tick)
            .with_name(trigger_id)
            .with_status("active");
        occurrence.temporal = Some(TemporalSpan {
            start_tick: tick,
            end_tick: None,
        });
        self.graph.set_entity(occurrence);
    }

    /// Enter an era: era entity, history record, clock, merged targets
    fn begin_era(&mut self, era: &EraConfig) -> String {
        let tick = self.graph.tick();
        let from = self.graph.current_era().map(|e| e.to_string());
        self.graph.set_era(era.id.clone());

        let targets = match &era.distribution_overrides {
            Some(overrides) => self.base_distribution_targets.merged_with(overrides),
            None => self.base_distribution_targets.clone(),
        };
        self.distribution.set_targets(targets);
        self.graph.record(HistoryRecord::EraTransition {
            tick,
            from,
            to: era.id.clone(),
        });

        let id = self.runtime.mint_id(KIND_ERA, &self.graph);
        let mut entity = Entity::new(id.clone(), KIND_ERA, "era", tick)
            .with_name(era.name.clone())
            .with_status("active");
        entity.temporal = Some(TemporalSpan {
            start_tick: tick,
            end_tick: None,
        });
        self.graph.set_entity(entity);
        id
    }

    /// Leave an era: close its span, archive era-scoped relationships,
    /// queue the narrative record
    fn end_era(&mut self, era: &EraConfig, era_entity_id: &str, era_start_tick: u64) {
        let tick = self.graph.tick();

        if let Some(mut entity) = self.graph.get_entity(era_entity_id) {
            entity.temporal = Some(TemporalSpan {
                start_tick: era_start_tick,
                end_tick: Some(tick),
            });
            entity.status = "historical".to_string();
            self.graph.set_entity(entity);
        }

        // Era-scoped relationship kinds created during the era move to
        // historical; protected kinds are exempt by the graph itself.
        let era_scoped: Vec<String> = self
            .config
            .domain
            .relationship_kinds
            .iter()
            .filter(|k| k.era_scoped && !k.protected)
            .map(|k| k.kind.clone())
            .collect();
        let mut archived = 0usize;
        for kind in &era_scoped {
            let doomed: Vec<(String, String)> = self
                .graph
                .find_relationships(&crate::graph::RelationshipCriteria::kind(kind.clone()))
                .into_iter()
                .filter(|r| r.created_at >= era_start_tick)
                .map(|r| (r.src, r.dst))
                .collect();
            for (src, dst) in doomed {
                if self.graph.archive_relationship(&src, &dst, kind) {
                    archived += 1;
                }
            }
        }
        if archived > 0 {
            self.graph.record(HistoryRecord::EraArchived {
                tick,
                era_id: era.id.clone(),
                relationships_archived: archived,
            });
        }

        let notable: Vec<String> = self
            .graph
            .find_relationships(
                &crate::graph::RelationshipCriteria::kind(REL_ACTIVE_DURING)
                    .with_dst(era_entity_id.to_string()),
            )
            .into_iter()
            .map(|r| r.src)
            .take(16)
            .collect();
        self.enrichment.enqueue_era(EraNarrativeRecord {
            era_id: era.id.clone(),
            name: era.name.clone(),
            start_tick: era_start_tick,
            end_tick: Some(tick),
            notable_entities: notable,
        });
    }

    fn into_report(
        mut self,
        run_id: Uuid,
        started_at: chrono::DateTime<Utc>,
        stop: StopCause,
    ) -> RunReport {
        let (enrichment_outbound, era_narratives) = self.enrichment.take_outbound();
        let outliers = self
            .tracker
            .outliers(self.config.settings.tuning.outlier_threshold);
        let overpopulated = outliers
            .overpopulated
            .iter()
            .map(|(key, entry)| OutlierEntry::from_metric(key, entry))
            .collect();
        let underpopulated = outliers
            .underpopulated
            .iter()
            .map(|(key, entry)| OutlierEntry::from_metric(key, entry))
            .collect();

        let templates_never_fired = self
            .config
            .templates
            .iter()
            .map(|t| t.id().to_string())
            .filter(|id| !self.fired_templates.contains(id))
            .collect();

        let feedback_mismatches =
            evaluate_feedback_loops(self.feedback.loops(), &self.metric_series);

        let cascade_events = self
            .graph
            .history()
            .iter()
            .filter(|r| matches!(r, HistoryRecord::PlacementCascade { .. }))
            .count();
        let placement_failures = self
            .graph
            .history()
            .iter()
            .filter(|r| matches!(r, HistoryRecord::PlacementFailure { .. }))
            .count();

        RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            seed: self.config.settings.seed,
            ticks: self.graph.tick(),
            final_era: self.graph.current_era().map(|e| e.to_string()),
            stop,
            entity_count: self.graph.entity_count(),
            relationship_count: self.graph.relationship_count(),
            templates_never_fired,
            overpopulated,
            underpopulated,
            feedback_mismatches,
            cascade_events,
            placement_failures,
            distribution: self.latest_distribution,
            pressure_timeline: self.pressure_timeline,
            history: self.graph.history().to_vec(),
            enrichment_outbound,
            era_narratives,
            graph: self.graph.snapshot(),
        }
    }
}
