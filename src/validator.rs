// Copyright 2025 Cowboy AI, LLC.

//! Startup validation
//!
//! Runs once before the first tick. Cross-references everything the domain
//! schema, settings, registries, templates, systems, and feedback loops
//! declare against each other. Errors abort startup with the full list of
//! offending entries; warnings are surfaced and the run proceeds.

use tracing::warn;

use crate::config::EngineConfig;
use crate::contract::TemplateContract;
use crate::errors::{EngineError, EngineResult};
use crate::feedback::LoopTarget;
use crate::schema::DomainSchema;

/// A non-fatal validation finding
pub type ValidationWarning = String;

/// Validate the full configuration; errors abort, warnings surface
pub fn validate_config(config: &EngineConfig) -> EngineResult<Vec<ValidationWarning>> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ValidationWarning> = Vec::new();

    validate_schema(&config.domain, &mut errors, &mut warnings);
    validate_registries(config, &mut errors);
    validate_templates(config, &mut errors, &mut warnings);
    validate_feedback_loops(config, &mut errors);
    validate_eras(config, &mut errors);
    validate_catalysts(config, &mut warnings);

    if !errors.is_empty() {
        return Err(EngineError::Configuration { issues: errors });
    }
    for warning in &warnings {
        warn!(%warning, "startup validation warning");
    }
    Ok(warnings)
}

fn known_entity_kind(schema: &DomainSchema, kind: &str) -> bool {
    schema.entity_kind(kind).is_some()
        || DomainSchema::framework_entity_kinds().contains(&kind)
}

fn validate_schema(schema: &DomainSchema, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
    for kind in &schema.entity_kinds {
        if kind.subtypes.is_empty() {
            errors.push(format!("entity kind '{}' declares no subtypes", kind.kind));
        }
        if kind.statuses.is_empty() {
            errors.push(format!("entity kind '{}' declares no statuses", kind.kind));
        } else if !kind.statuses.iter().any(|s| s == &kind.default_status) {
            errors.push(format!(
                "entity kind '{}' defaults to undeclared status '{}'",
                kind.kind, kind.default_status
            ));
        }
        if kind.cultured && schema.cultures.is_empty() {
            errors.push(format!(
                "entity kind '{}' is cultured but the domain declares no cultures",
                kind.kind
            ));
        }
        for required in &kind.required_relationships {
            if schema
                .relationship_kind(&required.relationship_kind)
                .is_none()
            {
                errors.push(format!(
                    "entity kind '{}' requires undeclared relationship kind '{}'",
                    kind.kind, required.relationship_kind
                ));
            }
        }
    }

    for rel in &schema.relationship_kinds {
        if rel.src_kinds.is_empty() || rel.dst_kinds.is_empty() {
            errors.push(format!(
                "relationship kind '{}' must declare src and dst kinds",
                rel.kind
            ));
        }
        for kind in rel.src_kinds.iter().chain(rel.dst_kinds.iter()) {
            if !known_entity_kind(schema, kind) {
                errors.push(format!(
                    "relationship kind '{}' references undeclared entity kind '{}'",
                    rel.kind, kind
                ));
            }
        }
        // Domains may redeclare the framework lineage kinds, but never
        // unprotected.
        if DomainSchema::framework_relationship_kinds().contains(&rel.kind.as_str())
            && !rel.protected
        {
            errors.push(format!(
                "framework relationship kind '{}' must be protected",
                rel.kind
            ));
        }
        if rel.is_lineage && rel.distance_range.is_none() {
            warnings.push(format!(
                "lineage relationship kind '{}' has no distance range; [0, 1] applies",
                rel.kind
            ));
        }
        for conflicting in &rel.conflicts_with {
            if schema.relationship_kind(conflicting).is_none() {
                warnings.push(format!(
                    "relationship kind '{}' conflicts with undeclared kind '{}'",
                    rel.kind, conflicting
                ));
            }
        }
    }

    if let Some(manifold) = &schema.manifold {
        for plane in &manifold.planes {
            for child in &plane.children {
                if manifold.plane(child).is_none() {
                    errors.push(format!(
                        "manifold plane '{}' cascades into undeclared plane '{}'",
                        plane.id, child
                    ));
                }
            }
        }
    }

    for tag in &schema.tags.tags {
        for excluded in &tag.excludes {
            if !schema.tags.is_registered(excluded) {
                warnings.push(format!(
                    "tag '{}' excludes unregistered tag '{}'",
                    tag.key, excluded
                ));
            }
        }
    }
}

fn validate_registries(config: &EngineConfig, errors: &mut Vec<String>) {
    for registry in &config.registries {
        let Some(kind) = config.domain.entity_kind(&registry.kind) else {
            errors.push(format!(
                "registry references undeclared entity kind '{}'",
                registry.kind
            ));
            continue;
        };
        if let Some(subtype) = &registry.subtype {
            if !kind.subtypes.iter().any(|s| s == subtype) {
                errors.push(format!(
                    "registry for '{}' scopes to undeclared subtype '{}'",
                    registry.kind, subtype
                ));
            }
        }
        if let Some(lineage) = &registry.lineage {
            match config.domain.relationship_kind(&lineage.relationship_kind) {
                None => errors.push(format!(
                    "registry for '{}' uses undeclared lineage kind '{}'",
                    registry.kind, lineage.relationship_kind
                )),
                Some(def) if !def.is_lineage => errors.push(format!(
                    "registry for '{}' uses '{}' for lineage but the kind is not lineage",
                    registry.kind, lineage.relationship_kind
                )),
                Some(_) => {}
            }
        }
    }
}

fn validate_contract(
    owner: &str,
    contract: &TemplateContract,
    config: &EngineConfig,
    errors: &mut Vec<String>,
) {
    let Some(enabled_by) = &contract.enabled_by else {
        return;
    };
    for gate in &enabled_by.pressures {
        if !config.settings.pressures.iter().any(|p| p.name == gate.name) {
            errors.push(format!(
                "{owner} gates on undeclared pressure '{}'",
                gate.name
            ));
        }
    }
    for gate in &enabled_by.entity_counts {
        if !known_entity_kind(&config.domain, &gate.kind) {
            errors.push(format!(
                "{owner} gates on undeclared entity kind '{}'",
                gate.kind
            ));
        }
    }
    for era in &enabled_by.eras {
        if !config.settings.eras.iter().any(|e| &e.id == era) {
            errors.push(format!("{owner} whitelists undeclared era '{era}'"));
        }
    }
}

fn validate_templates(
    config: &EngineConfig,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    for template in &config.templates {
        let owner = format!("template '{}'", template.id());
        if let Some(contract) = template.contract() {
            validate_contract(&owner, contract, config, errors);
        }
        if let Some(metadata) = template.metadata() {
            for produced in &metadata.produces {
                if !known_entity_kind(&config.domain, &produced.kind) {
                    errors.push(format!(
                        "{owner} produces undeclared entity kind '{}'",
                        produced.kind
                    ));
                    continue;
                }
                if let (Some(subtype), Some(kind)) =
                    (&produced.subtype, config.domain.entity_kind(&produced.kind))
                {
                    if !kind.subtypes.iter().any(|s| s == subtype) {
                        errors.push(format!(
                            "{owner} produces undeclared subtype '{}' of '{}'",
                            subtype, produced.kind
                        ));
                    }
                }
                if !config
                    .registries
                    .iter()
                    .any(|r| r.covers(&produced.kind, produced.subtype.as_deref()))
                {
                    warnings.push(format!(
                        "{owner} produces '{}' which has no population target",
                        produced.kind
                    ));
                }
            }
            for kind in &metadata.produces_relationships {
                if config.domain.relationship_kind(kind).is_none() {
                    errors.push(format!(
                        "{owner} produces undeclared relationship kind '{kind}'"
                    ));
                }
            }
        }
    }
    for system in &config.systems {
        if let Some(contract) = system.contract() {
            validate_contract(&format!("system '{}'", system.id()), contract, config, errors);
        }
    }
}

fn metric_key_known(config: &EngineConfig, key: &str) -> bool {
    if let Some(rest) = key.strip_prefix("entity:") {
        let (kind, subtype) = match rest.split_once('/') {
            Some((kind, subtype)) => (kind, Some(subtype)),
            None => (rest, None),
        };
        let Some(def) = config.domain.entity_kind(kind) else {
            return DomainSchema::framework_entity_kinds().contains(&kind) && subtype.is_none();
        };
        return subtype.map_or(true, |s| def.subtypes.iter().any(|d| d == s));
    }
    if let Some(kind) = key.strip_prefix("relationship:") {
        return config.domain.relationship_kind(kind).is_some();
    }
    if let Some(name) = key.strip_prefix("pressure:") {
        return config.settings.pressures.iter().any(|p| p.name == name);
    }
    false
}

fn validate_feedback_loops(config: &EngineConfig, errors: &mut Vec<String>) {
    for lp in &config.settings.feedback_loops {
        if !metric_key_known(config, &lp.source) {
            errors.push(format!(
                "feedback loop '{}' reads unknown source metric '{}'",
                lp.id, lp.source
            ));
        }
        match lp.parsed_target() {
            LoopTarget::Template(id) => {
                if !config.templates.iter().any(|t| t.id() == id) {
                    errors.push(format!(
                        "feedback loop '{}' targets unknown template '{id}'",
                        lp.id
                    ));
                }
            }
            LoopTarget::System(id) => {
                if !config.systems.iter().any(|s| s.id() == id) {
                    errors.push(format!(
                        "feedback loop '{}' targets unknown system '{id}'",
                        lp.id
                    ));
                }
            }
            LoopTarget::Metric(key) => {
                if !metric_key_known(config, key) {
                    errors.push(format!(
                        "feedback loop '{}' targets unknown metric '{key}'",
                        lp.id
                    ));
                }
            }
        }
    }
}

fn validate_catalysts(config: &EngineConfig, warnings: &mut Vec<String>) {
    if config.domain.action_domains.is_empty() {
        return;
    }
    for entity in &config.seed_entities {
        let Some(catalyst) = &entity.catalyst else {
            continue;
        };
        for domain in &catalyst.domains {
            if !config.domain.action_domains.iter().any(|d| d == domain) {
                warnings.push(format!(
                    "seed entity '{}' acts in undeclared domain '{domain}'",
                    entity.id
                ));
            }
        }
    }
}

fn validate_eras(config: &EngineConfig, errors: &mut Vec<String>) {
    if config.settings.eras.is_empty() {
        errors.push("at least one era is required".to_string());
    }
    if config.settings.epoch_length == 0 {
        errors.push("epoch_length must be at least 1".to_string());
    }
    if config.settings.simulation_ticks_per_growth == 0 {
        errors.push("simulation_ticks_per_growth must be at least 1".to_string());
    }
    if config.settings.target_entities_per_kind == 0 {
        errors.push("target_entities_per_kind must be at least 1".to_string());
    }
    if config.settings.max_ticks == 0 {
        errors.push("max_ticks must be at least 1".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineSettings, EntityRegistry, EraConfig, PressureConfig, TuningConfig};
    use crate::contract::{EnabledBy, PressureThreshold};
    use crate::entity::Entity;
    use crate::errors::EngineError;
    use crate::feedback::{FeedbackLoop, LoopPolarity};
    use crate::graph::GraphView;
    use crate::rng::EngineRng;
    use crate::runtime::{Expansion, GrowthTemplate};
    use crate::schema::tests::schema;

    struct StubTemplate {
        contract: Option<TemplateContract>,
    }

    impl GrowthTemplate for StubTemplate {
        fn id(&self) -> &str {
            "stub"
        }

        fn expand(
            &self,
            _view: &GraphView<'_>,
            _targets: &[Entity],
            _rng: &mut EngineRng,
        ) -> crate::errors::EngineResult<Expansion> {
            Ok(Expansion::default())
        }

        fn contract(&self) -> Option<&TemplateContract> {
            self.contract.as_ref()
        }
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            seed: 0,
            epoch_length: 10,
            simulation_ticks_per_growth: 5,
            target_entities_per_kind: 10,
            max_ticks: 500,
            scale_factor: 1.0,
            eras: vec![EraConfig {
                id: "expansion".to_string(),
                name: "Expansion".to_string(),
                template_weights: vec![],
                system_modifiers: vec![],
                epoch_override: None,
                distribution_overrides: None,
            }],
            pressures: vec![PressureConfig {
                name: "conflict".to_string(),
                initial: 0.0,
                growth_per_epoch: 1.0,
                decay: 0.05,
            }],
            feedback_loops: vec![],
            distribution_targets: None,
            tuning: TuningConfig::default(),
        }
    }

    fn config() -> EngineConfig {
        EngineConfig {
            domain: schema(),
            settings: settings(),
            registries: vec![EntityRegistry::new("npc", 10)],
            templates: vec![Box::new(StubTemplate { contract: None })],
            systems: vec![],
            seed_entities: vec![],
        }
    }

    /// Test a sound configuration validates without errors
    #[test]
    fn test_valid_config() {
        let warnings = validate_config(&config()).unwrap();
        // The stub template has no metadata, so no warnings either.
        assert!(warnings.is_empty());
    }

    /// Test gates on undeclared pressures abort startup
    #[test]
    fn test_unknown_pressure_gate() {
        let mut cfg = config();
        cfg.templates = vec![Box::new(StubTemplate {
            contract: Some(TemplateContract {
                enabled_by: Some(EnabledBy {
                    pressures: vec![PressureThreshold {
                        name: "apocalypse".to_string(),
                        threshold: 1.0,
                    }],
                    ..EnabledBy::default()
                }),
                affects: None,
            }),
        })];
        let err = validate_config(&cfg).unwrap_err();
        match err {
            EngineError::Configuration { issues } => {
                assert_eq!(issues.len(), 1);
                assert!(issues[0].contains("apocalypse"));
            }
            other => panic!("expected Configuration, got {other}"),
        }
    }

    /// Test schema structural errors accumulate rather than short-circuit
    #[test]
    fn test_schema_errors_accumulate() {
        let mut cfg = config();
        cfg.domain.entity_kinds[0].subtypes.clear();
        cfg.domain.entity_kinds[0].statuses.clear();
        cfg.domain.relationship_kinds[0].src_kinds = vec!["dragon".to_string()];
        let err = validate_config(&cfg).unwrap_err();
        match err {
            EngineError::Configuration { issues } => {
                assert!(issues.len() >= 3);
            }
            other => panic!("expected Configuration, got {other}"),
        }
    }

    /// Test feedback loops must reference known metrics and targets
    #[test]
    fn test_feedback_loop_references() {
        let mut cfg = config();
        cfg.settings.feedback_loops = vec![
            FeedbackLoop {
                id: "good".to_string(),
                polarity: LoopPolarity::Negative,
                source: "entity:npc".to_string(),
                target: "template:stub".to_string(),
                strength: 0.5,
                delay: 0,
            },
            FeedbackLoop {
                id: "bad_source".to_string(),
                polarity: LoopPolarity::Negative,
                source: "entity:dragon".to_string(),
                target: "template:stub".to_string(),
                strength: 0.5,
                delay: 0,
            },
            FeedbackLoop {
                id: "bad_target".to_string(),
                polarity: LoopPolarity::Positive,
                source: "pressure:conflict".to_string(),
                target: "system:missing".to_string(),
                strength: 0.5,
                delay: 0,
            },
        ];
        let err = validate_config(&cfg).unwrap_err();
        match err {
            EngineError::Configuration { issues } => {
                assert_eq!(issues.len(), 2);
                assert!(issues.iter().any(|i| i.contains("bad_source")));
                assert!(issues.iter().any(|i| i.contains("bad_target")));
            }
            other => panic!("expected Configuration, got {other}"),
        }
    }

    /// Test unprotected framework relationship kinds are rejected
    #[test]
    fn test_framework_kind_protection() {
        let mut cfg = config();
        cfg.domain.relationship_kinds.push(crate::schema::RelationshipKindDef {
            kind: "supersedes".to_string(),
            src_kinds: vec!["npc".to_string()],
            dst_kinds: vec!["npc".to_string()],
            mutability: crate::schema::Mutability::Immutable,
            protected: false,
            is_lineage: true,
            distance_range: None,
            strength: None,
            category: None,
            allow_parallel: false,
            era_scoped: false,
            conflicts_with: vec![],
        });
        let err = validate_config(&cfg).unwrap_err();
        match err {
            EngineError::Configuration { issues } => {
                assert!(issues.iter().any(|i| i.contains("supersedes")));
            }
            other => panic!("expected Configuration, got {other}"),
        }
    }

    /// Test registry cross-references
    #[test]
    fn test_registry_references() {
        let mut cfg = config();
        cfg.registries
            .push(EntityRegistry::new("dragon", 3));
        cfg.registries
            .push(EntityRegistry::new("npc", 3).scoped("lich"));
        let err = validate_config(&cfg).unwrap_err();
        match err {
            EngineError::Configuration { issues } => {
                assert_eq!(issues.len(), 2);
            }
            other => panic!("expected Configuration, got {other}"),
        }
    }

    /// Test degenerate settings are rejected
    #[test]
    fn test_degenerate_settings() {
        let mut cfg = config();
        cfg.settings.epoch_length = 0;
        cfg.settings.eras.clear();
        let err = validate_config(&cfg).unwrap_err();
        match err {
            EngineError::Configuration { issues } => {
                assert_eq!(issues.len(), 2);
            }
            other => panic!("expected Configuration, got {other}"),
        }
    }
}
