// Copyright 2025 Cowboy AI, LLC.

//! Tag registry and enforcement
//!
//! Tags are free-form keys carrying a flag or a string value, but the domain
//! registers which keys exist, how often each may be used across the world,
//! and which pairs are mutually exclusive. Enforcement never mutates
//! entities; it reports rejections and suggestions that the runtime records.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::entity::{normalize_tag_key, Entity};

/// Coverage target: entities should carry at least this many tags
pub const MIN_TAGS: usize = 3;
/// Coverage target: entities should carry at most this many tags
pub const MAX_TAGS: usize = 5;

/// One registered tag key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TagDef {
    /// Tag key; `name:*` covers every name-ish key
    pub key: String,
    /// World-wide usage ceiling; unlimited when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_usage: Option<usize>,
    /// Keys that may not appear together with this one
    #[serde(default)]
    pub excludes: Vec<String>,
}

/// The domain's registered tags
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct TagRegistry {
    /// All registered tags
    #[serde(default)]
    pub tags: Vec<TagDef>,
}

/// Outcome of a saturation check
#[derive(Debug, Clone, PartialEq)]
pub struct TagSaturationCheck {
    /// Whether the whole list may be added
    pub allowed: bool,
    /// Keys that would exceed their ceiling
    pub rejected: Vec<String>,
}

/// A coverage adjustment suggestion; advisory, never applied by the core
#[derive(Debug, Clone, PartialEq)]
pub enum TagCoverageSuggestion {
    /// The entity is inside the [3, 5] window
    WithinRange,
    /// Suggest adding this many tags
    AddTags(usize),
    /// Suggest dropping these keys (lowest-priority last entries)
    RemoveTags(Vec<String>),
}

impl TagRegistry {
    /// Look up one tag definition by normalised key
    pub fn get(&self, key: &str) -> Option<&TagDef> {
        let normalized = normalize_tag_key(key);
        self.tags.iter().find(|t| t.key == normalized)
    }

    /// Whether a key is registered (post-normalisation)
    pub fn is_registered(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Check whether adding `tags_to_add` would push any registered key
    /// over its ceiling, given the current per-key usage counts
    ///
    /// `current_usage` must already be keyed by normalised keys, the way
    /// the graph's tag index is; `name:*` additions count into the single
    /// wildcard bucket.
    pub fn check_tag_saturation(
        &self,
        tags_to_add: &[String],
        current_usage: impl Fn(&str) -> usize,
    ) -> TagSaturationCheck {
        let mut rejected = Vec::new();
        let mut pending: Vec<(&str, usize)> = Vec::new();
        for key in tags_to_add {
            let normalized = normalize_tag_key(key);
            match pending.iter_mut().find(|(k, _)| *k == normalized) {
                Some((_, n)) => *n += 1,
                None => pending.push((normalized, 1)),
            }
        }
        for (key, added) in pending {
            if let Some(def) = self.get(key) {
                if let Some(ceiling) = def.max_usage {
                    if current_usage(key) + added > ceiling {
                        rejected.push(key.to_string());
                    }
                }
            }
        }
        TagSaturationCheck {
            allowed: rejected.is_empty(),
            rejected,
        }
    }

    /// Keys on the entity that the registry does not know
    pub fn check_tag_orphans(&self, entity: &Entity) -> Vec<String> {
        entity
            .tags
            .keys()
            .filter(|k| !self.is_registered(k))
            .cloned()
            .collect()
    }

    /// Suggest an adjustment bringing the entity's tag count into [3, 5]
    pub fn enforce_tag_coverage(&self, entity: &Entity) -> TagCoverageSuggestion {
        let count = entity.tags.len();
        if count < MIN_TAGS {
            TagCoverageSuggestion::AddTags(MIN_TAGS - count)
        } else if count > MAX_TAGS {
            // Suggest shedding the most recently added keys first.
            let excess = count - MAX_TAGS;
            let drop: Vec<String> = entity
                .tags
                .keys()
                .rev()
                .take(excess)
                .cloned()
                .collect();
            TagCoverageSuggestion::RemoveTags(drop)
        } else {
            TagCoverageSuggestion::WithinRange
        }
    }

    /// Pairs of keys on the entity that the registry declares mutually
    /// exclusive
    pub fn validate_tag_taxonomy(&self, entity: &Entity) -> Vec<(String, String)> {
        let keys: Vec<&str> = entity.tags.keys().map(String::as_str).collect();
        let mut conflicts = Vec::new();
        for key in &keys {
            if let Some(def) = self.get(key) {
                for excluded in &def.excludes {
                    if keys
                        .iter()
                        .any(|k| normalize_tag_key(k) == excluded.as_str())
                    {
                        let pair = (def.key.clone(), excluded.clone());
                        let mirrored = (pair.1.clone(), pair.0.clone());
                        if !conflicts.contains(&pair) && !conflicts.contains(&mirrored) {
                            conflicts.push(pair);
                        }
                    }
                }
            }
        }
        conflicts
    }
}
