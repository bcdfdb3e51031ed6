// Copyright 2025 Cowboy AI, LLC.

//! Distribution tracking
//!
//! Extends population counting with shape: how entities cluster, how
//! prominence and kinds spread, and how varied the relationship fabric is.
//! Clusters come from the strong-tie subgraph only (strength at or above
//! the clustering threshold), so narratively weak ties never glue the world
//! into one blob.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::entity::Prominence;
use crate::graph::WorldGraph;

/// Default strength floor for cluster-forming ties
pub const DEFAULT_CLUSTERING_THRESHOLD: f64 = 0.6;

/// Target share of the world for one entity kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KindRatio {
    /// Entity kind
    pub kind: String,
    /// Target share of all entities, in [0, 1]
    pub ratio: f64,
}

/// Target share for one prominence level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProminenceRatio {
    /// Prominence level
    pub prominence: Prominence,
    /// Target share of all entities, in [0, 1]
    pub ratio: f64,
}

/// Relative importance of each deviation block in the overall score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CorrectionWeights {
    /// Weight of the entity-kind block
    pub entity_kinds: f64,
    /// Weight of the prominence block
    pub prominence: f64,
    /// Weight of the relationship-diversity block
    pub relationship_diversity: f64,
    /// Weight of the connectivity block
    pub connectivity: f64,
}

impl Default for CorrectionWeights {
    fn default() -> Self {
        Self {
            entity_kinds: 1.0,
            prominence: 1.0,
            relationship_diversity: 1.0,
            connectivity: 1.0,
        }
    }
}

/// Targets the distribution tracker measures against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DistributionTargets {
    /// Per-kind target shares
    #[serde(default)]
    pub entity_kind_ratios: Vec<KindRatio>,
    /// Per-prominence target shares
    #[serde(default)]
    pub prominence_ratios: Vec<ProminenceRatio>,
    /// Ceiling on the share any one relationship kind may hold
    #[serde(default = "default_max_single_type_ratio")]
    pub max_single_type_ratio: f64,
    /// Relationship kinds expected to be in play
    #[serde(default = "default_min_types_present")]
    pub min_types_present: usize,
    /// Target mean strong-tie cluster size
    #[serde(default = "default_avg_cluster_size")]
    pub target_avg_cluster_size: f64,
    /// Target within-cluster edge ratio
    #[serde(default = "default_intra_density")]
    pub target_intra_cluster_density: f64,
    /// Target between-cluster edge ratio
    #[serde(default = "default_inter_density")]
    pub target_inter_cluster_density: f64,
    /// Ceiling on the isolated-entity share
    #[serde(default = "default_max_isolated_ratio")]
    pub max_isolated_ratio: f64,
    /// Strength floor for cluster-forming ties
    #[serde(default = "default_clustering_threshold")]
    pub clustering_strength_threshold: f64,
    /// Block weights for the overall score
    #[serde(default)]
    pub weights: CorrectionWeights,
}

fn default_max_single_type_ratio() -> f64 {
    0.5
}
fn default_min_types_present() -> usize {
    3
}
fn default_avg_cluster_size() -> f64 {
    4.0
}
fn default_intra_density() -> f64 {
    0.5
}
fn default_inter_density() -> f64 {
    0.05
}
fn default_max_isolated_ratio() -> f64 {
    0.25
}
fn default_clustering_threshold() -> f64 {
    DEFAULT_CLUSTERING_THRESHOLD
}

impl Default for DistributionTargets {
    fn default() -> Self {
        Self {
            entity_kind_ratios: Vec::new(),
            prominence_ratios: Vec::new(),
            max_single_type_ratio: default_max_single_type_ratio(),
            min_types_present: default_min_types_present(),
            target_avg_cluster_size: default_avg_cluster_size(),
            target_intra_cluster_density: default_intra_density(),
            target_inter_cluster_density: default_inter_density(),
            max_isolated_ratio: default_max_isolated_ratio(),
            clustering_strength_threshold: default_clustering_threshold(),
            weights: CorrectionWeights::default(),
        }
    }
}

impl DistributionTargets {
    /// Merge an era's overrides into a copy of these targets
    ///
    /// The merge is shallow and numeric-only: top-level keys matching a
    /// numeric field replace it; everything else in the override object
    /// (comments included) is ignored.
    pub fn merged_with(&self, overrides: &serde_json::Value) -> Self {
        let mut merged = self.clone();
        let Some(map) = overrides.as_object() else {
            return merged;
        };
        let mut set = |key: &str, slot: &mut f64| {
            if let Some(v) = map.get(key).and_then(serde_json::Value::as_f64) {
                *slot = v;
            }
        };
        set("max_single_type_ratio", &mut merged.max_single_type_ratio);
        set(
            "target_avg_cluster_size",
            &mut merged.target_avg_cluster_size,
        );
        set(
            "target_intra_cluster_density",
            &mut merged.target_intra_cluster_density,
        );
        set(
            "target_inter_cluster_density",
            &mut merged.target_inter_cluster_density,
        );
        set("max_isolated_ratio", &mut merged.max_isolated_ratio);
        set(
            "clustering_strength_threshold",
            &mut merged.clustering_strength_threshold,
        );
        if let Some(v) = map
            .get("min_types_present")
            .and_then(serde_json::Value::as_u64)
        {
            merged.min_types_present = v as usize;
        }
        merged
    }
}

/// Strong-tie clustering measurements
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConnectivityMetrics {
    /// Number of strong-tie clusters (size two or more)
    pub clusters: usize,
    /// Mean cluster size
    pub avg_cluster_size: f64,
    /// Mean within-cluster edge ratio
    pub intra_cluster_density: f64,
    /// Cross-cluster edges over the maximum possible
    pub inter_cluster_density: f64,
    /// Entities with no strong ties
    pub isolated_nodes: usize,
    /// Isolated entities over all entities
    pub isolated_node_ratio: f64,
}

/// Relationship-fabric variety measurements
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DiversityMetrics {
    /// Largest share held by a single relationship kind
    pub max_single_type_ratio: f64,
    /// Distinct relationship kinds in play
    pub types_present: usize,
    /// Mean deviation of category shares from an even split
    pub category_balance: f64,
}

/// One measurement pass over the graph
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DistributionSnapshot {
    /// Clustering measurements
    pub connectivity: ConnectivityMetrics,
    /// Variety measurements
    pub diversity: DiversityMetrics,
    /// Entity-kind share deviation from targets
    pub entity_kind_deviation: f64,
    /// Overall prominence share deviation from targets
    pub prominence_deviation: f64,
    /// Per-kind prominence deviation
    pub prominence_by_kind: IndexMap<String, f64>,
    /// Diversity block deviation
    pub diversity_deviation: f64,
    /// Connectivity block deviation
    pub connectivity_deviation: f64,
    /// Correction-weighted combination of all blocks
    pub overall: f64,
}

/// Measures distribution shape against declared targets
#[derive(Debug, Clone)]
pub struct DistributionTracker {
    targets: DistributionTargets,
}

impl DistributionTracker {
    /// Tracker measuring against the given targets
    pub fn new(targets: DistributionTargets) -> Self {
        Self { targets }
    }

    /// The targets in effect
    pub fn targets(&self) -> &DistributionTargets {
        &self.targets
    }

    /// Swap in era-merged targets
    pub fn set_targets(&mut self, targets: DistributionTargets) {
        self.targets = targets;
    }

    /// Run one measurement pass
    pub fn measure(&self, graph: &WorldGraph) -> DistributionSnapshot {
        let ids = graph.entity_ids();
        let index_of: IndexMap<&str, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let n = ids.len();

        // Strong-tie adjacency.
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut strong_edges: Vec<(usize, usize)> = Vec::new();
        let mut weak_edges: Vec<(usize, usize)> = Vec::new();
        let relationships = graph.relationships();
        for rel in &relationships {
            let (Some(&a), Some(&b)) = (
                index_of.get(rel.src.as_str()),
                index_of.get(rel.dst.as_str()),
            ) else {
                continue;
            };
            if a == b {
                continue;
            }
            if rel.strength >= self.targets.clustering_strength_threshold {
                adjacency[a].push(b);
                adjacency[b].push(a);
                strong_edges.push((a.min(b), a.max(b)));
            } else {
                weak_edges.push((a.min(b), a.max(b)));
            }
        }

        // Components by iterative DFS over the strong ties.
        let mut component = vec![usize::MAX; n];
        let mut components: Vec<Vec<usize>> = Vec::new();
        for start in 0..n {
            if component[start] != usize::MAX {
                continue;
            }
            let label = components.len();
            let mut members = Vec::new();
            let mut stack = vec![start];
            component[start] = label;
            while let Some(node) = stack.pop() {
                members.push(node);
                for &next in &adjacency[node] {
                    if component[next] == usize::MAX {
                        component[next] = label;
                        stack.push(next);
                    }
                }
            }
            components.push(members);
        }

        let connectivity = self.connectivity_metrics(
            n,
            &components,
            &component,
            &strong_edges,
            &weak_edges,
        );
        let diversity = self.diversity_metrics(graph);

        let entity_kind_deviation = self.entity_kind_deviation(graph, n);
        let (prominence_deviation, prominence_by_kind) = self.prominence_deviation(graph);
        let diversity_deviation = self.diversity_deviation(&diversity);
        let connectivity_deviation = self.connectivity_deviation(&connectivity);

        let prominence_block = if prominence_by_kind.is_empty() {
            prominence_deviation
        } else {
            let per_kind_mean = prominence_by_kind.values().sum::<f64>()
                / prominence_by_kind.len() as f64;
            (prominence_deviation + per_kind_mean) / 2.0
        };

        let w = &self.targets.weights;
        let weight_sum =
            w.entity_kinds + w.prominence + w.relationship_diversity + w.connectivity;
        let overall = if weight_sum > 0.0 {
            (entity_kind_deviation * w.entity_kinds
                + prominence_block * w.prominence
                + diversity_deviation * w.relationship_diversity
                + connectivity_deviation * w.connectivity)
                / weight_sum
        } else {
            0.0
        };

        DistributionSnapshot {
            connectivity,
            diversity,
            entity_kind_deviation,
            prominence_deviation,
            prominence_by_kind,
            diversity_deviation,
            connectivity_deviation,
            overall,
        }
    }

    fn connectivity_metrics(
        &self,
        n: usize,
        components: &[Vec<usize>],
        component: &[usize],
        strong_edges: &[(usize, usize)],
        weak_edges: &[(usize, usize)],
    ) -> ConnectivityMetrics {
        let clusters: Vec<&Vec<usize>> = components.iter().filter(|c| c.len() >= 2).collect();
        let isolated_nodes = components.iter().filter(|c| c.len() == 1).count();

        let avg_cluster_size = if clusters.is_empty() {
            0.0
        } else {
            clusters.iter().map(|c| c.len() as f64).sum::<f64>() / clusters.len() as f64
        };

        // Mean within-cluster edge ratio.
        let intra_cluster_density = if clusters.is_empty() {
            0.0
        } else {
            let mut total = 0.0;
            for cluster in &clusters {
                let size = cluster.len() as f64;
                let possible = size * (size - 1.0) / 2.0;
                let label = component[cluster[0]];
                let inside = strong_edges
                    .iter()
                    .filter(|(a, _)| component[*a] == label)
                    .count() as f64;
                total += inside / possible;
            }
            total / clusters.len() as f64
        };

        // Cross-component edges (weak ties included) over the maximum
        // possible cross pairs.
        let mut possible_cross = 0.0;
        for i in 0..components.len() {
            for j in (i + 1)..components.len() {
                possible_cross += (components[i].len() * components[j].len()) as f64;
            }
        }
        let cross = strong_edges
            .iter()
            .chain(weak_edges.iter())
            .filter(|(a, b)| component[*a] != component[*b])
            .count() as f64;
        let inter_cluster_density = if possible_cross > 0.0 {
            cross / possible_cross
        } else {
            0.0
        };

        ConnectivityMetrics {
            clusters: clusters.len(),
            avg_cluster_size,
            intra_cluster_density,
            inter_cluster_density,
            isolated_nodes,
            isolated_node_ratio: if n > 0 {
                isolated_nodes as f64 / n as f64
            } else {
                0.0
            },
        }
    }

    fn diversity_metrics(&self, graph: &WorldGraph) -> DiversityMetrics {
        let relationships = graph.relationships();
        let total = relationships.len() as f64;
        if total == 0.0 {
            return DiversityMetrics::default();
        }

        let mut by_kind: IndexMap<&str, usize> = IndexMap::new();
        let mut by_category: IndexMap<&str, usize> = IndexMap::new();
        let mut categorized = 0usize;
        for rel in &relationships {
            *by_kind.entry(rel.kind.as_str()).or_insert(0) += 1;
            if let Some(category) = rel.category {
                categorized += 1;
                let key = match category {
                    crate::relationship::RelationshipCategory::ImmutableFact => "immutable_fact",
                    crate::relationship::RelationshipCategory::Political => "political",
                    crate::relationship::RelationshipCategory::Social => "social",
                    crate::relationship::RelationshipCategory::Institutional => "institutional",
                };
                *by_category.entry(key).or_insert(0) += 1;
            }
        }

        let max_single_type_ratio = by_kind
            .values()
            .map(|&c| c as f64 / total)
            .fold(0.0, f64::max);

        let category_balance = if categorized == 0 {
            0.0
        } else {
            let even = 0.25;
            let mut deviation = 0.0;
            for key in ["immutable_fact", "political", "social", "institutional"] {
                let share =
                    by_category.get(key).copied().unwrap_or(0) as f64 / categorized as f64;
                deviation += (share - even).abs();
            }
            deviation / 4.0
        };

        DiversityMetrics {
            max_single_type_ratio,
            types_present: by_kind.len(),
            category_balance,
        }
    }

    fn entity_kind_deviation(&self, graph: &WorldGraph, total: usize) -> f64 {
        if self.targets.entity_kind_ratios.is_empty() || total == 0 {
            return 0.0;
        }
        let total = total as f64;
        let mut deviation = 0.0;
        for target in &self.targets.entity_kind_ratios {
            let share = graph.count_kind(&target.kind, None) as f64 / total;
            deviation += (share - target.ratio).abs();
        }
        deviation / self.targets.entity_kind_ratios.len() as f64
    }

    fn prominence_deviation(&self, graph: &WorldGraph) -> (f64, IndexMap<String, f64>) {
        if self.targets.prominence_ratios.is_empty() {
            return (0.0, IndexMap::new());
        }
        let mut overall_counts: IndexMap<Prominence, usize> = IndexMap::new();
        let mut kind_counts: IndexMap<String, IndexMap<Prominence, usize>> = IndexMap::new();
        let mut kind_totals: IndexMap<String, usize> = IndexMap::new();
        let mut total = 0usize;
        graph.for_each_entity(|entity| {
            total += 1;
            *overall_counts.entry(entity.prominence).or_insert(0) += 1;
            *kind_counts
                .entry(entity.kind.clone())
                .or_default()
                .entry(entity.prominence)
                .or_insert(0) += 1;
            *kind_totals.entry(entity.kind.clone()).or_insert(0) += 1;
        });
        if total == 0 {
            return (0.0, IndexMap::new());
        }

        let deviation_of = |counts: &IndexMap<Prominence, usize>, total: usize| -> f64 {
            let mut deviation = 0.0;
            for target in &self.targets.prominence_ratios {
                let share = counts.get(&target.prominence).copied().unwrap_or(0) as f64
                    / total as f64;
                deviation += (share - target.ratio).abs();
            }
            deviation / self.targets.prominence_ratios.len() as f64
        };

        let overall = deviation_of(&overall_counts, total);
        let by_kind = kind_counts
            .iter()
            .map(|(kind, counts)| {
                (
                    kind.clone(),
                    deviation_of(counts, kind_totals[kind.as_str()]),
                )
            })
            .collect();
        (overall, by_kind)
    }

    fn diversity_deviation(&self, diversity: &DiversityMetrics) -> f64 {
        let dominance_excess =
            (diversity.max_single_type_ratio - self.targets.max_single_type_ratio).max(0.0);
        let type_deficit = if self.targets.min_types_present > 0 {
            (self.targets.min_types_present.saturating_sub(diversity.types_present)) as f64
                / self.targets.min_types_present as f64
        } else {
            0.0
        };
        (dominance_excess + type_deficit + diversity.category_balance) / 3.0
    }

    fn connectivity_deviation(&self, connectivity: &ConnectivityMetrics) -> f64 {
        let t = &self.targets;
        let cluster_size = if t.target_avg_cluster_size > 0.0 {
            (connectivity.avg_cluster_size - t.target_avg_cluster_size).abs()
                / t.target_avg_cluster_size
        } else {
            0.0
        };
        let intra = (connectivity.intra_cluster_density - t.target_intra_cluster_density).abs();
        let inter = (connectivity.inter_cluster_density - t.target_inter_cluster_density).abs();
        let isolated = (connectivity.isolated_node_ratio - t.max_isolated_ratio).max(0.0);
        (cluster_size.min(1.0) + intra + inter + isolated) / 4.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;

    fn seeded_graph() -> WorldGraph {
        let mut g = WorldGraph::new([]);
        for i in 0..8 {
            g.set_entity(Entity::new(format!("npc_{i:05}"), "npc", "wanderer", 0));
        }
        g
    }

    /// Test strong ties form clusters and weak ties do not
    ///
    /// ```mermaid
    /// graph LR
    ///     A[npc 0] ===|0.9| B[npc 1]
    ///     B ===|0.8| C[npc 2]
    ///     C -.->|0.2 weak| D[npc 3]
    ///     E[npc 4] ===|0.7| F[npc 5]
    /// ```
    #[test]
    fn test_clustering_threshold() {
        let mut g = seeded_graph();
        g.add_relationship("ally_of", "npc_00000", "npc_00001", Some(0.9), None, None);
        g.add_relationship("ally_of", "npc_00001", "npc_00002", Some(0.8), None, None);
        // Weak tie: must not merge npc_00003 into the cluster.
        g.add_relationship("knows", "npc_00002", "npc_00003", Some(0.2), None, None);
        g.add_relationship("ally_of", "npc_00004", "npc_00005", Some(0.7), None, None);

        let tracker = DistributionTracker::new(DistributionTargets::default());
        let snap = tracker.measure(&g);

        assert_eq!(snap.connectivity.clusters, 2);
        assert_eq!(snap.connectivity.avg_cluster_size, 2.5);
        // npc 3, 6, 7 have no strong ties.
        assert_eq!(snap.connectivity.isolated_nodes, 3);
        assert_eq!(snap.connectivity.isolated_node_ratio, 0.375);
    }

    /// Test intra-cluster density is the within-cluster edge ratio
    #[test]
    fn test_intra_density() {
        let mut g = WorldGraph::new([]);
        for i in 0..3 {
            g.set_entity(Entity::new(format!("npc_{i:05}"), "npc", "wanderer", 0));
        }
        // Full triangle: density 1.0.
        g.add_relationship("ally_of", "npc_00000", "npc_00001", Some(0.9), None, None);
        g.add_relationship("ally_of", "npc_00001", "npc_00002", Some(0.9), None, None);
        g.add_relationship("ally_of", "npc_00000", "npc_00002", Some(0.9), None, None);

        let tracker = DistributionTracker::new(DistributionTargets::default());
        let snap = tracker.measure(&g);
        assert_eq!(snap.connectivity.clusters, 1);
        assert!((snap.connectivity.intra_cluster_density - 1.0).abs() < 1e-9);
    }

    /// Test weak ties between clusters drive inter-cluster density
    #[test]
    fn test_inter_density() {
        let mut g = WorldGraph::new([]);
        for i in 0..4 {
            g.set_entity(Entity::new(format!("npc_{i:05}"), "npc", "wanderer", 0));
        }
        g.add_relationship("ally_of", "npc_00000", "npc_00001", Some(0.9), None, None);
        g.add_relationship("ally_of", "npc_00002", "npc_00003", Some(0.9), None, None);
        g.add_relationship("knows", "npc_00001", "npc_00002", Some(0.1), None, None);

        let tracker = DistributionTracker::new(DistributionTargets::default());
        let snap = tracker.measure(&g);
        // One cross edge over 2*2 possible cross pairs.
        assert!((snap.connectivity.inter_cluster_density - 0.25).abs() < 1e-9);
    }

    /// Test diversity metrics: dominance, types present, category balance
    #[test]
    fn test_diversity_metrics() {
        use crate::relationship::RelationshipCategory;
        let mut g = seeded_graph();
        g.add_relationship("ally_of", "npc_00000", "npc_00001", None, None, Some(RelationshipCategory::Social));
        g.add_relationship("ally_of", "npc_00001", "npc_00002", None, None, Some(RelationshipCategory::Social));
        g.add_relationship("ally_of", "npc_00002", "npc_00003", None, None, Some(RelationshipCategory::Social));
        g.add_relationship("rival_of", "npc_00004", "npc_00005", None, None, Some(RelationshipCategory::Political));

        let tracker = DistributionTracker::new(DistributionTargets::default());
        let snap = tracker.measure(&g);
        assert_eq!(snap.diversity.types_present, 2);
        assert!((snap.diversity.max_single_type_ratio - 0.75).abs() < 1e-9);
        assert!(snap.diversity.category_balance > 0.0);
    }

    /// Test kind and prominence deviations against targets
    #[test]
    fn test_kind_and_prominence_deviation() {
        let mut g = WorldGraph::new([]);
        for i in 0..6 {
            g.set_entity(Entity::new(format!("npc_{i:05}"), "npc", "wanderer", 0));
        }
        for i in 0..2 {
            g.set_entity(Entity::new(
                format!("faction_{i:05}"),
                "faction",
                "guild",
                0,
            ));
        }

        let targets = DistributionTargets {
            entity_kind_ratios: vec![
                KindRatio {
                    kind: "npc".to_string(),
                    ratio: 0.5,
                },
                KindRatio {
                    kind: "faction".to_string(),
                    ratio: 0.5,
                },
            ],
            prominence_ratios: vec![ProminenceRatio {
                prominence: Prominence::Marginal,
                ratio: 1.0,
            }],
            ..DistributionTargets::default()
        };
        let tracker = DistributionTracker::new(targets);
        let snap = tracker.measure(&g);

        // npc share 0.75 vs 0.5, faction 0.25 vs 0.5: mean |dev| = 0.25.
        assert!((snap.entity_kind_deviation - 0.25).abs() < 1e-9);
        // Everyone is Marginal, matching the sole target exactly.
        assert_eq!(snap.prominence_deviation, 0.0);
        assert!(snap.overall >= 0.0);
    }

    /// Test era overrides merge numerics and ignore comment strings
    #[test]
    fn test_override_merge() {
        let targets = DistributionTargets::default();
        let merged = targets.merged_with(&serde_json::json!({
            "max_single_type_ratio": 0.8,
            "min_types_present": 5,
            "clustering_strength_threshold": "comment",
            "unrelated": {"nested": true}
        }));
        assert_eq!(merged.max_single_type_ratio, 0.8);
        assert_eq!(merged.min_types_present, 5);
        // The string literal is skipped, the default survives.
        assert_eq!(
            merged.clustering_strength_threshold,
            DEFAULT_CLUSTERING_THRESHOLD
        );
    }

    /// Test the empty graph measures clean
    #[test]
    fn test_empty_graph() {
        let tracker = DistributionTracker::new(DistributionTargets::default());
        let snap = tracker.measure(&WorldGraph::new([]));
        assert_eq!(snap.connectivity.clusters, 0);
        assert_eq!(snap.connectivity.isolated_node_ratio, 0.0);
        assert_eq!(snap.overall, 0.0);
    }
}
