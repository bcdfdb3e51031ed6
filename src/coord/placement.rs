// Copyright 2025 Cowboy AI, LLC.

//! Placement schemes
//!
//! A placement scheme is a tagged algorithm that produces a [`Coordinate`]
//! for a new entity, or reports failure after a bounded number of attempts.
//! Schemes compose: `ExclusionAware` wraps any base scheme, and
//! `SaturationCascade` re-targets a base scheme at a child plane when the
//! preferred plane is saturated per the manifold configuration.
//!
//! The engine never consults global state: callers hand in the existing
//! points (graph plus the in-flight batch, so one template placing several
//! entities gets incremental exclusion) and the run's seeded generator.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::coord::{AxisValue, Coordinate, CoordinateSpaceDef};
use crate::errors::{EngineError, EngineResult};
use crate::rng::EngineRng;

/// Default candidate budget per active point for the Poisson variants
pub const DEFAULT_SAMPLES_PER_POINT: u32 = 30;

/// An already-placed point the engine must respect
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingPoint {
    /// Entity id, when the point belongs to a committed entity
    pub id: Option<String>,
    /// Entity kind, consulted by per-kind exclusion distances
    pub kind: String,
    /// Where the point sits
    pub coordinate: Coordinate,
}

/// Points placed earlier in the same template execution
#[derive(Debug, Clone, Default)]
pub struct PlacementBatch {
    points: Vec<ExistingPoint>,
}

impl PlacementBatch {
    /// Empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a placement so later placements in the batch see it
    pub fn push(&mut self, kind: impl Into<String>, coordinate: Coordinate) {
        self.points.push(ExistingPoint {
            id: None,
            kind: kind.into(),
            coordinate,
        });
    }

    /// Points accumulated so far
    pub fn points(&self) -> &[ExistingPoint] {
        &self.points
    }

    /// Number of accumulated points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A static rectangular keep-out region in sector space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExclusionZone {
    /// Plane the zone applies to; all planes when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plane: Option<String>,
    /// Minimum `sector_x`
    pub min_x: f64,
    /// Maximum `sector_x`
    pub max_x: f64,
    /// Minimum `sector_y`
    pub min_y: f64,
    /// Maximum `sector_y`
    pub max_y: f64,
}

/// Minimum spacing from existing entities of one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KindSpacing {
    /// Entity kind the spacing applies to
    pub kind: String,
    /// Minimum sector-space distance
    pub min_distance: f64,
}

/// Where a gaussian cluster centers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClusterCenter {
    /// Center on an existing entity's coordinates
    Entity(String),
    /// Center on a literal point
    Literal(Coordinate),
}

/// How a plane counts as saturated for cascade placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SaturationStrategy {
    /// Saturated at `threshold` placed entities
    Count {
        /// Entity count at which the plane saturates
        threshold: usize,
    },
    /// Saturated at `threshold` entities per unit of sector area
    Density {
        /// Entities-per-area at which the plane saturates
        threshold: f64,
    },
    /// Saturated after `threshold` placement failures on the plane
    Failures {
        /// Failure count at which the plane saturates
        threshold: u32,
    },
}

/// One plane in the manifold hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ManifoldPlane {
    /// Plane id, matching the space's plane axis members
    pub id: String,
    /// Child planes in cascade priority order
    #[serde(default)]
    pub children: Vec<String>,
    /// When this plane stops accepting direct placement
    pub saturation: SaturationStrategy,
}

/// Plane hierarchy and saturation policy for cascade placement
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ManifoldConfig {
    /// All declared planes
    #[serde(default)]
    pub planes: Vec<ManifoldPlane>,
}

impl ManifoldConfig {
    /// Look up one plane's declaration
    pub fn plane(&self, id: &str) -> Option<&ManifoldPlane> {
        self.planes.iter().find(|p| p.id == id)
    }
}

/// A tagged placement algorithm
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementScheme {
    /// Bridson blue-noise sampling in 2-D sector space
    PoissonDisk {
        /// Coordinate space id
        space: String,
        /// Minimum spacing between points, in sector units
        min_distance: f64,
        /// Candidates tried per active point before it retires
        max_samples_per_point: u32,
        /// Restrict to one plane; the space default otherwise
        constrain_plane: Option<String>,
        /// Restrict to these z-bands; the space default otherwise
        constrain_z_bands: Vec<String>,
    },
    /// Low-discrepancy van-der-Corput continuation, bases {2, 3}
    HaltonSequence {
        /// Coordinate space id
        space: String,
        /// Index offset; the point index is `start_index + existing count`
        start_index: u64,
        /// Restrict to one plane
        constrain_plane: Option<String>,
    },
    /// Grid cells filled in order with a jittered offset
    JitteredGrid {
        /// Coordinate space id
        space: String,
        /// Grid columns
        grid_x: u32,
        /// Grid rows
        grid_y: u32,
        /// Jitter as a fraction of cell size, in [0, 1]
        jitter: f64,
        /// Restrict to one plane
        constrain_plane: Option<String>,
    },
    /// Box-Muller sample around a center
    GaussianCluster {
        /// Coordinate space id
        space: String,
        /// Cluster center
        center: ClusterCenter,
        /// Standard deviation in sector units
        sigma: f64,
        /// Reject samples farther than this from the center
        max_distance: Option<f64>,
        /// Attempt budget
        max_attempts: u32,
    },
    /// Copy an anchor entity's coordinates exactly
    AnchorColocated {
        /// Coordinate space id
        space: String,
        /// Anchor entity id
        anchor: String,
    },
    /// Average of several reference entities' positions
    CentroidColocated {
        /// Coordinate space id
        space: String,
        /// Reference entity ids
        references: Vec<String>,
    },
    /// Wrap a base scheme with keep-out zones and per-kind spacing
    ExclusionAware {
        /// The wrapped scheme
        base: Box<PlacementScheme>,
        /// Static keep-out regions
        zones: Vec<ExclusionZone>,
        /// Per-kind minimum distances
        spacing: Vec<KindSpacing>,
        /// Attempt budget across base invocations
        max_attempts: u32,
    },
    /// 6-D Poisson disk over the normalised space
    CrossPlanePoisson {
        /// Coordinate space id
        space: String,
        /// Minimum weighted 6-D distance, in normalised units
        min_distance: f64,
        /// Candidates tried per active point before it retires
        max_samples_per_point: u32,
    },
    /// Run a base scheme on the preferred plane, cascading to children when
    /// the plane is saturated per the manifold configuration
    SaturationCascade {
        /// The wrapped 2-D scheme
        base: Box<PlacementScheme>,
        /// Plane tried first
        preferred_plane: String,
    },
}

impl PlacementScheme {
    /// Poisson disk with the default candidate budget
    pub fn poisson(space: impl Into<String>, min_distance: f64) -> Self {
        PlacementScheme::PoissonDisk {
            space: space.into(),
            min_distance,
            max_samples_per_point: DEFAULT_SAMPLES_PER_POINT,
            constrain_plane: None,
            constrain_z_bands: Vec::new(),
        }
    }

    /// The coordinate space this scheme targets
    pub fn space_id(&self) -> &str {
        match self {
            PlacementScheme::PoissonDisk { space, .. }
            | PlacementScheme::HaltonSequence { space, .. }
            | PlacementScheme::JitteredGrid { space, .. }
            | PlacementScheme::GaussianCluster { space, .. }
            | PlacementScheme::AnchorColocated { space, .. }
            | PlacementScheme::CentroidColocated { space, .. }
            | PlacementScheme::CrossPlanePoisson { space, .. } => space,
            PlacementScheme::ExclusionAware { base, .. }
            | PlacementScheme::SaturationCascade { base, .. } => base.space_id(),
        }
    }

    /// Clone of this scheme re-targeted at one plane, where the variant
    /// supports plane constraints
    fn constrained_to_plane(&self, plane: &str) -> PlacementScheme {
        let mut scheme = self.clone();
        match &mut scheme {
            PlacementScheme::PoissonDisk {
                constrain_plane, ..
            }
            | PlacementScheme::HaltonSequence {
                constrain_plane, ..
            }
            | PlacementScheme::JitteredGrid {
                constrain_plane, ..
            } => *constrain_plane = Some(plane.to_string()),
            PlacementScheme::ExclusionAware { base, .. } => {
                *base = Box::new(base.constrained_to_plane(plane));
            }
            _ => {}
        }
        scheme
    }
}

/// Why and how a placement was produced
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlacementDiagnostics {
    /// Candidates evaluated before success or exhaustion
    pub attempts_used: u32,
    /// Distance to the closest respected point, when measured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nearest_obstacle_distance: Option<f64>,
    /// The originally-preferred plane, set when cascade re-targeted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cascaded_from: Option<String>,
}

/// A successful placement
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// The produced coordinate
    pub coordinates: Coordinate,
    /// Distance to the scheme's reference point, when one exists
    pub distance_from_reference: Option<f64>,
    /// Diagnostics for the history log
    pub diagnostics: PlacementDiagnostics,
}

/// Executes placement schemes against a set of declared spaces
///
/// Owns the per-run failure counters consulted by the `Failures` saturation
/// strategy.
#[derive(Debug)]
pub struct PlacementEngine<'a> {
    spaces: &'a [CoordinateSpaceDef],
    manifold: Option<&'a ManifoldConfig>,
    failures_by_plane: IndexMap<String, u32>,
}

impl<'a> PlacementEngine<'a> {
    /// Create an engine over the declared spaces
    pub fn new(spaces: &'a [CoordinateSpaceDef], manifold: Option<&'a ManifoldConfig>) -> Self {
        Self {
            spaces,
            manifold,
            failures_by_plane: IndexMap::new(),
        }
    }

    /// Failures recorded against a plane so far this run
    pub fn failure_count(&self, plane: &str) -> u32 {
        self.failures_by_plane.get(plane).copied().unwrap_or(0)
    }

    /// Seed the per-plane failure counters, carried across engine
    /// instances by the driver
    pub fn set_failure_counts(&mut self, counts: IndexMap<String, u32>) {
        self.failures_by_plane = counts;
    }

    /// Take the per-plane failure counters back out
    pub fn take_failure_counts(&mut self) -> IndexMap<String, u32> {
        std::mem::take(&mut self.failures_by_plane)
    }

    fn space(&self, id: &str) -> EngineResult<&'a CoordinateSpaceDef> {
        self.spaces
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| EngineError::UnknownCoordinateSpace(id.to_string()))
    }

    /// Run a scheme for one entity
    ///
    /// `existing` is the committed world, `batch` the points placed earlier
    /// by the same template. Returns `Ok(None)` on bounded exhaustion; the
    /// caller records the miss and may fall back to a simpler scheme.
    pub fn execute(
        &mut self,
        scheme: &PlacementScheme,
        entity_kind: &str,
        existing: &[ExistingPoint],
        batch: &PlacementBatch,
        rng: &mut EngineRng,
    ) -> EngineResult<Option<Placement>> {
        let mut all = Vec::with_capacity(existing.len() + batch.len());
        all.extend_from_slice(existing);
        all.extend_from_slice(batch.points());

        let result = self.run(scheme, entity_kind, &all, rng)?;
        if result.is_none() {
            let space = self.space(scheme.space_id())?;
            let plane = default_plane_id(space, None);
            *self.failures_by_plane.entry(plane).or_insert(0) += 1;
            warn!(
                scheme = ?scheme_name(scheme),
                entity_kind,
                "placement exhausted its attempt budget"
            );
        }
        Ok(result)
    }

    fn run(
        &mut self,
        scheme: &PlacementScheme,
        entity_kind: &str,
        existing: &[ExistingPoint],
        rng: &mut EngineRng,
    ) -> EngineResult<Option<Placement>> {
        match scheme {
            PlacementScheme::PoissonDisk {
                space,
                min_distance,
                max_samples_per_point,
                constrain_plane,
                constrain_z_bands,
            } => {
                let space = self.space(space)?;
                Ok(poisson_disk(
                    space,
                    *min_distance,
                    *max_samples_per_point,
                    constrain_plane.as_deref(),
                    constrain_z_bands,
                    existing,
                    rng,
                ))
            }
            PlacementScheme::HaltonSequence {
                space,
                start_index,
                constrain_plane,
            } => {
                let space = self.space(space)?;
                Ok(halton(
                    space,
                    *start_index,
                    constrain_plane.as_deref(),
                    existing,
                ))
            }
            PlacementScheme::JitteredGrid {
                space,
                grid_x,
                grid_y,
                jitter,
                constrain_plane,
            } => {
                let space = self.space(space)?;
                Ok(jittered_grid(
                    space,
                    *grid_x,
                    *grid_y,
                    *jitter,
                    constrain_plane.as_deref(),
                    existing,
                    rng,
                ))
            }
            PlacementScheme::GaussianCluster {
                space,
                center,
                sigma,
                max_distance,
                max_attempts,
            } => {
                let space = self.space(space)?;
                Ok(gaussian_cluster(
                    space,
                    center,
                    *sigma,
                    *max_distance,
                    *max_attempts,
                    existing,
                    rng,
                ))
            }
            PlacementScheme::AnchorColocated { space, anchor } => {
                let _ = self.space(space)?;
                Ok(anchor_colocated(anchor, existing))
            }
            PlacementScheme::CentroidColocated { space, references } => {
                let _ = self.space(space)?;
                Ok(centroid_colocated(references, existing))
            }
            PlacementScheme::ExclusionAware {
                base,
                zones,
                spacing,
                max_attempts,
            } => self.exclusion_aware(base, zones, spacing, *max_attempts, entity_kind, existing, rng),
            PlacementScheme::CrossPlanePoisson {
                space,
                min_distance,
                max_samples_per_point,
            } => {
                let space = self.space(space)?;
                Ok(cross_plane_poisson(
                    space,
                    *min_distance,
                    *max_samples_per_point,
                    existing,
                    rng,
                ))
            }
            PlacementScheme::SaturationCascade {
                base,
                preferred_plane,
            } => self.saturation_cascade(base, preferred_plane, entity_kind, existing, rng),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn exclusion_aware(
        &mut self,
        base: &PlacementScheme,
        zones: &[ExclusionZone],
        spacing: &[KindSpacing],
        max_attempts: u32,
        entity_kind: &str,
        existing: &[ExistingPoint],
        rng: &mut EngineRng,
    ) -> EngineResult<Option<Placement>> {
        let mut attempts_used = 0;
        for _ in 0..max_attempts.max(1) {
            let Some(mut placement) = self.run(base, entity_kind, existing, rng)? else {
                attempts_used += 1;
                continue;
            };
            attempts_used += placement.diagnostics.attempts_used.max(1);

            let c = &placement.coordinates;
            let (x, y) = match (c.sector_x.as_numeric(), c.sector_y.as_numeric()) {
                (Some(x), Some(y)) => (x, y),
                _ => return Ok(None),
            };
            let plane = c.plane.as_id();

            let in_zone = zones.iter().any(|z| {
                let plane_ok = match (&z.plane, plane) {
                    (Some(zp), Some(p)) => zp == p,
                    (Some(_), None) => false,
                    (None, _) => true,
                };
                plane_ok && x >= z.min_x && x <= z.max_x && y >= z.min_y && y <= z.max_y
            });
            if in_zone {
                continue;
            }

            let mut nearest: Option<f64> = None;
            let mut too_close = false;
            for rule in spacing {
                for pt in existing.iter().filter(|p| p.kind == rule.kind) {
                    if !pt.coordinate.plane.same_as(&c.plane) {
                        continue;
                    }
                    if let (Some(px), Some(py)) = (
                        pt.coordinate.sector_x.as_numeric(),
                        pt.coordinate.sector_y.as_numeric(),
                    ) {
                        let d = ((px - x).powi(2) + (py - y).powi(2)).sqrt();
                        nearest = Some(nearest.map_or(d, |n: f64| n.min(d)));
                        if d < rule.min_distance {
                            too_close = true;
                            break;
                        }
                    }
                }
                if too_close {
                    break;
                }
            }
            if too_close {
                continue;
            }

            placement.diagnostics.attempts_used = attempts_used;
            if placement.diagnostics.nearest_obstacle_distance.is_none() {
                placement.diagnostics.nearest_obstacle_distance = nearest;
            }
            return Ok(Some(placement));
        }
        Ok(None)
    }

    fn saturation_cascade(
        &mut self,
        base: &PlacementScheme,
        preferred_plane: &str,
        entity_kind: &str,
        existing: &[ExistingPoint],
        rng: &mut EngineRng,
    ) -> EngineResult<Option<Placement>> {
        let space = self.space(base.space_id())?;
        let Some(target) = self.find_open_plane(space, preferred_plane, existing) else {
            debug!(preferred_plane, "every plane in the cascade is saturated");
            return Ok(None);
        };

        let constrained = base.constrained_to_plane(&target);
        let mut placement = match self.run(&constrained, entity_kind, existing, rng)? {
            Some(p) => p,
            None => return Ok(None),
        };
        if target != preferred_plane {
            debug!(from = preferred_plane, to = %target, "placement cascaded");
            placement.diagnostics.cascaded_from = Some(preferred_plane.to_string());
        }
        Ok(Some(placement))
    }

    fn find_open_plane(
        &self,
        space: &CoordinateSpaceDef,
        plane: &str,
        existing: &[ExistingPoint],
    ) -> Option<String> {
        if !self.plane_saturated(space, plane, existing) {
            return Some(plane.to_string());
        }
        let node = self.manifold.and_then(|m| m.plane(plane))?;
        for child in &node.children {
            if let Some(open) = self.find_open_plane(space, child, existing) {
                return Some(open);
            }
        }
        None
    }

    fn plane_saturated(
        &self,
        space: &CoordinateSpaceDef,
        plane: &str,
        existing: &[ExistingPoint],
    ) -> bool {
        let Some(node) = self.manifold.and_then(|m| m.plane(plane)) else {
            // Undeclared planes never saturate.
            return false;
        };
        let on_plane = existing
            .iter()
            .filter(|p| p.coordinate.plane.as_id() == Some(plane))
            .count();
        match &node.saturation {
            SaturationStrategy::Count { threshold } => on_plane >= *threshold,
            SaturationStrategy::Density { threshold } => {
                let area = space
                    .sector_bounds()
                    .map(|b| (b.width() * b.height()).max(1e-9))
                    .unwrap_or(1.0);
                on_plane as f64 / area >= *threshold
            }
            SaturationStrategy::Failures { threshold } => self.failure_count(plane) >= *threshold,
        }
    }
}

fn scheme_name(scheme: &PlacementScheme) -> &'static str {
    match scheme {
        PlacementScheme::PoissonDisk { .. } => "poisson_disk",
        PlacementScheme::HaltonSequence { .. } => "halton_sequence",
        PlacementScheme::JitteredGrid { .. } => "jittered_grid",
        PlacementScheme::GaussianCluster { .. } => "gaussian_cluster",
        PlacementScheme::AnchorColocated { .. } => "anchor_colocated",
        PlacementScheme::CentroidColocated { .. } => "centroid_colocated",
        PlacementScheme::ExclusionAware { .. } => "exclusion_aware",
        PlacementScheme::CrossPlanePoisson { .. } => "cross_plane_poisson",
        PlacementScheme::SaturationCascade { .. } => "saturation_cascade",
    }
}

fn default_plane_id(space: &CoordinateSpaceDef, constrain: Option<&str>) -> String {
    match constrain {
        Some(p) => p.to_string(),
        None => space
            .plane
            .default
            .as_id()
            .map(|s| s.to_string())
            .unwrap_or_else(|| space.plane.default.to_string()),
    }
}

fn build_coordinate(
    space: &CoordinateSpaceDef,
    plane: &str,
    x: f64,
    y: f64,
    z_band: Option<&str>,
) -> Coordinate {
    let mut c = space.default_coordinate();
    c.plane = AxisValue::Id(plane.to_string());
    c.sector_x = AxisValue::Numeric(x);
    c.sector_y = AxisValue::Numeric(y);
    if let Some(z) = z_band {
        c.z_band = AxisValue::Id(z.to_string());
    }
    c
}

/// Points on the given plane as raw (x, y) sector pairs
fn plane_points(existing: &[ExistingPoint], plane: &str) -> Vec<(f64, f64)> {
    existing
        .iter()
        .filter(|p| p.coordinate.plane.as_id() == Some(plane))
        .filter_map(|p| {
            Some((
                p.coordinate.sector_x.as_numeric()?,
                p.coordinate.sector_y.as_numeric()?,
            ))
        })
        .collect()
}

/// Spatial hash over 2-D points with a fixed cell size
struct SpatialHash2 {
    cell: f64,
    buckets: IndexMap<(i64, i64), Vec<usize>>,
}

impl SpatialHash2 {
    fn new(cell: f64, points: &[(f64, f64)]) -> Self {
        let mut hash = Self {
            cell: cell.max(1e-9),
            buckets: IndexMap::new(),
        };
        for (i, (x, y)) in points.iter().enumerate() {
            hash.buckets.entry(hash.key(*x, *y)).or_default().push(i);
        }
        hash
    }

    fn key(&self, x: f64, y: f64) -> (i64, i64) {
        ((x / self.cell).floor() as i64, (y / self.cell).floor() as i64)
    }

    /// Distance to the closest point within radius, checking the 5x5
    /// neighbourhood that a cell size of r/sqrt(2) requires
    fn nearest_within(&self, points: &[(f64, f64)], x: f64, y: f64, radius: f64) -> Option<f64> {
        let (kx, ky) = self.key(x, y);
        let mut best: Option<f64> = None;
        for dx in -2..=2i64 {
            for dy in -2..=2i64 {
                if let Some(bucket) = self.buckets.get(&(kx + dx, ky + dy)) {
                    for &i in bucket {
                        let (px, py) = points[i];
                        let d = ((px - x).powi(2) + (py - y).powi(2)).sqrt();
                        if d <= radius {
                            best = Some(best.map_or(d, |b: f64| b.min(d)));
                        }
                    }
                }
            }
        }
        best
    }
}

fn poisson_disk(
    space: &CoordinateSpaceDef,
    min_distance: f64,
    max_samples_per_point: u32,
    constrain_plane: Option<&str>,
    constrain_z_bands: &[String],
    existing: &[ExistingPoint],
    rng: &mut EngineRng,
) -> Option<Placement> {
    let bounds = space.sector_bounds()?;
    let plane = default_plane_id(space, constrain_plane);
    let z_band = constrain_z_bands.first().map(|s| s.as_str());
    let k = max_samples_per_point.max(1);
    let points = plane_points(existing, &plane);

    let mut attempts = 0u32;

    if points.is_empty() {
        // First point: anywhere in bounds.
        attempts += 1;
        let x = rng.range_f64(bounds.min_x, bounds.max_x);
        let y = rng.range_f64(bounds.min_y, bounds.max_y);
        return Some(Placement {
            coordinates: build_coordinate(space, &plane, x, y, z_band),
            distance_from_reference: None,
            diagnostics: PlacementDiagnostics {
                attempts_used: attempts,
                nearest_obstacle_distance: None,
                cascaded_from: None,
            },
        });
    }

    let hash = SpatialHash2::new(min_distance / std::f64::consts::SQRT_2, &points);
    let mut active: Vec<usize> = (0..points.len()).collect();

    while !active.is_empty() {
        let slot = rng.range_usize(active.len());
        let (ax, ay) = points[active[slot]];

        for _ in 0..k {
            attempts += 1;
            // Annulus [r, 2r] around the active point.
            let angle = rng.range_f64(0.0, std::f64::consts::TAU);
            let radius = rng.range_f64(min_distance, 2.0 * min_distance);
            let x = ax + radius * angle.cos();
            let y = ay + radius * angle.sin();
            if !bounds.contains(x, y) {
                continue;
            }
            if hash.nearest_within(&points, x, y, min_distance * (1.0 - 1e-9)).is_some() {
                continue;
            }
            let nearest = hash
                .nearest_within(&points, x, y, 2.0 * min_distance)
                .unwrap_or(min_distance);
            return Some(Placement {
                coordinates: build_coordinate(space, &plane, x, y, z_band),
                distance_from_reference: None,
                diagnostics: PlacementDiagnostics {
                    attempts_used: attempts,
                    nearest_obstacle_distance: Some(nearest),
                    cascaded_from: None,
                },
            });
        }
        // Candidate budget exhausted: retire the active point.
        active.swap_remove(slot);
    }
    None
}

/// Van der Corput radical inverse in the given base
fn van_der_corput(mut index: u64, base: u64) -> f64 {
    let mut result = 0.0;
    let mut denom = 1.0;
    while index > 0 {
        denom *= base as f64;
        result += (index % base) as f64 / denom;
        index /= base;
    }
    result
}

fn halton(
    space: &CoordinateSpaceDef,
    start_index: u64,
    constrain_plane: Option<&str>,
    existing: &[ExistingPoint],
) -> Option<Placement> {
    let bounds = space.sector_bounds()?;
    let plane = default_plane_id(space, constrain_plane);
    // Continuation: the n-th placement resumes the sequence where the
    // existing population left off.
    let index = start_index + existing.len() as u64 + 1;
    let x = bounds.min_x + van_der_corput(index, 2) * bounds.width();
    let y = bounds.min_y + van_der_corput(index, 3) * bounds.height();
    Some(Placement {
        coordinates: build_coordinate(space, &plane, x, y, None),
        distance_from_reference: None,
        diagnostics: PlacementDiagnostics {
            attempts_used: 1,
            nearest_obstacle_distance: None,
            cascaded_from: None,
        },
    })
}

fn jittered_grid(
    space: &CoordinateSpaceDef,
    grid_x: u32,
    grid_y: u32,
    jitter: f64,
    constrain_plane: Option<&str>,
    existing: &[ExistingPoint],
    rng: &mut EngineRng,
) -> Option<Placement> {
    let bounds = space.sector_bounds()?;
    let plane = default_plane_id(space, constrain_plane);
    let gx = grid_x.max(1) as u64;
    let gy = grid_y.max(1) as u64;
    let n = existing.len() as u64 % (gx * gy);
    let col = n % gx;
    let row = n / gx;
    let cell_w = bounds.width() / gx as f64;
    let cell_h = bounds.height() / gy as f64;
    let jitter = jitter.clamp(0.0, 1.0);
    let x = bounds.min_x
        + (col as f64 + 0.5) * cell_w
        + rng.range_f64(-jitter / 2.0, jitter / 2.0) * cell_w;
    let y = bounds.min_y
        + (row as f64 + 0.5) * cell_h
        + rng.range_f64(-jitter / 2.0, jitter / 2.0) * cell_h;
    let x = x.clamp(bounds.min_x, bounds.max_x);
    let y = y.clamp(bounds.min_y, bounds.max_y);
    Some(Placement {
        coordinates: build_coordinate(space, &plane, x, y, None),
        distance_from_reference: None,
        diagnostics: PlacementDiagnostics {
            attempts_used: 1,
            nearest_obstacle_distance: None,
            cascaded_from: None,
        },
    })
}

fn gaussian_cluster(
    space: &CoordinateSpaceDef,
    center: &ClusterCenter,
    sigma: f64,
    max_distance: Option<f64>,
    max_attempts: u32,
    existing: &[ExistingPoint],
    rng: &mut EngineRng,
) -> Option<Placement> {
    let bounds = space.sector_bounds()?;
    let center_coord = match center {
        ClusterCenter::Entity(id) => {
            existing
                .iter()
                .find(|p| p.id.as_deref() == Some(id.as_str()))?
                .coordinate
                .clone()
        }
        ClusterCenter::Literal(c) => c.clone(),
    };
    let cx = center_coord.sector_x.as_numeric()?;
    let cy = center_coord.sector_y.as_numeric()?;
    let plane = center_coord
        .plane
        .as_id()
        .map(|s| s.to_string())
        .unwrap_or_else(|| default_plane_id(space, None));
    let z_band = center_coord.z_band.as_id().map(|s| s.to_string());

    for attempt in 1..=max_attempts.max(1) {
        let x = rng.gaussian(cx, sigma);
        let y = rng.gaussian(cy, sigma);
        let d = ((x - cx).powi(2) + (y - cy).powi(2)).sqrt();
        if let Some(limit) = max_distance {
            if d > limit {
                continue;
            }
        }
        if !bounds.contains(x, y) {
            continue;
        }
        return Some(Placement {
            coordinates: build_coordinate(space, &plane, x, y, z_band.as_deref()),
            distance_from_reference: Some(d),
            diagnostics: PlacementDiagnostics {
                attempts_used: attempt,
                nearest_obstacle_distance: None,
                cascaded_from: None,
            },
        });
    }
    None
}

fn anchor_colocated(anchor: &str, existing: &[ExistingPoint]) -> Option<Placement> {
    let point = existing
        .iter()
        .find(|p| p.id.as_deref() == Some(anchor))?;
    Some(Placement {
        coordinates: point.coordinate.clone(),
        distance_from_reference: Some(0.0),
        diagnostics: PlacementDiagnostics {
            attempts_used: 1,
            nearest_obstacle_distance: None,
            cascaded_from: None,
        },
    })
}

fn centroid_colocated(references: &[String], existing: &[ExistingPoint]) -> Option<Placement> {
    let refs: Vec<&ExistingPoint> = references
        .iter()
        .filter_map(|id| existing.iter().find(|p| p.id.as_deref() == Some(id.as_str())))
        .collect();
    if refs.is_empty() {
        return None;
    }
    // Refuse mixed-plane reference sets.
    let plane = refs[0].coordinate.plane.clone();
    if refs.iter().any(|p| !p.coordinate.plane.same_as(&plane)) {
        return None;
    }

    let mean = |values: Vec<Option<f64>>| -> Option<f64> {
        let v: Vec<f64> = values.into_iter().collect::<Option<Vec<_>>>()?;
        Some(v.iter().sum::<f64>() / v.len() as f64)
    };
    let sx = mean(refs.iter().map(|p| p.coordinate.sector_x.as_numeric()).collect())?;
    let sy = mean(refs.iter().map(|p| p.coordinate.sector_y.as_numeric()).collect())?;
    let cx = mean(refs.iter().map(|p| p.coordinate.cell_x.as_numeric()).collect());
    let cy = mean(refs.iter().map(|p| p.coordinate.cell_y.as_numeric()).collect());

    // Modal z-band across references.
    let mut counts: IndexMap<String, usize> = IndexMap::new();
    for p in &refs {
        let key = p.coordinate.z_band.to_string();
        *counts.entry(key).or_insert(0) += 1;
    }
    let z_band = counts
        .iter()
        .max_by_key(|(_, n)| **n)
        .map(|(k, _)| k.clone());

    let mut c = refs[0].coordinate.clone();
    c.plane = plane;
    c.sector_x = AxisValue::Numeric(sx);
    c.sector_y = AxisValue::Numeric(sy);
    if let Some(v) = cx {
        c.cell_x = AxisValue::Numeric(v);
    }
    if let Some(v) = cy {
        c.cell_y = AxisValue::Numeric(v);
    }
    if let Some(z) = z_band {
        // Preserve the discrete/numeric shape of the modal band.
        c.z_band = match refs
            .iter()
            .find(|p| p.coordinate.z_band.to_string() == z)
            .map(|p| p.coordinate.z_band.clone())
        {
            Some(v) => v,
            None => AxisValue::Id(z),
        };
    }

    Some(Placement {
        coordinates: c,
        distance_from_reference: None,
        diagnostics: PlacementDiagnostics {
            attempts_used: 1,
            nearest_obstacle_distance: None,
            cascaded_from: None,
        },
    })
}

/// Spatial hash over normalised 6-D points
struct SpatialHash6 {
    cell: f64,
    buckets: IndexMap<[i64; 6], Vec<usize>>,
}

impl SpatialHash6 {
    fn new(cell: f64, points: &[[f64; 6]]) -> Self {
        let mut hash = Self {
            cell: cell.max(1e-9),
            buckets: IndexMap::new(),
        };
        for (i, p) in points.iter().enumerate() {
            hash.buckets.entry(hash.key(p)).or_default().push(i);
        }
        hash
    }

    fn key(&self, p: &[f64; 6]) -> [i64; 6] {
        let mut k = [0i64; 6];
        for (i, v) in p.iter().enumerate() {
            k[i] = (v / self.cell).floor() as i64;
        }
        k
    }

    /// Indices of points in the 3^6 neighbourhood of `p`
    fn neighbours(&self, p: &[f64; 6]) -> Vec<usize> {
        let center = self.key(p);
        let mut out = Vec::new();
        // 729 neighbour cells: offsets in {-1, 0, 1}^6.
        for code in 0..3u32.pow(6) {
            let mut key = center;
            let mut c = code;
            for k in key.iter_mut() {
                *k += i64::from(c % 3) - 1;
                c /= 3;
            }
            if let Some(bucket) = self.buckets.get(&key) {
                out.extend_from_slice(bucket);
            }
        }
        out
    }
}

fn cross_plane_poisson(
    space: &CoordinateSpaceDef,
    min_distance: f64,
    max_samples_per_point: u32,
    existing: &[ExistingPoint],
    rng: &mut EngineRng,
) -> Option<Placement> {
    let k = max_samples_per_point.max(1);
    let points: Vec<[f64; 6]> = existing
        .iter()
        .filter_map(|p| space.normalize_coordinate(&p.coordinate))
        .collect();

    let mut attempts = 0u32;

    if points.is_empty() {
        attempts += 1;
        let mut p = [0.0; 6];
        for v in p.iter_mut() {
            *v = rng.next_f64();
        }
        return Some(Placement {
            coordinates: space.denormalize_coordinate(&p),
            distance_from_reference: None,
            diagnostics: PlacementDiagnostics {
                attempts_used: attempts,
                nearest_obstacle_distance: None,
                cascaded_from: None,
            },
        });
    }

    let hash = SpatialHash6::new(min_distance / (6.0f64).sqrt(), &points);
    let mut active: Vec<usize> = (0..points.len()).collect();

    while !active.is_empty() {
        let slot = rng.range_usize(active.len());
        let origin = points[active[slot]];

        for _ in 0..k {
            attempts += 1;
            let direction = rng.unit_vector(6);
            let radius = rng.range_f64(min_distance, 2.0 * min_distance);
            let mut candidate = [0.0; 6];
            let mut in_bounds = true;
            for i in 0..6 {
                candidate[i] = origin[i] + direction[i] * radius;
                if !(0.0..=1.0).contains(&candidate[i]) {
                    in_bounds = false;
                    break;
                }
            }
            if !in_bounds {
                continue;
            }

            let mut nearest: Option<f64> = None;
            let mut blocked = false;
            for i in hash.neighbours(&candidate) {
                let d = space.normalized_distance(&candidate, &points[i]);
                nearest = Some(nearest.map_or(d, |n: f64| n.min(d)));
                if d < min_distance {
                    blocked = true;
                    break;
                }
            }
            if blocked {
                continue;
            }

            return Some(Placement {
                coordinates: space.denormalize_coordinate(&candidate),
                distance_from_reference: None,
                diagnostics: PlacementDiagnostics {
                    attempts_used: attempts,
                    nearest_obstacle_distance: nearest,
                    cascaded_from: None,
                },
            });
        }
        // Candidate budget exhausted: retire the active point.
        active.swap_remove(slot);
    }
    None
}
