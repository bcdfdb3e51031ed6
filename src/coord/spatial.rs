// Copyright 2025 Cowboy AI, LLC.

//! Spatial queries over placed entities
//!
//! Distance-sorted neighbour lookups in one coordinate space. These walk
//! the graph's entities rather than a persistent spatial index: worlds top
//! out in the thousands of entities and queries run a handful of times per
//! tick, so the win from an incremental index never materialises.

use std::fmt;

use crate::coord::{AxisValue, Coordinate, CoordinateSpaceDef};
use crate::entity::Entity;
use crate::graph::GraphView;

/// Keep-or-drop predicate applied to candidate entities
pub type EntityFilter = Box<dyn Fn(&Entity) -> bool>;

/// Options for [`find_nearest`] and [`find_within_radius`]
#[derive(Default)]
pub struct SpatialQueryOptions {
    /// Most results to return; unlimited when zero
    pub limit: usize,
    /// Drop candidates farther than this
    pub max_distance: Option<f64>,
    /// Only candidates on these planes; any plane when empty
    pub constrain_planes: Vec<String>,
    /// Only candidates in these z-bands; any band when empty
    pub constrain_z_bands: Vec<String>,
    /// Arbitrary candidate predicate
    pub filter: Option<EntityFilter>,
}

impl fmt::Debug for SpatialQueryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialQueryOptions")
            .field("limit", &self.limit)
            .field("max_distance", &self.max_distance)
            .field("constrain_planes", &self.constrain_planes)
            .field("constrain_z_bands", &self.constrain_z_bands)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

impl SpatialQueryOptions {
    /// Options returning at most `limit` results
    pub fn limited(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    fn admits(&self, coordinate: &Coordinate) -> bool {
        if !self.constrain_planes.is_empty() {
            match coordinate.plane.as_id() {
                Some(plane) if self.constrain_planes.iter().any(|p| p == plane) => {}
                _ => return false,
            }
        }
        if !self.constrain_z_bands.is_empty() {
            match coordinate.z_band.as_id() {
                Some(band) if self.constrain_z_bands.iter().any(|z| z == band) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Entities of one kind nearest to a point, closest first
///
/// Entities without a coordinate in the space never match; infinite
/// distances (cross-plane without a multiplier) are dropped.
pub fn find_nearest(
    view: &GraphView<'_>,
    space: &CoordinateSpaceDef,
    point: &Coordinate,
    kind: &str,
    options: &SpatialQueryOptions,
) -> Vec<(Entity, f64)> {
    let mut hits: Vec<(Entity, f64)> = Vec::new();
    for entity in view.entities_by_kind(kind) {
        let Some(coordinate) = entity.coordinates.get(&space.id) else {
            continue;
        };
        if !options.admits(coordinate) {
            continue;
        }
        if let Some(filter) = &options.filter {
            if !filter(&entity) {
                continue;
            }
        }
        let distance = space.distance(point, coordinate);
        if !distance.is_finite() {
            continue;
        }
        if let Some(max) = options.max_distance {
            if distance > max {
                continue;
            }
        }
        hits.push((entity, distance));
    }
    hits.sort_by(|(ea, da), (eb, db)| {
        da.partial_cmp(db)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| ea.id.cmp(&eb.id))
    });
    if options.limit > 0 {
        hits.truncate(options.limit);
    }
    hits
}

/// Bounded variant of [`find_nearest`]: everything within `radius`
pub fn find_within_radius(
    view: &GraphView<'_>,
    space: &CoordinateSpaceDef,
    point: &Coordinate,
    kind: &str,
    radius: f64,
    options: &SpatialQueryOptions,
) -> Vec<(Entity, f64)> {
    let bounded = SpatialQueryOptions {
        limit: options.limit,
        max_distance: Some(options.max_distance.map_or(radius, |m| m.min(radius))),
        constrain_planes: options.constrain_planes.clone(),
        constrain_z_bands: options.constrain_z_bands.clone(),
        filter: None,
    };
    let mut hits = find_nearest(view, space, point, kind, &bounded);
    if let Some(filter) = &options.filter {
        hits.retain(|(entity, _)| filter(entity));
    }
    hits
}

/// Mean position of a set of coordinates on one plane
///
/// Numeric sector and cell axes are averaged; plane and z-band come from
/// the first coordinate. `None` when the set is empty, spans planes, or
/// has non-numeric sector axes.
pub fn compute_centroid(coordinates: &[Coordinate]) -> Option<Coordinate> {
    let first = coordinates.first()?;
    if coordinates
        .iter()
        .any(|c| !c.plane.same_as(&first.plane))
    {
        return None;
    }
    let mean = |pick: fn(&Coordinate) -> &AxisValue| -> Option<f64> {
        let values: Vec<f64> = coordinates
            .iter()
            .map(|c| pick(c).as_numeric())
            .collect::<Option<Vec<_>>>()?;
        Some(values.iter().sum::<f64>() / values.len() as f64)
    };
    let sector_x = mean(|c| &c.sector_x)?;
    let sector_y = mean(|c| &c.sector_y)?;

    let mut centroid = first.clone();
    centroid.sector_x = AxisValue::Numeric(sector_x);
    centroid.sector_y = AxisValue::Numeric(sector_y);
    if let Some(cell_x) = mean(|c| &c.cell_x) {
        centroid.cell_x = AxisValue::Numeric(cell_x);
    }
    if let Some(cell_y) = mean(|c| &c.cell_y) {
        centroid.cell_y = AxisValue::Numeric(cell_y);
    }
    Some(centroid)
}
