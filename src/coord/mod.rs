// Copyright 2025 Cowboy AI, LLC.

//! Multi-space coordinates and distance
//!
//! Every coordinate is six axes: `plane`, `sector_x`, `sector_y`, `cell_x`,
//! `cell_y`, `z_band`. A coordinate space binds semantics to each axis
//! (enum, numeric, or hierarchical), and an entity may carry coordinates in
//! several spaces at once (physical, political, social, ...).
//!
//! Distance is hierarchical: the sector term always contributes, the cell
//! term only when the two points share or neighbour a sector on both sector
//! axes, and crossing planes is either impossible (no multiplier declared)
//! or scaled by the space's cross-plane multiplier.

pub mod placement;
pub mod spatial;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One axis value: a numeric scalar or a discrete identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum AxisValue {
    /// Numeric scalar
    Numeric(f64),
    /// Discrete identifier (enum member or hierarchy path)
    Id(String),
}

impl AxisValue {
    /// The numeric scalar, when numeric
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            AxisValue::Numeric(v) => Some(*v),
            AxisValue::Id(_) => None,
        }
    }

    /// The identifier, when discrete
    pub fn as_id(&self) -> Option<&str> {
        match self {
            AxisValue::Numeric(_) => None,
            AxisValue::Id(s) => Some(s),
        }
    }

    /// Value equality across the two shapes; numeric comparison uses a
    /// small epsilon so round-tripped floats still match
    pub fn same_as(&self, other: &AxisValue) -> bool {
        match (self, other) {
            (AxisValue::Numeric(a), AxisValue::Numeric(b)) => (a - b).abs() < 1e-9,
            (AxisValue::Id(a), AxisValue::Id(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for AxisValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisValue::Numeric(v) => write!(f, "{v}"),
            AxisValue::Id(s) => f.write_str(s),
        }
    }
}

impl From<f64> for AxisValue {
    fn from(v: f64) -> Self {
        AxisValue::Numeric(v)
    }
}

impl From<&str> for AxisValue {
    fn from(s: &str) -> Self {
        AxisValue::Id(s.to_string())
    }
}

/// The six axes of a coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    /// Which plane (world layer) the point is on
    Plane,
    /// Coarse horizontal position
    SectorX,
    /// Coarse vertical position
    SectorY,
    /// Fine horizontal position within a sector
    CellX,
    /// Fine vertical position within a sector
    CellY,
    /// Altitude/depth band
    ZBand,
}

impl Axis {
    /// All six axes in canonical order
    pub const ALL: [Axis; 6] = [
        Axis::Plane,
        Axis::SectorX,
        Axis::SectorY,
        Axis::CellX,
        Axis::CellY,
        Axis::ZBand,
    ];
}

/// A six-axis point in one coordinate space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Coordinate {
    /// Plane axis
    pub plane: AxisValue,
    /// Coarse horizontal axis
    pub sector_x: AxisValue,
    /// Coarse vertical axis
    pub sector_y: AxisValue,
    /// Fine horizontal axis
    pub cell_x: AxisValue,
    /// Fine vertical axis
    pub cell_y: AxisValue,
    /// Altitude/depth band axis
    pub z_band: AxisValue,
}

impl Coordinate {
    /// A coordinate on `plane` at the given sector position, with cells at
    /// the sector center and the given band
    pub fn sector(
        plane: impl Into<AxisValue>,
        sector_x: f64,
        sector_y: f64,
        z_band: impl Into<AxisValue>,
    ) -> Self {
        Self {
            plane: plane.into(),
            sector_x: AxisValue::Numeric(sector_x),
            sector_y: AxisValue::Numeric(sector_y),
            cell_x: AxisValue::Numeric(0.5),
            cell_y: AxisValue::Numeric(0.5),
            z_band: z_band.into(),
        }
    }

    /// Read one axis
    pub fn axis(&self, axis: Axis) -> &AxisValue {
        match axis {
            Axis::Plane => &self.plane,
            Axis::SectorX => &self.sector_x,
            Axis::SectorY => &self.sector_y,
            Axis::CellX => &self.cell_x,
            Axis::CellY => &self.cell_y,
            Axis::ZBand => &self.z_band,
        }
    }

    /// Write one axis
    pub fn set_axis(&mut self, axis: Axis, value: AxisValue) {
        match axis {
            Axis::Plane => self.plane = value,
            Axis::SectorX => self.sector_x = value,
            Axis::SectorY => self.sector_y = value,
            Axis::CellX => self.cell_x = value,
            Axis::CellY => self.cell_y = value,
            Axis::ZBand => self.z_band = value,
        }
    }
}

/// One member of an enum axis with its numeric equivalent in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EnumAxisValue {
    /// Member id
    pub id: String,
    /// Numeric equivalent used for normalisation, in [0, 1]
    pub numeric: f64,
}

/// Semantics of one axis within a space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AxisSemantics {
    /// Discrete members, each with a numeric equivalent
    Enum {
        /// Allowed members
        values: Vec<EnumAxisValue>,
    },
    /// Continuous numeric range
    Numeric {
        /// Inclusive minimum
        min: f64,
        /// Inclusive maximum
        max: f64,
    },
    /// Slash-separated paths normalised by depth
    Hierarchical {
        /// Maximum path depth
        max_depth: u32,
        /// Canonical path per depth, index 0 is depth 1
        #[serde(default)]
        levels: Vec<String>,
    },
}

/// Binding of semantics, default, and distance weight for one axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AxisDef {
    /// What values the axis takes and how they normalise
    pub semantics: AxisSemantics,
    /// Default value for entities placed without one
    pub default: AxisValue,
    /// Distance weight, overridable per call
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl AxisDef {
    /// Numeric axis with weight 1
    pub fn numeric(min: f64, max: f64, default: f64) -> Self {
        Self {
            semantics: AxisSemantics::Numeric { min, max },
            default: AxisValue::Numeric(default),
            weight: 1.0,
        }
    }

    /// Enum axis with evenly spread numeric equivalents and weight 1
    pub fn enumerated(ids: &[&str]) -> Self {
        let n = ids.len().max(1);
        let values = ids
            .iter()
            .enumerate()
            .map(|(i, id)| EnumAxisValue {
                id: (*id).to_string(),
                numeric: if n == 1 {
                    0.0
                } else {
                    i as f64 / (n - 1) as f64
                },
            })
            .collect::<Vec<_>>();
        let default = AxisValue::Id(ids.first().map(|s| s.to_string()).unwrap_or_default());
        Self {
            semantics: AxisSemantics::Enum { values },
            default,
            weight: 1.0,
        }
    }

    /// Project an axis value into [0, 1]; `None` when the value does not
    /// fit the semantics (unknown enum id, non-numeric on a numeric axis)
    pub fn normalize(&self, value: &AxisValue) -> Option<f64> {
        match (&self.semantics, value) {
            (AxisSemantics::Enum { values }, AxisValue::Id(id)) => values
                .iter()
                .find(|v| &v.id == id)
                .map(|v| v.numeric.clamp(0.0, 1.0)),
            (AxisSemantics::Enum { .. }, AxisValue::Numeric(v)) => Some(v.clamp(0.0, 1.0)),
            (AxisSemantics::Numeric { min, max }, AxisValue::Numeric(v)) => {
                if max <= min {
                    return Some(0.0);
                }
                Some(((v - min) / (max - min)).clamp(0.0, 1.0))
            }
            (AxisSemantics::Numeric { .. }, AxisValue::Id(_)) => None,
            (AxisSemantics::Hierarchical { max_depth, .. }, value) => {
                let depth = match value {
                    AxisValue::Id(path) => path.split('/').filter(|s| !s.is_empty()).count() as f64,
                    AxisValue::Numeric(v) => *v,
                };
                if *max_depth == 0 {
                    return Some(0.0);
                }
                Some((depth / f64::from(*max_depth)).clamp(0.0, 1.0))
            }
        }
    }

    /// Invert normalisation: enum closest-match, linear numeric, nearest
    /// hierarchy depth
    pub fn denormalize(&self, t: f64) -> AxisValue {
        let t = t.clamp(0.0, 1.0);
        match &self.semantics {
            AxisSemantics::Enum { values } => values
                .iter()
                .min_by(|a, b| {
                    let da = (a.numeric - t).abs();
                    let db = (b.numeric - t).abs();
                    da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|v| AxisValue::Id(v.id.clone()))
                .unwrap_or(AxisValue::Numeric(t)),
            AxisSemantics::Numeric { min, max } => AxisValue::Numeric(min + t * (max - min)),
            AxisSemantics::Hierarchical { max_depth, levels } => {
                let depth = (t * f64::from(*max_depth)).round().max(1.0) as usize;
                match levels.get(depth.saturating_sub(1)) {
                    Some(path) => AxisValue::Id(path.clone()),
                    None => AxisValue::Numeric(depth as f64),
                }
            }
        }
    }
}

/// Per-call axis weight overrides; unset axes use the space's weights
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisWeights {
    /// Override for `sector_x`
    pub sector_x: Option<f64>,
    /// Override for `sector_y`
    pub sector_y: Option<f64>,
    /// Override for `cell_x`
    pub cell_x: Option<f64>,
    /// Override for `cell_y`
    pub cell_y: Option<f64>,
    /// Override for `z_band`
    pub z_band: Option<f64>,
}

/// A coordinate space: per-axis semantics plus cross-plane policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CoordinateSpaceDef {
    /// Space id, referenced from entity coordinate maps
    pub id: String,
    /// Plane axis
    pub plane: AxisDef,
    /// Coarse horizontal axis
    pub sector_x: AxisDef,
    /// Coarse vertical axis
    pub sector_y: AxisDef,
    /// Fine horizontal axis
    pub cell_x: AxisDef,
    /// Fine vertical axis
    pub cell_y: AxisDef,
    /// Altitude/depth band axis
    pub z_band: AxisDef,
    /// Distance multiplier applied when planes differ; crossing planes is
    /// impossible (infinite distance) when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_plane_multiplier: Option<f64>,
    /// Entity kinds placed in this space by default
    #[serde(default)]
    pub default_for_kinds: Vec<String>,
}

/// Rectangular sector bounds of a space with numeric sector axes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectorBounds {
    /// Minimum `sector_x`
    pub min_x: f64,
    /// Maximum `sector_x`
    pub max_x: f64,
    /// Minimum `sector_y`
    pub min_y: f64,
    /// Maximum `sector_y`
    pub max_y: f64,
}

impl SectorBounds {
    /// Width of the bounds
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounds
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Diagonal length, the largest distance the bounds can contain
    pub fn diameter(&self) -> f64 {
        (self.width() * self.width() + self.height() * self.height()).sqrt()
    }

    /// Whether a point is inside (inclusive)
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

impl CoordinateSpaceDef {
    /// Read the definition of one axis
    pub fn axis_def(&self, axis: Axis) -> &AxisDef {
        match axis {
            Axis::Plane => &self.plane,
            Axis::SectorX => &self.sector_x,
            Axis::SectorY => &self.sector_y,
            Axis::CellX => &self.cell_x,
            Axis::CellY => &self.cell_y,
            Axis::ZBand => &self.z_band,
        }
    }

    /// Coordinate assembled from axis defaults
    pub fn default_coordinate(&self) -> Coordinate {
        Coordinate {
            plane: self.plane.default.clone(),
            sector_x: self.sector_x.default.clone(),
            sector_y: self.sector_y.default.clone(),
            cell_x: self.cell_x.default.clone(),
            cell_y: self.cell_y.default.clone(),
            z_band: self.z_band.default.clone(),
        }
    }

    /// Sector bounds when both sector axes are numeric
    pub fn sector_bounds(&self) -> Option<SectorBounds> {
        match (&self.sector_x.semantics, &self.sector_y.semantics) {
            (
                AxisSemantics::Numeric { min: x0, max: x1 },
                AxisSemantics::Numeric { min: y0, max: y1 },
            ) => Some(SectorBounds {
                min_x: *x0,
                max_x: *x1,
                min_y: *y0,
                max_y: *y1,
            }),
            _ => None,
        }
    }

    /// Whether the coordinate's numeric axes all fall inside their declared
    /// ranges
    pub fn is_within_bounds(&self, coordinate: &Coordinate) -> bool {
        for axis in Axis::ALL {
            let def = self.axis_def(axis);
            if let (AxisSemantics::Numeric { min, max }, AxisValue::Numeric(v)) =
                (&def.semantics, coordinate.axis(axis))
            {
                if *v < min - 1e-9 || *v > max + 1e-9 {
                    return false;
                }
            }
        }
        true
    }

    /// Project a coordinate into [0, 1]^6 for the 6-D algorithms
    pub fn normalize_coordinate(&self, coordinate: &Coordinate) -> Option<[f64; 6]> {
        let mut out = [0.0; 6];
        for (i, axis) in Axis::ALL.iter().enumerate() {
            out[i] = self.axis_def(*axis).normalize(coordinate.axis(*axis))?;
        }
        Some(out)
    }

    /// Invert [`normalize_coordinate`](Self::normalize_coordinate)
    pub fn denormalize_coordinate(&self, point: &[f64; 6]) -> Coordinate {
        let mut coordinate = self.default_coordinate();
        for (i, axis) in Axis::ALL.iter().enumerate() {
            coordinate.set_axis(*axis, self.axis_def(*axis).denormalize(point[i]));
        }
        coordinate
    }

    /// Whether two points share or neighbour a sector on the given axis
    fn sector_adjacent(value_a: &AxisValue, value_b: &AxisValue) -> bool {
        match (value_a, value_b) {
            (AxisValue::Numeric(a), AxisValue::Numeric(b)) => (a - b).abs() <= 1.0 + 1e-9,
            (AxisValue::Id(a), AxisValue::Id(b)) => a == b,
            _ => false,
        }
    }

    /// Distance between two coordinates in this space
    ///
    /// Infinite when the planes differ and no cross-plane multiplier is
    /// declared, or when a value cannot be normalised. The cell term is
    /// included only when the points share or neighbour a sector on both
    /// sector axes, preserving the coarse-over-fine hierarchy.
    pub fn distance(&self, a: &Coordinate, b: &Coordinate) -> f64 {
        self.distance_weighted(a, b, &AxisWeights::default())
    }

    /// [`distance`](Self::distance) with per-call axis weight overrides
    pub fn distance_weighted(&self, a: &Coordinate, b: &Coordinate, weights: &AxisWeights) -> f64 {
        let plane_multiplier = if a.plane.same_as(&b.plane) {
            1.0
        } else {
            match self.cross_plane_multiplier {
                Some(m) => m,
                None => return f64::INFINITY,
            }
        };

        let norm = |axis: Axis, va: &AxisValue, vb: &AxisValue| -> Option<f64> {
            let def = self.axis_def(axis);
            Some((def.normalize(va)? - def.normalize(vb)?).abs())
        };

        let w = |axis: Axis, over: Option<f64>| over.unwrap_or(self.axis_def(axis).weight);

        let dsx = match norm(Axis::SectorX, &a.sector_x, &b.sector_x) {
            Some(d) => d * w(Axis::SectorX, weights.sector_x),
            None => return f64::INFINITY,
        };
        let dsy = match norm(Axis::SectorY, &a.sector_y, &b.sector_y) {
            Some(d) => d * w(Axis::SectorY, weights.sector_y),
            None => return f64::INFINITY,
        };
        let sector_term = (dsx * dsx + dsy * dsy).sqrt();

        let cells_in_scope = Self::sector_adjacent(&a.sector_x, &b.sector_x)
            && Self::sector_adjacent(&a.sector_y, &b.sector_y);
        let cell_term = if cells_in_scope {
            let dcx = match norm(Axis::CellX, &a.cell_x, &b.cell_x) {
                Some(d) => d * w(Axis::CellX, weights.cell_x),
                None => return f64::INFINITY,
            };
            let dcy = match norm(Axis::CellY, &a.cell_y, &b.cell_y) {
                Some(d) => d * w(Axis::CellY, weights.cell_y),
                None => return f64::INFINITY,
            };
            (dcx * dcx + dcy * dcy).sqrt()
        } else {
            0.0
        };

        let dz = match norm(Axis::ZBand, &a.z_band, &b.z_band) {
            Some(d) => d * w(Axis::ZBand, weights.z_band),
            None => return f64::INFINITY,
        };

        (sector_term + cell_term + dz) * plane_multiplier
    }

    /// Weighted distance between two points already normalised to [0, 1]^6
    ///
    /// Used by the 6-D placement algorithms. Axis 0 (plane) participates as
    /// a plain weighted component here; the plane gate applies only to
    /// coordinate-shaped distance.
    pub fn normalized_distance(&self, a: &[f64; 6], b: &[f64; 6]) -> f64 {
        let mut sum = 0.0;
        for (i, axis) in Axis::ALL.iter().enumerate() {
            let d = (a[i] - b[i]) * self.axis_def(*axis).weight;
            sum += d * d;
        }
        sum.sqrt()
    }
}

/// A compact physical-style space for tests and small domains: one enum
/// plane list, numeric sectors over the given extent, unit cells, enum
/// z-bands
pub fn simple_space(
    id: &str,
    planes: &[&str],
    extent: f64,
    z_bands: &[&str],
) -> CoordinateSpaceDef {
    CoordinateSpaceDef {
        id: id.to_string(),
        plane: AxisDef::enumerated(planes),
        sector_x: AxisDef::numeric(0.0, extent, extent / 2.0),
        sector_y: AxisDef::numeric(0.0, extent, extent / 2.0),
        cell_x: AxisDef::numeric(0.0, 1.0, 0.5),
        cell_y: AxisDef::numeric(0.0, 1.0, 0.5),
        z_band: AxisDef::enumerated(z_bands),
        cross_plane_multiplier: None,
        default_for_kinds: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn space() -> CoordinateSpaceDef {
        simple_space("physical", &["overworld", "underworld"], 100.0, &["surface", "deep"])
    }

    /// Test numeric normalisation and its inverse
    #[test]
    fn test_numeric_normalize_round_trip() {
        let def = AxisDef::numeric(0.0, 100.0, 50.0);
        let n = def.normalize(&AxisValue::Numeric(25.0)).unwrap();
        assert!((n - 0.25).abs() < 1e-12);
        let back = def.denormalize(n);
        assert!(back.same_as(&AxisValue::Numeric(25.0)));
    }

    /// Test enum normalisation picks declared equivalents and closest match
    #[test]
    fn test_enum_normalize() {
        let def = AxisDef::enumerated(&["surface", "mid", "deep"]);
        assert_eq!(def.normalize(&AxisValue::Id("surface".to_string())), Some(0.0));
        assert_eq!(def.normalize(&AxisValue::Id("deep".to_string())), Some(1.0));
        assert_eq!(def.normalize(&AxisValue::Id("abyss".to_string())), None);

        assert!(def
            .denormalize(0.55)
            .same_as(&AxisValue::Id("mid".to_string())));
    }

    /// Test hierarchical depth normalisation
    #[test]
    fn test_hierarchical_normalize() {
        let def = AxisDef {
            semantics: AxisSemantics::Hierarchical {
                max_depth: 4,
                levels: vec![
                    "realm".to_string(),
                    "realm/region".to_string(),
                    "realm/region/district".to_string(),
                    "realm/region/district/site".to_string(),
                ],
            },
            default: AxisValue::Id("realm".to_string()),
            weight: 1.0,
        };
        assert_eq!(
            def.normalize(&AxisValue::Id("realm/region".to_string())),
            Some(0.5)
        );
        assert!(def
            .denormalize(0.5)
            .same_as(&AxisValue::Id("realm/region".to_string())));
    }

    /// Test cross-plane distance gate
    ///
    /// ```mermaid
    /// graph LR
    ///     A[same plane] -->|weighted sum| D[finite]
    ///     B[planes differ, no multiplier] --> I[infinity]
    ///     C[planes differ, multiplier m] -->|scaled| D
    /// ```
    #[test]
    fn test_cross_plane_gate() {
        let mut s = space();
        let a = Coordinate::sector("overworld", 10.0, 10.0, "surface");
        let b = Coordinate::sector("underworld", 10.0, 10.0, "surface");

        assert_eq!(s.distance(&a, &b), f64::INFINITY);

        s.cross_plane_multiplier = Some(3.0);
        let same_plane = Coordinate::sector("overworld", 10.0, 10.0, "surface");
        let d_same = s.distance(&a, &same_plane);
        let d_cross = s.distance(&a, &b);
        assert!(d_cross.is_finite());
        assert!((d_cross - d_same * 3.0).abs() < 1e-9 || d_same == 0.0);
    }

    /// Test the cell term is dropped across distant sectors
    #[test]
    fn test_cell_term_hierarchy() {
        let s = space();
        // Same sector, different cells: the cell term contributes.
        let mut a = Coordinate::sector("overworld", 10.0, 10.0, "surface");
        let mut b = Coordinate::sector("overworld", 10.0, 10.0, "surface");
        a.cell_x = AxisValue::Numeric(0.0);
        b.cell_x = AxisValue::Numeric(1.0);
        let near = s.distance(&a, &b);
        assert!(near > 0.0);

        // Distant sectors: the same cell delta no longer matters.
        let mut c = Coordinate::sector("overworld", 50.0, 10.0, "surface");
        c.cell_x = AxisValue::Numeric(0.0);
        let mut d = Coordinate::sector("overworld", 90.0, 10.0, "surface");
        d.cell_x = AxisValue::Numeric(1.0);
        let mut d2 = d.clone();
        d2.cell_x = AxisValue::Numeric(0.0);
        assert!((s.distance(&c, &d) - s.distance(&c, &d2)).abs() < 1e-12);
    }

    /// Test distance grows with sector separation
    #[test]
    fn test_distance_monotone_in_sector_gap() {
        let s = space();
        let origin = Coordinate::sector("overworld", 0.0, 0.0, "surface");
        let near = Coordinate::sector("overworld", 10.0, 0.0, "surface");
        let far = Coordinate::sector("overworld", 60.0, 0.0, "surface");
        assert!(s.distance(&origin, &near) < s.distance(&origin, &far));
    }

    /// Test per-call weight overrides scale their axis only
    #[test]
    fn test_weight_override() {
        let s = space();
        let a = Coordinate::sector("overworld", 0.0, 0.0, "surface");
        let b = Coordinate::sector("overworld", 40.0, 0.0, "surface");
        let base = s.distance(&a, &b);
        let doubled = s.distance_weighted(
            &a,
            &b,
            &AxisWeights {
                sector_x: Some(2.0),
                ..AxisWeights::default()
            },
        );
        assert!((doubled - base * 2.0).abs() < 1e-9);
    }

    /// Test normalize/denormalize is the identity on numeric axes
    #[test_case(0.0, 0.0; "origin")]
    #[test_case(37.5, 81.25; "interior")]
    #[test_case(100.0, 100.0; "far corner")]
    fn test_coordinate_round_trip(x: f64, y: f64) {
        let s = space();
        let c = Coordinate::sector("overworld", x, y, "deep");
        let n = s.normalize_coordinate(&c).unwrap();
        let back = s.denormalize_coordinate(&n);
        assert!(back.sector_x.same_as(&c.sector_x));
        assert!(back.sector_y.same_as(&c.sector_y));
        assert!(back.plane.same_as(&c.plane));
        assert!(back.z_band.same_as(&c.z_band));
    }

    /// Test bounds checks on numeric axes
    #[test]
    fn test_bounds() {
        let s = space();
        let b = s.sector_bounds().unwrap();
        assert_eq!(b.width(), 100.0);
        assert!(b.contains(0.0, 100.0));
        assert!(!b.contains(-1.0, 5.0));

        let inside = Coordinate::sector("overworld", 99.0, 1.0, "surface");
        assert!(s.is_within_bounds(&inside));
        let outside = Coordinate::sector("overworld", 101.0, 1.0, "surface");
        assert!(!s.is_within_bounds(&outside));
    }

    /// Test unknown enum ids poison distance rather than panicking
    #[test]
    fn test_unknown_enum_distance_is_infinite() {
        let s = space();
        let a = Coordinate::sector("overworld", 1.0, 1.0, "surface");
        let b = Coordinate::sector("overworld", 1.0, 1.0, "molten-core");
        assert_eq!(s.distance(&a, &b), f64::INFINITY);
    }
}
