//! Map features as stored in a loaded source

use crate::{MapError, Result, TypeCode, scales, utils};
use geo::{Coord, Rect};
use std::fmt;
use std::sync::Arc;

/// Identity of a feature: owning map file name plus index within that map
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId {
    pub map: Arc<str>,
    pub index: u32,
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.map, self.index)
    }
}

/// Geometry class of a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    Point,
    Line,
    Area,
}

impl FeatureKind {
    /// Minimum number of vertices a geometry of this kind needs
    pub fn min_vertices(self) -> usize {
        match self {
            FeatureKind::Point => 1,
            FeatureKind::Line => 2,
            FeatureKind::Area => 3,
        }
    }

    /// Painter's order used for tile drawing (lower draws first)
    pub fn draw_order(self) -> u8 {
        match self {
            FeatureKind::Area => 0,
            FeatureKind::Line => 1,
            FeatureKind::Point => 2,
        }
    }
}

/// A name in a given language (`""` is the default name)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizedName {
    pub lang: String,
    pub name: String,
}

impl LocalizedName {
    pub fn new(lang: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            name: name.into(),
        }
    }
}

/// Inclusive range of scales at which a feature is visible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleRange {
    pub min: u8,
    pub max: u8,
}

impl ScaleRange {
    pub fn new(min: u8, max: u8) -> Self {
        let max = max.min(scales::UPPER_SCALE);
        Self {
            min: min.min(max),
            max,
        }
    }

    /// Visible at every scale
    pub fn all() -> Self {
        Self::new(0, scales::UPPER_SCALE)
    }

    #[inline]
    pub fn contains(&self, scale: u8) -> bool {
        scale >= self.min && scale <= self.max
    }
}

impl Default for ScaleRange {
    fn default() -> Self {
        Self::all()
    }
}

/// A single geographic entity owned by exactly one map source
#[derive(Debug, Clone)]
pub struct MapFeature {
    id: FeatureId,
    kind: FeatureKind,
    names: Vec<LocalizedName>,
    types: Vec<TypeCode>,
    geometry: Vec<Coord<f64>>,
    rect: Rect<f64>,
    scales: ScaleRange,
}

impl MapFeature {
    /// Build a feature, validating its geometry against its kind
    pub fn new(
        id: FeatureId,
        kind: FeatureKind,
        names: Vec<LocalizedName>,
        types: Vec<TypeCode>,
        geometry: Vec<Coord<f64>>,
        scales: ScaleRange,
    ) -> Result<Self> {
        if geometry.len() < kind.min_vertices() {
            return Err(MapError::InvalidGeometry(format!(
                "{id}: {kind:?} needs at least {} vertices, got {}",
                kind.min_vertices(),
                geometry.len()
            )));
        }
        if let Some(bad) = geometry.iter().find(|c| !utils::is_valid_projected(**c)) {
            return Err(MapError::InvalidGeometry(format!(
                "{id}: vertex ({}, {}) outside projected bounds",
                bad.x, bad.y
            )));
        }
        let rect = utils::bounding_rect(&geometry).ok_or_else(|| {
            MapError::InvalidGeometry(format!("{id}: empty geometry"))
        })?;

        Ok(Self {
            id,
            kind,
            names,
            types,
            geometry,
            rect,
            scales,
        })
    }

    #[inline]
    pub fn id(&self) -> &FeatureId {
        &self.id
    }

    #[inline]
    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    #[inline]
    pub fn names(&self) -> &[LocalizedName] {
        &self.names
    }

    #[inline]
    pub fn types(&self) -> &[TypeCode] {
        &self.types
    }

    #[inline]
    pub fn geometry(&self) -> &[Coord<f64>] {
        &self.geometry
    }

    #[inline]
    pub fn rect(&self) -> Rect<f64> {
        self.rect
    }

    #[inline]
    pub fn scales(&self) -> ScaleRange {
        self.scales
    }

    pub fn has_type(&self, code: TypeCode) -> bool {
        self.types.contains(&code)
    }

    /// Representative point: the vertex of a point feature, otherwise the rect centre
    pub fn center(&self) -> Coord<f64> {
        match self.kind {
            FeatureKind::Point => self.geometry[0],
            FeatureKind::Line | FeatureKind::Area => self.rect.center(),
        }
    }

    /// Best name for a locale: exact language, then the default name, then any name
    pub fn name(&self, locale: &str) -> Option<&str> {
        self.names
            .iter()
            .find(|n| n.lang == locale)
            .or_else(|| self.names.iter().find(|n| n.lang.is_empty()))
            .or_else(|| self.names.first())
            .map(|n| n.name.as_str())
    }
}
