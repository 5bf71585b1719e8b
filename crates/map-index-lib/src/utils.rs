//! Projected-plane constants and rectangle operations
//!
//! Map data lives in a projected planar space where x is longitude in degrees and y is the
//! spherical Mercator northing rescaled to degrees, so the whole world is the square
//! `[-180, 180] × [-180, 180]`.

use geo::{Coord, Rect};

/// Projected world bounds (Mercator degrees)
pub const WORLD_MIN: f64 = -180.0;
pub const WORLD_MAX: f64 = 180.0;
pub const WORLD_SIZE: f64 = WORLD_MAX - WORLD_MIN;

/// Check if a coordinate is finite and within the projected world
#[inline(always)]
pub fn is_valid_projected(point: Coord<f64>) -> bool {
    point.x.is_finite()
        && point.y.is_finite()
        && (WORLD_MIN..=WORLD_MAX).contains(&point.x)
        && (WORLD_MIN..=WORLD_MAX).contains(&point.y)
}

/// Inclusive rectangle intersection: touching edges count as intersecting
#[inline(always)]
pub fn rects_intersect(a: Rect<f64>, b: Rect<f64>) -> bool {
    let (amin, amax) = (a.min(), a.max());
    let (bmin, bmax) = (b.min(), b.max());
    !(amax.x < bmin.x || amin.x > bmax.x || amax.y < bmin.y || amin.y > bmax.y)
}

/// Whether `outer` fully contains `inner` (edges inclusive)
#[inline(always)]
pub fn rect_contains(outer: Rect<f64>, inner: Rect<f64>) -> bool {
    let (omin, omax) = (outer.min(), outer.max());
    let (imin, imax) = (inner.min(), inner.max());
    imin.x >= omin.x && imin.y >= omin.y && imax.x <= omax.x && imax.y <= omax.y
}

/// Smallest rectangle covering both inputs
#[inline]
pub fn rect_union(a: Rect<f64>, b: Rect<f64>) -> Rect<f64> {
    Rect::new(
        Coord {
            x: a.min().x.min(b.min().x),
            y: a.min().y.min(b.min().y),
        },
        Coord {
            x: a.max().x.max(b.max().x),
            y: a.max().y.max(b.max().y),
        },
    )
}

/// Bounding rectangle of a set of coordinates, `None` when empty
pub fn bounding_rect(coords: &[Coord<f64>]) -> Option<Rect<f64>> {
    let first = *coords.first()?;
    let (min, max) = coords.iter().skip(1).fold((first, first), |(min, max), c| {
        (
            Coord {
                x: min.x.min(c.x),
                y: min.y.min(c.y),
            },
            Coord {
                x: max.x.max(c.x),
                y: max.y.max(c.y),
            },
        )
    });
    Some(Rect::new(min, max))
}

/// Euclidean distance between two projected coordinates
#[inline(always)]
pub fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}
