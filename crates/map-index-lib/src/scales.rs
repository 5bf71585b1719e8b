//! Discrete level-of-detail selection
//!
//! Scale 0 shows the whole world, each following scale halves the visible extent, and
//! [`UPPER_SCALE`] is the most detailed level map data is prepared for.

use crate::utils;
use geo::{Coord, Rect};

/// Most detailed scale level
pub const UPPER_SCALE: u8 = 17;

/// Scale level whose visible extent best matches the rectangle's larger side.
///
/// Coarser (larger) rectangles map to lower scales. Zero-size rectangles map to
/// [`UPPER_SCALE`].
pub fn scale_level(rect: Rect<f64>) -> u8 {
    let extent = rect.width().max(rect.height());
    if !(extent > 0.0) {
        return UPPER_SCALE;
    }
    let level = (utils::WORLD_SIZE / extent).log2().round();
    level.clamp(0.0, UPPER_SCALE as f64) as u8
}

/// Extent (side length) of the square visible at a given scale
#[inline]
pub fn extent_for_scale(scale: u8) -> f64 {
    utils::WORLD_SIZE / f64::from(1u32 << scale.min(UPPER_SCALE))
}

/// Square rectangle centred on `center` that [`scale_level`] maps back to `scale`
pub fn rect_for_scale(center: Coord<f64>, scale: u8) -> Rect<f64> {
    let half = extent_for_scale(scale) / 2.0;
    Rect::new(
        Coord {
            x: center.x - half,
            y: center.y - half,
        },
        Coord {
            x: center.x + half,
            y: center.y + half,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_is_scale_zero() {
        let world = Rect::new(
            Coord {
                x: utils::WORLD_MIN,
                y: utils::WORLD_MIN,
            },
            Coord {
                x: utils::WORLD_MAX,
                y: utils::WORLD_MAX,
            },
        );
        assert_eq!(scale_level(world), 0);
    }

    #[test]
    fn test_smaller_rect_higher_scale() {
        let origin = Coord { x: 0.0, y: 0.0 };
        let big = rect_for_scale(origin, 3);
        let small = rect_for_scale(origin, 10);
        assert!(scale_level(big) < scale_level(small));
    }

    #[test]
    fn test_rect_for_scale_roundtrip() {
        let center = Coord { x: 12.5, y: -40.0 };
        for scale in 0..=UPPER_SCALE {
            assert_eq!(scale_level(rect_for_scale(center, scale)), scale);
        }
    }

    #[test]
    fn test_degenerate_rect_is_upper_scale() {
        let point = Rect::new(Coord { x: 1.0, y: 1.0 }, Coord { x: 1.0, y: 1.0 });
        assert_eq!(scale_level(point), UPPER_SCALE);

        let tiny = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 1e-9, y: 0.0 });
        assert_eq!(scale_level(tiny), UPPER_SCALE);
    }

    #[test]
    fn test_larger_than_world_clamps_to_zero() {
        let huge = Rect::new(
            Coord {
                x: -1000.0,
                y: -1000.0,
            },
            Coord {
                x: 1000.0,
                y: 1000.0,
            },
        );
        assert_eq!(scale_level(huge), 0);
    }
}
