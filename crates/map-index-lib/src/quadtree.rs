//! Quadtree spatial index over the features of one map source
//!
//! Each feature is stored exactly once, at the deepest node whose bounding box fully
//! contains the feature's rectangle. Queries cull whole subtrees by rectangle, drop
//! features not visible at the requested scale, and only then run the exact rectangle test.

use crate::{MapFeature, utils};
use geo::{Coord, Rect};

/// Default maximum depth of the quadtree
pub const DEFAULT_MAX_DEPTH: u32 = 16;

/// Default number of features a node holds before it subdivides
pub const DEFAULT_MAX_FEATURES_PER_NODE: usize = 32;

/// How query matches are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueryPolicy {
    /// Storage order
    #[default]
    Standard,
    /// Painter's order for rendering: areas, then lines, then points
    TileDrawing,
}

/// Root container for the quadtree
#[derive(Debug, Clone)]
pub(crate) struct FeatureQuadtree {
    root: QuadtreeNode,
    max_depth: u32,
    max_features_per_node: usize,
    len: usize,
}

/// A single node in the quadtree
#[derive(Debug, Clone)]
struct QuadtreeNode {
    /// Bounding box in projected coordinates
    bounding_box: Rect<f64>,
    /// Depth level in the tree (0 = root)
    level: u32,
    /// Indices of features stored at this node
    entries: Vec<u32>,
    /// Child nodes (NW, NE, SW, SE) if subdivided
    children: Option<Box<[QuadtreeNode; 4]>>,
}

impl FeatureQuadtree {
    /// Create an empty quadtree covering `bounds`
    pub(crate) fn new(bounds: Rect<f64>, max_depth: u32, max_features_per_node: usize) -> Self {
        Self {
            root: QuadtreeNode::new(bounds, 0),
            max_depth,
            max_features_per_node: max_features_per_node.max(1),
            len: 0,
        }
    }

    /// Build a quadtree over all `features`, indexed by their position in the slice
    pub(crate) fn build(
        bounds: Rect<f64>,
        features: &[MapFeature],
        max_depth: u32,
        max_features_per_node: usize,
    ) -> Self {
        #[cfg(feature = "profiling")]
        profiling::scope!("quadtree::build");

        let mut tree = Self::new(bounds, max_depth, max_features_per_node);
        for index in 0..features.len() {
            tree.insert(index as u32, features);
        }
        tree
    }

    /// Insert the feature at `index` of `features`
    pub(crate) fn insert(&mut self, index: u32, features: &[MapFeature]) {
        self.root
            .insert(index, features, self.max_depth, self.max_features_per_node);
        self.len += 1;
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Collect indices of features intersecting `rect` that are visible at `scale`
    ///
    /// `None` disables the scale filter.
    pub(crate) fn query(
        &self,
        rect: Rect<f64>,
        scale: Option<u8>,
        features: &[MapFeature],
        results: &mut Vec<u32>,
    ) {
        self.root.query(rect, scale, features, results);
    }

    /// Number of nodes in the tree (diagnostics)
    pub(crate) fn node_count(&self) -> usize {
        self.root.node_count()
    }
}

impl QuadtreeNode {
    fn new(bounding_box: Rect<f64>, level: u32) -> Self {
        Self {
            bounding_box,
            level,
            entries: Vec::new(),
            children: None,
        }
    }

    /// Subdivide this node into 4 children
    fn subdivide(&mut self) {
        if self.children.is_some() {
            return; // Already subdivided
        }

        let min = self.bounding_box.min();
        let max = self.bounding_box.max();
        let mid_x = (min.x + max.x) / 2.0;
        let mid_y = (min.y + max.y) / 2.0;
        let child_level = self.level + 1;

        let nw = QuadtreeNode::new(
            Rect::new(Coord { x: min.x, y: mid_y }, Coord { x: mid_x, y: max.y }),
            child_level,
        );
        let ne = QuadtreeNode::new(
            Rect::new(Coord { x: mid_x, y: mid_y }, Coord { x: max.x, y: max.y }),
            child_level,
        );
        let sw = QuadtreeNode::new(
            Rect::new(Coord { x: min.x, y: min.y }, Coord { x: mid_x, y: mid_y }),
            child_level,
        );
        let se = QuadtreeNode::new(
            Rect::new(Coord { x: mid_x, y: min.y }, Coord { x: max.x, y: mid_y }),
            child_level,
        );

        self.children = Some(Box::new([nw, ne, sw, se]));
    }

    /// Index of the child that fully contains `rect`, if any
    fn child_for(&self, rect: Rect<f64>) -> Option<usize> {
        self.children.as_ref().and_then(|children| {
            children
                .iter()
                .position(|child| utils::rect_contains(child.bounding_box, rect))
        })
    }

    fn insert(
        &mut self,
        index: u32,
        features: &[MapFeature],
        max_depth: u32,
        max_features_per_node: usize,
    ) {
        let rect = features[index as usize].rect();

        if let Some(child) = self.child_for(rect) {
            if let Some(children) = &mut self.children {
                children[child].insert(index, features, max_depth, max_features_per_node);
                return;
            }
        }

        self.entries.push(index);

        if self.children.is_none()
            && self.level < max_depth
            && self.entries.len() > max_features_per_node
        {
            self.subdivide();
            // Push down every entry that now fits entirely inside a child
            let entries = std::mem::take(&mut self.entries);
            for entry in entries {
                let entry_rect = features[entry as usize].rect();
                match (self.child_for(entry_rect), &mut self.children) {
                    (Some(child), Some(children)) => {
                        children[child].insert(entry, features, max_depth, max_features_per_node)
                    }
                    _ => self.entries.push(entry),
                }
            }
        }
    }

    fn query(
        &self,
        rect: Rect<f64>,
        scale: Option<u8>,
        features: &[MapFeature],
        results: &mut Vec<u32>,
    ) {
        // Cull subtrees outside the query rectangle
        if !utils::rects_intersect(self.bounding_box, rect) {
            return;
        }

        for &entry in &self.entries {
            let feature = &features[entry as usize];
            // Cheap scale pre-filter before the geometric test
            let visible = scale.is_none_or(|s| feature.scales().contains(s));
            if visible && utils::rects_intersect(feature.rect(), rect) {
                results.push(entry);
            }
        }

        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query(rect, scale, features, results);
            }
        }
    }

    fn node_count(&self) -> usize {
        1 + self
            .children
            .as_ref()
            .map_or(0, |children| children.iter().map(QuadtreeNode::node_count).sum())
    }
}
