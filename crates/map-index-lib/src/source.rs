//! SourceIndex - one loaded map file with its spatial index
//!
//! A source owns its features, the quadtree over them, and a small LRU cache of recent
//! query results. The cache only memoizes which feature indices matched; dropping it never
//! changes query results.

use crate::quadtree::FeatureQuadtree;
use crate::{IndexConfig, LoadedMap, MapFeature, QueryPolicy, utils};
use geo::{Coord, Rect};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Cache key for memoized queries
///
/// Rectangles are keyed by the exact bit patterns of their corners.
#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
struct QueryCacheKey {
    rect_bits: [u64; 4],
    scale: Option<u8>,
    policy: QueryPolicy,
}

impl QueryCacheKey {
    fn new(rect: Rect<f64>, scale: Option<u8>, policy: QueryPolicy) -> Self {
        Self {
            rect_bits: [
                rect.min().x.to_bits(),
                rect.min().y.to_bits(),
                rect.max().x.to_bits(),
                rect.max().y.to_bits(),
            ],
            scale,
            policy,
        }
    }
}

/// A loaded map source
pub struct SourceIndex {
    name: Arc<str>,
    path: PathBuf,
    version: u16,
    /// `None` for a map without features
    bounding_box: Option<Rect<f64>>,
    features: Vec<MapFeature>,
    quadtree: FeatureQuadtree,
    query_cache: Option<Mutex<LruCache<QueryCacheKey, Arc<[u32]>>>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl SourceIndex {
    /// Index a parsed map loaded from `path`
    pub fn new(path: &Path, loaded: LoadedMap, config: &IndexConfig) -> Self {
        let LoadedMap {
            name,
            version,
            features,
        } = loaded;

        let bounding_box = features
            .iter()
            .map(MapFeature::rect)
            .reduce(utils::rect_union);
        if bounding_box.is_none() {
            tracing::info!("{name} has no features");
        }

        let quadtree = FeatureQuadtree::build(
            bounding_box.unwrap_or_else(|| Rect::new(Coord::zero(), Coord::zero())),
            &features,
            config.max_depth,
            config.max_features_per_node,
        );

        let query_cache = NonZeroUsize::new(config.query_cache_capacity)
            .map(|capacity| Mutex::new(LruCache::new(capacity)));

        tracing::debug!(
            "Indexed {name}: {} features in {} quadtree nodes",
            features.len(),
            quadtree.node_count()
        );

        Self {
            name,
            path: path.to_path_buf(),
            version,
            bounding_box,
            features,
            quadtree,
            query_cache,
        }
    }

    /// File name the source is registered under
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path the source was loaded from
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Map format version
    #[inline]
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Bounding rectangle of all features, `None` when the map has none
    #[inline]
    pub fn bounding_box(&self) -> Option<Rect<f64>> {
        self.bounding_box
    }

    #[inline]
    pub fn feature_count(&self) -> usize {
        self.quadtree.len()
    }

    #[inline]
    pub fn features(&self) -> &[MapFeature] {
        &self.features
    }

    #[inline]
    pub fn feature(&self, index: u32) -> Option<&MapFeature> {
        self.features.get(index as usize)
    }

    /// Visit every feature intersecting `rect` that is visible at `scale` (any scale if `None`)
    pub fn for_each_in_rect<F>(
        &self,
        rect: Rect<f64>,
        scale: Option<u8>,
        policy: QueryPolicy,
        visitor: &mut F,
    ) where
        F: FnMut(&MapFeature) + ?Sized,
    {
        match self.bounding_box {
            Some(bounds) if utils::rects_intersect(bounds, rect) => {}
            _ => return,
        }

        for &index in self.matching_indices(rect, scale, policy).iter() {
            visitor(&self.features[index as usize]);
        }
    }

    /// Drop all memoized query results
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.query_cache {
            cache.lock().unwrap_or_else(PoisonError::into_inner).clear();
        }
    }

    /// Number of memoized query results
    pub fn cached_queries(&self) -> usize {
        self.query_cache.as_ref().map_or(0, |cache| {
            cache.lock().unwrap_or_else(PoisonError::into_inner).len()
        })
    }

    fn matching_indices(
        &self,
        rect: Rect<f64>,
        scale: Option<u8>,
        policy: QueryPolicy,
    ) -> Arc<[u32]> {
        let key = QueryCacheKey::new(rect, scale, policy);

        if let Some(cache) = &self.query_cache {
            let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
        }

        let mut indices = Vec::new();
        self.quadtree.query(rect, scale, &self.features, &mut indices);
        match policy {
            QueryPolicy::Standard => indices.sort_unstable(),
            QueryPolicy::TileDrawing => indices
                .sort_unstable_by_key(|&i| (self.features[i as usize].kind().draw_order(), i)),
        }
        let indices: Arc<[u32]> = indices.into();

        if let Some(cache) = &self.query_cache {
            cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .put(key, indices.clone());
        }

        indices
    }
}

impl std::fmt::Debug for SourceIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceIndex")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("bounding_box", &self.bounding_box)
            .field("features", &self.features.len())
            .finish()
    }
}
