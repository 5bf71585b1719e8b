//! MultiSourceIndex - top-level manager for loaded map files and feature queries
//!
//! This module provides the high-level API for loading and unloading map files and for
//! enumerating features by rectangle and scale across every loaded file at once.
//!
//! Queries and mutations follow a reader-writer discipline: any number of queries may run
//! together, each holding the read lock for its whole enumeration, while loads, removals
//! and cache clears take the write lock. Parsing happens before the write lock is taken, so
//! slow file IO never blocks readers.

use crate::quadtree::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_FEATURES_PER_NODE};
use crate::{
    Classificator, JsonMapReader, MapError, MapFeature, MapReader, QueryPolicy, ReaderStrategy,
    Result, SourceIndex, scales, utils,
};
use geo::Rect;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Configuration for the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// How map files are read while loading
    pub reader_strategy: ReaderStrategy,
    /// Reject features carrying tags unknown to the classificator
    pub strict_types: bool,
    /// Maximum depth of each source's quadtree
    pub max_depth: u32,
    /// Features a quadtree node holds before it subdivides
    pub max_features_per_node: usize,
    /// Memoized query results kept per source (0 disables the cache)
    pub query_cache_capacity: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            reader_strategy: ReaderStrategy::Buffered,
            strict_types: false,
            max_depth: DEFAULT_MAX_DEPTH,
            max_features_per_node: DEFAULT_MAX_FEATURES_PER_NODE,
            query_cache_capacity: 64,
        }
    }
}

/// Information about one loaded map
#[derive(Debug, Clone, PartialEq)]
pub struct MapInfo {
    pub name: String,
    pub path: PathBuf,
    pub version: u16,
    pub feature_count: usize,
    /// `None` for a map without features
    pub bounding_box: Option<Rect<f64>>,
}

/// Multi-source feature index
pub struct MultiSourceIndex {
    /// Type dictionary used to classify features at load time
    classificator: Arc<Classificator>,
    /// Map file loader
    reader: Arc<dyn MapReader>,
    /// Configuration settings
    config: IndexConfig,
    /// Loaded sources in load order, unique by name
    sources: RwLock<Vec<Arc<SourceIndex>>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl MultiSourceIndex {
    /// Create an empty index using the reference map reader
    pub fn new(classificator: Arc<Classificator>, config: IndexConfig) -> Self {
        let reader = JsonMapReader::new(config.reader_strategy).strict_types(config.strict_types);
        Self::with_reader(classificator, Arc::new(reader), config)
    }

    /// Create an empty index with a custom map reader
    pub fn with_reader(
        classificator: Arc<Classificator>,
        reader: Arc<dyn MapReader>,
        config: IndexConfig,
    ) -> Self {
        Self {
            classificator,
            reader,
            config,
            sources: RwLock::new(Vec::new()),
        }
    }

    /// Load a map file and register it under its file name
    ///
    /// Returns the map format version. On failure nothing changes. A map already loaded
    /// under the same file name is replaced in place.
    pub fn add_map(&self, path: impl AsRef<Path>) -> Result<u16> {
        #[cfg(feature = "profiling")]
        profiling::scope!("index::add_map");

        let path = path.as_ref();
        let source = self.load_source(path).inspect_err(|e| {
            tracing::warn!("Failed to load map {}: {e}", path.display());
        })?;
        let version = source.version();
        self.register(source);
        Ok(version)
    }

    /// Load several map files in parallel
    ///
    /// Parsing and indexing run in parallel; successfully loaded maps are then registered
    /// in argument order. Each path gets its own result.
    pub fn add_maps<P: AsRef<Path> + Sync>(&self, paths: &[P]) -> Vec<Result<u16>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("index::add_maps");

        let loaded: Vec<Result<SourceIndex>> = paths
            .par_iter()
            .map(|path| self.load_source(path.as_ref()))
            .collect();

        loaded
            .into_iter()
            .zip(paths)
            .map(|(result, path)| match result {
                Ok(source) => {
                    let version = source.version();
                    self.register(source);
                    Ok(version)
                }
                Err(e) => {
                    tracing::warn!("Failed to load map {}: {e}", path.as_ref().display());
                    Err(e)
                }
            })
            .collect()
    }

    /// Re-read a loaded map from the path it was loaded from
    ///
    /// On failure the previously loaded version stays registered.
    pub fn reload_map(&self, file_name: &str) -> Result<u16> {
        let path = self
            .read_sources()
            .iter()
            .find(|s| s.name() == file_name)
            .map(|s| s.path().to_path_buf())
            .ok_or_else(|| MapError::NotLoaded(file_name.to_string()))?;
        self.add_map(path)
    }

    /// Unload a map; returns whether it was loaded
    pub fn remove_map(&self, file_name: &str) -> bool {
        let mut sources = self.write_sources();
        let before = sources.len();
        sources.retain(|s| s.name() != file_name);
        let removed = sources.len() != before;
        if removed {
            tracing::info!("Removed map {file_name}");
        }
        removed
    }

    /// Unload every map
    pub fn remove_all_countries(&self) {
        let mut sources = self.write_sources();
        tracing::info!("Removing all {} maps", sources.len());
        sources.clear();
    }

    /// Whether a map with this file name is loaded
    pub fn is_loaded(&self, file_name: &str) -> bool {
        self.read_sources().iter().any(|s| s.name() == file_name)
    }

    /// Visit every feature intersecting `rect`, at the scale implied by the rectangle's size
    ///
    /// The read lock is held while `visitor` runs. A visitor must not call back into this
    /// index: with a writer waiting, a second read lock on the same thread can deadlock.
    pub fn for_each_feature<F>(&self, rect: Rect<f64>, visitor: F)
    where
        F: FnMut(&MapFeature),
    {
        self.for_each_feature_at_scale(rect, scales::scale_level(rect), visitor);
    }

    /// Visit every feature intersecting `rect` that is visible at `scale`
    ///
    /// Same locking rule as [`Self::for_each_feature`].
    pub fn for_each_feature_at_scale<F>(&self, rect: Rect<f64>, scale: u8, visitor: F)
    where
        F: FnMut(&MapFeature),
    {
        self.for_each_in_rect(rect, Some(scale), QueryPolicy::Standard, visitor);
    }

    /// Visit every feature intersecting `rect` regardless of its visibility scales
    ///
    /// Same locking rule as [`Self::for_each_feature`].
    pub fn for_each_feature_any_scale<F>(&self, rect: Rect<f64>, visitor: F)
    where
        F: FnMut(&MapFeature),
    {
        self.for_each_in_rect(rect, None, QueryPolicy::Standard, visitor);
    }

    /// Visit every feature of every loaded map, in load order
    ///
    /// One read lock covers the whole walk, so the set of maps cannot change halfway.
    /// Same locking rule as [`Self::for_each_feature`].
    pub fn for_each_feature_everywhere<F>(&self, mut visitor: F)
    where
        F: FnMut(&MapFeature),
    {
        #[cfg(feature = "profiling")]
        profiling::scope!("index::for_each_feature_everywhere");

        let sources = self.read_sources();
        tracing::trace!("Enumerating all features of {} maps", sources.len());
        for feature in sources.iter().flat_map(|s| s.features()) {
            visitor(feature);
        }
    }

    /// Rendering variant of [`Self::for_each_feature_at_scale`]
    ///
    /// Same matches, but each source delivers them in painter's order
    /// (areas, then lines, then points). Same locking rule as [`Self::for_each_feature`].
    pub fn for_each_feature_tile_drawing<F>(&self, rect: Rect<f64>, scale: u8, visitor: F)
    where
        F: FnMut(&MapFeature),
    {
        self.for_each_in_rect(rect, Some(scale), QueryPolicy::TileDrawing, visitor);
    }

    fn for_each_in_rect<F>(
        &self,
        rect: Rect<f64>,
        scale: Option<u8>,
        policy: QueryPolicy,
        mut visitor: F,
    ) where
        F: FnMut(&MapFeature),
    {
        #[cfg(feature = "profiling")]
        profiling::scope!("index::for_each_in_rect");

        let sources = self.read_sources();
        tracing::trace!(
            "Querying {} maps at scale {scale:?} with {policy:?} in {rect:?}",
            sources.len()
        );
        for source in sources.iter() {
            source.for_each_in_rect(rect, scale, policy, &mut visitor);
        }
    }

    /// Union of all loaded maps' rectangles, `None` when no loaded map has features
    pub fn world_rect(&self) -> Option<Rect<f64>> {
        self.read_sources()
            .iter()
            .filter_map(|s| s.bounding_box())
            .reduce(utils::rect_union)
    }

    /// Drop memoized query results of every map without unloading anything
    pub fn clear_caches(&self) {
        // Exclusive access so no query repopulates a cache mid-clear
        let sources = self.write_sources();
        for source in sources.iter() {
            source.clear_cache();
        }
        tracing::debug!("Cleared query caches of {} maps", sources.len());
    }

    /// Information about every loaded map, in load order
    pub fn maps(&self) -> Vec<MapInfo> {
        self.read_sources()
            .iter()
            .map(|s| MapInfo {
                name: s.name().to_string(),
                path: s.path().to_path_buf(),
                version: s.version(),
                feature_count: s.feature_count(),
                bounding_box: s.bounding_box(),
            })
            .collect()
    }

    /// Snapshot of a loaded source
    pub fn source(&self, file_name: &str) -> Option<Arc<SourceIndex>> {
        self.read_sources()
            .iter()
            .find(|s| s.name() == file_name)
            .cloned()
    }

    /// Total number of features across all maps
    pub fn feature_count(&self) -> usize {
        self.read_sources().iter().map(|s| s.feature_count()).sum()
    }

    /// Number of loaded maps
    pub fn map_count(&self) -> usize {
        self.read_sources().len()
    }

    #[inline]
    pub fn classificator(&self) -> &Arc<Classificator> {
        &self.classificator
    }

    #[inline]
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn load_source(&self, path: &Path) -> Result<SourceIndex> {
        let loaded = self.reader.load(path, &self.classificator)?;
        Ok(SourceIndex::new(path, loaded, &self.config))
    }

    fn register(&self, source: SourceIndex) {
        let source = Arc::new(source);
        let mut sources = self.write_sources();
        match sources.iter_mut().find(|s| s.name() == source.name()) {
            Some(slot) => {
                tracing::warn!(
                    "Replacing map {} (v{} -> v{})",
                    source.name(),
                    slot.version(),
                    source.version()
                );
                *slot = source;
            }
            None => {
                tracing::info!(
                    "Loaded map {} (v{}, {} features)",
                    source.name(),
                    source.version(),
                    source.feature_count()
                );
                sources.push(source);
            }
        }
    }

    fn read_sources(&self) -> RwLockReadGuard<'_, Vec<Arc<SourceIndex>>> {
        self.sources.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_sources(&self) -> RwLockWriteGuard<'_, Vec<Arc<SourceIndex>>> {
        self.sources.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for MultiSourceIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiSourceIndex")
            .field("config", &self.config)
            .field("maps", &self.map_count())
            .finish()
    }
}
