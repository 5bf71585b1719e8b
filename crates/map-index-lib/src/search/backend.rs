//! Search backends
//!
//! [`SearchBackend`] is the async seam between the session controller and whatever does
//! the matching. [`IndexSearchBackend`] matches names and type tags of the features held by
//! a [`MultiSourceIndex`].

use super::{SearchError, SearchMode, SearchRequest, SearchResult};
use crate::{MapFeature, MultiSourceIndex, angle, utils};
use async_trait::async_trait;
use geo::Coord;
use std::cmp::Ordering;
use std::sync::Arc;

/// Score of a name equal to the query
pub const EXACT_NAME_SCORE: f64 = 1.0;
/// Score of a name starting with the query
pub const NAME_PREFIX_SCORE: f64 = 0.75;
/// Score of a type tag equal to a query token
pub const TYPE_TAG_SCORE: f64 = 0.5;

/// Something that answers one search round-trip
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run `request`, returning at most `request.max_results` ranked matches
    async fn search(&self, request: SearchRequest) -> Result<Vec<SearchResult>, SearchError>;
}

/// Backend answering from the features of a [`MultiSourceIndex`]
#[derive(Debug, Clone)]
pub struct IndexSearchBackend {
    index: Arc<MultiSourceIndex>,
}

impl IndexSearchBackend {
    pub fn new(index: Arc<MultiSourceIndex>) -> Self {
        Self { index }
    }

    /// Run a request on the calling thread
    pub fn search_blocking(&self, request: &SearchRequest) -> Vec<SearchResult> {
        #[cfg(feature = "profiling")]
        profiling::scope!("search::index_backend");

        let query = request.query.trim().to_lowercase();
        if query.is_empty() || request.max_results == 0 {
            return Vec::new();
        }
        let tokens: Vec<&str> = query.split_whitespace().collect();

        let origin = request.viewport.center();
        let mut results = Vec::new();
        let visit = |feature: &MapFeature| {
            if let Some(score) = self.score(feature, &query, &tokens, &request.locale) {
                results.push(self.to_result(feature, score, origin, &request.locale));
            }
        };
        match request.mode {
            SearchMode::Viewport => self.index.for_each_feature_any_scale(request.viewport, visit),
            SearchMode::Everywhere => self.index.for_each_feature_everywhere(visit),
        }

        results.sort_by(compare_results);
        results.truncate(request.max_results);

        tracing::debug!(
            "Matched {} features for {:?} in {:?} mode",
            results.len(),
            request.query,
            request.mode
        );
        results
    }

    fn score(
        &self,
        feature: &MapFeature,
        query: &str,
        tokens: &[&str],
        locale: &str,
    ) -> Option<f64> {
        let mut best: Option<f64> = None;

        if let Some(name) = feature.name(locale) {
            let name = name.to_lowercase();
            if name == query {
                return Some(EXACT_NAME_SCORE);
            }
            let word_prefix = name.split_whitespace().any(|word| word.starts_with(query));
            if word_prefix || name.starts_with(query) {
                best = Some(NAME_PREFIX_SCORE);
            }
        }

        if best.is_none() {
            let classificator = self.index.classificator();
            let tag_match = feature.types().iter().any(|&code| {
                classificator.type_tags(code).is_some_and(|(key, value)| {
                    tokens
                        .iter()
                        .any(|t| t.eq_ignore_ascii_case(value) || t.eq_ignore_ascii_case(key))
                })
            });
            if tag_match {
                best = Some(TYPE_TAG_SCORE);
            }
        }

        best
    }

    fn to_result(
        &self,
        feature: &MapFeature,
        score: f64,
        origin: Coord<f64>,
        locale: &str,
    ) -> SearchResult {
        let center = feature.center();
        SearchResult {
            feature: feature.id().clone(),
            name: feature.name(locale).unwrap_or_default().to_string(),
            center,
            score,
            distance: utils::distance(origin, center),
            bearing: angle::direction(origin, center),
        }
    }
}

/// Score descending, then distance ascending, then feature id
fn compare_results(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.distance.total_cmp(&b.distance))
        .then_with(|| a.feature.cmp(&b.feature))
}

#[async_trait]
impl SearchBackend for IndexSearchBackend {
    async fn search(&self, request: SearchRequest) -> Result<Vec<SearchResult>, SearchError> {
        let backend = self.clone();
        tokio::task::spawn_blocking(move || backend.search_blocking(&request))
            .await
            .map_err(|e| SearchError::TaskFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{CURRENT_VERSION, FeatureRecord, MapDocument, write_map_file};
    use crate::{Classificator, IndexConfig};
    use geo::Rect;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Rect<f64> {
        Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 })
    }

    fn request(query: &str, viewport: Rect<f64>, mode: SearchMode) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            locale: "en".to_string(),
            viewport,
            mode,
            max_results: 50,
        }
    }

    /// One map with a cafe, a hotel, a "Cafe Central" and an unnamed cafe
    fn backend(dir: &TempDir) -> IndexSearchBackend {
        let mut named = FeatureRecord::point(2.0, 2.0, "Cafe Central", "tourism", "hotel");
        named.names = BTreeMap::from([
            ("en".to_string(), "Cafe Central".to_string()),
            ("de".to_string(), "Kaffeehaus Zentral".to_string()),
        ]);
        let mut unnamed = FeatureRecord::point(3.0, 3.0, "", "amenity", "cafe");
        unnamed.names.clear();
        let mut detailed = FeatureRecord::point(-2.0, -2.0, "cafe", "amenity", "cafe");
        detailed.min_scale = Some(16);

        let document = MapDocument {
            features: vec![
                FeatureRecord::point(1.0, 1.0, "cafe", "amenity", "cafe"),
                FeatureRecord::point(1.0, 0.0, "hotel", "tourism", "hotel"),
                named,
                unnamed,
                detailed,
            ],
        };
        let path = dir.path().join("Town.map");
        write_map_file(&path, CURRENT_VERSION, &document).unwrap();

        let classificator = Arc::new(Classificator::with_types([
            ("amenity", "cafe"),
            ("tourism", "hotel"),
        ]));
        let index = MultiSourceIndex::new(classificator, IndexConfig::default());
        index.add_map(&path).unwrap();
        IndexSearchBackend::new(Arc::new(index))
    }

    #[test]
    fn test_scoring_and_ranking() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        let results = backend.search_blocking(&request(
            "cafe",
            rect(-5.0, -5.0, 5.0, 5.0),
            SearchMode::Viewport,
        ));

        let scores: Vec<(u32, f64)> = results
            .iter()
            .map(|r| (r.feature.index, r.score))
            .collect();
        // Exact names by distance, then the prefix match, then the tag-only match
        assert_eq!(
            scores,
            vec![
                (0, EXACT_NAME_SCORE),
                (4, EXACT_NAME_SCORE),
                (2, NAME_PREFIX_SCORE),
                (3, TYPE_TAG_SCORE)
            ]
        );
        assert_eq!(results[3].name, "");
    }

    #[test]
    fn test_distance_and_bearing() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        let results = backend.search_blocking(&request(
            "hotel",
            rect(-1.0, -1.0, 1.0, 1.0),
            SearchMode::Viewport,
        ));

        assert_eq!(results[0].feature.index, 1);
        assert!((results[0].distance - 1.0).abs() < 1e-12);
        assert!(results[0].bearing.abs() < 1e-12);
    }

    #[test]
    fn test_viewport_restricts_and_everywhere_does_not() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        let far = rect(-100.0, -100.0, -90.0, -90.0);

        assert!(backend
            .search_blocking(&request("cafe", far, SearchMode::Viewport))
            .is_empty());
        assert_eq!(
            backend
                .search_blocking(&request("cafe", far, SearchMode::Everywhere))
                .len(),
            4
        );
    }

    #[test]
    fn test_everywhere_covers_every_loaded_map() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        let remote = dir.path().join("Remote.map");
        let empty = dir.path().join("Empty.map");
        let document = MapDocument {
            features: vec![FeatureRecord::point(170.0, 170.0, "cafe", "amenity", "cafe")],
        };
        write_map_file(&remote, CURRENT_VERSION, &document).unwrap();
        write_map_file(&empty, CURRENT_VERSION, &MapDocument::default()).unwrap();
        backend.index.add_map(&remote).unwrap();
        backend.index.add_map(&empty).unwrap();

        let results = backend.search_blocking(&request(
            "cafe",
            rect(-1.0, -1.0, 1.0, 1.0),
            SearchMode::Everywhere,
        ));
        assert_eq!(results.len(), 5);
        assert!(results.iter().any(|r| &*r.feature.map == "Remote.map"));
    }

    #[test]
    fn test_locale_name_and_limits() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        let viewport = rect(-5.0, -5.0, 5.0, 5.0);
        let mut german = request("kaffeehaus zentral", viewport, SearchMode::Viewport);
        german.locale = "de".to_string();
        let results = backend.search_blocking(&german);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Kaffeehaus Zentral");

        let mut limited = request("cafe", viewport, SearchMode::Viewport);
        limited.max_results = 1;
        assert_eq!(backend.search_blocking(&limited).len(), 1);

        assert!(backend
            .search_blocking(&request("   ", viewport, SearchMode::Viewport))
            .is_empty());
    }

    #[tokio::test]
    async fn test_async_search() {
        let dir = TempDir::new().unwrap();
        let backend: Arc<dyn SearchBackend> = Arc::new(backend(&dir));
        let results = backend
            .search(request("hotel", rect(-5.0, -5.0, 5.0, 5.0), SearchMode::Everywhere))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].score, EXACT_NAME_SCORE);
    }
}
