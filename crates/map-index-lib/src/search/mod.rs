//! Interactive search
//!
//! A search session starts scoped to the visible viewport. When the viewport yields nothing
//! good enough, [`SearchModeController`] widens the session to the whole dataset and tells
//! the caller through a dedicated [`SearchEvent::ModeChanged`] event before delivering any
//! results. The actual matching is delegated to a [`SearchBackend`].

mod backend;
mod controller;

pub use backend::{IndexSearchBackend, SearchBackend};
pub use controller::{SearchHandle, SearchModeController};

use crate::{FeatureId, MapError};
use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where a search looks for matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMode {
    /// Only features intersecting the viewport
    Viewport,
    /// Every loaded feature
    Everywhere,
}

/// What the caller asks a session to find
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query: String,
    pub locale: String,
    pub viewport: Rect<f64>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, locale: impl Into<String>, viewport: Rect<f64>) -> Self {
        Self {
            query: query.into(),
            locale: locale.into(),
            viewport,
        }
    }
}

/// One round-trip to a backend
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub locale: String,
    /// Always set; ranking is relative to its centre even in [`SearchMode::Everywhere`]
    pub viewport: Rect<f64>,
    pub mode: SearchMode,
    pub max_results: usize,
}

/// A ranked match
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub feature: FeatureId,
    pub name: String,
    pub center: Coord<f64>,
    /// Relevance in (0, 1]
    pub score: f64,
    /// Distance from the viewport centre, in projected units
    pub distance: f64,
    /// Direction from the viewport centre, radians in (-π, π]
    pub bearing: f64,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    #[error("Search backend error: {0}")]
    Backend(String),

    #[error("Index error: {0}")]
    Index(Arc<MapError>),

    #[error("Search task failed: {0}")]
    TaskFailed(String),
}

impl From<MapError> for SearchError {
    fn from(err: MapError) -> Self {
        SearchError::Index(Arc::new(err))
    }
}

// Compared by message; the wrapped IO errors are not comparable
impl PartialEq for SearchError {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

/// Tuning of the viewport quality gate and result delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Viewport results reaching `min_relevance` needed to stay in viewport mode
    pub min_viewport_results: usize,
    /// Score a viewport result needs to count towards `min_viewport_results`
    pub min_relevance: f64,
    /// Widen to everywhere when the viewport results are insufficient
    pub everywhere_fallback: bool,
    /// Results per [`SearchEvent::Results`] event
    pub batch_size: usize,
    /// Upper bound on results requested from the backend
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_viewport_results: 1,
            min_relevance: 0.0,
            everywhere_fallback: true,
            batch_size: 16,
            max_results: 50,
        }
    }
}

impl SearchConfig {
    /// Whether viewport results are good enough to finish without widening
    pub fn viewport_sufficient(&self, results: &[SearchResult]) -> bool {
        let relevant = results
            .iter()
            .filter(|r| r.score >= self.min_relevance)
            .count();
        relevant > 0 && relevant >= self.min_viewport_results
    }
}

/// Observable lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Started,
    ViewportOnly,
    Everywhere,
    Finished,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Finished | SessionState::Cancelled | SessionState::Failed
        )
    }
}

/// Session notification, delivered in order
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    Started,
    ModeChanged {
        from: SearchMode,
        to: SearchMode,
    },
    Results {
        batch: Vec<SearchResult>,
        /// Results delivered so far, this batch included
        delivered: usize,
    },
    Finished {
        mode: SearchMode,
        total: usize,
    },
    Cancelled,
    Failed(SearchError),
}

impl SearchEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SearchEvent::Finished { .. } | SearchEvent::Cancelled | SearchEvent::Failed(_)
        )
    }
}
