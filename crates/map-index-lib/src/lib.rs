//! Map Index Library - Spatial Feature Retrieval and Interactive Search
//!
//! This library answers "which map features intersect this rectangle, at this level of
//! detail, across every loaded map file" and layers an interactive search protocol on top
//! that decides whether to keep results scoped to the visible viewport or widen the search
//! to the whole dataset.
//!
//! # Architecture
//!
//! - **[`angle`]**: Angle normalization, circular averaging and vector angles
//! - **[`scales`]**: Discrete level-of-detail selection from rectangle size
//! - **[`Classificator`]**: Explicitly constructed tag → type code dictionary
//! - **[`reader`]**: Runtime-selected byte readers and the map file loader contract
//! - **[`SourceIndex`]**: One loaded map file with its quadtree and query cache
//! - **[`MultiSourceIndex`]**: Load/unload map files and fan queries out across them
//! - **[`search`]**: Search backends and the viewport/everywhere mode controller
//!
//! # Performance Characteristics
//!
//! - **Load Time**: O(N log N) per map, parallelizable across maps
//! - **Query Time**: O(log D + K) per map where D=depth, K=results
//! - **Memory**: O(N) features + O(C) cached query results per map

pub mod angle;
mod classificator;
mod feature;
mod index;
mod quadtree;
pub mod reader;
pub mod scales;
pub mod search;
mod source;
pub mod utils;

// Public API exports
pub use classificator::{Classificator, TypeCode};
pub use feature::{FeatureId, FeatureKind, LocalizedName, MapFeature, ScaleRange};
pub use index::{IndexConfig, MapInfo, MultiSourceIndex};
pub use quadtree::QueryPolicy;
pub use reader::{JsonMapReader, LoadedMap, MapReader, ReaderStrategy};
pub use source::SourceIndex;

/// Error types for map loading and querying
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Map parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid map header: {0}")]
    InvalidHeader(String),

    #[error("Unsupported map format version {found} (supported 1..={supported})")]
    UnsupportedVersion { found: u16, supported: u16 },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Unknown type tag: {key}={value}")]
    UnknownType { key: String, value: String },

    #[error("Map not loaded: {0}")]
    NotLoaded(String),
}

pub type Result<T> = std::result::Result<T, MapError>;
