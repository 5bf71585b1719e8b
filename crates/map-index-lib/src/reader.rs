//! Map file reading
//!
//! Byte access goes through [`ReadAt`], whose implementation is picked at load time by
//! [`ReaderStrategy`]: the whole file buffered in memory, or positioned reads on an open
//! file handle. [`MapReader`] is the loader contract the index depends on; [`JsonMapReader`]
//! is the reference loader for the versioned container below.
//!
//! # File layout
//!
//! ```text
//! offset 0  : b"MAPIDX"        magic
//! offset 6  : u16 little-endian format version
//! offset 8..: JSON MapDocument
//! ```
//!
//! Version 1 documents carry no visibility scales; every feature is visible at all scales.

use crate::{
    Classificator, FeatureId, FeatureKind, LocalizedName, MapError, MapFeature, Result,
    ScaleRange,
};
use geo::Coord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Magic bytes at the start of every map file
pub const MAGIC: &[u8; 6] = b"MAPIDX";

/// Newest format version this reader understands
pub const CURRENT_VERSION: u16 = 2;

const HEADER_LEN: u64 = MAGIC.len() as u64 + 2;

/// How map file bytes are accessed while loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReaderStrategy {
    /// Read the whole file into memory up front
    #[default]
    Buffered,
    /// Keep the file open and read ranges on demand
    FileBacked,
}

/// Random access to a byte source
pub trait ReadAt: Send + Sync {
    /// Total size in bytes
    fn len(&self) -> u64;

    /// Read exactly `len` bytes starting at `offset`
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory byte source
#[derive(Debug, Clone)]
pub struct BufferReader {
    data: Arc<[u8]>,
}

impl BufferReader {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(std::fs::read(path)?))
    }
}

impl ReadAt for BufferReader {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let start = usize::try_from(offset).map_err(|_| out_of_range(offset, len))?;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| out_of_range(offset, len))?;
        Ok(self.data[start..end].to_vec())
    }
}

/// File-backed byte source doing positioned reads
#[derive(Debug)]
pub struct FileReader {
    file: Mutex<File>,
    len: u64,
}

impl FileReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            len,
        })
    }
}

impl ReadAt for FileReader {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        if offset.saturating_add(len as u64) > self.len {
            return Err(out_of_range(offset, len));
        }
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

fn out_of_range(offset: u64, len: usize) -> MapError {
    MapError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("read of {len} bytes at offset {offset} is out of range"),
    ))
}

/// Open a byte source for `path` with the requested strategy
pub fn open_reader(path: &Path, strategy: ReaderStrategy) -> Result<Box<dyn ReadAt>> {
    Ok(match strategy {
        ReaderStrategy::Buffered => Box::new(BufferReader::from_file(path)?),
        ReaderStrategy::FileBacked => Box::new(FileReader::open(path)?),
    })
}

/// A parsed map ready to be indexed
#[derive(Debug, Clone)]
pub struct LoadedMap {
    /// File name the map is registered under
    pub name: Arc<str>,
    /// Format version of the file
    pub version: u16,
    /// All features, with ids bound to `name`
    pub features: Vec<MapFeature>,
}

/// Loader contract consumed by the index
pub trait MapReader: Send + Sync {
    /// Parse the map at `path`, classifying its tags with `classificator`
    fn load(&self, path: &Path, classificator: &Classificator) -> Result<LoadedMap>;
}

/// On-disk JSON body of a map file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapDocument {
    pub features: Vec<FeatureRecord>,
}

/// One serialized feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub kind: RecordKind,
    /// Names keyed by language (`""` for the default name)
    #[serde(default)]
    pub names: BTreeMap<String, String>,
    /// Raw `[key, value]` tag pairs
    #[serde(default)]
    pub tags: Vec<(String, String)>,
    /// Vertices as `[x, y]` in projected coordinates
    pub geometry: Vec<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_scale: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_scale: Option<u8>,
}

impl FeatureRecord {
    /// A point record with a single default-language name and tag
    pub fn point(x: f64, y: f64, name: &str, key: &str, value: &str) -> Self {
        Self {
            kind: RecordKind::Point,
            names: BTreeMap::from([(String::new(), name.to_string())]),
            tags: vec![(key.to_string(), value.to_string())],
            geometry: vec![[x, y]],
            min_scale: None,
            max_scale: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Point,
    Line,
    Area,
}

impl From<RecordKind> for FeatureKind {
    fn from(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Point => FeatureKind::Point,
            RecordKind::Line => FeatureKind::Line,
            RecordKind::Area => FeatureKind::Area,
        }
    }
}

/// Serialize a document into the map file container
pub fn encode_map(version: u16, document: &MapDocument) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(HEADER_LEN as usize);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&version.to_le_bytes());
    serde_json::to_writer(&mut bytes, document)?;
    Ok(bytes)
}

/// Write a document as a map file at `path`
pub fn write_map_file(path: &Path, version: u16, document: &MapDocument) -> Result<()> {
    std::fs::write(path, encode_map(version, document)?)?;
    Ok(())
}

/// Reference loader for the `MAPIDX` container
#[derive(Debug, Clone, Default)]
pub struct JsonMapReader {
    strategy: ReaderStrategy,
    strict_types: bool,
}

impl JsonMapReader {
    pub fn new(strategy: ReaderStrategy) -> Self {
        Self {
            strategy,
            strict_types: false,
        }
    }

    /// Fail the load on tags missing from the classificator instead of dropping them
    pub fn strict_types(mut self, strict: bool) -> Self {
        self.strict_types = strict;
        self
    }

    pub fn strategy(&self) -> ReaderStrategy {
        self.strategy
    }

    fn read_header(source: &dyn ReadAt) -> Result<u16> {
        if source.len() < HEADER_LEN {
            return Err(MapError::InvalidHeader(format!(
                "file is {} bytes, header needs {HEADER_LEN}",
                source.len()
            )));
        }
        let header = source.read_at(0, HEADER_LEN as usize)?;
        if &header[..MAGIC.len()] != MAGIC {
            return Err(MapError::InvalidHeader("bad magic bytes".to_string()));
        }
        let version = u16::from_le_bytes([header[MAGIC.len()], header[MAGIC.len() + 1]]);
        if version == 0 || version > CURRENT_VERSION {
            return Err(MapError::UnsupportedVersion {
                found: version,
                supported: CURRENT_VERSION,
            });
        }
        Ok(version)
    }

    fn build_feature(
        &self,
        map: &Arc<str>,
        index: u32,
        version: u16,
        record: FeatureRecord,
        classificator: &Classificator,
    ) -> Result<MapFeature> {
        let mut types = Vec::with_capacity(record.tags.len());
        for (key, value) in record.tags {
            match classificator.type_code(&key, &value) {
                Some(code) => types.push(code),
                None if self.strict_types => return Err(MapError::UnknownType { key, value }),
                None => tracing::warn!("{map}#{index}: dropping unknown type {key}={value}"),
            }
        }

        let scales = if version >= 2 {
            ScaleRange::new(
                record.min_scale.unwrap_or(0),
                record.max_scale.unwrap_or(crate::scales::UPPER_SCALE),
            )
        } else {
            ScaleRange::all()
        };

        MapFeature::new(
            FeatureId {
                map: map.clone(),
                index,
            },
            record.kind.into(),
            record
                .names
                .into_iter()
                .map(|(lang, name)| LocalizedName { lang, name })
                .collect(),
            types,
            record
                .geometry
                .into_iter()
                .map(|[x, y]| Coord { x, y })
                .collect(),
            scales,
        )
    }
}

impl MapReader for JsonMapReader {
    fn load(&self, path: &Path, classificator: &Classificator) -> Result<LoadedMap> {
        #[cfg(feature = "profiling")]
        profiling::scope!("reader::load");

        let name: Arc<str> = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(Arc::from)
            .ok_or_else(|| {
                MapError::InvalidHeader(format!("{} has no file name", path.display()))
            })?;

        let source = open_reader(path, self.strategy)?;
        let version = Self::read_header(source.as_ref())?;
        let body_len = usize::try_from(source.len() - HEADER_LEN)
            .map_err(|_| MapError::InvalidHeader("map body too large".to_string()))?;
        let body = source.read_at(HEADER_LEN, body_len)?;
        let document: MapDocument = serde_json::from_slice(&body)?;

        let features = document
            .features
            .into_iter()
            .enumerate()
            .map(|(i, record)| self.build_feature(&name, i as u32, version, record, classificator))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            "Parsed {} (v{version}, {} features, {:?})",
            name,
            features.len(),
            self.strategy
        );

        Ok(LoadedMap {
            name,
            version,
            features,
        })
    }
}
