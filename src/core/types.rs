//! Core types used across the crate

use super::filter::SearchFilter;
use super::payload::Payload;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Payload key holding the human-readable text of a point
pub const TEXT_FIELD: &str = "text";

/// Payload key preserving a caller's string id when the backend needs a UUID
pub const POINT_ID_FIELD: &str = "point_id";

/// Identifier of a point, unique within its collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    Num(u64),
    Text(String),
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointId::Num(n) => write!(f, "{}", n),
            PointId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<u64> for PointId {
    fn from(n: u64) -> Self {
        PointId::Num(n)
    }
}

impl From<&str> for PointId {
    fn from(s: &str) -> Self {
        PointId::Text(s.to_string())
    }
}

impl From<String> for PointId {
    fn from(s: String) -> Self {
        PointId::Text(s)
    }
}

impl From<uuid::Uuid> for PointId {
    fn from(id: uuid::Uuid) -> Self {
        PointId::Text(id.to_string())
    }
}

/// Similarity metric of a collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    #[default]
    Cosine,
    Euclid,
    Dot,
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distance::Cosine => write!(f, "cosine"),
            Distance::Euclid => write!(f, "euclid"),
            Distance::Dot => write!(f, "dot"),
        }
    }
}

impl std::str::FromStr for Distance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Distance::Cosine),
            "euclid" | "euclidean" => Ok(Distance::Euclid),
            "dot" => Ok(Distance::Dot),
            other => Err(format!("unknown distance metric: {}", other)),
        }
    }
}

/// Index type for a payload field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFieldType {
    Keyword,
    Integer,
    Float,
    Bool,
    Text,
    Geo,
}

/// Everything needed to create a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub name: String,
    pub dimension: u64,
    #[serde(default)]
    pub distance: Distance,
    /// Payload fields to index
    #[serde(default)]
    pub payload_schema: BTreeMap<String, PayloadFieldType>,
}

impl CollectionSpec {
    pub fn new(name: impl Into<String>, dimension: u64, distance: Distance) -> Self {
        CollectionSpec {
            name: name.into(),
            dimension,
            distance,
            payload_schema: BTreeMap::new(),
        }
    }

    /// Index a payload field
    pub fn with_index(mut self, field: impl Into<String>, kind: PayloadFieldType) -> Self {
        self.payload_schema.insert(field.into(), kind);
        self
    }
}

/// Status snapshot of a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub vector_size: u64,
    pub distance: Distance,
    pub points_count: u64,
    pub indexed_vectors_count: u64,
    pub status: String,
}

/// A vector plus its payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: PointId,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub payload: Payload,
}

/// A similarity search request against one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub vector: Vec<f32>,
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<SearchFilter>,
    #[serde(default = "default_true")]
    pub with_payload: bool,
    #[serde(default)]
    pub with_vectors: bool,
}

fn default_true() -> bool {
    true
}

impl SearchRequest {
    pub fn new(vector: Vec<f32>, limit: usize) -> Self {
        SearchRequest {
            vector,
            limit,
            filter: None,
            with_payload: true,
            with_vectors: false,
        }
    }

    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_vectors(mut self, with_vectors: bool) -> Self {
        self.with_vectors = with_vectors;
        self
    }

    pub fn with_payload(mut self, with_payload: bool) -> Self {
        self.with_payload = with_payload;
        self
    }
}

/// A search hit returned by a vector backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: PointId,
    pub score: f32,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

/// A ranked retrieval result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Collection or table the result came from
    pub source: String,
    /// Record id within the source
    pub id: String,
    /// Raw text
    pub text: String,
    /// Relevance score; only comparable across sources after normalization
    pub score: f32,
    /// Remaining payload fields
    #[serde(default)]
    pub metadata: Payload,
}

impl SearchResult {
    /// Build a result from a vector hit, lifting `text` out of the payload
    pub fn from_scored(source: &str, point: ScoredPoint) -> Self {
        let mut metadata = point.payload;
        let text = match metadata.remove(TEXT_FIELD) {
            Some(super::PayloadValue::String(s)) => s,
            Some(other) => other.to_json().to_string(),
            None => String::new(),
        };
        metadata.remove(POINT_ID_FIELD);

        SearchResult {
            source: source.to_string(),
            id: point.id.to_string(),
            text,
            score: point.score,
            metadata,
        }
    }
}

/// A text item ready to be embedded and indexed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Payload,
}

impl IndexItem {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        IndexItem {
            id: id.into(),
            text: text.into(),
            metadata: Payload::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Payload) -> Self {
        self.metadata = metadata;
        self
    }

    /// Payload stored alongside the vector: metadata plus the text itself
    pub fn to_payload(&self) -> Payload {
        let mut payload = self.metadata.clone();
        payload.insert(TEXT_FIELD.to_string(), self.text.clone().into());
        payload
    }
}
