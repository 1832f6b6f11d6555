//! Qdrant-backed vector backend

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    self, value::Kind, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, FieldType,
    PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::VectorStoreConfig;
use crate::core::{
    CollectionInfo, CollectionSpec, Condition, Distance, MatchValue, PayloadFieldType, Payload,
    PayloadValue, Point, PointId, ScoredPoint, SearchFilter, SearchRequest, VectorBackend,
    POINT_ID_FIELD,
};
use crate::error::{Error, Result};

/// Vector backend talking to a Qdrant service over gRPC
pub struct QdrantBackend {
    client: Qdrant,
}

impl QdrantBackend {
    /// Build a client from configuration. Does not contact the service.
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(api_key) = &config.api_key {
            builder = builder.api_key(api_key.expose_secret().to_string());
        }

        let client = builder
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build Qdrant client: {}", e)))?;

        info!("Qdrant client configured for {}", config.url);
        Ok(Self { client })
    }

    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }
}

fn to_qdrant_distance(distance: Distance) -> qdrant::Distance {
    match distance {
        Distance::Cosine => qdrant::Distance::Cosine,
        Distance::Euclid => qdrant::Distance::Euclid,
        Distance::Dot => qdrant::Distance::Dot,
    }
}

fn from_qdrant_distance(distance: qdrant::Distance) -> Distance {
    match distance {
        qdrant::Distance::Euclid => Distance::Euclid,
        qdrant::Distance::Dot => Distance::Dot,
        _ => Distance::Cosine,
    }
}

fn to_field_type(kind: PayloadFieldType) -> FieldType {
    match kind {
        PayloadFieldType::Keyword => FieldType::Keyword,
        PayloadFieldType::Integer => FieldType::Integer,
        PayloadFieldType::Float => FieldType::Float,
        PayloadFieldType::Bool => FieldType::Bool,
        PayloadFieldType::Text => FieldType::Text,
        PayloadFieldType::Geo => FieldType::Geo,
    }
}

/// Qdrant ids are unsigned integers or UUIDs. Other strings map to a
/// deterministic UUIDv5 and the original is kept in the payload.
fn to_qdrant_id(id: &PointId) -> (qdrant::PointId, Option<String>) {
    match id {
        PointId::Num(n) => (qdrant::PointId::from(*n), None),
        PointId::Text(s) => match Uuid::parse_str(s) {
            Ok(uuid) => (qdrant::PointId::from(uuid.to_string()), None),
            Err(_) => {
                let derived = Uuid::new_v5(&Uuid::NAMESPACE_OID, s.as_bytes());
                (qdrant::PointId::from(derived.to_string()), Some(s.clone()))
            }
        },
    }
}

fn from_qdrant_id(id: Option<qdrant::PointId>, payload: &Payload) -> PointId {
    if let Some(PayloadValue::String(original)) = payload.get(POINT_ID_FIELD) {
        return PointId::Text(original.clone());
    }
    match id.and_then(|id| id.point_id_options) {
        Some(qdrant::point_id::PointIdOptions::Num(n)) => PointId::Num(n),
        Some(qdrant::point_id::PointIdOptions::Uuid(s)) => PointId::Text(s),
        None => PointId::Text(String::new()),
    }
}

fn to_qdrant_value(value: &PayloadValue) -> QdrantValue {
    match value {
        PayloadValue::Bool(b) => QdrantValue::from(*b),
        PayloadValue::Integer(i) => QdrantValue::from(*i),
        PayloadValue::Float(f) => QdrantValue::from(*f),
        PayloadValue::String(s) => QdrantValue::from(s.clone()),
        PayloadValue::List(items) => QdrantValue {
            kind: Some(Kind::ListValue(qdrant::ListValue {
                values: items.iter().map(to_qdrant_value).collect(),
            })),
        },
        PayloadValue::Map(map) => QdrantValue {
            kind: Some(Kind::StructValue(qdrant::Struct {
                fields: map
                    .iter()
                    .map(|(k, v)| (k.clone(), to_qdrant_value(v)))
                    .collect(),
            })),
        },
    }
}

fn from_qdrant_value(value: QdrantValue) -> Option<PayloadValue> {
    match value.kind? {
        Kind::NullValue(_) => None,
        Kind::BoolValue(b) => Some(PayloadValue::Bool(b)),
        Kind::IntegerValue(i) => Some(PayloadValue::Integer(i)),
        Kind::DoubleValue(f) => Some(PayloadValue::Float(f)),
        Kind::StringValue(s) => Some(PayloadValue::String(s)),
        Kind::ListValue(list) => Some(PayloadValue::List(
            list.values.into_iter().filter_map(from_qdrant_value).collect(),
        )),
        Kind::StructValue(s) => Some(PayloadValue::Map(
            s.fields
                .into_iter()
                .filter_map(|(k, v)| from_qdrant_value(v).map(|v| (k, v)))
                .collect(),
        )),
    }
}

fn to_qdrant_payload(payload: &Payload) -> HashMap<String, QdrantValue> {
    payload
        .iter()
        .map(|(k, v)| (k.clone(), to_qdrant_value(v)))
        .collect()
}

fn from_qdrant_payload(payload: HashMap<String, QdrantValue>) -> Payload {
    payload
        .into_iter()
        .filter_map(|(k, v)| from_qdrant_value(v).map(|v| (k, v)))
        .collect()
}

fn to_qdrant_condition(condition: &Condition) -> Result<qdrant::Condition> {
    match condition {
        Condition::Equals { field, value } => Ok(match value {
            MatchValue::Bool(b) => qdrant::Condition::matches(field.clone(), *b),
            MatchValue::Integer(i) => qdrant::Condition::matches(field.clone(), *i),
            MatchValue::Keyword(s) => qdrant::Condition::matches(field.clone(), s.clone()),
        }),
        Condition::AnyOf { field, values } => {
            let keywords: Vec<String> = values
                .iter()
                .filter_map(|v| match v {
                    MatchValue::Keyword(s) => Some(s.clone()),
                    _ => None,
                })
                .collect();
            let integers: Vec<i64> = values
                .iter()
                .filter_map(|v| match v {
                    MatchValue::Integer(i) => Some(*i),
                    _ => None,
                })
                .collect();

            if keywords.len() == values.len() {
                Ok(qdrant::Condition::matches(field.clone(), keywords))
            } else if integers.len() == values.len() {
                Ok(qdrant::Condition::matches(field.clone(), integers))
            } else {
                Err(Error::Validation(format!(
                    "any_of on '{}' needs values of one type (keywords or integers)",
                    field
                )))
            }
        }
        Condition::Range { field, bounds } => Ok(qdrant::Condition::range(
            field.clone(),
            qdrant::Range {
                gt: bounds.gt,
                gte: bounds.gte,
                lt: bounds.lt,
                lte: bounds.lte,
            },
        )),
    }
}

/// Translate a structured filter into Qdrant's filter syntax
pub fn to_qdrant_filter(filter: &SearchFilter) -> Result<qdrant::Filter> {
    Ok(qdrant::Filter {
        must: filter
            .must
            .iter()
            .map(to_qdrant_condition)
            .collect::<Result<Vec<_>>>()?,
        must_not: filter
            .must_not
            .iter()
            .map(to_qdrant_condition)
            .collect::<Result<Vec<_>>>()?,
        ..Default::default()
    })
}

#[allow(deprecated)]
fn extract_vector(vectors: Option<qdrant::VectorsOutput>) -> Option<Vec<f32>> {
    match vectors?.vectors_options? {
        qdrant::vectors_output::VectorsOptions::Vector(v) => Some(v.data),
        qdrant::vectors_output::VectorsOptions::Vectors(map) => {
            map.vectors.into_values().next().map(|v| v.data)
        }
    }
}

fn extract_params(config: Option<qdrant::CollectionConfig>) -> (u64, Distance) {
    let params = config
        .and_then(|c| c.params)
        .and_then(|p| p.vectors_config)
        .and_then(|vc| vc.config);

    match params {
        Some(qdrant::vectors_config::Config::Params(p)) => {
            (p.size, from_qdrant_distance(p.distance()))
        }
        Some(qdrant::vectors_config::Config::ParamsMap(map)) => map
            .map
            .values()
            .next()
            .map(|p| (p.size, from_qdrant_distance(p.distance())))
            .unwrap_or((0, Distance::Cosine)),
        None => (0, Distance::Cosine),
    }
}

#[async_trait]
impl VectorBackend for QdrantBackend {
    fn name(&self) -> &'static str {
        "qdrant"
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.client.collection_exists(name).await?)
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&spec.name).vectors_config(VectorParamsBuilder::new(
                    spec.dimension,
                    to_qdrant_distance(spec.distance),
                )),
            )
            .await?;

        for (field, kind) in &spec.payload_schema {
            let indexed = self
                .client
                .create_field_index(
                    CreateFieldIndexCollectionBuilder::new(&spec.name, field, to_field_type(*kind))
                        .wait(true),
                )
                .await;
            if let Err(e) = indexed {
                // a collection without its indexes would be skipped on the next run
                if let Err(cleanup) = self.client.delete_collection(&spec.name).await {
                    warn!(
                        "Could not remove half-created collection {}: {}",
                        spec.name, cleanup
                    );
                }
                return Err(e.into());
            }
            debug!("Indexed payload field {}.{} as {:?}", spec.name, field, kind);
        }

        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let response = self.client.list_collections().await?;
        Ok(response.collections.into_iter().map(|c| c.name).collect())
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        if !self.client.collection_exists(name).await? {
            return Ok(false);
        }
        let response = self.client.delete_collection(name).await?;
        Ok(response.result)
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        if !self.client.collection_exists(name).await? {
            return Ok(None);
        }

        let response = self.client.collection_info(name).await?;
        let Some(result) = response.result else {
            return Err(Error::Internal(format!("Collection info for {} missing result", name)));
        };

        let status = format!("{:?}", result.status()).to_lowercase();
        let (vector_size, distance) = extract_params(result.config);

        Ok(Some(CollectionInfo {
            name: name.to_string(),
            vector_size,
            distance,
            points_count: result.points_count.unwrap_or(0),
            indexed_vectors_count: result.indexed_vectors_count.unwrap_or(0),
            status,
        }))
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()> {
        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|point| {
                let (id, original) = to_qdrant_id(&point.id);
                let mut payload = to_qdrant_payload(&point.payload);
                if let Some(original) = original {
                    payload.insert(POINT_ID_FIELD.to_string(), QdrantValue::from(original));
                }
                PointStruct::new(id, point.vector, payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await?;
        Ok(())
    }

    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<ScoredPoint>> {
        let mut builder =
            SearchPointsBuilder::new(collection, request.vector.clone(), request.limit as u64)
                // the id mapping needs the payload even when the caller does not
                .with_payload(true)
                .with_vectors(request.with_vectors);

        if let Some(filter) = request.filter.as_ref().filter(|f| !f.is_empty()) {
            builder = builder.filter(to_qdrant_filter(filter)?);
        }

        let response = self.client.search_points(builder).await?;

        Ok(response
            .result
            .into_iter()
            .map(|point| {
                let payload = from_qdrant_payload(point.payload);
                let id = from_qdrant_id(point.id, &payload);
                ScoredPoint {
                    id,
                    score: point.score,
                    payload: if request.with_payload { payload } else { Payload::new() },
                    vector: extract_vector(point.vectors),
                }
            })
            .collect())
    }

    async fn health_check(&self) -> Result<()> {
        self.client.health_check().await?;
        Ok(())
    }
}
