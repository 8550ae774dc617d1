//! Repository contract and the collaborators it is built from

use super::types::{ListQuery, Page, RemoteResponse, RequestDescriptor};
use crate::error::{Failure, FailureKind};
use crate::outcome::Outcome;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// A record addressable by a string identifier
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    fn id(&self) -> String;

    /// Stable name used in cache keys and logs
    fn entity_type() -> &'static str;

    /// Server-assigned version, when the remote tracks one.
    ///
    /// Used to detect that the server copy changed after a mutation was queued.
    fn revision(&self) -> Option<u64> {
        None
    }

    /// This entity under another id, used when the server assigns one on create.
    ///
    /// The default rewrites a top-level `"id"` field of the serialized form.
    /// Entities keyed by a differently named field override it.
    fn with_id(&self, id: &str) -> Outcome<Self> {
        let mut value = serde_json::to_value(self).map_err(|e| {
            Failure::unexpected(format!("Failed to encode entity: {e}")).with_code("ENCODE")
        })?;
        match value.as_object_mut() {
            Some(fields) if fields.contains_key("id") => {
                fields.insert("id".to_string(), serde_json::Value::String(id.to_string()));
            }
            _ => {
                return Err(Failure::unexpected(format!(
                    "{} has no top-level id field to rewrite",
                    Self::entity_type()
                ))
                .with_code("REKEY"))
            }
        }
        serde_json::from_value(value).map_err(|e| decode_failure("entity", e))
    }
}

/// Generic remote call; implementations map transport errors into [`Failure`]
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn invoke(&self, request: RequestDescriptor) -> Outcome<RemoteResponse>;
}

/// Persistent local tier keyed by entity id
#[async_trait]
pub trait LocalStore<T: Entity>: Send + Sync {
    async fn get(&self, id: &str) -> Outcome<Option<T>>;

    async fn put(&self, entity: T) -> Outcome<()>;

    async fn put_many(&self, entities: Vec<T>) -> Outcome<()>;

    /// Returns whether the id was present
    async fn delete(&self, id: &str) -> Outcome<bool>;

    /// Filter, sort and slice local entities as the remote would
    async fn query(&self, query: &ListQuery) -> Outcome<Page<T>>;

    async fn all(&self) -> Outcome<Vec<T>>;
}

/// Converts between wire payloads and entities
pub trait WireCodec<T>: Send + Sync {
    fn from_wire(&self, response: &RemoteResponse) -> Outcome<T>;

    fn from_wire_page(&self, response: &RemoteResponse, query: &ListQuery) -> Outcome<Page<T>>;

    fn to_wire(&self, entity: &T) -> Outcome<serde_json::Value>;
}

/// `serde_json` codec.
///
/// Single entities are the response body itself. Pages are either a bare
/// array or an envelope `{ "<items_field>": [...], "<total_field>": n }`.
#[derive(Debug, Clone)]
pub struct JsonCodec<T> {
    items_field: String,
    total_field: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self::with_envelope("items", "total")
    }

    pub fn with_envelope(items_field: impl Into<String>, total_field: impl Into<String>) -> Self {
        Self {
            items_field: items_field.into(),
            total_field: total_field.into(),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_failure(what: &str, error: impl std::fmt::Display) -> Failure {
    Failure::unexpected(format!("Failed to decode {what}: {error}")).with_code("DECODE")
}

impl<T> WireCodec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn from_wire(&self, response: &RemoteResponse) -> Outcome<T> {
        T::deserialize(&response.body).map_err(|e| decode_failure("entity", e))
    }

    fn from_wire_page(&self, response: &RemoteResponse, query: &ListQuery) -> Outcome<Page<T>> {
        let (items_value, total) = match &response.body {
            serde_json::Value::Array(_) => (&response.body, None),
            serde_json::Value::Object(map) => {
                let items = map.get(&self.items_field).ok_or_else(|| {
                    decode_failure("page", format!("missing '{}' field", self.items_field))
                })?;
                (items, map.get(&self.total_field).and_then(|v| v.as_u64()))
            }
            other => return Err(decode_failure("page", format!("unexpected body {other}"))),
        };

        let items = Vec::<T>::deserialize(items_value).map_err(|e| decode_failure("page", e))?;
        let total_items = total.unwrap_or_else(|| (query.offset() + items.len()) as u64);

        Ok(Page::new(items, query.page, query.page_size, total_items))
    }

    fn to_wire(&self, entity: &T) -> Outcome<serde_json::Value> {
        serde_json::to_value(entity).map_err(|e| {
            Failure::unexpected(format!("Failed to encode entity: {e}")).with_code("ENCODE")
        })
    }
}

/// Uniform data access for one entity type
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    async fn get_by_id(&self, id: &str) -> Outcome<T>;

    async fn get_all(&self, query: &ListQuery) -> Outcome<Page<T>>;

    async fn create(&self, entity: T) -> Outcome<T>;

    async fn update(&self, entity: T) -> Outcome<T>;

    async fn delete(&self, id: &str) -> Outcome<()>;

    async fn create_many(&self, entities: Vec<T>) -> Outcome<Vec<T>>;

    async fn delete_many(&self, ids: &[String]) -> Outcome<()>;

    /// Live sequence of full snapshots; the current snapshot is yielded first
    fn watch_all(&self) -> BoxStream<'static, Vec<T>>;

    async fn exists(&self, id: &str) -> Outcome<bool> {
        match self.get_by_id(id).await {
            Ok(_) => Ok(true),
            Err(failure) if failure.is(FailureKind::NotFound) => Ok(false),
            Err(failure) => Err(failure),
        }
    }

    async fn count(&self, query: &ListQuery) -> Outcome<u64> {
        let probe = ListQuery {
            page: 1,
            page_size: 1,
            ..query.clone()
        };
        Ok(self.get_all(&probe).await?.total_items)
    }

    async fn find_first(&self, query: &ListQuery) -> Outcome<Option<T>> {
        let probe = ListQuery {
            page: 1,
            page_size: 1,
            ..query.clone()
        };
        Ok(self.get_all(&probe).await?.items.into_iter().next())
    }
}
