//! In-process [`LocalStore`] backed by a `DashMap`

use super::traits::{Entity, LocalStore};
use super::types::{ListQuery, Page, SortDirection};
use crate::outcome::Outcome;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::cmp::Ordering;

/// Local tier that keeps entities in memory.
///
/// Queries are evaluated against each entity's JSON form: a filter matches
/// when the named field renders to the filter value, and sorting compares
/// field values (numbers numerically, everything else as text). Ties fall
/// back to id order so pages are stable.
#[derive(Debug)]
pub struct InMemoryLocalStore<T> {
    entities: DashMap<String, T>,
}

impl<T: Entity> InMemoryLocalStore<T> {
    pub fn new() -> Self {
        Self {
            entities: DashMap::new(),
        }
    }

    pub fn with_entities(entities: impl IntoIterator<Item = T>) -> Self {
        let store = Self::new();
        for entity in entities {
            store.entities.insert(entity.id(), entity);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn snapshot(&self) -> Vec<(String, T, Value)> {
        self.entities
            .iter()
            .map(|entry| {
                let json = serde_json::to_value(entry.value()).unwrap_or(Value::Null);
                (entry.key().clone(), entry.value().clone(), json)
            })
            .collect()
    }
}

impl<T: Entity> Default for InMemoryLocalStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => render(x).cmp(&render(y)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[async_trait]
impl<T: Entity> LocalStore<T> for InMemoryLocalStore<T> {
    async fn get(&self, id: &str) -> Outcome<Option<T>> {
        Ok(self.entities.get(id).map(|entry| entry.value().clone()))
    }

    async fn put(&self, entity: T) -> Outcome<()> {
        self.entities.insert(entity.id(), entity);
        Ok(())
    }

    async fn put_many(&self, entities: Vec<T>) -> Outcome<()> {
        for entity in entities {
            self.entities.insert(entity.id(), entity);
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Outcome<bool> {
        Ok(self.entities.remove(id).is_some())
    }

    async fn query(&self, query: &ListQuery) -> Outcome<Page<T>> {
        let mut matching: Vec<(String, T, Value)> = self
            .snapshot()
            .into_iter()
            .filter(|(_, _, json)| {
                query
                    .filters
                    .iter()
                    .all(|(field, expected)| json.get(field).map(render).as_deref() == Some(expected))
            })
            .collect();

        matching.sort_by(|(id_a, _, json_a), (id_b, _, json_b)| {
            let by_field = query.sort.as_ref().map_or(Ordering::Equal, |sort| {
                let ordering = compare_values(json_a.get(&sort.field), json_b.get(&sort.field));
                match sort.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            });
            by_field.then_with(|| id_a.cmp(id_b))
        });

        let total_items = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(query.offset())
            .take(query.page_size as usize)
            .map(|(_, entity, _)| entity)
            .collect();

        Ok(Page::new(items, query.page, query.page_size, total_items))
    }

    async fn all(&self) -> Outcome<Vec<T>> {
        let mut entities: Vec<(String, T)> = self
            .entities
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        entities.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entities.into_iter().map(|(_, entity)| entity).collect())
    }
}
