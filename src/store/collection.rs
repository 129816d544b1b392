//! Ordered collection holding at most one record per id.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::model::{merge_fields, Keyed};

/// Records in arrival order, unique by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection<T> {
    items: Vec<T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Keyed> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    /// Insert unless a record with the same id exists. Returns true if inserted.
    pub fn insert_if_absent(&mut self, item: T) -> bool {
        if self.contains(item.id()) {
            return false;
        }
        self.items.push(item);
        true
    }

    /// Remove by id. Returns true if something was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        match self.position(id) {
            Some(idx) => {
                self.items.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Replace everything. Duplicate ids collapse onto the first slot, later
    /// occurrences winning.
    pub fn replace_all(&mut self, items: Vec<T>) {
        self.items.clear();
        for item in items {
            match self.position(item.id()) {
                Some(idx) => self.items[idx] = item,
                None => self.items.push(item),
            }
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T> Collection<T>
where
    T: Keyed + Serialize + DeserializeOwned + PartialEq,
{
    /// Shallow-merge `fields` into the record with `id`.
    ///
    /// Returns false when the id is unknown or the merge changes nothing.
    pub fn merge(&mut self, id: &str, fields: &Map<String, Value>) -> Result<bool> {
        let Some(idx) = self.position(id) else {
            return Ok(false);
        };
        match merge_fields(&self.items[idx], fields)? {
            Some(merged) => {
                self.items[idx] = merged;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Insert or replace by id, reporting whether anything changed.
    pub fn upsert(&mut self, item: T) -> bool {
        match self.position(item.id()) {
            Some(idx) if self.items[idx] == item => false,
            Some(idx) => {
                self.items[idx] = item;
                true
            }
            None => {
                self.items.push(item);
                true
            }
        }
    }

    /// Upsert every record; never removes records missing from `items`.
    pub fn upsert_all(&mut self, items: Vec<T>) -> bool {
        let mut changed = false;
        for item in items {
            changed |= self.upsert(item);
        }
        changed
    }
}

impl<'a, T> IntoIterator for &'a Collection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
