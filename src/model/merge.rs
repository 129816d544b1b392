//! Shallow field merge for keyed records.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Partial update addressed to one record: `{"id": ..., <fields>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPatch {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl EntityPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Set one field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Reference to a record by id, the payload of delete events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
}

impl EntityRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Overlay `fields` onto `record` one level deep.
///
/// Returns `Ok(None)` when the merge changes nothing. The `id` key is never
/// overwritten. A patch that leaves the record undecodable is rejected and
/// the original stays untouched.
pub fn merge_fields<T>(record: &T, fields: &Map<String, Value>) -> Result<Option<T>>
where
    T: Serialize + DeserializeOwned + PartialEq,
{
    let Value::Object(mut object) = serde_json::to_value(record)? else {
        return Err(Error::Decode("record does not serialize to an object".to_string()));
    };

    for (key, value) in fields {
        if key == "id" {
            continue;
        }
        object.insert(key.clone(), value.clone());
    }

    let merged: T = serde_json::from_value(Value::Object(object))
        .map_err(|e| Error::Decode(format!("patch produced an invalid record: {}", e)))?;
    if merged == *record {
        return Ok(None);
    }
    Ok(Some(merged))
}
