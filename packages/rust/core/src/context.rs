//! Context Store: the keyed state shared by every stage of one pipeline run.
//!
//! Keys are namespaced by the stage that owns them (`<stage>.<field>`).
//! A key is written once; afterwards it can only be read, appended to (when
//! it holds an array), or explicitly overwritten. Stages never mutate the
//! store directly: they return a [`ContextUpdate`] that the composer applies
//! atomically.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use assetguard_shared::{AssetGuardError, Result};

/// Serialize a value for storage in the context.
pub fn to_value<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| AssetGuardError::parse(format!("cannot store '{key}': {e}")))
}

// ---------------------------------------------------------------------------
// Writes and updates
// ---------------------------------------------------------------------------

/// One pending write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Write {
    /// First write of a key; conflicts if the key exists.
    Set { key: String, value: Value },
    /// Explicit replacement.
    Overwrite { key: String, value: Value },
    /// Push onto the array under `key`, creating it if needed.
    Append { key: String, value: Value },
}

impl Write {
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. } | Self::Overwrite { key, .. } | Self::Append { key, .. } => key,
        }
    }
}

/// The partial update a stage hands back, applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextUpdate {
    writes: Vec<Write>,
}

impl ContextUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Serialize + ?Sized>(&mut self, key: impl Into<String>, value: &T) -> Result<&mut Self> {
        let key = key.into();
        let value = to_value(&key, value)?;
        self.writes.push(Write::Set { key, value });
        Ok(self)
    }

    pub fn overwrite<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<&mut Self> {
        let key = key.into();
        let value = to_value(&key, value)?;
        self.writes.push(Write::Overwrite { key, value });
        Ok(self)
    }

    pub fn append<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<&mut Self> {
        let key = key.into();
        let value = to_value(&key, value)?;
        self.writes.push(Write::Append { key, value });
        Ok(self)
    }

    /// Append all of `other`'s writes after this update's writes.
    pub fn extend(&mut self, other: ContextUpdate) {
        self.writes.extend(other.writes);
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Distinct keys touched, in first-write order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for write in &self.writes {
            if !keys.contains(&write.key()) {
                keys.push(write.key());
            }
        }
        keys
    }

    /// Combine the updates of parallel branches.
    ///
    /// Branches must touch disjoint keys; the first overlap (in branch order)
    /// is a [`AssetGuardError::MergeConflict`]. Writes keep branch order.
    pub fn merge(partials: Vec<(String, ContextUpdate)>) -> Result<ContextUpdate> {
        let mut owners: BTreeMap<String, String> = BTreeMap::new();
        for (branch, update) in &partials {
            for key in update.keys() {
                if let Some(first) = owners.get(key) {
                    return Err(AssetGuardError::MergeConflict {
                        key: key.to_string(),
                        first: first.clone(),
                        second: branch.clone(),
                    });
                }
                owners.insert(key.to_string(), branch.clone());
            }
        }

        let mut merged = ContextUpdate::new();
        for (_, update) in partials {
            merged.extend(update);
        }
        Ok(merged)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Keyed JSON state for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextStore {
    values: BTreeMap<String, Value>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `key` for the first time.
    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        if self.values.contains_key(key) {
            return Err(AssetGuardError::KeyConflict { key: key.into() });
        }
        let value = to_value(key, value)?;
        self.values.insert(key.into(), value);
        Ok(())
    }

    /// Replace whatever `key` holds.
    pub fn overwrite<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        let value = to_value(key, value)?;
        self.values.insert(key.into(), value);
        Ok(())
    }

    /// Push onto the array under `key`, creating it when absent.
    pub fn append<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        let value = to_value(key, value)?;
        if let Some(array) = append_into(self.values.get_mut(key), key, value)? {
            self.values.insert(key.into(), array);
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<&Value> {
        self.values
            .get(key)
            .ok_or_else(|| AssetGuardError::MissingKey { key: key.into() })
    }

    /// Read `key` as `T`. A shape mismatch is a parse error, never coerced.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self.get(key)?;
        T::deserialize(value).map_err(|e| {
            AssetGuardError::parse(format!("context key '{key}' has unexpected shape: {e}"))
        })
    }

    /// Like [`get_as`](Self::get_as) but `None` when the key is absent.
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        if self.contains(key) {
            self.get_as(key).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Apply every write of `update`, or none of them.
    ///
    /// Writes are staged against copies of only the keys they touch, then
    /// committed together once all of them succeeded.
    pub fn apply(&mut self, update: ContextUpdate) -> Result<()> {
        let mut staged: BTreeMap<String, Value> = BTreeMap::new();

        for write in update.writes {
            match write {
                Write::Set { key, value } => {
                    if staged.contains_key(&key) || self.values.contains_key(&key) {
                        return Err(AssetGuardError::KeyConflict { key });
                    }
                    staged.insert(key, value);
                }
                Write::Overwrite { key, value } => {
                    staged.insert(key, value);
                }
                Write::Append { key, value } => {
                    if !staged.contains_key(&key) {
                        if let Some(existing) = self.values.get(&key) {
                            staged.insert(key.clone(), existing.clone());
                        }
                    }
                    if let Some(array) = append_into(staged.get_mut(&key), &key, value)? {
                        staged.insert(key, array);
                    }
                }
            }
        }

        self.values.extend(staged);
        Ok(())
    }

    /// Apply the updates of parallel branches after checking they are disjoint.
    pub fn merge(&mut self, partials: Vec<(String, ContextUpdate)>) -> Result<()> {
        let merged = ContextUpdate::merge(partials)?;
        self.apply(merged)
    }
}

/// Push `value` onto `slot`. Returns a fresh array when `slot` is empty.
fn append_into(slot: Option<&mut Value>, key: &str, value: Value) -> Result<Option<Value>> {
    match slot {
        None => Ok(Some(Value::Array(vec![value]))),
        Some(Value::Array(items)) => {
            items.push(value);
            Ok(None)
        }
        Some(_) => Err(AssetGuardError::validation(format!(
            "cannot append to context key '{key}': it does not hold an array"
        ))),
    }
}
