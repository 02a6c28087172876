//! Registry of story variables mirrored into session state.

use std::collections::BTreeMap;

use crate::value::Value;

/// Observed variable names and their last fetched values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableRegistry {
    entries: BTreeMap<String, Value>,
}

impl VariableRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start observing `name`. Returns `false` if it was already observed,
    /// in which case its value is left alone.
    pub fn register(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return false;
        }
        self.entries.insert(name, Value::Null);
        true
    }

    /// Stop observing `name`. Returns `false` if it was not observed.
    pub fn deregister(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// Whether `name` is observed.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Observed names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// The current snapshot.
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.entries
    }

    /// Number of observed variables.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is observed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Re-fetch every observed variable and swap in the new snapshot whole.
    pub fn refresh<F>(&mut self, mut fetch: F)
    where
        F: FnMut(&str) -> Value,
    {
        let snapshot = self
            .entries
            .keys()
            .map(|name| (name.clone(), fetch(name)))
            .collect();
        self.entries = snapshot;
    }
}
