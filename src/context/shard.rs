use crate::core::{FabricError, Result};
use std::collections::HashMap;

/// Active shard per shard group for one unit of work
///
/// An absent group means no shard is active for it; an empty string is a
/// value like any other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardContext {
    shards: HashMap<String, String>,
}

impl ShardContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a context from the process-wide defaults for new units of work
    pub fn from_defaults(defaults: &HashMap<String, String>) -> Self {
        Self {
            shards: defaults.clone(),
        }
    }

    /// Merge `shards` into the active mapping until they are deactivated
    pub fn activate<I, K, V>(&mut self, shards: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: ToString,
    {
        for (group, value) in shards {
            self.shards.insert(group.as_ref().to_string(), value.to_string());
        }
    }

    /// Run `f` with `shards` overlaid, then restore the exact prior mapping
    ///
    /// ```
    /// use shardfabric::ShardContext;
    ///
    /// let mut shards = ShardContext::new();
    /// shards.with_shards([("city", "austin")], |outer| {
    ///     outer.with_shards([("city", "dallas")], |inner| {
    ///         assert_eq!(inner.active("city").unwrap(), "dallas");
    ///     });
    ///     assert_eq!(outer.active("city").unwrap(), "austin");
    /// });
    /// assert!(shards.active("city").is_err());
    /// ```
    pub fn with_shards<I, K, V, F, T>(&mut self, shards: I, f: F) -> T
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: ToString,
        F: FnOnce(&mut Self) -> T,
    {
        let saved = self.shards.clone();
        self.activate(shards);
        let out = f(&mut *self);
        self.shards = saved;
        out
    }

    /// Remove `groups` from the active mapping, whatever their values
    pub fn deactivate<I, K>(&mut self, groups: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        for group in groups {
            self.shards.remove(group.as_ref());
        }
    }

    /// Active shard for `group`
    pub fn active(&self, group: &str) -> Result<&str> {
        self.shards
            .get(group)
            .map(String::as_str)
            .ok_or_else(|| FabricError::NotActive {
                group: group.to_string(),
            })
    }

    /// True for an unsharded model (`None`) or a group with an active shard
    pub fn is_active(&self, group: Option<&str>) -> bool {
        match group {
            None => true,
            Some(group) => self.shards.contains_key(group),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.shards.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub(crate) fn replace(&mut self, shards: ShardContext) {
        *self = shards;
    }
}
