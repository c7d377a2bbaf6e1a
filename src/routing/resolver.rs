use crate::context::ShardContext;
use crate::core::{FabricError, FabricOptions, Result, Role};
use regex::Regex;

/// Separator between connection name segments
pub const SEPARATOR: &str = "_";

/// Builds connection configuration names from routing coordinates
///
/// Names follow `{prefix}_{group}_{shard}_{environment}_{role}`, leaving out
/// every segment the topology does not use:
///
/// | topology | example |
/// |---|---|
/// | plain | `production` |
/// | replicated | `production_slave` |
/// | sharded | `city_austin_production` |
/// | both, with prefix | `fiveruns_city_dallas_production_master` |
///
/// The shard value and role are read at every call; nothing is cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionNameResolver {
    prefix: Option<String>,
    shard_group: Option<String>,
    environment: String,
    replicated: bool,
}

impl ConnectionNameResolver {
    pub fn new(options: &FabricOptions, environment: &str) -> Self {
        Self {
            prefix: options.prefix.clone(),
            shard_group: options.shard_by.clone(),
            environment: environment.to_string(),
            replicated: options.replicated,
        }
    }

    pub fn shard_group(&self) -> Option<&str> {
        self.shard_group.as_deref()
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn is_replicated(&self) -> bool {
        self.replicated
    }

    /// Resolve the connection name for the active shard and `role`
    ///
    /// Fails with [`FabricError::NotActive`] when the model is sharded and
    /// its group has no active shard.
    pub fn resolve(&self, shards: &ShardContext, role: Role) -> Result<String> {
        let mut clauses: Vec<&str> = Vec::with_capacity(5);

        if let Some(prefix) = &self.prefix {
            clauses.push(prefix);
        }
        if let Some(group) = &self.shard_group {
            clauses.push(group);
            clauses.push(shards.active(group)?);
        }
        clauses.push(&self.environment);
        if self.replicated {
            clauses.push(role.as_str());
        }

        Ok(clauses
            .into_iter()
            .filter(|clause| !clause.is_empty())
            .collect::<Vec<_>>()
            .join(SEPARATOR))
    }

    /// Pattern matching this topology's configuration names, capturing the shard
    ///
    /// Replicated topologies only match their `_master` entries, so each
    /// shard is listed once.
    pub fn shard_pattern(&self) -> Result<Regex> {
        let group = self.shard_group.as_deref().ok_or_else(|| {
            FabricError::Unsupported("shard discovery on a model without shard_by".into())
        })?;

        let mut clauses = Vec::with_capacity(5);
        if let Some(prefix) = &self.prefix {
            clauses.push(regex::escape(prefix));
        }
        clauses.push(regex::escape(group));
        clauses.push("([^_]+)".to_string());
        clauses.push(regex::escape(&self.environment));
        if self.replicated {
            clauses.push(Role::Master.as_str().to_string());
        }

        let pattern = format!("^{}$", clauses.join(SEPARATOR));
        Regex::new(&pattern).map_err(|e| FabricError::InvalidOptions(e.to_string()))
    }

    /// Shard values for which a configuration exists among `names`, sorted
    pub fn shard_names<I, S>(&self, names: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pattern = self.shard_pattern()?;
        let mut shards: Vec<String> = names
            .into_iter()
            .filter_map(|name| {
                pattern
                    .captures(name.as_ref())
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string())
            })
            .collect();
        shards.sort();
        shards.dedup();
        Ok(shards)
    }
}
