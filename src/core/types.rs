use super::{FabricError, Result};
use std::fmt;
use std::str::FromStr;

/// Replication role of a physical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    /// Read-write, authoritative
    Master,
    /// Read-only replica, possibly stale
    #[default]
    Slave,
}

impl Role {
    /// Literal used as the trailing segment of a connection name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Slave => "slave",
        }
    }

    pub fn is_master(&self) -> bool {
        matches!(self, Self::Master)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "master" => Ok(Self::Master),
            "slave" | "replica" => Ok(Self::Slave),
            other => Err(FabricError::InvalidOptions(format!(
                "unknown role '{}', expected 'master' or 'slave'",
                other
            ))),
        }
    }
}

/// Routing topology of a model, the options of `data_fabric`
///
/// ```
/// use shardfabric::{FabricOptions, Role};
///
/// let options = FabricOptions::new()
///     .prefix("fiveruns")
///     .shard_by("city")
///     .replicated();
/// assert_eq!(options.default_role, Role::Slave);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FabricOptions {
    /// Route between `_master` and `_slave` connections
    pub replicated: bool,

    /// Shard group the model is partitioned by
    pub shard_by: Option<String>,

    /// Leading segment of every connection name
    pub prefix: Option<String>,

    /// Role used for reads outside of any fixed-role scope
    pub default_role: Role,

    /// Pick the read role from replica lag instead of `default_role`
    pub dynamic_toggle: bool,
}

impl FabricOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replicated(mut self) -> Self {
        self.replicated = true;
        self
    }

    pub fn shard_by(mut self, group: &str) -> Self {
        self.shard_by = Some(group.to_string());
        self
    }

    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    pub fn default_role(mut self, role: Role) -> Self {
        self.default_role = role;
        self
    }

    /// Enables lag-based role selection; implies `replicated`
    pub fn dynamic_toggle(mut self) -> Self {
        self.dynamic_toggle = true;
        self.replicated = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.dynamic_toggle && !self.replicated {
            return Err(FabricError::InvalidOptions(
                "dynamic_toggle requires a replicated topology".into(),
            ));
        }

        for (label, segment) in [("prefix", &self.prefix), ("shard_by", &self.shard_by)] {
            if matches!(segment, Some(s) if s.is_empty()) {
                return Err(FabricError::InvalidOptions(format!("{} cannot be empty", label)));
            }
        }

        Ok(())
    }
}
