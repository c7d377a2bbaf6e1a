//! Per-unit-of-work routing state
//!
//! A [`RoutingContext`] carries what used to be ambient per-thread state: the
//! active shard for each shard group and the role each proxy is pinned to.
//! Every request or task owns its own context, so activation in one never
//! leaks into another.

pub mod shard;

pub use shard::ShardContext;

use crate::core::{Result, Role};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

#[derive(Debug, Clone, Default)]
pub struct RoutingContext {
    shards: ShardContext,
    /// Fixed role per proxy; absent means the proxy picks its role itself
    roles: HashMap<String, Role>,
}

impl RoutingContext {
    pub fn new(shards: ShardContext) -> Self {
        Self {
            shards,
            roles: HashMap::new(),
        }
    }

    pub fn shards(&self) -> &ShardContext {
        &self.shards
    }

    pub fn shards_mut(&mut self) -> &mut ShardContext {
        &mut self.shards
    }

    /// Activate shards until [`RoutingContext::deactivate_shard`] removes them
    pub fn activate_shard<I, K, V>(&mut self, shards: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: ToString,
    {
        self.shards.activate(shards);
    }

    pub fn deactivate_shard<I, K>(&mut self, groups: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.shards.deactivate(groups);
    }

    pub fn active_shard(&self, group: &str) -> Result<&str> {
        self.shards.active(group)
    }

    pub fn is_shard_active(&self, group: Option<&str>) -> bool {
        self.shards.is_active(group)
    }

    /// Overlay `shards` until the returned scope is dropped
    pub fn shard_scope<I, K, V>(&mut self, shards: I) -> ShardScope<'_>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: ToString,
    {
        let saved = self.shards.clone();
        self.shards.activate(shards);
        ShardScope {
            ctx: self,
            saved: Some(saved),
        }
    }

    /// Run `f` with `shards` overlaid, restoring the prior mapping afterwards
    ///
    /// ```
    /// # use shardfabric::RoutingContext;
    /// # tokio_test::block_on(async {
    /// let mut ctx = RoutingContext::default();
    /// let city = ctx
    ///     .with_shards([("city", "austin")], |ctx| {
    ///         Box::pin(async move { ctx.active_shard("city").map(str::to_string) })
    ///     })
    ///     .await
    ///     .unwrap();
    /// assert_eq!(city, "austin");
    /// assert!(!ctx.is_shard_active(Some("city")));
    /// # });
    /// ```
    pub async fn with_shards<I, K, V, F, T>(&mut self, shards: I, f: F) -> T
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: ToString,
        F: for<'c> FnOnce(&'c mut RoutingContext) -> BoxFuture<'c, T>,
    {
        let mut scope = self.shard_scope(shards);
        let out = f(&mut *scope).await;
        drop(scope);
        out
    }

    /// Role `proxy` is pinned to, if any
    pub fn fixed_role(&self, proxy: &str) -> Option<Role> {
        self.roles.get(proxy).copied()
    }

    /// Pin `proxy` to `role` until the returned scope is dropped
    pub fn role_scope(&mut self, proxy: &str, role: Role) -> RoleScope<'_> {
        let saved = self.roles.insert(proxy.to_string(), role);
        RoleScope {
            ctx: self,
            proxy: proxy.to_string(),
            saved,
        }
    }

    pub(crate) fn restore_role(&mut self, proxy: &str, saved: Option<Role>) {
        match saved {
            Some(role) => {
                self.roles.insert(proxy.to_string(), role);
            }
            None => {
                self.roles.remove(proxy);
            }
        }
    }
}

/// Shard overlay that restores the previous mapping on drop
pub struct ShardScope<'a> {
    ctx: &'a mut RoutingContext,
    saved: Option<ShardContext>,
}

impl Deref for ShardScope<'_> {
    type Target = RoutingContext;

    fn deref(&self) -> &RoutingContext {
        self.ctx
    }
}

impl DerefMut for ShardScope<'_> {
    fn deref_mut(&mut self) -> &mut RoutingContext {
        self.ctx
    }
}

impl Drop for ShardScope<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.ctx.shards.replace(saved);
        }
    }
}

/// Role pin that restores the previous fixed or automatic state on drop
pub struct RoleScope<'a> {
    ctx: &'a mut RoutingContext,
    proxy: String,
    saved: Option<Role>,
}

impl Deref for RoleScope<'_> {
    type Target = RoutingContext;

    fn deref(&self) -> &RoutingContext {
        self.ctx
    }
}

impl DerefMut for RoleScope<'_> {
    fn deref_mut(&mut self) -> &mut RoutingContext {
        self.ctx
    }
}

impl Drop for RoleScope<'_> {
    fn drop(&mut self) {
        self.ctx.restore_role(&self.proxy, self.saved);
    }
}
