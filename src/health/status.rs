use super::poller::Poller;
use crate::connection::pool::ConnectionPool;
use crate::core::Role;
use log::info;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Master/replica decision for one replicated connection group
///
/// The decision only changes when the poller opens a window; between
/// windows every read reuses the last decision.
#[derive(Debug)]
pub struct ReplicaHealthStatus {
    name: String,
    master: AtomicBool,
    poller: Poller,
}

impl ReplicaHealthStatus {
    pub fn new(name: &str, poller: Poller) -> Self {
        Self {
            name: name.to_string(),
            master: AtomicBool::new(false),
            poller,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    /// True while reads should be sent to master
    pub fn is_master(&self) -> bool {
        self.master.load(Ordering::Acquire)
    }

    pub fn role(&self) -> Role {
        if self.is_master() { Role::Master } else { Role::Slave }
    }

    /// Re-evaluate the decision if a polling window is open
    pub async fn update_status(&self) {
        if !self.poller.check_server() {
            return;
        }

        let behind = self.poller.is_behind().await;
        let previous = self.master.swap(behind, Ordering::AcqRel);
        if previous != behind {
            info!(
                "Replica '{}' {}; routing reads to {}",
                self.name,
                if behind { "fell behind" } else { "caught up" },
                if behind { Role::Master } else { Role::Slave }
            );
        }
    }

    /// Bind the replica pool the lag checker measures
    pub fn attach_replica(&self, pool: Arc<ConnectionPool>) {
        self.poller.attach(pool);
    }

    /// Release the bound replica pool so a torn-down pool is not kept alive
    pub fn detach_replica(&self) {
        self.poller.detach();
    }
}
