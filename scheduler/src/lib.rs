//! Scheduler: the R -> C -> A -> P -> N schedule pass (spec §4.7), grounded
//! directly on `backend/src/scheduler/scheduler.rs::Scheduler::on_tick`'s
//! phased, `#[instrument]`-wrapped structure, and on
//! `backend/src/scheduler/drr.rs`'s deficit round robin (generalized in
//! [`fairness`]) and `backend/src/planner/sizing.rs`'s budget-consumption
//! pattern (generalized in [`resources`]).

mod config;
mod error;
mod fairness;
mod launch;
mod pass;
mod resources;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nodeagent::NodeAgentClient;
use notifier::WebhookNotifier;
use parking_lot::Mutex;
use secretclient::SecretClient;
use store::Store;

pub use config::SchedulerConfig;
pub use error::{Result, SchedulerError};
pub use resources::ResourceAssignment;

use fairness::FairnessTracker;

/// Owns one schedule pass's dependencies plus the in-process fairness and
/// node-liveness state that must survive across passes within a single
/// Controller process lifetime (spec §4.6: the Controller is the sole
/// writer, so this state never needs cross-process synchronization).
///
/// `run_pass` is not reentrant-safe with itself; serializing calls to it is
/// the Controller mailbox's job (§4.6), not this type's.
pub struct Scheduler {
    store: Arc<dyn Store>,
    secrets: Arc<dyn SecretClient>,
    agents: Arc<dyn NodeAgentClient>,
    notifier: Arc<WebhookNotifier>,
    config: SchedulerConfig,
    callback_base_url: String,

    fairness: Mutex<FairnessTracker>,
    /// Last instant each node was confirmed alive by a probe this process
    /// lifetime; absence is treated as "never seen alive", reaped
    /// immediately unless `recover_on_startup` has seeded a grace window.
    node_last_alive: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        secrets: Arc<dyn SecretClient>,
        agents: Arc<dyn NodeAgentClient>,
        notifier: Arc<WebhookNotifier>,
        config: SchedulerConfig,
        callback_base_url: String,
    ) -> Self {
        Self {
            store,
            secrets,
            agents,
            notifier,
            config,
            callback_base_url,
            fairness: Mutex::new(FairnessTracker::new()),
            node_last_alive: Mutex::new(HashMap::new()),
        }
    }
}
