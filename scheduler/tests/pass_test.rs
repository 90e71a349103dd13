//! Integration tests for the schedule pass, following the mock-repository
//! convention of `backend/src/session/store.rs`'s test module: an in-memory
//! `Store` plus hand-written stub `SecretClient`/`NodeAgentClient`
//! implementations, driven through `Scheduler::run_pass`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::model::{
    Batch, BatchState, ContainerSettings, ExecutionSettings, Experiment, Gpu, Hardware, Node, NodeLiveness,
};
use nodeagent::{LaunchOutcome, LaunchSpec, NodeAgentClient, ProbeResult};
use notifier::WebhookNotifier;
use scheduler::{Scheduler, SchedulerConfig};
use secretclient::SecretClient;
use serde_json::Value;
use store::{MemoryStore, Store};
use uuid::Uuid;

struct AcceptingAgent;

#[async_trait]
impl NodeAgentClient for AcceptingAgent {
    async fn launch(&self, _node_url: &str, _spec: &LaunchSpec) -> nodeagent::Result<LaunchOutcome> {
        Ok(LaunchOutcome::Accepted)
    }

    async fn probe(&self, _node_url: &str) -> nodeagent::Result<ProbeResult> {
        Ok(ProbeResult { alive: true, ..Default::default() })
    }

    async fn cancel(&self, _node_url: &str, _batch_id: &str) -> nodeagent::Result<()> {
        Ok(())
    }
}

struct NoopSecrets;

#[async_trait]
impl SecretClient for NoopSecrets {
    async fn put(&self, _values: BTreeMap<String, Value>) -> secretclient::Result<()> {
        Ok(())
    }

    async fn get(&self, _keys: &[String]) -> secretclient::Result<BTreeMap<String, Value>> {
        Ok(BTreeMap::new())
    }

    async fn delete(&self, _keys: &[String]) -> secretclient::Result<()> {
        Ok(())
    }
}

fn mk_experiment(ram_mb: u64) -> Experiment {
    Experiment {
        id: Uuid::new_v4(),
        username: "alice".to_string(),
        container: ContainerSettings { engine: "docker".to_string(), image: "alpine:3".to_string(), ram_mb, gpus: None },
        execution: ExecutionSettings {
            engine: "ccagency".to_string(),
            retry_if_failed: false,
            batch_concurrency_limit: 5,
            access_url: None,
        },
        notifications: vec![],
        registration_time: Utc::now(),
    }
}

fn mk_batch(experiment_id: Uuid, username: &str, index: u32) -> Batch {
    Batch {
        id: Uuid::new_v4(),
        experiment_id,
        username: username.to_string(),
        batch_index: index,
        state: BatchState::Registered,
        node: None,
        history: vec![],
        protected_keys_voided: false,
        notifications_sent: false,
        attempts: 0,
        registration_time: Utc::now(),
        inputs: BTreeMap::new(),
        outputs: BTreeMap::new(),
        secret_bundle_id: None,
        gpu_ids: vec![],
    }
}

fn mk_node(name: &str, ram_mb: u64) -> Node {
    Node {
        node_name: name.to_string(),
        url: format!("http://{name}"),
        hardware: Hardware { ram_mb, gpus: Vec::<Gpu>::new() },
        liveness: NodeLiveness::Alive,
        ram_committed_mb: 0,
        gpus_committed: vec![],
    }
}

async fn mk_scheduler(store: Arc<MemoryStore>) -> Scheduler {
    let notifier = Arc::new(WebhookNotifier::new(store.clone()).unwrap());
    Scheduler::new(
        store,
        Arc::new(NoopSecrets),
        Arc::new(AcceptingAgent),
        notifier,
        SchedulerConfig::default(),
        "http://broker".to_string(),
    )
}

#[tokio::test]
async fn happy_path_admits_a_registered_batch_to_a_node() {
    let store = Arc::new(MemoryStore::new());
    let experiment = mk_experiment(256);
    store.insert_experiment(&experiment).await.unwrap();
    let batch = mk_batch(experiment.id, "alice", 0);
    store.insert_batches(&[batch.clone()]).await.unwrap();
    store.upsert_node(&mk_node("node-a", 1024)).await.unwrap();

    let scheduler = mk_scheduler(store.clone()).await;
    scheduler.run_pass().await.unwrap();

    let reloaded = store.get_batch(batch.id).await.unwrap().unwrap();
    assert_eq!(reloaded.state, BatchState::Scheduled);
    assert_eq!(reloaded.node.as_deref(), Some("node-a"));
}

#[tokio::test]
async fn concurrency_limit_holds_extra_batches_registered() {
    let store = Arc::new(MemoryStore::new());
    let mut experiment = mk_experiment(128);
    experiment.execution.batch_concurrency_limit = 1;
    store.insert_experiment(&experiment).await.unwrap();

    let batches: Vec<Batch> = (0..3).map(|i| mk_batch(experiment.id, "alice", i)).collect();
    store.insert_batches(&batches).await.unwrap();
    store.upsert_node(&mk_node("node-a", 1024)).await.unwrap();

    let scheduler = mk_scheduler(store.clone()).await;
    scheduler.run_pass().await.unwrap();

    let scheduled = store
        .list_batches(Some(BatchState::Scheduled), None, None)
        .await
        .unwrap();
    assert_eq!(scheduled.len(), 1);
}

#[tokio::test]
async fn no_feasible_node_leaves_batch_registered() {
    let store = Arc::new(MemoryStore::new());
    let experiment = mk_experiment(4096);
    store.insert_experiment(&experiment).await.unwrap();
    let batch = mk_batch(experiment.id, "alice", 0);
    store.insert_batches(&[batch.clone()]).await.unwrap();
    store.upsert_node(&mk_node("node-a", 1024)).await.unwrap();

    let scheduler = mk_scheduler(store.clone()).await;
    scheduler.run_pass().await.unwrap();

    let reloaded = store.get_batch(batch.id).await.unwrap().unwrap();
    assert_eq!(reloaded.state, BatchState::Registered);
}
