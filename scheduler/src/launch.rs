//! Builds the `nodeagent::LaunchSpec` for one admitted batch (spec §4.5,
//! §4.7 Phase A): image, resolved input/output descriptors, runtime, and the
//! per-batch callback URLs/token the agent echoes back on each phase.

use common::model::{Batch, Experiment};
use nodeagent::{CallbackUrls, InputDescriptor, LaunchSpec, OutputDescriptor, Runtime};
use serde_json::Value;

use crate::resources::ResourceAssignment;

/// Collects every protected-value reference (`{"secretRef": "..."}`, however
/// deeply nested) still present in a batch's inputs, for the presence check
/// `SecretClient::get` performs before launch (spec §4.7 Phase A: "verify
/// presence").
pub fn collect_secret_refs(batch: &Batch) -> Vec<String> {
    let mut out = Vec::new();
    for value in batch.inputs.values() {
        walk_for_refs(value, &mut out);
    }
    out
}

fn walk_for_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("secretRef") {
                out.push(reference.clone());
                return;
            }
            for v in map.values() {
                walk_for_refs(v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                walk_for_refs(v, out);
            }
        }
        _ => {}
    }
}

pub fn build_spec(
    batch: &Batch,
    experiment: &Experiment,
    assignment: &ResourceAssignment,
    callback_base_url: &str,
    callback_token: &str,
) -> LaunchSpec {
    let runtime = if experiment.container.gpus.is_some() {
        Runtime::Nvidia
    } else {
        Runtime::Runc
    };

    let inputs = batch
        .inputs
        .iter()
        .map(|(key, value)| {
            let mount = value.get("mount").and_then(|m| m.as_bool()).unwrap_or(false);
            let value = value.get("value").cloned().unwrap_or_else(|| value.clone());
            InputDescriptor {
                key: key.clone(),
                value,
                mount,
            }
        })
        .collect();

    let outputs = batch
        .outputs
        .keys()
        .map(|key| OutputDescriptor {
            key: key.clone(),
            path: key.clone(),
        })
        .collect();

    let batch_id = batch.id.to_string();
    let base = callback_base_url.trim_end_matches('/');
    let callback_urls = CallbackUrls {
        input: format!("{base}/callback/{batch_id}/input"),
        main: format!("{base}/callback/{batch_id}/main"),
        output: format!("{base}/callback/{batch_id}/output"),
    };

    LaunchSpec {
        batch_id,
        image: experiment.container.image.clone(),
        command: Vec::new(),
        inputs,
        outputs,
        runtime,
        mount: false,
        ram_mb: experiment.container.ram_mb,
        gpu_ids: assignment.gpu_ids.clone(),
        callback_urls,
        callback_token: callback_token.to_string(),
        env: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::model::{BatchState, ContainerSettings, ExecutionSettings};
    use serde_json::json;
    use uuid::Uuid;

    fn mk_experiment(gpus: bool) -> Experiment {
        Experiment {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            container: ContainerSettings {
                engine: "docker".to_string(),
                image: "alpine:3".to_string(),
                ram_mb: 256,
                gpus: gpus.then_some(common::model::red::GpuRequirement { count: 1, vram_min_mb: 1000 }),
            },
            execution: ExecutionSettings {
                engine: "ccagency".to_string(),
                retry_if_failed: false,
                batch_concurrency_limit: 1,
                access_url: None,
            },
            notifications: vec![],
            registration_time: Utc::now(),
        }
    }

    fn mk_batch(experiment_id: Uuid) -> Batch {
        let mut inputs = std::collections::BTreeMap::new();
        inputs.insert("data".to_string(), json!({"value": {"secretRef": "b/0"}, "mount": true}));
        Batch {
            id: Uuid::new_v4(),
            experiment_id,
            username: "alice".to_string(),
            batch_index: 0,
            state: BatchState::Registered,
            node: None,
            history: vec![],
            protected_keys_voided: false,
            notifications_sent: false,
            attempts: 0,
            registration_time: Utc::now(),
            inputs,
            outputs: std::collections::BTreeMap::new(),
            secret_bundle_id: None,
            gpu_ids: vec![],
        }
    }

    #[test]
    fn picks_nvidia_runtime_when_experiment_demands_gpus() {
        let experiment = mk_experiment(true);
        let batch = mk_batch(experiment.id);
        let assignment = ResourceAssignment {
            node_name: "node-a".to_string(),
            gpu_ids: vec!["g1".to_string()],
        };
        let spec = build_spec(&batch, &experiment, &assignment, "http://broker", "tok");
        assert_eq!(spec.runtime, Runtime::Nvidia);
        assert_eq!(spec.gpu_ids, vec!["g1".to_string()]);
    }

    #[test]
    fn callback_urls_embed_batch_id_and_phase() {
        let experiment = mk_experiment(false);
        let batch = mk_batch(experiment.id);
        let batch_id = batch.id.to_string();
        let assignment = ResourceAssignment {
            node_name: "node-a".to_string(),
            gpu_ids: vec![],
        };
        let spec = build_spec(&batch, &experiment, &assignment, "http://broker/", "tok");
        assert_eq!(spec.callback_urls.main, format!("http://broker/callback/{batch_id}/main"));
    }

    #[test]
    fn input_descriptor_unwraps_mount_flag() {
        let experiment = mk_experiment(false);
        let batch = mk_batch(experiment.id);
        let assignment = ResourceAssignment {
            node_name: "node-a".to_string(),
            gpu_ids: vec![],
        };
        let spec = build_spec(&batch, &experiment, &assignment, "http://broker", "tok");
        assert!(spec.inputs[0].mount);
        assert_eq!(spec.inputs[0].value, json!({"secretRef": "b/0"}));
    }
}
