//! Node resource fitting (spec §4.7 Phase A, point 2), generalized from
//! `backend/src/planner/sizing.rs::derive_execution_plan`'s budget-consumption
//! pattern: there, a global market-depth budget is split across user intents
//! first-fit; here, a batch's RAM + GPU demand is matched against one node's
//! free capacity, smallest feasible GPU first so larger GPUs stay available
//! for larger future requests (spec §9 open question 2).

use common::model::{ContainerSettings, Node, NodeLiveness};

/// A feasible placement: the chosen node and, if GPUs were requested, the
/// specific physical GPU ids reserved for the batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceAssignment {
    pub node_name: String,
    pub gpu_ids: Vec<String>,
}

/// Finds the tightest-fitting live node for `container`'s demand. "Tightest"
/// means least RAM headroom remaining after assignment, so a batch never
/// occupies a node better saved for a larger one.
pub fn find_fit(nodes: &[Node], container: &ContainerSettings) -> Option<ResourceAssignment> {
    let mut best: Option<(ResourceAssignment, u64)> = None;

    for node in nodes {
        if node.liveness != NodeLiveness::Alive {
            continue;
        }
        if node.ram_free_mb() < container.ram_mb {
            continue;
        }

        let gpu_ids = match &container.gpus {
            None => Vec::new(),
            Some(req) => {
                let mut free: Vec<_> = node
                    .gpus_free()
                    .into_iter()
                    .filter(|g| g.vram_mb >= req.vram_min_mb)
                    .collect();
                if (free.len() as u32) < req.count {
                    continue;
                }
                // Best-fit: smallest feasible GPU first.
                free.sort_by_key(|g| g.vram_mb);
                free.into_iter()
                    .take(req.count as usize)
                    .map(|g| g.id.clone())
                    .collect()
            }
        };

        let headroom = node.ram_free_mb() - container.ram_mb;
        let candidate = ResourceAssignment {
            node_name: node.node_name.clone(),
            gpu_ids,
        };

        match &best {
            Some((_, best_headroom)) if *best_headroom <= headroom => {}
            _ => best = Some((candidate, headroom)),
        }
    }

    best.map(|(assignment, _)| assignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::model::{Gpu, GpuRequirement, Hardware};

    fn mk_node(name: &str, ram_mb: u64, gpus: Vec<Gpu>) -> Node {
        Node {
            node_name: name.to_string(),
            url: format!("http://{name}"),
            hardware: Hardware { ram_mb, gpus },
            liveness: NodeLiveness::Alive,
            ram_committed_mb: 0,
            gpus_committed: vec![],
        }
    }

    #[test]
    fn picks_tightest_fitting_node() {
        let small = mk_node("small", 512, vec![]);
        let large = mk_node("large", 4096, vec![]);
        let container = ContainerSettings {
            engine: "docker".to_string(),
            image: "alpine".to_string(),
            ram_mb: 256,
            gpus: None,
        };

        let assignment = find_fit(&[large, small], &container).unwrap();
        assert_eq!(assignment.node_name, "small");
    }

    #[test]
    fn skips_unreachable_nodes() {
        let mut node = mk_node("a", 1024, vec![]);
        node.liveness = NodeLiveness::Unreachable;
        let container = ContainerSettings {
            engine: "docker".to_string(),
            image: "alpine".to_string(),
            ram_mb: 256,
            gpus: None,
        };
        assert!(find_fit(&[node], &container).is_none());
    }

    #[test]
    fn gpu_assignment_prefers_smallest_feasible() {
        let gpus = vec![
            Gpu { id: "g-big".to_string(), vendor: "nvidia".to_string(), vram_mb: 24_000 },
            Gpu { id: "g-small".to_string(), vendor: "nvidia".to_string(), vram_mb: 8_000 },
        ];
        let node = mk_node("gpu-node", 4096, gpus);
        let container = ContainerSettings {
            engine: "docker".to_string(),
            image: "alpine".to_string(),
            ram_mb: 256,
            gpus: Some(GpuRequirement { count: 1, vram_min_mb: 4_000 }),
        };

        let assignment = find_fit(&[node], &container).unwrap();
        assert_eq!(assignment.gpu_ids, vec!["g-small".to_string()]);
    }

    #[test]
    fn insufficient_gpu_vram_is_infeasible() {
        let gpus = vec![Gpu { id: "g1".to_string(), vendor: "nvidia".to_string(), vram_mb: 2_000 }];
        let node = mk_node("gpu-node", 4096, gpus);
        let container = ContainerSettings {
            engine: "docker".to_string(),
            image: "alpine".to_string(),
            ram_mb: 256,
            gpus: Some(GpuRequirement { count: 1, vram_min_mb: 4_000 }),
        };

        assert!(find_fit(&[node], &container).is_none());
    }
}
