//! Workload add-ons: `kubectl apply -f` for manifests, kube-rs for Nodes

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use tracing::{debug, info};

use capzctl_common::kube_utils::create_client;
use capzctl_common::Result;

use super::command::ExternalCommand;
use super::kubeconfig_args;
use crate::collaborators::WorkloadAddons;
use crate::state::{ClusterHandle, NodeReadiness};

/// [`WorkloadAddons`] over kubectl and the workload cluster's API server
#[derive(Clone, Debug, Default)]
pub struct KubectlAddons;

impl KubectlAddons {
    /// Adapter using `kubectl` from `PATH`
    pub fn new() -> Self {
        Self
    }
}

fn apply_args(workload: &ClusterHandle, source: &str) -> Vec<String> {
    let mut args = vec!["apply".to_string(), "-f".to_string(), source.to_string()];
    args.extend(kubeconfig_args(workload, "--context"));
    args
}

fn node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

#[async_trait]
impl WorkloadAddons for KubectlAddons {
    async fn install(&self, workload: &ClusterHandle, source: &str) -> Result<()> {
        let output = ExternalCommand::new("kubectl", &workload.name)
            .args(apply_args(workload, source))
            .run()
            .await?;
        debug!(cluster = %workload.name, output = %output.trim(), "kubectl apply finished");
        info!(cluster = %workload.name, source = %source, "add-on applied");
        Ok(())
    }

    async fn node_readiness(&self, workload: &ClusterHandle) -> Result<NodeReadiness> {
        let client = create_client(workload.kubeconfig.as_deref(), workload.context.as_deref()).await?;
        let nodes: Api<Node> = Api::all(client);
        let items = nodes.list(&ListParams::default()).await?.items;
        Ok(NodeReadiness {
            ready: items.iter().filter(|n| node_ready(n)).count(),
            total: items.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::HandleOrigin;
    use serde_json::json;

    fn node(ready: &str) -> Node {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Node",
            "metadata": {"name": "demo-md-0-abcde"},
            "status": {
                "conditions": [
                    {"type": "MemoryPressure", "status": "False"},
                    {"type": "Ready", "status": ready}
                ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn apply_targets_the_workload_kubeconfig() {
        let workload = ClusterHandle {
            name: "demo".to_string(),
            resource_group: "demo".to_string(),
            kubeconfig: Some("./demo.kubeconfig".into()),
            context: None,
            origin: HandleOrigin::Existing,
        };
        assert_eq!(
            apply_args(&workload, "https://example.com/calico.yaml"),
            vec![
                "apply",
                "-f",
                "https://example.com/calico.yaml",
                "--kubeconfig",
                "./demo.kubeconfig"
            ]
        );
    }

    #[test]
    fn node_readiness_follows_the_ready_condition() {
        assert!(node_ready(&node("True")));
        assert!(!node_ready(&node("False")));
        assert!(!node_ready(&node("Unknown")));
        assert!(!node_ready(&Node::default()));
    }
}
