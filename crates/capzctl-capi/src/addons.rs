//! Add-ons installed into a workload cluster once its control plane is ready

use serde::{Deserialize, Serialize};

use crate::constants::{CALICO_MANIFEST_URL, WINDOWS_CALICO_MANIFEST_URL};
use crate::context::{CompositionContext, OsFamily};

/// What to install into a ready workload cluster, in order
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonPlan {
    /// CNI manifests (URLs or paths), applied in order
    pub cni_manifests: Vec<String>,
    /// Wait for every node to report Ready after the CNI is installed
    pub wait_for_nodes: bool,
}

impl AddonPlan {
    /// Calico, plus Calico for Windows when the workers run Windows
    pub fn for_context(ctx: &CompositionContext) -> Self {
        let mut cni_manifests = vec![CALICO_MANIFEST_URL.to_string()];
        if ctx.os_family == OsFamily::Windows {
            cni_manifests.push(WINDOWS_CALICO_MANIFEST_URL.to_string());
        }
        Self {
            cni_manifests,
            wait_for_nodes: true,
        }
    }

    /// Nothing to install and nothing to wait for
    pub fn is_empty(&self) -> bool {
        self.cni_manifests.is_empty() && !self.wait_for_nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TemplateCatalog;
    use crate::resolver::{resolve, ClusterRequest};

    fn context(os_family: Option<OsFamily>) -> CompositionContext {
        resolve(
            &TemplateCatalog::builtin(),
            &ClusterRequest {
                name: "demo".to_string(),
                location: Some("eastus".to_string()),
                subscription_id: Some("00000000-0000-0000-0000-000000000000".to_string()),
                os_family,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn linux_cluster_gets_calico_only() {
        let plan = AddonPlan::for_context(&context(None));
        assert_eq!(plan.cni_manifests, vec![CALICO_MANIFEST_URL.to_string()]);
        assert!(plan.wait_for_nodes);
    }

    #[test]
    fn windows_cluster_adds_windows_calico_after_calico() {
        let plan = AddonPlan::for_context(&context(Some(OsFamily::Windows)));
        assert_eq!(
            plan.cni_manifests,
            vec![
                CALICO_MANIFEST_URL.to_string(),
                WINDOWS_CALICO_MANIFEST_URL.to_string()
            ]
        );
    }

    #[test]
    fn default_plan_is_empty() {
        assert!(AddonPlan::default().is_empty());
        assert!(!AddonPlan::for_context(&context(None)).is_empty());
    }
}
