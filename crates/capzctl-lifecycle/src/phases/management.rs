//! Management cluster resolution and controller installation.

use capzctl_common::{Error, Result};
use tracing::{debug, info};

use crate::orchestrator::{ManagementTarget, Orchestrator};
use crate::state::{ClusterHandle, WorkloadCluster};

/// Find the management cluster, provisioning it just in time when allowed.
pub(crate) async fn resolve(
    orchestrator: &Orchestrator,
    target: &ManagementTarget,
    cluster: &WorkloadCluster,
) -> Result<ClusterHandle> {
    if let Some(handle) = orchestrator
        .management
        .find(&target.name, &target.resource_group)
        .await?
    {
        info!(management = %handle.name, origin = ?handle.origin, "using management cluster");
        return Ok(handle);
    }

    if !target.provision {
        return Err(Error::precondition(
            &cluster.name,
            format!(
                "{} and just-in-time provisioning is disabled",
                not_found(target)
            ),
        ));
    }

    let location = target.location.as_deref().ok_or_else(|| {
        Error::validation_for_field(
            &cluster.name,
            "location",
            "a location is required to provision a management cluster",
        )
    })?;

    info!(management = %target.name, location = %location, "management cluster not found, provisioning");
    orchestrator
        .management
        .create(&target.name, &target.resource_group, location)
        .await
}

/// Find an existing management cluster; never provisions.
pub(crate) async fn find_existing(
    orchestrator: &Orchestrator,
    target: &ManagementTarget,
    cluster: &WorkloadCluster,
) -> Result<ClusterHandle> {
    orchestrator
        .management
        .find(&target.name, &target.resource_group)
        .await?
        .ok_or_else(|| Error::precondition(&cluster.name, not_found(target)))
}

/// Install the Cluster API controllers unless they are already running.
pub(crate) async fn ensure_controllers(
    orchestrator: &Orchestrator,
    handle: &ClusterHandle,
    installed: bool,
) -> Result<()> {
    if installed {
        debug!(management = %handle.name, "controllers already installed");
        return Ok(());
    }
    info!(management = %handle.name, "installing Cluster API controllers");
    orchestrator.management.install_controllers(handle).await
}

fn not_found(target: &ManagementTarget) -> String {
    format!(
        "management cluster {} not found in resource group {}",
        target.name, target.resource_group
    )
}
