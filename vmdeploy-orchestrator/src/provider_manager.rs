use vmdeploy_common::DeploymentConfig;
use vmdeploy_providers::VirtualizationProvider;

use crate::settings::ProviderKind;

pub struct ProviderManager;

impl ProviderManager {
    /// Build the selected provider, or `None` if it was compiled out.
    pub fn get_provider(
        kind: ProviderKind,
        config: &DeploymentConfig,
    ) -> Option<Box<dyn VirtualizationProvider>> {
        match kind {
            #[cfg(feature = "provider-vsphere")]
            ProviderKind::Vsphere => {
                let _ = config; // endpoint comes from the connection params
                Some(Box::new(vmdeploy_providers::vsphere::VsphereProvider::new()))
            }
            #[cfg(feature = "provider-mock")]
            ProviderKind::Mock => Some(Box::new(dry_run_provider(config))),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}

/// An in-memory inventory holding every object the config names, so a dry
/// run walks the full workflow without a server.
#[cfg(feature = "provider-mock")]
pub fn dry_run_provider(config: &DeploymentConfig) -> vmdeploy_providers::mock::MockProvider {
    use vmdeploy_providers::mock::{MockInventory, MockProvider};
    use vmdeploy_providers::ObjectCategory;

    let inventory = config.vms.iter().fold(MockInventory::new(), |inv, vm| {
        inv.ensure(ObjectCategory::Template, &vm.template)
            .ensure(ObjectCategory::Datacenter, &vm.datacenter)
            .ensure(ObjectCategory::Cluster, &vm.cluster)
            .ensure(ObjectCategory::Datastore, &vm.datastore)
    });
    MockProvider::new(inventory.with_task_progress(0, 1))
}
