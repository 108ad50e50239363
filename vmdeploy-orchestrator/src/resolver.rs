use tracing::debug;
use vmdeploy_common::VmDeploymentRequest;
use vmdeploy_providers::{ManagedObjectRef, ObjectCategory, Session};

use crate::error::DeployError;

/// A named object found in the inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub category: ObjectCategory,
    pub name: String,
    pub moref: ManagedObjectRef,
}

/// Everything a clone needs to know about where it goes. Only produced once
/// all four named objects were found.
#[derive(Debug, Clone)]
pub struct Placement {
    pub template: Resolved,
    pub datacenter: Resolved,
    pub cluster: Resolved,
    pub datastore: Resolved,
    /// Datacenter's default VM folder.
    pub folder: ManagedObjectRef,
    /// Cluster's root resource pool.
    pub pool: ManagedObjectRef,
}

/// Look up one object by exact, case-sensitive name. A miss is
/// `DeployError::NotFound`.
pub async fn resolve(
    session: &dyn Session,
    category: ObjectCategory,
    name: &str,
) -> Result<Resolved, DeployError> {
    let found = session
        .find_by_name(category, name)
        .await
        .map_err(DeployError::Lookup)?;

    match found {
        Some(moref) => {
            debug!(%category, name, moref = %moref, "resolved");
            Ok(Resolved {
                category,
                name: name.to_string(),
                moref,
            })
        }
        None => Err(DeployError::NotFound {
            category,
            name: name.to_string(),
        }),
    }
}

/// Resolve template, datacenter, cluster and datastore in that order,
/// stopping at the first miss.
pub async fn resolve_placement(
    session: &dyn Session,
    request: &VmDeploymentRequest,
) -> Result<Placement, DeployError> {
    let template = resolve(session, ObjectCategory::Template, &request.template).await?;
    let datacenter = resolve(session, ObjectCategory::Datacenter, &request.datacenter).await?;
    let cluster = resolve(session, ObjectCategory::Cluster, &request.cluster).await?;
    let datastore = resolve(session, ObjectCategory::Datastore, &request.datastore).await?;

    let folder = session
        .default_vm_folder(&datacenter.moref)
        .await
        .map_err(DeployError::Lookup)?;
    let pool = session
        .root_resource_pool(&cluster.moref)
        .await
        .map_err(DeployError::Lookup)?;

    Ok(Placement {
        template,
        datacenter,
        cluster,
        datastore,
        folder,
        pool,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmdeploy_providers::mock::{MockCall, MockInventory, MockProvider};
    use vmdeploy_providers::{ConnectionParams, VirtualizationProvider};

    fn params() -> ConnectionParams {
        ConnectionParams {
            host: "mock".into(),
            port: 443,
            username: "u".into(),
            password: "p".into(),
            validate_certs: true,
        }
    }

    fn request() -> VmDeploymentRequest {
        VmDeploymentRequest {
            name: "web-01".into(),
            template: "tpl".into(),
            datacenter: "DC1".into(),
            cluster: "C1".into(),
            datastore: "ds1".into(),
            network: vmdeploy_common::NetworkSettings {
                ip: "10.0.0.5".parse().unwrap(),
                netmask: "255.255.255.0".parse().unwrap(),
                gateway: "10.0.0.1".parse().unwrap(),
                dns: vec![],
            },
        }
    }

    fn full_inventory() -> MockInventory {
        MockInventory::new()
            .with_template("tpl")
            .with_datacenter("DC1")
            .with_cluster("C1")
            .with_datastore("ds1")
    }

    #[tokio::test]
    async fn resolves_full_placement() {
        let provider = MockProvider::new(full_inventory());
        let session = provider.connect(&params()).await.unwrap();

        let placement = resolve_placement(session.as_ref(), &request()).await.unwrap();
        assert_eq!(placement.template.moref.kind, "VirtualMachine");
        assert_eq!(placement.datastore.name, "ds1");
        assert_eq!(placement.folder.kind, "Folder");
        assert_eq!(placement.pool.kind, "ResourcePool");
    }

    #[tokio::test]
    async fn miss_reports_category_and_name() {
        let provider = MockProvider::new(full_inventory());
        let session = provider.connect(&params()).await.unwrap();

        match resolve(session.as_ref(), ObjectCategory::Cluster, "c1").await {
            Err(DeployError::NotFound { category, name }) => {
                assert_eq!(category, ObjectCategory::Cluster);
                assert_eq!(name, "c1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn stops_at_first_missing_object() {
        for missing in ObjectCategory::ALL {
            let mut inv = MockInventory::new();
            for category in ObjectCategory::ALL {
                if category != missing {
                    let name = match category {
                        ObjectCategory::Template => "tpl",
                        ObjectCategory::Datacenter => "DC1",
                        ObjectCategory::Cluster => "C1",
                        ObjectCategory::Datastore => "ds1",
                    };
                    inv = inv.with_object(category, name);
                }
            }
            let provider = MockProvider::new(inv);
            let session = provider.connect(&params()).await.unwrap();

            let err = resolve_placement(session.as_ref(), &request()).await.unwrap_err();
            assert!(matches!(err, DeployError::NotFound { category, .. } if category == missing));

            let journal = provider.journal();
            let last_find = journal
                .iter()
                .rev()
                .find_map(|c| match c {
                    MockCall::Find { category, .. } => Some(*category),
                    _ => None,
                })
                .unwrap();
            assert_eq!(last_find, missing);
            assert!(!journal
                .iter()
                .any(|c| matches!(c, MockCall::DefaultVmFolder { .. } | MockCall::RootResourcePool { .. })));
        }
    }
}
