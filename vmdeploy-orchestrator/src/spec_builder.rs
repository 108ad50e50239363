use vmdeploy_common::NetworkSettings;
use vmdeploy_providers::{
    AdapterMapping, CloneSpecification, CustomizationSpec, GlobalIpSettings, IpSettings,
    LinuxPrep, RelocationSpec,
};

use crate::resolver::Placement;

/// Guest domain applied to every clone. Not configurable; the identity is
/// Linux-style, so Windows templates will fail customization at first boot.
pub const GUEST_DOMAIN: &str = "localdomain";

/// Build the clone request for one VM. Pure: no calls to the server.
///
/// Takes a [`Placement`], which only exists once every named object was
/// resolved, so a partial spec cannot be built.
pub fn build_clone_spec(
    placement: &Placement,
    network: &NetworkSettings,
    vm_name: &str,
) -> CloneSpecification {
    let location = RelocationSpec {
        datastore: placement.datastore.moref.clone(),
        pool: placement.pool.clone(),
    };

    let adapter = IpSettings {
        ip: network.ip,
        subnet_mask: network.netmask,
        gateway: vec![network.gateway],
        dns_server_list: network.dns.clone(),
    };

    // Some guest OSes only read the global list, others only the per-NIC one.
    let global_ip_settings = GlobalIpSettings {
        dns_server_list: network.dns.clone(),
    };

    let identity = LinuxPrep {
        host_name: vm_name.to_string(),
        domain: GUEST_DOMAIN.to_string(),
    };

    CloneSpecification {
        location,
        customization: CustomizationSpec {
            identity,
            global_ip_settings,
            nic_setting_map: vec![AdapterMapping { adapter }],
        },
        power_on: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Resolved;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
    use vmdeploy_providers::{ManagedObjectRef, ObjectCategory};

    fn resolved(category: ObjectCategory, kind: &str, id: &str, name: &str) -> Resolved {
        Resolved {
            category,
            name: name.into(),
            moref: ManagedObjectRef::new(kind, id),
        }
    }

    fn placement() -> Placement {
        Placement {
            template: resolved(ObjectCategory::Template, "VirtualMachine", "vm-7", "tpl"),
            datacenter: resolved(ObjectCategory::Datacenter, "Datacenter", "datacenter-2", "DC1"),
            cluster: resolved(ObjectCategory::Cluster, "ClusterComputeResource", "domain-c9", "C1"),
            datastore: resolved(ObjectCategory::Datastore, "Datastore", "datastore-11", "ds1"),
            folder: ManagedObjectRef::new("Folder", "group-v3"),
            pool: ManagedObjectRef::new("ResourcePool", "resgroup-8"),
        }
    }

    fn network(dns: Vec<IpAddr>) -> NetworkSettings {
        NetworkSettings {
            ip: Ipv4Addr::new(192, 168, 10, 21),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 10, 1),
            dns,
        }
    }

    #[test]
    fn builds_relocation_and_adapter_settings() {
        let spec = build_clone_spec(
            &placement(),
            &network(vec![IpAddr::from([192, 168, 10, 2])]),
            "web-01",
        );

        assert_eq!(spec.location.datastore, ManagedObjectRef::new("Datastore", "datastore-11"));
        assert_eq!(spec.location.pool, ManagedObjectRef::new("ResourcePool", "resgroup-8"));

        assert_eq!(spec.customization.nic_setting_map.len(), 1);
        let adapter = &spec.customization.nic_setting_map[0].adapter;
        assert_eq!(adapter.ip, Ipv4Addr::new(192, 168, 10, 21));
        assert_eq!(adapter.subnet_mask, Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(adapter.gateway, vec![Ipv4Addr::new(192, 168, 10, 1)]);
    }

    #[test]
    fn identity_uses_vm_name_and_fixed_domain() {
        let spec = build_clone_spec(&placement(), &network(vec![]), "db-03");
        assert_eq!(spec.customization.identity.host_name, "db-03");
        assert_eq!(spec.customization.identity.domain, "localdomain");
    }

    #[test]
    fn always_powers_on_with_one_adapter_and_matching_dns() {
        let dns_cases = [
            vec![],
            vec![IpAddr::from([8, 8, 8, 8])],
            vec![
                IpAddr::from([10, 0, 0, 3]),
                IpAddr::from([10, 0, 0, 2]),
                IpAddr::from([1, 1, 1, 1]),
            ],
            vec![
                IpAddr::V6(Ipv6Addr::new(0x2001, 0x4860, 0x4860, 0, 0, 0, 0, 0x8888)),
                IpAddr::from([10, 0, 0, 2]),
            ],
        ];
        for dns in dns_cases {
            let spec = build_clone_spec(&placement(), &network(dns.clone()), "web-01");
            assert!(spec.power_on);
            assert_eq!(spec.customization.nic_setting_map.len(), 1);
            let adapter_dns = &spec.customization.nic_setting_map[0].adapter.dns_server_list;
            assert_eq!(adapter_dns, &dns, "order must be preserved");
            assert_eq!(&spec.customization.global_ip_settings.dns_server_list, adapter_dns);
        }
    }
}
