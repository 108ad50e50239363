//! Clone request model.
//!
//! Mirrors the shape of the platform's `VirtualMachineCloneSpec`, limited to
//! what a template clone with static guest networking needs.

use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr};

use crate::ManagedObjectRef;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloneSpecification {
    pub location: RelocationSpec,
    pub customization: CustomizationSpec,
    pub power_on: bool,
}

/// Where the clone lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelocationSpec {
    pub datastore: ManagedObjectRef,
    pub pool: ManagedObjectRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomizationSpec {
    pub identity: LinuxPrep,
    pub global_ip_settings: GlobalIpSettings,
    /// One entry per virtual NIC, in device order.
    pub nic_setting_map: Vec<AdapterMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinuxPrep {
    pub host_name: String,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalIpSettings {
    pub dns_server_list: Vec<IpAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterMapping {
    pub adapter: IpSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpSettings {
    pub ip: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub gateway: Vec<Ipv4Addr>,
    pub dns_server_list: Vec<IpAddr>,
}
