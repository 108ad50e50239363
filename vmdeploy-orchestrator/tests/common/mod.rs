// Shared fixtures for deploy-flow tests. Everything runs against the mock provider.
#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use vmdeploy_orchestrator::WaitPolicy;
use vmdeploy_providers::mock::{MockInventory, MockProvider};

pub const USERNAME: &str = "administrator@vsphere.local";
pub const PASSWORD: &str = "s3cret";

/// Two VMs sharing one placement; web-02 asks for a template that may not exist.
pub fn two_vm_config(password_env: &str) -> String {
    format!(
        r#"
vcenter:
  host: vcenter.example.com
  username: {USERNAME}
  password_env: {password_env}
  validate_certs: false
vms:
  - name: web-01
    template: ubuntu-22.04-template
    datacenter: DC1
    cluster: Cluster1
    datastore: datastore1
    network:
      ip: 192.168.10.21
      netmask: 255.255.255.0
      gateway: 192.168.10.1
      dns: [192.168.10.2, 8.8.8.8]
  - name: web-02
    template: missing-template
    datacenter: DC1
    cluster: Cluster1
    datastore: datastore1
    network:
      ip: 192.168.10.22
      netmask: 255.255.255.0
      gateway: 192.168.10.1
"#
    )
}

/// Inventory with the shared placement and the web-01 template only.
pub fn lab_inventory() -> MockInventory {
    MockInventory::new()
        .with_template("ubuntu-22.04-template")
        .with_datacenter("DC1")
        .with_cluster("Cluster1")
        .with_datastore("datastore1")
        .with_credentials(USERNAME, PASSWORD)
}

pub fn lab_provider() -> MockProvider {
    MockProvider::new(lab_inventory())
}

pub fn write_config(contents: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deploy.yaml");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

/// Each test uses its own variable so parallel tests do not race.
pub fn set_password(var: &str, value: &str) {
    std::env::set_var(var, value);
}

pub fn fast_policy() -> WaitPolicy {
    WaitPolicy {
        timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(1),
    }
}
