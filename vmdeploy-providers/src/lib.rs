use async_trait::async_trait;
use std::sync::Arc;

pub mod error;
pub mod spec;

pub use error::ProviderError;
pub use spec::{
    AdapterMapping, CloneSpecification, CustomizationSpec, GlobalIpSettings, IpSettings,
    LinuxPrep, RelocationSpec,
};

/// Entry point of a virtualization backend: turns credentials into a live
/// session.
#[async_trait]
pub trait VirtualizationProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Authenticate against the management endpoint.
    /// An invalid login must surface as `ProviderError::Authentication`.
    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn Session>, ProviderError>;
}

/// An authenticated connection. Lookups are read-only; `clone_vm` is the only
/// mutating call and it returns as soon as the server accepted the request.
#[async_trait]
pub trait Session: Send + Sync {
    /// First object of `category` whose display name equals `name` exactly.
    async fn find_by_name(
        &self,
        category: ObjectCategory,
        name: &str,
    ) -> Result<Option<ManagedObjectRef>, ProviderError>;

    /// The datacenter's default folder for virtual machines.
    async fn default_vm_folder(
        &self,
        datacenter: &ManagedObjectRef,
    ) -> Result<ManagedObjectRef, ProviderError>;

    /// The cluster's root resource pool.
    async fn root_resource_pool(
        &self,
        cluster: &ManagedObjectRef,
    ) -> Result<ManagedObjectRef, ProviderError>;

    async fn clone_vm(
        &self,
        template: &ManagedObjectRef,
        folder: &ManagedObjectRef,
        name: &str,
        spec: &CloneSpecification,
    ) -> Result<TaskHandle, ProviderError>;

    async fn task_info(&self, task: &TaskHandle) -> Result<TaskInfo, ProviderError>;

    /// Log out. Calling it twice is a no-op.
    async fn disconnect(&self) -> Result<(), ProviderError>;
}

#[derive(Clone)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub validate_certs: bool,
}

impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("validate_certs", &self.validate_certs)
            .finish()
    }
}

/// The classes of infrastructure object the resolver may look up by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectCategory {
    Template,
    Datacenter,
    Cluster,
    Datastore,
}

impl ObjectCategory {
    pub const ALL: [ObjectCategory; 4] = [
        ObjectCategory::Template,
        ObjectCategory::Datacenter,
        ObjectCategory::Cluster,
        ObjectCategory::Datastore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectCategory::Template => "template",
            ObjectCategory::Datacenter => "datacenter",
            ObjectCategory::Cluster => "cluster",
            ObjectCategory::Datastore => "datastore",
        }
    }

    /// Managed object type enumerated for this category.
    /// Templates are virtual machines flagged as templates.
    pub fn managed_type(&self) -> &'static str {
        match self {
            ObjectCategory::Template => "VirtualMachine",
            ObjectCategory::Datacenter => "Datacenter",
            ObjectCategory::Cluster => "ClusterComputeResource",
            ObjectCategory::Datastore => "Datastore",
        }
    }
}

impl std::fmt::Display for ObjectCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque server-side object reference (`type` + id, e.g. `Datastore:datastore-11`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ManagedObjectRef {
    pub kind: String,
    pub value: String,
}

impl ManagedObjectRef {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Display for ManagedObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// Handle on an asynchronous server task.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TaskHandle(pub ManagedObjectRef);

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Error(TaskFault),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Error(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Success => "success",
            TaskState::Error(_) => "error",
        }
    }
}

/// Platform-reported reason for a failed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFault {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub state: TaskState,
    /// Percent complete, when the server reports it.
    pub progress: Option<u8>,
}

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "vsphere")]
pub mod vsphere;
