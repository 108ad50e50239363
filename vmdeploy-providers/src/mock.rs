use crate::{
    CloneSpecification, ConnectionParams, ManagedObjectRef, ObjectCategory, ProviderError,
    Session, TaskFault, TaskHandle, TaskInfo, TaskState, VirtualizationProvider,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// In-memory stand-in for a management server.
///
/// Used by the test-suite and by `--provider mock` dry runs. Cloning the
/// provider shares its state, so a test can keep one handle to inspect the
/// journal while the code under test owns the other.
#[derive(Clone)]
pub struct MockProvider {
    state: Arc<Mutex<MockState>>,
}

/// Scripted inventory and behavior for [`MockProvider`].
#[derive(Debug, Clone)]
pub struct MockInventory {
    objects: Vec<MockObject>,
    credentials: Option<(String, String)>,
    task_failures: HashMap<String, TaskFault>,
    stalled: Vec<String>,
    queued_polls: u32,
    running_polls: u32,
}

#[derive(Debug, Clone)]
struct MockObject {
    category: ObjectCategory,
    name: String,
    moref: ManagedObjectRef,
    /// VM folder for datacenters, root pool for clusters.
    child: Option<ManagedObjectRef>,
}

/// Everything the mock was asked to do, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Connect { username: String },
    Find { category: ObjectCategory, name: String },
    DefaultVmFolder { datacenter: ManagedObjectRef },
    RootResourcePool { cluster: ManagedObjectRef },
    Clone {
        template: ManagedObjectRef,
        folder: ManagedObjectRef,
        name: String,
        spec: CloneSpecification,
    },
    Poll { task: String },
    Disconnect,
}

#[derive(Debug)]
struct MockState {
    inventory: MockInventory,
    journal: Vec<MockCall>,
    tasks: HashMap<String, MockTask>,
    next_id: u32,
    connected: bool,
}

#[derive(Debug)]
struct MockTask {
    vm_name: String,
    polls: u32,
}

impl Default for MockInventory {
    fn default() -> Self {
        Self {
            objects: Vec::new(),
            credentials: None,
            task_failures: HashMap::new(),
            stalled: Vec::new(),
            queued_polls: 1,
            running_polls: 1,
        }
    }
}

impl MockInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(self, name: &str) -> Self {
        self.with_object(ObjectCategory::Template, name)
    }

    pub fn with_datacenter(self, name: &str) -> Self {
        self.with_object(ObjectCategory::Datacenter, name)
    }

    pub fn with_cluster(self, name: &str) -> Self {
        self.with_object(ObjectCategory::Cluster, name)
    }

    pub fn with_datastore(self, name: &str) -> Self {
        self.with_object(ObjectCategory::Datastore, name)
    }

    /// A VM that already exists; cloning onto its name is rejected.
    pub fn with_existing_vm(self, name: &str) -> Self {
        self.with_object(ObjectCategory::Template, name)
    }

    /// Add an object unless one with the same category and name exists.
    pub fn ensure(self, category: ObjectCategory, name: &str) -> Self {
        if self.lookup(category, name).is_some() {
            return self;
        }
        self.with_object(category, name)
    }

    /// Add an object even if the name is taken (first one still wins lookups).
    pub fn with_object(mut self, category: ObjectCategory, name: &str) -> Self {
        let idx = self.objects.len() + 1;
        let (moref, child) = match category {
            ObjectCategory::Template => (ManagedObjectRef::new("VirtualMachine", format!("vm-{idx}")), None),
            ObjectCategory::Datacenter => (
                ManagedObjectRef::new("Datacenter", format!("datacenter-{idx}")),
                Some(ManagedObjectRef::new("Folder", format!("group-v{idx}"))),
            ),
            ObjectCategory::Cluster => (
                ManagedObjectRef::new("ClusterComputeResource", format!("domain-c{idx}")),
                Some(ManagedObjectRef::new("ResourcePool", format!("resgroup-{idx}"))),
            ),
            ObjectCategory::Datastore => (ManagedObjectRef::new("Datastore", format!("datastore-{idx}")), None),
        };
        self.objects.push(MockObject {
            category,
            name: name.to_string(),
            moref,
            child,
        });
        self
    }

    /// The named datacenter answers lookups but has no VM folder, so asking
    /// for it faults.
    pub fn without_vm_folder(mut self, datacenter: &str) -> Self {
        for o in self.objects.iter_mut() {
            if o.category == ObjectCategory::Datacenter && o.name == datacenter {
                o.child = None;
            }
        }
        self
    }

    /// Only accept this username/password pair. Without it any login works.
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    /// The clone task for `vm_name` ends in error with the given fault.
    pub fn fail_task(mut self, vm_name: &str, kind: &str, message: &str) -> Self {
        self.task_failures.insert(
            vm_name.to_string(),
            TaskFault {
                kind: kind.to_string(),
                message: message.to_string(),
            },
        );
        self
    }

    /// The clone task for `vm_name` never leaves the running state.
    pub fn stall_task(mut self, vm_name: &str) -> Self {
        self.stalled.push(vm_name.to_string());
        self
    }

    /// How many polls a task reports queued, then running, before finishing.
    pub fn with_task_progress(mut self, queued_polls: u32, running_polls: u32) -> Self {
        self.queued_polls = queued_polls;
        self.running_polls = running_polls;
        self
    }

    fn lookup(&self, category: ObjectCategory, name: &str) -> Option<&MockObject> {
        self.objects
            .iter()
            .find(|o| o.category == category && o.name == name)
    }

    fn child_of(&self, parent: &ManagedObjectRef) -> Option<ManagedObjectRef> {
        self.objects
            .iter()
            .find(|o| &o.moref == parent)
            .and_then(|o| o.child.clone())
    }
}

impl MockProvider {
    pub fn new(inventory: MockInventory) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                inventory,
                journal: Vec::new(),
                tasks: HashMap::new(),
                next_id: 1,
                connected: false,
            })),
        }
    }

    pub fn journal(&self) -> Vec<MockCall> {
        lock(&self.state).journal.clone()
    }

    /// Names and specs of every clone request that reached the server.
    pub fn clone_requests(&self) -> Vec<(String, CloneSpecification)> {
        lock(&self.state)
            .journal
            .iter()
            .filter_map(|c| match c {
                MockCall::Clone { name, spec, .. } => Some((name.clone(), spec.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Connect { .. }))
    }

    pub fn disconnect_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Disconnect))
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        lock(&self.state).journal.iter().filter(|c| pred(c)).count()
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl VirtualizationProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn Session>, ProviderError> {
        let mut state = lock(&self.state);
        state.journal.push(MockCall::Connect {
            username: params.username.clone(),
        });
        if let Some((user, password)) = &state.inventory.credentials {
            if user != &params.username || password != &params.password {
                return Err(ProviderError::Authentication(
                    "Cannot complete login due to an incorrect user name or password.".into(),
                ));
            }
        }
        state.connected = true;
        Ok(Arc::new(MockSession {
            state: self.state.clone(),
        }))
    }
}

struct MockSession {
    state: Arc<Mutex<MockState>>,
}

impl MockSession {
    fn connected(&self) -> Result<MutexGuard<'_, MockState>, ProviderError> {
        let state = lock(&self.state);
        if !state.connected {
            return Err(ProviderError::NotConnected);
        }
        Ok(state)
    }
}

#[async_trait]
impl Session for MockSession {
    async fn find_by_name(
        &self,
        category: ObjectCategory,
        name: &str,
    ) -> Result<Option<ManagedObjectRef>, ProviderError> {
        let mut state = self.connected()?;
        state.journal.push(MockCall::Find {
            category,
            name: name.to_string(),
        });
        Ok(state.inventory.lookup(category, name).map(|o| o.moref.clone()))
    }

    async fn default_vm_folder(
        &self,
        datacenter: &ManagedObjectRef,
    ) -> Result<ManagedObjectRef, ProviderError> {
        let mut state = self.connected()?;
        state.journal.push(MockCall::DefaultVmFolder {
            datacenter: datacenter.clone(),
        });
        state
            .inventory
            .child_of(datacenter)
            .ok_or_else(|| ProviderError::fault("ManagedObjectNotFound", format!("{datacenter} has no vmFolder")))
    }

    async fn root_resource_pool(
        &self,
        cluster: &ManagedObjectRef,
    ) -> Result<ManagedObjectRef, ProviderError> {
        let mut state = self.connected()?;
        state.journal.push(MockCall::RootResourcePool {
            cluster: cluster.clone(),
        });
        state
            .inventory
            .child_of(cluster)
            .ok_or_else(|| ProviderError::fault("ManagedObjectNotFound", format!("{cluster} has no resourcePool")))
    }

    async fn clone_vm(
        &self,
        template: &ManagedObjectRef,
        folder: &ManagedObjectRef,
        name: &str,
        spec: &CloneSpecification,
    ) -> Result<TaskHandle, ProviderError> {
        let mut state = self.connected()?;
        state.journal.push(MockCall::Clone {
            template: template.clone(),
            folder: folder.clone(),
            name: name.to_string(),
            spec: spec.clone(),
        });

        if state.inventory.lookup(ObjectCategory::Template, name).is_some() {
            return Err(ProviderError::fault(
                "DuplicateName",
                format!("The name '{name}' already exists."),
            ));
        }
        // The VM exists as soon as the task is created, so a second clone with
        // the same name in this session is rejected too.
        state.inventory = std::mem::take(&mut state.inventory).with_existing_vm(name);

        let id = format!("task-{}", state.next_id);
        state.next_id += 1;
        state.tasks.insert(
            id.clone(),
            MockTask {
                vm_name: name.to_string(),
                polls: 0,
            },
        );
        Ok(TaskHandle(ManagedObjectRef::new("Task", id)))
    }

    async fn task_info(&self, task: &TaskHandle) -> Result<TaskInfo, ProviderError> {
        let mut state = self.connected()?;
        state.journal.push(MockCall::Poll {
            task: task.0.value.clone(),
        });

        let queued = state.inventory.queued_polls;
        let running = state.inventory.running_polls;
        let Some(entry) = state.tasks.get_mut(&task.0.value) else {
            return Err(ProviderError::fault(
                "ManagedObjectNotFound",
                format!("task {task} does not exist"),
            ));
        };
        entry.polls += 1;
        let polls = entry.polls;
        let vm_name = entry.vm_name.clone();

        let stalled = state.inventory.stalled.contains(&vm_name);
        let info = if polls <= queued {
            TaskInfo {
                state: TaskState::Queued,
                progress: None,
            }
        } else if stalled || polls <= queued + running {
            TaskInfo {
                state: TaskState::Running,
                progress: Some(50),
            }
        } else if let Some(fault) = state.inventory.task_failures.get(&vm_name) {
            TaskInfo {
                state: TaskState::Error(fault.clone()),
                progress: None,
            }
        } else {
            TaskInfo {
                state: TaskState::Success,
                progress: Some(100),
            }
        };
        Ok(info)
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        let mut state = lock(&self.state);
        if state.connected {
            state.connected = false;
            state.journal.push(MockCall::Disconnect);
        }
        Ok(())
    }
}
