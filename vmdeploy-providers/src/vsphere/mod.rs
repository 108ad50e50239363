//! vSphere provider speaking the vim25 SOAP API.
//!
//! Only the calls the clone workflow needs are implemented: service content,
//! login/logout, container-view name scans, single property reads,
//! `CloneVM_Task` and task info polling.

mod soap;
mod xml;

use async_trait::async_trait;
use quick_xml::escape::escape;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    CloneSpecification, ConnectionParams, ManagedObjectRef, ObjectCategory, ProviderError,
    Session, TaskFault, TaskHandle, TaskInfo, TaskState, VirtualizationProvider,
};
use soap::SoapClient;
use xml::Element;

/// Page size for `RetrievePropertiesEx` name scans.
const MAX_OBJECTS_PER_PAGE: u32 = 500;

#[derive(Debug, Default, Clone)]
pub struct VsphereProvider;

impl VsphereProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VirtualizationProvider for VsphereProvider {
    fn name(&self) -> &'static str {
        "vsphere"
    }

    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn Session>, ProviderError> {
        let soap = SoapClient::new(&params.host, params.port, params.validate_certs)?;
        debug!(endpoint = soap.endpoint(), "retrieving service content");

        let resp = soap
            .call("RetrieveServiceContent", &request_retrieve_service_content())
            .await?;
        let content = ServiceContent::from_response(&resp)?;

        soap.call(
            "Login",
            &request_login(&content.session_manager, &params.username, &params.password),
        )
        .await?;
        info!(host = %params.host, user = %params.username, "vim25 session established");

        Ok(Arc::new(VsphereSession {
            soap,
            content,
            logged_in: AtomicBool::new(true),
        }))
    }
}

/// The handful of service-content references the workflow uses.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ServiceContent {
    root_folder: ManagedObjectRef,
    property_collector: ManagedObjectRef,
    view_manager: ManagedObjectRef,
    session_manager: ManagedObjectRef,
}

impl ServiceContent {
    fn from_response(resp: &Element) -> Result<Self, ProviderError> {
        let rv = resp
            .child("returnval")
            .ok_or_else(|| ProviderError::Protocol("service content has no returnval".into()))?;
        let field = |name: &str| {
            rv.child(name)
                .and_then(moref_of)
                .ok_or_else(|| ProviderError::Protocol(format!("service content lacks {name}")))
        };
        Ok(Self {
            root_folder: field("rootFolder")?,
            property_collector: field("propertyCollector")?,
            view_manager: field("viewManager")?,
            session_manager: field("sessionManager")?,
        })
    }
}

pub struct VsphereSession {
    soap: SoapClient,
    content: ServiceContent,
    logged_in: AtomicBool,
}

impl VsphereSession {
    fn ensure_connected(&self) -> Result<(), ProviderError> {
        if self.logged_in.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::NotConnected)
        }
    }

    /// Read one property of one object.
    async fn read_property(
        &self,
        obj: &ManagedObjectRef,
        path: &str,
    ) -> Result<Element, ProviderError> {
        let body = request_retrieve_property(&self.content.property_collector, obj, path);
        let resp = self.soap.call("RetrievePropertiesEx", &body).await?;
        let page = parse_object_contents(&resp)?;
        page.objects
            .into_iter()
            .find(|o| &o.obj == obj)
            .and_then(|o| o.props.into_iter().find(|(name, _)| name == path))
            .map(|(_, val)| val)
            .ok_or_else(|| ProviderError::Protocol(format!("{obj} has no property {path}")))
    }

    /// Scan every object of `managed_type` under the root folder for its name,
    /// stopping at the first exact match.
    async fn scan_names(
        &self,
        managed_type: &str,
        name: &str,
    ) -> Result<Option<ManagedObjectRef>, ProviderError> {
        let resp = self
            .soap
            .call(
                "CreateContainerView",
                &request_create_container_view(
                    &self.content.view_manager,
                    &self.content.root_folder,
                    managed_type,
                ),
            )
            .await?;
        let view = resp
            .child("returnval")
            .and_then(moref_of)
            .ok_or_else(|| ProviderError::Protocol("CreateContainerView returned no view".into()))?;

        let found = self.scan_view(&view, managed_type, name).await;

        // The view is server-side state; drop it whatever the scan did.
        if let Err(e) = self
            .soap
            .call("DestroyView", &request_destroy_view(&view))
            .await
        {
            debug!(view = %view, error = %e, "DestroyView failed");
        }
        found
    }

    async fn scan_view(
        &self,
        view: &ManagedObjectRef,
        managed_type: &str,
        name: &str,
    ) -> Result<Option<ManagedObjectRef>, ProviderError> {
        let pc = &self.content.property_collector;
        let resp = self
            .soap
            .call(
                "RetrievePropertiesEx",
                &request_scan_view(pc, view, managed_type),
            )
            .await?;
        let mut page = parse_object_contents(&resp)?;
        let mut scanned = 0usize;

        loop {
            scanned += page.objects.len();
            if let Some(hit) = page.first_named(name) {
                if let Some(token) = page.token.take() {
                    // Release the server-side cursor we will not finish.
                    if let Err(e) = self
                        .soap
                        .call("CancelRetrievePropertiesEx", &request_cancel_retrieve(pc, &token))
                        .await
                    {
                        debug!(token = %token, error = %e, "CancelRetrievePropertiesEx failed");
                    }
                }
                return Ok(Some(hit));
            }
            let Some(token) = page.token.take() else {
                debug!(managed_type, name, scanned, "no object with that name");
                return Ok(None);
            };
            let resp = self
                .soap
                .call(
                    "ContinueRetrievePropertiesEx",
                    &request_continue_retrieve(pc, &token),
                )
                .await?;
            page = parse_object_contents(&resp)?;
        }
    }
}

#[async_trait]
impl Session for VsphereSession {
    async fn find_by_name(
        &self,
        category: ObjectCategory,
        name: &str,
    ) -> Result<Option<ManagedObjectRef>, ProviderError> {
        self.ensure_connected()?;
        self.scan_names(category.managed_type(), name).await
    }

    async fn default_vm_folder(
        &self,
        datacenter: &ManagedObjectRef,
    ) -> Result<ManagedObjectRef, ProviderError> {
        self.ensure_connected()?;
        let val = self.read_property(datacenter, "vmFolder").await?;
        moref_of(&val).ok_or_else(|| ProviderError::Protocol(format!("{datacenter}.vmFolder is not a reference")))
    }

    async fn root_resource_pool(
        &self,
        cluster: &ManagedObjectRef,
    ) -> Result<ManagedObjectRef, ProviderError> {
        self.ensure_connected()?;
        let val = self.read_property(cluster, "resourcePool").await?;
        moref_of(&val).ok_or_else(|| ProviderError::Protocol(format!("{cluster}.resourcePool is not a reference")))
    }

    async fn clone_vm(
        &self,
        template: &ManagedObjectRef,
        folder: &ManagedObjectRef,
        name: &str,
        spec: &CloneSpecification,
    ) -> Result<TaskHandle, ProviderError> {
        self.ensure_connected()?;
        let resp = self
            .soap
            .call("CloneVM_Task", &request_clone_vm(template, folder, name, spec))
            .await?;
        resp.child("returnval")
            .and_then(moref_of)
            .map(TaskHandle)
            .ok_or_else(|| ProviderError::Protocol("CloneVM_Task returned no task".into()))
    }

    async fn task_info(&self, task: &TaskHandle) -> Result<TaskInfo, ProviderError> {
        self.ensure_connected()?;
        let val = self.read_property(&task.0, "info").await?;
        parse_task_info(&val)
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        if !self.logged_in.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.soap
            .call("Logout", &request_logout(&self.content.session_manager))
            .await?;
        info!("vim25 session closed");
        Ok(())
    }
}

// ── Request bodies ─────────────────────────────────────────────────

fn moref_xml(tag: &str, moref: &ManagedObjectRef) -> String {
    format!(
        r#"<{tag} type="{}">{}</{tag}>"#,
        escape(&moref.kind),
        escape(&moref.value)
    )
}

fn request_retrieve_service_content() -> String {
    r#"<RetrieveServiceContent xmlns="urn:vim25"><_this type="ServiceInstance">ServiceInstance</_this></RetrieveServiceContent>"#.to_string()
}

fn request_login(session_manager: &ManagedObjectRef, user: &str, password: &str) -> String {
    format!(
        r#"<Login xmlns="urn:vim25">{}<userName>{}</userName><password>{}</password></Login>"#,
        moref_xml("_this", session_manager),
        escape(user),
        escape(password)
    )
}

fn request_logout(session_manager: &ManagedObjectRef) -> String {
    format!(
        r#"<Logout xmlns="urn:vim25">{}</Logout>"#,
        moref_xml("_this", session_manager)
    )
}

fn request_create_container_view(
    view_manager: &ManagedObjectRef,
    container: &ManagedObjectRef,
    managed_type: &str,
) -> String {
    format!(
        r#"<CreateContainerView xmlns="urn:vim25">{}{}<type>{}</type><recursive>true</recursive></CreateContainerView>"#,
        moref_xml("_this", view_manager),
        moref_xml("container", container),
        escape(managed_type)
    )
}

fn request_destroy_view(view: &ManagedObjectRef) -> String {
    format!(
        r#"<DestroyView xmlns="urn:vim25">{}</DestroyView>"#,
        moref_xml("_this", view)
    )
}

fn request_scan_view(pc: &ManagedObjectRef, view: &ManagedObjectRef, managed_type: &str) -> String {
    format!(
        concat!(
            r#"<RetrievePropertiesEx xmlns="urn:vim25">{pc}<specSet>"#,
            r#"<propSet><type>{ty}</type><pathSet>name</pathSet></propSet>"#,
            r#"<objectSet>{obj}<skip>true</skip>"#,
            r#"<selectSet xsi:type="TraversalSpec"><type>ContainerView</type><path>view</path><skip>false</skip></selectSet>"#,
            r#"</objectSet></specSet><options><maxObjects>{max}</maxObjects></options></RetrievePropertiesEx>"#
        ),
        pc = moref_xml("_this", pc),
        ty = escape(managed_type),
        obj = moref_xml("obj", view),
        max = MAX_OBJECTS_PER_PAGE,
    )
}

fn request_retrieve_property(pc: &ManagedObjectRef, obj: &ManagedObjectRef, path: &str) -> String {
    format!(
        concat!(
            r#"<RetrievePropertiesEx xmlns="urn:vim25">{pc}<specSet>"#,
            r#"<propSet><type>{ty}</type><pathSet>{path}</pathSet></propSet>"#,
            r#"<objectSet>{obj}<skip>false</skip></objectSet>"#,
            r#"</specSet><options></options></RetrievePropertiesEx>"#
        ),
        pc = moref_xml("_this", pc),
        ty = escape(&obj.kind),
        path = escape(path),
        obj = moref_xml("obj", obj),
    )
}

fn request_continue_retrieve(pc: &ManagedObjectRef, token: &str) -> String {
    format!(
        r#"<ContinueRetrievePropertiesEx xmlns="urn:vim25">{}<token>{}</token></ContinueRetrievePropertiesEx>"#,
        moref_xml("_this", pc),
        escape(token)
    )
}

fn request_cancel_retrieve(pc: &ManagedObjectRef, token: &str) -> String {
    format!(
        r#"<CancelRetrievePropertiesEx xmlns="urn:vim25">{}<token>{}</token></CancelRetrievePropertiesEx>"#,
        moref_xml("_this", pc),
        escape(token)
    )
}

fn request_clone_vm(
    template: &ManagedObjectRef,
    folder: &ManagedObjectRef,
    name: &str,
    spec: &CloneSpecification,
) -> String {
    format!(
        r#"<CloneVM_Task xmlns="urn:vim25">{}{}<name>{}</name>{}</CloneVM_Task>"#,
        moref_xml("_this", template),
        moref_xml("folder", folder),
        escape(name),
        clone_spec_xml(spec)
    )
}

/// Serialize a clone spec. Element order follows the vim25 schema sequences,
/// which the server enforces.
fn clone_spec_xml(spec: &CloneSpecification) -> String {
    let mut out = String::from("<spec>");

    out.push_str("<location>");
    out.push_str(&moref_xml("datastore", &spec.location.datastore));
    out.push_str(&moref_xml("pool", &spec.location.pool));
    out.push_str("</location>");
    out.push_str("<template>false</template>");

    let c = &spec.customization;
    out.push_str("<customization>");
    out.push_str(&format!(
        r#"<identity xsi:type="CustomizationLinuxPrep"><hostName xsi:type="CustomizationFixedName"><name>{}</name></hostName><domain>{}</domain></identity>"#,
        escape(&c.identity.host_name),
        escape(&c.identity.domain)
    ));
    out.push_str("<globalIPSettings>");
    for dns in &c.global_ip_settings.dns_server_list {
        out.push_str(&format!("<dnsServerList>{dns}</dnsServerList>"));
    }
    out.push_str("</globalIPSettings>");
    for mapping in &c.nic_setting_map {
        let a = &mapping.adapter;
        out.push_str("<nicSettingMap><adapter>");
        out.push_str(&format!(
            r#"<ip xsi:type="CustomizationFixedIp"><ipAddress>{}</ipAddress></ip><subnetMask>{}</subnetMask>"#,
            a.ip, a.subnet_mask
        ));
        for gw in &a.gateway {
            out.push_str(&format!("<gateway>{gw}</gateway>"));
        }
        for dns in &a.dns_server_list {
            out.push_str(&format!("<dnsServerList>{dns}</dnsServerList>"));
        }
        out.push_str("</adapter></nicSettingMap>");
    }
    out.push_str("</customization>");

    out.push_str(&format!("<powerOn>{}</powerOn>", spec.power_on));
    out.push_str("</spec>");
    out
}

// ── Response parsing ───────────────────────────────────────────────

fn moref_of(el: &Element) -> Option<ManagedObjectRef> {
    let kind = el.attr("type")?;
    if el.text.is_empty() {
        return None;
    }
    Some(ManagedObjectRef::new(kind, el.text.clone()))
}

#[derive(Debug, Default)]
struct ObjectPage {
    objects: Vec<ObjectContent>,
    token: Option<String>,
}

#[derive(Debug)]
struct ObjectContent {
    obj: ManagedObjectRef,
    props: Vec<(String, Element)>,
}

impl ObjectPage {
    fn first_named(&self, name: &str) -> Option<ManagedObjectRef> {
        self.objects
            .iter()
            .find(|o| {
                o.props
                    .iter()
                    .any(|(path, val)| path == "name" && val.text == name)
            })
            .map(|o| o.obj.clone())
    }
}

/// Parse a `RetrievePropertiesExResponse` / `ContinueRetrievePropertiesExResponse`.
/// No `returnval` means no objects matched.
fn parse_object_contents(resp: &Element) -> Result<ObjectPage, ProviderError> {
    let Some(rv) = resp.child("returnval") else {
        return Ok(ObjectPage::default());
    };
    let token = rv.child_text("token").map(str::to_string);
    let mut objects = Vec::new();
    for oc in rv.children_named("objects") {
        let obj = oc
            .child("obj")
            .and_then(moref_of)
            .ok_or_else(|| ProviderError::Protocol("ObjectContent without obj".into()))?;
        let props = oc
            .children_named("propSet")
            .filter_map(|p| Some((p.child_text("name")?.to_string(), p.child("val")?.clone())))
            .collect();
        objects.push(ObjectContent { obj, props });
    }
    Ok(ObjectPage { objects, token })
}

fn parse_task_info(info: &Element) -> Result<TaskInfo, ProviderError> {
    let state = match info.child_text("state") {
        Some("queued") => TaskState::Queued,
        Some("running") => TaskState::Running,
        Some("success") => TaskState::Success,
        Some("error") => {
            let err = info.child("error");
            let kind = err
                .and_then(|e| e.child("fault"))
                .and_then(|f| f.xsi_type())
                .unwrap_or("SystemError")
                .to_string();
            let message = err
                .and_then(|e| e.child_text("localizedMessage"))
                .filter(|m| !m.is_empty())
                .unwrap_or("task failed without a message")
                .to_string();
            TaskState::Error(TaskFault { kind, message })
        }
        other => {
            return Err(ProviderError::Protocol(format!(
                "unknown task state {other:?}"
            )))
        }
    };
    let progress = info
        .child_text("progress")
        .and_then(|p| p.parse::<u8>().ok());
    Ok(TaskInfo { state, progress })
}
