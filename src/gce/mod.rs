//! Compute Engine and Resource Manager REST implementation of [`Backend`].

mod error;
mod wire;

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::backend::{
    Backend, BackendFuture, FirewallRule, Instance, InstanceRef, InstanceSpec, OperationHandle,
    OperationScope, OperationStatus, ProjectInfo, ProviderError, ZoneInfo,
};
use crate::config::GceConfig;

pub use error::GceError;
use wire::{
    AggregatedInstances, FirewallInsert, ImageResource, InstanceInsert, InstanceResource,
    OperationResource, ProjectSearch, ZoneList,
};

const USER_AGENT: &str = concat!("gcevm/", env!("CARGO_PKG_VERSION"));

/// Backend that talks to the Google Cloud REST APIs with a bearer token.
#[derive(Clone, Debug)]
pub struct GceBackend {
    http: Client,
    token: String,
    compute_base: String,
    resource_manager_base: String,
}

impl GceBackend {
    /// Constructs a backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GceError::Config`] when the configuration fails validation
    /// and [`GceError::Http`] when the HTTP client cannot be built.
    pub fn new(config: &GceConfig) -> Result<Self, GceError> {
        config
            .validate()
            .map_err(|err| GceError::Config(err.to_string()))?;
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| GceError::Http {
                context: String::from("build HTTP client"),
                message: err.to_string(),
            })?;
        Ok(Self {
            http,
            token: config.access_token.clone(),
            compute_base: config.compute_base_url.trim_end_matches('/').to_owned(),
            resource_manager_base: config
                .resource_manager_base_url
                .trim_end_matches('/')
                .to_owned(),
        })
    }

    fn project_url(&self, project: &str, path: &str) -> String {
        format!("{}/projects/{project}/{path}", self.compute_base)
    }

    fn instance_url(&self, project: &str, instance: &InstanceRef) -> String {
        self.project_url(
            project,
            &format!("zones/{}/instances/{}", instance.zone, instance.name),
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http.request(method, url).bearer_auth(&self.token)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context: &str,
    ) -> Result<T, GceError> {
        let response = request.send().await.map_err(|err| GceError::Http {
            context: context.to_owned(),
            message: err.to_string(),
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|err| GceError::Http {
            context: context.to_owned(),
            message: err.to_string(),
        })?;
        if !status.is_success() {
            return Err(GceError::from_status(context, status.as_u16(), &body));
        }
        serde_json::from_str(&body).map_err(|err| GceError::Decode {
            context: context.to_owned(),
            message: err.to_string(),
        })
    }

    async fn issue(
        &self,
        request: RequestBuilder,
        context: &str,
        project: &str,
        scope: OperationScope,
    ) -> Result<OperationHandle, GceError> {
        let operation: OperationResource = self.send(request, context).await?;
        debug!(operation = %operation.name, context, "operation issued");
        Ok(OperationHandle {
            name: operation.name,
            project: project.to_owned(),
            scope,
        })
    }

    async fn fetch_instance(
        &self,
        project: &str,
        instance: &InstanceRef,
    ) -> Result<Instance, GceError> {
        let url = self.instance_url(project, instance);
        let resource: InstanceResource = self
            .send(self.request(Method::GET, &url), "get instance")
            .await?;
        Ok(resource.into_instance(&instance.zone))
    }

    async fn fetch_all_instances(&self, project: &str) -> Result<Vec<Instance>, GceError> {
        let url = self.project_url(project, "aggregated/instances");
        let mut instances = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.request(Method::GET, &url);
            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("pageToken", token)]);
            }
            let page: AggregatedInstances = self.send(request, "list instances").await?;
            page_token = page.next_page_token.clone().filter(|token| !token.is_empty());
            instances.extend(page.into_instances());
            if page_token.is_none() {
                return Ok(instances);
            }
        }
    }

    async fn fetch_zones(&self, project: &str) -> Result<Vec<ZoneInfo>, GceError> {
        let url = self.project_url(project, "zones");
        let mut zones = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.request(Method::GET, &url);
            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("pageToken", token)]);
            }
            let page: ZoneList = self.send(request, "list zones").await?;
            zones.extend(page.items.into_iter().map(ZoneInfo::from));
            page_token = page.next_page_token.filter(|token| !token.is_empty());
            if page_token.is_none() {
                return Ok(zones);
            }
        }
    }

    async fn fetch_projects(&self) -> Result<Vec<ProjectInfo>, GceError> {
        let url = format!("{}/projects:search", self.resource_manager_base);
        let mut projects = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.request(Method::GET, &url);
            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("pageToken", token)]);
            }
            let page: ProjectSearch = self.send(request, "search projects").await?;
            projects.extend(page.projects.into_iter().map(ProjectInfo::from));
            page_token = page.next_page_token.filter(|token| !token.is_empty());
            if page_token.is_none() {
                return Ok(projects);
            }
        }
    }

    async fn instance_action(
        &self,
        project: &str,
        instance: &InstanceRef,
        action: &str,
    ) -> Result<OperationHandle, GceError> {
        let url = format!("{}/{action}", self.instance_url(project, instance));
        self.issue(
            self.request(Method::POST, &url),
            &format!("{action} instance"),
            project,
            OperationScope::Zone(instance.zone.clone()),
        )
        .await
    }

    async fn poll_operation(&self, handle: &OperationHandle) -> Result<OperationStatus, GceError> {
        let path = match &handle.scope {
            OperationScope::Zone(zone) => format!("zones/{zone}/operations/{}/wait", handle.name),
            OperationScope::Global => format!("global/operations/{}/wait", handle.name),
        };
        let url = self.project_url(&handle.project, &path);
        let operation: OperationResource = self
            .send(self.request(Method::POST, &url), "wait on operation")
            .await?;
        Ok(operation.into_status())
    }
}

impl Backend for GceBackend {
    fn get_instance<'a>(
        &'a self,
        project: &'a str,
        instance: &'a InstanceRef,
    ) -> BackendFuture<'a, Instance> {
        Box::pin(async move {
            self.fetch_instance(project, instance)
                .await
                .map_err(ProviderError::from)
        })
    }

    fn list_instances<'a>(&'a self, project: &'a str) -> BackendFuture<'a, Vec<Instance>> {
        Box::pin(async move {
            self.fetch_all_instances(project)
                .await
                .map_err(ProviderError::from)
        })
    }

    fn insert_instance<'a>(
        &'a self,
        project: &'a str,
        spec: &'a InstanceSpec,
    ) -> BackendFuture<'a, OperationHandle> {
        Box::pin(async move {
            let url = self.project_url(project, &format!("zones/{}/instances", spec.zone));
            let request = self
                .request(Method::POST, &url)
                .json(&InstanceInsert::from(spec));
            self.issue(
                request,
                "insert instance",
                project,
                OperationScope::Zone(spec.zone.clone()),
            )
            .await
            .map_err(ProviderError::from)
        })
    }

    fn delete_instance<'a>(
        &'a self,
        project: &'a str,
        instance: &'a InstanceRef,
    ) -> BackendFuture<'a, OperationHandle> {
        Box::pin(async move {
            let url = self.instance_url(project, instance);
            self.issue(
                self.request(Method::DELETE, &url),
                "delete instance",
                project,
                OperationScope::Zone(instance.zone.clone()),
            )
            .await
            .map_err(ProviderError::from)
        })
    }

    fn start_instance<'a>(
        &'a self,
        project: &'a str,
        instance: &'a InstanceRef,
    ) -> BackendFuture<'a, OperationHandle> {
        Box::pin(async move {
            self.instance_action(project, instance, "start")
                .await
                .map_err(ProviderError::from)
        })
    }

    fn stop_instance<'a>(
        &'a self,
        project: &'a str,
        instance: &'a InstanceRef,
    ) -> BackendFuture<'a, OperationHandle> {
        Box::pin(async move {
            self.instance_action(project, instance, "stop")
                .await
                .map_err(ProviderError::from)
        })
    }

    fn delete_disk<'a>(
        &'a self,
        project: &'a str,
        zone: &'a str,
        disk: &'a str,
    ) -> BackendFuture<'a, OperationHandle> {
        Box::pin(async move {
            let url = self.project_url(project, &format!("zones/{zone}/disks/{disk}"));
            self.issue(
                self.request(Method::DELETE, &url),
                "delete disk",
                project,
                OperationScope::Zone(zone.to_owned()),
            )
            .await
            .map_err(ProviderError::from)
        })
    }

    fn image_from_family<'a>(
        &'a self,
        image_project: &'a str,
        family: &'a str,
    ) -> BackendFuture<'a, String> {
        Box::pin(async move {
            let url = self.project_url(image_project, &format!("global/images/family/{family}"));
            let image: ImageResource = self
                .send(self.request(Method::GET, &url), "resolve image family")
                .await?;
            Ok(image.self_link)
        })
    }

    fn insert_firewall<'a>(
        &'a self,
        project: &'a str,
        rule: &'a FirewallRule,
    ) -> BackendFuture<'a, OperationHandle> {
        Box::pin(async move {
            let url = self.project_url(project, "global/firewalls");
            let request = self
                .request(Method::POST, &url)
                .json(&FirewallInsert::from(rule));
            self.issue(request, "insert firewall rule", project, OperationScope::Global)
                .await
                .map_err(ProviderError::from)
        })
    }

    fn delete_firewall<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> BackendFuture<'a, OperationHandle> {
        Box::pin(async move {
            let url = self.project_url(project, &format!("global/firewalls/{name}"));
            self.issue(
                self.request(Method::DELETE, &url),
                "delete firewall rule",
                project,
                OperationScope::Global,
            )
            .await
            .map_err(ProviderError::from)
        })
    }

    fn wait_operation<'a>(
        &'a self,
        handle: &'a OperationHandle,
    ) -> BackendFuture<'a, OperationStatus> {
        Box::pin(async move {
            self.poll_operation(handle)
                .await
                .map_err(ProviderError::from)
        })
    }

    fn list_zones<'a>(&'a self, project: &'a str) -> BackendFuture<'a, Vec<ZoneInfo>> {
        Box::pin(async move {
            self.fetch_zones(project)
                .await
                .map_err(ProviderError::from)
        })
    }

    fn search_projects(&self) -> BackendFuture<'_, Vec<ProjectInfo>> {
        Box::pin(async move {
            self.fetch_projects()
                .await
                .map_err(ProviderError::from)
        })
    }
}
