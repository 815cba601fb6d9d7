//! OpenStack provider over the Keystone, Nova, Octavia and Cinder REST APIs.
//!
//! Authentication uses Keystone v3 password credentials scoped to a single
//! project. The service catalog returned with the token supplies the
//! compute, load-balancer and block-storage endpoints. A request that comes
//! back 401 re-authenticates once and is retried.
//!
//! Listings follow the `rel="next"` link each page carries until the
//! service stops handing one out.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::capability::*;
use crate::error::{CloudError, CloudResult};
use crate::types::*;

/// Upper bound on pages fetched for one listing.
const MAX_PAGES: usize = 1000;

const VOLUME_SERVICE_TYPES: &[&str] = &["volumev3", "block-storage", "volumev2", "volume"];

/// Credentials read from the standard `OS_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenStackCredentials {
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub user_domain_name: String,
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    pub project_domain_name: String,
    pub region: Option<String>,
    /// Catalog interface to use (`public`, `internal` or `admin`).
    pub interface: String,
}

impl OpenStackCredentials {
    /// Read credentials from `OS_*` variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CloudResult<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| CloudError::Auth(format!("{key} is not set")))
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let creds = Self {
            auth_url: required("OS_AUTH_URL")?,
            username: required("OS_USERNAME")?,
            password: required("OS_PASSWORD")?,
            user_domain_name: optional("OS_USER_DOMAIN_NAME").unwrap_or_else(|| "Default".into()),
            project_id: optional("OS_PROJECT_ID"),
            project_name: optional("OS_PROJECT_NAME"),
            project_domain_name: optional("OS_PROJECT_DOMAIN_NAME")
                .unwrap_or_else(|| "Default".into()),
            region: optional("OS_REGION_NAME"),
            interface: optional("OS_INTERFACE").unwrap_or_else(|| "public".into()),
        };
        if creds.project_id.is_none() && creds.project_name.is_none() {
            return Err(CloudError::Auth(
                "one of OS_PROJECT_ID or OS_PROJECT_NAME must be set".to_string(),
            ));
        }
        Ok(creds)
    }

    pub fn from_env() -> CloudResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn auth_body(&self) -> Value {
        let project = match &self.project_id {
            Some(id) => json!({ "id": id }),
            None => json!({
                "name": self.project_name,
                "domain": { "name": self.project_domain_name },
            }),
        };
        json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": self.username,
                            "domain": { "name": self.user_domain_name },
                            "password": self.password,
                        }
                    }
                },
                "scope": { "project": project }
            }
        })
    }
}

/// Ensure the identity URL points at the v3 API.
pub fn normalize_auth_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with("/v3") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v3")
    }
}

// ── Keystone wire types ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    project: Option<Project>,
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEndpoint {
    interface: String,
    region: Option<String>,
    region_id: Option<String>,
    url: String,
}

fn select_endpoint(
    catalog: &[CatalogEntry],
    service_types: &[&str],
    interface: &str,
    region: Option<&str>,
) -> Option<String> {
    for service_type in service_types {
        let Some(entry) = catalog.iter().find(|e| e.service_type == *service_type) else {
            continue;
        };
        let found = entry.endpoints.iter().find(|ep| {
            ep.interface == interface
                && region.is_none_or(|r| {
                    ep.region.as_deref() == Some(r) || ep.region_id.as_deref() == Some(r)
                })
        });
        if let Some(ep) = found {
            return Some(ep.url.trim_end_matches('/').to_string());
        }
    }
    None
}

// ── Service wire types ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    #[serde(default)]
    rel: String,
}

fn next_link(links: &[Link]) -> Option<&str> {
    links
        .iter()
        .find(|l| l.rel == "next")
        .map(|l| l.href.as_str())
}

/// One page of a collection listing.
trait Page: DeserializeOwned {
    type Item;

    fn into_parts(self) -> (Vec<Self::Item>, Vec<Link>);
}

#[derive(Debug, Deserialize)]
struct ServersResponse {
    servers: Vec<Instance>,
    #[serde(default)]
    servers_links: Vec<Link>,
}

impl Page for ServersResponse {
    type Item = Instance;

    fn into_parts(self) -> (Vec<Instance>, Vec<Link>) {
        (self.servers, self.servers_links)
    }
}

#[derive(Debug, Deserialize)]
struct ComputeQuotaResponse {
    quota_set: ComputeQuotaSet,
}

#[derive(Debug, Deserialize)]
struct ComputeQuotaSet {
    #[serde(default)]
    ram: QuotaUsage,
    #[serde(default)]
    security_groups: QuotaUsage,
    #[serde(default)]
    cores: QuotaUsage,
    #[serde(default)]
    instances: QuotaUsage,
    #[serde(default)]
    server_groups: QuotaUsage,
}

#[derive(Debug, Deserialize)]
struct VolumeQuotaResponse {
    quota_set: VolumeQuotaSet,
}

#[derive(Debug, Deserialize)]
struct VolumeQuotaSet {
    #[serde(default)]
    volumes: QuotaUsage,
    #[serde(default)]
    gigabytes: QuotaUsage,
}

#[derive(Debug, Deserialize)]
struct LoadBalancersResponse {
    loadbalancers: Vec<LoadBalancerWire>,
    #[serde(default)]
    loadbalancers_links: Vec<Link>,
}

impl Page for LoadBalancersResponse {
    type Item = LoadBalancerWire;

    fn into_parts(self) -> (Vec<LoadBalancerWire>, Vec<Link>) {
        (self.loadbalancers, self.loadbalancers_links)
    }
}

#[derive(Debug, Deserialize)]
struct LoadBalancerWire {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    provisioning_status: String,
    #[serde(default)]
    operating_status: String,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    stats: LoadBalancerStats,
}

#[derive(Debug, Deserialize)]
struct PoolsResponse {
    pools: Vec<PoolWire>,
    #[serde(default)]
    pools_links: Vec<Link>,
}

impl Page for PoolsResponse {
    type Item = PoolWire;

    fn into_parts(self) -> (Vec<PoolWire>, Vec<Link>) {
        (self.pools, self.pools_links)
    }
}

#[derive(Debug, Deserialize)]
struct PoolWire {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    loadbalancers: Vec<IdRef>,
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MembersResponse {
    members: Vec<MemberWire>,
    #[serde(default)]
    members_links: Vec<Link>,
}

impl Page for MembersResponse {
    type Item = MemberWire;

    fn into_parts(self) -> (Vec<MemberWire>, Vec<Link>) {
        (self.members, self.members_links)
    }
}

#[derive(Debug, Deserialize)]
struct MemberWire {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    provisioning_status: String,
    #[serde(default)]
    operating_status: String,
    #[serde(default)]
    weight: u32,
}

impl From<LoadBalancerWire> for LoadBalancer {
    fn from(w: LoadBalancerWire) -> Self {
        Self {
            id: w.id,
            name: w.name,
            provisioning_status: w.provisioning_status,
            operating_status: w.operating_status,
        }
    }
}

impl From<PoolWire> for Pool {
    fn from(w: PoolWire) -> Self {
        Self {
            id: w.id,
            name: w.name,
            load_balancer_ids: w.loadbalancers.into_iter().map(|r| r.id).collect(),
        }
    }
}

impl From<MemberWire> for PoolMember {
    fn from(w: MemberWire) -> Self {
        Self {
            id: w.id,
            name: w.name,
            provisioning_status: w.provisioning_status,
            operating_status: w.operating_status,
            weight: w.weight,
        }
    }
}

// ── Client ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Service {
    Compute,
    LoadBalancer,
    Volume,
}

#[derive(Debug, Clone)]
struct Endpoints {
    compute: String,
    load_balancer: Option<String>,
    volume: Option<String>,
}

/// Authenticated OpenStack session.
pub struct OpenStackCloud {
    http: reqwest::Client,
    credentials: OpenStackCredentials,
    project: Project,
    endpoints: Endpoints,
    token: RwLock<String>,
}

impl OpenStackCloud {
    /// Authenticate and resolve service endpoints.
    pub async fn connect(credentials: OpenStackCredentials) -> CloudResult<Arc<Self>> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| CloudError::Init(e.to_string()))?;
        let (token, body) = authenticate(&http, &credentials).await?;

        let region = credentials.region.as_deref();
        let interface = credentials.interface.as_str();
        let compute = select_endpoint(&body.catalog, &["compute"], interface, region)
            .ok_or_else(|| CloudError::EndpointNotFound("compute".to_string()))?;
        let endpoints = Endpoints {
            compute,
            load_balancer: select_endpoint(&body.catalog, &["load-balancer"], interface, region),
            volume: select_endpoint(&body.catalog, VOLUME_SERVICE_TYPES, interface, region),
        };

        let project = body.project.unwrap_or_else(|| Project {
            id: credentials.project_id.clone().unwrap_or_default(),
            name: credentials.project_name.clone().unwrap_or_default(),
        });

        info!(
            project = %project.name,
            compute = %endpoints.compute,
            load_balancer = endpoints.load_balancer.is_some(),
            volume = endpoints.volume.is_some(),
            "authenticated against keystone"
        );

        Ok(Arc::new(Self {
            http,
            credentials,
            project,
            endpoints,
            token: RwLock::new(token),
        }))
    }

    fn base_url(&self, service: Service) -> CloudResult<&str> {
        match service {
            Service::Compute => Ok(&self.endpoints.compute),
            Service::LoadBalancer => self
                .endpoints
                .load_balancer
                .as_deref()
                .ok_or_else(|| CloudError::EndpointNotFound("load-balancer".to_string())),
            Service::Volume => self
                .endpoints
                .volume
                .as_deref()
                .ok_or_else(|| CloudError::EndpointNotFound("volume".to_string())),
        }
    }

    async fn reauthenticate(&self) -> CloudResult<()> {
        let (token, _) = authenticate(&self.http, &self.credentials).await?;
        *self.token.write().await = token;
        debug!("keystone token refreshed");
        Ok(())
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
    ) -> CloudResult<reqwest::Response> {
        let token = self.token.read().await.clone();
        let mut request = self
            .http
            .request(method.clone(), url)
            .header("X-Auth-Token", token)
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Send a request, retrying once with a fresh token on 401.
    async fn call(
        &self,
        service: Service,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> CloudResult<reqwest::Response> {
        let url = format!("{}{path}", self.base_url(service)?);
        self.call_url(method, url, body).await
    }

    async fn call_url(
        &self,
        method: Method,
        url: String,
        body: Option<&Value>,
    ) -> CloudResult<reqwest::Response> {
        let mut response = self.send_once(&method, &url, body).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.reauthenticate().await?;
            response = self.send_once(&method, &url, body).await?;
        }

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CloudError::Http {
                method: method.to_string(),
                url,
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, service: Service, path: &str) -> CloudResult<T> {
        let response = self.call(service, Method::GET, path, None).await?;
        Ok(response.json::<T>().await?)
    }

    /// Fetch every page of a listing starting at `path`.
    async fn get_all<P: Page>(&self, service: Service, path: &str) -> CloudResult<Vec<P::Item>> {
        let base = self.base_url(service)?;
        let mut url = format!("{base}{path}");
        let mut items = Vec::new();
        for page in 1..=MAX_PAGES {
            let response = self.call_url(Method::GET, url.clone(), None).await?;
            let (batch, links) = response.json::<P>().await?.into_parts();
            items.extend(batch);
            match next_link(&links) {
                Some(next) if next != url => {
                    url = resolve_link(base, next);
                }
                _ => break,
            }
            if page == MAX_PAGES {
                warn!(%url, pages = MAX_PAGES, "listing truncated");
            }
        }
        Ok(items)
    }
}

/// Absolute URL for a pagination link, which some services return relative
/// to the endpoint.
fn resolve_link(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), href.trim_start_matches('/'))
    }
}

async fn authenticate(
    http: &reqwest::Client,
    credentials: &OpenStackCredentials,
) -> CloudResult<(String, TokenBody)> {
    let url = format!("{}/auth/tokens", normalize_auth_url(&credentials.auth_url));
    let response = http
        .post(&url)
        .json(&credentials.auth_body())
        .send()
        .await
        .map_err(|e| CloudError::Auth(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(CloudError::Auth(format!("{url} returned {status}: {text}")));
    }

    let token = response
        .headers()
        .get("X-Subject-Token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| CloudError::Auth("response carried no X-Subject-Token".to_string()))?;
    let body: TokenResponse = response.json().await?;
    Ok((token, body.token))
}

fn servers_path(filter: &InstanceFilter) -> String {
    match &filter.status {
        Some(status) => format!("/servers/detail?status={}", status.as_str()),
        None => "/servers/detail".to_string(),
    }
}

impl InstanceLister for OpenStackCloud {
    fn list_instances<'a>(
        &'a self,
        filter: &'a InstanceFilter,
    ) -> BoxFuture<'a, CloudResult<Vec<Instance>>> {
        Box::pin(async move {
            self.get_all::<ServersResponse>(Service::Compute, &servers_path(filter))
                .await
        })
    }
}

impl InstanceStarter for OpenStackCloud {
    fn start_instance<'a>(&'a self, id: &'a str) -> BoxFuture<'a, CloudResult<()>> {
        Box::pin(async move {
            let body = json!({ "os-start": null });
            self.call(
                Service::Compute,
                Method::POST,
                &format!("/servers/{id}/action"),
                Some(&body),
            )
            .await?;
            Ok(())
        })
    }
}

impl LoadBalancerReader for OpenStackCloud {
    fn list_load_balancers(&self) -> BoxFuture<'_, CloudResult<Vec<LoadBalancer>>> {
        Box::pin(async move {
            let lbs = self
                .get_all::<LoadBalancersResponse>(Service::LoadBalancer, "/v2/lbaas/loadbalancers")
                .await?;
            Ok(lbs.into_iter().map(Into::into).collect())
        })
    }

    fn load_balancer_stats<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, CloudResult<LoadBalancerStats>> {
        Box::pin(async move {
            let resp: StatsResponse = self
                .get_json(
                    Service::LoadBalancer,
                    &format!("/v2/lbaas/loadbalancers/{id}/stats"),
                )
                .await?;
            Ok(resp.stats)
        })
    }

    fn list_pools(&self) -> BoxFuture<'_, CloudResult<Vec<Pool>>> {
        Box::pin(async move {
            let pools = self
                .get_all::<PoolsResponse>(Service::LoadBalancer, "/v2/lbaas/pools")
                .await?;
            Ok(pools.into_iter().map(Into::into).collect())
        })
    }

    fn list_pool_members<'a>(
        &'a self,
        pool_id: &'a str,
    ) -> BoxFuture<'a, CloudResult<Vec<PoolMember>>> {
        Box::pin(async move {
            let members = self
                .get_all::<MembersResponse>(
                    Service::LoadBalancer,
                    &format!("/v2/lbaas/pools/{pool_id}/members"),
                )
                .await?;
            Ok(members.into_iter().map(Into::into).collect())
        })
    }
}

impl QuotaReader for OpenStackCloud {
    fn scoped_project(&self) -> Option<Project> {
        Some(self.project.clone())
    }

    fn compute_quota<'a>(
        &'a self,
        project: &'a Project,
    ) -> BoxFuture<'a, CloudResult<ComputeQuota>> {
        Box::pin(async move {
            let resp: ComputeQuotaResponse = self
                .get_json(
                    Service::Compute,
                    &format!("/os-quota-sets/{}/detail", project.id),
                )
                .await?;
            let q = resp.quota_set;
            Ok(ComputeQuota {
                ram: q.ram,
                security_groups: q.security_groups,
                cores: q.cores,
                instances: q.instances,
                server_groups: q.server_groups,
            })
        })
    }

    fn volume_quota<'a>(&'a self, project: &'a Project) -> BoxFuture<'a, CloudResult<VolumeQuota>> {
        Box::pin(async move {
            let resp: VolumeQuotaResponse = self
                .get_json(
                    Service::Volume,
                    &format!("/os-quota-sets/{}?usage=true", project.id),
                )
                .await?;
            Ok(VolumeQuota {
                volumes: resp.quota_set.volumes,
                gigabytes: resp.quota_set.gigabytes,
            })
        })
    }
}
