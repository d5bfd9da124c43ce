//! Runboard cloud backend: the Cloud Run admin API, Resource Manager and Cloud Logging
//! over plain REST.
//!
//! One [`CloudRun`] value implements every client trait from `runboard_api`. Listings are
//! per region; fan-out across regions happens above this crate.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::stream::{self, BoxStream, StreamExt};
use metrics::{counter, histogram};
use once_cell::sync::Lazy;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use runboard_api::{
    ApiError, ApiResult, DomainMappingClient, ExecutionClient, JobClient, LogQuery, LogSource,
    Order, ProjectClient, RevisionClient, ServiceClient, WorkerPoolClient,
};
use runboard_core::{
    short_name, DomainMapping, Execution, Job, LogEntry, Project, Revision, ScaleRequest,
    ScalingMode, Service, WorkerPool,
};

pub mod auth;
pub mod wire;

pub use auth::TokenSource;

use wire::{
    Page, WDomainMapping, WErrorBody, WExecution, WJob, WLogEntry, WOperation, WProject,
    WRevision, WService, WWorkerPool,
};

/// Cloud Logging caps `pageSize` at 1000.
const MAX_LOG_PAGE: usize = 1000;

/// API roots, overridable for emulators and tests.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub run: String,
    /// Root for the v1 (domain mapping) API. `None` means the regional host
    /// `https://{region}-run.googleapis.com`.
    pub run_v1: Option<String>,
    pub logging: String,
    pub projects: String,
}

static DEFAULT_ENDPOINTS: Lazy<Endpoints> = Lazy::new(|| {
    let env = |k: &str| std::env::var(k).ok().filter(|s| !s.is_empty());
    let run_override = env("RUN_API_ENDPOINT");
    Endpoints {
        run: run_override.clone().unwrap_or_else(|| "https://run.googleapis.com".into()),
        run_v1: run_override,
        logging: env("RUN_LOGGING_ENDPOINT").unwrap_or_else(|| "https://logging.googleapis.com".into()),
        projects: env("RUN_PROJECTS_ENDPOINT")
            .unwrap_or_else(|| "https://cloudresourcemanager.googleapis.com".into()),
    }
});

impl Default for Endpoints {
    fn default() -> Self {
        DEFAULT_ENDPOINTS.clone()
    }
}

impl Endpoints {
    fn location(&self, project: &str, region: &str) -> String {
        format!("{}/v2/projects/{}/locations/{}", self.run, project, region)
    }

    fn domain_mappings(&self, project: &str, region: &str) -> String {
        let root = self
            .run_v1
            .clone()
            .unwrap_or_else(|| format!("https://{region}-run.googleapis.com"));
        format!("{root}/apis/domains.cloudrun.com/v1/namespaces/{project}/domainmappings")
    }
}

/// Production backend. Cheap to clone.
#[derive(Clone)]
pub struct CloudRun {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    auth: TokenSource,
    endpoints: Endpoints,
    timeout: Duration,
}

impl CloudRun {
    /// Client with the default endpoints, a token from the environment or gcloud, and the
    /// request timeout from `RUN_HTTP_TIMEOUT_SECS` (default 30s).
    pub fn from_env() -> Result<Self> {
        let timeout = std::env::var("RUN_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));
        Self::new(TokenSource::from_env(), Endpoints::default(), timeout)
    }

    pub fn new(auth: TokenSource, endpoints: Endpoints, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("runboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        info!(run = %endpoints.run, timeout_secs = timeout.as_secs(), "cloud: client ready");
        Ok(Self { inner: Arc::new(Inner { http, auth, endpoints, timeout }) })
    }

    fn endpoints(&self) -> &Endpoints {
        &self.inner.endpoints
    }

    async fn call<T: DeserializeOwned>(&self, method: Method, url: &str, body: Option<&Value>) -> ApiResult<T> {
        let token = self.inner.auth.token().await?;
        let mut req = self.inner.http.request(method.clone(), url).bearer_auth(token);
        if let Some(b) = body {
            req = req.json(b);
        }
        let started = Instant::now();
        let resp = req.send().await.map_err(|e| self.transport_error(e))?;
        let status = resp.status();
        histogram!("http_request_duration_ms", started.elapsed().as_millis() as f64);
        counter!("http_requests_total", 1u64, "status" => status.as_u16().to_string());
        debug!(%method, url, status = status.as_u16(), "cloud: request");
        let text = resp.text().await.map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.inner.auth.invalidate().await;
            }
            return Err(status_error(status.as_u16(), &text));
        }
        let text = if text.trim().is_empty() { "{}" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| ApiError::Decode(format!("{url}: {e}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ApiResult<T> {
        self.call(Method::GET, url, None).await
    }

    fn transport_error(&self, e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout(self.inner.timeout)
        } else {
            ApiError::Transport(e.to_string())
        }
    }

    /// Follow `nextPageToken` until the listing is exhausted.
    async fn list_all<W: DeserializeOwned>(&self, url: &str) -> ApiResult<Vec<W>> {
        let mut out = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let next = match &token {
                Some(t) => page_url(url, t)?,
                None => url.to_string(),
            };
            let page: Page<W> = self.get_json(&next).await?;
            out.extend(page.items);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        Ok(out)
    }

    /// GET the resource, swap its `scaling` block, PATCH it back.
    async fn patch_scaling(&self, url: &str, scaling: Value) -> ApiResult<()> {
        let mut body: Value = self.get_json(url).await?;
        wire::strip_output_only(&mut body);
        body["scaling"] = scaling;
        let op: WOperation = self.call(Method::PATCH, url, Some(&body)).await?;
        if let Some(err) = op.error {
            return Err(operation_error(err.code, err.message));
        }
        debug!(operation = %op.name, done = op.done, "cloud: scaling patched");
        Ok(())
    }

    async fn log_page(&self, query: &LogQuery, page_token: Option<String>) -> ApiResult<(Vec<LogEntry>, Option<String>)> {
        let page_size = query.limit.unwrap_or(MAX_LOG_PAGE).clamp(1, MAX_LOG_PAGE);
        let order_by = match query.order {
            Order::NewestFirst => "timestamp desc",
            Order::OldestFirst => "timestamp asc",
        };
        let mut body = json!({
            "resourceNames": [format!("projects/{}", query.project)],
            "filter": query.filter,
            "orderBy": order_by,
            "pageSize": page_size,
        });
        if let Some(t) = page_token {
            body["pageToken"] = Value::String(t);
        }
        let url = format!("{}/v2/entries:list", self.endpoints().logging);
        let page: Page<WLogEntry> = self.call(Method::POST, &url, Some(&body)).await?;
        let rows = page.items.into_iter().filter_map(WLogEntry::into_record).collect();
        Ok((rows, page.next_page_token.filter(|t| !t.is_empty())))
    }
}

/// `url` with `pageToken` appended as a form-encoded query pair.
fn page_url(url: &str, token: &str) -> ApiResult<String> {
    let mut u = reqwest::Url::parse(url).map_err(|e| ApiError::Internal(format!("{url}: {e}")))?;
    u.query_pairs_mut().append_pair("pageToken", token);
    Ok(u.to_string())
}

/// Map a non-2xx response to an error, preferring the Google error body's message.
pub fn status_error(status: u16, body: &str) -> ApiError {
    let message = serde_json::from_str::<WErrorBody>(body)
        .ok()
        .map(|b| b.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().chars().take(200).collect());
    match status {
        401 | 403 => ApiError::Auth(message),
        404 => ApiError::NotFound(message),
        _ => ApiError::Http { status, message },
    }
}

/// `google.rpc.Status` codes from a failed operation.
fn operation_error(code: i32, message: String) -> ApiError {
    match code {
        7 | 16 => ApiError::Auth(message),
        5 => ApiError::NotFound(message),
        3 | 9 | 11 => ApiError::Validation(message),
        4 => ApiError::Timeout(Duration::ZERO),
        _ => ApiError::Http { status: 500, message },
    }
}

fn service_scaling(request: ScaleRequest) -> Value {
    let s = request.apply();
    match s.mode {
        ScalingMode::Manual => json!({
            "scalingMode": "MANUAL",
            "manualInstanceCount": s.manual_instances,
        }),
        ScalingMode::Automatic => json!({
            "scalingMode": "AUTOMATIC",
            "minInstanceCount": s.min_instances,
            "maxInstanceCount": s.max_instances,
        }),
    }
}

#[async_trait::async_trait]
impl ServiceClient for CloudRun {
    async fn list(&self, project: &str, region: &str) -> ApiResult<Vec<Service>> {
        let url = format!("{}/services", self.endpoints().location(project, region));
        let rows: Vec<WService> = self.list_all(&url).await?;
        Ok(rows.into_iter().map(|w| w.into_record(project, region)).collect())
    }

    async fn get(&self, project: &str, region: &str, name: &str) -> ApiResult<Service> {
        let url = format!("{}/services/{}", self.endpoints().location(project, region), short_name(name));
        let w: WService = self.get_json(&url).await?;
        Ok(w.into_record(project, region))
    }

    async fn update_scaling(
        &self,
        project: &str,
        region: &str,
        name: &str,
        request: ScaleRequest,
    ) -> ApiResult<Service> {
        let url = format!("{}/services/{}", self.endpoints().location(project, region), short_name(name));
        info!(project, region, service = name, ?request, "cloud: scaling service");
        self.patch_scaling(&url, service_scaling(request)).await?;
        ServiceClient::get(self, project, region, name).await
    }
}

#[async_trait::async_trait]
impl RevisionClient for CloudRun {
    async fn list(&self, project: &str, region: &str, service: &str) -> ApiResult<Vec<Revision>> {
        let url = format!(
            "{}/services/{}/revisions",
            self.endpoints().location(project, region),
            short_name(service)
        );
        let rows: Vec<WRevision> = self.list_all(&url).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait::async_trait]
impl JobClient for CloudRun {
    async fn list(&self, project: &str, region: &str) -> ApiResult<Vec<Job>> {
        let url = format!("{}/jobs", self.endpoints().location(project, region));
        let rows: Vec<WJob> = self.list_all(&url).await?;
        Ok(rows.into_iter().map(|w| w.into_record(project, region)).collect())
    }

    async fn execute(&self, project: &str, region: &str, name: &str) -> ApiResult<Execution> {
        let url = format!("{}/jobs/{}:run", self.endpoints().location(project, region), short_name(name));
        info!(project, region, job = name, "cloud: executing job");
        let op: WOperation = self.call(Method::POST, &url, Some(&json!({}))).await?;
        if let Some(err) = op.error {
            return Err(operation_error(err.code, err.message));
        }
        let execution = op
            .metadata
            .and_then(|m| serde_json::from_value::<WExecution>(m).ok())
            .map(Execution::from)
            .unwrap_or_else(|| Execution {
                name: short_name(&op.name).to_string(),
                job: short_name(name).to_string(),
                ..Default::default()
            });
        Ok(execution)
    }
}

#[async_trait::async_trait]
impl ExecutionClient for CloudRun {
    async fn list(&self, project: &str, region: &str, job: &str) -> ApiResult<Vec<Execution>> {
        let url = format!("{}/jobs/{}/executions", self.endpoints().location(project, region), short_name(job));
        let rows: Vec<WExecution> = self.list_all(&url).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait::async_trait]
impl WorkerPoolClient for CloudRun {
    async fn list(&self, project: &str, region: &str) -> ApiResult<Vec<WorkerPool>> {
        let url = format!("{}/workerPools", self.endpoints().location(project, region));
        let rows: Vec<WWorkerPool> = self.list_all(&url).await?;
        Ok(rows.into_iter().map(|w| w.into_record(project, region)).collect())
    }

    async fn update_scaling(
        &self,
        project: &str,
        region: &str,
        name: &str,
        instances: i32,
    ) -> ApiResult<WorkerPool> {
        let url = format!("{}/workerPools/{}", self.endpoints().location(project, region), short_name(name));
        info!(project, region, worker_pool = name, instances, "cloud: scaling worker pool");
        self.patch_scaling(&url, json!({ "manualInstanceCount": instances })).await?;
        let w: WWorkerPool = self.get_json(&url).await?;
        Ok(w.into_record(project, region))
    }
}

#[async_trait::async_trait]
impl DomainMappingClient for CloudRun {
    async fn list(&self, project: &str, region: &str) -> ApiResult<Vec<DomainMapping>> {
        let url = self.endpoints().domain_mappings(project, region);
        let page: Page<WDomainMapping> = self.get_json(&url).await?;
        Ok(page.items.into_iter().map(|w| w.into_record(project, region)).collect())
    }
}

#[async_trait::async_trait]
impl ProjectClient for CloudRun {
    async fn list(&self) -> ApiResult<Vec<Project>> {
        let url = format!("{}/v3/projects:search", self.endpoints().projects);
        let rows: Vec<WProject> = self.list_all(&url).await?;
        let mut out: Vec<Project> = rows.into_iter().map(Into::into).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }
}

impl LogSource for CloudRun {
    fn entries(&self, query: LogQuery) -> BoxStream<'static, ApiResult<LogEntry>> {
        let this = self.clone();
        let limit = query.limit;
        // state: Some(next page token) while pages remain
        let pages = stream::unfold(Some(None::<String>), move |state| {
            let this = this.clone();
            let query = query.clone();
            async move {
                let token = state?;
                match this.log_page(&query, token).await {
                    Ok((rows, next)) => Some((Ok(rows), next.map(Some))),
                    Err(e) => {
                        warn!(error = %e, "cloud: log page failed");
                        Some((Err(e), None))
                    }
                }
            }
        });
        let entries = pages.flat_map(|page| match page {
            Ok(rows) => stream::iter(rows.into_iter().map(Ok).collect::<Vec<_>>()),
            Err(e) => stream::iter(vec![Err(e)]),
        });
        match limit {
            Some(n) => entries.take(n).boxed(),
            None => entries.boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let body = r#"{"error": {"code": 403, "message": "Permission denied", "status": "PERMISSION_DENIED"}}"#;
        assert_eq!(status_error(403, body), ApiError::Auth("Permission denied".into()));
        assert_eq!(status_error(401, "nope"), ApiError::Auth("nope".into()));
        assert!(matches!(status_error(404, "{}"), ApiError::NotFound(_)));
        assert_eq!(
            status_error(503, "unavailable"),
            ApiError::Http { status: 503, message: "unavailable".into() }
        );
    }

    #[test]
    fn scaling_bodies() {
        let manual = service_scaling(ScaleRequest::Manual { instances: 3 });
        assert_eq!(manual["scalingMode"], "MANUAL");
        assert_eq!(manual["manualInstanceCount"], 3);
        assert!(manual.get("minInstanceCount").is_none());
        let auto = service_scaling(ScaleRequest::Automatic { min: 1, max: 4 });
        assert_eq!(auto["scalingMode"], "AUTOMATIC");
        assert_eq!(auto["minInstanceCount"], 1);
        assert_eq!(auto["maxInstanceCount"], 4);
    }

    #[test]
    fn page_tokens_are_query_encoded() {
        assert_eq!(
            page_url("https://run.test/v2/projects/p/locations/r/services", "a+b/c=").unwrap(),
            "https://run.test/v2/projects/p/locations/r/services?pageToken=a%2Bb%2Fc%3D"
        );
        assert_eq!(page_url("https://crm.test/v3/projects:search?query=x", "t").unwrap(), "https://crm.test/v3/projects:search?query=x&pageToken=t");
    }

    /// Serves `pages` in order, one per connection, and records each request line.
    async fn serve_pages(pages: Vec<&'static str>) -> (String, Arc<std::sync::Mutex<Vec<String>>>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = seen.clone();
        tokio::spawn(async move {
            for body in pages {
                let Ok((mut sock, _)) = listener.accept().await else { return };
                let mut buf = vec![0u8; 16 * 1024];
                let mut n = 0;
                while n < buf.len() && !buf[..n].windows(4).any(|w| w == b"\r\n\r\n") {
                    match sock.read(&mut buf[n..]).await {
                        Ok(0) | Err(_) => break,
                        Ok(m) => n += m,
                    }
                }
                let head = String::from_utf8_lossy(&buf[..n]).to_string();
                log.lock().unwrap().push(head.lines().next().unwrap_or_default().to_string());
                let resp = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = sock.write_all(resp.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });
        (format!("http://{addr}"), seen)
    }

    #[tokio::test]
    async fn listing_follows_next_page_token() {
        let (root, seen) = serve_pages(vec![
            r#"{"services": [{"name": "projects/p/locations/r/services/a"}], "nextPageToken": "a+b/c="}"#,
            r#"{"services": [{"name": "projects/p/locations/r/services/b"}]}"#,
        ])
        .await;
        let endpoints = Endpoints { run: root.clone(), run_v1: None, logging: root.clone(), projects: root };
        let cloud = CloudRun::new(TokenSource::Static("t".into()), endpoints, Duration::from_secs(5)).unwrap();
        let rows = ServiceClient::list(&cloud, "p", "r").await.unwrap();
        let names: Vec<_> = rows.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].starts_with("GET /v2/projects/p/locations/r/services HTTP/1.1"));
        assert!(seen[1].contains("/services?pageToken=a%2Bb%2Fc%3D "), "{}", seen[1]);
    }

    #[test]
    fn endpoint_urls() {
        let e = Endpoints {
            run: "https://run.test".into(),
            run_v1: None,
            logging: "https://log.test".into(),
            projects: "https://crm.test".into(),
        };
        assert_eq!(e.location("p", "us-east1"), "https://run.test/v2/projects/p/locations/us-east1");
        assert_eq!(
            e.domain_mappings("p", "europe-west1"),
            "https://europe-west1-run.googleapis.com/apis/domains.cloudrun.com/v1/namespaces/p/domainmappings"
        );
    }

    #[test]
    fn operation_codes() {
        assert!(matches!(operation_error(7, "x".into()), ApiError::Auth(_)));
        assert!(matches!(operation_error(3, "x".into()), ApiError::Validation(_)));
        assert!(matches!(operation_error(13, "x".into()), ApiError::Http { status: 500, .. }));
    }
}
