//! In-memory backend.
//!
//! Rows are keyed by region so fan-out behaviour (failing or slow regions) can be scripted
//! per partition. Log polls are answered from a queue of scripted batches.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures::stream::{self, BoxStream, StreamExt};

use runboard_core::{
    short_name, Condition, DomainMapping, Execution, ExecutionRef, Job, LogEntry, Project,
    ResourceRecord, Revision, ScaleRequest, Service, TrafficStatus, WorkerPool,
};

use crate::{
    ApiError, ApiResult, DomainMappingClient, ExecutionClient, JobClient, LogQuery, LogSource,
    Order, ProjectClient, RevisionClient, ServiceClient, WorkerPoolClient,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct MockCloud {
    services: Mutex<BTreeMap<String, Vec<Service>>>,
    jobs: Mutex<BTreeMap<String, Vec<Job>>>,
    worker_pools: Mutex<BTreeMap<String, Vec<WorkerPool>>>,
    domain_mappings: Mutex<BTreeMap<String, Vec<DomainMapping>>>,
    revisions: Mutex<HashMap<String, Vec<Revision>>>,
    executions: Mutex<HashMap<String, Vec<Execution>>>,
    projects: Mutex<Vec<Project>>,
    failing: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    mutation_error: Mutex<Option<ApiError>>,
    log_backlog: Mutex<Vec<LogEntry>>,
    log_polls: Mutex<VecDeque<ApiResult<Vec<LogEntry>>>>,
    calls: Mutex<Vec<String>>,
}

impl MockCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_services(self, region: &str, rows: Vec<Service>) -> Self {
        lock(&self.services).insert(region.to_string(), rows);
        self
    }

    pub fn with_jobs(self, region: &str, rows: Vec<Job>) -> Self {
        lock(&self.jobs).insert(region.to_string(), rows);
        self
    }

    pub fn with_worker_pools(self, region: &str, rows: Vec<WorkerPool>) -> Self {
        lock(&self.worker_pools).insert(region.to_string(), rows);
        self
    }

    pub fn with_domain_mappings(self, region: &str, rows: Vec<DomainMapping>) -> Self {
        lock(&self.domain_mappings).insert(region.to_string(), rows);
        self
    }

    pub fn with_revisions(self, service: &str, rows: Vec<Revision>) -> Self {
        lock(&self.revisions).insert(service.to_string(), rows);
        self
    }

    pub fn with_executions(self, job: &str, rows: Vec<Execution>) -> Self {
        lock(&self.executions).insert(job.to_string(), rows);
        self
    }

    pub fn with_projects(self, rows: Vec<Project>) -> Self {
        *lock(&self.projects) = rows;
        self
    }

    /// Every call that names this region fails.
    pub fn fail_region(self, region: &str) -> Self {
        lock(&self.failing).insert(region.to_string());
        self
    }

    /// Every call that names this region sleeps first.
    pub fn delay_region(self, region: &str, delay: Duration) -> Self {
        lock(&self.delays).insert(region.to_string(), delay);
        self
    }

    /// Mutations (scale, execute) fail with this error.
    pub fn fail_mutations(self, error: ApiError) -> Self {
        *lock(&self.mutation_error) = Some(error);
        self
    }

    /// Entries served to newest-first (backlog) queries, in any order.
    pub fn with_log_backlog(self, entries: Vec<LogEntry>) -> Self {
        *lock(&self.log_backlog) = entries;
        self
    }

    /// Queue the answer to the next oldest-first (poll) query.
    pub fn push_log_poll(&self, answer: ApiResult<Vec<LogEntry>>) {
        lock(&self.log_polls).push_back(answer);
    }

    /// Calls received so far, as `op region/name` strings (`op project:region/name` for mutations).
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn record(&self, call: String) {
        lock(&self.calls).push(call);
    }

    async fn gate(&self, region: &str) -> ApiResult<()> {
        let delay = lock(&self.delays).get(region).copied();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if lock(&self.failing).contains(region) {
            return Err(ApiError::Http { status: 503, message: format!("region {region} unavailable") });
        }
        Ok(())
    }

    fn mutation_error(&self) -> Option<ApiError> {
        lock(&self.mutation_error).clone()
    }

    /// A small fixed world for `--demo`.
    pub fn demo() -> Self {
        let t = |h: u32, m: u32| Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).single();
        let service = |name: &str, region: &str| Service {
            name: name.to_string(),
            full_name: format!("projects/demo/locations/{region}/services/{name}"),
            uri: format!("https://{name}-abc123-{}.a.run.app", &region[..2]),
            project: "demo".into(),
            region: region.to_string(),
            creator: "dev@example.com".into(),
            last_modifier: "ci@example.com".into(),
            update_time: t(9, 30),
            latest_ready_revision: format!("{name}-00002-xyz"),
            latest_created_revision: format!("{name}-00002-xyz"),
            traffic: vec![TrafficStatus {
                kind: "TRAFFIC_TARGET_ALLOCATION_TYPE_LATEST".into(),
                percent: 100,
                ..Default::default()
            }],
            scaling: ScaleRequest::Automatic { min: 0, max: 10 }.apply(),
            ..Default::default()
        };
        let job = |name: &str, region: &str| Job {
            name: name.to_string(),
            full_name: format!("projects/demo/locations/{region}/jobs/{name}"),
            project: "demo".into(),
            region: region.to_string(),
            creator: "dev@example.com".into(),
            update_time: t(8, 0),
            latest_execution: Some(ExecutionRef { name: format!("{name}-x7k2p"), create_time: t(8, 5) }),
            terminal_condition: Some(Condition {
                kind: "Ready".into(),
                state: "CONDITION_SUCCEEDED".into(),
                ..Default::default()
            }),
        };
        let backlog = (0..5)
            .map(|i| LogEntry {
                timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, i).single().unwrap_or_else(Utc::now),
                severity: "INFO".into(),
                payload: format!("GET /healthz 200 ({i})"),
            })
            .collect();
        MockCloud::new()
            .with_services("us-central1", vec![service("api", "us-central1"), service("web", "us-central1")])
            .with_services("europe-west1", vec![service("api-eu", "europe-west1")])
            .with_jobs("us-central1", vec![job("nightly-export", "us-central1")])
            .with_worker_pools(
                "us-central1",
                vec![WorkerPool {
                    name: "queue-workers".into(),
                    full_name: "projects/demo/locations/us-central1/workerPools/queue-workers".into(),
                    project: "demo".into(),
                    region: "us-central1".into(),
                    update_time: t(7, 45),
                    labels: BTreeMap::new(),
                    manual_instances: Some(2),
                }],
            )
            .with_domain_mappings(
                "europe-west1",
                vec![DomainMapping {
                    name: "api.example.com".into(),
                    route_name: "api-eu".into(),
                    project: "demo".into(),
                    region: "europe-west1".into(),
                    records: vec![ResourceRecord {
                        kind: "CNAME".into(),
                        name: "api".into(),
                        rrdata: "ghs.googlehosted.com.".into(),
                    }],
                    conditions: vec![Condition { kind: "Ready".into(), state: "True".into(), ..Default::default() }],
                    ..Default::default()
                }],
            )
            .with_revisions(
                "api",
                vec![Revision {
                    name: "api-00002-xyz".into(),
                    service: "api".into(),
                    create_time: t(9, 30),
                    images: vec!["us-docker.pkg.dev/demo/api:2".into()],
                    max_concurrency: 80,
                    timeout: "300s".into(),
                    ready: true,
                    ..Default::default()
                }],
            )
            .with_executions(
                "nightly-export",
                vec![Execution {
                    name: "nightly-export-x7k2p".into(),
                    job: "nightly-export".into(),
                    create_time: t(8, 5),
                    completion_time: t(8, 9),
                    task_count: 1,
                    succeeded: 1,
                    ..Default::default()
                }],
            )
            .with_projects(vec![
                Project { id: "demo".into(), display_name: "Demo".into(), number: "1234".into() },
                Project { id: "demo-staging".into(), display_name: "Demo staging".into(), number: "5678".into() },
            ])
            .with_log_backlog(backlog)
    }
}

fn rows_in<T: Clone>(map: &Mutex<BTreeMap<String, Vec<T>>>, region: &str) -> Vec<T> {
    lock(map).get(region).cloned().unwrap_or_default()
}

#[async_trait::async_trait]
impl ServiceClient for MockCloud {
    async fn list(&self, _project: &str, region: &str) -> ApiResult<Vec<Service>> {
        self.record(format!("services.list {region}"));
        self.gate(region).await?;
        Ok(rows_in(&self.services, region))
    }

    async fn get(&self, _project: &str, region: &str, name: &str) -> ApiResult<Service> {
        self.record(format!("services.get {region}/{name}"));
        self.gate(region).await?;
        rows_in(&self.services, region)
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ApiError::NotFound(format!("service {name}")))
    }

    async fn update_scaling(
        &self,
        project: &str,
        region: &str,
        name: &str,
        request: ScaleRequest,
    ) -> ApiResult<Service> {
        self.record(format!("services.update_scaling {project}:{region}/{name}"));
        self.gate(region).await?;
        if let Some(e) = self.mutation_error() {
            return Err(e);
        }
        let mut all = lock(&self.services);
        let svc = all
            .get_mut(region)
            .and_then(|rows| rows.iter_mut().find(|s| s.name == name))
            .ok_or_else(|| ApiError::NotFound(format!("service {name}")))?;
        svc.scaling = request.apply();
        Ok(svc.clone())
    }
}

#[async_trait::async_trait]
impl RevisionClient for MockCloud {
    async fn list(&self, _project: &str, region: &str, service: &str) -> ApiResult<Vec<Revision>> {
        self.record(format!("revisions.list {region}/{service}"));
        self.gate(region).await?;
        Ok(lock(&self.revisions).get(service).cloned().unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl JobClient for MockCloud {
    async fn list(&self, _project: &str, region: &str) -> ApiResult<Vec<Job>> {
        self.record(format!("jobs.list {region}"));
        self.gate(region).await?;
        Ok(rows_in(&self.jobs, region))
    }

    async fn execute(&self, project: &str, region: &str, name: &str) -> ApiResult<Execution> {
        self.record(format!("jobs.execute {project}:{region}/{name}"));
        self.gate(region).await?;
        if let Some(e) = self.mutation_error() {
            return Err(e);
        }
        let exec = Execution {
            name: format!("{name}-{}", lock(&self.calls).len()),
            job: name.to_string(),
            create_time: Some(Utc::now()),
            task_count: 1,
            running: 1,
            ..Default::default()
        };
        lock(&self.executions).entry(name.to_string()).or_default().insert(0, exec.clone());
        Ok(exec)
    }
}

#[async_trait::async_trait]
impl ExecutionClient for MockCloud {
    async fn list(&self, _project: &str, region: &str, job: &str) -> ApiResult<Vec<Execution>> {
        self.record(format!("executions.list {region}/{job}"));
        self.gate(region).await?;
        Ok(lock(&self.executions).get(short_name(job)).cloned().unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl WorkerPoolClient for MockCloud {
    async fn list(&self, _project: &str, region: &str) -> ApiResult<Vec<WorkerPool>> {
        self.record(format!("worker_pools.list {region}"));
        self.gate(region).await?;
        Ok(rows_in(&self.worker_pools, region))
    }

    async fn update_scaling(
        &self,
        project: &str,
        region: &str,
        name: &str,
        instances: i32,
    ) -> ApiResult<WorkerPool> {
        self.record(format!("worker_pools.update_scaling {project}:{region}/{name}"));
        self.gate(region).await?;
        if let Some(e) = self.mutation_error() {
            return Err(e);
        }
        let mut all = lock(&self.worker_pools);
        let pool = all
            .get_mut(region)
            .and_then(|rows| rows.iter_mut().find(|p| p.name == name))
            .ok_or_else(|| ApiError::NotFound(format!("worker pool {name}")))?;
        pool.manual_instances = Some(instances);
        Ok(pool.clone())
    }
}

#[async_trait::async_trait]
impl DomainMappingClient for MockCloud {
    async fn list(&self, _project: &str, region: &str) -> ApiResult<Vec<DomainMapping>> {
        self.record(format!("domain_mappings.list {region}"));
        self.gate(region).await?;
        Ok(rows_in(&self.domain_mappings, region))
    }
}

#[async_trait::async_trait]
impl ProjectClient for MockCloud {
    async fn list(&self) -> ApiResult<Vec<Project>> {
        self.record("projects.list".to_string());
        Ok(lock(&self.projects).clone())
    }
}

impl LogSource for MockCloud {
    fn entries(&self, query: LogQuery) -> BoxStream<'static, ApiResult<LogEntry>> {
        self.record(format!("logs.entries {:?} {}", query.order, query.filter));
        let answer: ApiResult<Vec<LogEntry>> = match query.order {
            Order::NewestFirst => {
                let mut rows = lock(&self.log_backlog).clone();
                rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                Ok(rows)
            }
            Order::OldestFirst => lock(&self.log_polls).pop_front().unwrap_or_else(|| Ok(Vec::new())),
        };
        match answer {
            Ok(mut rows) => {
                if let Some(limit) = query.limit {
                    rows.truncate(limit);
                }
                stream::iter(rows.into_iter().map(Ok)).boxed()
            }
            Err(e) => stream::iter(vec![Err(e)]).boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Clients;
    use runboard_core::Scope;
    use std::sync::Arc;

    fn svc(name: &str, region: &str) -> Service {
        Service { name: name.into(), region: region.into(), ..Default::default() }
    }

    #[tokio::test]
    async fn scenario_a_failing_region_is_dropped() {
        let cloud = MockCloud::new()
            .with_services("us", vec![svc("a", "us"), svc("b", "us")])
            .fail_region("eu");
        let cloud = Arc::new(cloud);
        let client = cloud.clone();
        let out = crate::fetch_all(vec!["us".into(), "eu".into()], move |r| {
            let client = client.clone();
            async move { ServiceClient::list(client.as_ref(), "p", &r).await }
        })
        .await;
        let names: Vec<_> = out.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"a") && names.contains(&"b"));
        assert!(cloud.calls().iter().any(|c| c == "services.list eu"));
    }

    #[tokio::test]
    async fn clients_list_all_regions_from_demo() {
        let clients = Clients::from_backend(Arc::new(MockCloud::demo()));
        let services = clients.list_services("demo", &Scope::All).await.unwrap();
        assert_eq!(services.len(), 3);
        for s in &services {
            assert!(s.region == "us-central1" || s.region == "europe-west1");
        }
    }

    #[tokio::test]
    async fn scaling_persists_in_memory() {
        let cloud = Arc::new(MockCloud::demo());
        let clients = Clients::from_backend(cloud.clone());
        let updated = clients
            .services
            .update_scaling("demo", "us-central1", "api", ScaleRequest::Manual { instances: 3 })
            .await
            .unwrap();
        assert_eq!(updated.scaling.manual_instances, 3);
        let again = clients.services.get("demo", "us-central1", "api").await.unwrap();
        assert_eq!(again.scaling, updated.scaling);
    }

    #[tokio::test]
    async fn backlog_is_served_newest_first_and_limited() {
        let cloud = MockCloud::demo();
        let rows: Vec<_> = cloud
            .entries(LogQuery { project: "demo".into(), filter: String::new(), order: Order::NewestFirst, limit: Some(3) })
            .collect::<Vec<_>>()
            .await;
        let ts: Vec<_> = rows.into_iter().map(|r| r.unwrap().timestamp).collect();
        assert_eq!(ts.len(), 3);
        assert!(ts.windows(2).all(|w| w[0] >= w[1]));
    }
}
