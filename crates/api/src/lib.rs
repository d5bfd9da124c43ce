//! Runboard client façade.
//!
//! Frontends depend on the per-kind client traits defined here, never on a concrete
//! backend. The production backend lives in `runboard-cloud`; [`mock::MockCloud`] is the
//! in-memory backend used by tests and `--demo`.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use runboard_core::{
    DomainMapping, Execution, Job, LogEntry, Project, Revision, ScaleRequest, Scope, Service,
    WorkerPool,
};

pub mod fanout;
pub mod mock;

pub use fanout::{fetch_all, list_scoped};

/// Client errors. Display strings are what the error line shows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("authentication failed: {0}. Tip: run 'gcloud auth login' and check the account has Cloud Run permissions")]
    Auth(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },
    #[error("transport: {0}")]
    Transport(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("validation: {0}")]
    Validation(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[async_trait::async_trait]
pub trait ServiceClient: Send + Sync {
    async fn list(&self, project: &str, region: &str) -> ApiResult<Vec<Service>>;
    async fn get(&self, project: &str, region: &str, name: &str) -> ApiResult<Service>;
    /// Read-modify-write of the service's scaling block.
    async fn update_scaling(
        &self,
        project: &str,
        region: &str,
        name: &str,
        request: ScaleRequest,
    ) -> ApiResult<Service>;
}

#[async_trait::async_trait]
pub trait RevisionClient: Send + Sync {
    async fn list(&self, project: &str, region: &str, service: &str) -> ApiResult<Vec<Revision>>;
}

#[async_trait::async_trait]
pub trait JobClient: Send + Sync {
    async fn list(&self, project: &str, region: &str) -> ApiResult<Vec<Job>>;
    /// Start a new execution of the job.
    async fn execute(&self, project: &str, region: &str, name: &str) -> ApiResult<Execution>;
}

#[async_trait::async_trait]
pub trait ExecutionClient: Send + Sync {
    async fn list(&self, project: &str, region: &str, job: &str) -> ApiResult<Vec<Execution>>;
}

#[async_trait::async_trait]
pub trait WorkerPoolClient: Send + Sync {
    async fn list(&self, project: &str, region: &str) -> ApiResult<Vec<WorkerPool>>;
    async fn update_scaling(
        &self,
        project: &str,
        region: &str,
        name: &str,
        instances: i32,
    ) -> ApiResult<WorkerPool>;
}

#[async_trait::async_trait]
pub trait DomainMappingClient: Send + Sync {
    async fn list(&self, project: &str, region: &str) -> ApiResult<Vec<DomainMapping>>;
}

#[async_trait::async_trait]
pub trait ProjectClient: Send + Sync {
    async fn list(&self) -> ApiResult<Vec<Project>>;
}

/// Order in which the log source yields entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    NewestFirst,
    OldestFirst,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub project: String,
    pub filter: String,
    pub order: Order,
    /// Stop after this many entries; `None` reads everything that matches.
    pub limit: Option<usize>,
}

/// Upstream log entries, read lazily.
pub trait LogSource: Send + Sync {
    fn entries(&self, query: LogQuery) -> BoxStream<'static, ApiResult<LogEntry>>;
}

/// One backend, seen through every per-kind trait.
#[derive(Clone)]
pub struct Clients {
    pub services: Arc<dyn ServiceClient>,
    pub revisions: Arc<dyn RevisionClient>,
    pub jobs: Arc<dyn JobClient>,
    pub executions: Arc<dyn ExecutionClient>,
    pub worker_pools: Arc<dyn WorkerPoolClient>,
    pub domain_mappings: Arc<dyn DomainMappingClient>,
    pub projects: Arc<dyn ProjectClient>,
    pub logs: Arc<dyn LogSource>,
}

impl Clients {
    /// Bundle a backend that implements every trait.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ServiceClient
            + RevisionClient
            + JobClient
            + ExecutionClient
            + WorkerPoolClient
            + DomainMappingClient
            + ProjectClient
            + LogSource
            + 'static,
    {
        Self {
            services: backend.clone(),
            revisions: backend.clone(),
            jobs: backend.clone(),
            executions: backend.clone(),
            worker_pools: backend.clone(),
            domain_mappings: backend.clone(),
            projects: backend.clone(),
            logs: backend,
        }
    }

    pub async fn list_services(&self, project: &str, scope: &Scope) -> ApiResult<Vec<Service>> {
        let client = self.services.clone();
        let project = project.to_string();
        list_scoped(scope, move |region| {
            let client = client.clone();
            let project = project.clone();
            async move { client.list(&project, &region).await }
        })
        .await
    }

    pub async fn list_jobs(&self, project: &str, scope: &Scope) -> ApiResult<Vec<Job>> {
        let client = self.jobs.clone();
        let project = project.to_string();
        list_scoped(scope, move |region| {
            let client = client.clone();
            let project = project.clone();
            async move { client.list(&project, &region).await }
        })
        .await
    }

    pub async fn list_worker_pools(&self, project: &str, scope: &Scope) -> ApiResult<Vec<WorkerPool>> {
        let client = self.worker_pools.clone();
        let project = project.to_string();
        list_scoped(scope, move |region| {
            let client = client.clone();
            let project = project.clone();
            async move { client.list(&project, &region).await }
        })
        .await
    }

    pub async fn list_domain_mappings(
        &self,
        project: &str,
        scope: &Scope,
    ) -> ApiResult<Vec<DomainMapping>> {
        let client = self.domain_mappings.clone();
        let project = project.to_string();
        list_scoped(scope, move |region| {
            let client = client.clone();
            let project = project.clone();
            async move { client.list(&project, &region).await }
        })
        .await
    }
}
