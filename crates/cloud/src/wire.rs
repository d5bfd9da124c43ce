//! REST payloads and their mapping onto core records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use runboard_core::{
    short_name, Condition, DomainMapping, Execution, ExecutionRef, Job, LogEntry, Project,
    ResourceRecord, Revision, Scaling, ScalingMode, Service, TrafficStatus, WorkerPool,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    #[serde(default, alias = "services", alias = "jobs", alias = "executions", alias = "revisions", alias = "workerPools", alias = "projects", alias = "entries")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WCondition {
    #[serde(rename = "type")]
    pub kind: String,
    pub state: String,
    pub message: String,
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl From<WCondition> for Condition {
    fn from(c: WCondition) -> Self {
        Condition { kind: c.kind, state: c.state, message: c.message, last_transition_time: c.last_transition_time }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WScaling {
    pub scaling_mode: Option<String>,
    pub min_instance_count: Option<i32>,
    pub max_instance_count: Option<i32>,
    pub manual_instance_count: Option<i32>,
}

/// Scaling block as reported; absent means automatic with no bounds.
pub fn scaling(s: Option<WScaling>) -> Scaling {
    let Some(s) = s else { return Scaling::default() };
    let mode = match s.scaling_mode.as_deref() {
        Some("MANUAL") => ScalingMode::Manual,
        _ => ScalingMode::Automatic,
    };
    Scaling {
        mode,
        min_instances: s.min_instance_count.unwrap_or(0),
        max_instances: s.max_instance_count.unwrap_or(0),
        manual_instances: s.manual_instance_count.unwrap_or(0),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WTraffic {
    #[serde(rename = "type")]
    pub kind: String,
    pub revision: String,
    pub percent: i32,
    pub tag: String,
    pub uri: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WService {
    pub name: String,
    pub description: String,
    pub uri: String,
    pub creator: String,
    pub last_modifier: String,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
    pub latest_ready_revision: String,
    pub latest_created_revision: String,
    pub traffic_statuses: Vec<WTraffic>,
    pub scaling: Option<WScaling>,
    pub terminal_condition: Option<WCondition>,
    pub etag: String,
}

impl WService {
    pub fn into_record(self, project: &str, region: &str) -> Service {
        Service {
            name: short_name(&self.name).to_string(),
            full_name: self.name.clone(),
            description: self.description,
            uri: self.uri,
            project: project.to_string(),
            region: region.to_string(),
            creator: self.creator,
            last_modifier: self.last_modifier,
            create_time: self.create_time,
            update_time: self.update_time,
            latest_ready_revision: short_name(&self.latest_ready_revision).to_string(),
            latest_created_revision: short_name(&self.latest_created_revision).to_string(),
            traffic: self
                .traffic_statuses
                .into_iter()
                .map(|t| TrafficStatus {
                    kind: t.kind,
                    revision: short_name(&t.revision).to_string(),
                    percent: t.percent,
                    tag: t.tag,
                    uri: t.uri,
                })
                .collect(),
            scaling: scaling(self.scaling),
            terminal_condition: self.terminal_condition.map(Into::into),
            etag: self.etag,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WContainer {
    pub image: String,
    pub resources: WResources,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WResources {
    pub cpu_idle: bool,
    pub startup_cpu_boost: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WRevision {
    pub name: String,
    pub service: String,
    pub create_time: Option<DateTime<Utc>>,
    pub containers: Vec<WContainer>,
    pub max_instance_request_concurrency: i32,
    pub timeout: String,
    pub execution_environment: String,
    pub conditions: Vec<WCondition>,
    pub log_uri: String,
}

impl From<WRevision> for Revision {
    fn from(r: WRevision) -> Self {
        let ready = r.conditions.iter().any(|c| c.kind == "Ready" && c.state == "CONDITION_SUCCEEDED");
        let cpu_idle = r.containers.iter().any(|c| c.resources.cpu_idle);
        let startup_cpu_boost = r.containers.iter().any(|c| c.resources.startup_cpu_boost);
        Revision {
            name: short_name(&r.name).to_string(),
            service: short_name(&r.service).to_string(),
            create_time: r.create_time,
            images: r.containers.into_iter().map(|c| c.image).collect(),
            cpu_idle,
            startup_cpu_boost,
            max_concurrency: r.max_instance_request_concurrency,
            timeout: r.timeout,
            execution_environment: r.execution_environment,
            ready,
            log_uri: r.log_uri,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WExecutionRef {
    pub name: String,
    pub create_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WJob {
    pub name: String,
    pub creator: String,
    pub update_time: Option<DateTime<Utc>>,
    pub latest_created_execution: Option<WExecutionRef>,
    pub terminal_condition: Option<WCondition>,
}

impl WJob {
    pub fn into_record(self, project: &str, region: &str) -> Job {
        Job {
            name: short_name(&self.name).to_string(),
            full_name: self.name.clone(),
            project: project.to_string(),
            region: region.to_string(),
            creator: self.creator,
            update_time: self.update_time,
            latest_execution: self
                .latest_created_execution
                .map(|e| ExecutionRef { name: short_name(&e.name).to_string(), create_time: e.create_time }),
            terminal_condition: self.terminal_condition.map(Into::into),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WExecution {
    pub name: String,
    pub job: String,
    pub create_time: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
    pub task_count: i32,
    pub running_count: i32,
    pub succeeded_count: i32,
    pub failed_count: i32,
    pub cancelled_count: i32,
}

impl From<WExecution> for Execution {
    fn from(e: WExecution) -> Self {
        Execution {
            name: short_name(&e.name).to_string(),
            job: short_name(&e.job).to_string(),
            create_time: e.create_time,
            completion_time: e.completion_time,
            task_count: e.task_count,
            running: e.running_count,
            succeeded: e.succeeded_count,
            failed: e.failed_count,
            cancelled: e.cancelled_count,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WWorkerPool {
    pub name: String,
    pub update_time: Option<DateTime<Utc>>,
    pub labels: BTreeMap<String, String>,
    pub scaling: Option<WScaling>,
}

impl WWorkerPool {
    pub fn into_record(self, project: &str, region: &str) -> WorkerPool {
        WorkerPool {
            name: short_name(&self.name).to_string(),
            full_name: self.name.clone(),
            project: project.to_string(),
            region: region.to_string(),
            update_time: self.update_time,
            labels: self.labels,
            manual_instances: self.scaling.and_then(|s| s.manual_instance_count),
        }
    }
}

/// Knative-style v1 resource used by domain mappings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WDomainMapping {
    pub metadata: WObjectMeta,
    pub spec: WDomainMappingSpec,
    pub status: WDomainMappingStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WObjectMeta {
    pub name: String,
    pub creation_timestamp: Option<DateTime<Utc>>,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WDomainMappingSpec {
    pub route_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WDomainMappingStatus {
    pub resource_records: Vec<WResourceRecord>,
    pub conditions: Vec<WKnativeCondition>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WResourceRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub rrdata: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WKnativeCondition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub message: String,
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl WDomainMapping {
    pub fn into_record(self, project: &str, region: &str) -> DomainMapping {
        DomainMapping {
            name: self.metadata.name,
            route_name: self.spec.route_name,
            project: project.to_string(),
            region: region.to_string(),
            creator: self
                .metadata
                .annotations
                .get("serving.knative.dev/creator")
                .cloned()
                .unwrap_or_default(),
            create_time: self.metadata.creation_timestamp,
            records: self
                .status
                .resource_records
                .into_iter()
                .map(|r| ResourceRecord { kind: r.kind, name: r.name, rrdata: r.rrdata })
                .collect(),
            conditions: self
                .status
                .conditions
                .into_iter()
                .map(|c| Condition {
                    kind: c.kind,
                    state: c.status,
                    message: c.message,
                    last_transition_time: c.last_transition_time,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WProject {
    pub name: String,
    pub project_id: String,
    pub display_name: String,
}

impl From<WProject> for Project {
    fn from(p: WProject) -> Self {
        Project { id: p.project_id, display_name: p.display_name, number: short_name(&p.name).to_string() }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WLogEntry {
    pub timestamp: Option<DateTime<Utc>>,
    pub severity: String,
    pub text_payload: Option<String>,
    pub json_payload: Option<serde_json::Value>,
    pub proto_payload: Option<serde_json::Value>,
}

impl WLogEntry {
    /// Entries without a timestamp cannot advance the tail cursor and are skipped.
    pub fn into_record(self) -> Option<LogEntry> {
        let timestamp = self.timestamp?;
        let payload = if let Some(t) = self.text_payload {
            t
        } else if let Some(j) = self.json_payload {
            j.get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| j.to_string())
        } else if let Some(p) = self.proto_payload {
            p.to_string()
        } else {
            String::new()
        };
        Some(LogEntry { timestamp, severity: self.severity, payload })
    }
}

/// Long-running operation envelope returned by mutations.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WOperation {
    pub name: String,
    pub done: bool,
    pub metadata: Option<serde_json::Value>,
    pub response: Option<serde_json::Value>,
    pub error: Option<WStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WStatus {
    pub code: i32,
    pub message: String,
}

/// `{"error": {"code", "message", "status"}}`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WErrorBody {
    pub error: WStatus,
}

/// Fields the server owns; they must not be sent back on update.
pub const OUTPUT_ONLY: &[&str] = &[
    "uid",
    "generation",
    "createTime",
    "updateTime",
    "deleteTime",
    "expireTime",
    "creator",
    "lastModifier",
    "reconciling",
    "observedGeneration",
    "terminalCondition",
    "conditions",
    "latestReadyRevision",
    "latestCreatedRevision",
    "trafficStatuses",
    "uri",
    "urls",
];

pub fn strip_output_only(obj: &mut serde_json::Value) {
    if let Some(map) = obj.as_object_mut() {
        for key in OUTPUT_ONLY {
            map.remove(*key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn service_page_maps_scaling_and_names() {
        let body = json!({
            "services": [{
                "name": "projects/p/locations/us-east1/services/api",
                "uri": "https://api.run.app",
                "latestReadyRevision": "projects/p/locations/us-east1/services/api/revisions/api-0002",
                "scaling": {"scalingMode": "MANUAL", "manualInstanceCount": 3},
                "trafficStatuses": [{"type": "TRAFFIC_TARGET_ALLOCATION_TYPE_LATEST", "percent": 100}],
                "updateTime": "2024-05-01T10:00:00.123456Z"
            }],
            "nextPageToken": "abc"
        });
        let page: Page<WService> = serde_json::from_value(body).unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));
        let svc = page.items.into_iter().next().unwrap().into_record("p", "us-east1");
        assert_eq!(svc.name, "api");
        assert_eq!(svc.latest_ready_revision, "api-0002");
        assert_eq!(svc.scaling.mode, ScalingMode::Manual);
        assert_eq!(svc.scaling.manual_instances, 3);
        assert_eq!(svc.traffic[0].target(), "LATEST");
        assert!(svc.update_time.is_some());
    }

    #[test]
    fn service_without_scaling_block_is_automatic() {
        let body = json!({"services": [{"name": "projects/p/locations/r/services/bare"}]});
        let page: Page<WService> = serde_json::from_value(body).unwrap();
        assert!(page.next_page_token.is_none());
        let svc = page.items.into_iter().next().unwrap().into_record("p", "r");
        assert_eq!(svc.scaling, Scaling::default());
        assert_eq!(svc.scaling.mode, ScalingMode::Automatic);

        let partial = scaling(Some(WScaling { max_instance_count: Some(4), ..Default::default() }));
        assert_eq!((partial.mode, partial.min_instances, partial.max_instances), (ScalingMode::Automatic, 0, 4));
    }

    #[test]
    fn empty_page_is_default() {
        let page: Page<WJob> = serde_json::from_value(json!({})).unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn revision_reads_container_resources() {
        let body = json!({
            "name": "projects/p/locations/r/services/api/revisions/api-0002",
            "service": "projects/p/locations/r/services/api",
            "containers": [{"image": "gcr.io/p/api:2", "resources": {"cpuIdle": true, "startupCpuBoost": true}}],
            "maxInstanceRequestConcurrency": 80,
            "executionEnvironment": "EXECUTION_ENVIRONMENT_GEN1",
            "conditions": [{"type": "Ready", "state": "CONDITION_SUCCEEDED"}]
        });
        let rev: Revision = serde_json::from_value::<WRevision>(body).unwrap().into();
        assert_eq!(rev.name, "api-0002");
        assert_eq!(rev.images, vec!["gcr.io/p/api:2".to_string()]);
        assert!(rev.cpu_idle && rev.startup_cpu_boost && rev.ready);
    }

    #[test]
    fn domain_mapping_from_v1_items() {
        let body = json!({"items": [{
            "metadata": {"name": "api.example.com", "annotations": {"serving.knative.dev/creator": "me"}},
            "spec": {"routeName": "api"},
            "status": {
                "resourceRecords": [{"type": "CNAME", "name": "api", "rrdata": "ghs.googlehosted.com."}],
                "conditions": [{"type": "Ready", "status": "True"}]
            }
        }]});
        let page: Page<WDomainMapping> = serde_json::from_value(body).unwrap();
        let dm = page.items.into_iter().next().unwrap().into_record("p", "eu");
        assert_eq!(dm.route_name, "api");
        assert_eq!(dm.creator, "me");
        assert_eq!(dm.records[0].rrdata, "ghs.googlehosted.com.");
        assert_eq!(dm.status(), "True");
    }

    #[test]
    fn log_payload_variants() {
        let text: WLogEntry = serde_json::from_value(json!({"timestamp": "2024-05-01T10:00:00Z", "textPayload": "hi"})).unwrap();
        assert_eq!(text.into_record().unwrap().payload, "hi");
        let js: WLogEntry = serde_json::from_value(json!({"timestamp": "2024-05-01T10:00:00Z", "jsonPayload": {"message": "m", "x": 1}})).unwrap();
        assert_eq!(js.into_record().unwrap().payload, "m");
        let none: WLogEntry = serde_json::from_value(json!({"textPayload": "no ts"})).unwrap();
        assert!(none.into_record().is_none());
    }

    #[test]
    fn strip_removes_server_fields_keeps_etag() {
        let mut v = json!({"name": "n", "etag": "e", "uid": "u", "createTime": "t", "scaling": {}});
        strip_output_only(&mut v);
        assert!(v.get("uid").is_none());
        assert!(v.get("createTime").is_none());
        assert_eq!(v["etag"], "e");
    }
}
