//! Cloud Run records as the dashboard sees them.
//!
//! These are domain shapes, not wire shapes: the production client maps the REST
//! payloads into them and stamps each record with the project and region it came from.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::region::Regional;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub kind: String,
    pub state: String,
    pub message: String,
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    pub fn is_ready(&self) -> bool {
        self.state == "CONDITION_SUCCEEDED"
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalingMode {
    #[default]
    Automatic,
    Manual,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scaling {
    pub mode: ScalingMode,
    pub min_instances: i32,
    pub max_instances: i32,
    pub manual_instances: i32,
}

impl Scaling {
    pub fn summary(&self) -> String {
        match self.mode {
            ScalingMode::Manual => format!("manual: {}", self.manual_instances),
            ScalingMode::Automatic if self.max_instances > 0 => {
                format!("auto: {}-{}", self.min_instances, self.max_instances)
            }
            ScalingMode::Automatic => format!("auto: min {}", self.min_instances),
        }
    }
}

/// Requested scaling change for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleRequest {
    Manual { instances: i32 },
    Automatic { min: i32, max: i32 },
}

impl ScaleRequest {
    /// A positive manual count wins; anything else is automatic min/max.
    pub fn from_counts(min: i32, max: i32, manual: i32) -> Self {
        if manual > 0 {
            ScaleRequest::Manual { instances: manual }
        } else {
            ScaleRequest::Automatic { min, max }
        }
    }

    /// Scaling block the request leaves on the service. Manual mode zeroes min/max.
    pub fn apply(&self) -> Scaling {
        match *self {
            ScaleRequest::Manual { instances } => Scaling {
                mode: ScalingMode::Manual,
                min_instances: 0,
                max_instances: 0,
                manual_instances: instances,
            },
            ScaleRequest::Automatic { min, max } => Scaling {
                mode: ScalingMode::Automatic,
                min_instances: min,
                max_instances: max,
                manual_instances: 0,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficStatus {
    pub kind: String,
    pub revision: String,
    pub percent: i32,
    pub tag: String,
    pub uri: String,
}

impl TrafficStatus {
    pub fn target(&self) -> &str {
        if self.kind == "TRAFFIC_TARGET_ALLOCATION_TYPE_LATEST" {
            "LATEST"
        } else {
            self.revision.as_str()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub full_name: String,
    pub description: String,
    pub uri: String,
    pub project: String,
    pub region: String,
    pub creator: String,
    pub last_modifier: String,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
    pub latest_ready_revision: String,
    pub latest_created_revision: String,
    pub traffic: Vec<TrafficStatus>,
    pub scaling: Scaling,
    pub terminal_condition: Option<Condition>,
    pub etag: String,
}

impl Service {
    /// Traffic share and tags routed to `revision`, e.g. `("100% (to latest)", "blue")`.
    pub fn traffic_for(&self, revision: &str) -> (String, String) {
        let mut share = "0%".to_string();
        let mut tags: Vec<&str> = Vec::new();
        for t in &self.traffic {
            let to_latest = t.kind == "TRAFFIC_TARGET_ALLOCATION_TYPE_LATEST" && revision == self.latest_ready_revision;
            if !to_latest && t.revision != revision {
                continue;
            }
            if t.percent > 0 {
                share = format!("{}%", t.percent);
                if to_latest {
                    share.push_str(" (to latest)");
                }
            }
            if !t.tag.is_empty() {
                tags.push(&t.tag);
            }
        }
        (share, tags.join(", "))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub name: String,
    pub service: String,
    pub create_time: Option<DateTime<Utc>>,
    pub images: Vec<String>,
    pub max_concurrency: i32,
    pub timeout: String,
    pub execution_environment: String,
    /// CPU is only allocated while requests are processed.
    pub cpu_idle: bool,
    pub startup_cpu_boost: bool,
    pub ready: bool,
    pub log_uri: String,
}

impl Revision {
    /// `(label, value)` lines for the revision detail panel.
    pub fn details(&self) -> Vec<(&'static str, String)> {
        let billing = if self.cpu_idle {
            "CPU is only allocated during request processing"
        } else {
            "CPU is always allocated"
        };
        let environment = match self.execution_environment.as_str() {
            "" | "EXECUTION_ENVIRONMENT_UNSPECIFIED" => "Default".to_string(),
            "EXECUTION_ENVIRONMENT_GEN1" => "First Generation".to_string(),
            "EXECUTION_ENVIRONMENT_GEN2" => "Second Generation".to_string(),
            other => other.to_string(),
        };
        vec![
            ("Name", self.name.clone()),
            ("Created", self.create_time.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()).unwrap_or_default()),
            ("Billing", billing.to_string()),
            ("Startup CPU boost", if self.startup_cpu_boost { "Enabled" } else { "Disabled" }.to_string()),
            ("Concurrency", self.max_concurrency.to_string()),
            ("Request timeout", self.timeout.clone()),
            ("Execution environment", environment),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRef {
    pub name: String,
    pub create_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub full_name: String,
    pub project: String,
    pub region: String,
    pub creator: String,
    pub update_time: Option<DateTime<Utc>>,
    pub latest_execution: Option<ExecutionRef>,
    pub terminal_condition: Option<Condition>,
}

impl Job {
    pub fn status(&self) -> &str {
        self.terminal_condition
            .as_ref()
            .map(|c| c.state.as_str())
            .unwrap_or("-")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub name: String,
    pub job: String,
    pub create_time: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
    pub task_count: i32,
    pub running: i32,
    pub succeeded: i32,
    pub failed: i32,
    pub cancelled: i32,
}

impl Execution {
    pub fn status(&self) -> &'static str {
        if self.completion_time.is_none() {
            "Running"
        } else if self.failed > 0 {
            "Failed"
        } else if self.cancelled > 0 {
            "Cancelled"
        } else {
            "Succeeded"
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerPool {
    pub name: String,
    pub full_name: String,
    pub project: String,
    pub region: String,
    pub update_time: Option<DateTime<Utc>>,
    pub labels: BTreeMap<String, String>,
    pub manual_instances: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub kind: String,
    pub name: String,
    pub rrdata: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainMapping {
    pub name: String,
    pub route_name: String,
    pub project: String,
    pub region: String,
    pub creator: String,
    pub create_time: Option<DateTime<Utc>>,
    pub records: Vec<ResourceRecord>,
    pub conditions: Vec<Condition>,
}

impl DomainMapping {
    /// `Ready` condition state, or `-` when the mapping has not reported one yet.
    pub fn status(&self) -> &str {
        self.conditions
            .iter()
            .find(|c| c.kind == "Ready")
            .map(|c| c.state.as_str())
            .unwrap_or("-")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub display_name: String,
    pub number: String,
}

/// One log line from the upstream log source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: String,
    pub payload: String,
}

impl LogEntry {
    /// `[HH:MM:SS] payload`
    pub fn line(&self) -> String {
        format!("[{}] {}", self.timestamp.format("%H:%M:%S"), self.payload)
    }
}

/// Who is looking at what: shown in the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub user: String,
    pub project: String,
    pub region: crate::Scope,
}

impl Default for AccountInfo {
    fn default() -> Self {
        Self { user: "Guest".into(), project: "None".into(), region: crate::Scope::All }
    }
}

macro_rules! regional {
    ($($t:ty),*) => {
        $(impl Regional for $t {
            fn name(&self) -> &str { &self.name }
            fn region(&self) -> &str { &self.region }
        })*
    };
}

regional!(Service, Job, WorkerPool, DomainMapping);

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn traffic_is_attributed_to_latest_and_named_revisions() {
        let svc = Service {
            latest_ready_revision: "api-0002".into(),
            traffic: vec![
                TrafficStatus { kind: "TRAFFIC_TARGET_ALLOCATION_TYPE_LATEST".into(), percent: 90, ..Default::default() },
                TrafficStatus {
                    kind: "TRAFFIC_TARGET_ALLOCATION_TYPE_REVISION".into(),
                    revision: "api-0001".into(),
                    percent: 10,
                    tag: "canary".into(),
                    ..Default::default()
                },
                TrafficStatus { revision: "api-0001".into(), tag: "blue".into(), ..Default::default() },
            ],
            ..Default::default()
        };
        assert_eq!(svc.traffic_for("api-0002"), ("90% (to latest)".to_string(), String::new()));
        assert_eq!(svc.traffic_for("api-0001"), ("10%".to_string(), "canary, blue".to_string()));
        assert_eq!(svc.traffic_for("api-0000"), ("0%".to_string(), String::new()));
    }

    #[test]
    fn revision_details_name_the_environment() {
        let rev = Revision {
            name: "api-0002".into(),
            create_time: Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()),
            max_concurrency: 80,
            timeout: "300s".into(),
            execution_environment: "EXECUTION_ENVIRONMENT_GEN2".into(),
            cpu_idle: true,
            ..Default::default()
        };
        let details: BTreeMap<_, _> = rev.details().into_iter().collect();
        assert_eq!(details["Created"], "2024-05-01 10:00:00");
        assert_eq!(details["Billing"], "CPU is only allocated during request processing");
        assert_eq!(details["Startup CPU boost"], "Disabled");
        assert_eq!(details["Concurrency"], "80");
        assert_eq!(details["Execution environment"], "Second Generation");
        assert_eq!(Revision::default().details()[6].1, "Default");
    }

    #[test]
    fn scale_request_prefers_manual() {
        assert_eq!(ScaleRequest::from_counts(1, 5, 3), ScaleRequest::Manual { instances: 3 });
        assert_eq!(ScaleRequest::from_counts(1, 5, 0), ScaleRequest::Automatic { min: 1, max: 5 });
        let s = ScaleRequest::Manual { instances: 4 }.apply();
        assert_eq!((s.mode, s.min_instances, s.max_instances, s.manual_instances), (ScalingMode::Manual, 0, 0, 4));
        let s = ScaleRequest::Automatic { min: 2, max: 0 }.apply();
        assert_eq!(s.mode, ScalingMode::Automatic);
        assert_eq!(s.summary(), "auto: min 2");
    }

    #[test]
    fn log_line_format() {
        let e = LogEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 2).unwrap(),
            severity: "INFO".into(),
            payload: "hello".into(),
        };
        assert_eq!(e.line(), "[10:00:02] hello");
    }

    #[test]
    fn execution_status() {
        let mut e = Execution::default();
        assert_eq!(e.status(), "Running");
        e.completion_time = Some(Utc::now());
        assert_eq!(e.status(), "Succeeded");
        e.failed = 1;
        assert_eq!(e.status(), "Failed");
    }
}
