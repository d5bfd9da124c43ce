//! Table columns for the list pages.
//!
//! Each listable record declares a fixed column set and projects itself into display
//! cells, so the UI renders every list page with one generic table.

#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};

use crate::{DomainMapping, Execution, Job, Revision, Service, WorkerPool};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSpec {
    pub label: &'static str,
    /// Percentage of the table width.
    pub width: u16,
}

const fn col(label: &'static str, width: u16) -> ColumnSpec {
    ColumnSpec { label, width }
}

pub trait Tabular {
    fn columns() -> &'static [ColumnSpec];
    fn cells(&self) -> Vec<String>;
}

pub fn fmt_time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M").to_string()).unwrap_or_else(|| "-".into())
}

static SERVICE_COLUMNS: [ColumnSpec; 5] = [
    col("SERVICE", 22),
    col("REGION", 14),
    col("URL", 34),
    col("LAST DEPLOYED BY", 16),
    col("LAST DEPLOYED", 14),
];

impl Tabular for Service {
    fn columns() -> &'static [ColumnSpec] {
        &SERVICE_COLUMNS
    }
    fn cells(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.region.clone(),
            self.uri.clone(),
            self.last_modifier.clone(),
            fmt_time(self.update_time),
        ]
    }
}

static JOB_COLUMNS: [ColumnSpec; 5] = [
    col("JOB", 24),
    col("REGION", 14),
    col("LAST EXECUTED", 18),
    col("STATUS", 20),
    col("CREATED BY", 24),
];

impl Tabular for Job {
    fn columns() -> &'static [ColumnSpec] {
        &JOB_COLUMNS
    }
    fn cells(&self) -> Vec<String> {
        let last = self.latest_execution.as_ref().and_then(|e| e.create_time);
        vec![
            self.name.clone(),
            self.region.clone(),
            fmt_time(last),
            self.status().to_string(),
            self.creator.clone(),
        ]
    }
}

static WORKER_POOL_COLUMNS: [ColumnSpec; 4] = [
    col("WORKER POOL", 34),
    col("REGION", 20),
    col("INSTANCES", 16),
    col("UPDATED", 30),
];

impl Tabular for WorkerPool {
    fn columns() -> &'static [ColumnSpec] {
        &WORKER_POOL_COLUMNS
    }
    fn cells(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.region.clone(),
            self.manual_instances.map(|n| n.to_string()).unwrap_or_else(|| "-".into()),
            fmt_time(self.update_time),
        ]
    }
}

static DOMAIN_MAPPING_COLUMNS: [ColumnSpec; 4] = [
    col("DOMAIN", 36),
    col("MAPPED TO", 24),
    col("REGION", 20),
    col("STATUS", 20),
];

impl Tabular for DomainMapping {
    fn columns() -> &'static [ColumnSpec] {
        &DOMAIN_MAPPING_COLUMNS
    }
    fn cells(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.route_name.clone(),
            self.region.clone(),
            self.status().to_string(),
        ]
    }
}

static REVISION_COLUMNS: [ColumnSpec; 4] = [
    col("REVISION", 36),
    col("READY", 10),
    col("DEPLOYED", 24),
    col("IMAGE", 30),
];

impl Tabular for Revision {
    fn columns() -> &'static [ColumnSpec] {
        &REVISION_COLUMNS
    }
    fn cells(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            if self.ready { "yes".into() } else { "no".into() },
            fmt_time(self.create_time),
            self.images.first().cloned().unwrap_or_default(),
        ]
    }
}

static EXECUTION_COLUMNS: [ColumnSpec; 5] = [
    col("EXECUTION", 34),
    col("STATUS", 14),
    col("STARTED", 20),
    col("TASKS", 12),
    col("FAILED", 20),
];

impl Tabular for Execution {
    fn columns() -> &'static [ColumnSpec] {
        &EXECUTION_COLUMNS
    }
    fn cells(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.status().to_string(),
            fmt_time(self.create_time),
            format!("{}/{}", self.succeeded, self.task_count),
            self.failed.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widths<T: Tabular>() -> u16 {
        T::columns().iter().map(|c| c.width).sum()
    }

    #[test]
    fn cells_match_columns() {
        assert_eq!(Service::default().cells().len(), Service::columns().len());
        assert_eq!(Job::default().cells().len(), Job::columns().len());
        assert_eq!(WorkerPool::default().cells().len(), WorkerPool::columns().len());
        assert_eq!(DomainMapping::default().cells().len(), DomainMapping::columns().len());
        assert_eq!(Revision::default().cells().len(), Revision::columns().len());
        assert_eq!(Execution::default().cells().len(), Execution::columns().len());
    }

    #[test]
    fn widths_fill_the_table() {
        assert_eq!(widths::<Service>(), 100);
        assert_eq!(widths::<Job>(), 100);
        assert_eq!(widths::<WorkerPool>(), 100);
        assert_eq!(widths::<DomainMapping>(), 100);
        assert_eq!(widths::<Revision>(), 100);
        assert_eq!(widths::<Execution>(), 100);
    }

    #[test]
    fn missing_values_render_as_dash() {
        let wp = WorkerPool::default();
        assert_eq!(wp.cells()[2], "-");
        assert_eq!(fmt_time(None), "-");
    }
}
