//! Runboard core types.
//!
//! Regions (the partitions every listing fans out over), the Cloud Run records the
//! dashboard renders, and the small pieces of string formatting that are shared by the
//! clients and the UI (console links, log filters).

#![forbid(unsafe_code)]

pub mod columns;
pub mod links;
pub mod model;
pub mod region;

pub use model::{
    AccountInfo, Condition, DomainMapping, Execution, ExecutionRef, Job, LogEntry, Project,
    ResourceRecord, Revision, ScaleRequest, Scaling, ScalingMode, Service, TrafficStatus,
    WorkerPool,
};
pub use region::{Scope, ALL};

pub mod prelude {
    pub use super::columns::Tabular;
    pub use super::region::{Regional, Scope};
    pub use super::{DomainMapping, Job, LogEntry, Service, WorkerPool};
}

/// Last path segment of a fully-qualified resource name
/// (`projects/p/locations/r/services/api` -> `api`).
pub fn short_name(full: &str) -> &str {
    full.rsplit('/').next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_takes_last_segment() {
        assert_eq!(short_name("projects/p/locations/us-east1/services/api"), "api");
        assert_eq!(short_name("api"), "api");
        assert_eq!(short_name(""), "");
    }
}
