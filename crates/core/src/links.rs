//! Console links and log filters.

pub const RELEASE_NOTES_URL: &str = "https://docs.cloud.google.com/run/docs/release-notes";

pub fn console(project: &str) -> String {
    format!("https://console.cloud.google.com/run?project={project}")
}

pub fn console_service(project: &str, region: &str, name: &str) -> String {
    format!("https://console.cloud.google.com/run/detail/{region}/{name}/metrics?project={project}")
}

pub fn console_jobs(project: &str) -> String {
    format!("https://console.cloud.google.com/run/jobs?project={project}")
}

pub fn console_job(project: &str, region: &str, name: &str) -> String {
    format!("https://console.cloud.google.com/run/jobs/details/{region}/{name}/metrics?project={project}")
}

pub fn console_worker_pools(project: &str) -> String {
    format!("https://console.cloud.google.com/run/workerpools?project={project}")
}

pub fn console_worker_pool(project: &str, region: &str, name: &str) -> String {
    format!("https://console.cloud.google.com/run/workerpools/details/{region}/{name}?project={project}")
}

/// Which kind of workload a log tail follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Service,
    Job,
}

/// Cloud Logging filter selecting one workload's entries.
pub fn log_filter(target: LogTarget, name: &str, region: &str) -> String {
    match target {
        LogTarget::Service => format!(
            "resource.type=\"cloud_run_revision\" resource.labels.service_name=\"{name}\" resource.labels.location=\"{region}\""
        ),
        LogTarget::Job => format!(
            "resource.type=\"cloud_run_job\" resource.labels.job_name=\"{name}\" resource.labels.location=\"{region}\""
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_quote_name_and_location() {
        assert_eq!(
            log_filter(LogTarget::Service, "api", "us-east1"),
            r#"resource.type="cloud_run_revision" resource.labels.service_name="api" resource.labels.location="us-east1""#
        );
        assert!(log_filter(LogTarget::Job, "nightly", "eu").contains(r#"resource.labels.job_name="nightly""#));
    }

    #[test]
    fn console_links() {
        assert_eq!(console("p1"), "https://console.cloud.google.com/run?project=p1");
        assert_eq!(
            console_service("p1", "us-east1", "api"),
            "https://console.cloud.google.com/run/detail/us-east1/api/metrics?project=p1"
        );
        assert!(console_worker_pool("p", "r", "w").ends_with("/details/r/w?project=p"));
    }
}
