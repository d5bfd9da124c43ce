//! Region fan-out with best-effort merge.
//!
//! A listing over `Scope::All` runs one fetch per catalog region concurrently and keeps
//! whatever succeeded. A failed region is logged at debug and counted; it never fails the
//! listing. A single-region scope is fetched directly and its error is returned as is.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::Mutex;
use tracing::{debug, info};

use runboard_core::Scope;

use crate::ApiResult;

/// Fetch every partition concurrently and merge the successful result sets.
///
/// Returns once all fetches have finished. Order across partitions follows completion
/// order; within a partition the fetch's own order is kept.
pub async fn fetch_all<R, F, Fut>(partitions: Vec<String>, fetch_one: F) -> Vec<R>
where
    R: Send + 'static,
    F: Fn(String) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = ApiResult<Vec<R>>> + Send + 'static,
{
    let t0 = Instant::now();
    let total = partitions.len();
    let acc: Arc<Mutex<Vec<R>>> = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::with_capacity(total);
    for region in partitions {
        let fetch = fetch_one.clone();
        let acc = acc.clone();
        handles.push(tokio::spawn(async move {
            match fetch(region.clone()).await {
                Ok(rows) => {
                    counter!("fanout_partitions_total", 1u64, "outcome" => "ok");
                    acc.lock().await.extend(rows);
                    true
                }
                Err(e) => {
                    counter!("fanout_partitions_total", 1u64, "outcome" => "failed");
                    debug!(region = %region, error = %e, "fanout: partition dropped");
                    false
                }
            }
        }));
    }
    let mut failed = 0usize;
    for joined in futures::future::join_all(handles).await {
        match joined {
            Ok(true) => {}
            Ok(false) => failed += 1,
            Err(e) => {
                failed += 1;
                debug!(error = %e, "fanout: partition task aborted");
            }
        }
    }
    let rows = match Arc::try_unwrap(acc) {
        Ok(m) => m.into_inner(),
        Err(shared) => std::mem::take(&mut *shared.lock().await),
    };
    let took_ms = t0.elapsed().as_millis();
    histogram!("fanout_duration_ms", took_ms as f64);
    info!(partitions = total, failed, rows = rows.len(), took_ms = %took_ms, "fanout: merged");
    rows
}

/// List over a scope: the whole catalog best-effort, or one region strictly.
pub async fn list_scoped<R, F, Fut>(scope: &Scope, fetch_one: F) -> ApiResult<Vec<R>>
where
    R: Send + 'static,
    F: Fn(String) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = ApiResult<Vec<R>>> + Send + 'static,
{
    match scope {
        Scope::All => Ok(fetch_all(scope.partitions(), fetch_one).await),
        Scope::Region(region) => fetch_one(region.clone()).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ApiError;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        region: String,
        n: usize,
    }

    fn rows(region: &str, n: usize) -> Vec<Row> {
        (0..n).map(|i| Row { region: region.to_string(), n: i }).collect()
    }

    #[tokio::test]
    async fn all_partitions_succeed_sum_of_sizes() {
        let parts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let out = fetch_all(parts.clone(), |r: String| async move {
            let n = match r.as_str() { "a" => 1, "b" => 2, _ => 3 };
            Ok(rows(&r, n))
        })
        .await;
        assert_eq!(out.len(), 6);
        assert!(out.iter().all(|row| parts.contains(&row.region)));
    }

    #[tokio::test]
    async fn failed_partition_is_dropped_silently() {
        let parts = vec!["us".to_string(), "eu".to_string()];
        let out = fetch_all(parts, |r: String| async move {
            if r == "eu" {
                Err(ApiError::Transport("region disabled".into()))
            } else {
                Ok(rows(&r, 2))
            }
        })
        .await;
        assert_eq!(out, rows("us", 2));
    }

    #[tokio::test]
    async fn within_partition_order_is_kept() {
        let parts = vec!["slow".to_string(), "fast".to_string()];
        let out = fetch_all(parts, |r: String| async move {
            if r == "slow" {
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
            Ok(rows(&r, 3))
        })
        .await;
        let slow: Vec<usize> = out.iter().filter(|r| r.region == "slow").map(|r| r.n).collect();
        assert_eq!(slow, vec![0, 1, 2]);
        // fast finished first
        assert_eq!(out[0].region, "fast");
    }

    #[tokio::test]
    async fn empty_partition_set_is_empty() {
        let out: Vec<Row> = fetch_all(Vec::new(), |r: String| async move { Ok(rows(&r, 1)) }).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn single_region_scope_propagates_error() {
        let scope = Scope::Region("eu".into());
        let res: ApiResult<Vec<Row>> =
            list_scoped(&scope, |_r: String| async move { Err(ApiError::NotFound("eu".into())) }).await;
        assert_eq!(res, Err(ApiError::NotFound("eu".into())));
    }

    #[tokio::test]
    async fn all_scope_swallows_errors() {
        let res: ApiResult<Vec<Row>> = list_scoped(&Scope::All, |r: String| async move {
            if r == "us-central1" { Ok(rows(&r, 1)) } else { Err(ApiError::Internal("x".into())) }
        })
        .await;
        assert_eq!(res.unwrap(), rows("us-central1", 1));
    }
}
