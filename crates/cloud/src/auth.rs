//! OAuth access tokens for the REST calls.

use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use runboard_api::{ApiError, ApiResult};

/// gcloud tokens live for an hour; refresh well before that.
const TOKEN_TTL: Duration = Duration::from_secs(45 * 60);

/// Where bearer tokens come from.
pub enum TokenSource {
    /// Fixed token (`RUN_ACCESS_TOKEN` / `GOOGLE_OAUTH_ACCESS_TOKEN`), never refreshed.
    Static(String),
    /// `gcloud auth print-access-token`, cached.
    Gcloud(Mutex<Option<(String, Instant)>>),
}

impl TokenSource {
    pub fn from_env() -> Self {
        for key in ["RUN_ACCESS_TOKEN", "GOOGLE_OAUTH_ACCESS_TOKEN"] {
            if let Some(tok) = std::env::var(key).ok().filter(|t| !t.trim().is_empty()) {
                debug!(source = key, "auth: using token from environment");
                return TokenSource::Static(tok.trim().to_string());
            }
        }
        TokenSource::Gcloud(Mutex::new(None))
    }

    pub async fn token(&self) -> ApiResult<String> {
        match self {
            TokenSource::Static(t) => Ok(t.clone()),
            TokenSource::Gcloud(cache) => {
                let mut guard = cache.lock().await;
                if let Some((tok, at)) = guard.as_ref() {
                    if at.elapsed() < TOKEN_TTL {
                        return Ok(tok.clone());
                    }
                }
                let tok = print_access_token().await?;
                *guard = Some((tok.clone(), Instant::now()));
                Ok(tok)
            }
        }
    }

    /// Drop a cached token after the server rejected it.
    pub async fn invalidate(&self) {
        if let TokenSource::Gcloud(cache) = self {
            cache.lock().await.take();
        }
    }
}

async fn print_access_token() -> ApiResult<String> {
    let out = Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .output()
        .await
        .map_err(|e| ApiError::Auth(format!("running gcloud: {e}")))?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
        warn!(status = ?out.status.code(), "auth: gcloud print-access-token failed");
        return Err(ApiError::Auth(if stderr.is_empty() { "gcloud returned no token".into() } else { stderr }));
    }
    let tok = String::from_utf8_lossy(&out.stdout).trim().to_string();
    if tok.is_empty() {
        return Err(ApiError::Auth("gcloud returned no token".into()));
    }
    debug!("auth: refreshed token via gcloud");
    Ok(tok)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_token_is_returned_as_is() {
        let src = TokenSource::Static("abc".into());
        assert_eq!(src.token().await.unwrap(), "abc");
        src.invalidate().await;
        assert_eq!(src.token().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn cached_gcloud_token_is_reused() {
        let src = TokenSource::Gcloud(Mutex::new(Some(("cached".into(), Instant::now()))));
        assert_eq!(src.token().await.unwrap(), "cached");
    }
}
