//! Runboard persistence: the `~/.run.yaml` settings file and gcloud config discovery.
//! Keep code tiny and predictable.

#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use runboard_core::{AccountInfo, Scope};

pub mod gcloud;

pub use gcloud::GcloudInfo;

/// Last project and region the user picked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,
}

impl Config {
    /// Load from `RUN_CONFIG` or `~/.run.yaml`.
    pub fn load() -> Result<Self> {
        Self::load_from(&default_path())
    }

    /// A missing file is an empty config; an unreadable or corrupted one is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config: no file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e).with_context(|| format!("reading config at {}", path.display())),
        };
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing config at {}", path.display()))?;
        Ok(cfg)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            }
        }
        let text = serde_yaml::to_string(self).context("encoding config")?;
        std::fs::write(path, text).with_context(|| format!("writing config at {}", path.display()))?;
        counter!("config_saves_total", 1u64);
        info!(path = %path.display(), project = %self.project, region = %self.region, "config: saved");
        Ok(())
    }
}

pub fn default_path() -> PathBuf {
    if let Some(p) = std::env::var_os("RUN_CONFIG") {
        return PathBuf::from(p);
    }
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = PathBuf::from(home);
        p.push(".run.yaml");
        return p;
    }
    // Fallback to current directory
    PathBuf::from(".run.yaml")
}

/// Header identity: gcloud values, overridden by the config file, overridden by flags.
pub fn resolve_info(
    gcloud: Option<&GcloudInfo>,
    cfg: &Config,
    project_flag: Option<&str>,
    region_flag: Option<&str>,
) -> AccountInfo {
    let mut info = AccountInfo::default();
    if let Some(g) = gcloud {
        if !g.account.is_empty() {
            info.user = g.account.clone();
        }
        if !g.project.is_empty() {
            info.project = g.project.clone();
        }
        if !g.region.is_empty() {
            info.region = Scope::parse(&g.region);
        }
    }
    if !cfg.region.is_empty() {
        info.region = Scope::parse(&cfg.region);
    }
    if !cfg.project.is_empty() {
        info.project = cfg.project.clone();
    }
    if let Some(p) = project_flag.filter(|p| !p.is_empty()) {
        info.project = p.to_string();
    }
    if let Some(r) = region_flag.filter(|r| !r.is_empty()) {
        info.region = Scope::parse(r);
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("runboard-{tag}-{nanos}.yaml"))
    }

    #[test]
    fn save_then_load() {
        let path = temp_path("cfg");
        let cfg = Config { project: "p1".into(), region: "us-east1".into() };
        cfg.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), cfg);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_default() {
        let cfg = Config::load_from(&temp_path("missing")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn corrupted_file_is_error() {
        let path = temp_path("bad");
        std::fs::write(&path, "project: [unterminated\n").unwrap();
        assert!(Config::load_from(&path).is_err());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn empty_fields_are_not_written() {
        let path = temp_path("partial");
        Config { project: "p".into(), region: String::new() }.save_to(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("project: p"));
        assert!(!text.contains("region"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn resolution_order() {
        let g = GcloudInfo { account: "me@x".into(), project: "from-gcloud".into(), region: "eu".into() };
        let cfg = Config { project: "from-config".into(), region: String::new() };
        let info = resolve_info(Some(&g), &cfg, None, None);
        assert_eq!(info.user, "me@x");
        assert_eq!(info.project, "from-config");
        assert_eq!(info.region, Scope::Region("eu".into()));

        let info = resolve_info(Some(&g), &cfg, Some("flag"), Some("all"));
        assert_eq!(info.project, "flag");
        assert_eq!(info.region, Scope::All);

        let info = resolve_info(None, &Config::default(), None, None);
        assert_eq!(info, AccountInfo::default());
    }
}
