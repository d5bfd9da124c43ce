//! Active gcloud configuration (account, project, run/region).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcloudInfo {
    pub account: String,
    pub project: String,
    pub region: String,
}

/// `CLOUDSDK_CONFIG`, else `~/.config/gcloud`.
pub fn config_dir() -> Option<PathBuf> {
    if let Some(p) = std::env::var_os("CLOUDSDK_CONFIG") {
        return Some(PathBuf::from(p));
    }
    std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config").join("gcloud"))
}

/// Read the active configuration under the default gcloud directory.
pub fn discover() -> Result<GcloudInfo> {
    let dir = config_dir().context("no gcloud config directory (HOME unset)")?;
    discover_in(&dir)
}

pub fn discover_in(dir: &Path) -> Result<GcloudInfo> {
    let active = std::fs::read_to_string(dir.join("active_config"))
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "default".to_string());
    let name = if active.is_empty() { "default".to_string() } else { active };
    let path = dir.join("configurations").join(format!("config_{name}"));
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading gcloud configuration {}", path.display()))?;
    let info = parse(&text);
    debug!(config = %name, account = %info.account, project = %info.project, region = %info.region, "gcloud: discovered");
    Ok(info)
}

/// Minimal INI reader: `[core] account/project`, `[run] region`.
pub fn parse(text: &str) -> GcloudInfo {
    let mut info = GcloudInfo::default();
    let mut section = String::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name.trim().to_string();
            continue;
        }
        let Some((key, value)) = line.split_once('=') else { continue };
        let (key, value) = (key.trim(), value.trim().to_string());
        match (section.as_str(), key) {
            ("core", "account") => info.account = value,
            ("core", "project") => info.project = value,
            ("run", "region") => info.region = value,
            _ => {}
        }
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "[core]\naccount = dev@example.com\nproject = my-proj\n\n[compute]\nregion = ignored\n\n[run]\nregion = europe-west1\n";

    #[test]
    fn parses_sections() {
        let info = parse(SAMPLE);
        assert_eq!(info.account, "dev@example.com");
        assert_eq!(info.project, "my-proj");
        assert_eq!(info.region, "europe-west1");
    }

    #[test]
    fn reads_active_configuration() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("runboard-gcloud-{nanos}"));
        std::fs::create_dir_all(dir.join("configurations")).unwrap();
        std::fs::write(dir.join("active_config"), "work\n").unwrap();
        std::fs::write(dir.join("configurations").join("config_work"), SAMPLE).unwrap();
        let info = discover_in(&dir).unwrap();
        assert_eq!(info.project, "my-proj");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_configuration_is_error() {
        let dir = std::env::temp_dir().join("runboard-gcloud-does-not-exist");
        assert!(discover_in(&dir).is_err());
    }
}
