//! Region catalog and listing scope.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel selecting every region of the catalog.
pub const ALL: &str = "all";

/// Cloud Run regions a fan-out listing enumerates.
pub const CATALOG: [&str; 24] = [
    "asia-east1",
    "asia-northeast1",
    "asia-northeast2",
    "asia-northeast3",
    "asia-south1",
    "asia-southeast1",
    "asia-southeast2",
    "australia-southeast1",
    "europe-central2",
    "europe-north1",
    "europe-west1",
    "europe-west2",
    "europe-west3",
    "europe-west4",
    "europe-west6",
    "northamerica-northeast1",
    "southamerica-east1",
    "us-central1",
    "us-east1",
    "us-east4",
    "us-west1",
    "us-west2",
    "us-west3",
    "us-west4",
];

pub fn catalog() -> Vec<String> {
    CATALOG.iter().map(|r| (*r).to_string()).collect()
}

/// Where a listing looks: one named region or the whole catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Scope {
    All,
    Region(String),
}

impl Scope {
    /// Empty input and the `all` sentinel both select every region.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case(ALL) {
            Scope::All
        } else {
            Scope::Region(s.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Scope::All => ALL,
            Scope::Region(r) => r.as_str(),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Scope::All)
    }

    /// Regions this scope expands to.
    pub fn partitions(&self) -> Vec<String> {
        match self {
            Scope::All => catalog(),
            Scope::Region(r) => vec![r.clone()],
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Scope::All
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Scope {
    fn from(s: String) -> Self {
        Scope::parse(&s)
    }
}

impl From<Scope> for String {
    fn from(s: Scope) -> Self {
        s.as_str().to_string()
    }
}

/// A record tagged with the region that produced it.
pub trait Regional {
    fn name(&self) -> &str;
    fn region(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sentinel_and_empty() {
        assert_eq!(Scope::parse("all"), Scope::All);
        assert_eq!(Scope::parse("ALL"), Scope::All);
        assert_eq!(Scope::parse(""), Scope::All);
        assert_eq!(Scope::parse(" us-east1 "), Scope::Region("us-east1".into()));
    }

    #[test]
    fn partitions_expand_catalog() {
        let all = Scope::All.partitions();
        assert_eq!(all.len(), CATALOG.len());
        assert!(all.iter().any(|r| r == "us-central1"));
        assert!(all.iter().any(|r| r == "europe-west1"));
        assert_eq!(Scope::Region("eu".into()).partitions(), vec!["eu".to_string()]);
    }

    #[test]
    fn scope_serializes_as_plain_string() {
        let v = serde_json::to_string(&Scope::Region("us-west1".into())).unwrap();
        assert_eq!(v, "\"us-west1\"");
        let s: Scope = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(s, Scope::All);
    }
}
