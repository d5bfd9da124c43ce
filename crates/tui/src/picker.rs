//! Filterable list used by the project and region dialogs.

#![forbid(unsafe_code)]

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

use runboard_core::region;
use runboard_core::{Project, ALL};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickItem {
    /// What selecting the row yields (project id, region code or `all`).
    pub value: String,
    pub label: String,
}

#[derive(Debug, Default, Clone)]
pub struct Picker {
    pub items: Vec<PickItem>,
    pub query: String,
    pub selected: usize,
}

impl Picker {
    pub fn new(items: Vec<PickItem>) -> Self {
        Self { items, query: String::new(), selected: 0 }
    }

    pub fn projects(projects: &[Project]) -> Self {
        Self::new(
            projects
                .iter()
                .map(|p| PickItem {
                    value: p.id.clone(),
                    label: if p.display_name.is_empty() || p.display_name == p.id {
                        p.id.clone()
                    } else {
                        format!("{} ({})", p.id, p.display_name)
                    },
                })
                .collect(),
        )
    }

    pub fn regions() -> Self {
        let mut items = vec![PickItem { value: ALL.to_string(), label: "- (All Regions)".to_string() }];
        items.extend(region::catalog().into_iter().map(|r| PickItem { label: r.clone(), value: r }));
        Self::new(items)
    }

    /// Items matching the query, best first. An empty query keeps catalog order.
    pub fn visible(&self) -> Vec<&PickItem> {
        let q = self.query.trim();
        if q.is_empty() {
            return self.items.iter().collect();
        }
        let matcher = SkimMatcherV2::default();
        let mut scored: Vec<(i64, usize, &PickItem)> = self
            .items
            .iter()
            .enumerate()
            .filter_map(|(i, it)| matcher.fuzzy_match(&it.label, q).map(|s| (s, i, it)))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.into_iter().map(|(_, _, it)| it).collect()
    }

    pub fn selected_item(&self) -> Option<&PickItem> {
        self.visible().get(self.selected).copied()
    }

    pub fn push(&mut self, c: char) {
        self.query.push(c);
        self.selected = 0;
    }

    pub fn pop(&mut self) {
        self.query.pop();
        self.selected = 0;
    }

    pub fn next(&mut self) {
        let n = self.visible().len();
        if n > 0 {
            self.selected = (self.selected + 1).min(n - 1);
        }
    }

    pub fn prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_start_with_all() {
        let p = Picker::regions();
        assert_eq!(p.selected_item().map(|i| i.value.as_str()), Some("all"));
        assert_eq!(p.items.len(), region::catalog().len() + 1);
    }

    #[test]
    fn filter_narrows_and_resets_selection() {
        let mut p = Picker::regions();
        p.next();
        for c in "euw1".chars() {
            p.push(c);
        }
        assert_eq!(p.selected, 0);
        let vis = p.visible();
        assert!(!vis.is_empty());
        assert!(vis.iter().all(|i| i.value.starts_with("europe-west1") || i.value.contains("eu")));
        assert!(vis.iter().all(|i| i.value != "all"));
    }

    #[test]
    fn project_labels() {
        let p = Picker::projects(&[
            Project { id: "a".into(), display_name: "A team".into(), number: "1".into() },
            Project { id: "b".into(), display_name: "b".into(), number: "2".into() },
        ]);
        assert_eq!(p.items[0].label, "a (A team)");
        assert_eq!(p.items[1].label, "b");
    }
}
