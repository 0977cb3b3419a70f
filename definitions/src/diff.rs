//! Computing the added/updated/removed delta between two snapshots of an
//! apps tree — the thing a push event is actually turned into before any
//! Helm command runs.

use std::collections::BTreeSet;

use tracing::info;

use crate::loader::AppDefinitions;

/// The set of apps that changed between a previous and current snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub added: BTreeSet<String>,
    pub updated: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Diff `previous` against `current`. An app present in both whose values
/// changed is reported as updated, unless it's tagged `inactive`, in which
/// case the change is skipped and logged rather than deployed. Newly added
/// apps are always deployed regardless of the `inactive` tag, matching the
/// upstream deployer (inactive only suppresses *changes*, not initial
/// rollout).
pub fn compute_deltas(previous: &AppDefinitions, current: &AppDefinitions) -> Delta {
    let prev_names: BTreeSet<&String> = previous.apps.keys().collect();
    let cur_names: BTreeSet<&String> = current.apps.keys().collect();

    let added = cur_names.difference(&prev_names).map(|s| (*s).clone()).collect();
    let removed = prev_names.difference(&cur_names).map(|s| (*s).clone()).collect();

    let mut updated = BTreeSet::new();
    for name in cur_names.intersection(&prev_names) {
        let cur_app = &current.apps[*name];
        let prev_app = &previous.apps[*name];
        if cur_app.same_definition_as(prev_app) {
            continue;
        }
        if cur_app.is_inactive() {
            info!(app = %name, "skipping change: app is marked inactive");
            continue;
        }
        updated.insert((*name).clone());
    }

    Delta { added, updated, removed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;
    use crate::chart::Chart;
    use serde_json::json;

    fn app(name: &str, values: serde_json::Value, tags: Vec<&str>) -> App {
        App {
            name: name.to_string(),
            namespace: "web".to_string(),
            cluster: "prod".to_string(),
            tags: tags.into_iter().map(str::to_string).collect(),
            chart: Chart::Local { path: "/dev/null".to_string() },
            values,
        }
    }

    fn defs(apps: Vec<App>) -> AppDefinitions {
        AppDefinitions {
            apps: apps.into_iter().map(|a| (a.name.clone(), a)).collect(),
        }
    }

    #[test]
    fn detects_added_updated_and_removed() {
        let previous = defs(vec![
            app("keep-same", json!({"v": 1}), vec![]),
            app("will-change", json!({"v": 1}), vec![]),
            app("will-be-removed", json!({"v": 1}), vec![]),
        ]);
        let current = defs(vec![
            app("keep-same", json!({"v": 1}), vec![]),
            app("will-change", json!({"v": 2}), vec![]),
            app("brand-new", json!({"v": 1}), vec![]),
        ]);

        let delta = compute_deltas(&previous, &current);
        assert_eq!(delta.added, BTreeSet::from(["brand-new".to_string()]));
        assert_eq!(delta.updated, BTreeSet::from(["will-change".to_string()]));
        assert_eq!(delta.removed, BTreeSet::from(["will-be-removed".to_string()]));
    }

    #[test]
    fn inactive_apps_skip_updates_but_not_additions() {
        let previous = defs(vec![app("quiet", json!({"v": 1}), vec!["inactive"])]);
        let current = defs(vec![
            app("quiet", json!({"v": 2}), vec!["inactive"]),
            app("fresh-but-inactive", json!({"v": 1}), vec!["inactive"]),
        ]);

        let delta = compute_deltas(&previous, &current);
        assert!(delta.updated.is_empty());
        assert_eq!(delta.added, BTreeSet::from(["fresh-but-inactive".to_string()]));
    }

    #[test]
    fn no_changes_is_an_empty_delta() {
        let snapshot = defs(vec![app("steady", json!({"v": 1}), vec![])]);
        let delta = compute_deltas(&snapshot, &snapshot.clone());
        assert!(delta.is_empty());
    }
}
