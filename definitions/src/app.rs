//! The `App` type: one deployable unit within a cluster's app definitions.

use serde_json::Value;

use crate::chart::Chart;

/// A single application, fully resolved: `extends` chains flattened,
/// `images`/`image-tag` collapsed into a literal `image`, and secrets spliced
/// in. `values` is the canonical JSON tree handed to the chart renderer.
#[derive(Debug, Clone)]
pub struct App {
    pub name: String,
    pub namespace: String,
    pub cluster: String,
    pub tags: Vec<String>,
    pub chart: Chart,
    pub values: Value,
}

impl App {
    pub fn is_inactive(&self) -> bool {
        self.has_tag("inactive")
    }

    pub fn is_suspended(&self) -> bool {
        self.has_tag("suspended")
    }

    fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// The fully-qualified image reference, if the values tree resolved one.
    pub fn image(&self) -> Option<&str> {
        self.values.get("image").and_then(Value::as_str)
    }

    /// Two apps are the same deployable unit, in the same desired state, when
    /// their name and canonical values agree. Namespace/cluster/chart are
    /// derived from the same definition and the name, so they never diverge
    /// independently of `values`.
    pub fn same_definition_as(&self, other: &App) -> bool {
        self.name == other.name && self.values == other.values
    }
}

impl PartialEq for App {
    fn eq(&self, other: &Self) -> bool {
        self.same_definition_as(other)
    }
}
