//! A generic, recursive value tree plus the operations the loader needs on it:
//! YAML-with-`extends` resolution and deep merging.
//!
//! Chart authors are free to put whatever they like under a deployment's
//! `values`, so we deliberately don't try to project the whole schema into
//! nominal Rust types. [`serde_yaml::Value`] is used while resolving
//! inheritance (it round-trips YAML faithfully); the final, merged tree is
//! converted once into a [`serde_json::Value`] for rendering and equality.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_yaml::Value as YamlValue;

use crate::error::{DefinitionsError, Result};

/// Load a YAML file, following its `extends` chain (if any) and deep-merging
/// each ancestor into its child. `extends` is a path relative to the
/// containing file's directory.
pub fn load_yaml_with_extends(path: &Path) -> Result<YamlValue> {
    let mut seen = HashSet::new();
    resolve(path, &mut seen)
}

fn resolve(path: &Path, seen: &mut HashSet<PathBuf>) -> Result<YamlValue> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !seen.insert(canonical.clone()) {
        return Err(DefinitionsError::ExtendsCycle {
            path: path.display().to_string(),
        });
    }

    let raw = std::fs::read_to_string(path).map_err(|source| DefinitionsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let child: YamlValue = serde_yaml::from_str(&raw).map_err(|source| DefinitionsError::Yaml {
        path: path.display().to_string(),
        source,
    })?;

    let Some(extends) = child.get("extends").and_then(YamlValue::as_str) else {
        seen.remove(&canonical);
        return Ok(child);
    };

    let parent_path = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(extends);
    let parent = resolve(&parent_path, seen)?;
    seen.remove(&canonical);
    Ok(deep_merge(parent, child))
}

/// Deep-merge `child` into `parent`: mapping + mapping merges recursively,
/// anything else is replaced outright by the child's value.
pub fn deep_merge(parent: YamlValue, child: YamlValue) -> YamlValue {
    match (parent, child) {
        (YamlValue::Mapping(mut parent_map), YamlValue::Mapping(child_map)) => {
            for (key, child_value) in child_map {
                let merged = match parent_map.remove(&key) {
                    Some(parent_value) => deep_merge(parent_value, child_value),
                    None => child_value,
                };
                parent_map.insert(key, merged);
            }
            YamlValue::Mapping(parent_map)
        }
        (_, child) => child,
    }
}

/// Convert a resolved YAML tree into the canonical JSON representation used
/// for rendering and for equality (`serde_json`'s default map is
/// `BTreeMap`-backed, so keys come out sorted without any extra work).
pub fn to_canonical_json(value: &YamlValue) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}
