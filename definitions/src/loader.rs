//! Discovers and loads the `apps/<name>/` tree making up a cluster's desired
//! state.

use std::collections::BTreeMap;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;

use crate::app::App;
use crate::chart::Chart;
use crate::error::{DefinitionsError, Result};
use crate::value::{load_yaml_with_extends, to_canonical_json};

/// All apps declared for one cluster checkout, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct AppDefinitions {
    pub apps: BTreeMap<String, App>,
}

/// Load every app under `root/apps/`, keep only the ones targeting
/// `cluster_name` and not tagged `suspended`, and fail on malformed
/// definitions (missing `namespace`/`cluster`/`chart`, or an unrecognized
/// chart type).
///
/// `account_id` is spliced into `images.template` the same way a literal
/// `{account_id}` placeholder is, so chart authors can bake account-specific
/// registry hosts into their image template without the loader needing to
/// know anything else about it.
pub fn load_app_definitions(root: &Path, cluster_name: &str, account_id: &str) -> Result<AppDefinitions> {
    let apps_dir = root.join("apps");
    let mut apps = BTreeMap::new();

    let entries = std::fs::read_dir(&apps_dir).map_err(|source| DefinitionsError::Io {
        path: apps_dir.display().to_string(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| DefinitionsError::Io {
            path: apps_dir.display().to_string(),
            source,
        })?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || path.is_file() {
            continue;
        }

        let deployment_path = path.join("deployment.yml");
        let secrets_path = path.join("secrets.yml");
        if !deployment_path.is_file() || !secrets_path.is_file() {
            continue;
        }

        let app = load_app(&name, &deployment_path, &secrets_path, account_id)?;

        if app.cluster != cluster_name || app.is_suspended() {
            continue;
        }

        apps.insert(name, app);
    }

    Ok(AppDefinitions { apps })
}

fn load_app(name: &str, deployment_path: &Path, secrets_path: &Path, account_id: &str) -> Result<App> {
    let deployment = load_yaml_with_extends(deployment_path)?;
    let secrets = load_yaml_with_extends(secrets_path)?;

    let deployment_json = to_canonical_json(&deployment);
    let secrets_json = to_canonical_json(&secrets);

    let mut values = match deployment_json {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };

    let image = make_image(&values, account_id);
    let secrets_b64 = encode_secrets(&secrets_json);

    values.remove("images");
    values.insert("secrets".to_string(), Value::Object(secrets_b64));
    if let Some(image) = image {
        values.insert("image".to_string(), Value::String(image));
    }

    let namespace = values
        .get("namespace")
        .and_then(Value::as_str)
        .ok_or_else(|| DefinitionsError::MissingField {
            name: name.to_string(),
            field: "namespace",
        })?
        .to_string();

    let cluster = values
        .get("cluster")
        .and_then(Value::as_str)
        .ok_or_else(|| DefinitionsError::MissingField {
            name: name.to_string(),
            field: "cluster",
        })?
        .to_string();

    let tags = values
        .get("tags")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    let chart_value = values
        .get("chart")
        .cloned()
        .ok_or_else(|| DefinitionsError::MissingField {
            name: name.to_string(),
            field: "chart",
        })?;
    let chart = Chart::from_value(name, &chart_value)?;

    Ok(App {
        name: name.to_string(),
        namespace,
        cluster,
        tags,
        chart,
        values: Value::Object(values),
    })
}

/// `image-tag` + `images.template` (with `{account_id}`/`{tag}` placeholders)
/// takes precedence over a literal `image` field.
fn make_image(values: &serde_json::Map<String, Value>, account_id: &str) -> Option<String> {
    let tag = values.get("image-tag").and_then(Value::as_str);
    match tag {
        Some(tag) => {
            let template = values.get("images")?.get("template")?.as_str()?;
            Some(
                template
                    .replace("{account_id}", account_id)
                    .replace("{tag}", tag),
            )
        }
        None => values.get("image").and_then(Value::as_str).map(str::to_string),
    }
}

fn encode_secrets(secrets: &Value) -> serde_json::Map<String, Value> {
    let inner = secrets.get("secrets").unwrap_or(secrets);
    let mut out = serde_json::Map::new();
    if let Value::Object(map) = inner {
        for (key, value) in map {
            if let Some(s) = value.as_str() {
                out.insert(key.clone(), Value::String(BASE64.encode(s.as_bytes())));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_app(root: &Path, name: &str, deployment: &str, secrets: &str) {
        let dir = root.join("apps").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("deployment.yml"), deployment).unwrap();
        std::fs::write(dir.join("secrets.yml"), secrets).unwrap();
    }

    #[test]
    fn loads_matching_cluster_and_skips_others() {
        let tmp = TempDir::new().unwrap();
        write_app(
            tmp.path(),
            "web",
            "namespace: web\ncluster: prod\nchart: https://example.com/chart@deadbeef\ntags: []\n",
            "secrets: {}\n",
        );
        write_app(
            tmp.path(),
            "other-cluster-app",
            "namespace: web\ncluster: staging\nchart: https://example.com/chart@deadbeef\ntags: []\n",
            "secrets: {}\n",
        );

        let defs = load_app_definitions(tmp.path(), "prod", "111122223333").unwrap();
        assert_eq!(defs.apps.len(), 1);
        assert!(defs.apps.contains_key("web"));
    }

    #[test]
    fn suspended_apps_are_excluded() {
        let tmp = TempDir::new().unwrap();
        write_app(
            tmp.path(),
            "paused",
            "namespace: web\ncluster: prod\nchart: https://example.com/chart@deadbeef\ntags: [suspended]\n",
            "secrets: {}\n",
        );

        let defs = load_app_definitions(tmp.path(), "prod", "").unwrap();
        assert!(defs.apps.is_empty());
    }

    #[test]
    fn missing_sibling_file_skips_the_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("apps").join("half-baked");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("deployment.yml"), "namespace: web\ncluster: prod\n").unwrap();

        let defs = load_app_definitions(tmp.path(), "prod", "").unwrap();
        assert!(defs.apps.is_empty());
    }

    #[test]
    fn image_tag_is_rendered_through_the_template_and_images_key_is_dropped() {
        let tmp = TempDir::new().unwrap();
        write_app(
            tmp.path(),
            "api",
            "namespace: web\ncluster: prod\nchart: https://example.com/chart@deadbeef\n\
             image-tag: deploy-9f03ac80f3\nimages:\n  template: \"{account_id}.dkr.ecr.amazonaws.com/api:{tag}\"\n",
            "secrets:\n  DATABASE_URL: postgres://localhost\n",
        );

        let defs = load_app_definitions(tmp.path(), "prod", "111122223333").unwrap();
        let app = &defs.apps["api"];
        assert_eq!(
            app.image(),
            Some("111122223333.dkr.ecr.amazonaws.com/api:deploy-9f03ac80f3")
        );
        assert!(app.values.get("images").is_none());
        let secret = app.values["secrets"]["DATABASE_URL"].as_str().unwrap();
        assert_eq!(secret, BASE64.encode("postgres://localhost"));
    }

    #[test]
    fn missing_namespace_is_an_error() {
        let tmp = TempDir::new().unwrap();
        write_app(
            tmp.path(),
            "broken",
            "cluster: prod\nchart: https://example.com/chart@deadbeef\n",
            "secrets: {}\n",
        );

        let err = load_app_definitions(tmp.path(), "prod", "").unwrap_err();
        assert!(matches!(err, DefinitionsError::MissingField { field: "namespace", .. }));
    }
}
