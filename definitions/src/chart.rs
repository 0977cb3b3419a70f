//! The `chart` field of a deployment: a tagged variant over the three ways a
//! Helm chart can be sourced. Represented as an enum rather than a single
//! struct with optional fields so that each variant only carries the fields
//! that make sense for it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DefinitionsError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Chart {
    Git {
        git_repo_url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        git_sha: Option<String>,
    },
    Helm {
        helm_repo_name: String,
        helm_repo_url: String,
        helm_chart: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    Local {
        path: String,
    },
}

impl Chart {
    /// Parse the `chart` field of a deployment. It is either a bare
    /// `URL` / `URL@SHA` string (always a git chart), or a mapping with a
    /// `type` key dispatching to one of the three variants.
    pub fn from_value(app_name: &str, value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(split_git_ref(s)),
            Value::Object(map) => {
                let kind = map
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or_else(|| DefinitionsError::MissingField {
                        name: app_name.to_string(),
                        field: "chart.type",
                    })?;
                match kind {
                    "git" => {
                        let url = map
                            .get("git_repo_url")
                            .and_then(Value::as_str)
                            .ok_or_else(|| DefinitionsError::MissingField {
                                name: app_name.to_string(),
                                field: "chart.git_repo_url",
                            })?;
                        let mut chart = split_git_ref(url);
                        // An explicit `git_sha` only applies if the URL didn't
                        // already carry one via `URL@SHA`.
                        if let Chart::Git { git_sha, .. } = &mut chart {
                            if git_sha.is_none() {
                                *git_sha = map
                                    .get("git_sha")
                                    .and_then(Value::as_str)
                                    .map(str::to_string);
                            }
                        }
                        Ok(chart)
                    }
                    "helm" => Ok(Chart::Helm {
                        helm_repo_name: field_str(app_name, map, "helm_repo_name")?,
                        helm_repo_url: field_str(app_name, map, "helm_repo_url")?,
                        helm_chart: field_str(app_name, map, "helm_chart")?,
                        version: map.get("version").and_then(Value::as_str).map(str::to_string),
                    }),
                    "local" => Ok(Chart::Local {
                        path: field_str(app_name, map, "path")?,
                    }),
                    other => Err(DefinitionsError::UnsupportedChartType {
                        name: app_name.to_string(),
                        kind: other.to_string(),
                    }),
                }
            }
            _ => Err(DefinitionsError::InvalidChart {
                name: app_name.to_string(),
            }),
        }
    }
}

fn field_str(app_name: &str, map: &serde_json::Map<String, Value>, field: &'static str) -> Result<String> {
    map.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DefinitionsError::MissingField {
            name: app_name.to_string(),
            field,
        })
}

fn split_git_ref(s: &str) -> Chart {
    match s.split_once('@') {
        Some((url, sha)) => Chart::Git {
            git_repo_url: url.to_string(),
            git_sha: Some(sha.to_string()),
        },
        None => Chart::Git {
            git_repo_url: s.to_string(),
            git_sha: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_string_without_sha() {
        let chart = Chart::from_value("app", &Value::String("https://example.com/chart".into())).unwrap();
        assert_eq!(
            chart,
            Chart::Git {
                git_repo_url: "https://example.com/chart".into(),
                git_sha: None,
            }
        );
    }

    #[test]
    fn bare_string_with_sha_roundtrips() {
        let original = "https://example.com/chart@abc123";
        let chart = Chart::from_value("app", &Value::String(original.into())).unwrap();
        let Chart::Git { git_repo_url, git_sha } = &chart else {
            panic!("expected git chart");
        };
        assert_eq!(format!("{git_repo_url}@{}", git_sha.as_deref().unwrap()), original);
    }

    #[test]
    fn helm_mapping() {
        let value = serde_json::json!({
            "type": "helm",
            "helm_repo_name": "brigade",
            "helm_repo_url": "https://brigadecore.github.io/charts",
            "helm_chart": "brigade/brigade",
            "version": "1.2.3",
        });
        let chart = Chart::from_value("app", &value).unwrap();
        assert_eq!(
            chart,
            Chart::Helm {
                helm_repo_name: "brigade".into(),
                helm_repo_url: "https://brigadecore.github.io/charts".into(),
                helm_chart: "brigade/brigade".into(),
                version: Some("1.2.3".into()),
            }
        );
    }

    #[test]
    fn unsupported_type_is_rejected() {
        let value = serde_json::json!({"type": "oci"});
        let err = Chart::from_value("app", &value).unwrap_err();
        assert!(matches!(err, DefinitionsError::UnsupportedChartType { .. }));
    }
}
