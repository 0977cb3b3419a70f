//! Loads two definition snapshots, diffs them, and drives one Helm
//! invocation per changed app under a bounded-parallelism semaphore.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use definitions::{compute_deltas, load_app_definitions, App, Chart};

use crate::account_id::{self, NoopResolver};
use crate::config::Config;
use crate::error::Result;
use crate::github::GithubClient;
use crate::process::run;
use crate::repo_cache::{self, RepoCacheConfig};
use crate::reporter::{self, Reporter};
use crate::webhook::PushEvent;

/// Outcome of one app's Helm invocation.
#[derive(Debug, Clone)]
pub struct AppResult {
    pub succeeded: bool,
    pub output: String,
}

pub struct Deployer {
    config: Config,
    reporter: Reporter,
    repo_cache_config: RepoCacheConfig,
}

impl Deployer {
    /// Build a deployer. Fetches the chat user directory once, up front,
    /// since it rarely changes within a process lifetime.
    pub async fn new(config: Config, _client: kube::Client) -> Self {
        let github = GithubClient::new(config.github_oauth_token.clone());
        let directory = reporter::fetch_chat_directory(config.slack_token.as_deref()).await;
        let reporter = Reporter::new(&config, github, directory);
        let repo_cache_config = RepoCacheConfig {
            github_oauth_token: config.github_oauth_token.clone(),
            git_crypt_key_file: config.git_crypt_key_file.clone(),
        };
        Self {
            config,
            reporter,
            repo_cache_config,
        }
    }

    /// Process one push event: compute the delta between the before/after
    /// commit and drive Helm for every changed app. A failed checkout of the
    /// `before` commit (new branch, force-push past history) is treated as
    /// an empty previous snapshot; everything else — a genuine load error on
    /// either snapshot, or any per-app Helm failure — aborts or is reported,
    /// never silently discarded. Per-app failures are captured and reported,
    /// never propagated, so one broken app can't stop its siblings.
    pub async fn deploy(&self, event: &PushEvent) -> Result<()> {
        let account_id = account_id::get(&self.config.account_id, &NoopResolver).await;

        let before = repo_cache::checkout(&self.repo_cache_config, &event.repository.clone_url, &event.before).await;
        let after = repo_cache::checkout(&self.repo_cache_config, &event.repository.clone_url, &event.after).await?;

        let previous = match &before {
            Ok(checkout) => load_app_definitions(checkout.path(), &self.config.cluster_name, &account_id)?,
            Err(e) => {
                warn!(error = %e, "could not check out the previous commit, treating it as an empty snapshot");
                Default::default()
            }
        };
        let current = load_app_definitions(after.path(), &self.config.cluster_name, &account_id)?;

        let delta = compute_deltas(&previous, &current);
        if delta.is_empty() {
            info!("no app changes for this cluster, nothing to deploy");
            return Ok(());
        }

        let deploy_id = Uuid::new_v4().to_string();
        self.reporter.init_summary(event, &delta);

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_deploys.max(1)));
        let skip_migrations = event.head_commit.message.contains("--skip-migrations");
        let mut tasks = Vec::new();

        for name in delta.added.iter().chain(delta.updated.iter()) {
            let Some(app) = current.apps.get(name).cloned() else {
                continue;
            };
            let semaphore = Arc::clone(&semaphore);
            let repo_cache_config = self.repo_cache_config.clone();
            let deploy_id = deploy_id.clone();
            let reporter = self.reporter.clone();
            let committer_name = event.head_commit.author.name.clone();
            let committer_email = event.head_commit.author.email.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
                let result = upgrade_app(&repo_cache_config, &app, &deploy_id, skip_migrations).await;
                reporter.report_app_result(&app, &result, &committer_name, &committer_email).await;
                result.succeeded
            }));
        }

        for name in &delta.removed {
            if let Some(app) = previous.apps.get(name).cloned() {
                let semaphore = Arc::clone(&semaphore);
                tasks.push(tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
                    uninstall_app(&app).await.succeeded
                }));
            }
        }

        let mut succeeded = 0u32;
        let mut failed = 0u32;
        for task in tasks {
            match task.await {
                Ok(true) => succeeded += 1,
                Ok(false) => failed += 1,
                Err(e) => {
                    warn!(error = %e, "a deploy task panicked");
                    failed += 1;
                }
            }
        }

        self.reporter.summary(event, succeeded, failed);
        Ok(())
    }
}

async fn upgrade_app(repo_cache_config: &RepoCacheConfig, app: &App, deploy_id: &str, skip_migrations: bool) -> AppResult {
    match upgrade_app_inner(repo_cache_config, app, deploy_id, skip_migrations).await {
        Ok(output) => AppResult {
            succeeded: true,
            output,
        },
        Err(e) => AppResult {
            succeeded: false,
            output: e.to_string(),
        },
    }
}

async fn upgrade_app_inner(
    repo_cache_config: &RepoCacheConfig,
    app: &App,
    deploy_id: &str,
    skip_migrations: bool,
) -> Result<String> {
    let values = stamp_values(app, deploy_id);
    let values_file = tempfile::NamedTempFile::new()?;
    tokio::fs::write(values_file.path(), serde_json::to_vec_pretty(&values)?).await?;
    let values_path = values_file.path().display().to_string();
    let skip_migrations_flag = if skip_migrations { " --set skip_migrations=true" } else { "" };

    let output = match &app.chart {
        Chart::Git { git_repo_url, git_sha } => {
            let git_ref = git_sha.clone().unwrap_or_else(|| "master".to_string());
            let checkout = repo_cache::checkout(repo_cache_config, git_repo_url, &git_ref).await?;
            let chart_dir = checkout.path().display().to_string();
            run(&format!("cd {chart_dir} && helm dependency build"), false).await?;
            run(
                &format!(
                    "helm secrets upgrade --install --create-namespace --timeout=600s{skip_migrations_flag} -f {values_path} --namespace={} {} {chart_dir}",
                    app.namespace, app.name
                ),
                false,
            )
            .await?
        }
        Chart::Helm {
            helm_repo_name,
            helm_repo_url,
            helm_chart,
            version,
        } => {
            run(&format!("helm repo add {helm_repo_name} {helm_repo_url}"), false).await?;
            let version_flag = version.as_deref().map(|v| format!(" --version={v}")).unwrap_or_default();
            run(
                &format!(
                    "helm secrets upgrade --install --create-namespace --timeout=600s{skip_migrations_flag} -f {values_path} --namespace={} {} {helm_chart}{version_flag}",
                    app.namespace, app.name
                ),
                false,
            )
            .await?
        }
        Chart::Local { path } => {
            run(
                &format!(
                    "helm secrets upgrade --install --create-namespace --timeout=600s{skip_migrations_flag} -f {values_path} --namespace={} {} {path}",
                    app.namespace, app.name
                ),
                false,
            )
            .await?
        }
    };

    Ok(output.output)
}

async fn uninstall_app(app: &App) -> AppResult {
    match run(&format!("helm uninstall {} -n {}", app.name, app.namespace), true).await {
        Ok(output) => AppResult {
            succeeded: output.exit_code == 0,
            output: output.output,
        },
        Err(e) => AppResult {
            succeeded: false,
            output: e.to_string(),
        },
    }
}

/// Stamp `deployment.labels.gitops/deploy_id` and `deployment.labels.gitops/status`,
/// plus `deployment.annotations.github/deployment_url` when the app carries
/// one, into the values passed to the chart. Deploy id and status are label
/// values (short, fixed-charset) so the reconciler can select on them with a
/// label selector; the deployment URL is not — it's an arbitrary-length URL,
/// which Kubernetes label values can't hold, so it must render as an
/// annotation instead.
fn stamp_values(app: &App, deploy_id: &str) -> Value {
    let mut values = app.values.clone();
    if let Value::Object(map) = &mut values {
        let url = map.get("github/deployment_url").and_then(Value::as_str).map(str::to_string);

        let deployment = map
            .entry("deployment".to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let Value::Object(deployment) = deployment {
            let labels = deployment
                .entry("labels".to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if let Value::Object(labels) = labels {
                labels.insert("gitops/deploy_id".to_string(), Value::String(deploy_id.to_string()));
                labels.insert("gitops/status".to_string(), Value::String("in_progress".to_string()));
            }

            if let Some(url) = url {
                let annotations = deployment
                    .entry("annotations".to_string())
                    .or_insert_with(|| Value::Object(serde_json::Map::new()));
                if let Value::Object(annotations) = annotations {
                    annotations.insert("github/deployment_url".to_string(), Value::String(url));
                }
            }
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_app() -> App {
        App {
            name: "web".to_string(),
            namespace: "web".to_string(),
            cluster: "prod".to_string(),
            tags: vec![],
            chart: Chart::Local { path: "/charts/web".to_string() },
            values: json!({"replicas": 2}),
        }
    }

    #[test]
    fn stamp_values_adds_deploy_labels_without_disturbing_existing_keys() {
        let app = sample_app();
        let stamped = stamp_values(&app, "11111111-1111-1111-1111-111111111111");
        assert_eq!(stamped["replicas"], json!(2));
        assert_eq!(
            stamped["deployment"]["labels"]["gitops/deploy_id"],
            json!("11111111-1111-1111-1111-111111111111")
        );
        assert_eq!(stamped["deployment"]["labels"]["gitops/status"], json!("in_progress"));
        assert!(stamped["deployment"].get("annotations").is_none());
    }

    #[test]
    fn stamp_values_stamps_the_deployment_url_as_an_annotation() {
        let mut app = sample_app();
        app.values = json!({"github/deployment_url": "https://example.com/deployments/1"});
        let stamped = stamp_values(&app, "11111111-1111-1111-1111-111111111111");
        assert_eq!(
            stamped["deployment"]["annotations"]["github/deployment_url"],
            json!("https://example.com/deployments/1")
        );
        assert!(stamped["deployment"]["labels"].get("github/deployment_url").is_none());
    }
}
