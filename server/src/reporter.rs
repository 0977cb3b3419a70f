//! Ties the chat notifier and the code-host deployment-status API together
//! into the three push-scoped chat messages and four status transitions
//! described for one deploy.

use chrono::Utc;
use definitions::{App, Delta};
use notify::{resolve_mention, DirectoryUser, NotifyEvent, Notifier};
use tracing::warn;

use crate::config::Config;
use crate::deployer::AppResult;
use crate::github::GithubClient;
use crate::webhook::PushEvent;

const KEY_DEPLOYMENT_URL: &str = "github/deployment_url";

#[derive(Clone)]
pub struct Reporter {
    notifier: std::sync::Arc<Notifier>,
    github: GithubClient,
    cluster_name: String,
    default_mention: String,
    /// Chat user directory used to resolve a committer to a mention on
    /// failure. Populated from `SLACK_TOKEN` at startup; empty (and thus
    /// always falling back to the default mention) when unset.
    directory: std::sync::Arc<Vec<DirectoryUser>>,
}

impl Reporter {
    #[must_use]
    pub fn new(config: &Config, github: GithubClient, directory: Vec<DirectoryUser>) -> Self {
        Self {
            notifier: std::sync::Arc::new(Notifier::from_env()),
            github,
            cluster_name: config.cluster_name.clone(),
            default_mention: config.slack_default_mention.clone(),
            directory: std::sync::Arc::new(directory),
        }
    }

    pub fn init_summary(&self, event: &PushEvent, delta: &Delta) {
        self.notifier.notify(NotifyEvent::DeployInitiated {
            source: event.repository.clone_url.clone(),
            pusher: event.pusher.name.clone(),
            cluster: self.cluster_name.clone(),
            commit_message: event.head_commit.message.clone(),
            added: delta.added.iter().cloned().collect(),
            updated: delta.updated.iter().cloned().collect(),
            removed: delta.removed.iter().cloned().collect(),
            timestamp: Utc::now(),
        });
    }

    pub fn summary(&self, event: &PushEvent, succeeded: u32, failed: u32) {
        self.notifier.notify(NotifyEvent::DeploySummary {
            source: event.repository.clone_url.clone(),
            cluster: self.cluster_name.clone(),
            succeeded,
            failed,
            timestamp: Utc::now(),
        });
    }

    /// Called once Helm has finished (successfully or not) for one app.
    pub async fn report_app_result(&self, app: &App, result: &AppResult, committer_name: &str, committer_email: &str) {
        let deployment_url = app
            .values
            .get(KEY_DEPLOYMENT_URL)
            .and_then(serde_json::Value::as_str);

        if result.succeeded {
            if let Some(url) = deployment_url {
                if let Err(e) = self
                    .github
                    .post_status(
                        url,
                        "in_progress",
                        "Helm installed app into cluster. Waiting for pods to deploy.",
                        None,
                    )
                    .await
                {
                    warn!(app = %app.name, error = %e, "failed to post in_progress deployment status");
                }
            }
            return;
        }

        let mention = resolve_mention(committer_name, committer_email, &self.directory, &self.default_mention);

        self.notifier.notify(NotifyEvent::AppDeployFailed {
            app: app.name.clone(),
            cluster: self.cluster_name.clone(),
            output: result.output.clone(),
            mention,
            timestamp: Utc::now(),
        });

        if let Some(url) = deployment_url {
            if let Err(e) = self
                .github
                .post_status(url, "failure", &format!("Failed to deploy app. {}", result.output), None)
                .await
            {
                warn!(app = %app.name, error = %e, "failed to post failure deployment status");
            }
            self.github.flag_no_deploy(url, &app.name).await;
        }
    }

    /// Called by the rollout status reconciler once a workload's outcome is
    /// known.
    pub async fn report_rollout_outcome(&self, app_name: &str, deployment_url: &str, success: bool, environment_url: Option<&str>) {
        let (state, description) = if success {
            ("success", "Deployment is available.")
        } else {
            ("failure", "Deployment did not become available before its progress deadline.")
        };

        if let Err(e) = self.github.post_status(deployment_url, state, description, environment_url).await {
            warn!(app = app_name, error = %e, "failed to post rollout outcome status");
        }
    }
}

/// Fetch the chat user directory used to resolve committers to mentions.
/// Returns an empty directory (every failure falls back to the default
/// mention) when no token is configured or the call fails.
pub async fn fetch_chat_directory(token: Option<&str>) -> Vec<DirectoryUser> {
    let Some(token) = token else {
        return Vec::new();
    };

    let result: Result<serde_json::Value, reqwest::Error> = async {
        reqwest::Client::new()
            .get("https://slack.com/api/users.list")
            .bearer_auth(token)
            .send()
            .await?
            .json()
            .await
    }
    .await;

    let body = match result {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "failed to fetch chat user directory");
            return Vec::new();
        }
    };

    body["members"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|member| {
            let id = member["id"].as_str()?;
            let profile = &member["profile"];
            Some(DirectoryUser {
                name: member["name"].as_str().unwrap_or_default().to_string(),
                email: profile["email"].as_str().unwrap_or_default().to_string(),
                real_name: profile["real_name"].as_str().unwrap_or_default().to_string(),
                mention: format!("<@{id}>"),
            })
        })
        .collect()
}
