//! Slack webhook notification channel.
//!
//! Posts the plain `{"text": ...}` payload shape Slack's "Incoming Webhook"
//! integration expects -- no rich attachments, matching what a shell-scriptable
//! webhook consumer on the other end is built to parse.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::events::NotifyEvent;
use crate::NotifyChannel;

const ENV_SLACK_URL: &str = "SLACK_URL";

pub struct SlackChannel {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl SlackChannel {
    #[must_use]
    pub fn from_env() -> Self {
        let webhook_url = std::env::var(ENV_SLACK_URL).ok();
        if webhook_url.is_some() {
            debug!("Slack notifications enabled");
        } else {
            debug!("Slack notifications disabled (SLACK_URL not set)");
        }
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url: Some(webhook_url),
            client: reqwest::Client::new(),
        }
    }

    fn format_message(event: &NotifyEvent) -> String {
        match event {
            NotifyEvent::DeployInitiated {
                source,
                pusher,
                cluster,
                commit_message,
                added,
                updated,
                removed,
                ..
            } => {
                let mut deltas = String::new();
                for (label, names) in [("Adding", added), ("Updating", updated), ("Removing", removed)] {
                    if names.is_empty() {
                        continue;
                    }
                    let mut sorted = names.clone();
                    sorted.sort();
                    let joined = sorted.iter().map(|n| format!("`{n}`")).collect::<Vec<_>>().join(", ");
                    deltas.push_str(&format!("\n\t\u{2022} {label}: {joined}"));
                }
                format!(
                    "A deployment from `{source}` has been initiated by *{pusher}* for cluster \
                     `{cluster}`, the following apps will be updated:{deltas}\nCommit Message: {commit_message}"
                )
            }

            NotifyEvent::AppDeployFailed {
                app,
                cluster,
                output,
                mention,
                ..
            } => {
                format!(
                    "Failed to deploy app `{app}` for cluster `{cluster}` (cc {mention}):\n>>>{output}"
                )
            }

            NotifyEvent::DeploySummary {
                source,
                cluster,
                succeeded,
                failed,
                ..
            } => {
                format!(
                    "Deployment from `{source}` for `{cluster}` results summary:\n\
                     \t\u{2022} {succeeded} succeeded\n\
                     \t\u{2022} {failed} failed"
                )
            }
        }
    }
}

#[async_trait]
impl NotifyChannel for SlackChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    async fn send(&self, event: &NotifyEvent) -> Result<(), ChannelError> {
        let webhook_url = self
            .webhook_url
            .as_ref()
            .ok_or_else(|| ChannelError::NotConfigured(ENV_SLACK_URL.to_string()))?;

        let payload = SlackPayload {
            text: Self::format_message(event),
        };

        debug!(channel = "slack", "posting to slack");
        let response = self.client.post(webhook_url).json(&payload).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(channel = "slack", %status, %body, "slack webhook request failed");
            Err(ChannelError::Other(format!("slack returned {status}: {body}")))
        }
    }
}

#[derive(Debug, Serialize)]
struct SlackPayload {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn init_summary_lists_sorted_deltas() {
        let event = NotifyEvent::DeployInitiated {
            source: "uptick/gitops-config".to_string(),
            pusher: "alice".to_string(),
            cluster: "prod".to_string(),
            commit_message: "bump workforce".to_string(),
            added: vec!["zeta".to_string(), "alpha".to_string()],
            updated: vec![],
            removed: vec![],
            timestamp: Utc::now(),
        };
        let message = SlackChannel::format_message(&event);
        assert!(message.contains("Adding: `alpha`, `zeta`"));
        assert!(message.contains("initiated by *alice*"));
        assert!(message.contains("Commit Message: bump workforce"));
    }

    #[test]
    fn failure_message_includes_mention() {
        let event = NotifyEvent::AppDeployFailed {
            app: "workforce".to_string(),
            cluster: "prod".to_string(),
            output: "Error: timed out waiting for condition".to_string(),
            mention: "<@U123>".to_string(),
            timestamp: Utc::now(),
        };
        let message = SlackChannel::format_message(&event);
        assert!(message.contains("Failed to deploy app `workforce`"));
        assert!(message.contains("cc <@U123>"));
    }
}
