//! Notification event types posted over the course of a single deploy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity, used only to pick a color/prefix in a given channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Events raised while processing one push event, from init summary through
/// to the final tally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyEvent {
    /// Posted once a delta has been computed and deploy work is about to
    /// start.
    DeployInitiated {
        source: String,
        pusher: String,
        cluster: String,
        commit_message: String,
        added: Vec<String>,
        updated: Vec<String>,
        removed: Vec<String>,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// Posted for one app whose Helm invocation failed.
    AppDeployFailed {
        app: String,
        cluster: String,
        output: String,
        mention: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// Posted once after every app in the push has been processed.
    DeploySummary {
        source: String,
        cluster: String,
        succeeded: u32,
        failed: u32,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
}

impl NotifyEvent {
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::DeployInitiated { .. } => Severity::Info,
            Self::AppDeployFailed { .. } => Severity::Warning,
            Self::DeploySummary { failed, .. } => {
                if *failed > 0 {
                    Severity::Warning
                } else {
                    Severity::Info
                }
            }
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::DeployInitiated { timestamp, .. }
            | Self::AppDeployFailed { timestamp, .. }
            | Self::DeploySummary { timestamp, .. } => *timestamp,
        }
    }
}
