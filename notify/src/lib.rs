//! Fire-and-forget chat notifications for the GitOps deploy pipeline.
//!
//! ```no_run
//! use notify::{Notifier, NotifyEvent};
//!
//! let notifier = Notifier::from_env();
//! notifier.notify(NotifyEvent::DeploySummary {
//!     source: "uptick/gitops-config".to_string(),
//!     cluster: "prod".to_string(),
//!     succeeded: 3,
//!     failed: 0,
//!     timestamp: chrono::Utc::now(),
//! });
//! ```
//!
//! Configured via `SLACK_URL` (enables the Slack channel) and
//! `NOTIFY_DISABLED` (set to `true` to drop every event silently).

pub mod channels;
pub mod error;
pub mod events;
pub mod user_match;

pub use channels::slack::SlackChannel;
pub use channels::NotifyChannel;
pub use error::ChannelError;
pub use events::{NotifyEvent, Severity};
pub use user_match::{resolve_mention, search, DirectoryUser};

use std::sync::Arc;
use tracing::{debug, error, info, warn};

const ENV_NOTIFY_DISABLED: &str = "NOTIFY_DISABLED";

/// Dispatches [`NotifyEvent`]s to every enabled channel.
pub struct Notifier {
    channels: Vec<Arc<dyn NotifyChannel>>,
    disabled: bool,
}

impl Notifier {
    /// Build a notifier from environment variables, auto-detecting which
    /// channels are configured.
    #[must_use]
    pub fn from_env() -> Self {
        let disabled = std::env::var(ENV_NOTIFY_DISABLED)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        if disabled {
            info!("notifications disabled via NOTIFY_DISABLED");
            return Self { channels: vec![], disabled: true };
        }

        let mut channels: Vec<Arc<dyn NotifyChannel>> = vec![];

        let slack = SlackChannel::from_env();
        if slack.enabled() {
            info!("slack notifications enabled");
            channels.push(Arc::new(slack));
        }

        if channels.is_empty() {
            warn!("no notification channels configured");
        }

        Self { channels, disabled: false }
    }

    #[must_use]
    pub const fn disabled() -> Self {
        Self { channels: vec![], disabled: true }
    }

    #[must_use]
    pub fn has_channels(&self) -> bool {
        !self.disabled && !self.channels.is_empty()
    }

    /// Dispatch an event to every enabled channel and return immediately;
    /// delivery errors are logged, not propagated.
    pub fn notify(&self, event: NotifyEvent) {
        if self.disabled || self.channels.is_empty() {
            debug!("skipping event, notifier has no channels");
            return;
        }

        let event = Arc::new(event);
        for channel in &self.channels {
            let channel = Arc::clone(channel);
            let event = Arc::clone(&event);

            tokio::spawn(async move {
                if !channel.enabled() {
                    return;
                }
                match channel.send(&event).await {
                    Ok(()) => debug!(channel = channel.name(), "notification sent"),
                    Err(e) => error!(channel = channel.name(), error = %e, "failed to send notification"),
                }
            });
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_notifier_has_no_channels() {
        let notifier = Notifier::disabled();
        assert!(!notifier.has_channels());
    }
}
