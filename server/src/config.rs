//! Process configuration, read once at startup from the environment.

use std::env;

/// All configuration for the deploy pipeline and reconciler, read once at
/// startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Logical cluster identifier used to filter apps and label the
    /// reconciler's namespace scope.
    pub cluster_name: String,
    /// Namespace the rollout status reconciler polls.
    pub cluster_namespace: String,
    /// Cloud account id substituted into image templates.
    pub account_id: String,
    /// Credential for cloning private repos; injected into clone URLs, never
    /// logged.
    pub github_oauth_token: Option<String>,
    /// HMAC-SHA1 secret the webhook signature is verified against. Required;
    /// there is no unsigned-webhook mode.
    pub github_webhook_key: String,
    /// Optional path to a `git-crypt` keyfile; if present, repos are
    /// decrypted after clone.
    pub git_crypt_key_file: Option<String>,
    /// Chat webhook URL; notifications are dropped silently if unset.
    pub slack_url: Option<String>,
    /// Chat API token, used to resolve a committer to a directory user.
    pub slack_token: Option<String>,
    /// Default chat mention used when a committer can't be matched to a
    /// directory user.
    pub slack_default_mention: String,
    /// Bound on concurrent Helm invocations within one push.
    pub max_parallel_deploys: usize,
    /// HTTP port the webhook server listens on.
    pub port: u16,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// # Panics
    ///
    /// Panics if `GITOPS_MAX_PARALLEL_DEPLOYS` or `PORT` are set but not
    /// valid integers, or if `GITHUB_WEBHOOK_KEY` is unset or empty — the
    /// webhook endpoint has no unsigned mode, so there is nothing safe to
    /// start without it.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            cluster_name: env::var("CLUSTER_NAME").unwrap_or_default(),
            cluster_namespace: env::var("CLUSTER_NAMESPACE").unwrap_or_default(),
            account_id: env::var("ACCOUNT_ID").unwrap_or_default(),
            github_oauth_token: env::var("GITHUB_OAUTH_TOKEN").ok().filter(|s| !s.is_empty()),
            github_webhook_key: env::var("GITHUB_WEBHOOK_KEY")
                .ok()
                .filter(|s| !s.is_empty())
                .expect("GITHUB_WEBHOOK_KEY must be set"),
            git_crypt_key_file: env::var("GIT_CRYPT_KEY_FILE").ok().filter(|s| !s.is_empty()),
            slack_url: env::var("SLACK_URL").ok().filter(|s| !s.is_empty()),
            slack_token: env::var("SLACK_TOKEN").ok().filter(|s| !s.is_empty()),
            slack_default_mention: env::var("SLACK_DEFAULT_MENTION")
                .unwrap_or_else(|_| "channel".to_string()),
            max_parallel_deploys: env::var("GITOPS_MAX_PARALLEL_DEPLOYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            port: env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
        }
    }
}
