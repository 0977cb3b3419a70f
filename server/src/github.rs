//! Client for the code host's deployment-status API.
//!
//! Every status transition is a `POST <deployment_url>/statuses` with a
//! bearer token and `{state, description, environment_url}`. A 404 means the
//! deployment was deleted upstream and is tolerated silently; any other
//! non-2xx is logged at WARN and otherwise ignored, since a failed status
//! post should never take down the deploy pipeline.

use reqwest::StatusCode;
use serde::Serialize;
use tracing::warn;

use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
struct StatusPayload<'a> {
    state: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment_url: Option<&'a str>,
}

#[derive(Clone)]
pub struct GithubClient {
    token: Option<String>,
    client: reqwest::Client,
}

impl GithubClient {
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self {
            token,
            client: reqwest::Client::new(),
        }
    }

    /// Post a deployment status transition. Silently skipped if no
    /// `deployment_url` is configured for the app (the caller should check
    /// that first, but this is harmless to call unconditionally).
    pub async fn post_status(
        &self,
        deployment_url: &str,
        state: &str,
        description: &str,
        environment_url: Option<&str>,
    ) -> Result<()> {
        let Some(token) = &self.token else {
            warn!("no GITHUB_OAUTH_TOKEN configured, skipping deployment status post");
            return Ok(());
        };

        let url = format!("{deployment_url}/statuses");
        let payload = StatusPayload {
            state,
            description,
            environment_url,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }

        if !response.status().is_success() {
            warn!(
                url,
                status = %response.status(),
                "deployment status post failed"
            );
        }

        Ok(())
    }

    /// On a Helm failure, find the pull request associated with the deployed
    /// commit and flag it `NODEPLOY` with an explanatory comment, so the app
    /// stops re-deploying a known-broken revision. Best-effort: any failure
    /// along the way is logged and swallowed rather than propagated, since
    /// this is a side effect of reporting, not the deploy itself.
    pub async fn flag_no_deploy(&self, deployment_url: &str, app_name: &str) {
        if let Err(e) = self.flag_no_deploy_inner(deployment_url, app_name).await {
            warn!(error = %e, "failed to flag pull request with NODEPLOY");
        }
    }

    async fn flag_no_deploy_inner(&self, deployment_url: &str, app_name: &str) -> Result<()> {
        let Some(token) = &self.token else {
            return Ok(());
        };

        let deployment: serde_json::Value = self
            .client
            .get(deployment_url)
            .bearer_auth(token)
            .send()
            .await?
            .json()
            .await?;
        let Some(sha) = deployment.get("sha").and_then(serde_json::Value::as_str) else {
            return Ok(());
        };

        let search_url = format!("https://api.github.com/search/issues?q={sha}+is:pr");
        let search: serde_json::Value = self
            .client
            .get(&search_url)
            .bearer_auth(token)
            .send()
            .await?
            .json()
            .await?;
        let Some(issue_url) = search["items"][0]["url"].as_str() else {
            warn!(sha, "no pull request found for failed deploy commit");
            return Ok(());
        };

        self.client
            .post(format!("{issue_url}/labels"))
            .bearer_auth(token)
            .json(&serde_json::json!({ "labels": ["NODEPLOY"] }))
            .send()
            .await?;

        let comment = format!(
            "Failed to deploy {app_name}. Applying `NODEPLOY` label to block further deploys until it's fixed."
        );
        self.client
            .post(format!("{issue_url}/comments"))
            .bearer_auth(token)
            .json(&serde_json::json!({ "body": comment }))
            .send()
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_the_expected_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/deployments/1/statuses"))
            .and(body_json(serde_json::json!({
                "state": "success",
                "description": "deployed",
                "environment_url": "https://app.example.com",
            })))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let client = GithubClient::new(Some("token123".to_string()));
        client
            .post_status(
                &format!("{}/deployments/1", server.uri()),
                "success",
                "deployed",
                Some("https://app.example.com"),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn not_found_is_tolerated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = GithubClient::new(Some("token123".to_string()));
        let result = client
            .post_status(&format!("{}/deployments/1", server.uri()), "failure", "oops", None)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn missing_token_skips_the_call() {
        let client = GithubClient::new(None);
        let result = client
            .post_status("https://example.com/deployments/1", "success", "deployed", None)
            .await;
        assert!(result.is_ok());
    }
}
