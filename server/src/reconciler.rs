//! Rollout status reconciler: a background loop, independent of the deploy
//! queue, that watches freshly-created Deployments until Kubernetes reports
//! them available or past their progress deadline, then relays the outcome
//! to the code host.

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, ListParams, Patch, PatchParams};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::reporter::Reporter;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const LABEL_SELECTOR: &str = "gitops/deploy_id,gitops/status=in_progress";

/// Run the reconciler loop forever. Each tick is independently
/// error-isolated: a failure listing or patching Kubernetes objects is
/// logged and the loop keeps going on the next tick.
pub async fn run(client: kube::Client, namespace: String, reporter: Reporter) {
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = tick(&client, &namespace, &reporter).await {
            warn!(error = %e, "rollout status reconciler tick failed");
        }
    }
}

async fn tick(client: &kube::Client, namespace: &str, reporter: &Reporter) -> kube::Result<()> {
    let deployments: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let list_params = ListParams::default().labels(LABEL_SELECTOR);
    let in_progress = deployments.list(&list_params).await?;

    for deployment in in_progress.items {
        let name = deployment.metadata.name.clone().unwrap_or_default();
        match outcome(&deployment) {
            Some(Outcome::Success) => {
                let environment_url = lookup_environment_url(client, namespace, &name).await;
                report_and_patch(
                    client, namespace, reporter, &deployment, &name, true, environment_url.as_deref(),
                )
                .await;
            }
            Some(Outcome::Failure) => {
                report_and_patch(client, namespace, reporter, &deployment, &name, false, None).await;
            }
            None => {
                debug!(deployment = %name, "rollout still in progress");
            }
        }
    }

    Ok(())
}

enum Outcome {
    Success,
    Failure,
}

/// Read `status.conditions` and classify the rollout, matching the same
/// condition/reason pairs `kubectl rollout status` waits on.
fn outcome(deployment: &Deployment) -> Option<Outcome> {
    let conditions = deployment.status.as_ref()?.conditions.as_ref()?;

    let available = conditions.iter().any(|c| c.type_ == "Available" && c.status == "True");
    let progressing_complete = conditions
        .iter()
        .any(|c| c.type_ == "Progressing" && c.status == "True" && c.reason.as_deref() == Some("NewReplicaSetAvailable"));
    if available && progressing_complete {
        return Some(Outcome::Success);
    }

    let deadline_exceeded = conditions
        .iter()
        .any(|c| c.type_ == "Progressing" && c.status == "False" && c.reason.as_deref() == Some("ProgressDeadlineExceeded"));
    if deadline_exceeded {
        return Some(Outcome::Failure);
    }

    None
}

async fn lookup_environment_url(client: &kube::Client, namespace: &str, app_name: &str) -> Option<String> {
    let ingresses: Api<Ingress> = Api::namespaced(client.clone(), namespace);
    let list_params = ListParams::default().labels(&format!("app={app_name}"));
    let found = ingresses.list(&list_params).await.ok()?;
    let ingress = found.items.first()?;
    let rule = ingress.spec.as_ref()?.rules.as_ref()?.first()?;
    let host = rule.host.as_ref()?;
    Some(format!("https://{host}"))
}

async fn report_and_patch(
    client: &kube::Client,
    namespace: &str,
    reporter: &Reporter,
    deployment: &Deployment,
    name: &str,
    success: bool,
    environment_url: Option<&str>,
) {
    let deployment_url = deployment
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get("github/deployment_url"))
        .cloned();

    if let Some(deployment_url) = &deployment_url {
        reporter
            .report_rollout_outcome(name, deployment_url, success, environment_url)
            .await;
    }

    let status_value = if success { "success" } else { "failure" };
    if let Err(e) = patch_status_label(client, namespace, name, status_value).await {
        warn!(deployment = name, error = %e, "failed to patch rollout status label");
    } else {
        info!(deployment = name, status = status_value, "rollout status reconciled");
    }
}

async fn patch_status_label(client: &kube::Client, namespace: &str, name: &str, status: &str) -> kube::Result<()> {
    let deployments: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let mut labels = BTreeMap::new();
    labels.insert("gitops/status".to_string(), status.to_string());
    let patch = json!({
        "metadata": {
            "labels": labels,
        }
    });
    deployments.patch(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentCondition, DeploymentStatus};

    fn deployment_with_conditions(conditions: Vec<DeploymentCondition>) -> Deployment {
        Deployment {
            status: Some(DeploymentStatus {
                conditions: Some(conditions),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn condition(type_: &str, status: &str, reason: Option<&str>) -> DeploymentCondition {
        DeploymentCondition {
            type_: type_.to_string(),
            status: status.to_string(),
            reason: reason.map(str::to_string),
            last_transition_time: None,
            last_update_time: None,
            message: None,
        }
    }

    #[test]
    fn available_and_progressing_is_success() {
        let deployment = deployment_with_conditions(vec![
            condition("Available", "True", None),
            condition("Progressing", "True", Some("NewReplicaSetAvailable")),
        ]);
        assert!(matches!(outcome(&deployment), Some(Outcome::Success)));
    }

    #[test]
    fn deadline_exceeded_is_failure() {
        let deployment = deployment_with_conditions(vec![condition(
            "Progressing",
            "False",
            Some("ProgressDeadlineExceeded"),
        )]);
        assert!(matches!(outcome(&deployment), Some(Outcome::Failure)));
    }

    #[test]
    fn still_rolling_out_is_neither() {
        let deployment = deployment_with_conditions(vec![condition(
            "Progressing",
            "True",
            Some("ReplicaSetUpdated"),
        )]);
        assert!(outcome(&deployment).is_none());
    }

    #[test]
    fn missing_status_is_neither() {
        let deployment = Deployment::default();
        assert!(outcome(&deployment).is_none());
    }
}
