//! GitOps deploy pipeline entrypoint: a webhook HTTP server plus two
//! always-on background tasks, the deploy queue worker and the rollout
//! status reconciler.

use axum::extract::Request;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::Span;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use server::config::Config;
use server::github::GithubClient;
use server::reporter::{self, Reporter};
use server::webhook::{health_check, webhook_handler, WebhookState};
use server::{queue, reconciler};

const HEALTH_PATHS: [&str; 3] = ["/", "/readyz", "/livez"];

/// Health checks are polled constantly by the cluster; a span per request
/// would drown the webhook traffic we actually care about.
fn make_span(request: &Request) -> Span {
    if HEALTH_PATHS.contains(&request.uri().path()) {
        Span::none()
    } else {
        tracing::info_span!("request", method = %request.method(), path = %request.uri().path())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();

    let client = match kube::Client::try_default().await {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "failed to build Kubernetes client");
            std::process::exit(1);
        }
    };

    let (queue, worker) = queue::spawn(config.clone(), client.clone());
    tokio::spawn(worker);

    let github = GithubClient::new(config.github_oauth_token.clone());
    let directory = reporter::fetch_chat_directory(config.slack_token.as_deref()).await;
    let reporter = Reporter::new(&config, github, directory);
    tokio::spawn(reconciler::run(client, config.cluster_namespace.clone(), reporter));

    let webhook_state = WebhookState {
        webhook_key: config.github_webhook_key.clone(),
        queue,
    };

    let app = Router::new()
        .route("/", get(health_check))
        .route("/readyz", get(health_check))
        .route("/livez", get(health_check))
        .route("/webhook", post(webhook_handler))
        .layer(TraceLayer::new_for_http().make_span_with(make_span))
        .with_state(webhook_state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, addr, "failed to bind webhook listener");
            std::process::exit(1);
        }
    };

    tracing::info!(addr, "gitops-server listening");
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "webhook server exited");
    }
}
