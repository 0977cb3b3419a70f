//! A single FIFO queue of push events, drained by one worker loop.
//!
//! Pushes to any branch other than `master` are accepted and immediately
//! dropped on the floor; only `refs/heads/master` triggers a deploy. The
//! worker never exits on a single bad event: each iteration's error is
//! logged and the loop continues.

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::deployer::Deployer;
use crate::webhook::PushEvent;

const TARGET_REF: &str = "refs/heads/master";

/// Handle used by the webhook handler to enqueue work. Cloning shares the
/// same underlying channel.
#[derive(Clone)]
pub struct DeployQueue {
    sender: mpsc::UnboundedSender<PushEvent>,
}

impl DeployQueue {
    pub async fn enqueue(&self, event: PushEvent) {
        if self.sender.send(event).is_err() {
            error!("deploy queue worker has shut down, dropping push event");
        }
    }
}

/// Construct a queue and its paired worker future. The caller is expected to
/// `tokio::spawn` the worker alongside the HTTP server.
pub fn spawn(config: Config, client: kube::Client) -> (DeployQueue, impl std::future::Future<Output = ()>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let queue = DeployQueue { sender };
    let worker = run_worker(config, client, receiver);
    (queue, worker)
}

async fn run_worker(
    config: Config,
    client: kube::Client,
    mut receiver: mpsc::UnboundedReceiver<PushEvent>,
) {
    let deployer = Deployer::new(config, client).await;

    while let Some(event) = receiver.recv().await {
        if event.git_ref != TARGET_REF {
            info!(git_ref = %event.git_ref, "ignoring push to non-master ref");
            continue;
        }

        info!(
            commit = %event.after,
            pusher = %event.pusher.name,
            "processing deploy"
        );

        if let Err(e) = deployer.deploy(&event).await {
            warn!(error = %e, "deploy failed");
        }
    }
}
