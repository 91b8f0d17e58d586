//! Integration tests for node status reporting
//!
//! A node runs the status reporter against a real API server with snapd
//! replaced by a fixed package description.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams};

use microk8s_operator::controller::{KubeNodeStore, NodeStatusReporter};
use microk8s_operator::crd::MicroK8sNode;
use microk8s_operator::restart::{OperationId, OperationStatus, PackageInfo, ServiceManager};
use microk8s_operator::Error;

use super::helpers::ensure_test_cluster;

/// snapd that only knows about the installed package
struct InstalledSnap;

#[async_trait]
impl ServiceManager for InstalledSnap {
    async fn restart(&self, service: &str) -> Result<OperationId, Error> {
        Err(Error::service_manager(format!("unexpected restart of {}", service)))
    }

    async fn refresh_certificates(&self) -> Result<OperationId, Error> {
        Err(Error::service_manager("unexpected certificate refresh"))
    }

    async fn operation_status(&self, _id: &OperationId) -> Result<OperationStatus, Error> {
        Err(Error::service_manager("no operations"))
    }

    async fn package_info(&self, _name: &str) -> Result<PackageInfo, Error> {
        Ok(PackageInfo {
            revision: "6364".to_string(),
            channel: "1.29/stable".to_string(),
            version: "v1.29.4".to_string(),
            confinement: "classic".to_string(),
        })
    }
}

/// Story: A node joins, reports what it runs, and cleans up on shutdown
///
/// Expected behavior:
/// - The MicroK8sNode object is created under the node's name
/// - Its status carries the snap revision, channel and version
/// - Cancelling the reporter deletes the object
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_node_reports_status_and_cleans_up() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<MicroK8sNode> = Api::all(client.clone());
    let name = "it-node-status";
    let _ = api.delete(name, &DeleteParams::default()).await;

    let reporter = NodeStatusReporter::new(
        Arc::new(KubeNodeStore::new(client.clone())),
        Arc::new(InstalledSnap),
        name.to_string(),
        Duration::from_secs(1),
    );
    let shutdown = tokio_util::sync::CancellationToken::new();
    let task = tokio::spawn(reporter.run(shutdown.clone()));

    let mut status = None;
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        if let Some(node) = api.get_opt(name).await.expect("lookup failed") {
            if node.status.as_ref().is_some_and(|s| s.last_update.is_some()) {
                status = node.status;
                break;
            }
        }
    }
    let status = status.expect("node status was never reported");
    assert_eq!(status.revision, "6364");
    assert_eq!(status.channel, "1.29/stable");
    assert_eq!(status.version, "v1.29.4");

    shutdown.cancel();
    task.await.expect("reporter task panicked");

    let mut gone = false;
    for _ in 0..10 {
        if api.get_opt(name).await.expect("lookup failed").is_none() {
            gone = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    assert!(gone, "MicroK8sNode should be deleted on shutdown");
}
