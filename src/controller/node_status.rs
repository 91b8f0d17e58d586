//! MicroK8sNode status reporter
//!
//! Each operator instance keeps a `MicroK8sNode` object named after its node
//! up to date with the installed MicroK8s revision, channel and version. The
//! object is created on first use and deleted again when the operator shuts
//! down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::crd::{MicroK8sNode, MicroK8sNodeSpec};
use crate::restart::{ServiceManager, MICROK8S_PACKAGE};
use crate::Error;

/// How long shutdown waits for the node object to be deleted
pub const CLEANUP_GRACE: Duration = Duration::from_secs(5);

/// Access to MicroK8sNode objects
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Get a node object, `None` if it does not exist
    async fn get(&self, name: &str) -> Result<Option<MicroK8sNode>, Error>;

    /// Create an empty node object
    async fn create(&self, name: &str) -> Result<MicroK8sNode, Error>;

    /// Write the status of `node`
    ///
    /// Fails with a conflict when the object changed since it was read.
    async fn replace_status(&self, node: &MicroK8sNode) -> Result<(), Error>;

    /// Delete a node object; deleting a missing object succeeds
    async fn delete(&self, name: &str) -> Result<(), Error>;
}

/// [`NodeStore`] backed by the Kubernetes API
pub struct KubeNodeStore {
    client: Client,
}

impl KubeNodeStore {
    /// Create a store using `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self) -> Api<MicroK8sNode> {
        Api::all(self.client.clone())
    }
}

#[async_trait]
impl NodeStore for KubeNodeStore {
    async fn get(&self, name: &str) -> Result<Option<MicroK8sNode>, Error> {
        Ok(self.api().get_opt(name).await?)
    }

    async fn create(&self, name: &str) -> Result<MicroK8sNode, Error> {
        let node = MicroK8sNode::new(name, MicroK8sNodeSpec::default());
        Ok(self.api().create(&PostParams::default(), &node).await?)
    }

    async fn replace_status(&self, node: &MicroK8sNode) -> Result<(), Error> {
        // resourceVersion in the patch makes the API server reject stale writes
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": node.resource_version() },
            "status": node.status,
        });
        self.api()
            .patch_status(
                &node.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), Error> {
        match self.api().delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Periodically publishes this node's MicroK8s package metadata
pub struct NodeStatusReporter {
    store: Arc<dyn NodeStore>,
    manager: Arc<dyn ServiceManager>,
    node_name: String,
    interval: Duration,
}

impl NodeStatusReporter {
    /// Create a reporter for `node_name` that updates every `interval`
    pub fn new(
        store: Arc<dyn NodeStore>,
        manager: Arc<dyn ServiceManager>,
        node_name: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            manager,
            node_name: node_name.into(),
            interval,
        }
    }

    /// Report until `shutdown` is cancelled, then delete the node object
    ///
    /// The first report is sent immediately. Failed reports are logged and
    /// retried on the next tick.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(node = %self.node_name, interval = ?self.interval, "starting node status reporter");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(()) => debug!(node = %self.node_name, "node status updated"),
                        Err(e) if e.is_conflict() => {
                            warn!(node = %self.node_name, error = %e, "node status changed concurrently, retrying next tick");
                        }
                        Err(e) => error!(node = %self.node_name, error = %e, "failed to update node status"),
                    }
                }
            }
        }

        self.cleanup().await;
    }

    /// Publish the current package metadata once
    #[instrument(skip(self), fields(node = %self.node_name))]
    pub async fn tick(&self) -> Result<(), Error> {
        let mut node = self.get_or_create().await?;

        let mut status = node.status.take().unwrap_or_default();
        match self.manager.package_info(MICROK8S_PACKAGE).await {
            Ok(info) => {
                status.revision = info.revision;
                status.channel = info.channel;
                status.version = info.version;
            }
            Err(e) => warn!(error = %e, "failed to query microk8s package info"),
        }
        status.last_update = Some(Time(Utc::now()));
        node.status = Some(status);

        self.store.replace_status(&node).await
    }

    /// Delete the node object, giving up after [`CLEANUP_GRACE`]
    pub async fn cleanup(&self) {
        match tokio::time::timeout(CLEANUP_GRACE, self.store.delete(&self.node_name)).await {
            Ok(Ok(())) => info!(node = %self.node_name, "deleted node status object"),
            Ok(Err(e)) => error!(node = %self.node_name, error = %e, "failed to delete node during cleanup"),
            Err(_) => error!(node = %self.node_name, grace = ?CLEANUP_GRACE, "timed out deleting node during cleanup"),
        }
    }

    async fn get_or_create(&self) -> Result<MicroK8sNode, Error> {
        if let Some(node) = self.store.get(&self.node_name).await? {
            return Ok(node);
        }

        info!("creating node status object");
        let created = match self.store.create(&self.node_name).await {
            Ok(node) => Some(node),
            // created by someone else in the meantime
            Err(e) if e.is_conflict() => None,
            Err(e) => return Err(e),
        };

        match self.store.get(&self.node_name).await? {
            Some(node) => Ok(node),
            None => created.ok_or_else(|| Error::not_found(format!("microk8snodes/{}", self.node_name))),
        }
    }
}
