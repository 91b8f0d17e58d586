//! MicroK8sNode Custom Resource Definition
//!
//! Each node running the operator owns exactly one MicroK8sNode object,
//! named after the node, and keeps its status current.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// MicroK8sNode has no desired state; everything lives in the status
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "microk8s.canonical.com",
    version = "v1alpha1",
    kind = "MicroK8sNode",
    plural = "microk8snodes",
    status = "MicroK8sNodeStatus",
    namespaced = false,
    printcolumn = r#"{"name":"LastUpdate","type":"date","jsonPath":".status.lastUpdate"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.version"}"#,
    printcolumn = r#"{"name":"Revision","type":"string","jsonPath":".status.revision"}"#,
    printcolumn = r#"{"name":"Channel","type":"string","jsonPath":".status.channel"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct MicroK8sNodeSpec {}

/// Observed state of a MicroK8s node
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MicroK8sNodeStatus {
    /// Time of the last status update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<Time>,

    /// Installed snap revision
    #[serde(default)]
    pub revision: String,

    /// Channel the snap is tracking
    #[serde(default)]
    pub channel: String,

    /// Installed snap version
    #[serde(default)]
    pub version: String,
}
