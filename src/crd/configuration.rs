//! Configuration Custom Resource Definition
//!
//! A Configuration describes the desired local configuration of MicroK8s
//! nodes: registry mirrors, containerd environment, certificate SANs and
//! extra service arguments.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Extra command line arguments for a service.
///
/// Keys are argument names with or without leading dashes. A `null` value
/// removes the argument from the service arguments file.
pub type ServiceArguments = BTreeMap<String, Option<String>>;

/// Desired node configuration
///
/// Example:
/// ```yaml
/// apiVersion: microk8s.canonical.com/v1alpha1
/// kind: Configuration
/// metadata:
///   name: default
/// spec:
///   containerdRegistryConfigs:
///     docker.io: |
///       server = "https://registry-1.docker.io"
///       [host."http://mirror.internal:5000"]
///       capabilities = ["pull", "resolve"]
///   extraSANs: [k8s.example.com]
///   extraKubeletArgs:
///     max-pods: "200"
///     --cpu-manager-policy: null
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "microk8s.canonical.com",
    version = "v1alpha1",
    kind = "Configuration",
    plural = "configurations",
    status = "ConfigurationStatus",
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationSpec {
    /// Addon repositories to configure on the node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addon_repositories: Vec<AddonRepositorySpec>,

    /// containerd registry configuration, keyed by registry name.
    /// Each value is the full contents of that registry's hosts.toml.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub containerd_registry_configs: BTreeMap<String, String>,

    /// CIDR used for pods. Should match the CNI configuration.
    #[serde(default, rename = "podCIDR", skip_serializing_if = "String::is_empty")]
    pub pod_cidr: String,

    /// Extra DNS subject alternative names for the server certificates
    #[serde(default, rename = "extraSANs", skip_serializing_if = "Vec::is_empty")]
    pub extra_sans: Vec<String>,

    /// Extra IP subject alternative names for the server certificates
    #[serde(default, rename = "extraSANIPs", skip_serializing_if = "Vec::is_empty")]
    pub extra_san_ips: Vec<String>,

    /// Extra kubelet arguments
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_kubelet_args: ServiceArguments,

    /// Extra kube-apiserver arguments
    #[serde(
        default,
        rename = "extraKubeAPIServerArgs",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub extra_kube_apiserver_args: ServiceArguments,

    /// Contents of the containerd environment file
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub containerd_env: String,
}

/// An addon repository reference
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddonRepositorySpec {
    /// Name used to refer to the repository
    pub name: String,

    /// Source URL of the repository
    pub repository: String,

    /// Tag to check out (default branch when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Observed state of a Configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationStatus {
    /// Status of each addon repository
    #[serde(default)]
    pub addon_repositories: Vec<AddonRepositoryStatus>,
}

/// Status of a single addon repository
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddonRepositoryStatus {
    /// Repository name
    pub name: String,
    /// Human readable status
    pub status: String,
}
