//! Custom Resource Definitions for the MicroK8s operator
//!
//! Both resources are cluster-scoped. `Configuration` objects carry desired
//! node configuration (`default` for every node, `node.<name>` per node) and
//! `MicroK8sNode` objects are written by each node to report what it runs.

mod configuration;
mod node;

pub use configuration::{
    AddonRepositorySpec, AddonRepositoryStatus, Configuration, ConfigurationSpec,
    ConfigurationStatus, ServiceArguments,
};
pub use node::{MicroK8sNode, MicroK8sNodeSpec, MicroK8sNodeStatus};

/// Name of the cluster-wide default Configuration object
pub const DEFAULT_CONFIGURATION_NAME: &str = "default";

/// Name of the Configuration object that overrides the default for one node
pub fn node_configuration_name(node: &str) -> String {
    format!("node.{}", node)
}
