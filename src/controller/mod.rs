//! Controllers run by every MicroK8s operator instance
//!
//! - [`configuration`] applies `Configuration` objects to this node's files
//! - [`node_status`] publishes this node's `MicroK8sNode` status

pub mod configuration;
pub mod node_status;

pub use configuration::{
    error_policy, reconcile, ConfigurationStore, Context, ContextBuilder, KubeConfigurationStore,
};
pub use node_status::{KubeNodeStore, NodeStatusReporter, NodeStore};
