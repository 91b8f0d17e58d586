//! MicroK8s operator - per-node configuration driven by Configuration CRDs
//!
//! One operator instance runs on every MicroK8s node. It watches the
//! cluster-wide `default` Configuration and the `node.<name>` override for its
//! own node, merges them, and applies the result to the local MicroK8s files:
//! containerd environment and registry mirrors, API server certificate SANs,
//! and kubelet / kube-apiserver arguments. Services are restarted through
//! snapd only when a file actually changed.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (Configuration, MicroK8sNode)
//! - [`merge`] - default/override merge into the effective configuration
//! - [`files`] - idempotent file sync, argument patching, CSR rendering
//! - [`restart`] - restart/refresh coordination with bounded polling
//! - [`snapd`] - snapd REST client
//! - [`controller`] - Configuration controller and node status reporter
//! - [`config`] - operator settings and node file layout
//! - [`retry`] - backoff helper for startup calls
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod files;
pub mod merge;
pub mod restart;
pub mod retry;
pub mod snapd;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "microk8s-operator";
