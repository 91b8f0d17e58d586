//! Integration tests for the MicroK8s operator
//!
//! These tests require a Kubernetes cluster (kind works) and tell the story
//! of how cluster admins and nodes interact through the operator CRDs.
//!
//! # Test Organization
//!
//! - `crd_operations`: Stories about creating, reading and deleting
//!   Configuration resources through the Kubernetes API
//!
//! - `node_status`: Stories about a node publishing its MicroK8sNode status
//!   and removing it again on shutdown
//!
//! # Running These Tests
//!
//! ```bash
//! cargo test --test kind -- --ignored
//! ```

mod crd_operations;
mod helpers;
mod node_status;
