//! Integration tests for Configuration CRD operations
//!
//! These tests tell the story of how a cluster admin manages node
//! configuration through the Kubernetes API.

use std::collections::BTreeMap;

use kube::api::{Api, DeleteParams, PostParams};
use kube::{Client, ResourceExt};

use microk8s_operator::crd::{Configuration, ConfigurationSpec};

use super::helpers::ensure_test_cluster;

// =============================================================================
// Test Fixtures
// =============================================================================

/// A configuration that exercises every field kind: maps, lists and nulls
fn sample_configuration(name: &str) -> Configuration {
    Configuration::new(
        name,
        ConfigurationSpec {
            containerd_registry_configs: BTreeMap::from([(
                "docker.io".to_string(),
                "server = \"https://registry-1.docker.io\"\n".to_string(),
            )]),
            extra_sans: vec!["k8s.example.com".to_string()],
            extra_san_ips: vec!["10.0.0.10".to_string()],
            extra_kubelet_args: BTreeMap::from([
                ("max-pods".to_string(), Some("200".to_string())),
                ("--cpu-manager-policy".to_string(), None),
            ]),
            containerd_env: "HTTPS_PROXY=http://proxy:3128\n".to_string(),
            ..Default::default()
        },
    )
}

async fn cleanup_configuration(client: &Client, name: &str) {
    let api: Api<Configuration> = Api::all(client.clone());
    let _ = api.delete(name, &DeleteParams::default()).await;
}

// =============================================================================
// Configuration Stories
// =============================================================================

/// Story: Cluster admin publishes the cluster-wide default configuration
///
/// Expected behavior:
/// - The Configuration is cluster-scoped and keeps its name
/// - Registry configs, SANs and env survive the round trip unchanged
/// - A `null` argument value is persisted as a deletion, not dropped
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_admin_publishes_default_configuration() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<Configuration> = Api::all(client.clone());
    let name = "it-default";
    cleanup_configuration(&client, name).await;

    let created = api
        .create(&PostParams::default(), &sample_configuration(name))
        .await
        .expect("failed to create configuration");
    assert_eq!(created.name_any(), name);
    assert!(created.namespace().is_none());

    let fetched = api.get(name).await.expect("failed to get configuration");
    assert_eq!(fetched.spec, sample_configuration(name).spec);
    assert_eq!(
        fetched.spec.extra_kubelet_args.get("--cpu-manager-policy"),
        Some(&None)
    );

    cleanup_configuration(&client, name).await;
}

/// Story: Cluster admin removes a node override
///
/// Expected behavior:
/// - The object is gone after deletion
/// - Looking it up again yields nothing instead of an error, which is what
///   the reconciler relies on to treat it as empty
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_admin_removes_node_override() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<Configuration> = Api::all(client.clone());
    let name = "node.it-worker";
    cleanup_configuration(&client, name).await;

    api.create(&PostParams::default(), &sample_configuration(name))
        .await
        .expect("failed to create configuration");
    api.delete(name, &DeleteParams::default())
        .await
        .expect("failed to delete configuration");

    let mut gone = false;
    for _ in 0..10 {
        if api.get_opt(name).await.expect("lookup failed").is_none() {
            gone = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }
    assert!(gone, "configuration should be deleted");
}
