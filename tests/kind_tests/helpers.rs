//! Shared setup for cluster tests

use std::time::Duration;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use microk8s_operator::crd::{Configuration, MicroK8sNode};
use microk8s_operator::FIELD_MANAGER;

/// Connect to the cluster in the current kubeconfig and make sure the
/// operator CRDs are installed and served
pub async fn ensure_test_cluster() -> Result<Client, Box<dyn std::error::Error>> {
    let client = Client::try_default().await?;

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();
    for (name, crd) in [
        (Configuration::crd_name(), Configuration::crd()),
        (MicroK8sNode::crd_name(), MicroK8sNode::crd()),
    ] {
        crds.patch(name, &params, &Patch::Apply(&crd)).await?;
    }

    // CRDs take a moment to become established
    let configurations: Api<Configuration> = Api::all(client.clone());
    let nodes: Api<MicroK8sNode> = Api::all(client.clone());
    for _ in 0..30 {
        let ready = configurations.list(&ListParams::default().limit(1)).await.is_ok()
            && nodes.list(&ListParams::default().limit(1)).await.is_ok();
        if ready {
            return Ok(client);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    Err("operator CRDs were not established in time".into())
}
