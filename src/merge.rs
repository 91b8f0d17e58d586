//! Layered configuration merge
//!
//! The cluster-wide `default` Configuration and the node's own
//! `node.<name>` Configuration collapse into a single [`EffectiveSpec`].
//! Merging is a pure function of two borrowed snapshots; neither input is
//! modified, so a cached default can never leak one node's override into
//! another node's result.

use std::collections::BTreeMap;

use crate::crd::{AddonRepositorySpec, ConfigurationSpec, ServiceArguments};
use crate::files::args::canonical_key;

/// The configuration a node actually applies
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EffectiveSpec {
    /// Addon repositories, default entries first
    pub addon_repositories: Vec<AddonRepositorySpec>,
    /// Registry name to hosts.toml contents
    pub containerd_registry_configs: BTreeMap<String, String>,
    /// Pod CIDR
    pub pod_cidr: String,
    /// Extra DNS SANs, default entries first (may contain duplicates)
    pub extra_sans: Vec<String>,
    /// Extra IP SANs, default entries first (may contain duplicates)
    pub extra_san_ips: Vec<String>,
    /// kubelet argument updates; `None` deletes the argument
    pub extra_kubelet_args: ServiceArguments,
    /// kube-apiserver argument updates; `None` deletes the argument
    pub extra_kube_apiserver_args: ServiceArguments,
    /// containerd environment file contents
    pub containerd_env: String,
}

impl From<&ConfigurationSpec> for EffectiveSpec {
    fn from(spec: &ConfigurationSpec) -> Self {
        Self {
            addon_repositories: spec.addon_repositories.clone(),
            containerd_registry_configs: spec.containerd_registry_configs.clone(),
            pod_cidr: spec.pod_cidr.clone(),
            extra_sans: spec.extra_sans.clone(),
            extra_san_ips: spec.extra_san_ips.clone(),
            extra_kubelet_args: spec.extra_kubelet_args.clone(),
            extra_kube_apiserver_args: spec.extra_kube_apiserver_args.clone(),
            containerd_env: spec.containerd_env.clone(),
        }
    }
}

/// Merge a base snapshot with an override snapshot.
///
/// Either snapshot may be absent, which is the same as an empty spec.
/// - maps: union, override wins per key (including deletion sentinels)
/// - lists: base followed by override, no deduplication
/// - scalars: override wins only when non-empty
pub fn merge(base: Option<&ConfigurationSpec>, overrides: Option<&ConfigurationSpec>) -> EffectiveSpec {
    let empty = ConfigurationSpec::default();
    let base = base.unwrap_or(&empty);
    let overrides = overrides.unwrap_or(&empty);

    EffectiveSpec {
        addon_repositories: concat(&base.addon_repositories, &overrides.addon_repositories),
        containerd_registry_configs: merge_maps(
            &base.containerd_registry_configs,
            &overrides.containerd_registry_configs,
        ),
        pod_cidr: merge_scalar(&base.pod_cidr, &overrides.pod_cidr),
        extra_sans: concat(&base.extra_sans, &overrides.extra_sans),
        extra_san_ips: concat(&base.extra_san_ips, &overrides.extra_san_ips),
        extra_kubelet_args: merge_arguments(&base.extra_kubelet_args, &overrides.extra_kubelet_args),
        extra_kube_apiserver_args: merge_arguments(
            &base.extra_kube_apiserver_args,
            &overrides.extra_kube_apiserver_args,
        ),
        containerd_env: merge_scalar(&base.containerd_env, &overrides.containerd_env),
    }
}

fn concat<T: Clone>(base: &[T], overrides: &[T]) -> Vec<T> {
    base.iter().chain(overrides).cloned().collect()
}

fn merge_scalar(base: &str, overrides: &str) -> String {
    if overrides.is_empty() {
        base.to_string()
    } else {
        overrides.to_string()
    }
}

fn merge_maps(
    base: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = base.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Argument keys match by canonical `--key` form, so an override of `key`
/// replaces a base `--key` while untouched keys keep their spelling.
fn merge_arguments(base: &ServiceArguments, overrides: &ServiceArguments) -> ServiceArguments {
    let mut merged = base.clone();
    for (key, value) in overrides {
        let canonical = canonical_key(key);
        merged.retain(|existing, _| canonical_key(existing) != canonical);
        merged.insert(key.clone(), value.clone());
    }
    merged
}
