//! Configuration controller
//!
//! Every node runs one operator instance. Whenever the `default` or the
//! `node.<this node>` Configuration changes, both are read back, merged into
//! an [`EffectiveSpec`] and applied to the local MicroK8s files through five
//! independent pipelines:
//!
//! 1. containerd environment file, restart containerd if it changed
//! 2. registry `hosts.toml` files (no restart, containerd reloads them)
//! 3. CSR configuration, refresh certificates if it changed
//! 4. kubelet arguments, restart kubelite if they changed
//! 5. kube-apiserver arguments, restart kubelite if they changed
//!
//! A failing pipeline is logged and does not stop the ones after it.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::Api;
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::config::NodePaths;
use crate::crd::{
    node_configuration_name, Configuration, ServiceArguments, DEFAULT_CONFIGURATION_NAME,
};
use crate::files::args::patch_arguments;
use crate::files::sans::render_csr_config;
use crate::files::{ensure_dir, sync_file, DIR_MODE, FILE_MODE};
use crate::merge::{merge, EffectiveSpec};
use crate::restart::{
    OperationRequest, PollPolicy, RestartCoordinator, ServiceManager, CONTAINERD_SERVICE,
    KUBELITE_SERVICE,
};
use crate::snapd::{SnapdClient, DEFAULT_SNAPD_SOCKET};
use crate::Error;

/// Periodic resync when every pipeline succeeded
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Requeue delay after a reconcile in which some pipeline failed
pub const FAILED_PIPELINE_REQUEUE: Duration = Duration::from_secs(30);

/// Read access to Configuration objects
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigurationStore: Send + Sync {
    /// Get a Configuration by name, `None` if it does not exist
    async fn get_configuration(&self, name: &str) -> Result<Option<Configuration>, Error>;
}

/// [`ConfigurationStore`] backed by the Kubernetes API
pub struct KubeConfigurationStore {
    client: Client,
}

impl KubeConfigurationStore {
    /// Create a store using `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConfigurationStore for KubeConfigurationStore {
    async fn get_configuration(&self, name: &str) -> Result<Option<Configuration>, Error> {
        let api: Api<Configuration> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }
}

/// Shared state of the Configuration controller
pub struct Context {
    /// Source of Configuration objects
    pub store: Arc<dyn ConfigurationStore>,
    /// Service manager used to restart services and refresh certificates
    pub manager: Arc<dyn ServiceManager>,
    /// Node this operator instance manages
    pub node_name: String,
    /// Files managed on this node
    pub paths: NodePaths,
    /// Polling policy for restarts and certificate refreshes
    pub poll_policy: PollPolicy,
}

impl Context {
    /// Create a context from explicit collaborators
    pub fn new(
        store: Arc<dyn ConfigurationStore>,
        manager: Arc<dyn ServiceManager>,
        node_name: impl Into<String>,
        paths: NodePaths,
    ) -> Self {
        Self {
            store,
            manager,
            node_name: node_name.into(),
            paths,
            poll_policy: PollPolicy::default(),
        }
    }

    /// Create a builder that talks to the cluster through `client`
    pub fn builder(client: Client, node_name: impl Into<String>, paths: NodePaths) -> ContextBuilder {
        ContextBuilder {
            client,
            node_name: node_name.into(),
            paths,
            store: None,
            manager: None,
            poll_policy: PollPolicy::default(),
        }
    }

    /// Replace the polling policy
    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    /// Whether `name` is a Configuration this node consumes
    pub fn is_relevant(&self, name: &str) -> bool {
        name == DEFAULT_CONFIGURATION_NAME || name == node_configuration_name(&self.node_name)
    }
}

/// Builder for [`Context`]
///
/// ```ignore
/// let ctx = Context::builder(client, "node-1", paths)
///     .service_manager(Arc::new(SnapdClient::new("/run/snapd.socket")))
///     .build();
/// ```
pub struct ContextBuilder {
    client: Client,
    node_name: String,
    paths: NodePaths,
    store: Option<Arc<dyn ConfigurationStore>>,
    manager: Option<Arc<dyn ServiceManager>>,
    poll_policy: PollPolicy,
}

impl ContextBuilder {
    /// Override the Configuration store
    pub fn configuration_store(mut self, store: Arc<dyn ConfigurationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the service manager (defaults to snapd on its default socket)
    pub fn service_manager(mut self, manager: Arc<dyn ServiceManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Set the restart polling policy
    pub fn poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            store: self
                .store
                .unwrap_or_else(|| Arc::new(KubeConfigurationStore::new(self.client.clone()))),
            manager: self
                .manager
                .unwrap_or_else(|| Arc::new(SnapdClient::new(DEFAULT_SNAPD_SOCKET))),
            node_name: self.node_name,
            paths: self.paths,
            poll_policy: self.poll_policy,
        }
    }
}

/// One of the independent apply steps
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pipeline {
    /// `args/containerd-env`
    ContainerdEnv,
    /// `args/certs.d/<registry>/hosts.toml`
    RegistryConfigs,
    /// `certs/csr.conf.template`
    CertificateSans,
    /// `args/kubelet`
    KubeletArgs,
    /// `args/kube-apiserver`
    KubeApiserverArgs,
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ContainerdEnv => "containerd-env",
            Self::RegistryConfigs => "registry-configs",
            Self::CertificateSans => "certificate-sans",
            Self::KubeletArgs => "kubelet-args",
            Self::KubeApiserverArgs => "kube-apiserver-args",
        })
    }
}

/// Outcome of applying an [`EffectiveSpec`]
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Pipelines that changed files on disk
    pub changed: Vec<Pipeline>,
    /// Pipelines that failed
    pub failed: Vec<Pipeline>,
}

impl PipelineReport {
    fn record(&mut self, pipeline: Pipeline, result: Result<bool, Error>) {
        match result {
            Ok(true) => {
                info!(%pipeline, "configuration applied");
                self.changed.push(pipeline);
            }
            Ok(false) => debug!(%pipeline, "configuration up to date"),
            Err(e) => {
                error!(%pipeline, error = %e, "failed to apply configuration");
                self.failed.push(pipeline);
            }
        }
    }

    /// True when no pipeline failed
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Reconcile a Configuration change for this node
///
/// Configurations for other nodes are ignored. Missing `default` or node
/// objects count as empty. Store errors abort the reconcile and go through
/// [`error_policy`]; pipeline errors are isolated and only shorten the
/// requeue delay.
#[instrument(skip(config, ctx), fields(configuration = %config.name_any(), node = %ctx.node_name))]
pub async fn reconcile(config: Arc<Configuration>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = config.name_any();
    if !ctx.is_relevant(&name) {
        debug!("ignoring configuration for another node");
        return Ok(Action::await_change());
    }

    let base = ctx.store.get_configuration(DEFAULT_CONFIGURATION_NAME).await?;
    let overrides = ctx
        .store
        .get_configuration(&node_configuration_name(&ctx.node_name))
        .await?;
    let spec = merge(
        base.as_ref().map(|c| &c.spec),
        overrides.as_ref().map(|c| &c.spec),
    );

    let report = apply_effective_spec(&spec, &ctx).await;
    if report.is_success() {
        Ok(Action::requeue(RESYNC_INTERVAL))
    } else {
        warn!(failed = ?report.failed, "some pipelines failed, retrying later");
        Ok(Action::requeue(FAILED_PIPELINE_REQUEUE))
    }
}

/// Error policy for the Configuration controller
pub fn error_policy(config: Arc<Configuration>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        configuration = %config.name_any(),
        "reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(Duration::from_secs(5))
    } else {
        Action::requeue(Duration::from_secs(30))
    }
}

/// Run all five pipelines for `spec`, in order, each isolated from the others
pub async fn apply_effective_spec(spec: &EffectiveSpec, ctx: &Context) -> PipelineReport {
    let coordinator = RestartCoordinator::new(ctx.manager.clone(), ctx.poll_policy);
    let paths = &ctx.paths;
    let mut report = PipelineReport::default();

    report.record(
        Pipeline::ContainerdEnv,
        sync_containerd_env(&spec.containerd_env, paths, &coordinator).await,
    );
    report.record(
        Pipeline::RegistryConfigs,
        sync_registry_configs(spec, paths).await,
    );
    report.record(
        Pipeline::CertificateSans,
        sync_certificate_sans(spec, paths, &coordinator).await,
    );
    report.record(
        Pipeline::KubeletArgs,
        patch_and_restart(&paths.kubelet_args, &spec.extra_kubelet_args, &coordinator).await,
    );
    report.record(
        Pipeline::KubeApiserverArgs,
        patch_and_restart(
            &paths.kube_apiserver_args,
            &spec.extra_kube_apiserver_args,
            &coordinator,
        )
        .await,
    );

    report
}

async fn sync_containerd_env(
    env: &str,
    paths: &NodePaths,
    coordinator: &RestartCoordinator,
) -> Result<bool, Error> {
    if env.is_empty() {
        return Ok(false);
    }
    let changed = sync_file(&paths.containerd_env, env, FILE_MODE).await?;
    if changed {
        coordinator
            .run(&OperationRequest::restart(CONTAINERD_SERVICE))
            .await?;
    }
    Ok(changed)
}

/// Write every registry's `hosts.toml`; one bad registry does not stop the rest
async fn sync_registry_configs(spec: &EffectiveSpec, paths: &NodePaths) -> Result<bool, Error> {
    let mut changed = false;
    let mut first_error = None;

    for (registry, hosts) in &spec.containerd_registry_configs {
        match sync_registry(registry, hosts, paths).await {
            Ok(updated) => {
                if updated {
                    info!(%registry, "updated registry configuration");
                } else {
                    debug!(%registry, "registry configuration up to date");
                }
                changed |= updated;
            }
            Err(e) => {
                warn!(%registry, error = %e, "failed to update registry configuration");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(changed),
    }
}

async fn sync_registry(registry: &str, hosts: &str, paths: &NodePaths) -> Result<bool, Error> {
    validate_registry_name(registry)?;
    ensure_dir(&paths.registry_certs_dir.join(registry), DIR_MODE).await?;
    sync_file(&paths.registry_hosts_file(registry), hosts, FILE_MODE).await
}

/// Registry names become directory names under `certs.d`
fn validate_registry_name(registry: &str) -> Result<(), Error> {
    if registry.is_empty()
        || registry == "."
        || registry == ".."
        || registry.contains(['/', '\\'])
    {
        return Err(Error::config(format!(
            "invalid registry name {:?}",
            registry
        )));
    }
    Ok(())
}

async fn sync_certificate_sans(
    spec: &EffectiveSpec,
    paths: &NodePaths,
    coordinator: &RestartCoordinator,
) -> Result<bool, Error> {
    let Some(csr_conf) = render_csr_config(&spec.extra_sans, &spec.extra_san_ips)? else {
        return Ok(false);
    };
    let changed = sync_file(&paths.csr_conf_template, &csr_conf, FILE_MODE).await?;
    if changed {
        coordinator
            .run(&OperationRequest::RefreshCertificates)
            .await?;
    }
    Ok(changed)
}

async fn patch_and_restart(
    path: &Path,
    updates: &ServiceArguments,
    coordinator: &RestartCoordinator,
) -> Result<bool, Error> {
    let changed = patch_arguments(path, updates).await?;
    if changed {
        coordinator
            .run(&OperationRequest::restart(KUBELITE_SERVICE))
            .await?;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ConfigurationSpec;
    use crate::error::api_error;
    use crate::restart::{MockServiceManager, OperationId, OperationStatus};
    use rstest::rstest;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    // =========================================================================
    // Fixtures
    // =========================================================================

    struct Node {
        _dir: tempfile::TempDir,
        paths: NodePaths,
    }

    /// A SNAP_DATA layout with the `args` and `certs` directories present
    fn snap_data() -> Node {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("args")).unwrap();
        std::fs::create_dir_all(dir.path().join("certs")).unwrap();
        let paths = NodePaths::from_snap_data(dir.path());
        Node { _dir: dir, paths }
    }

    fn configuration(name: &str, spec: ConfigurationSpec) -> Configuration {
        Configuration::new(name, spec)
    }

    fn args(entries: &[(&str, Option<&str>)]) -> ServiceArguments {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    fn store_with(objects: Vec<Configuration>) -> MockConfigurationStore {
        let objects: BTreeMap<String, Configuration> = objects
            .into_iter()
            .map(|c| (c.name_any(), c))
            .collect();
        let mut store = MockConfigurationStore::new();
        store
            .expect_get_configuration()
            .returning(move |name| Ok(objects.get(name).cloned()));
        store
    }

    /// Records every triggered operation and completes it on the first poll
    #[derive(Clone, Default)]
    struct Operations(Arc<Mutex<Vec<String>>>);

    impl Operations {
        fn manager(&self) -> MockServiceManager {
            let mut manager = MockServiceManager::new();
            let restarts = self.0.clone();
            manager.expect_restart().returning(move |service| {
                restarts.lock().unwrap().push(service.to_string());
                Ok(OperationId("1".to_string()))
            });
            let refreshes = self.0.clone();
            manager.expect_refresh_certificates().returning(move || {
                refreshes.lock().unwrap().push("refresh-certificates".to_string());
                Ok(OperationId("2".to_string()))
            });
            manager.expect_operation_status().returning(|_| {
                Ok(OperationStatus {
                    done: true,
                    error: None,
                })
            });
            manager
        }

        fn taken(&self) -> Vec<String> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    fn context(store: MockConfigurationStore, manager: MockServiceManager, node: &Node) -> Arc<Context> {
        Arc::new(Context::new(
            Arc::new(store),
            Arc::new(manager),
            "node-1",
            node.paths.clone(),
        ))
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    // =========================================================================
    // Trigger filtering
    // =========================================================================

    /// Story: every node sees every Configuration change; overrides for other
    /// nodes must not cause any reads or writes here
    #[tokio::test]
    async fn story_other_node_configuration_is_ignored() {
        let node = snap_data();
        let mut store = MockConfigurationStore::new();
        store.expect_get_configuration().never();
        let mut manager = MockServiceManager::new();
        manager.expect_restart().never();
        let ctx = context(store, manager, &node);

        let config = Arc::new(configuration("node.node-2", ConfigurationSpec::default()));
        let action = reconcile(config, ctx).await.unwrap();

        assert_eq!(action, Action::await_change());
    }

    #[rstest]
    #[case("default", true)]
    #[case("node.node-1", true)]
    #[case("node.node-2", false)]
    #[case("node-1", false)]
    fn relevance_is_by_name(#[case] name: &str, #[case] relevant: bool) {
        let node = snap_data();
        let ctx = context(MockConfigurationStore::new(), MockServiceManager::new(), &node);
        assert_eq!(ctx.is_relevant(name), relevant);
    }

    // =========================================================================
    // Restart only on change
    // =========================================================================

    /// Story: a new containerd environment is written and containerd is
    /// restarted once; reconciling again without changes restarts nothing
    #[tokio::test]
    async fn story_containerd_env_restarts_only_on_change() {
        let node = snap_data();
        let default = configuration(
            "default",
            ConfigurationSpec {
                containerd_env: "HTTPS_PROXY=http://squid.internal:3128\n".to_string(),
                ..Default::default()
            },
        );
        let ops = Operations::default();
        let ctx = context(store_with(vec![default.clone()]), ops.manager(), &node);

        let action = reconcile(Arc::new(default.clone()), ctx.clone()).await.unwrap();
        assert_eq!(action, Action::requeue(RESYNC_INTERVAL));
        assert_eq!(ops.taken(), vec![CONTAINERD_SERVICE.to_string()]);
        assert_eq!(
            read(&node.paths.containerd_env),
            "HTTPS_PROXY=http://squid.internal:3128\n"
        );

        reconcile(Arc::new(default), ctx).await.unwrap();
        assert!(ops.taken().is_empty(), "no restart without a change");
    }

    /// Story: the node override wins over the default for the same kubelet
    /// flag, and kubelite is restarted to pick it up
    #[tokio::test]
    async fn story_node_override_wins_for_kubelet_args() {
        let node = snap_data();
        std::fs::write(&node.paths.kubelet_args, "--max-pods=110\n--node-ip=10.0.0.1\n").unwrap();
        let default = configuration(
            "default",
            ConfigurationSpec {
                extra_kubelet_args: args(&[("max-pods", Some("150")), ("--eviction-hard", Some("memory.available<100Mi"))]),
                ..Default::default()
            },
        );
        let override_ = configuration(
            "node.node-1",
            ConfigurationSpec {
                extra_kubelet_args: args(&[("--max-pods", Some("250")), ("eviction-hard", None)]),
                ..Default::default()
            },
        );
        let ops = Operations::default();
        let ctx = context(store_with(vec![default, override_.clone()]), ops.manager(), &node);

        reconcile(Arc::new(override_), ctx).await.unwrap();

        assert_eq!(read(&node.paths.kubelet_args), "--max-pods=250\n--node-ip=10.0.0.1\n");
        assert_eq!(ops.taken(), vec![KUBELITE_SERVICE.to_string()]);
    }

    /// Story: registry mirrors are picked up by containerd without a restart
    #[tokio::test]
    async fn story_registry_configs_are_written_without_restart() {
        let node = snap_data();
        let hosts = "server = \"https://registry-1.docker.io\"\n\n[host.\"http://mirror.internal:5000\"]\ncapabilities = [\"pull\", \"resolve\"]\n";
        let default = configuration(
            "default",
            ConfigurationSpec {
                containerd_registry_configs: BTreeMap::from([
                    ("docker.io".to_string(), hosts.to_string()),
                    ("localhost:32000".to_string(), "server = \"http://localhost:32000\"\n".to_string()),
                ]),
                ..Default::default()
            },
        );
        let mut manager = MockServiceManager::new();
        manager.expect_restart().never();
        manager.expect_refresh_certificates().never();
        let ctx = context(store_with(vec![default.clone()]), manager, &node);

        reconcile(Arc::new(default), ctx).await.unwrap();

        assert_eq!(read(&node.paths.registry_hosts_file("docker.io")), hosts);
        assert!(node.paths.registry_hosts_file("localhost:32000").exists());
    }

    /// Story: extra SANs regenerate the CSR configuration and trigger a
    /// certificate refresh
    #[tokio::test]
    async fn story_sans_refresh_certificates() {
        let node = snap_data();
        let default = configuration(
            "default",
            ConfigurationSpec {
                extra_sans: vec!["api.example.com".to_string()],
                extra_san_ips: vec!["192.168.1.10".to_string()],
                ..Default::default()
            },
        );
        let ops = Operations::default();
        let ctx = context(store_with(vec![default.clone()]), ops.manager(), &node);

        reconcile(Arc::new(default), ctx).await.unwrap();

        let csr = read(&node.paths.csr_conf_template);
        assert!(csr.contains("DNS.1 = api.example.com\n"));
        assert!(csr.contains("IP.1 = 192.168.1.10\n"));
        assert_eq!(ops.taken(), vec!["refresh-certificates".to_string()]);
    }

    /// Story: with no Configuration objects at all nothing is touched
    #[tokio::test]
    async fn story_missing_objects_change_nothing() {
        let node = snap_data();
        let mut manager = MockServiceManager::new();
        manager.expect_restart().never();
        manager.expect_refresh_certificates().never();
        let ctx = context(store_with(vec![]), manager, &node);

        let config = Arc::new(configuration("default", ConfigurationSpec::default()));
        let action = reconcile(config, ctx).await.unwrap();

        assert_eq!(action, Action::requeue(RESYNC_INTERVAL));
        assert!(!node.paths.containerd_env.exists());
        assert!(!node.paths.csr_conf_template.exists());
        assert!(!node.paths.kubelet_args.exists());
    }

    // =========================================================================
    // Failure isolation
    // =========================================================================

    /// Story: when the containerd environment file cannot be written, the
    /// remaining pipelines still run and the reconcile asks for an early retry
    #[tokio::test]
    async fn story_failing_pipeline_does_not_block_others() {
        let node = snap_data();
        // a directory where the env file should be makes the write fail
        std::fs::create_dir_all(&node.paths.containerd_env).unwrap();
        let default = configuration(
            "default",
            ConfigurationSpec {
                containerd_env: "HTTP_PROXY=http://proxy:3128\n".to_string(),
                extra_kube_apiserver_args: args(&[("audit-log-maxage", Some("30"))]),
                ..Default::default()
            },
        );
        let ops = Operations::default();
        let ctx = context(store_with(vec![default.clone()]), ops.manager(), &node);

        let action = reconcile(Arc::new(default), ctx).await.unwrap();

        assert_eq!(action, Action::requeue(FAILED_PIPELINE_REQUEUE));
        assert_eq!(read(&node.paths.kube_apiserver_args), "--audit-log-maxage=30\n");
        assert_eq!(ops.taken(), vec![KUBELITE_SERVICE.to_string()]);
    }

    /// Story: a restart that never completes fails its own pipeline; the file
    /// change stays on disk and the next pipeline still runs
    #[tokio::test(start_paused = true)]
    async fn story_restart_timeout_is_isolated() {
        let node = snap_data();
        let spec = EffectiveSpec {
            extra_kubelet_args: args(&[("max-pods", Some("200"))]),
            extra_kube_apiserver_args: args(&[("audit-log-maxage", Some("30"))]),
            ..Default::default()
        };
        let mut manager = MockServiceManager::new();
        manager
            .expect_restart()
            .times(2)
            .returning(|_| Ok(OperationId("3".to_string())));
        manager
            .expect_operation_status()
            .returning(|_| Ok(OperationStatus::default()));
        let ctx = Context::new(
            Arc::new(MockConfigurationStore::new()),
            Arc::new(manager),
            "node-1",
            node.paths.clone(),
        );

        let report = apply_effective_spec(&spec, &ctx).await;

        assert_eq!(
            report.failed,
            vec![Pipeline::KubeletArgs, Pipeline::KubeApiserverArgs]
        );
        assert_eq!(read(&node.paths.kubelet_args), "--max-pods=200\n");
        assert_eq!(read(&node.paths.kube_apiserver_args), "--audit-log-maxage=30\n");
    }

    #[tokio::test]
    async fn bad_registry_name_does_not_stop_other_registries() {
        let node = snap_data();
        let spec = EffectiveSpec {
            containerd_registry_configs: BTreeMap::from([
                ("../escape".to_string(), "x".to_string()),
                ("quay.io".to_string(), "server = \"https://quay.io\"\n".to_string()),
            ]),
            ..Default::default()
        };

        let result = sync_registry_configs(&spec, &node.paths).await;

        assert!(matches!(result, Err(Error::Config(_))));
        assert!(node.paths.registry_hosts_file("quay.io").exists());
    }

    /// Story: object store failures other than not-found abort the reconcile
    /// so the controller retries it
    #[tokio::test]
    async fn story_store_errors_propagate() {
        let node = snap_data();
        let mut store = MockConfigurationStore::new();
        store
            .expect_get_configuration()
            .returning(|_| Err(Error::from(api_error(503))));
        let ctx = context(store, MockServiceManager::new(), &node);

        let config = Arc::new(configuration("default", ConfigurationSpec::default()));
        let err = reconcile(config.clone(), ctx.clone()).await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(
            error_policy(config, &err, ctx),
            Action::requeue(Duration::from_secs(5))
        );
    }

    #[test]
    fn permanent_errors_back_off_longer() {
        let node = snap_data();
        let ctx = context(MockConfigurationStore::new(), MockServiceManager::new(), &node);
        let config = Arc::new(configuration("default", ConfigurationSpec::default()));

        let action = error_policy(config, &Error::config("bad"), ctx);
        assert_eq!(action, Action::requeue(Duration::from_secs(30)));
    }
}
