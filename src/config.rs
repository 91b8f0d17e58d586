//! Operator settings
//!
//! Everything the operator needs to know about the node it runs on comes
//! from flags or the environment of the pod: the node name, the MicroK8s
//! `SNAP_DATA` directory mounted from the host and the snapd socket.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;

use crate::snapd::DEFAULT_SNAPD_SOCKET;
use crate::Error;

/// Default interval between two node status updates
pub const DEFAULT_STATUS_INTERVAL_SECS: u64 = 60;

/// Settings for the controller mode
#[derive(Args, Clone, Debug)]
pub struct Settings {
    /// Name of the node this operator instance manages
    #[arg(long, env = "NODE_NAME")]
    pub node_name: String,

    /// MicroK8s SNAP_DATA directory (usually /var/snap/microk8s/current)
    #[arg(long, env = "SNAP_DATA")]
    pub snap_data: PathBuf,

    /// Path of the snapd REST API socket
    #[arg(long, env = "SNAP_SOCKET", default_value = DEFAULT_SNAPD_SOCKET)]
    pub snap_socket: PathBuf,

    /// Seconds between two MicroK8sNode status updates
    #[arg(long, default_value_t = DEFAULT_STATUS_INTERVAL_SECS)]
    pub status_interval_secs: u64,
}

impl Settings {
    /// Reject settings the operator cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        if self.node_name.trim().is_empty() {
            return Err(Error::config(
                "NODE_NAME must be set to the name of the current node",
            ));
        }
        if self.snap_data.as_os_str().is_empty() {
            return Err(Error::config(
                "SNAP_DATA must be set to the SNAP_DATA directory of MicroK8s",
            ));
        }
        if self.status_interval_secs == 0 {
            return Err(Error::config("status interval must be at least one second"));
        }
        Ok(())
    }

    /// Interval between two node status updates
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    /// Files managed on this node
    pub fn paths(&self) -> NodePaths {
        NodePaths::from_snap_data(&self.snap_data)
    }
}

/// Locations of the files the operator manages, relative to `SNAP_DATA`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodePaths {
    /// `args/containerd-env`
    pub containerd_env: PathBuf,
    /// `args/certs.d`, one `<registry>/hosts.toml` per registry
    pub registry_certs_dir: PathBuf,
    /// `certs/csr.conf.template`
    pub csr_conf_template: PathBuf,
    /// `args/kubelet`
    pub kubelet_args: PathBuf,
    /// `args/kube-apiserver`
    pub kube_apiserver_args: PathBuf,
}

impl NodePaths {
    /// Derive all paths from the `SNAP_DATA` directory
    pub fn from_snap_data(snap_data: &Path) -> Self {
        let args = snap_data.join("args");
        Self {
            containerd_env: args.join("containerd-env"),
            registry_certs_dir: args.join("certs.d"),
            csr_conf_template: snap_data.join("certs").join("csr.conf.template"),
            kubelet_args: args.join("kubelet"),
            kube_apiserver_args: args.join("kube-apiserver"),
        }
    }

    /// `hosts.toml` location for `registry`
    pub fn registry_hosts_file(&self, registry: &str) -> PathBuf {
        self.registry_certs_dir.join(registry).join("hosts.toml")
    }
}
