//! Restart coordination
//!
//! Restarting a MicroK8s service or regenerating its certificates is an
//! asynchronous operation on the service manager: the trigger call returns an
//! operation id and the operation has to be polled until it finishes. The
//! [`RestartCoordinator`] drives that as an explicit state machine with a
//! hard deadline:
//!
//! ```text
//! Idle -> Requested -> Polling -> Done
//!                  \          \-> TimedOut
//!                   \-> Failed <-/
//! ```
//!
//! The deadline also bounds each trigger and status call, so a stalled
//! service manager cannot hold the caller past it. A timeout is reported as [`Error::OperationTimeout`], separate from a
//! failed trigger or status query ([`Error::ServiceManager`]).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::Error;

/// Service running containerd
pub const CONTAINERD_SERVICE: &str = "microk8s.daemon-containerd";

/// Service running kubelet, kube-apiserver and the other control plane components
pub const KUBELITE_SERVICE: &str = "microk8s.daemon-kubelite";

/// Package whose metadata the node status reports
pub const MICROK8S_PACKAGE: &str = "microk8s";

/// Opaque id of an asynchronous service manager operation
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OperationId(pub String);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Progress of an asynchronous operation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OperationStatus {
    /// The operation has finished, successfully or not
    pub done: bool,
    /// Failure reported by the service manager
    pub error: Option<String>,
}

/// Installed package metadata
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageInfo {
    /// Installed revision
    pub revision: String,
    /// Channel the package tracks
    pub channel: String,
    /// Package version string
    pub version: String,
    /// Confinement mode (`strict`, `classic`, ...)
    pub confinement: String,
}

/// Operations exposed by the host's service manager
///
/// Implemented by [`crate::snapd::SnapdClient`] in production and mocked in
/// tests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Request a restart of `service`
    async fn restart(&self, service: &str) -> Result<OperationId, Error>;

    /// Request regeneration of the server certificates
    async fn refresh_certificates(&self) -> Result<OperationId, Error>;

    /// Query the progress of an operation
    async fn operation_status(&self, id: &OperationId) -> Result<OperationStatus, Error>;

    /// Look up metadata of an installed package
    async fn package_info(&self, name: &str) -> Result<PackageInfo, Error>;
}

/// Operation the coordinator triggers
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationRequest {
    /// Restart the named service
    RestartService(String),
    /// Regenerate certificates from the CSR configuration
    RefreshCertificates,
}

impl OperationRequest {
    /// Restart request for `service`
    pub fn restart(service: impl Into<String>) -> Self {
        Self::RestartService(service.into())
    }
}

impl fmt::Display for OperationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RestartService(service) => write!(f, "restart of {}", service),
            Self::RefreshCertificates => f.write_str("certificate refresh"),
        }
    }
}

/// Polling cadence and deadline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two status queries
    pub interval: Duration,
    /// Deadline measured from the trigger request
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
        }
    }
}

/// State of one coordinated operation
#[derive(Debug)]
pub enum RestartState {
    /// Nothing requested yet
    Idle,
    /// The trigger is about to be sent
    Requested {
        /// Deadline for the whole operation
        deadline: Instant,
    },
    /// The operation is running and its status is being polled
    Polling {
        /// Operation returned by the trigger
        id: OperationId,
        /// Deadline for the whole operation
        deadline: Instant,
    },
    /// The operation completed successfully
    Done,
    /// The deadline passed before the operation completed
    TimedOut,
    /// The trigger, a status query, or the operation itself failed
    Failed(Error),
}

impl RestartState {
    /// True for `Done`, `TimedOut` and `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::TimedOut | Self::Failed(_))
    }
}

/// Triggers service manager operations and waits for them to finish
pub struct RestartCoordinator {
    manager: Arc<dyn ServiceManager>,
    policy: PollPolicy,
}

impl RestartCoordinator {
    /// Create a coordinator using `manager` with the given polling policy
    pub fn new(manager: Arc<dyn ServiceManager>, policy: PollPolicy) -> Self {
        Self { manager, policy }
    }

    /// Trigger `request` and wait until it completes or the deadline passes
    pub async fn run(&self, request: &OperationRequest) -> Result<(), Error> {
        let mut state = RestartState::Idle;
        while !state.is_terminal() {
            state = self.step(request, state).await;
        }

        match state {
            RestartState::Done => {
                info!(operation = %request, "operation completed");
                Ok(())
            }
            RestartState::TimedOut => {
                warn!(operation = %request, timeout = ?self.policy.timeout, "operation timed out");
                Err(Error::OperationTimeout {
                    operation: request.to_string(),
                    timeout: self.policy.timeout,
                })
            }
            RestartState::Failed(e) => {
                warn!(operation = %request, error = %e, "operation failed");
                Err(e)
            }
            // the loop only exits on terminal states
            other => Err(Error::service_manager(format!(
                "{} stopped in state {:?}",
                request, other
            ))),
        }
    }

    /// Advance the state machine by one transition
    pub async fn step(&self, request: &OperationRequest, state: RestartState) -> RestartState {
        match state {
            RestartState::Idle => RestartState::Requested {
                deadline: Instant::now() + self.policy.timeout,
            },
            RestartState::Requested { deadline } => {
                match timeout_at(deadline, self.trigger(request)).await {
                    Err(_) => RestartState::TimedOut,
                    Ok(Ok(id)) => {
                        debug!(operation = %request, id = %id, "operation started");
                        RestartState::Polling { id, deadline }
                    }
                    Ok(Err(e)) => RestartState::Failed(e),
                }
            }
            RestartState::Polling { id, deadline } => {
                if Instant::now() >= deadline {
                    return RestartState::TimedOut;
                }
                let Ok(status) = timeout_at(deadline, self.manager.operation_status(&id)).await
                else {
                    return RestartState::TimedOut;
                };
                match status {
                    Err(e) => RestartState::Failed(e),
                    Ok(OperationStatus {
                        error: Some(reason),
                        ..
                    }) => RestartState::Failed(Error::service_manager(format!(
                        "{} (operation {}) failed: {}",
                        request, id, reason
                    ))),
                    Ok(OperationStatus { done: true, .. }) => RestartState::Done,
                    Ok(_) => {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        tokio::time::sleep(self.policy.interval.min(remaining)).await;
                        RestartState::Polling { id, deadline }
                    }
                }
            }
            terminal => terminal,
        }
    }

    async fn trigger(&self, request: &OperationRequest) -> Result<OperationId, Error> {
        match request {
            OperationRequest::RestartService(service) => self.manager.restart(service).await,
            OperationRequest::RefreshCertificates => self.manager.refresh_certificates().await,
        }
    }
}
