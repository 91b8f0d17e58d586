//! snapd REST client
//!
//! MicroK8s is shipped as a snap, so its services are restarted and its
//! package metadata is read through the snapd API. snapd listens on a unix
//! socket and speaks plain HTTP/1.1 with JSON bodies wrapped in an envelope:
//!
//! ```json
//! {"type": "sync",  "status-code": 200, "result": {...}}
//! {"type": "async", "status-code": 202, "change": "42"}
//! {"type": "error", "status-code": 400, "result": {"message": "..."}}
//! ```
//!
//! Asynchronous requests return a change id that is polled through
//! `/v2/changes/<id>`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::UnixStream;
use tracing::{debug, trace};

use crate::restart::{OperationId, OperationStatus, PackageInfo, ServiceManager, MICROK8S_PACKAGE};
use crate::Error;

/// Default location of the snapd socket
pub const DEFAULT_SNAPD_SOCKET: &str = "/run/snapd.socket";

/// Snap configuration key written to make the microk8s configure hook run
const CONFIGURE_HOOK_KEY: &str = "operator-configure-hook";

/// Response envelope shared by every snapd endpoint
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    change: Option<String>,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct Change {
    status: String,
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    err: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snap {
    name: String,
    #[serde(default)]
    revision: Value,
    #[serde(rename = "tracking-channel", default)]
    tracking_channel: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    version: String,
    #[serde(default)]
    confinement: String,
}

/// [`ServiceManager`] backed by the snapd REST API
#[derive(Clone, Debug)]
pub struct SnapdClient {
    socket_path: PathBuf,
}

impl SnapdClient {
    /// Create a client talking to the snapd socket at `socket_path`
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Path of the snapd socket
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send one request over a fresh connection and unwrap the envelope
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Envelope, Error> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            Error::service_manager(format!(
                "failed to connect to snapd at {}: {}",
                self.socket_path.display(),
                e
            ))
        })?;

        let (mut sender, connection) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| Error::service_manager(format!("snapd handshake failed: {}", e)))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                trace!(error = %e, "snapd connection closed");
            }
        });

        let payload = match body {
            Some(value) => Bytes::from(
                serde_json::to_vec(&value).map_err(|e| Error::serialization(e.to_string()))?,
            ),
            None => Bytes::new(),
        };
        let request = Request::builder()
            .method(method.clone())
            .uri(path)
            .header(header::HOST, "localhost")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json")
            .body(Full::new(payload))
            .map_err(|e| Error::service_manager(format!("invalid snapd request: {}", e)))?;

        debug!(method = %method, path = %path, "snapd request");
        let response = sender
            .send_request(request)
            .await
            .map_err(|e| Error::service_manager(format!("snapd {} {} failed: {}", method, path, e)))?;

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| Error::service_manager(format!("failed to read snapd response: {}", e)))?
            .to_bytes();

        parse_envelope(status, &bytes)
    }
}

#[async_trait]
impl ServiceManager for SnapdClient {
    async fn restart(&self, service: &str) -> Result<OperationId, Error> {
        let body = json!({ "action": "restart", "names": [service] });
        let envelope = self.request(Method::POST, "/v2/apps", Some(body)).await?;
        change_id(envelope)
    }

    async fn refresh_certificates(&self) -> Result<OperationId, Error> {
        let body = json!({ CONFIGURE_HOOK_KEY: chrono::Utc::now().to_rfc3339() });
        let path = format!("/v2/snaps/{}/conf", MICROK8S_PACKAGE);
        let envelope = self.request(Method::PUT, &path, Some(body)).await?;
        change_id(envelope)
    }

    async fn operation_status(&self, id: &OperationId) -> Result<OperationStatus, Error> {
        let path = format!("/v2/changes/{}", id);
        let envelope = self.request(Method::GET, &path, None).await?;
        change_status(envelope.result)
    }

    async fn package_info(&self, name: &str) -> Result<PackageInfo, Error> {
        let path = format!("/v2/snaps?snaps={}", name);
        let envelope = self.request(Method::GET, &path, None).await?;
        package_info(envelope.result, name)
    }
}

/// Decode a snapd response body, turning error envelopes into errors
fn parse_envelope(status: StatusCode, body: &[u8]) -> Result<Envelope, Error> {
    let envelope: Envelope = serde_json::from_slice(body).map_err(|e| {
        Error::serialization(format!("invalid snapd response (HTTP {}): {}", status, e))
    })?;

    if envelope.kind == "error" || !status.is_success() {
        let message = envelope
            .result
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status));
        return Err(Error::service_manager(message));
    }
    Ok(envelope)
}

/// Extract the change id of an asynchronous response
fn change_id(envelope: Envelope) -> Result<OperationId, Error> {
    match (envelope.kind.as_str(), envelope.change) {
        ("async", Some(id)) if !id.is_empty() => Ok(OperationId(id)),
        (kind, _) => Err(Error::service_manager(format!(
            "expected an async snapd response with a change id, got {:?}",
            kind
        ))),
    }
}

/// Map a change document to an operation status
///
/// A change is complete once snapd marks it ready. Anything that is ready
/// but not `Done` (`Error`, `Hold`, `Undone`, ...) is a failure.
fn change_status(result: Value) -> Result<OperationStatus, Error> {
    let change: Change =
        serde_json::from_value(result).map_err(|e| Error::serialization(e.to_string()))?;

    if change.status == "Done" {
        return Ok(OperationStatus {
            done: true,
            error: None,
        });
    }
    if change.ready {
        let reason = change
            .err
            .filter(|err| !err.is_empty())
            .unwrap_or_else(|| format!("change finished with status {}", change.status));
        return Ok(OperationStatus {
            done: true,
            error: Some(reason),
        });
    }
    Ok(OperationStatus::default())
}

/// Pick `name` out of a snap list result
fn package_info(result: Value, name: &str) -> Result<PackageInfo, Error> {
    let snaps: Vec<Snap> =
        serde_json::from_value(result).map_err(|e| Error::serialization(e.to_string()))?;

    let snap = snaps
        .into_iter()
        .find(|snap| snap.name == name)
        .ok_or_else(|| Error::service_manager(format!("snap {} is not installed", name)))?;

    // snapd reports revisions as strings, older versions as numbers
    let revision = match snap.revision {
        Value::String(revision) => revision,
        Value::Number(revision) => revision.to_string(),
        _ => String::new(),
    };

    Ok(PackageInfo {
        revision,
        channel: snap.tracking_channel.or(snap.channel).unwrap_or_default(),
        version: snap.version,
        confinement: snap.confinement,
    })
}
