//! Service arguments files
//!
//! MicroK8s keeps the command line of each service in a file with one
//! argument per line, e.g. `$SNAP_DATA/args/kubelet`:
//!
//! ```text
//! --kubeconfig=${SNAP_DATA}/credentials/kubelet.config
//! --node-labels=microk8s.io/cluster=true
//! --cluster-domain cluster.local
//! ```
//!
//! [`patch_arguments`] applies a set of upserts and deletions to such a file
//! while leaving every unrelated line exactly as it was.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::crd::ServiceArguments;
use crate::files::{read_or_empty, sync_file, FILE_MODE};
use crate::Error;

/// Normalize an argument name to `--name`
pub fn canonical_key(key: &str) -> String {
    format!("--{}", key.trim().trim_start_matches('-'))
}

/// A single line of an arguments file
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgumentEntry {
    /// A `--key=value`, `--key value` or `--key` line
    Flag {
        /// Canonical key (`--key`)
        key: String,
        /// The line as it appears in the file
        line: String,
    },
    /// Anything that is not a flag; kept as-is and never matched
    Verbatim(String),
}

impl ArgumentEntry {
    /// Parse a trimmed, non-empty line
    pub fn parse(line: &str) -> Self {
        let token = line
            .split(|c: char| c == ' ' || c == '=')
            .next()
            .unwrap_or_default();
        let name = token.trim_start_matches('-');
        if !token.starts_with('-') || name.is_empty() {
            return Self::Verbatim(line.to_string());
        }
        Self::Flag {
            key: canonical_key(name),
            line: line.to_string(),
        }
    }

    fn key(&self) -> Option<&str> {
        match self {
            Self::Flag { key, .. } => Some(key),
            Self::Verbatim(_) => None,
        }
    }

    fn line(&self) -> &str {
        match self {
            Self::Flag { line, .. } | Self::Verbatim(line) => line,
        }
    }
}

/// Render an argument in `--key=value` form
fn render(key: &str, value: &str) -> String {
    format!("{}={}", key, value)
}

/// Apply `updates` to the contents of an arguments file.
///
/// Existing lines keep their order. Lines whose key has an update are
/// rewritten as `--key=value` or dropped for deletions. Keys that are not
/// present yet are appended in sorted order. The result ends with a newline
/// unless no lines are left, in which case it is empty.
pub fn apply_updates(contents: &str, updates: &ServiceArguments) -> String {
    let updates: BTreeMap<String, Option<&str>> = updates
        .iter()
        .map(|(key, value)| (canonical_key(key), value.as_deref()))
        .collect();

    let mut seen = BTreeSet::new();
    let mut lines = Vec::new();

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let entry = ArgumentEntry::parse(line);
        let Some(key) = entry.key() else {
            lines.push(entry.line().to_string());
            continue;
        };
        seen.insert(key.to_string());
        match updates.get(key) {
            Some(None) => {}
            Some(Some(value)) => lines.push(render(key, value)),
            None => lines.push(entry.line().to_string()),
        }
    }

    for (key, value) in &updates {
        if let Some(value) = value.filter(|_| !seen.contains(key)) {
            lines.push(render(key, value));
        }
    }

    if lines.is_empty() {
        return String::new();
    }
    let mut rendered = lines.join("\n");
    rendered.push('\n');
    rendered
}

/// Patch the arguments file at `path` with `updates`.
///
/// Returns `true` when the file content changed. An empty update set never
/// touches the file.
pub async fn patch_arguments(path: &Path, updates: &ServiceArguments) -> Result<bool, Error> {
    if updates.is_empty() {
        return Ok(false);
    }
    let current = read_or_empty(path).await?;
    let contents = String::from_utf8_lossy(&current);
    let patched = apply_updates(&contents, updates);
    sync_file(path, &patched, FILE_MODE).await
}
