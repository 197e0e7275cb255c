//! Attach targets and duplicate target detection
//!
//! An attach target describes a running Python process a debugger can attach to.
//! Processes announce themselves with an optional id; two processes announcing
//! the same id make it ambiguous which one a remote command refers to.

use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A running process available for a debugger to attach to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttachTarget {
    /// Identifier announced by the process, if any
    #[serde(default)]
    pub id: Option<String>,
    /// Source root on the machine running the debugger
    pub local_root: String,
    /// Source root on the machine running the process
    pub remote_root: String,
    /// Port the debug server inside the process listens on
    pub port: u16,
    /// Host the debug server is reachable on (defaults to loopback)
    #[serde(default)]
    pub host: Option<String>,
}

impl AttachTarget {
    pub fn new(local_root: impl Into<String>, remote_root: impl Into<String>, port: u16) -> Self {
        Self {
            id: None,
            local_root: local_root.into(),
            remote_root: remote_root.into(),
            port,
            host: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

/// Command received from a debuggee asking the host to act on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RemoteDebugCommand {
    /// Start an attach session against the target
    Attach { target: AttachTarget },
}

/// Collect every id that occurs on two or more targets.
///
/// Targets without an id are skipped, so they never collide with each other.
pub fn detect_duplicates(targets: &[AttachTarget]) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut duplicates = HashSet::new();

    for id in targets.iter().filter_map(|t| t.id.as_deref()) {
        if !seen.insert(id) {
            duplicates.insert(id.to_string());
        }
    }

    duplicates
}

/// Render a duplicate id set as a stable, comma-joined list
pub fn format_ids(ids: &HashSet<String>) -> String {
    let mut sorted: Vec<&str> = ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(", ")
}
