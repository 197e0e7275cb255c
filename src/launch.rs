//! Debug session configuration for the Python debug adapter
//!
//! Builds the process descriptors handed to a [`SessionLauncher`]. Option names
//! are serialized in the camelCase form the adapter recognizes.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{DebuggerError, Result};
use crate::targets::AttachTarget;

/// Adapter kind every descriptor in this crate targets
pub const PYTHON_ADAPTER: &str = "python";

pub const DEFAULT_ATTACH_HOST: &str = "127.0.0.1";
pub const DEFAULT_CONSOLE: &str = "integratedTerminal";
pub const DEFAULT_DEBUG_OPTIONS: [&str; 3] = ["WaitOnAbnormalExit", "WaitOnNormalExit", "RedirectOutput"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebuggerMode {
    Launch,
    Attach,
}

impl std::fmt::Display for DebuggerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Launch => write!(f, "launch"),
            Self::Attach => write!(f, "attach"),
        }
    }
}

/// Options for attaching to an already running debuggee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachConfig {
    pub local_root: String,
    pub remote_root: String,
    pub port: u16,
    pub host: String,
}

impl From<&AttachTarget> for AttachConfig {
    fn from(target: &AttachTarget) -> Self {
        Self {
            local_root: target.local_root.clone(),
            remote_root: target.remote_root.clone(),
            port: target.port,
            host: target
                .host
                .clone()
                .unwrap_or_else(|| DEFAULT_ATTACH_HOST.to_string()),
        }
    }
}

/// Options for starting a new Python process under the debugger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfig {
    pub stop_on_entry: bool,
    pub console: String,
    pub program: String,
    pub args: Vec<String>,
    pub debug_options: Vec<String>,
    pub python_path: String,
    pub cwd: String,
}

impl LaunchConfig {
    /// Launch `program` with default adapter options.
    ///
    /// `cwd` falls back to the program's directory.
    pub fn new(program: &str, args: Vec<String>, python_path: &str, cwd: Option<&str>) -> Self {
        let cwd = cwd.map(str::to_string).unwrap_or_else(|| {
            Path::new(program)
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| ".".to_string())
        });

        Self {
            stop_on_entry: false,
            console: DEFAULT_CONSOLE.to_string(),
            program: program.to_string(),
            args,
            debug_options: DEFAULT_DEBUG_OPTIONS.iter().map(|s| s.to_string()).collect(),
            python_path: python_path.to_string(),
            cwd,
        }
    }
}

/// What a launcher needs to start one debug session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDescriptor {
    pub target_uri: String,
    pub adapter_type: String,
    pub mode: DebuggerMode,
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl ProcessDescriptor {
    pub fn attach(target_uri: impl Into<String>, config: &AttachConfig) -> Result<Self> {
        Self::build(target_uri.into(), DebuggerMode::Attach, serde_json::to_value(config)?)
    }

    pub fn launch(target_uri: impl Into<String>, config: &LaunchConfig) -> Result<Self> {
        Self::build(target_uri.into(), DebuggerMode::Launch, serde_json::to_value(config)?)
    }

    fn build(target_uri: String, mode: DebuggerMode, value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(config) => Ok(Self {
                target_uri,
                adapter_type: PYTHON_ADAPTER.to_string(),
                mode,
                config,
            }),
            other => Err(DebuggerError::Internal(format!(
                "Debug configuration is not an object: {}",
                other
            ))),
        }
    }
}

/// Starts debug sessions from process descriptors
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Start a session, returning its id
    async fn start(&self, descriptor: ProcessDescriptor) -> Result<String>;
}

/// A session started through [`SessionLog`]
#[derive(Debug, Clone)]
pub struct StartedSession {
    pub session_id: String,
    pub descriptor: ProcessDescriptor,
    pub started_at: std::time::Instant,
}

/// In-process launcher that records descriptors instead of spawning an adapter
#[derive(Clone, Default)]
pub struct SessionLog {
    // Start order
    sessions: Arc<RwLock<Vec<StartedSession>>>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded session, oldest first
    pub async fn sessions(&self) -> Vec<StartedSession> {
        self.sessions.read().await.clone()
    }
}

#[async_trait]
impl SessionLauncher for SessionLog {
    async fn start(&self, descriptor: ProcessDescriptor) -> Result<String> {
        let session_id = uuid::Uuid::new_v4().to_string();
        info!(
            "Starting {} session {} for {}",
            descriptor.mode, session_id, descriptor.target_uri
        );

        let session = StartedSession {
            session_id: session_id.clone(),
            descriptor,
            started_at: std::time::Instant::now(),
        };
        self.sessions.write().await.push(session);
        Ok(session_id)
    }
}
