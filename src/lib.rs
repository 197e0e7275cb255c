//! Python Debug Attach MCP Server
//!
//! Connects a debugger host to the attach targets and remote debug commands
//! announced by Python debuggees. Builds launch/attach configurations for the
//! Python debug adapter and warns, at most once at a time, when several
//! debuggees announce the same id.

pub mod config;
pub mod controller;
pub mod error;
pub mod launch;
pub mod notification;
pub mod service;
pub mod targets;
pub mod tools;

pub use config::{Args, Config};
pub use controller::{AttachController, ControllerOptions, RootSubscription};
pub use error::{DebuggerError, Result};
pub use launch::{AttachConfig, DebuggerMode, LaunchConfig, ProcessDescriptor, SessionLauncher, SessionLog};
pub use notification::{NotificationCenter, NotificationGate, NotificationHandle, NotificationSink};
pub use service::{CommandService, LocalCommandService, RootLocation, ServiceRegistration, ServiceRegistry, ServiceResolver};
pub use targets::{detect_duplicates, AttachTarget, RemoteDebugCommand};
pub use tools::PythonDebugToolHandler;
