//! RMCP 0.3.2 implementation for Python debug attach MCP tools
//!
//! Plays the host side: roots are watched through the attach controller, the
//! in-process command service is fed from tool calls, and the duplicate-target
//! notification is surfaced through the notification center.

use rmcp::{
    tool, tool_router, tool_handler, ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::*,
    ErrorData as McpError,
    service::RequestContext,
    RoleServer,
};
use tracing::info;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::types::*;
use crate::config::Config;
use crate::controller::{AttachController, RootSubscription};
use crate::error::DebuggerError;
use crate::launch::{AttachConfig, ProcessDescriptor, SessionLog};
use crate::notification::{NotificationCenter, NotificationGate, SUPPRESS_ACTION_LABEL};
use crate::service::{RootLocation, ServiceRegistry};
use crate::targets::{detect_duplicates, format_ids, RemoteDebugCommand};

/// Python debug attach tool handler
#[derive(Clone)]
pub struct PythonDebugToolHandler {
    #[allow(dead_code)]
    tool_router: ToolRouter<PythonDebugToolHandler>,
    config: Config,
    registry: ServiceRegistry,
    center: NotificationCenter,
    sessions: SessionLog,
    controller: Arc<AttachController>,
    watches: Arc<RwLock<HashMap<String, RootSubscription>>>,
}

impl PythonDebugToolHandler {
    pub fn new(config: Config) -> Self {
        let registry = ServiceRegistry::default();
        let center = NotificationCenter::new();
        let sessions = SessionLog::new();
        let controller = AttachController::new(
            Arc::new(registry.clone()),
            Arc::new(sessions.clone()),
            NotificationGate::new(Arc::new(center.clone())),
            config.controller_options(),
        );

        Self {
            tool_router: Self::tool_router(),
            config,
            registry,
            center,
            sessions,
            controller: Arc::new(controller),
            watches: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registry used to resolve command services; embedders register remote resolvers here
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn controller(&self) -> &Arc<AttachController> {
        &self.controller
    }

    /// Cancel every watch and orphan the active notification
    pub async fn shutdown(&self) {
        self.controller.shutdown();
        self.watches.write().await.clear();
    }
}

impl Default for PythonDebugToolHandler {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

fn make_error(msg: impl Into<String>) -> McpError {
    McpError::internal_error(msg.into(), None)
}

/// Caller mistakes become invalid_params, everything else internal_error
fn to_mcp_error(e: DebuggerError) -> McpError {
    match e {
        DebuggerError::InvalidRoot(_)
        | DebuggerError::ServiceUnavailable(_)
        | DebuggerError::SubscriptionNotFound(_) => McpError::invalid_params(e.to_string(), None),
        other => make_error(other.to_string()),
    }
}

fn text(message: impl Into<String>) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(message.into())]))
}

#[tool_router]
impl PythonDebugToolHandler {
    // =========================================================================
    // Root Watching (3 tools)
    // =========================================================================

    #[tool(description = "Watch a root for attach targets and remote debug commands. Returns subscription_id.")]
    async fn watch_root(&self, Parameters(args): Parameters<WatchRootArgs>) -> Result<CallToolResult, McpError> {
        let root = RootLocation::parse(&args.root).map_err(to_mcp_error)?;
        let subscription = self.controller.watch(root.clone()).map_err(to_mcp_error)?;
        let subscription_id = subscription.id().to_string();

        self.watches.write().await.insert(subscription_id.clone(), subscription);

        info!("Subscription {} created for {}", subscription_id, root);
        text(format!(
            "Watching {} root {}\n\
             Subscription ID: {}\n\
             Command debounce: {}ms",
            root.kind(),
            root,
            subscription_id,
            self.config.debounce.as_millis(),
        ))
    }

    #[tool(description = "Stop watching a root")]
    async fn unwatch_root(&self, Parameters(args): Parameters<UnwatchRootArgs>) -> Result<CallToolResult, McpError> {
        let subscription = self.watches.write().await.remove(&args.subscription_id);

        match subscription {
            Some(subscription) => {
                subscription.cancel();
                info!("Subscription {} cancelled", args.subscription_id);
                text(format!("Stopped watching {}", subscription.root()))
            }
            None => Err(to_mcp_error(DebuggerError::SubscriptionNotFound(args.subscription_id))),
        }
    }

    #[tool(description = "List active root watches")]
    async fn list_watches(&self, Parameters(_args): Parameters<ListWatchesArgs>) -> Result<CallToolResult, McpError> {
        let watches = self.watches.read().await;
        if watches.is_empty() {
            return text("No active watches");
        }

        let mut lines = vec![format!("Active watches ({} shared sources):", self.controller.open_sources())];
        for (id, subscription) in watches.iter() {
            lines.push(format!("  {} — {} ({})", id, subscription.root(), subscription.root().kind()));
        }
        text(lines.join("\n"))
    }

    // =========================================================================
    // Local Command Service (2 tools)
    // =========================================================================

    #[tool(description = "Publish the full snapshot of attach targets announced by local debuggees")]
    async fn publish_attach_targets(&self, Parameters(args): Parameters<PublishAttachTargetsArgs>) -> Result<CallToolResult, McpError> {
        let count = args.targets.len();
        let duplicates = detect_duplicates(&args.targets);
        let observers = self.registry.local().publish_targets(args.targets);

        let mut message = format!("Published {} attach targets to {} observers", count, observers);
        if !duplicates.is_empty() {
            message.push_str(&format!("\nDuplicate ids: {}", format_ids(&duplicates)));
        }
        text(message)
    }

    #[tool(description = "Deliver a remote attach command from a local debuggee. Commands are debounced before an attach session starts.")]
    async fn send_debug_command(&self, Parameters(args): Parameters<SendDebugCommandArgs>) -> Result<CallToolResult, McpError> {
        let port = args.target.port;
        let observers = self
            .registry
            .local()
            .send_command(RemoteDebugCommand::Attach { target: args.target });

        if observers == 0 {
            return text(format!(
                "Attach command for port {} dropped: no local root is being watched",
                port
            ));
        }
        text(format!(
            "Attach command for port {} delivered to {} observers",
            port, observers
        ))
    }

    // =========================================================================
    // Debug Configurations (4 tools)
    // =========================================================================

    #[tool(description = "Report attach target ids shared by more than one target")]
    async fn find_duplicate_targets(&self, Parameters(args): Parameters<FindDuplicateTargetsArgs>) -> Result<CallToolResult, McpError> {
        let duplicates = detect_duplicates(&args.targets);
        if duplicates.is_empty() {
            return text(format!("No duplicate ids among {} targets", args.targets.len()));
        }
        text(format!("Duplicate ids: {}", format_ids(&duplicates)))
    }

    #[tool(description = "Build the Python adapter attach configuration for a target")]
    async fn attach_config(&self, Parameters(args): Parameters<AttachConfigArgs>) -> Result<CallToolResult, McpError> {
        let config = AttachConfig::from(&args.target);
        let descriptor = ProcessDescriptor::attach(args.target.local_root.clone(), &config).map_err(to_mcp_error)?;
        let json = serde_json::to_string_pretty(&descriptor).map_err(|e| make_error(e.to_string()))?;
        text(json)
    }

    #[tool(description = "Launch a Python program under the debugger")]
    async fn launch(&self, Parameters(args): Parameters<LaunchArgs>) -> Result<CallToolResult, McpError> {
        if !Path::new(&args.program).exists() {
            return Err(McpError::invalid_params(
                format!("Program not found: {}", args.program),
                None,
            ));
        }

        let session_id = self
            .controller
            .launch(&args.program, args.args.unwrap_or_default(), args.cwd.as_deref())
            .await
            .map_err(to_mcp_error)?;

        info!("Launch session {} started for {}", session_id, args.program);
        text(format!(
            "Launched {}\n\
             Session ID: {}\n\
             Python: {}",
            args.program, session_id, self.config.python_path,
        ))
    }

    #[tool(description = "List debug sessions started by this server")]
    async fn list_sessions(&self, Parameters(_args): Parameters<ListSessionsArgs>) -> Result<CallToolResult, McpError> {
        let sessions = self.sessions.sessions().await;
        if sessions.is_empty() {
            return text("No debug sessions");
        }

        let mut lines = vec!["Debug sessions:".to_string()];
        for session in &sessions {
            let elapsed = session.started_at.elapsed();
            lines.push(format!(
                "  {} — {} {} ({}s ago)",
                session.session_id,
                session.descriptor.mode,
                session.descriptor.target_uri,
                elapsed.as_secs()
            ));
        }
        text(lines.join("\n"))
    }

    // =========================================================================
    // Notifications (3 tools)
    // =========================================================================

    #[tool(description = "Show the duplicate-target notification currently displayed, if any")]
    async fn notification_status(&self, Parameters(_args): Parameters<NotificationStatusArgs>) -> Result<CallToolResult, McpError> {
        let gate = self.controller.gate();
        let mut lines = vec![format!(
            "Duplicate target notifications: {}",
            if gate.is_suppressed() { "suppressed" } else { "enabled" }
        )];

        let visible = self.center.visible();
        if visible.is_empty() {
            lines.push("No active notification".to_string());
        }
        for notification in visible {
            lines.push(format!("[{}] {}", notification.id, notification.message));
            lines.push(format!("  {}", notification.description));
            lines.push(format!("  Actions: {}", notification.actions.join(", ")));
        }
        text(lines.join("\n"))
    }

    #[tool(description = "Dismiss the active duplicate-target notification. Future duplicates will notify again.")]
    async fn dismiss_notification(&self, Parameters(_args): Parameters<DismissNotificationArgs>) -> Result<CallToolResult, McpError> {
        if self.controller.gate().dismiss_active() {
            text("Notification dismissed")
        } else {
            text("No active notification")
        }
    }

    #[tool(description = "Stop showing duplicate-target notifications for the rest of this server's lifetime")]
    async fn suppress_duplicate_notifications(&self, Parameters(_args): Parameters<SuppressNotificationsArgs>) -> Result<CallToolResult, McpError> {
        let gate = self.controller.gate();
        match gate.active_notification() {
            Some(id) if self.center.invoke_action(&id, SUPPRESS_ACTION_LABEL) => {}
            _ => gate.suppress(),
        }
        text("Duplicate target notifications suppressed")
    }
}

const TOOL_COUNT: usize = 12;

#[tool_handler]
impl ServerHandler for PythonDebugToolHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "Python Debug Attach MCP Server - watches roots for Python attach targets and \
                 remote debug commands, builds launch/attach configurations for the Python \
                 debug adapter and warns about duplicate attach target ids. \
                 {} tools available: watch_root, unwatch_root, list_watches, \
                 publish_attach_targets, send_debug_command, find_duplicate_targets, \
                 attach_config, launch, list_sessions, notification_status, \
                 dismiss_notification, suppress_duplicate_notifications.",
                TOOL_COUNT,
            )),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        info!("Python debug attach MCP server initialized with {} tools", TOOL_COUNT);
        Ok(self.get_info())
    }
}
