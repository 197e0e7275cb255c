//! Type definitions for Python debug attach MCP tools

use serde::Deserialize;
use schemars::JsonSchema;

use crate::targets::AttachTarget;

// ============================================================================
// watch_root / unwatch_root / list_watches
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WatchRootArgs {
    /// Root to watch: a local path or a remote URI like "nuclide://host/path"
    pub root: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UnwatchRootArgs {
    /// Subscription ID returned by watch_root
    pub subscription_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListWatchesArgs {
    // No parameters needed
}

// ============================================================================
// publish_attach_targets / send_debug_command
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PublishAttachTargetsArgs {
    /// Full snapshot of attach targets currently announced by local debuggees
    pub targets: Vec<AttachTarget>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SendDebugCommandArgs {
    /// Target the debuggee asks the host to attach to
    pub target: AttachTarget,
}

// ============================================================================
// find_duplicate_targets
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FindDuplicateTargetsArgs {
    /// Attach targets to check for shared ids
    pub targets: Vec<AttachTarget>,
}

// ============================================================================
// attach_config / launch / list_sessions
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AttachConfigArgs {
    /// Target to build the attach configuration for
    pub target: AttachTarget,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LaunchArgs {
    /// Path to the Python program to run under the debugger
    pub program: String,
    /// Program arguments
    #[serde(default)]
    pub args: Option<Vec<String>>,
    /// Working directory (defaults to the program's directory)
    #[serde(default)]
    pub cwd: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListSessionsArgs {
    // No parameters needed
}

// ============================================================================
// notifications
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct NotificationStatusArgs {
    // No parameters needed
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DismissNotificationArgs {
    // No parameters needed
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SuppressNotificationsArgs {
    // No parameters needed
}
