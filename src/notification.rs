//! Duplicate-target notifications
//!
//! [`NotificationGate`] decides whether a duplicate-target alert may be shown and
//! owns the "don't notify me again" latch. [`NotificationSink`] is the seam to
//! whatever actually displays notifications; [`NotificationCenter`] is the
//! in-process sink used by the MCP server.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, info, warn};

use crate::targets::format_ids;

/// Label of the action that silences duplicate-target alerts for good
pub const SUPPRESS_ACTION_LABEL: &str = "Don't notify me again";

pub type ActionCallback = Arc<dyn Fn() + Send + Sync>;
pub type DismissCallback = Box<dyn FnOnce() + Send>;

/// A button attached to a notification
#[derive(Clone)]
pub struct NotificationAction {
    pub label: String,
    pub callback: ActionCallback,
}

impl std::fmt::Debug for NotificationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationAction").field("label", &self.label).finish()
    }
}

/// Everything a sink needs to display one notification
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub message: String,
    pub description: String,
    pub actions: Vec<NotificationAction>,
}

/// A displayed notification
pub trait NotificationHandle: Send + Sync {
    fn id(&self) -> &str;

    /// Remove the notification. Runs dismiss callbacks once; later calls do nothing.
    fn dismiss(&self);

    /// Register a callback for dismissal. Runs immediately if already dismissed.
    fn on_dismiss(&self, callback: DismissCallback);
}

/// Something that can show notifications to the user
pub trait NotificationSink: Send + Sync {
    fn show(&self, request: NotificationRequest) -> Arc<dyn NotificationHandle>;
}

// ============================================================================
// Gate
// ============================================================================

struct GateState {
    should_notify: bool,
    active: Option<Arc<dyn NotificationHandle>>,
    // A sink call is in flight; the lock is not held across it
    showing: bool,
}

/// Shows at most one duplicate-target notification at a time, until suppressed.
///
/// Suppression is terminal for the lifetime of the gate. Clones share state.
#[derive(Clone)]
pub struct NotificationGate {
    sink: Arc<dyn NotificationSink>,
    state: Arc<Mutex<GateState>>,
}

impl NotificationGate {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            state: Arc::new(Mutex::new(GateState {
                should_notify: true,
                active: None,
                showing: false,
            })),
        }
    }

    fn lock(state: &Mutex<GateState>) -> MutexGuard<'_, GateState> {
        // Gate state stays consistent even if a holder panicked
        state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Show a notification for `duplicate_ids` if the gate allows it.
    ///
    /// No-op when the set is empty, the gate is suppressed, or a notification
    /// is already on screen.
    pub fn maybe_notify(&self, duplicate_ids: &HashSet<String>) {
        if duplicate_ids.is_empty() {
            return;
        }

        let (ids, request) = {
            let mut state = Self::lock(&self.state);
            if !state.should_notify || state.active.is_some() || state.showing {
                debug!(
                    "Duplicate target notification skipped (suppressed: {}, active: {})",
                    !state.should_notify,
                    state.active.is_some() || state.showing
                );
                return;
            }
            state.showing = true;

            let ids = format_ids(duplicate_ids);
            let weak = Arc::downgrade(&self.state);
            let request = NotificationRequest {
                message: format!("Multiple Python debug targets share the same id: {}", ids),
                description: "Remote debug commands for these ids may attach to the wrong process. \
                              Give each debuggee a unique id."
                    .to_string(),
                actions: vec![NotificationAction {
                    label: SUPPRESS_ACTION_LABEL.to_string(),
                    callback: Arc::new(move || {
                        if let Some(state) = weak.upgrade() {
                            Self::suppress_state(&state);
                        }
                    }),
                }],
            };
            (ids, request)
        };

        // The sink may run the notification's actions before returning
        info!("Notifying about duplicate attach target ids: {}", ids);
        let handle = self.sink.show(request);

        let installed = {
            let mut state = Self::lock(&self.state);
            state.showing = false;
            if state.should_notify {
                state.active = Some(handle.clone());
            }
            state.should_notify
        };
        if !installed {
            debug!("Notification {} suppressed while being shown", handle.id());
            handle.dismiss();
            return;
        }

        // Registered without the lock held: an already-dismissed handle runs this inline.
        let weak = Arc::downgrade(&self.state);
        let id = handle.id().to_string();
        handle.on_dismiss(Box::new(move || {
            if let Some(state) = weak.upgrade() {
                let mut state = Self::lock(&state);
                if state.active.as_ref().is_some_and(|h| h.id() == id) {
                    state.active = None;
                }
            }
        }));
    }

    fn suppress_state(state: &Mutex<GateState>) {
        let active = {
            let mut state = Self::lock(state);
            if state.should_notify {
                info!("Duplicate target notifications suppressed");
            }
            state.should_notify = false;
            state.active.clone()
        };
        if let Some(handle) = active {
            handle.dismiss();
        }
    }

    /// The "don't notify me again" action: latch suppression and dismiss the active notification
    pub fn suppress(&self) {
        Self::suppress_state(&self.state);
    }

    /// Dismiss the active notification without suppressing future ones
    pub fn dismiss_active(&self) -> bool {
        let active = Self::lock(&self.state).active.clone();
        match active {
            Some(handle) => {
                handle.dismiss();
                true
            }
            None => false,
        }
    }

    /// Forget the active notification without dismissing it (session teardown)
    pub fn detach(&self) {
        if let Some(handle) = Self::lock(&self.state).active.take() {
            debug!("Orphaning notification {}", handle.id());
        }
    }

    pub fn is_suppressed(&self) -> bool {
        !Self::lock(&self.state).should_notify
    }

    /// Id of the notification currently on screen, if any
    pub fn active_notification(&self) -> Option<String> {
        Self::lock(&self.state).active.as_ref().map(|h| h.id().to_string())
    }
}

// ============================================================================
// In-process sink
// ============================================================================

/// Notification handle whose dismiss callbacks run exactly once
pub struct DisplayedNotification {
    id: String,
    // None once dismissed
    callbacks: Mutex<Option<Vec<DismissCallback>>>,
}

impl DisplayedNotification {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            callbacks: Mutex::new(Some(Vec::new())),
        }
    }

    pub fn is_dismissed(&self) -> bool {
        self.callbacks.lock().map(|c| c.is_none()).unwrap_or(true)
    }
}

impl Default for DisplayedNotification {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationHandle for DisplayedNotification {
    fn id(&self) -> &str {
        &self.id
    }

    fn dismiss(&self) {
        let callbacks = match self.callbacks.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(callbacks) = callbacks {
            debug!("Notification {} dismissed", self.id);
            for callback in callbacks {
                callback();
            }
        }
    }

    fn on_dismiss(&self, callback: DismissCallback) {
        let mut guard = match self.callbacks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_mut() {
            Some(callbacks) => callbacks.push(callback),
            None => {
                drop(guard);
                callback();
            }
        }
    }
}

/// Snapshot of a notification shown by [`NotificationCenter`]
#[derive(Debug, Clone)]
pub struct NotificationSummary {
    pub id: String,
    pub message: String,
    pub description: String,
    pub actions: Vec<String>,
}

struct CenterEntry {
    request: NotificationRequest,
    handle: Arc<DisplayedNotification>,
}

/// In-process notification sink that keeps visible notifications in memory
#[derive(Clone, Default)]
pub struct NotificationCenter {
    visible: Arc<Mutex<HashMap<String, CenterEntry>>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CenterEntry>> {
        self.visible.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn visible(&self) -> Vec<NotificationSummary> {
        self.entries()
            .iter()
            .map(|(id, entry)| NotificationSummary {
                id: id.clone(),
                message: entry.request.message.clone(),
                description: entry.request.description.clone(),
                actions: entry.request.actions.iter().map(|a| a.label.clone()).collect(),
            })
            .collect()
    }

    /// Dismiss a visible notification by id
    pub fn dismiss(&self, id: &str) -> bool {
        let handle = self.entries().get(id).map(|e| e.handle.clone());
        match handle {
            Some(handle) => {
                handle.dismiss();
                true
            }
            None => false,
        }
    }

    /// Run the action labelled `label` on a visible notification
    pub fn invoke_action(&self, id: &str, label: &str) -> bool {
        let callback = self.entries().get(id).and_then(|entry| {
            entry
                .request
                .actions
                .iter()
                .find(|a| a.label == label)
                .map(|a| a.callback.clone())
        });
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => {
                warn!("No action '{}' on notification {}", label, id);
                false
            }
        }
    }
}

impl NotificationSink for NotificationCenter {
    fn show(&self, request: NotificationRequest) -> Arc<dyn NotificationHandle> {
        let handle = Arc::new(DisplayedNotification::new());
        let id = handle.id().to_string();

        warn!("{} ({})", request.message, request.description);

        self.entries().insert(
            id.clone(),
            CenterEntry {
                request,
                handle: handle.clone(),
            },
        );

        let visible: Weak<Mutex<HashMap<String, CenterEntry>>> = Arc::downgrade(&self.visible);
        handle.on_dismiss(Box::new(move || {
            if let Some(visible) = visible.upgrade() {
                visible
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .remove(&id);
            }
        }));

        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sink that records every request and hands back the handles
    #[derive(Default)]
    struct RecordingSink {
        shown: Mutex<Vec<(NotificationRequest, Arc<DisplayedNotification>)>>,
    }

    impl RecordingSink {
        fn count(&self) -> usize {
            self.shown.lock().unwrap().len()
        }

        fn last(&self) -> (NotificationRequest, Arc<DisplayedNotification>) {
            self.shown.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl NotificationSink for RecordingSink {
        fn show(&self, request: NotificationRequest) -> Arc<dyn NotificationHandle> {
            let handle = Arc::new(DisplayedNotification::new());
            self.shown.lock().unwrap().push((request, handle.clone()));
            handle
        }
    }

    fn ids(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn gate() -> (NotificationGate, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (NotificationGate::new(sink.clone()), sink)
    }

    #[test]
    fn test_empty_set_is_noop() {
        let (gate, sink) = gate();
        gate.maybe_notify(&HashSet::new());
        assert_eq!(sink.count(), 0);
        assert!(gate.active_notification().is_none());
    }

    #[test]
    fn test_message_lists_ids() {
        let (gate, sink) = gate();
        gate.maybe_notify(&ids(&["web", "api"]));
        let (request, _) = sink.last();
        assert!(request.message.contains("api, web"));
        assert_eq!(request.actions.len(), 1);
        assert_eq!(request.actions[0].label, SUPPRESS_ACTION_LABEL);
    }

    #[test]
    fn test_second_call_while_active_is_noop() {
        let (gate, sink) = gate();
        gate.maybe_notify(&ids(&["X"]));
        gate.maybe_notify(&ids(&["X"]));
        assert_eq!(sink.count(), 1);
        assert!(gate.active_notification().is_some());
    }

    #[test]
    fn test_suppress_action_is_terminal() {
        let (gate, sink) = gate();
        gate.maybe_notify(&ids(&["X"]));
        let (request, handle) = sink.last();

        (request.actions[0].callback)();
        assert!(gate.is_suppressed());
        assert!(handle.is_dismissed());
        assert!(gate.active_notification().is_none());

        gate.maybe_notify(&ids(&["Y"]));
        gate.maybe_notify(&ids(&["Z"]));
        assert_eq!(sink.count(), 1);

        // Suppressing again changes nothing
        gate.suppress();
        assert!(gate.is_suppressed());
        assert_eq!(sink.count(), 1);
    }

    #[test]
    fn test_generic_dismiss_allows_new_notification() {
        let (gate, sink) = gate();
        gate.maybe_notify(&ids(&["X"]));
        let (_, handle) = sink.last();

        handle.dismiss();
        assert!(gate.active_notification().is_none());
        assert!(!gate.is_suppressed());

        gate.maybe_notify(&ids(&["Y"]));
        assert_eq!(sink.count(), 2);
        assert!(sink.last().0.message.contains("Y"));
    }

    #[test]
    fn test_dismiss_active() {
        let (gate, sink) = gate();
        assert!(!gate.dismiss_active());
        gate.maybe_notify(&ids(&["X"]));
        assert!(gate.dismiss_active());
        assert!(sink.last().1.is_dismissed());
        assert!(gate.active_notification().is_none());
    }

    #[test]
    fn test_detach_orphans_active() {
        let (gate, sink) = gate();
        gate.maybe_notify(&ids(&["X"]));
        let (_, orphan) = sink.last();
        gate.detach();
        assert!(gate.active_notification().is_none());
        assert!(!orphan.is_dismissed());

        gate.maybe_notify(&ids(&["Y"]));
        let current = gate.active_notification().unwrap();

        // A late dismissal of the orphan must not clear the new notification
        orphan.dismiss();
        assert_eq!(gate.active_notification(), Some(current));
    }

    #[test]
    fn test_suppress_survives_detach() {
        let (gate, sink) = gate();
        gate.suppress();
        gate.detach();
        gate.maybe_notify(&ids(&["X"]));
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_independent_gates() {
        let (a, sink_a) = gate();
        let (b, sink_b) = gate();
        a.suppress();
        b.maybe_notify(&ids(&["X"]));
        a.maybe_notify(&ids(&["X"]));
        assert_eq!(sink_a.count(), 0);
        assert_eq!(sink_b.count(), 1);
    }

    #[test]
    fn test_handle_callbacks_run_once() {
        let handle = DisplayedNotification::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        handle.on_dismiss(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        handle.dismiss();
        handle.dismiss();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let c = calls.clone();
        handle.on_dismiss(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    /// Sink whose user answers "don't notify me again" before `show` returns
    #[derive(Default)]
    struct EagerSuppressSink {
        shown: Mutex<Vec<Arc<DisplayedNotification>>>,
    }

    impl NotificationSink for EagerSuppressSink {
        fn show(&self, request: NotificationRequest) -> Arc<dyn NotificationHandle> {
            let handle = Arc::new(DisplayedNotification::new());
            self.shown.lock().unwrap().push(handle.clone());
            let suppress = request
                .actions
                .iter()
                .find(|a| a.label == SUPPRESS_ACTION_LABEL)
                .unwrap();
            (suppress.callback)();
            handle
        }
    }

    #[test]
    fn test_action_run_inside_show() {
        let sink = Arc::new(EagerSuppressSink::default());
        let gate = NotificationGate::new(sink.clone());

        gate.maybe_notify(&ids(&["X"]));
        assert!(gate.is_suppressed());
        assert!(gate.active_notification().is_none());
        assert!(sink.shown.lock().unwrap()[0].is_dismissed());

        gate.maybe_notify(&ids(&["Y"]));
        assert_eq!(sink.shown.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_center_tracks_visible() {
        let center = NotificationCenter::new();
        let gate = NotificationGate::new(Arc::new(center.clone()));

        gate.maybe_notify(&ids(&["X"]));
        let visible = center.visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].actions, vec![SUPPRESS_ACTION_LABEL.to_string()]);

        assert!(center.dismiss(&visible[0].id));
        assert!(center.visible().is_empty());
        assert!(gate.active_notification().is_none());
        assert!(!center.dismiss(&visible[0].id));
    }

    #[test]
    fn test_center_invoke_suppress_action() {
        let center = NotificationCenter::new();
        let gate = NotificationGate::new(Arc::new(center.clone()));

        gate.maybe_notify(&ids(&["X"]));
        let id = gate.active_notification().unwrap();
        assert!(!center.invoke_action(&id, "Nope"));
        assert!(center.invoke_action(&id, SUPPRESS_ACTION_LABEL));

        assert!(gate.is_suppressed());
        assert!(center.visible().is_empty());
    }
}
