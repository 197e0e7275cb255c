//! Attach controller
//!
//! Watches roots for attach-target snapshots and remote debug commands.
//! Roots that resolve to the same command service share one source, however
//! many subscriptions watch them. The source checks every snapshot for
//! duplicates and debounces commands before starting an attach session, so a
//! command is handled once per service, not once per subscription.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::future;
use futures::stream::{BoxStream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{DebuggerError, Result};
use crate::launch::{AttachConfig, LaunchConfig, ProcessDescriptor, SessionLauncher};
use crate::notification::NotificationGate;
use crate::service::{CommandService, RootLocation, ServiceResolver, ServiceStream};
use crate::targets::{detect_duplicates, AttachTarget, RemoteDebugCommand};

/// Quiet window applied to remote debug commands
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub debounce: Duration,
    /// Interpreter used for launch sessions
    pub python_path: String,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            python_path: "python3".to_string(),
        }
    }
}

/// Identity of a resolved command service
type ServiceKey = usize;

fn service_key(service: &Arc<dyn CommandService>) -> ServiceKey {
    Arc::as_ptr(service) as *const () as ServiceKey
}

/// Items of `stream` up to its first failure.
///
/// A failure is logged and treated as the end of the stream, so observers
/// see an empty continuation instead of an error.
fn until_error<T: Send + 'static>(
    root: RootLocation,
    label: &'static str,
    stream: ServiceStream<T>,
) -> BoxStream<'static, T> {
    stream
        .scan((), move |_, item| {
            let next = match item {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(
                        "{} stream for {} root {} failed, continuing without it: {}",
                        label,
                        root.kind(),
                        root,
                        e
                    );
                    None
                }
            };
            future::ready(next)
        })
        .boxed()
}

/// Emit the last item received once `window` passes without a newer one.
///
/// A pending item is flushed when the stream ends and dropped on cancellation.
pub async fn debounce<S, T, F, Fut>(mut items: S, window: Duration, cancel: CancellationToken, mut emit: F)
where
    S: Stream<Item = T> + Unpin,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut pending: Option<T> = None;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            next = items.next() => match next {
                Some(item) => pending = Some(item),
                None => break,
            },
            _ = tokio::time::sleep(window), if pending.is_some() => {
                if let Some(item) = pending.take() {
                    emit(item).await;
                }
            }
        }
    }
    if let Some(item) = pending.take() {
        emit(item).await;
    }
}

fn check_snapshot(root: &RootLocation, gate: &NotificationGate, targets: &[AttachTarget]) {
    let duplicates = detect_duplicates(targets);
    if !duplicates.is_empty() {
        debug!("{} duplicate attach target ids under {}", duplicates.len(), root);
    }
    gate.maybe_notify(&duplicates);
}

async fn watch_targets(
    root: RootLocation,
    mut targets: BoxStream<'static, Vec<AttachTarget>>,
    gate: NotificationGate,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            next = targets.next() => match next {
                Some(snapshot) => check_snapshot(&root, &gate, &snapshot),
                None => {
                    debug!("Attach target stream for {} ended", root);
                    return;
                }
            }
        }
    }
}

async fn attach(root: &RootLocation, launcher: &dyn SessionLauncher, target: AttachTarget) -> Result<String> {
    let config = AttachConfig::from(&target);
    let descriptor = ProcessDescriptor::attach(target.local_root.clone(), &config)?;
    info!(
        "Attaching to {}:{} (id {}) under {}",
        config.host,
        config.port,
        target.id.as_deref().unwrap_or("none"),
        root
    );
    launcher.start(descriptor).await
}

/// One upstream connection per command service, shared by every subscription
/// whose root resolves to it. Dropping the last reference stops its tasks.
struct SharedSource {
    cancel: CancellationToken,
    // Pins the service so its key stays unique while the source is open
    _service: Arc<dyn CommandService>,
}

impl SharedSource {
    fn open(
        root: &RootLocation,
        service: Arc<dyn CommandService>,
        gate: NotificationGate,
        launcher: Arc<dyn SessionLauncher>,
        window: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let targets = until_error(root.clone(), "Attach target", service.observe_attach_targets());
        tokio::spawn(watch_targets(root.clone(), targets, gate, cancel.clone()));

        let commands = until_error(
            root.clone(),
            "Remote debug command",
            service.observe_remote_debug_commands(),
        );
        let command_root = root.clone();
        tokio::spawn(debounce(commands, window, cancel.clone(), move |command| {
            let launcher = launcher.clone();
            let root = command_root.clone();
            async move {
                let RemoteDebugCommand::Attach { target } = command;
                match attach(&root, launcher.as_ref(), target).await {
                    Ok(session_id) => info!("Attach session {} started", session_id),
                    Err(e) => error!("Attach failed for {}: {}", root, e),
                }
            }
        }));

        info!("Opened command source for {} root {}", root.kind(), root);
        Self {
            cancel,
            _service: service,
        }
    }
}

impl Drop for SharedSource {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Cancellable watch over one root. Dropping it cancels the watch.
pub struct RootSubscription {
    id: String,
    root: RootLocation,
    cancel: CancellationToken,
    // Keeps the shared source open until cancelled
    source: Mutex<Option<Arc<SharedSource>>>,
}

impl RootSubscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &RootLocation {
        &self.root
    }

    /// Stop watching. The shared source closes once no subscription holds it.
    pub fn cancel(&self) {
        self.cancel.cancel();
        let source = self
            .source
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(source);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for RootSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Wires command services to the notification gate and the session launcher
pub struct AttachController {
    resolver: Arc<dyn ServiceResolver>,
    launcher: Arc<dyn SessionLauncher>,
    gate: NotificationGate,
    options: ControllerOptions,
    sources: Mutex<HashMap<ServiceKey, Weak<SharedSource>>>,
    cancel: CancellationToken,
}

impl AttachController {
    pub fn new(
        resolver: Arc<dyn ServiceResolver>,
        launcher: Arc<dyn SessionLauncher>,
        gate: NotificationGate,
        options: ControllerOptions,
    ) -> Self {
        Self {
            resolver,
            launcher,
            gate,
            options,
            sources: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn gate(&self) -> &NotificationGate {
        &self.gate
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    fn sources(&self) -> MutexGuard<'_, HashMap<ServiceKey, Weak<SharedSource>>> {
        self.sources.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn source_for(&self, root: &RootLocation) -> Result<Arc<SharedSource>> {
        let service = self.resolver.resolve_service(root)?;
        let key = service_key(&service);

        let mut sources = self.sources();
        if let Some(source) = sources.get(&key).and_then(Weak::upgrade) {
            debug!("Reusing command source for {}", root);
            return Ok(source);
        }

        let source = Arc::new(SharedSource::open(
            root,
            service,
            self.gate.clone(),
            self.launcher.clone(),
            self.options.debounce,
            self.cancel.child_token(),
        ));
        sources.retain(|_, weak| weak.strong_count() > 0);
        sources.insert(key, Arc::downgrade(&source));
        Ok(source)
    }

    /// Number of open shared sources (one per resolved command service)
    pub fn open_sources(&self) -> usize {
        self.sources().values().filter(|weak| weak.strong_count() > 0).count()
    }

    /// Start watching `root`. Must be called inside a tokio runtime.
    pub fn watch(&self, root: RootLocation) -> Result<RootSubscription> {
        if self.cancel.is_cancelled() {
            return Err(DebuggerError::ControllerShutDown);
        }

        let source = self.source_for(&root)?;
        let id = uuid::Uuid::new_v4().to_string();

        info!("Watching {} root {} (subscription {})", root.kind(), root, id);
        Ok(RootSubscription {
            id,
            root,
            cancel: self.cancel.child_token(),
            source: Mutex::new(Some(source)),
        })
    }

    /// Start a launch session for `program`
    pub async fn launch(&self, program: &str, args: Vec<String>, cwd: Option<&str>) -> Result<String> {
        let config = LaunchConfig::new(program, args, &self.options.python_path, cwd);
        let descriptor = ProcessDescriptor::launch(program, &config)?;
        self.launcher.start(descriptor).await
    }

    /// Cancel every subscription and orphan any active notification.
    ///
    /// Suppression state on the gate is left as is. Later calls to
    /// [`watch`](Self::watch) fail.
    pub fn shutdown(&self) {
        info!("Shutting down attach controller");
        self.cancel.cancel();
        self.gate.detach();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
