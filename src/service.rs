//! Command service resolution
//!
//! A [`CommandService`] streams attach-target snapshots and remote debug
//! commands for one root location. Local roots are served by the in-process
//! [`LocalCommandService`]; remote roots need a resolver registered on the
//! [`ServiceRegistry`] for as long as its [`ServiceRegistration`] guard lives.

use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{DebuggerError, Result};
use crate::targets::{AttachTarget, RemoteDebugCommand};

/// URI scheme used for roots on a remote host
pub const REMOTE_SCHEME: &str = "nuclide";

const CHANNEL_CAPACITY: usize = 64;

pub type ServiceStream<T> = BoxStream<'static, Result<T>>;

/// A local or remote filesystem root
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RootLocation {
    Local(String),
    Remote { hostname: String, path: String },
}

impl RootLocation {
    /// Parse a plain path or a `nuclide://host/path` URI
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DebuggerError::InvalidRoot("empty root".to_string()));
        }

        match s.split_once("://") {
            None => Ok(Self::Local(s.to_string())),
            Some((scheme, rest)) if scheme == REMOTE_SCHEME => {
                let (hostname, path) = match rest.find('/') {
                    Some(idx) => (&rest[..idx], &rest[idx..]),
                    None => (rest, "/"),
                };
                if hostname.is_empty() {
                    return Err(DebuggerError::InvalidRoot(format!("missing hostname in '{}'", s)));
                }
                Ok(Self::Remote {
                    hostname: hostname.to_string(),
                    path: path.to_string(),
                })
            }
            Some((scheme, _)) => Err(DebuggerError::InvalidRoot(format!(
                "unsupported scheme '{}' in '{}'",
                scheme, s
            ))),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// "local" or "remote", for log messages
    pub fn kind(&self) -> &'static str {
        if self.is_remote() {
            "remote"
        } else {
            "local"
        }
    }
}

impl std::fmt::Display for RootLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path),
            Self::Remote { hostname, path } => write!(f, "{}://{}{}", REMOTE_SCHEME, hostname, path),
        }
    }
}

impl std::str::FromStr for RootLocation {
    type Err = DebuggerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Source of attach targets and remote debug commands for a root
pub trait CommandService: Send + Sync {
    /// Stream of full attach-target snapshots
    fn observe_attach_targets(&self) -> ServiceStream<Vec<AttachTarget>>;

    /// Stream of commands sent by debuggees
    fn observe_remote_debug_commands(&self) -> ServiceStream<RemoteDebugCommand>;
}

/// Resolves the command service responsible for a root
pub trait ServiceResolver: Send + Sync {
    fn resolve_service(&self, root: &RootLocation) -> Result<Arc<dyn CommandService>>;
}

fn broadcast_stream<T: Clone + Send + 'static>(
    rx: broadcast::Receiver<T>,
    name: &'static str,
) -> ServiceStream<T> {
    stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(item) => return Some((Ok(item), rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("{} observer lagged, skipped {} events", name, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

/// In-process command service fed directly by the host
pub struct LocalCommandService {
    targets_tx: broadcast::Sender<Vec<AttachTarget>>,
    commands_tx: broadcast::Sender<RemoteDebugCommand>,
    latest: RwLock<Vec<AttachTarget>>,
}

impl LocalCommandService {
    pub fn new() -> Self {
        let (targets_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (commands_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            targets_tx,
            commands_tx,
            latest: RwLock::new(Vec::new()),
        }
    }

    /// Replace the current attach-target snapshot, returning how many observers saw it
    pub fn publish_targets(&self, targets: Vec<AttachTarget>) -> usize {
        debug!("Publishing {} attach targets", targets.len());
        match self.latest.write() {
            Ok(mut latest) => *latest = targets.clone(),
            Err(poisoned) => *poisoned.into_inner() = targets.clone(),
        }
        self.targets_tx.send(targets).unwrap_or(0)
    }

    /// Deliver a debug command, returning how many observers received it
    pub fn send_command(&self, command: RemoteDebugCommand) -> usize {
        debug!("Sending remote debug command: {:?}", command);
        self.commands_tx.send(command).unwrap_or(0)
    }

    pub fn current_targets(&self) -> Vec<AttachTarget> {
        match self.latest.read() {
            Ok(latest) => latest.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Default for LocalCommandService {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandService for LocalCommandService {
    fn observe_attach_targets(&self) -> ServiceStream<Vec<AttachTarget>> {
        // Subscribe before reading the snapshot so no publish falls in between
        let rx = self.targets_tx.subscribe();
        let current = self.current_targets();
        stream::once(async move { Ok(current) })
            .chain(broadcast_stream(rx, "attach targets"))
            .boxed()
    }

    fn observe_remote_debug_commands(&self) -> ServiceStream<RemoteDebugCommand> {
        broadcast_stream(self.commands_tx.subscribe(), "remote debug commands")
    }
}

type ResolverSlot = Mutex<Option<Arc<dyn ServiceResolver>>>;

fn lock_slot(slot: &ResolverSlot) -> MutexGuard<'_, Option<Arc<dyn ServiceResolver>>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Routes roots to command services, falling back to the local service
#[derive(Clone)]
pub struct ServiceRegistry {
    local: Arc<LocalCommandService>,
    remote: Arc<ResolverSlot>,
}

impl ServiceRegistry {
    pub fn new(local: Arc<LocalCommandService>) -> Self {
        Self {
            local,
            remote: Arc::new(Mutex::new(None)),
        }
    }

    pub fn local(&self) -> &Arc<LocalCommandService> {
        &self.local
    }

    /// Install the resolver for remote roots until the returned guard is dropped
    pub fn register(&self, resolver: Arc<dyn ServiceResolver>) -> Result<ServiceRegistration> {
        let mut slot = lock_slot(&self.remote);
        if slot.is_some() {
            return Err(DebuggerError::AlreadyRegistered);
        }
        *slot = Some(resolver);
        info!("Remote command service resolver registered");
        Ok(ServiceRegistration {
            slot: Arc::downgrade(&self.remote),
        })
    }

    pub fn has_remote(&self) -> bool {
        lock_slot(&self.remote).is_some()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new(Arc::new(LocalCommandService::new()))
    }
}

impl ServiceResolver for ServiceRegistry {
    fn resolve_service(&self, root: &RootLocation) -> Result<Arc<dyn CommandService>> {
        match root {
            RootLocation::Local(_) => Ok(self.local.clone() as Arc<dyn CommandService>),
            RootLocation::Remote { .. } => {
                let resolver = lock_slot(&self.remote).clone();
                match resolver {
                    Some(resolver) => resolver.resolve_service(root),
                    None => Err(DebuggerError::ServiceUnavailable(root.to_string())),
                }
            }
        }
    }
}

/// Keeps a remote resolver registered; dropping it unregisters
pub struct ServiceRegistration {
    slot: Weak<ResolverSlot>,
}

impl Drop for ServiceRegistration {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.upgrade() {
            lock_slot(&slot).take();
            info!("Remote command service resolver unregistered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedResolver(Arc<LocalCommandService>);

    impl ServiceResolver for FixedResolver {
        fn resolve_service(&self, _root: &RootLocation) -> Result<Arc<dyn CommandService>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_parse_local() {
        let root = RootLocation::parse("/home/me/proj").unwrap();
        assert_eq!(root, RootLocation::Local("/home/me/proj".to_string()));
        assert!(!root.is_remote());
        assert_eq!(root.kind(), "local");
    }

    #[test]
    fn test_parse_remote() {
        let root = RootLocation::parse("nuclide://devbox.example.com/srv/app").unwrap();
        assert_eq!(
            root,
            RootLocation::Remote {
                hostname: "devbox.example.com".to_string(),
                path: "/srv/app".to_string(),
            }
        );
        assert_eq!(root.kind(), "remote");
        assert_eq!(root.to_string(), "nuclide://devbox.example.com/srv/app");
    }

    #[test]
    fn test_parse_remote_without_path() {
        let root: RootLocation = "nuclide://devbox".parse().unwrap();
        assert_eq!(root.to_string(), "nuclide://devbox/");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(RootLocation::parse("").is_err());
        assert!(RootLocation::parse("nuclide:///srv").is_err());
        assert!(RootLocation::parse("ftp://host/x").is_err());
    }

    #[test]
    fn test_local_root_uses_local_service() {
        let registry = ServiceRegistry::default();
        let root = RootLocation::parse("/proj").unwrap();
        assert!(registry.resolve_service(&root).is_ok());
    }

    #[test]
    fn test_remote_root_needs_registration() {
        let registry = ServiceRegistry::default();
        let root = RootLocation::parse("nuclide://devbox/proj").unwrap();
        assert!(matches!(
            registry.resolve_service(&root),
            Err(DebuggerError::ServiceUnavailable(_))
        ));

        let registration = registry
            .register(Arc::new(FixedResolver(Arc::new(LocalCommandService::new()))))
            .unwrap();
        assert!(registry.has_remote());
        assert!(registry.resolve_service(&root).is_ok());

        drop(registration);
        assert!(!registry.has_remote());
        assert!(registry.resolve_service(&root).is_err());
    }

    #[test]
    fn test_double_registration_rejected() {
        let registry = ServiceRegistry::default();
        let resolver = Arc::new(FixedResolver(Arc::new(LocalCommandService::new())));
        let _guard = registry.register(resolver.clone()).unwrap();
        assert!(matches!(registry.register(resolver), Err(DebuggerError::AlreadyRegistered)));
    }

    #[tokio::test]
    async fn test_local_service_replays_latest_snapshot() {
        let service = LocalCommandService::new();
        service.publish_targets(vec![AttachTarget::new("/a", "/b", 1).with_id("web")]);

        let mut targets = service.observe_attach_targets();
        let first = targets.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);

        assert_eq!(service.publish_targets(vec![]), 1);
        let second = targets.next().await.unwrap().unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_local_service_commands() {
        let service = LocalCommandService::new();
        assert_eq!(
            service.send_command(RemoteDebugCommand::Attach {
                target: AttachTarget::new("/a", "/b", 1),
            }),
            0
        );

        let mut commands = service.observe_remote_debug_commands();
        let command = RemoteDebugCommand::Attach {
            target: AttachTarget::new("/a", "/b", 2),
        };
        assert_eq!(service.send_command(command.clone()), 1);
        assert_eq!(commands.next().await.unwrap().unwrap(), command);
    }
}
