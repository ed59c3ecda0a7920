//! `Client` builder and bootstrap.
//!
//! Ties the layers together: storage tiers → session coordinator →
//! refresh scheduler + visibility monitor → navigation guard.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use benevo_route::{NavigationGuard, RouteDecision, RouteTable};
use benevo_session::{
    IdentityProvider, ProfileProvider, SessionConfig, SessionCoordinator, SessionSnapshot,
    TokenGrant,
};
use benevo_storage::{
    AtomicFileTier, ConnectionCookie, DocumentFileTier, MemoryTier, StorageTier,
    StorageTierManager,
};
use benevo_timer::{VisibilityConfig, VisibilityEvent, VisibilityHandle, VisibilityMonitor};
use benevo_types::{Clock, SystemClock, UserProfile};

use crate::BenevoError;

/// Builder for a [`Client`].
///
/// # Example
///
/// ```rust,ignore
/// use benevo::prelude::*;
///
/// let client = Client::builder()
///     .storage_dir(data_dir.join("benevo"))
///     .build(my_identity, my_profiles)?;
/// client.start().await;
/// let decision = client.navigate("/volunteer").await;
/// ```
pub struct ClientBuilder {
    storage_dir: Option<PathBuf>,
    session: SessionConfig,
    visibility: VisibilityConfig,
    routes: RouteTable,
    clock: Arc<dyn Clock>,
}

impl ClientBuilder {
    /// Creates a builder with default settings and in-memory storage.
    pub fn new() -> Self {
        Self {
            storage_dir: None,
            session: SessionConfig::default(),
            visibility: VisibilityConfig::default(),
            routes: RouteTable::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Persists the session under `dir` (atomic files, then a JSON
    /// document, then memory). Without it the session is memory-only.
    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session = config;
        self
    }

    pub fn visibility_config(mut self, config: VisibilityConfig) -> Self {
        self.visibility = config;
        self
    }

    pub fn routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    /// Replaces the wall clock (tests and demos use a `ManualClock`).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the client. Nothing runs until [`Client::start`].
    ///
    /// # Errors
    /// [`BenevoError::Route`] if the route table is inconsistent.
    pub fn build<I: IdentityProvider, P: ProfileProvider>(
        self,
        identity: I,
        profiles: P,
    ) -> Result<Client<I, P>, BenevoError> {
        self.routes.validate()?;

        let (tiers, cookie): (Vec<Box<dyn StorageTier>>, ConnectionCookie) = match &self.storage_dir {
            Some(dir) => (
                vec![
                    Box::new(AtomicFileTier::new(dir.join("session"))),
                    Box::new(DocumentFileTier::new(dir.join("session-store.json"))),
                    Box::new(MemoryTier::new("memory")),
                ],
                ConnectionCookie::persistent(dir.join("connected")),
            ),
            None => (
                vec![Box::new(MemoryTier::new("memory"))],
                ConnectionCookie::in_memory(),
            ),
        };
        let storage = StorageTierManager::new(tiers, Arc::clone(&self.clock));
        tracing::debug!(tiers = ?storage.tier_names(), "storage chain ready");

        let coordinator = SessionCoordinator::new(
            self.session,
            identity,
            profiles,
            storage,
            Arc::new(cookie),
            Arc::clone(&self.clock),
        );
        let guard = NavigationGuard::new(Arc::clone(&coordinator), Arc::new(self.routes));

        Ok(Client {
            coordinator,
            guard,
            visibility_config: self.visibility,
            clock: self.clock,
            visibility: Mutex::new(None),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A wired-up Benevo session client.
pub struct Client<I, P> {
    coordinator: Arc<SessionCoordinator<I, P>>,
    guard: NavigationGuard<I, P>,
    visibility_config: VisibilityConfig,
    clock: Arc<dyn Clock>,
    visibility: Mutex<Option<VisibilityHandle>>,
}

impl<I: IdentityProvider, P: ProfileProvider> Client<I, P> {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Starts background work and restores the stored session.
    ///
    /// Spawns the checkpoint task and the visibility monitor, then waits
    /// for the restore to finish.
    pub async fn start(&self) -> SessionSnapshot {
        self.coordinator.start();
        {
            let mut slot = self.visibility.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                let monitor = VisibilityMonitor::new(self.visibility_config.clone(), self.clock.now());
                *slot = Some(monitor.start(Arc::clone(&self.coordinator), Arc::clone(&self.clock)));
            }
        }
        let snapshot = self.coordinator.restore().await;
        tracing::info!(phase = ?snapshot.phase, connected = snapshot.connected, "benevo client started");
        snapshot
    }

    /// Stops background work. The session stays stored.
    pub fn stop(&self) {
        if let Some(handle) = self
            .visibility
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.stop();
        }
        self.coordinator.stop();
        tracing::info!("benevo client stopped");
    }

    /// Reports a foreground/background transition. Returns `false` if the
    /// client isn't started.
    pub fn notify(&self, event: VisibilityEvent) -> bool {
        self.visibility
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| handle.notify(event))
    }

    /// Checks a navigation.
    pub async fn navigate(&self, path: &str) -> RouteDecision {
        self.guard.check(path).await
    }

    /// # Errors
    /// [`BenevoError::Session`] if the provider refuses.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<SessionSnapshot, BenevoError> {
        Ok(self.coordinator.login(identifier, secret).await?)
    }

    /// # Errors
    /// [`BenevoError::Session`] if a logout raced the adoption.
    pub async fn adopt_tokens(&self, grant: TokenGrant) -> Result<SessionSnapshot, BenevoError> {
        Ok(self.coordinator.adopt_tokens(grant).await?)
    }

    /// # Errors
    /// [`BenevoError::Session`] when there is no session or no profile.
    pub async fn current_user(&self) -> Result<UserProfile, BenevoError> {
        Ok(self.coordinator.fetch_user().await?)
    }

    pub async fn logout(&self) {
        self.coordinator.logout().await;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.coordinator.snapshot()
    }

    /// The coordinator, for anything the client doesn't wrap.
    pub fn session(&self) -> &Arc<SessionCoordinator<I, P>> {
        &self.coordinator
    }

    pub fn guard(&self) -> &NavigationGuard<I, P> {
        &self.guard
    }
}

impl<I, P> Drop for Client<I, P> {
    fn drop(&mut self) {
        if let Some(handle) = self
            .visibility
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.stop();
        }
    }
}
