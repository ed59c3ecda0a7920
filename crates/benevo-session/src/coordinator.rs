//! The session coordinator: the one owner of the in-memory session.
//!
//! Everything that changes the session goes through here: restore at
//! startup, login, refresh, checkpoint and logout. Other components read
//! [`SessionSnapshot`]s or call these methods; none of them hold the
//! record.
//!
//! # Locking
//!
//! - `inner` guards the record and phase. Never held across a network call.
//! - `persist_lock` serializes writes to storage. A save reads the record
//!   *after* taking it, so whichever save runs last writes the newest data.
//!   Lock order is always `persist_lock` then `inner`.
//! - The generation counter is bumped (under `inner`) whenever a session
//!   ends or is replaced. Network results carry the generation they
//!   started with and are dropped if it moved. Ending a session because
//!   of such a result re-checks the generation under both locks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};

use benevo_storage::{ConnectionCookie, SaveOutcome, StorageTierManager};
use benevo_timer::{RefreshTrigger, ScheduledDelay, TokenExpiryScheduler, TriggerSource};
use benevo_types::{Clock, ProfileCache, Role, SessionRecord, Timestamp, UserProfile};
use tokio::sync::{broadcast, watch, Mutex, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::{
    ForcedLogoutReason, IdentityProvider, ProfileProvider, RefreshOutcome, Restoration,
    SessionConfig, SessionError, SessionEvent, SessionPhase, SessionSnapshot, TokenGrant,
};

struct Inner {
    record: Option<SessionRecord>,
    phase: SessionPhase,
    restoration: Restoration,
    degraded: bool,
}

/// Owns the session record and drives its lifecycle.
///
/// ```text
///            restore()                 refresh()
/// Absent ──────────────→ Restoring ──→ Valid ⇄ Refreshing
///   ↑                                    │          │
///   └──────── logout() / rejection ──────┴──────────┘
/// ```
///
/// A typical app builds one coordinator at startup, calls
/// [`start`](Self::start) and [`restore`](Self::restore), then mostly
/// watches it. Refreshes happen on their own: the token's expiry arms a
/// timer, and the visibility monitor asks for one after a long absence.
/// Whatever asks, at most one exchange with the identity provider runs at
/// a time. Late callers return [`RefreshOutcome::Skipped`] instead of
/// queueing.
///
/// A failed refresh is sorted into one of two kinds. Timeouts and server
/// errors keep the session and retry later, with the snapshot marked
/// `degraded`. A refresh token the provider no longer accepts ends the
/// session, clears every storage tier and emits
/// [`SessionEvent::ForcedLogout`].
///
/// # Example
///
/// ```rust,ignore
/// let coordinator = SessionCoordinator::new(
///     SessionConfig::default(),
///     MyIdentity::new(),
///     MyProfiles::new(),
///     storage,
///     Arc::new(ConnectionCookie::in_memory()),
///     Arc::new(SystemClock),
/// );
/// coordinator.start();
/// let snapshot = coordinator.restore().await;
/// if !snapshot.connected {
///     coordinator.login("ada@example.org", "correct horse").await?;
/// }
///
/// let mut events = coordinator.events();
/// while let Ok(event) = events.recv().await {
///     if let SessionEvent::ForcedLogout { reason } = event {
///         println!("signed out: {reason}");
///     }
/// }
/// ```
///
/// Built once at startup and shared as `Arc<SessionCoordinator<_, _>>`.
/// Timer callbacks and the checkpoint task hold only a `Weak` reference,
/// so dropping the last `Arc` tears everything down.
pub struct SessionCoordinator<I, P> {
    this: Weak<Self>,
    config: SessionConfig,
    identity: I,
    profiles: P,
    storage: StorageTierManager,
    cookie: Arc<ConnectionCookie>,
    scheduler: TokenExpiryScheduler,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
    persist_lock: Mutex<()>,
    generation: AtomicU64,
    restored: OnceCell<()>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    events_tx: broadcast::Sender<SessionEvent>,
    checkpoint_task: StdMutex<Option<JoinHandle<()>>>,
}

impl<I: IdentityProvider, P: ProfileProvider> SessionCoordinator<I, P> {
    pub fn new(
        config: SessionConfig,
        identity: I,
        profiles: P,
        storage: StorageTierManager,
        cookie: Arc<ConnectionCookie>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let config = config.validated();
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        let (events_tx, _) = broadcast::channel(config.event_capacity);
        let scheduler = TokenExpiryScheduler::new(config.scheduler.clone());

        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            config,
            identity,
            profiles,
            storage,
            cookie,
            scheduler,
            clock,
            inner: Mutex::new(Inner {
                record: None,
                phase: SessionPhase::Absent,
                restoration: Restoration::NotStarted,
                degraded: false,
            }),
            persist_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            restored: OnceCell::new(),
            snapshot_tx,
            events_tx,
            checkpoint_task: StdMutex::new(None),
        })
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    /// The latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// A receiver that is notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Lifecycle events from now on.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    /// A copy of the in-memory record.
    pub async fn current_record(&self) -> Option<SessionRecord> {
        self.inner.lock().await.record.clone()
    }

    pub fn cookie(&self) -> &ConnectionCookie {
        &self.cookie
    }

    pub fn scheduler(&self) -> &TokenExpiryScheduler {
        &self.scheduler
    }

    pub fn storage(&self) -> &StorageTierManager {
        &self.storage
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Starts the checkpoint task and (re)enables the refresh scheduler.
    ///
    /// Must be called inside a tokio runtime. Calling it twice is harmless.
    pub fn start(&self) {
        self.scheduler.start();

        let mut slot = self
            .checkpoint_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let weak = self.this.clone();
        let period = self.config.checkpoint_interval;
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                coordinator.checkpoint().await;
            }
        }));
        tracing::info!(checkpoint_secs = period.as_secs(), "session coordinator started");
    }

    /// Stops the checkpoint task and the refresh timer. The session itself
    /// stays in memory and in storage.
    pub fn stop(&self) {
        if let Some(task) = self
            .checkpoint_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        self.scheduler.stop();
        tracing::info!("session coordinator stopped");
    }

    // -----------------------------------------------------------------------
    // Restore
    // -----------------------------------------------------------------------

    /// Loads the stored session, once per process.
    ///
    /// Concurrent and later calls wait for the first one and then return
    /// the current snapshot.
    pub async fn restore(&self) -> SessionSnapshot {
        self.restored.get_or_init(|| self.run_restore()).await;
        self.snapshot()
    }

    async fn run_restore(&self) {
        let generation = {
            let mut inner = self.inner.lock().await;
            if inner.record.is_some() {
                inner.restoration = Restoration::Done;
                self.publish(&inner);
                tracing::debug!("session already established, nothing to restore");
                return;
            }
            inner.phase = SessionPhase::Restoring;
            inner.restoration = Restoration::InFlight;
            self.publish(&inner);
            self.generation.load(Ordering::SeqCst)
        };

        let loaded = self.storage.load().await;
        let now = self.clock.now();

        let mut inner = self.inner.lock().await;
        inner.restoration = Restoration::Done;

        if inner.record.is_some() || self.generation.load(Ordering::SeqCst) != generation {
            // A login or logout overtook the restore.
            if inner.record.is_none() {
                inner.phase = SessionPhase::Absent;
            }
            self.publish(&inner);
            tracing::debug!("restore overtaken by a newer session change");
            return;
        }

        match loaded {
            Some(record) if record.is_usable(now) => {
                let user_id = record.user_id.clone();
                let access_token = record.access_token.clone();
                let role = record.role();
                self.cookie.set(record.is_connected);
                inner.record = Some(record);
                inner.phase = SessionPhase::Valid;
                inner.degraded = false;
                self.publish(&inner);
                drop(inner);

                let next = self.arm_for(&access_token, role);
                tracing::info!(%user_id, next_refresh_secs = next.delay.as_secs(), "session restored");
                self.emit(SessionEvent::Restored { user_id });
            }
            Some(record) => {
                inner.phase = SessionPhase::Absent;
                self.publish(&inner);
                drop(inner);

                tracing::info!(expired_at = %record.expires_at(), "stored session expired");
                // Skipped if a login got in first; its save already
                // replaced the expired copy.
                self.end_session(Some(generation)).await;
            }
            None => {
                inner.phase = SessionPhase::Absent;
                self.cookie.set(false);
                self.publish(&inner);
                drop(inner);

                tracing::info!("no stored session");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Login
    // -----------------------------------------------------------------------

    /// Logs in with credentials and establishes a new session.
    ///
    /// # Errors
    /// [`SessionError::Identity`] if the provider refuses or can't be reached.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<SessionSnapshot, SessionError> {
        let grant = self
            .identity
            .exchange_credentials(identifier, secret)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "login failed"))?;
        self.adopt_tokens(grant).await
    }

    /// Establishes a session from tokens obtained elsewhere (registration,
    /// an external token exchange). Replaces any current session.
    ///
    /// A profile that can't be fetched now is fetched later by
    /// [`fetch_user`](Self::fetch_user).
    ///
    /// # Errors
    /// [`SessionError::Superseded`] if a logout ran while the profile was
    /// being fetched.
    pub async fn adopt_tokens(&self, grant: TokenGrant) -> Result<SessionSnapshot, SessionError> {
        let generation = {
            let _inner = self.inner.lock().await;
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        let mut record = SessionRecord::new(
            grant.access_token,
            grant.refresh_token,
            grant.user_id,
            self.clock.now(),
            self.config.session_ttl,
        );
        match self.profiles.fetch_current_user(&record.access_token).await {
            Ok(profile) => {
                record.cached_user_profile = Some(ProfileCache::fetched(profile, self.clock.now()));
            }
            Err(e) => tracing::warn!(error = %e, "profile unavailable at login, will fetch later"),
        }

        let user_id = record.user_id.clone();
        let access_token = record.access_token.clone();
        let role = record.role();
        {
            let mut inner = self.inner.lock().await;
            if self.generation.load(Ordering::SeqCst) != generation {
                return Err(SessionError::Superseded);
            }
            inner.record = Some(record);
            inner.phase = SessionPhase::Valid;
            inner.degraded = false;
            self.publish(&inner);
        }

        self.cookie.set(true);
        let saved = self.persist().await;
        self.arm_for(&access_token, role);
        tracing::info!(%user_id, ?role, ?saved, "logged in");
        self.emit(SessionEvent::LoggedIn { user_id });
        Ok(self.snapshot())
    }

    // -----------------------------------------------------------------------
    // Refresh
    // -----------------------------------------------------------------------

    /// Exchanges the refresh token for a new access token.
    ///
    /// Single-flight: while one refresh runs, other calls return
    /// [`RefreshOutcome::Skipped`] immediately (after making sure a next
    /// check is scheduled).
    pub async fn refresh(&self, trigger: TriggerSource) -> RefreshOutcome {
        let Some(_permit) = self.scheduler.guard().try_begin() else {
            tracing::debug!(%trigger, "refresh already in flight, skipping");
            self.ensure_armed().await;
            return RefreshOutcome::Skipped;
        };

        let (generation, refresh_token) = {
            let mut inner = self.inner.lock().await;
            let Some(record) = inner.record.as_ref() else {
                tracing::debug!(%trigger, "no session to refresh");
                return RefreshOutcome::NoSession;
            };
            let refresh_token = record.refresh_token.clone();
            inner.phase = SessionPhase::Refreshing;
            self.publish(&inner);
            (self.generation.load(Ordering::SeqCst), refresh_token)
        };

        tracing::debug!(%trigger, "refreshing session");
        let result = self.identity.exchange_refresh_token(&refresh_token).await;

        let mut inner = self.inner.lock().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(%trigger, "refresh result discarded, session changed meanwhile");
            return RefreshOutcome::Discarded;
        }

        match result {
            Ok(token) => {
                let now = self.clock.now();
                let Some(record) = inner.record.as_mut() else {
                    return RefreshOutcome::Discarded;
                };
                record.access_token = token.access_token;
                if let Some(rotated) = token.refresh_token {
                    record.refresh_token = rotated;
                }
                record.touch(now, self.config.session_ttl);
                record.is_connected = true;
                let access_token = record.access_token.clone();
                let role = record.role();
                inner.phase = SessionPhase::Valid;
                inner.degraded = false;
                self.publish(&inner);
                drop(inner);

                self.cookie.set(true);
                self.persist().await;
                let next = self.arm_for(&access_token, role);
                tracing::info!(%trigger, next_refresh_secs = next.delay.as_secs(), "session refreshed");
                self.emit(SessionEvent::Refreshed { trigger });
                RefreshOutcome::Refreshed
            }
            Err(e) if e.is_recoverable() => {
                let role = inner.record.as_ref().and_then(SessionRecord::role);
                inner.phase = SessionPhase::Valid;
                inner.degraded = true;
                self.publish(&inner);
                drop(inner);

                let retry = self.scheduler.retry_delay(role);
                self.arm(retry);
                tracing::warn!(%trigger, error = %e, retry_in_secs = retry.delay.as_secs(), "refresh failed, keeping session");
                self.emit(SessionEvent::RefreshDeferred {
                    trigger,
                    retry_in: retry.delay,
                });
                RefreshOutcome::Deferred
            }
            Err(e) => {
                drop(inner);
                // Lock order forbids taking `persist_lock` while holding
                // `inner`, so the generation is checked again inside.
                if !self.end_session(Some(generation)).await {
                    tracing::debug!(%trigger, "refresh rejection discarded, session changed meanwhile");
                    return RefreshOutcome::Discarded;
                }
                tracing::warn!(%trigger, error = %e, "refresh rejected, session ended");
                self.emit(SessionEvent::ForcedLogout {
                    reason: ForcedLogoutReason::RefreshRejected,
                });
                RefreshOutcome::ForcedLogout
            }
        }
    }

    /// Arms a check from the current token unless one is already pending.
    async fn ensure_armed(&self) {
        if self.scheduler.is_armed() {
            return;
        }
        let current = self
            .inner
            .lock()
            .await
            .record
            .as_ref()
            .map(|record| (record.access_token.clone(), record.role()));
        if let Some((access_token, role)) = current {
            self.arm_for(&access_token, role);
        }
    }

    fn arm_for(&self, access_token: &str, role: Option<Role>) -> ScheduledDelay {
        let scheduled = self.scheduler.delay_for(access_token, role, self.clock.now());
        self.arm(scheduled);
        scheduled
    }

    fn arm(&self, scheduled: ScheduledDelay) {
        let weak = self.this.clone();
        let armed = self.scheduler.arm(scheduled.delay, move || async move {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.refresh(TriggerSource::Timer).await;
            }
        });
        if armed {
            tracing::debug!(
                delay_secs = scheduled.delay.as_secs(),
                source = ?scheduled.source,
                "next refresh scheduled"
            );
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Marks activity and persists the record, if the session is live and
    /// connected. Returns `None` when there was nothing to save.
    pub async fn checkpoint(&self) -> Option<SaveOutcome> {
        {
            let mut inner = self.inner.lock().await;
            if inner.phase != SessionPhase::Valid {
                return None;
            }
            let now = self.clock.now();
            match inner.record.as_mut() {
                Some(record) if record.is_connected => record.touch(now, self.config.session_ttl),
                _ => return None,
            }
        }
        let outcome = self.persist().await;
        tracing::trace!(?outcome, "checkpoint");
        outcome
    }

    async fn persist(&self) -> Option<SaveOutcome> {
        let _persist = self.persist_lock.lock().await;
        let record = self.inner.lock().await.record.clone()?;
        Some(self.storage.save(&record).await)
    }

    // -----------------------------------------------------------------------
    // Profile
    // -----------------------------------------------------------------------

    /// The current user's profile.
    ///
    /// Served from cache while it is valid or carries local edits newer
    /// than the last fetch. Otherwise fetched, cached and persisted. A
    /// failed fetch falls back to a stale cache when there is one.
    ///
    /// # Errors
    /// [`SessionError::NoSession`], or [`SessionError::ProfileFetch`] when
    /// the fetch fails with nothing cached.
    pub async fn fetch_user(&self) -> Result<UserProfile, SessionError> {
        let now = self.clock.now();
        let (generation, access_token, cached) = {
            let inner = self.inner.lock().await;
            let record = inner.record.as_ref().ok_or(SessionError::NoSession)?;
            (
                self.generation.load(Ordering::SeqCst),
                record.access_token.clone(),
                record.cached_user_profile.clone(),
            )
        };

        if let Some(cache) = cached
            .as_ref()
            .filter(|cache| cache.can_serve(now, self.config.profile_cache_ttl))
        {
            tracing::trace!("serving cached profile");
            return Ok(cache.data.clone());
        }

        match self.profiles.fetch_current_user(&access_token).await {
            Ok(profile) => {
                {
                    let mut inner = self.inner.lock().await;
                    if self.generation.load(Ordering::SeqCst) != generation {
                        return Err(SessionError::Superseded);
                    }
                    if let Some(record) = inner.record.as_mut() {
                        record.cached_user_profile =
                            Some(ProfileCache::fetched(profile.clone(), self.clock.now()));
                    }
                    self.publish(&inner);
                }
                self.persist().await;
                tracing::debug!(user_id = %profile.id, "profile fetched");
                Ok(profile)
            }
            Err(e) => match cached {
                Some(cache) => {
                    tracing::warn!(error = %e, "profile fetch failed, serving stale cache");
                    Ok(cache.data)
                }
                None => {
                    tracing::warn!(error = %e, "profile fetch failed with nothing cached");
                    Err(SessionError::ProfileFetch(e))
                }
            },
        }
    }

    /// Applies a local profile edit (e.g. after completing registration)
    /// and persists it. The edit wins over the cache TTL until the next
    /// successful fetch.
    ///
    /// # Errors
    /// [`SessionError::NoSession`].
    pub async fn update_profile_locally(&self, profile: UserProfile) -> Result<(), SessionError> {
        let now = self.clock.now();
        {
            let mut inner = self.inner.lock().await;
            let record = inner.record.as_mut().ok_or(SessionError::NoSession)?;
            match record.cached_user_profile.as_mut() {
                Some(cache) => cache.apply_local_update(profile, now),
                None => {
                    record.cached_user_profile = Some(ProfileCache {
                        data: profile,
                        fetched_at: Timestamp::EPOCH,
                        updated_at: now,
                    });
                }
            }
            self.publish(&inner);
        }
        self.persist().await;
        tracing::debug!("profile updated locally");
        Ok(())
    }

    /// Asks the identity provider whether the access token still works.
    ///
    /// Best effort: a transient failure counts as valid. No session counts
    /// as invalid.
    pub async fn verify_token(&self) -> bool {
        let access_token = self
            .inner
            .lock()
            .await
            .record
            .as_ref()
            .map(|record| record.access_token.clone());
        let Some(access_token) = access_token else {
            return false;
        };

        match self.identity.is_token_still_valid(&access_token).await {
            Ok(valid) => valid,
            Err(e) if e.is_terminal() => false,
            Err(e) => {
                tracing::warn!(error = %e, "token check failed, assuming valid");
                true
            }
        }
    }

    // -----------------------------------------------------------------------
    // Ending the session
    // -----------------------------------------------------------------------

    /// Drops the session everywhere: memory, storage, cookie and timer.
    /// In-flight network results for it will be discarded.
    pub async fn clear(&self) {
        self.end_session(None).await;
    }

    /// Ends the session if it is still at generation `expected` (or
    /// unconditionally for `None`). Returns whether it did.
    ///
    /// `persist_lock` is held throughout, so a session adopted right after
    /// can't have its first save wiped by this clear. The timer and cookie
    /// are reset under `inner` so a newer session's arm and cookie write
    /// always land after them.
    async fn end_session(&self, expected: Option<u64>) -> bool {
        let _persist = self.persist_lock.lock().await;
        {
            let mut inner = self.inner.lock().await;
            let current = self.generation.load(Ordering::SeqCst);
            if expected.is_some_and(|generation| generation != current) {
                return false;
            }
            self.generation.fetch_add(1, Ordering::SeqCst);
            inner.record = None;
            inner.phase = SessionPhase::Absent;
            inner.degraded = false;
            self.publish(&inner);
            self.scheduler.disarm();
            self.cookie.set(false);
        }
        self.storage.clear().await;
        true
    }

    /// User-initiated logout.
    pub async fn logout(&self) {
        self.clear().await;
        tracing::info!("logged out");
        self.emit(SessionEvent::LoggedOut);
    }

    /// Ends the session because it can no longer be trusted.
    pub async fn force_logout(&self, reason: ForcedLogoutReason) {
        self.clear().await;
        tracing::warn!(%reason, "session ended");
        self.emit(SessionEvent::ForcedLogout { reason });
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn publish(&self, inner: &Inner) {
        self.snapshot_tx.send_replace(SessionSnapshot::capture(
            inner.phase,
            inner.restoration,
            inner.record.as_ref(),
            inner.degraded,
            self.generation.load(Ordering::SeqCst),
        ));
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }
}

impl<I: IdentityProvider, P: ProfileProvider> RefreshTrigger for SessionCoordinator<I, P> {
    async fn request_refresh(&self, source: TriggerSource) {
        self.refresh(source).await;
    }
}

impl<I, P> Drop for SessionCoordinator<I, P> {
    fn drop(&mut self) {
        if let Some(task) = self
            .checkpoint_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}
