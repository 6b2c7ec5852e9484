use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapters::{EngineRegistrationEvent, SipEngine};
use crate::config::CredentialPersistence;
use crate::credentials::CredentialStore;
use crate::errors::RegistrationError;
use crate::events::{EventBus, EventStream, RegistrationStatusInfo};
use crate::liveness::{LivenessController, LivenessGuard, LivenessReason};
use crate::types::{Account, Credentials, RegistrationState, TransportKind};

/// Read-only, non-blocking view of the registration state
#[derive(Clone)]
pub struct RegistrationView {
    state: Arc<RwLock<RegistrationState>>,
}

impl RegistrationView {
    pub fn current(&self) -> RegistrationState {
        self.state.read().clone()
    }

    pub fn is_registered(&self) -> bool {
        *self.state.read() == RegistrationState::Registered
    }
}

struct ManagerState {
    account: Option<Account>,
    /// Credentials waiting for the first successful registration
    pending: Option<Credentials>,
    /// Held while a registration attempt is in flight
    attempt: Option<LivenessGuard>,
}

/// Owns the account's registration state machine.
///
/// # Example
///
/// ```rust,no_run
/// # use converse_core::registration::RegistrationManager;
/// # use converse_core::types::Credentials;
/// # async fn example(manager: RegistrationManager) -> Result<(), Box<dyn std::error::Error>> {
/// let mut status = manager.subscribe();
/// manager.login(Credentials::new("alice", "secret", "example.com")).await?;
///
/// while let Some(change) = status.recv().await {
///     println!("registration: {} -> {}", change.previous, change.state);
/// }
/// # Ok(())
/// # }
/// ```
pub struct RegistrationManager {
    engine: Arc<dyn SipEngine>,
    liveness: LivenessController,
    credentials: Arc<dyn CredentialStore>,
    persistence: CredentialPersistence,
    transport: TransportKind,
    state: Arc<RwLock<RegistrationState>>,
    inner: Mutex<ManagerState>,
    events: EventBus<RegistrationStatusInfo>,
}

impl RegistrationManager {
    pub fn new(
        engine: Arc<dyn SipEngine>,
        liveness: LivenessController,
        credentials: Arc<dyn CredentialStore>,
        persistence: CredentialPersistence,
        transport: TransportKind,
    ) -> Self {
        Self {
            engine,
            liveness,
            credentials,
            persistence,
            transport,
            state: Arc::new(RwLock::new(RegistrationState::LoggedOut)),
            inner: Mutex::new(ManagerState {
                account: None,
                pending: None,
                attempt: None,
            }),
            events: EventBus::new(),
        }
    }

    pub fn view(&self) -> RegistrationView {
        RegistrationView {
            state: self.state.clone(),
        }
    }

    pub fn state(&self) -> RegistrationState {
        self.state.read().clone()
    }

    pub fn account(&self) -> Option<Account> {
        self.inner.lock().account.clone()
    }

    /// Every registration state change from now on, in order
    pub fn subscribe(&self) -> EventStream<RegistrationStatusInfo> {
        self.events.subscribe()
    }

    /// Start registering an account.
    ///
    /// Moves to `Registering` immediately. An engine refusal moves to
    /// `Failed` and is returned; nothing is retried here.
    pub async fn login(&self, credentials: Credentials) -> Result<(), RegistrationError> {
        for (field, value) in [
            ("username", &credentials.username),
            ("password", &credentials.password),
            ("domain", &credentials.domain),
        ] {
            if value.trim().is_empty() {
                return Err(RegistrationError::InvalidCredentials { field });
            }
        }

        let account = Account::new(&credentials, self.transport);
        info!("Logging in {} over {}", account.identity(), account.transport);

        {
            let mut inner = self.inner.lock();
            if let Some(previous) = inner.account.replace(account.clone()) {
                debug!("Replacing account {}", previous.identity());
            }
            inner.pending = match self.persistence {
                CredentialPersistence::OnSuccess => Some(credentials.clone()),
                CredentialPersistence::Always => None,
            };
        }

        if self.persistence == CredentialPersistence::Always {
            self.persist(&credentials);
        }

        self.transition(RegistrationState::Registering);

        if let Err(e) = self.engine.login(&account, &credentials).await {
            let err = RegistrationError::from(e);
            warn!("Login of {} failed: {}", account.identity(), err);
            self.transition(RegistrationState::Failed(err.to_string()));
            return Err(err);
        }
        Ok(())
    }

    /// Log out. Always ends in `LoggedOut`, even if the engine complains.
    pub async fn logout(&self) -> Result<(), RegistrationError> {
        let account = {
            let mut inner = self.inner.lock();
            inner.pending = None;
            inner.account.take()
        };

        let result = match &account {
            Some(account) => {
                info!("Logging out {}", account.identity());
                self.engine.logout().await.map_err(RegistrationError::from)
            }
            None => Ok(()),
        };
        if let Err(e) = &result {
            warn!("Engine logout failed: {}", e);
        }

        self.transition(RegistrationState::LoggedOut);
        result
    }

    /// Remove persisted credentials
    pub fn forget_credentials(&self) -> Result<(), crate::errors::CredentialError> {
        info!("Clearing stored credentials");
        self.credentials.clear()
    }

    /// Apply an engine registration event
    pub fn handle_engine_event(&self, event: EngineRegistrationEvent) {
        let next = match &event {
            EngineRegistrationEvent::Progress => RegistrationState::Registering,
            EngineRegistrationEvent::Ok => RegistrationState::Registered,
            EngineRegistrationEvent::Failed { reason } => RegistrationState::Failed(reason.clone()),
            EngineRegistrationEvent::Retrying { reason } => {
                debug!("Engine retrying registration: {}", reason);
                RegistrationState::Retrying
            }
            EngineRegistrationEvent::Cleared => RegistrationState::LoggedOut,
        };

        let to_persist = {
            let mut inner = self.inner.lock();
            if inner.account.is_none() {
                debug!("No account, ignoring {:?}", event);
                return;
            }
            self.apply_locked(&mut inner, next.clone());
            if next == RegistrationState::Registered {
                inner.pending.take()
            } else {
                None
            }
        };

        if let Some(credentials) = to_persist {
            self.persist(&credentials);
        }
    }

    /// Consume engine registration events until the channel closes
    pub fn spawn_event_loop(
        self: &Arc<Self>,
        mut rx: mpsc::Receiver<EngineRegistrationEvent>,
    ) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                manager.handle_engine_event(event);
            }
            debug!("Registration event loop stopped");
        })
    }

    fn transition(&self, next: RegistrationState) {
        let mut inner = self.inner.lock();
        self.apply_locked(&mut inner, next);
    }

    /// Change state and publish; caller holds `inner` so changes stay ordered
    fn apply_locked(&self, inner: &mut ManagerState, next: RegistrationState) -> bool {
        let previous = {
            let mut state = self.state.write();
            if *state == next {
                return false;
            }
            std::mem::replace(&mut *state, next.clone())
        };

        if let Some(account) = inner.account.as_mut() {
            account.state = next.clone();
        }

        if next.is_attempt() {
            if inner.attempt.is_none() {
                inner.attempt = Some(self.liveness.acquire(LivenessReason::Registration));
            }
        } else {
            inner.attempt = None;
        }

        info!("Registration {} -> {}", previous, next);
        self.events.publish(RegistrationStatusInfo {
            account: inner.account.as_ref().map(|a| a.identity()),
            state: next,
            previous,
            timestamp: Utc::now(),
        });
        true
    }

    fn persist(&self, credentials: &Credentials) {
        match self.credentials.save(credentials) {
            Ok(()) => debug!("Persisted credentials for {}@{}", credentials.username, credentials.domain),
            Err(e) => warn!("Failed to persist credentials: {}", e),
        }
    }
}
