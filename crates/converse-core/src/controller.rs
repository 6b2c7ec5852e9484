//! Process controller
//!
//! [`Controller`] is the explicit context object the rest of the crate hangs
//! off: it owns the adapter handles, the liveness controller, the
//! registration manager and the call bridge, and it runs the process-start
//! and teardown sequences.
//!
//! # Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use converse_core::prelude::*;
//! # async fn example(
//! #     engine: Arc<dyn SipEngine>,
//! #     telephony: Arc<dyn Telephony>,
//! #     host: Arc<dyn ForegroundHost>,
//! # ) -> converse_core::Result<()> {
//! let config = ConverseConfig::load("converse.toml")?;
//! let credentials = Arc::new(FileCredentialStore::new("credentials.json"));
//!
//! let (controller, sinks) = Controller::new(config, engine, telephony, host, credentials)?;
//! // hand `sinks.engine` and `sinks.telephony` to the adapters here
//! controller.start().await?;
//!
//! let call = controller.bridge().dial("5550100").await?;
//! controller.bridge().hangup(&call.session_id).await?;
//!
//! controller.shutdown().await;
//! # Ok(())
//! # }
//! ```

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapters::{EventReceivers, EventRouter, EventSinks, SipEngine, Telephony};
use crate::bridge::CallBridge;
use crate::config::ConverseConfig;
use crate::credentials::CredentialStore;
use crate::errors::{ConverseError, Result};
use crate::liveness::{ForegroundHost, LivenessController};
use crate::registration::RegistrationManager;
use crate::types::PhoneAccountRegistration;

/// Process-lifetime owner of the engine, telephony, registration and bridge
pub struct Controller {
    config: ConverseConfig,
    telephony: Arc<dyn Telephony>,
    credentials: Arc<dyn CredentialStore>,
    liveness: LivenessController,
    registration: Arc<RegistrationManager>,
    bridge: CallBridge,
    receivers: Mutex<Option<EventReceivers>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    phone_account: RwLock<Option<PhoneAccountRegistration>>,
    is_running: RwLock<bool>,
}

impl Controller {
    /// Build the context. The returned sinks are what the adapters report into.
    pub fn new(
        config: ConverseConfig,
        engine: Arc<dyn SipEngine>,
        telephony: Arc<dyn Telephony>,
        host: Arc<dyn ForegroundHost>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<(Self, EventSinks)> {
        config.validate()?;

        let mut router = EventRouter::new();
        let sinks = router.sinks();
        let receivers = router
            .take_receivers()
            .ok_or_else(|| ConverseError::controller("event receivers already taken"))?;

        let liveness = LivenessController::new(host);
        let registration = Arc::new(RegistrationManager::new(
            engine.clone(),
            liveness.clone(),
            credentials.clone(),
            config.credential_persistence,
            config.default_transport,
        ));
        let bridge = CallBridge::new(
            &config,
            engine,
            telephony.clone(),
            liveness.clone(),
            registration.view(),
        );

        let controller = Self {
            config,
            telephony,
            credentials,
            liveness,
            registration,
            bridge,
            receivers: Mutex::new(Some(receivers)),
            tasks: Mutex::new(Vec::new()),
            phone_account: RwLock::new(None),
            is_running: RwLock::new(false),
        };
        Ok((controller, sinks))
    }

    /// Register the phone account, start the event loops and log in with
    /// stored credentials if there are any
    pub async fn start(&self) -> Result<()> {
        let mut running = self.is_running.write().await;
        if *running {
            return Err(ConverseError::controller("controller already started"));
        }

        let account = &self.config.phone_account;
        let handle = account.handle();
        let enabled = self.telephony.register_account(&handle, &account.label).await?;
        info!(
            "Registered phone account {} ({})",
            handle,
            if enabled { "enabled" } else { "disabled" }
        );
        *self.phone_account.write().await = Some(PhoneAccountRegistration {
            handle,
            label: account.label.clone(),
            enabled,
        });

        let receivers = self
            .receivers
            .lock()
            .take()
            .ok_or_else(|| ConverseError::controller("controller cannot be restarted"))?;
        {
            let mut tasks = self.tasks.lock();
            tasks.push(self.bridge.spawn_event_loop(receivers.bridge));
            tasks.push(self.registration.spawn_event_loop(receivers.registration));
        }
        *running = true;
        drop(running);

        info!("Converse controller started");
        self.login_from_store().await;
        Ok(())
    }

    /// Log in with persisted credentials. Returns whether an attempt was made.
    ///
    /// A missing username, password or domain leaves the account logged out,
    /// as does an unreadable store. A failed login is reported through the
    /// registration state, not here.
    pub async fn login_from_store(&self) -> bool {
        let stored = match self.credentials.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Could not read stored credentials, staying logged out: {}", e);
                return false;
            }
        };
        let Some(credentials) = stored.complete() else {
            info!("No complete stored credentials, staying logged out");
            return false;
        };

        if let Err(e) = self.registration.login(credentials).await {
            warn!("Login with stored credentials failed: {}", e);
        }
        true
    }

    /// Wind down live calls, log out and stop the event loops
    pub async fn shutdown(&self) {
        let mut running = self.is_running.write().await;
        info!("Shutting down converse controller");

        self.bridge.shutdown().await;
        if let Err(e) = self.registration.logout().await {
            warn!("Logout during shutdown failed: {}", e);
        }

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        *running = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn config(&self) -> &ConverseConfig {
        &self.config
    }

    pub fn bridge(&self) -> &CallBridge {
        &self.bridge
    }

    pub fn registration(&self) -> &Arc<RegistrationManager> {
        &self.registration
    }

    pub fn liveness(&self) -> &LivenessController {
        &self.liveness
    }

    /// The phone account as registered by [`Controller::start`]
    pub async fn phone_account(&self) -> Option<PhoneAccountRegistration> {
        self.phone_account.read().await.clone()
    }
}
