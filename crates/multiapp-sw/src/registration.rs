//! Registration: the installing, waiting and active worker versions of one scope.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use multiapp_net::Request;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::clients::{ClientId, Clients};
use crate::lifetime::ExtendableEvent;
use crate::manager::{ActivateReport, CacheManager, FetchDisposition, InstallReport};
use crate::message::ControlMessage;
use crate::ServiceWorkerError;

#[derive(Default)]
struct Slots {
    installing: Option<CacheManager>,
    waiting: Option<CacheManager>,
    activating: Option<CacheManager>,
    active: Option<CacheManager>,
}

/// Tracks worker versions for one scope and routes host events to them.
///
/// A newly installed version waits while the active one still controls
/// pages, unless it asked to skip waiting. Only the active version answers
/// fetches, and it keeps answering them while its successor activates.
pub struct Registration {
    scope: Url,
    clients: Arc<Clients>,
    slots: Mutex<Slots>,
}

impl Registration {
    pub fn new(scope: Url, clients: Arc<Clients>) -> Self {
        Self {
            scope,
            clients,
            slots: Mutex::new(Slots::default()),
        }
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn clients(&self) -> &Arc<Clients> {
        &self.clients
    }

    pub fn installing(&self) -> Option<CacheManager> {
        self.slots().installing.clone()
    }

    pub fn waiting(&self) -> Option<CacheManager> {
        self.slots().waiting.clone()
    }

    pub fn activating(&self) -> Option<CacheManager> {
        self.slots().activating.clone()
    }

    pub fn active(&self) -> Option<CacheManager> {
        self.slots().active.clone()
    }

    /// The version controlling pages, if it finished activating.
    pub fn controller(&self) -> Option<CacheManager> {
        self.active().filter(|m| m.state().is_active())
    }

    /// Install a new version. It becomes the waiting version, replacing any
    /// previous one, and is activated right away when nothing stands in
    /// its way.
    pub async fn register(&self, manager: CacheManager) -> Result<InstallReport, ServiceWorkerError> {
        info!(worker = %manager.id(), generation = manager.generation(), "Registering");
        if let Some(previous) = self.slots().installing.replace(manager.clone()) {
            previous.mark_redundant();
        }

        let event = ExtendableEvent::new();
        let result = manager.install(&event).await;
        event.settled().await;

        {
            let mut slots = self.slots();
            if slots.installing.as_ref().map(CacheManager::id) == Some(manager.id()) {
                slots.installing = None;
            }
        }

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                manager.mark_redundant();
                return Err(e);
            }
        };

        if let Some(previous) = self.slots().waiting.replace(manager) {
            debug!(worker = %previous.id(), "Replaced waiting version");
            previous.mark_redundant();
        }
        self.try_activate().await?;
        Ok(report)
    }

    /// Make `manager` active over a generation that is already stored.
    /// Returns `false`, leaving the registration untouched, when there is
    /// nothing to resume.
    pub async fn resume(&self, manager: CacheManager) -> Result<bool, ServiceWorkerError> {
        let event = ExtendableEvent::new();
        let resumed = manager.resume(&event).await?;
        event.settled().await;
        if resumed {
            if let Some(previous) = self.slots().active.replace(manager) {
                previous.mark_redundant();
            }
        }
        Ok(resumed)
    }

    /// Activate the waiting version if the active one no longer holds it
    /// back.
    pub async fn try_activate(&self) -> Result<Option<ActivateReport>, ServiceWorkerError> {
        let (waiting, active) = {
            let slots = self.slots();
            (slots.waiting.clone(), slots.active.clone())
        };
        let Some(waiting) = waiting else {
            return Ok(None);
        };

        let ready = match active {
            None => true,
            Some(active) => {
                waiting.skip_waiting_requested()
                    || self.clients.controlled_by(active.generation()).await == 0
            }
        };
        if !ready {
            debug!(worker = %waiting.id(), "Waiting for controlled pages to close");
            return Ok(None);
        }
        self.activate_waiting().await
    }

    /// Activate the waiting version unconditionally.
    ///
    /// The current active version stays in place until the new one has
    /// finished activating, and only then becomes redundant. If activation
    /// fails the current version remains active.
    pub async fn activate_waiting(&self) -> Result<Option<ActivateReport>, ServiceWorkerError> {
        let next = {
            let mut slots = self.slots();
            let Some(next) = slots.waiting.take() else {
                return Ok(None);
            };
            slots.activating = Some(next.clone());
            next
        };

        let event = ExtendableEvent::new();
        let result = next.activate(&event).await;
        event.settled().await;

        let mut slots = self.slots();
        let current = slots.activating.as_ref().map(CacheManager::id) == Some(next.id());
        if current {
            slots.activating = None;
        }
        match result {
            Ok(report) if current => {
                if let Some(previous) = slots.active.replace(next) {
                    debug!(worker = %previous.id(), "Retired previous active version");
                    previous.mark_redundant();
                }
                Ok(Some(report))
            }
            Ok(_) => {
                debug!(worker = %next.id(), "Registration was cleared during activation");
                next.mark_redundant();
                Ok(None)
            }
            Err(e) => {
                next.mark_redundant();
                Err(e)
            }
        }
    }

    /// Route a fetch to the active version.
    pub fn fetch(&self, request: Request, event: &ExtendableEvent) -> FetchDisposition {
        match self.active() {
            Some(active) => active.handle_fetch(request, event),
            None => FetchDisposition::Passthrough,
        }
    }

    /// Deliver a message posted by a page.
    ///
    /// `SKIP_WAITING` goes to the version waiting (or installing) and may
    /// activate it; `PREFETCH` goes to the active version. Anything else is
    /// ignored.
    pub async fn post_message(&self, value: &Value) -> Result<(), ServiceWorkerError> {
        let Some(message) = ControlMessage::parse(value) else {
            return Ok(());
        };

        let target = match message {
            ControlMessage::SkipWaiting => {
                let slots = self.slots();
                slots.waiting.clone().or_else(|| slots.installing.clone())
            }
            ControlMessage::Prefetch { .. } => self.active(),
        };
        let Some(target) = target else {
            debug!(message = ?message, "No worker to receive message");
            return Ok(());
        };

        let skip_waiting = message == ControlMessage::SkipWaiting;
        let event = ExtendableEvent::new();
        let result = target.handle_message(message, &event).await;
        event.settled().await;
        result?;

        if skip_waiting {
            self.try_activate().await?;
        }
        Ok(())
    }

    /// A page went away. The waiting version may now take over.
    pub async fn client_closed(&self, id: &ClientId) -> Result<Option<ActivateReport>, ServiceWorkerError> {
        self.clients.disconnect(id).await;
        self.try_activate().await
    }

    /// Retire every version. Cache contents are left in storage.
    pub fn unregister(&self) -> bool {
        let slots = std::mem::take(&mut *self.slots());
        let managers: Vec<CacheManager> = [
            slots.installing,
            slots.waiting,
            slots.activating,
            slots.active,
        ]
            .into_iter()
            .flatten()
            .collect();
        for manager in &managers {
            manager.mark_redundant();
        }
        info!(scope = %self.scope, retired = managers.len(), "Unregistered");
        !managers.is_empty()
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
