//! Page contexts known to the worker.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace};
use url::Url;

use crate::ClientMessage;

/// Client identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A page context.
#[derive(Debug)]
struct Client {
    url: Url,
    /// Generation controlling this page, if any.
    controller: Option<String>,
    sender: mpsc::UnboundedSender<ClientMessage>,
}

/// Read-only view of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub id: ClientId,
    pub url: Url,
    pub controller: Option<String>,
}

/// Options for [`Clients::match_all`].
#[derive(Debug, Clone, Default)]
pub struct ClientMatchOptions {
    pub include_uncontrolled: bool,
}

/// Clients API.
#[derive(Debug, Default)]
pub struct Clients {
    clients: RwLock<HashMap<ClientId, Client>>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page. The receiver yields every message posted to it.
    pub async fn connect(&self, url: Url) -> (ClientId, mpsc::UnboundedReceiver<ClientMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = ClientId::new();
        debug!(client = id.as_str(), url = %url, "Client connected");
        self.clients.write().await.insert(
            id.clone(),
            Client {
                url,
                controller: None,
                sender,
            },
        );
        (id, receiver)
    }

    /// Remove a page.
    pub async fn disconnect(&self, id: &ClientId) -> bool {
        self.clients.write().await.remove(id).is_some()
    }

    /// Get a client by ID.
    pub async fn get(&self, id: &ClientId) -> Option<ClientInfo> {
        self.clients
            .read()
            .await
            .get(id)
            .map(|c| info(id, c))
    }

    /// Match all clients.
    pub async fn match_all(&self, options: ClientMatchOptions) -> Vec<ClientInfo> {
        self.clients
            .read()
            .await
            .iter()
            .filter(|(_, c)| options.include_uncontrolled || c.controller.is_some())
            .map(|(id, c)| info(id, c))
            .collect()
    }

    /// Number of pages controlled by `generation`.
    pub async fn controlled_by(&self, generation: &str) -> usize {
        self.clients
            .read()
            .await
            .values()
            .filter(|c| c.controller.as_deref() == Some(generation))
            .count()
    }

    /// Take control of every page inside `scope`. Pages whose controller
    /// changes receive a `CONTROLLER_CHANGE` message.
    pub async fn claim(&self, generation: &str, scope: &Url) -> usize {
        let mut clients = self.clients.write().await;
        let mut claimed = 0;
        for (id, client) in clients.iter_mut() {
            if !client.url.as_str().starts_with(scope.as_str()) {
                continue;
            }
            if client.controller.as_deref() == Some(generation) {
                continue;
            }
            client.controller = Some(generation.to_string());
            claimed += 1;
            trace!(client = id.as_str(), generation, "Client claimed");
            let _ = client.sender.send(ClientMessage::ControllerChange {
                generation: generation.to_string(),
            });
        }
        claimed
    }

    /// Post a message to every page, controlled or not. Pages whose
    /// receiver is gone are dropped. Returns the number of deliveries.
    pub async fn post_all(&self, message: &ClientMessage) -> usize {
        let mut clients = self.clients.write().await;
        let before = clients.len();
        clients.retain(|_, c| c.sender.send(message.clone()).is_ok());
        let delivered = clients.len();
        if delivered < before {
            debug!(dropped = before - delivered, "Dropped closed clients");
        }
        delivered
    }
}

fn info(id: &ClientId, client: &Client) -> ClientInfo {
    ClientInfo {
        id: id.clone(),
        url: client.url.clone(),
        controller: client.controller.clone(),
    }
}
