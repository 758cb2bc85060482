//! Lazy get-or-create registry of running hubs, per spec §4.E. Grounded on
//! `hosting::casino::Casino`'s `rooms: RwLock<HashMap<...>>` plus its
//! spawn-then-insert pattern, adapted from Casino's single `start()` (every
//! room is newly created) to a get-or-create keyed by match id, since a
//! match's hub may already be running when a second player's socket
//! connects.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_postgres::Client;

use crate::error::GambitError;
use crate::hub::{Hub, HubHandle};
use crate::persistence::{store, PersistenceQueue};

pub struct HubManager {
    queue: PersistenceQueue<Client>,
    hubs: RwLock<HashMap<i64, HubHandle>>,
}

impl HubManager {
    pub fn new(queue: PersistenceQueue<Client>) -> Arc<Self> {
        Arc::new(HubManager {
            queue,
            hubs: RwLock::new(HashMap::new()),
        })
    }

    /// Returns the running hub for `match_id`, spawning one from the
    /// persisted live match row if none is registered yet. Per spec §4.E,
    /// hubs are never proactively created — only on first access (a
    /// matchmaking pairing's initial broadcast, or a socket connecting to
    /// an existing match id).
    pub async fn get_or_create(self: &Arc<Self>, match_id: i64) -> Result<HubHandle, GambitError> {
        if let Some(handle) = self.hubs.read().await.get(&match_id) {
            return Ok(handle.clone());
        }

        let mut hubs = self.hubs.write().await;
        if let Some(handle) = hubs.get(&match_id) {
            return Ok(handle.clone());
        }

        let client = self.queue.resource();
        let live = store::fetch_live_match(&client, match_id).await?;
        let handle = Hub::spawn(live, self.queue.clone(), self.clone());
        hubs.insert(match_id, handle.clone());
        Ok(handle)
    }

    /// Registers a hub that was just created directly from a freshly
    /// inserted live match (the matchmaking service's path, which already
    /// has the row in hand and should not re-fetch it).
    pub async fn register(&self, handle: HubHandle) {
        self.hubs.write().await.insert(handle.match_id, handle);
    }

    /// Drops a hub from the registry once its match has ended and every
    /// connection has closed. The hub's own task exits on the same
    /// condition; this just stops the manager from handing out a handle to
    /// a task that is no longer running.
    pub async fn unregister(&self, match_id: i64) {
        self.hubs.write().await.remove(&match_id);
    }
}
