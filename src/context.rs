//! The application-wide immutable context, per spec §9 "Global mutable
//! state": "the process-wide logger, persistence queue, matchmaking queue
//! map, hub manager, and session store are initialized once at startup,
//! never torn down until process exit, and never re-bound. Represent them
//! as a single immutable application context passed by value... or as a
//! module-local singleton created by an explicit init." This crate takes
//! the former: one `AppContext` assembled in `main.rs` and handed to
//! `actix_web::App::app_data` as a single `Arc`, generalizing the teacher's
//! `AppState { pub game_manager: Mutex<GameManager> }` shape (`api.rs`) to
//! the larger set of long-lived singletons this system needs. The session
//! store itself is an explicit external collaborator (spec §1) and has no
//! field here; [`crate::api::PlayerIdentity`] stands in for it.

use std::sync::Arc;

use tokio_postgres::Client;

use crate::hub::manager::HubManager;
use crate::matchmaking::MatchmakingService;
use crate::persistence::PersistenceQueue;

pub struct AppContext {
    pub queue: PersistenceQueue<Client>,
    pub hub_manager: Arc<HubManager>,
    pub matchmaking: Arc<MatchmakingService>,
}

impl AppContext {
    pub async fn new(database_url: &str, persistence_workers: usize) -> Arc<Self> {
        let client = crate::persistence::store::connect(database_url).await;
        let queue = PersistenceQueue::spawn(client, persistence_workers);
        let hub_manager = HubManager::new(queue.clone());
        let matchmaking = MatchmakingService::new(queue.clone(), hub_manager.clone());

        Arc::new(AppContext { queue, hub_manager, matchmaking })
    }
}
