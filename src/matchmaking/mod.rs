//! Periodic pairing service, sharded by time control, per spec §4.G.
//!
//! Grounded directly on `original_source/backend/cmd/web/matchmaking.go`
//! (`OpenPool`, `RemovalMap`, `QueueData`, `addPlayerToWaitingPool`,
//! `removePlayerFromWaitingPool`, `matchPlayers`, `matchmakingService`) for
//! the algorithm, reworked so the "main pool is touched only by the single
//! pairing task, so it needs no lock" claim in spec §5 is true in the literal
//! Rust sense: the main pool lives as a local `Vec` inside the pairing
//! task's own loop rather than behind a shared lock. Only the two ingress
//! buffers and the removal-intent map, which `join`/`leave` touch from
//! arbitrary HTTP-handler tasks, are `tokio::sync::Mutex`-guarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{oneshot, Mutex};
use tokio_postgres::Client;

use crate::hub::manager::HubManager;
use crate::hub::Hub;
use crate::model::TimeControl;
use crate::persistence::{store, PersistenceQueue};

/// A player's initial matchmaking search radius, per spec §3 "Matchmaking
/// entry". Widened by [`THRESHOLD_GROWTH_PER_PASS`] every pass a player
/// goes unmatched.
pub const DEFAULT_THRESHOLD: i32 = 400;

/// Open Question resolution (spec.md §9 / DESIGN.md): linear growth, +50 per
/// pairing pass, uncapped.
const THRESHOLD_GROWTH_PER_PASS: i32 = 50;

/// Pairing pass interval, per spec §5 "Timeouts".
pub const PAIRING_INTERVAL: Duration = Duration::from_millis(500);

const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

struct Entry {
    player_id: i64,
    rating: i32,
    threshold: i32,
    matched: bool,
}

/// Delivered to a waiting `GET /listenformatch` request once its player is
/// paired, per spec §6.
#[derive(Debug, Clone, Copy)]
pub struct MatchFound {
    pub match_id: i64,
    pub time_control: TimeControl,
}

/// One `(totalMs, incrementMs)`-keyed pool's shared (cross-task) state.
struct Pool {
    time_control: TimeControl,
    /// Index (0 or 1) of the buffer currently open for new joins.
    open_idx: AtomicUsize,
    buffers: [Mutex<Vec<Entry>>; 2],
    /// playerId -> true once a `leave` request has been recorded; observed
    /// and cleared by the pairing pass, not acted on immediately.
    removal: Mutex<HashMap<i64, bool>>,
    waiters: Mutex<HashMap<i64, oneshot::Sender<MatchFound>>>,
}

impl Pool {
    fn new(time_control: TimeControl) -> Self {
        Pool {
            time_control,
            open_idx: AtomicUsize::new(0),
            buffers: [Mutex::new(Vec::new()), Mutex::new(Vec::new())],
            removal: Mutex::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
        }
    }
}

/// Process-wide matchmaking service: one [`Pool`] per distinct time control,
/// created lazily on first join, plus the spawned pairing task for each.
pub struct MatchmakingService {
    pools: Mutex<HashMap<TimeControl, Arc<Pool>>>,
    queue: PersistenceQueue<Client>,
    hub_manager: Arc<HubManager>,
    /// `join`'s receiving half, held here until `GET /listenformatch` claims
    /// it. Separate from `Pool::waiters` (the sending half, used by
    /// `create_match`) because the join and the listen are two independent
    /// HTTP requests that only share a player id.
    pending: Mutex<HashMap<i64, oneshot::Receiver<MatchFound>>>,
}

impl MatchmakingService {
    pub fn new(queue: PersistenceQueue<Client>, hub_manager: Arc<HubManager>) -> Arc<Self> {
        Arc::new(MatchmakingService {
            pools: Mutex::new(HashMap::new()),
            queue,
            hub_manager,
            pending: Mutex::new(HashMap::new()),
        })
    }

    async fn pool_for(self: &Arc<Self>, time_control: TimeControl) -> Arc<Pool> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(&time_control) {
            return pool.clone();
        }
        let pool = Arc::new(Pool::new(time_control));
        pools.insert(time_control, pool.clone());

        let service = self.clone();
        let pairing_pool = pool.clone();
        tokio::spawn(async move {
            service.run_pairing_loop(pairing_pool).await;
        });

        pool
    }

    /// `POST /joinQueue { action: "join" }`, per spec §4.G "Join". Idempotent:
    /// rejoining a player already in the pool just clears a pending leave
    /// flag and (re)registers the waiter channel. The matching `MatchFound`
    /// is retrieved later, from a separate request, via [`Self::wait_for_match`].
    pub async fn join(self: &Arc<Self>, player_id: i64, rating: i32, time_control: TimeControl) {
        let pool = self.pool_for(time_control).await;
        let (tx, rx) = oneshot::channel();

        let mut removal = pool.removal.lock().await;
        let already_queued = removal.insert(player_id, false).is_some();
        drop(removal);

        if !already_queued {
            let idx = pool.open_idx.load(Ordering::Acquire);
            pool.buffers[idx].lock().await.push(Entry {
                player_id,
                rating,
                threshold: DEFAULT_THRESHOLD,
                matched: false,
            });
        }
        pool.waiters.lock().await.insert(player_id, tx);
        self.pending.lock().await.insert(player_id, rx);
    }

    /// `GET /listenformatch`, per spec §6: claims the receiving half of the
    /// channel `join` registered for this player, if one is still pending.
    /// Returns `None` if the player never joined a queue (or already claimed
    /// it from another connection) — the caller should respond as "not
    /// queued" rather than blocking forever.
    pub async fn wait_for_match(self: &Arc<Self>, player_id: i64) -> Option<oneshot::Receiver<MatchFound>> {
        self.pending.lock().await.remove(&player_id)
    }

    /// `POST /joinQueue { action: "leave" }`, per spec §4.G "Leave". Only
    /// flips the removal-intent flag; the pairing pass is what actually
    /// drops the entry.
    pub async fn leave(self: &Arc<Self>, player_id: i64, time_control: TimeControl) {
        let pool = self.pool_for(time_control).await;
        let mut removal = pool.removal.lock().await;
        if let Some(flag) = removal.get_mut(&player_id) {
            *flag = true;
        }
    }

    /// The periodic pairing pass, per spec §4.G "Pairing pass" — one task
    /// per pool, running forever until process shutdown (spec §5
    /// "Cancellation": "the matchmaking loop exits only at process
    /// shutdown").
    async fn run_pairing_loop(self: Arc<Self>, pool: Arc<Pool>) {
        let mut main: Vec<Entry> = Vec::new();
        let mut ticker = tokio::time::interval(PAIRING_INTERVAL);

        loop {
            ticker.tick().await;

            let closed_idx = pool.open_idx.fetch_xor(1, Ordering::AcqRel);
            let mut drained = {
                let mut closed = pool.buffers[closed_idx].lock().await;
                std::mem::take(&mut *closed)
            };
            main.append(&mut drained);

            if main.is_empty() {
                continue;
            }

            let mut candidates: Vec<(i32, usize, usize)> = Vec::new();
            for i in 0..main.len() {
                for j in (i + 1)..main.len() {
                    let score = (main[i].rating - main[j].rating).abs();
                    if 2 * score <= main[i].threshold + main[j].threshold {
                        candidates.push((score, i, j));
                    }
                }
            }
            candidates.sort_by_key(|&(score, _, _)| score);

            let removal_snapshot = pool.removal.lock().await.clone();
            for (_, i, j) in candidates {
                if main[i].matched || main[j].matched {
                    continue;
                }
                if removal_snapshot.get(&main[i].player_id).copied().unwrap_or(false)
                    || removal_snapshot.get(&main[j].player_id).copied().unwrap_or(false)
                {
                    continue;
                }
                self.create_match(&pool, &main[i], &main[j]).await;
                main[i].matched = true;
                main[j].matched = true;
            }

            for entry in main.iter_mut() {
                if !entry.matched {
                    entry.threshold += THRESHOLD_GROWTH_PER_PASS;
                }
            }

            let mut removal = pool.removal.lock().await;
            main.retain(|e| {
                let flagged = removal.get(&e.player_id).copied().unwrap_or(false);
                let drop = e.matched || flagged;
                if drop {
                    removal.remove(&e.player_id);
                }
                !drop
            });
        }
    }

    /// Per spec §4.G "Create match": picks white by fair coin, inserts the
    /// live match row, spawns its hub immediately (so the first socket
    /// connection doesn't pay the lazy-create latency), and delivers the
    /// match id to both waiters' one-shot channels.
    async fn create_match(&self, pool: &Pool, a: &Entry, b: &Entry) {
        let (white, black) = if rand::thread_rng().gen_bool(0.5) {
            (a, b)
        } else {
            (b, a)
        };

        let white_id = white.player_id;
        let black_id = black.player_id;
        let time_control = pool.time_control;
        let average_rating = (a.rating + b.rating) / 2;
        let started_at_ms = now_ms();

        // The live-match insert is a write, so per spec §2/§3 it goes
        // through the persistence queue rather than straight to a resource
        // handle; only reads may bypass it.
        let match_id = match self
            .queue
            .submit(None, None, move |client| async move {
                store::insert_new_live_match(
                    &client,
                    white_id,
                    black_id,
                    time_control,
                    STARTING_FEN,
                    average_rating,
                    started_at_ms,
                )
                .await
            })
            .await
        {
            Ok(id) => id,
            Err(e) => {
                log::error!("matchmaking: failed to create match for {white_id}/{black_id}: {e}");
                return;
            }
        };

        let client = self.queue.resource();
        let live = match store::fetch_live_match(&client, match_id).await {
            Ok(live) => live,
            Err(e) => {
                log::error!("matchmaking: failed to re-fetch freshly created match {match_id}: {e}");
                return;
            }
        };
        let handle = Hub::spawn(live, self.queue.clone(), self.hub_manager.clone());
        self.hub_manager.register(handle).await;

        let found = MatchFound { match_id, time_control: pool.time_control };
        let mut waiters = pool.waiters.lock().await;
        if let Some(tx) = waiters.remove(&white.player_id) {
            let _ = tx.send(found);
        }
        if let Some(tx) = waiters.remove(&black.player_id) {
            let _ = tx.send(found);
        }
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tc() -> TimeControl {
        TimeControl { total_ms: 300_000, increment_ms: 0 }
    }

    #[test]
    fn admissible_pair_within_combined_threshold() {
        let a = Entry { player_id: 1, rating: 1500, threshold: DEFAULT_THRESHOLD, matched: false };
        let b = Entry { player_id: 2, rating: 1700, threshold: DEFAULT_THRESHOLD, matched: false };
        let score = (a.rating - b.rating).abs();
        assert!(2 * score <= a.threshold + b.threshold);
    }

    #[test]
    fn inadmissible_pair_outside_combined_threshold() {
        let a = Entry { player_id: 1, rating: 1000, threshold: 50, matched: false };
        let b = Entry { player_id: 2, rating: 2000, threshold: 50, matched: false };
        let score = (a.rating - b.rating).abs();
        assert!(2 * score > a.threshold + b.threshold);
    }

    #[tokio::test]
    async fn rejoining_a_queued_player_is_idempotent() {
        let pool = Pool::new(tc());
        pool.removal.lock().await.insert(42, true);
        {
            let mut removal = pool.removal.lock().await;
            removal.insert(42, false);
        }
        assert_eq!(pool.removal.lock().await.get(&42), Some(&false));
    }
}
