//! Typed CRUD over the four tables in [`crate::persistence::schema`], per
//! spec §4.C. Grounded on `database::db()` for the connection shape (a
//! single `tokio_postgres::Client` driven by a spawned connection future)
//! and on the source's `internal/models` package for the exact operation
//! list: insert/fetch/update a live match, atomically move a live match to
//! past matches, insert a user with its default ratings row, fetch/update
//! one rating bucket, and find the highest-average-rating live match.
//!
//! Every write that must not interleave with a concurrent write to the same
//! row goes through [`crate::persistence::queue::PersistenceQueue`]; reads
//! bypass the queue and hit the client directly, matching spec §4.C's
//! "reads do not contend with the write queue" note.

use tokio_postgres::{Client, NoTls};

use crate::error::GambitError;
use crate::model::{
    LiveMatch, MatchHistoryEntry, PastMatch, RatingBucket, ResultCode, ResultReason, TimeControl,
    User, UserRatings,
};
use crate::persistence::schema;

/// Connects to Postgres and spawns the driving connection future, matching
/// the teacher's reference dependency's `database::db()` shape. Panics on a
/// bad connection string, since there is no sensible recovery at startup.
/// Returned bare (not `Arc`-wrapped) since [`crate::persistence::PersistenceQueue::spawn`]
/// takes ownership and does its own sharing.
pub async fn connect(connection_string: &str) -> Client {
    let (client, connection) = tokio_postgres::connect(connection_string, NoTls)
        .await
        .expect("failed to connect to postgres");

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            log::error!("postgres connection error: {e}");
        }
    });

    for ddl in schema::all_creates() {
        if let Err(e) = client.batch_execute(ddl).await {
            log::error!("schema migration failed for statement {ddl:?}: {e}");
        }
    }
    client
}

fn history_to_json(history: &[MatchHistoryEntry]) -> serde_json::Value {
    serde_json::to_value(history).expect("history always serializes")
}

/// Deserializes the `history` JSONB column. A failure here means a row was
/// written outside this module's own `insert_live_match`/`update_live_match`
/// paths, which never happens in practice, so this is an invariant
/// violation rather than a recoverable storage error.
fn history_from_json(value: serde_json::Value) -> Result<Vec<MatchHistoryEntry>, GambitError> {
    Ok(serde_json::from_value(value).expect("match history column holds a valid history array"))
}

/// Inserts a brand-new live match row, generating its id. Used once, at
/// match creation time, by the matchmaking service's "create match" step
/// (spec §4.G) — the initial history is the synthetic one-entry record
/// described in spec §3, both clocks starting at `time_control.total_ms`.
pub async fn insert_new_live_match(
    client: &Client,
    white_player_id: i64,
    black_player_id: i64,
    time_control: TimeControl,
    starting_fen: &str,
    average_rating: i32,
    started_at_ms: i64,
) -> Result<i64, GambitError> {
    let history = vec![MatchHistoryEntry::initial(starting_fen.to_string(), time_control)];
    let row = client
        .query_one(
            &format!(
                "INSERT INTO {} (white_player_id, black_player_id, current_fen, last_move_from, \
                 last_move_to, total_ms, increment_ms, white_ms_remaining, black_ms_remaining, \
                 history, time_of_last_move_ms, average_rating, started_at_ms) \
                 VALUES ($1,$2,$3,NULL,NULL,$4,$5,$6,$7,$8,$9,$10,$11) RETURNING match_id",
                schema::LIVE_MATCHES
            ),
            &[
                &white_player_id,
                &black_player_id,
                &starting_fen,
                &time_control.total_ms,
                &time_control.increment_ms,
                &time_control.total_ms,
                &time_control.total_ms,
                &history_to_json(&history),
                &started_at_ms,
                &average_rating,
                &started_at_ms,
            ],
        )
        .await?;
    Ok(row.get(0))
}

/// Fetches a live match joined with both players' usernames, matching the
/// source's `getLiveMatchByID` (which denormalizes usernames for display
/// rather than requiring the caller to join separately).
pub async fn fetch_live_match(client: &Client, match_id: i64) -> Result<LiveMatch, GambitError> {
    let row = client
        .query_opt(
            &format!(
                "SELECT m.match_id, m.white_player_id, m.black_player_id, wu.username, bu.username, \
                 m.current_fen, m.last_move_from, m.last_move_to, m.total_ms, m.increment_ms, \
                 m.white_ms_remaining, m.black_ms_remaining, m.history, m.time_of_last_move_ms, \
                 m.average_rating, m.started_at_ms \
                 FROM {live} m \
                 JOIN {users} wu ON wu.player_id = m.white_player_id \
                 JOIN {users} bu ON bu.player_id = m.black_player_id \
                 WHERE m.match_id = $1",
                live = schema::LIVE_MATCHES,
                users = schema::USERS,
            ),
            &[&match_id],
        )
        .await?
        .ok_or(GambitError::MatchNotFound(match_id))?;

    let last_move_from: Option<i16> = row.get(6);
    let last_move_to: Option<i16> = row.get(7);
    let last_move = match (last_move_from, last_move_to) {
        (Some(f), Some(t)) => Some((f as u8, t as u8)),
        _ => None,
    };

    Ok(LiveMatch {
        match_id: row.get(0),
        white_player_id: row.get(1),
        black_player_id: row.get(2),
        white_username: row.get(3),
        black_username: row.get(4),
        current_fen: row.get(5),
        last_move,
        time_control: TimeControl {
            total_ms: row.get(8),
            increment_ms: row.get(9),
        },
        white_ms_remaining: row.get(10),
        black_ms_remaining: row.get(11),
        history: history_from_json(row.get(12))?,
        time_of_last_move_ms: row.get(13),
        average_rating: row.get(14),
        started_at_ms: row.get(15),
    })
}

/// Overwrites a live match's mutable fields after a move or event. Called
/// from inside the hub's event loop, chained through a barrier so two
/// updates to the same match never race.
pub async fn update_live_match(client: &Client, m: &LiveMatch) -> Result<(), GambitError> {
    let (from, to) = match m.last_move {
        Some((f, t)) => (Some(f as i16), Some(t as i16)),
        None => (None, None),
    };
    client
        .execute(
            &format!(
                "UPDATE {} SET current_fen = $2, last_move_from = $3, last_move_to = $4, \
                 white_ms_remaining = $5, black_ms_remaining = $6, history = $7, \
                 time_of_last_move_ms = $8 WHERE match_id = $1",
                schema::LIVE_MATCHES
            ),
            &[
                &m.match_id,
                &m.current_fen,
                &from,
                &to,
                &m.white_ms_remaining,
                &m.black_ms_remaining,
                &history_to_json(&m.history),
                &m.time_of_last_move_ms,
            ],
        )
        .await?;
    Ok(())
}

/// Deletes the live match and inserts its past-match record, per spec
/// §4.C's "move to past matches" step. The persistence queue hands job
/// closures a shared `Arc<Client>` rather than an exclusive one (multiple
/// matches' jobs interleave on the same connection), so this runs as two
/// sequential statements rather than a wrapped `Client::transaction` —
/// acceptable because the hub's own barrier chaining already guarantees no
/// other write touches this match's row between them.
pub async fn finish_match(
    client: &Client,
    live: &LiveMatch,
    result: ResultCode,
    reason: ResultReason,
    white_rating_delta: i32,
    black_rating_delta: i32,
    ended_at_ms: i64,
) -> Result<(), GambitError> {
    client
        .execute(
            &format!("DELETE FROM {} WHERE match_id = $1", schema::LIVE_MATCHES),
            &[&live.match_id],
        )
        .await?;

    let result_str = match result {
        ResultCode::Draw => "draw",
        ResultCode::White => "white",
        ResultCode::Black => "black",
    };
    let reason_str = format!("{:?}", reason);

    client
        .execute(
            &format!(
                "INSERT INTO {} (match_id, white_player_id, black_player_id, final_fen, history, \
                 result, result_reason, white_rating_delta, black_rating_delta, total_ms, \
                 increment_ms, started_at_ms, ended_at_ms) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)",
                schema::PAST_MATCHES
            ),
            &[
                &live.match_id,
                &live.white_player_id,
                &live.black_player_id,
                &live.current_fen,
                &history_to_json(&live.history),
                &result_str,
                &reason_str,
                &white_rating_delta,
                &black_rating_delta,
                &live.time_control.total_ms,
                &live.time_control.increment_ms,
                &live.started_at_ms,
                &ended_at_ms,
            ],
        )
        .await?;

    Ok(())
}

pub async fn fetch_past_match(client: &Client, match_id: i64) -> Result<PastMatch, GambitError> {
    let row = client
        .query_opt(
            &format!(
                "SELECT match_id, white_player_id, black_player_id, final_fen, history, result, \
                 result_reason, white_rating_delta, black_rating_delta, total_ms, increment_ms, \
                 started_at_ms, ended_at_ms FROM {} WHERE match_id = $1",
                schema::PAST_MATCHES
            ),
            &[&match_id],
        )
        .await?
        .ok_or(GambitError::MatchNotFound(match_id))?;

    let result_str: String = row.get(5);
    let result = match result_str.as_str() {
        "white" => ResultCode::White,
        "black" => ResultCode::Black,
        _ => ResultCode::Draw,
    };
    let reason_str: String = row.get(6);
    let reason = parse_reason(&reason_str);

    Ok(PastMatch {
        match_id: row.get(0),
        white_player_id: row.get(1),
        black_player_id: row.get(2),
        final_fen: row.get(3),
        history: history_from_json(row.get(4))?,
        result,
        result_reason: reason,
        white_rating_delta: row.get(7),
        black_rating_delta: row.get(8),
        time_control: TimeControl {
            total_ms: row.get(9),
            increment_ms: row.get(10),
        },
        started_at_ms: row.get(11),
        ended_at_ms: row.get(12),
    })
}

fn parse_reason(s: &str) -> ResultReason {
    match s {
        "Checkmate" => ResultReason::Checkmate,
        "Stalemate" => ResultReason::Stalemate,
        "ThreefoldRepetition" => ResultReason::ThreefoldRepetition,
        "InsufficientMaterial" => ResultReason::InsufficientMaterial,
        "WhiteFlagged" => ResultReason::WhiteFlagged,
        "BlackFlagged" => ResultReason::BlackFlagged,
        "WhiteResigned" => ResultReason::WhiteResigned,
        "BlackResigned" => ResultReason::BlackResigned,
        "WhiteDisconnected" => ResultReason::WhiteDisconnected,
        "BlackDisconnected" => ResultReason::BlackDisconnected,
        _ => ResultReason::Draw,
    }
}

/// Finds the live match with the highest `(white_rating + black_rating) / 2`,
/// backing the `getHighestEloMatch` route. `average_rating` is maintained as
/// a denormalized column (set once at match creation) rather than computed
/// per query, since ratings of in-progress players don't change mid-match.
pub async fn highest_rated_live_match(client: &Client) -> Result<Option<i64>, GambitError> {
    let row = client
        .query_opt(
            &format!(
                "SELECT match_id FROM {} ORDER BY average_rating DESC LIMIT 1",
                schema::LIVE_MATCHES
            ),
            &[],
        )
        .await?;
    Ok(row.map(|r| r.get(0)))
}

/// Inserts a user and its default-rated `user_ratings` row, per spec §4.C,
/// returning [`GambitError::UsernameTaken`] on the unique-username conflict
/// (SQLSTATE `23505`). See [`finish_match`] for why this is two sequential
/// statements rather than a `Client::transaction` — the caller (user
/// registration, off the hot path) tolerates the narrow window where the
/// first insert lands without the second.
pub async fn create_user(client: &Client, mut user: User, player_id: i64) -> Result<User, GambitError> {
    user.player_id = player_id;
    let ratings = UserRatings::default_for(player_id);

    let inserted = client
        .execute(
            &format!(
                "INSERT INTO {} (player_id, username, password_hash, email, joined_at_ms, last_seen_ms) \
                 VALUES ($1,$2,$3,$4,$5,$6)",
                schema::USERS
            ),
            &[
                &user.player_id,
                &user.username,
                &user.password_hash,
                &user.email,
                &user.joined_at_ms,
                &user.last_seen_ms,
            ],
        )
        .await;

    let inserted = match inserted {
        Ok(n) => n,
        Err(e) => {
            if e.code().map(|c| c.code()) == Some("23505") {
                return Err(GambitError::UsernameTaken(user.username));
            }
            return Err(e.into());
        }
    };
    debug_assert_eq!(inserted, 1);

    client
        .execute(
            &format!(
                "INSERT INTO {} (player_id, bullet, blitz, rapid, classical) VALUES ($1,$2,$3,$4,$5)",
                schema::USER_RATINGS
            ),
            &[
                &ratings.player_id,
                &ratings.bullet,
                &ratings.blitz,
                &ratings.rapid,
                &ratings.classical,
            ],
        )
        .await?;

    Ok(user)
}

pub async fn fetch_user_by_username(client: &Client, username: &str) -> Result<User, GambitError> {
    let row = client
        .query_opt(
            &format!(
                "SELECT player_id, username, password_hash, email, joined_at_ms, last_seen_ms \
                 FROM {} WHERE username = $1",
                schema::USERS
            ),
            &[&username],
        )
        .await?
        .ok_or_else(|| GambitError::UserNotFound(username.to_string()))?;

    Ok(User {
        player_id: row.get(0),
        username: row.get(1),
        password_hash: row.get(2),
        email: row.get(3),
        joined_at_ms: row.get(4),
        last_seen_ms: row.get(5),
    })
}

pub async fn fetch_ratings(client: &Client, player_id: i64) -> Result<UserRatings, GambitError> {
    let row = client
        .query_opt(
            &format!(
                "SELECT player_id, bullet, blitz, rapid, classical FROM {} WHERE player_id = $1",
                schema::USER_RATINGS
            ),
            &[&player_id],
        )
        .await?
        .ok_or_else(|| GambitError::UserNotFound(player_id.to_string()))?;

    Ok(UserRatings {
        player_id: row.get(0),
        bullet: row.get(1),
        blitz: row.get(2),
        rapid: row.get(3),
        classical: row.get(4),
    })
}

/// Applies a rating delta to exactly one bucket and persists the result,
/// used by the hub after a match ends to update both players independently.
pub async fn apply_rating_delta(
    client: &Client,
    player_id: i64,
    bucket: RatingBucket,
    delta: i32,
) -> Result<i32, GambitError> {
    let mut ratings = fetch_ratings(client, player_id).await?;
    let new_value = (ratings.get(bucket) + delta).max(0);
    ratings.set(bucket, new_value);

    let column = match bucket {
        RatingBucket::Bullet => "bullet",
        RatingBucket::Blitz => "blitz",
        RatingBucket::Rapid => "rapid",
        RatingBucket::Classical => "classical",
    };
    client
        .execute(
            &format!(
                "UPDATE {} SET {column} = $2 WHERE player_id = $1",
                schema::USER_RATINGS
            ),
            &[&player_id, &new_value],
        )
        .await?;
    Ok(new_value)
}
