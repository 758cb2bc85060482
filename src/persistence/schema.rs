//! Table layout for the match store, expressed the way
//! `database::traits::Schema` expresses robopoker's tables: a trait of
//! `&'static str` DDL fragments built with `const_format::concatcp!` so the
//! whole schema is known at compile time and `creates()` can be run
//! unconditionally at startup.

use const_format::concatcp;

pub const LIVE_MATCHES: &str = "live_matches";
pub const PAST_MATCHES: &str = "past_matches";
pub const USERS: &str = "users";
pub const USER_RATINGS: &str = "user_ratings";

/// Mirrors `database::traits::Schema` from the teacher's reference
/// dependency: one DDL string per concern, composed at compile time.
pub trait Schema {
    fn name() -> &'static str;
    fn creates() -> &'static str;
    fn indices() -> &'static str;
    fn truncates() -> &'static str;
}

pub struct LiveMatchSchema;

impl Schema for LiveMatchSchema {
    fn name() -> &'static str {
        LIVE_MATCHES
    }

    fn creates() -> &'static str {
        concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            LIVE_MATCHES,
            " (
                match_id            BIGSERIAL PRIMARY KEY,
                white_player_id     BIGINT NOT NULL,
                black_player_id     BIGINT NOT NULL,
                current_fen         TEXT NOT NULL,
                last_move_from      SMALLINT,
                last_move_to        SMALLINT,
                total_ms            BIGINT NOT NULL,
                increment_ms        BIGINT NOT NULL,
                white_ms_remaining  BIGINT NOT NULL,
                black_ms_remaining  BIGINT NOT NULL,
                history             JSONB NOT NULL,
                time_of_last_move_ms BIGINT NOT NULL,
                average_rating      INTEGER NOT NULL,
                started_at_ms       BIGINT NOT NULL
            );"
        )
    }

    fn indices() -> &'static str {
        concatcp!(
            "CREATE INDEX IF NOT EXISTS live_matches_rating_idx ON ",
            LIVE_MATCHES,
            " (average_rating DESC);"
        )
    }

    fn truncates() -> &'static str {
        concatcp!("TRUNCATE TABLE ", LIVE_MATCHES, ";")
    }
}

pub struct PastMatchSchema;

impl Schema for PastMatchSchema {
    fn name() -> &'static str {
        PAST_MATCHES
    }

    fn creates() -> &'static str {
        concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            PAST_MATCHES,
            " (
                match_id            BIGINT PRIMARY KEY,
                white_player_id     BIGINT NOT NULL,
                black_player_id     BIGINT NOT NULL,
                final_fen           TEXT NOT NULL,
                history             JSONB NOT NULL,
                result              TEXT NOT NULL,
                result_reason       TEXT NOT NULL,
                white_rating_delta  INTEGER NOT NULL,
                black_rating_delta  INTEGER NOT NULL,
                total_ms            BIGINT NOT NULL,
                increment_ms        BIGINT NOT NULL,
                started_at_ms       BIGINT NOT NULL,
                ended_at_ms         BIGINT NOT NULL
            );"
        )
    }

    fn indices() -> &'static str {
        concatcp!(
            "CREATE INDEX IF NOT EXISTS past_matches_players_idx ON ",
            PAST_MATCHES,
            " (white_player_id, black_player_id);"
        )
    }

    fn truncates() -> &'static str {
        concatcp!("TRUNCATE TABLE ", PAST_MATCHES, ";")
    }
}

pub struct UserSchema;

impl Schema for UserSchema {
    fn name() -> &'static str {
        USERS
    }

    fn creates() -> &'static str {
        concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            USERS,
            " (
                player_id       BIGINT PRIMARY KEY,
                username        TEXT NOT NULL UNIQUE,
                password_hash   TEXT NOT NULL,
                email           TEXT,
                joined_at_ms    BIGINT NOT NULL,
                last_seen_ms    BIGINT NOT NULL
            );"
        )
    }

    fn indices() -> &'static str {
        concatcp!(
            "CREATE UNIQUE INDEX IF NOT EXISTS users_username_idx ON ",
            USERS,
            " (username);"
        )
    }

    fn truncates() -> &'static str {
        concatcp!("TRUNCATE TABLE ", USERS, " CASCADE;")
    }
}

pub struct UserRatingsSchema;

impl Schema for UserRatingsSchema {
    fn name() -> &'static str {
        USER_RATINGS
    }

    fn creates() -> &'static str {
        concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            USER_RATINGS,
            " (
                player_id   BIGINT PRIMARY KEY REFERENCES ",
            USERS,
            " (player_id),
                bullet      INTEGER NOT NULL,
                blitz       INTEGER NOT NULL,
                rapid       INTEGER NOT NULL,
                classical   INTEGER NOT NULL
            );"
        )
    }

    fn indices() -> &'static str {
        ""
    }

    fn truncates() -> &'static str {
        concatcp!("TRUNCATE TABLE ", USER_RATINGS, ";")
    }
}

/// Every table's `creates()`/`indices()`, in dependency order (ratings
/// references users), run once at startup.
pub fn all_creates() -> Vec<&'static str> {
    vec![
        LiveMatchSchema::creates(),
        UserSchema::creates(),
        UserRatingsSchema::creates(),
        PastMatchSchema::creates(),
        LiveMatchSchema::indices(),
        UserSchema::indices(),
        PastMatchSchema::indices(),
    ]
}
