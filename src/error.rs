//! Crate-wide error taxonomy. Hand-rolled `Display`/`Error` impls rather
//! than a derive macro, matching the plain `Result<_, String>` style the
//! rules engine this grew from already used for its own fallible paths.
//!
//! Mapped onto spec §7's error kinds: [`GambitError::InvalidFen`] and
//! [`GambitError::IllegalMove`] are rule-invalid/protocol errors (dropped
//! silently by the hub, surfaced as 4xx at the HTTP edge); [`GambitError::
//! Storage`] covers both transient and hard storage errors (the queue
//! retries transient ones per §4.B before this variant is ever observed);
//! [`GambitError::QueueClosed`] surfaces only during shutdown.

use std::fmt;

#[derive(Debug)]
pub enum GambitError {
    InvalidFen(String),
    IllegalMove { from: String, to: String },
    MatchNotFound(i64),
    UserNotFound(String),
    UsernameTaken(String),
    Storage(tokio_postgres::Error),
    QueueClosed,
}

impl fmt::Display for GambitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GambitError::InvalidFen(s) => write!(f, "invalid FEN: {s}"),
            GambitError::IllegalMove { from, to } => {
                write!(f, "illegal move {from}->{to}")
            }
            GambitError::MatchNotFound(id) => write!(f, "no live match with id {id}"),
            GambitError::UserNotFound(u) => write!(f, "no user named {u}"),
            GambitError::UsernameTaken(u) => write!(f, "username already taken: {u}"),
            GambitError::Storage(e) => write!(f, "storage error: {e}"),
            GambitError::QueueClosed => write!(f, "persistence queue is closed"),
        }
    }
}

impl std::error::Error for GambitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GambitError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<tokio_postgres::Error> for GambitError {
    fn from(e: tokio_postgres::Error) -> Self {
        GambitError::Storage(e)
    }
}

impl GambitError {
    /// True for the store's transient-busy condition (serialization
    /// failure / deadlock), per §4.B's retry policy. Anything else
    /// surfaces immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            GambitError::Storage(e) => e
                .code()
                .map(|c| {
                    matches!(
                        c.code(),
                        "40001" | "40P01" | "55P03"
                    )
                })
                .unwrap_or(false),
            _ => false,
        }
    }
}

impl actix_web::ResponseError for GambitError {
    fn error_response(&self) -> actix_web::HttpResponse {
        use actix_web::HttpResponse;
        let body = serde_json::json!({ "error": self.to_string() });
        match self {
            GambitError::MatchNotFound(_) | GambitError::UserNotFound(_) => {
                HttpResponse::NotFound().json(body)
            }
            GambitError::UsernameTaken(_) => HttpResponse::Conflict().json(body),
            GambitError::InvalidFen(_) | GambitError::IllegalMove { .. } => {
                HttpResponse::BadRequest().json(body)
            }
            GambitError::Storage(_) | GambitError::QueueClosed => {
                HttpResponse::InternalServerError().json(serde_json::json!({ "error": "internal error" }))
            }
        }
    }
}
