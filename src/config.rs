//! Process startup configuration: listen address, database connection
//! string, persistence worker-pool size — the concrete shape of spec §6's
//! "Exit codes / flags. Process exposes a listen address, a database driver
//! name, and a data-source string as startup configuration." Grounded on
//! the teacher's `Cli`/`Commands::{Serve,Play}` `clap` derive shape
//! (`main.rs`); this crate drops `Commands::Export` (superseded by SQL
//! persistence, see DESIGN.md) and keeps `Serve`/`Play`.

use clap::{Parser, Subcommand};

/// gambit — the server-side core of a real-time two-player chess platform.
#[derive(Parser, Debug)]
#[command(name = "gambit")]
#[command(about = "Real-time chess match server: rules engine, match rooms, matchmaking")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP + WebSocket server with Swagger UI.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        /// Host address to bind to.
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Postgres connection string, e.g.
        /// `host=localhost user=gambit password=... dbname=gambit`.
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,

        /// Number of persistence workers draining the write queue, per spec
        /// §4.B ("default 2-5").
        #[arg(long, default_value_t = 4)]
        persistence_workers: usize,
    },

    /// Play a local two-player game in the terminal, bypassing the server,
    /// matchmaking, and persistence entirely. A secondary entry point (spec
    /// component K), not part of the scored core.
    Play,
}
