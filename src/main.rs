//! # gambit — real-time chess match server
//!
//! The server-side core of a two-player real-time chess platform: a pure
//! rules engine, a durable match store, per-match hub actors coordinating
//! moves/clocks/disconnects, and a periodic matchmaking pairing service,
//! fronted by a thin `actix-web` HTTP + WebSocket edge.
//!
//! ## Usage
//!
//! ```bash
//! # Start the server (requires DATABASE_URL or --database-url)
//! gambit serve --database-url "host=localhost user=gambit dbname=gambit"
//!
//! # Start on a custom port
//! gambit serve --port 3000 --database-url "..."
//!
//! # Play a local two-player game in the terminal, no server involved
//! gambit play
//! ```
//!
//! ## HTTP endpoints
//!
//! | Method | Path                         | Description                        |
//! |--------|------------------------------|-------------------------------------|
//! | POST   | `/getMoves`                  | Legal moves for a piece on a FEN    |
//! | POST   | `/joinQueue`                 | Join/leave the matchmaking queue    |
//! | GET    | `/listenformatch`            | Block until paired                  |
//! | GET    | `/getHighestEloMatch`        | Highest-rated live match, if any    |
//! | GET    | `/matchroom/{matchID}/ws`    | Match-room WebSocket upgrade        |
//! | GET    | `/swagger-ui/`               | Swagger UI documentation            |

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod hub;
pub mod matchmaking;
pub mod model;
pub mod persistence;
pub mod rules;
pub mod socket;
pub mod terminal;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use clap::Parser;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::ApiDoc;
use crate::config::{Cli, Commands};
use crate::context::AppContext;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host, database_url, persistence_workers } => {
            run_server(&host, port, &database_url, persistence_workers).await
        }
        Commands::Play => {
            terminal::run_terminal_game();
            Ok(())
        }
    }
}

/// Starts the HTTP + WebSocket server with every route from spec §6 and
/// Swagger UI. Per spec §9 "Global mutable state", the process-wide
/// [`AppContext`] (persistence queue, hub manager, matchmaking service) is
/// assembled once here and shared across every worker thread as a single
/// `Arc`, never re-bound.
async fn run_server(host: &str, port: u16, database_url: &str, persistence_workers: usize) -> std::io::Result<()> {
    let openapi = ApiDoc::openapi();
    let ctx = AppContext::new(database_url, persistence_workers).await;
    let ctx_data = web::Data::new(ctx.clone());
    let hub_manager_data = web::Data::new(ctx.hub_manager.clone());

    log::info!("Starting gambit server on {host}:{port}");
    log::info!("Swagger UI available at http://{host}:{port}/swagger-ui/");

    HttpServer::new(move || {
        let cors = Cors::default().allow_any_origin().allow_any_method().allow_any_header().max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(ctx_data.clone())
            .app_data(hub_manager_data.clone())
            .configure(api::configure_routes)
            .route("/matchroom/{matchID}/ws", web::get().to(socket::match_room_ws))
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()))
    })
    .bind((host, port))?
    .run()
    .await
}
