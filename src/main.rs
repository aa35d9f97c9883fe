//! # fourline — Real-time Connect Four server
//!
//! fourline hosts live Connect Four matches over a REST + WebSocket API:
//! human-vs-human sessions with spectators, human-vs-AI sessions with
//! three difficulty levels, scoped message relay, and per-session scores
//! that survive game resets.
//!
//! ## Features
//!
//! - **Authoritative sessions**: Every match lives behind its own lock;
//!   joins, moves, resets, disconnects, and admin terminations are
//!   serialized per session, so concurrent clients can never corrupt a
//!   board, turn, or score.
//!
//! - **WebSocket protocol**: JSON events at `/ws` — join a game, drop a
//!   piece, reset, relay room-, server-, or private-scoped actions, and
//!   send private messages. The server pushes the canonical `game_state`
//!   plus a `move_made` delta after every accepted move.
//!
//! - **AI opponent**: easy (random), medium (win/block/center), and hard
//!   (alpha-beta minimax). AI thinking runs off the session lock and its
//!   result is dropped if the game was reset or terminated meanwhile.
//!
//! - **Swagger/OpenAPI documentation**: auto-generated docs for the REST
//!   surface at `/swagger-ui/`.
//!
//! ## Usage
//!
//! ```bash
//! # Start the server (default: http://0.0.0.0:8080)
//! fourline serve
//!
//! # Start the server on a custom port
//! fourline serve --port 3000
//! ```
//!
//! ## Endpoints
//!
//! | Method | Path                               | Description                   |
//! |--------|------------------------------------|-------------------------------|
//! | POST   | `/create_game`                     | Create a human-vs-human game  |
//! | POST   | `/create_ai_game`                  | Create a game against the AI  |
//! | GET    | `/api/admin/active-games`          | List live sessions            |
//! | DELETE | `/api/admin/active-games/{id}`     | Force-terminate a session     |
//! | GET    | `/ws`                              | WebSocket endpoint            |
//! | GET    | `/swagger-ui/`                     | Swagger UI documentation      |

pub mod ai;
pub mod api;
pub mod rules;
pub mod session;
pub mod types;
pub mod ws;

use actix::Actor;
use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use clap::{Parser, Subcommand};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{ApiDoc, AppState};
use crate::session::SessionRegistry;
use crate::ws::RoomBroadcaster;

/// fourline — a real-time Connect Four server.
///
/// Provides a WebSocket protocol for live play and a small REST API
/// with Swagger documentation for session management.
#[derive(Parser, Debug)]
#[command(name = "fourline")]
#[command(about = "Real-time Connect Four server with AI opponents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the REST + WebSocket server with Swagger UI.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        /// Host address to bind to.
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
    },
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host } => run_server(&host, port).await,
    }
}

/// Starts the HTTP + WebSocket server with all API routes and Swagger UI.
async fn run_server(host: &str, port: u16) -> std::io::Result<()> {
    let openapi = ApiDoc::openapi();

    let app_state = web::Data::new(AppState {
        registry: SessionRegistry::new(),
    });

    // Start the central WebSocket fan-out actor
    let broadcaster = RoomBroadcaster::new().start();
    let broadcaster_data = web::Data::new(broadcaster);

    log::info!("Starting fourline server on {}:{}", host, port);
    log::info!("API base URL: http://{}:{}/", host, port);
    log::info!("Swagger UI available at http://{}:{}/swagger-ui/", host, port);
    log::info!("WebSocket endpoint: ws://{}:{}/ws", host, port);

    HttpServer::new(move || {
        // Configure CORS to allow all origins (for development/agent access)
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(app_state.clone())
            .app_data(broadcaster_data.clone())
            .configure(api::configure_routes)
            .route("/ws", web::get().to(ws::ws_connect))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone()),
            )
    })
    .bind((host, port))?
    .run()
    .await
}
