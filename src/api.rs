//! REST API for the fourline server.
//!
//! The REST surface is deliberately small — real-time play happens over
//! the WebSocket. It covers:
//! - Creating sessions (human-vs-human and human-vs-AI)
//! - Admin introspection of live sessions
//! - Admin force-terminate, which enters the same per-session lock as
//!   every other mutation
//!
//! Documented with OpenAPI/Swagger via `utoipa`; Swagger UI is served
//! at `/swagger-ui/`. Account, profile, and game-history endpoints live
//! in an external service and are not part of this server.

use actix::Addr;
use actix_web::{web, HttpResponse, Responder};
use serde_json::json;
use utoipa::OpenApi;

use crate::session::*;
use crate::types::*;
use crate::ws::{broadcast_room_event, RoomBroadcaster};

/// Shared application state.
///
/// This struct is wrapped in `web::Data` (which uses `Arc` internally)
/// and shared across all HTTP and WebSocket handlers. The registry
/// carries its own locking; handlers never hold a registry lock and a
/// session lock at the same time.
pub struct AppState {
    /// The central session registry.
    pub registry: SessionRegistry,
}

// ---------------------------------------------------------------------------
// OpenAPI definition
// ---------------------------------------------------------------------------

/// OpenAPI documentation for the fourline API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "fourline — Connect Four server",
        version = "0.3.0",
        description = "REST endpoints for creating Connect Four sessions and \
            inspecting live games. Gameplay itself runs over the WebSocket \
            endpoint at /ws.",
        license(name = "MIT")
    ),
    paths(create_game, create_ai_game, list_active_games, terminate_game),
    components(schemas(
        CreateGameResponse,
        CreateAiGameRequest,
        CreateAiGameResponse,
        ActiveGamesResponse,
        SessionOverview,
        SeatOverview,
        GameStateJson,
        PlayerPublic,
        SpectatorPublic,
        MoveRecord,
        Score,
        Difficulty,
        ErrorResponse,
    )),
    tags(
        (name = "games", description = "Session creation"),
        (name = "admin", description = "Live session introspection and control"),
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// API Handlers
// ---------------------------------------------------------------------------

/// Create a new human-vs-human game.
///
/// Returns the session id that both players (and any spectators) use
/// with the WebSocket `join_game` event.
#[utoipa::path(
    post,
    path = "/create_game",
    tag = "games",
    responses(
        (status = 201, description = "Game created successfully", body = CreateGameResponse),
    )
)]
pub async fn create_game(data: web::Data<AppState>) -> impl Responder {
    let game_id = data.registry.create(None);

    log::info!("Created new game: {}", game_id);

    HttpResponse::Created().json(CreateGameResponse {
        game_id: game_id.to_string(),
    })
}

/// Create a new game against the AI.
///
/// The AI is seated as player 2; the joining human takes seat 1.
/// Difficulty defaults to medium when the body omits it.
#[utoipa::path(
    post,
    path = "/create_ai_game",
    tag = "games",
    request_body = CreateAiGameRequest,
    responses(
        (status = 201, description = "AI game created successfully", body = CreateAiGameResponse),
    )
)]
pub async fn create_ai_game(
    body: web::Json<CreateAiGameRequest>,
    data: web::Data<AppState>,
) -> impl Responder {
    let difficulty = body.difficulty;
    let game_id = data.registry.create(Some(difficulty));

    log::info!("Created new AI game: {} ({})", game_id, difficulty);

    HttpResponse::Created().json(CreateAiGameResponse {
        game_id: game_id.to_string(),
        difficulty,
    })
}

/// List all live sessions.
///
/// Admin introspection: one summary per session with seats, turn,
/// progress, and move count.
#[utoipa::path(
    get,
    path = "/api/admin/active-games",
    tag = "admin",
    responses(
        (status = 200, description = "Live session overviews", body = ActiveGamesResponse),
    )
)]
pub async fn list_active_games(data: web::Data<AppState>) -> impl Responder {
    let active_games = data.registry.overviews();
    let count = active_games.len();

    HttpResponse::Ok().json(ActiveGamesResponse {
        active_games,
        count,
    })
}

/// Force-terminate a live session.
///
/// The termination runs through the session's own lock — the same
/// single-writer path as moves and disconnects — then the room is told
/// via `game_terminated` and the registry entry is dropped.
#[utoipa::path(
    delete,
    path = "/api/admin/active-games/{game_id}",
    tag = "admin",
    params(
        ("game_id" = String, Path, description = "Unique session identifier (UUID)")
    ),
    responses(
        (status = 200, description = "Session terminated"),
        (status = 404, description = "Session not found", body = ErrorResponse),
    )
)]
pub async fn terminate_game(
    path: web::Path<String>,
    data: web::Data<AppState>,
    broadcaster: web::Data<Addr<RoomBroadcaster>>,
) -> impl Responder {
    let game_id_str = path.into_inner();
    let game_id = match uuid::Uuid::parse_str(&game_id_str) {
        Ok(id) => id,
        Err(_) => {
            return HttpResponse::BadRequest().json(ErrorResponse {
                error: format!("Invalid game_id: {}", game_id_str),
            });
        }
    };

    match data.registry.get(&game_id) {
        Some(handle) => {
            {
                let mut session = handle.lock().unwrap();
                session.terminate();
            }

            broadcast_room_event(
                &broadcaster,
                game_id,
                "game_terminated",
                &json!({ "message": "This game was terminated by an administrator" }),
            );
            data.registry.remove(&game_id);

            log::info!("Terminated game: {}", game_id);
            HttpResponse::Ok().json(json!({
                "success": true,
                "message": format!("Game {} terminated", game_id),
            }))
        }
        None => HttpResponse::NotFound().json(ErrorResponse {
            error: format!("Game {} not found", game_id),
        }),
    }
}

/// Configures all REST routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/create_game", web::post().to(create_game))
        .route("/create_ai_game", web::post().to(create_ai_game))
        .service(
            web::scope("/api/admin")
                .route("/active-games", web::get().to(list_active_games))
                .route("/active-games/{game_id}", web::delete().to(terminate_game)),
        );
}
