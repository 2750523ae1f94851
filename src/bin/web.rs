//! Web server: JSON API over the tournament service, backed by the in-memory store.
//! Run with: cargo run --bin web
//! Listens on 0.0.0.0:8080 by default. Override with env: HOST, PORT, DEFAULT_ARENA,
//! TIE_BREAK (random | deterministic), PAIRING_ATTEMPTS.
//! The venue is taken from the `X-Arena-Id` header, or DEFAULT_ARENA when absent.

use actix_web::{
    get, post,
    http::StatusCode,
    web::{Bytes, Data, Json, Path, Query},
    App, HttpRequest, HttpResponse, HttpServer, Responder, ResponseError,
};
use arena_chaves::{
    AppConfig, GroupId, MatchId, MemoryStore, Phase, RosterEntry, Scope, Score, TournamentError,
    TournamentFormat, TournamentId, TournamentService,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

type Service = Data<TournamentService<MemoryStore>>;

#[derive(Debug, Error)]
enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Tournament(#[from] TournamentError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
    details: Option<String>,
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let (status, message) = match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Tournament(TournamentError::Validation(_)) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Tournament(TournamentError::NotFound { .. }) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Tournament(TournamentError::Conflict(_)) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::Tournament(TournamentError::Repository(e)) => {
                log::error!("Storage failure: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
            }
        };
        HttpResponse::build(status).json(ErrorResponse {
            error: message,
            code: status.as_u16(),
            details: Some(self.to_string()),
        })
    }
}

type ApiResult = Result<HttpResponse, ApiError>;

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    service: &'static str,
}

#[derive(Deserialize)]
struct CreateTournamentBody {
    name: String,
    #[serde(default)]
    format: TournamentFormat,
    /// Team format only.
    group_count: Option<usize>,
}

#[derive(Deserialize)]
struct AddPlayerBody {
    name: String,
    #[serde(default)]
    cabeca_de_chave: bool,
    equipe: Option<String>,
}

#[derive(Deserialize)]
struct GenerateBracketBody {
    #[serde(default = "default_qualifiers")]
    qualifiers_per_group: usize,
}

fn default_qualifiers() -> usize {
    2
}

/// Sets as `[[games_a, games_b], ...]`.
#[derive(Deserialize)]
struct ResultBody {
    sets: Vec<(u32, u32)>,
}

#[derive(Deserialize)]
struct BracketQuery {
    phase: Option<Phase>,
}

/// Path segment: tournament id (e.g. /api/tournaments/{id})
#[derive(Deserialize)]
struct TournamentPath {
    id: TournamentId,
}

/// Path segments: tournament id and group id.
#[derive(Deserialize)]
struct GroupPath {
    id: TournamentId,
    group_id: GroupId,
}

/// Path segments: tournament id and match id.
#[derive(Deserialize)]
struct MatchPath {
    id: TournamentId,
    match_id: MatchId,
}

/// Venue of the request: `X-Arena-Id` header, else the configured default.
fn scope_of(req: &HttpRequest, config: &AppConfig, tournament: TournamentId) -> Result<Scope, ApiError> {
    let arena = match req.headers().get("X-Arena-Id") {
        Some(v) => v
            .to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| ApiError::BadRequest("X-Arena-Id is not a valid id".into()))?,
        None => config.default_arena,
    };
    Ok(Scope::new(arena, tournament))
}

#[get("/api/health")]
async fn api_health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        ok: true,
        service: "arena-chaves",
    })
}

#[post("/api/tournaments")]
async fn api_create_tournament(
    svc: Service,
    config: Data<AppConfig>,
    req: HttpRequest,
    body: Json<CreateTournamentBody>,
) -> ApiResult {
    let scope = scope_of(&req, &config, Uuid::nil())?;
    let t = svc
        .create_tournament(scope.arena_id, &body.name, body.format, body.group_count)
        .await?;
    Ok(HttpResponse::Ok().json(t))
}

#[get("/api/tournaments/{id}")]
async fn api_get_tournament(svc: Service, config: Data<AppConfig>, req: HttpRequest, path: Path<TournamentPath>) -> ApiResult {
    let scope = scope_of(&req, &config, path.id)?;
    Ok(HttpResponse::Ok().json(svc.get_tournament(scope).await?))
}

#[post("/api/tournaments/{id}/registrations/open")]
async fn api_open_registrations(svc: Service, config: Data<AppConfig>, req: HttpRequest, path: Path<TournamentPath>) -> ApiResult {
    let scope = scope_of(&req, &config, path.id)?;
    Ok(HttpResponse::Ok().json(svc.open_registrations(scope).await?))
}

#[post("/api/tournaments/{id}/registrations/close")]
async fn api_close_registrations(svc: Service, config: Data<AppConfig>, req: HttpRequest, path: Path<TournamentPath>) -> ApiResult {
    let scope = scope_of(&req, &config, path.id)?;
    Ok(HttpResponse::Ok().json(svc.close_registrations(scope).await?))
}

#[get("/api/tournaments/{id}/players")]
async fn api_list_players(svc: Service, config: Data<AppConfig>, req: HttpRequest, path: Path<TournamentPath>) -> ApiResult {
    let scope = scope_of(&req, &config, path.id)?;
    Ok(HttpResponse::Ok().json(svc.list_players(scope).await?))
}

#[post("/api/tournaments/{id}/players")]
async fn api_add_player(
    svc: Service,
    config: Data<AppConfig>,
    req: HttpRequest,
    path: Path<TournamentPath>,
    body: Json<AddPlayerBody>,
) -> ApiResult {
    let scope = scope_of(&req, &config, path.id)?;
    let body = body.into_inner();
    let player = svc
        .register_player(
            scope,
            RosterEntry {
                nome: body.name,
                cabeca_de_chave: body.cabeca_de_chave,
                equipe: body.equipe,
            },
        )
        .await?;
    Ok(HttpResponse::Ok().json(player))
}

/// CSV body with a `nome,cabeca,equipe` header.
#[post("/api/tournaments/{id}/players/import")]
async fn api_import_roster(
    svc: Service,
    config: Data<AppConfig>,
    req: HttpRequest,
    path: Path<TournamentPath>,
    body: Bytes,
) -> ApiResult {
    let scope = scope_of(&req, &config, path.id)?;
    Ok(HttpResponse::Ok().json(svc.import_roster(scope, &body).await?))
}

#[post("/api/tournaments/{id}/groups")]
async fn api_form_groups(svc: Service, config: Data<AppConfig>, req: HttpRequest, path: Path<TournamentPath>) -> ApiResult {
    let scope = scope_of(&req, &config, path.id)?;
    Ok(HttpResponse::Ok().json(svc.form_units_and_groups(scope).await?))
}

#[get("/api/tournaments/{id}/groups")]
async fn api_list_groups(svc: Service, config: Data<AppConfig>, req: HttpRequest, path: Path<TournamentPath>) -> ApiResult {
    let scope = scope_of(&req, &config, path.id)?;
    Ok(HttpResponse::Ok().json(svc.list_groups(scope).await?))
}

#[get("/api/tournaments/{id}/groups/{group_id}/standings")]
async fn api_standings(svc: Service, config: Data<AppConfig>, req: HttpRequest, path: Path<GroupPath>) -> ApiResult {
    let scope = scope_of(&req, &config, path.id)?;
    Ok(HttpResponse::Ok().json(svc.get_standings(scope, path.group_id).await?))
}

#[get("/api/tournaments/{id}/units")]
async fn api_list_units(svc: Service, config: Data<AppConfig>, req: HttpRequest, path: Path<TournamentPath>) -> ApiResult {
    let scope = scope_of(&req, &config, path.id)?;
    Ok(HttpResponse::Ok().json(svc.list_units(scope).await?))
}

#[get("/api/tournaments/{id}/matches")]
async fn api_list_matches(svc: Service, config: Data<AppConfig>, req: HttpRequest, path: Path<TournamentPath>) -> ApiResult {
    let scope = scope_of(&req, &config, path.id)?;
    Ok(HttpResponse::Ok().json(svc.list_matches(scope, None).await?))
}

#[post("/api/tournaments/{id}/matches/{match_id}/result")]
async fn api_record_result(
    svc: Service,
    config: Data<AppConfig>,
    req: HttpRequest,
    path: Path<MatchPath>,
    body: Json<ResultBody>,
) -> ApiResult {
    let scope = scope_of(&req, &config, path.id)?;
    let outcome = svc
        .record_match_result(scope, path.match_id, Score::from_pairs(&body.sets))
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[post("/api/tournaments/{id}/bracket")]
async fn api_generate_bracket(
    svc: Service,
    config: Data<AppConfig>,
    req: HttpRequest,
    path: Path<TournamentPath>,
    body: Option<Json<GenerateBracketBody>>,
) -> ApiResult {
    let scope = scope_of(&req, &config, path.id)?;
    let qualifiers = body.map_or_else(default_qualifiers, |b| b.qualifiers_per_group);
    Ok(HttpResponse::Ok().json(svc.generate_elimination_bracket(scope, qualifiers).await?))
}

#[get("/api/tournaments/{id}/bracket")]
async fn api_get_bracket(
    svc: Service,
    config: Data<AppConfig>,
    req: HttpRequest,
    path: Path<TournamentPath>,
    query: Query<BracketQuery>,
) -> ApiResult {
    let scope = scope_of(&req, &config, path.id)?;
    Ok(HttpResponse::Ok().json(svc.get_bracket(scope, query.phase).await?))
}

/// Drop the elimination bracket, keeping the group stage.
#[post("/api/tournaments/{id}/bracket/cancel")]
async fn api_cancel_elimination(svc: Service, config: Data<AppConfig>, req: HttpRequest, path: Path<TournamentPath>) -> ApiResult {
    let scope = scope_of(&req, &config, path.id)?;
    svc.cancel_elimination(scope).await?;
    Ok(HttpResponse::Ok().json(svc.get_tournament(scope).await?))
}

/// Drop groups, units and matches; back to closed registrations.
#[post("/api/tournaments/{id}/groups/cancel")]
async fn api_cancel_bracket(svc: Service, config: Data<AppConfig>, req: HttpRequest, path: Path<TournamentPath>) -> ApiResult {
    let scope = scope_of(&req, &config, path.id)?;
    svc.cancel_bracket(scope).await?;
    Ok(HttpResponse::Ok().json(svc.get_tournament(scope).await?))
}

#[get("/api/tournaments/{id}/classification")]
async fn api_classification(svc: Service, config: Data<AppConfig>, req: HttpRequest, path: Path<TournamentPath>) -> ApiResult {
    let scope = scope_of(&req, &config, path.id)?;
    Ok(HttpResponse::Ok().json(svc.get_final_classification(scope).await?))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env();
    let bind = (config.host.clone(), config.port);
    log::info!("Starting server at http://{}:{}", bind.0, bind.1);
    log::info!("Tie-break policy: {:?}", config.engine.tie_break);

    let service = Data::new(TournamentService::new(
        Arc::new(MemoryStore::new()),
        config.engine.clone(),
    ));
    let config = Data::new(config);

    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(config.clone())
            .service(api_health)
            .service(api_create_tournament)
            .service(api_get_tournament)
            .service(api_open_registrations)
            .service(api_close_registrations)
            .service(api_list_players)
            .service(api_import_roster)
            .service(api_add_player)
            .service(api_cancel_bracket)
            .service(api_form_groups)
            .service(api_list_groups)
            .service(api_standings)
            .service(api_list_units)
            .service(api_list_matches)
            .service(api_record_result)
            .service(api_cancel_elimination)
            .service(api_generate_bracket)
            .service(api_get_bracket)
            .service(api_classification)
    })
    .bind(bind)?
    .run()
    .await
}
