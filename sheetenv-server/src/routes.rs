//! HTTP route handlers for the environment API.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde::Deserialize;
use sheetenv::core::types::{Action, EpisodeState, StepResponse};
use sheetenv::registry::CommandSpec;

use crate::state::AppState;

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/reset", post(reset))
        .route("/step", post(step))
        .route("/state", get(get_state))
        .route("/close", post(close))
        .route("/commands", get(list_commands))
        .with_state(state)
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

fn internal(err: anyhow::Error) -> (StatusCode, String) {
    tracing::error!(err = %format!("{err:#}"), "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

async fn health() -> &'static str {
    "ok"
}

/// POST /reset - start a fresh episode.
async fn reset(State(state): State<AppState>) -> ApiResult<StepResponse> {
    let observation = state.with_env(|env| env.reset()).await.map_err(internal)?;
    Ok(Json(StepResponse::from(observation)))
}

/// Body of POST /step: either `{"action": {...}}` or the action itself.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StepRequest {
    Wrapped { action: Action },
    Bare(Action),
}

impl StepRequest {
    fn into_action(self) -> Action {
        match self {
            StepRequest::Wrapped { action } | StepRequest::Bare(action) => action,
        }
    }
}

/// POST /step - execute one action. Command failures are still 200 responses;
/// they are reported through `observation.success`.
async fn step(
    State(state): State<AppState>,
    Json(request): Json<StepRequest>,
) -> ApiResult<StepResponse> {
    let action = request.into_action();
    let observation = state
        .with_env(move |env| env.step(&action))
        .await
        .map_err(internal)?;
    Ok(Json(StepResponse::from(observation)))
}

/// GET /state - episode id and step count.
async fn get_state(State(state): State<AppState>) -> ApiResult<EpisodeState> {
    let episode = state.with_env(|env| env.state()).await.map_err(internal)?;
    Ok(Json(episode))
}

/// POST /close - release the engine. Always succeeds.
async fn close(State(state): State<AppState>) -> ApiResult<StepResponse> {
    let observation = state.with_env(|env| env.close()).await.map_err(internal)?;
    Ok(Json(StepResponse::from(observation)))
}

/// GET /commands - the registry's parameter contracts.
async fn list_commands(State(state): State<AppState>) -> ApiResult<Vec<CommandSpec>> {
    let specs = state
        .with_env(|env| env.registry().specs().cloned().collect::<Vec<_>>())
        .await
        .map_err(internal)?;
    Ok(Json(specs))
}
