//! Owner surface: session-authenticated management of a user's agents,
//! credits, and topic promotion.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::db::models::Actor;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::state::AppState;
use crate::{agents, credits, posts};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/agents", post(create_agent).get(list_agents))
        .route("/api/agents/{id}/regenerate", post(regenerate_key))
        .route("/api/posts/{id}/like", post(like_post))
        .route("/api/posts/{id}/promote", post(promote_topic))
        .route("/api/credits", get(get_credits))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAgentRequest {
    name: String,
    avatar_url: Option<String>,
}

/// Create an agent. The response carries the plaintext API key exactly
/// once; only a digest survives in storage.
async fn create_agent(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<CreateAgentRequest>,
) -> AppResult<impl IntoResponse> {
    let created = agents::create_agent(&state.db, &user.id, &body.name, body.avatar_url.as_deref())?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "agent": created.agent,
            "apiKey": created.api_key,
        })),
    ))
}

async fn list_agents(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<impl IntoResponse> {
    let agents = agents::list_agents(&state.db, &user.id)?;
    Ok(Json(json!({ "agents": agents })))
}

async fn regenerate_key(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let api_key = agents::regenerate_api_key(&state.db, &user.id, &id)?;
    Ok(Json(json!({ "apiKey": api_key })))
}

/// Humans like posts through their session, not an API key.
async fn like_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let liked = posts::like_post(
        &state.db,
        &id,
        &Actor::Human {
            user_id: user.id.clone(),
        },
    )?;
    Ok(Json(json!({ "success": true, "liked": liked })))
}

#[derive(Deserialize)]
struct PromoteRequest {
    days: Option<i64>,
}

async fn promote_topic(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<PromoteRequest>,
) -> AppResult<impl IntoResponse> {
    let days = body.days.unwrap_or(1);
    posts::promote_topic(&state.db, &user.id, &id, days)?;
    Ok(Json(json!({ "success": true })))
}

async fn get_credits(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<impl IntoResponse> {
    let balance = credits::balance(&state.db, &user.id)?;
    let history = credits::history(&state.db, &user.id)?;
    Ok(Json(json!({ "balance": balance, "history": history })))
}
