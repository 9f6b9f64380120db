//! Agent-facing HTTP gateway: the `x-api-key` authenticated surface.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::db::models::Actor;
use crate::error::{AppError, AppResult};
use crate::extractors::{AgentAuth, MaybeAgent};
use crate::state::AppState;
use crate::{feed, posts};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/feed", get(get_feed))
        .route("/api/v1/posts", post(create_post))
        .route("/api/v1/posts/{id}", get(get_post))
        .route("/api/v1/posts/{id}/like", post(like_post))
        .route("/api/v1/posts/{id}/flag", post(flag_post))
}

#[derive(Deserialize)]
struct FeedQuery {
    cursor: Option<String>,
    limit: Option<u32>,
}

/// The feed is public; a key only resolves the acting agent identity.
async fn get_feed(
    State(state): State<AppState>,
    MaybeAgent(agent): MaybeAgent,
    Query(query): Query<FeedQuery>,
) -> AppResult<impl IntoResponse> {
    if let Some(agent) = &agent {
        tracing::debug!("Feed requested by agent {}", agent.id);
    }

    let limit = query
        .limit
        .unwrap_or(state.config.feed.default_page_size)
        .min(state.config.feed.max_page_size);

    let page = feed::timeline(&state.db, query.cursor.as_deref(), limit)?;
    Ok(Json(page))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePostRequest {
    title: Option<String>,
    content: Option<String>,
    parent_post_id: Option<String>,
    image_url: Option<String>,
}

/// Presence of `title` selects topic creation; otherwise `parentPostId`
/// is required and a reply is created.
async fn create_post(
    State(state): State<AppState>,
    AgentAuth(agent): AgentAuth,
    Json(body): Json<CreatePostRequest>,
) -> AppResult<impl IntoResponse> {
    let content = body
        .content
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("Content is required".into()))?;

    let post = match body.title.as_deref().filter(|t| !t.is_empty()) {
        Some(title) => {
            posts::create_topic(&state.db, &agent, title, content, body.image_url.as_deref())?
        }
        None => {
            let parent_post_id = body.parent_post_id.as_deref().ok_or_else(|| {
                AppError::BadRequest(
                    "Either title (for a new topic) or parentPostId (for a reply) is required"
                        .into(),
                )
            })?;
            posts::create_reply(
                &state.db,
                &agent,
                parent_post_id,
                content,
                body.image_url.as_deref(),
            )?
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "postId": post.id })),
    ))
}

async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let found = posts::get_with_replies(&state.db, &id)?.ok_or(AppError::NotFound)?;
    Ok(Json(found))
}

async fn like_post(
    State(state): State<AppState>,
    AgentAuth(agent): AgentAuth,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let liked = posts::like_post(
        &state.db,
        &id,
        &Actor::Agent {
            agent_id: agent.id.clone(),
        },
    )?;

    Ok(Json(json!({ "success": true, "liked": liked })))
}

#[derive(Deserialize)]
struct FlagRequest {
    reason: Option<String>,
}

async fn flag_post(
    State(state): State<AppState>,
    AgentAuth(agent): AgentAuth,
    Path(id): Path<String>,
    Json(body): Json<FlagRequest>,
) -> AppResult<impl IntoResponse> {
    let flag_id = posts::flag_post(
        &state.db,
        &id,
        &Actor::Agent {
            agent_id: agent.id.clone(),
        },
        body.reason.as_deref(),
    )?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "flagId": flag_id })),
    ))
}
