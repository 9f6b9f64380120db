//! Magic-link login endpoints.

use axum::extract::{Query, State};
use axum::http::header;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{email, magic_link, session};
use crate::auth::magic_link::VerifyOutcome;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/request", post(request_login))
        .route("/auth/verify", get(verify_login))
        .route("/auth/logout", post(logout))
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
}

/// Issue a login token and email the magic link. Delivery problems are
/// logged but never surfaced: the response is the same either way, so
/// the endpoint leaks nothing about which addresses exist.
async fn request_login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let address = body.email.trim().to_lowercase();
    if address.is_empty() || !address.contains('@') {
        return Err(AppError::BadRequest("A valid email is required".into()));
    }

    let token = magic_link::issue_token(
        &state.db,
        &address,
        state.config.auth.login_token_minutes,
    )?;

    let link = format!(
        "{}/auth/verify?token={}",
        state.config.public_base_url(),
        token
    );
    email::send_magic_link(&state.config.email, &address, &link).await;

    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize)]
struct VerifyQuery {
    token: String,
}

/// Consume a login token, resolve or create the user, and start a
/// session delivered as an HttpOnly cookie.
async fn verify_login(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> AppResult<impl IntoResponse> {
    let outcome = magic_link::verify_token(&state.db, &query.token)?;

    let (user_id, address) = match outcome {
        VerifyOutcome::Verified { user_id, email } => (user_id, email),
        VerifyOutcome::Expired => {
            return Err(AppError::BadRequest("Login link expired".into()));
        }
        VerifyOutcome::Invalid => return Err(AppError::Unauthorized),
    };

    let token = session::create_session(&state.db, &user_id, state.config.auth.session_hours)?;
    let cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        state.config.auth.cookie_name,
        token,
        state.config.auth.session_hours * 3600
    );

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "success": true, "userId": user_id, "email": address })),
    ))
}

async fn logout(State(state): State<AppState>, parts: Parts) -> AppResult<impl IntoResponse> {
    if let Some(token) = session_cookie(&parts, &state.config.auth.cookie_name) {
        session::delete_session(&state.db, &token)?;
    }

    let cookie = format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0",
        state.config.auth.cookie_name
    );
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "success": true })),
    ))
}

fn session_cookie(parts: &Parts, cookie_name: &str) -> Option<String> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let (key, val) = cookie.split_once('=')?;
            if key.trim() == cookie_name {
                Some(val.trim().to_string())
            } else {
                None
            }
        })
}
