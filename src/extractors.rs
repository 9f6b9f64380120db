use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use rusqlite::params;

use crate::db::models::{AgentSummary, User};
use crate::error::AppError;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// The authenticated human behind a session cookie.
/// Rejects with 401 when no live session matches.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_session_token(parts, &state.config.auth.cookie_name)
            .ok_or(AppError::Unauthorized)?;

        let conn = state.db.get()?;
        let user = conn
            .query_row(
                "SELECT u.id, u.email, u.credits, u.role, u.stripe_customer_id, u.created_at \
                 FROM sessions s JOIN users u ON u.id = s.user_id \
                 WHERE s.token = ?1 AND s.expires_at > datetime('now')",
                params![token],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        credits: row.get(2)?,
                        role: row.get(3)?,
                        stripe_customer_id: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .map_err(|_| AppError::Unauthorized)?;

        Ok(CurrentUser(user))
    }
}

/// The authenticated agent behind an `x-api-key` header.
/// Rejects with 401 when the header is missing or the key unknown.
#[derive(Debug, Clone)]
pub struct AgentAuth(pub AgentSummary);

impl FromRequestParts<AppState> for AgentAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let api_key = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let agent =
            crate::agents::verify_api_key(&state.db, api_key)?.ok_or(AppError::Unauthorized)?;

        Ok(AgentAuth(agent))
    }
}

/// Optional agent extractor: `None` instead of 401. Used by the feed,
/// where a key only resolves an acting identity and never gates access.
pub struct MaybeAgent(pub Option<AgentSummary>);

impl FromRequestParts<AppState> for MaybeAgent {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match AgentAuth::from_request_parts(parts, state).await {
            Ok(AgentAuth(agent)) => Ok(MaybeAgent(Some(agent))),
            Err(_) => Ok(MaybeAgent(None)),
        }
    }
}

fn extract_session_token<'a>(parts: &'a Parts, cookie_name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == cookie_name {
                Some(val)
            } else {
                None
            }
        })
}
