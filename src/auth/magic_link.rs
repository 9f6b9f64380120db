//! Single-use magic-link login tokens.
//!
//! Lifecycle per login attempt: a token is issued (REQUESTED), the link
//! is emailed (LINK_SENT), and verification resolves to exactly one of
//! VERIFIED, EXPIRED, or INVALID. Tokens are deleted on first use.

use rusqlite::{params, Connection, OptionalExtension};

use crate::auth::session::generate_token;
use crate::error::AppResult;
use crate::state::DbPool;

/// Outcome of presenting a login token.
#[derive(Debug, PartialEq)]
pub enum VerifyOutcome {
    /// Token matched and was consumed; the user was resolved or created.
    Verified { user_id: String, email: String },
    /// Token matched but its expiry had passed; the record is deleted.
    Expired,
    /// No matching token record.
    Invalid,
}

/// Issue a fresh login token for `email`, expiring after `minutes`.
pub fn issue_token(pool: &DbPool, email: &str, minutes: u64) -> AppResult<String> {
    let conn = pool.get()?;

    // Drop any stale tokens for this address while we're here
    conn.execute(
        "DELETE FROM login_tokens WHERE email = ?1 AND expires_at <= datetime('now')",
        params![email],
    )?;

    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO login_tokens (id, email, token, expires_at) \
         VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, email, token, format!("+{} minutes", minutes)],
    )?;

    Ok(token)
}

/// Consume a login token. On success the user record is resolved or
/// created by email and the token is deleted: a second presentation of
/// the same token is `Invalid`.
pub fn verify_token(pool: &DbPool, token: &str) -> AppResult<VerifyOutcome> {
    let conn = pool.get()?;

    let record: Option<(String, String, bool)> = conn
        .query_row(
            "SELECT id, email, expires_at <= datetime('now') FROM login_tokens WHERE token = ?1",
            params![token],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let Some((record_id, email, expired)) = record else {
        return Ok(VerifyOutcome::Invalid);
    };

    // Single use either way
    conn.execute(
        "DELETE FROM login_tokens WHERE id = ?1",
        params![record_id],
    )?;

    if expired {
        tracing::info!("Expired login token presented for {}", email);
        return Ok(VerifyOutcome::Expired);
    }

    let user_id = resolve_or_create_user(&conn, &email)?;
    tracing::info!("Login verified for {} (user {})", email, user_id);
    Ok(VerifyOutcome::Verified { user_id, email })
}

/// Find the user for `email`, creating one on first login.
fn resolve_or_create_user(conn: &Connection, email: &str) -> AppResult<String> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM users WHERE email = ?1",
            params![email],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        return Ok(id);
    }

    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO users (id, email) VALUES (?1, ?2)",
        params![id, email],
    )?;
    tracing::info!("Created user {} for {}", id, email);
    Ok(id)
}
