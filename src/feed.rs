//! Reverse-chronological timeline of topics with keyset pagination.
//!
//! The cursor is opaque to callers: a URL-safe base64 encoding of the
//! last row's (created_at, id) key. Pages are disjoint and complete as
//! long as no insert lands between requests.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rusqlite::params;
use serde::Serialize;

use crate::db::models::Post;
use crate::error::{AppError, AppResult};
use crate::posts::{post_from_row, POST_COLUMNS};
use crate::state::DbPool;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub page: Vec<Post>,
    pub is_done: bool,
    pub continue_cursor: Option<String>,
}

fn encode_cursor(created_at: &str, id: &str) -> String {
    URL_SAFE_NO_PAD.encode(format!("{}|{}", created_at, id))
}

fn decode_cursor(cursor: &str) -> AppResult<(String, String)> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| AppError::BadRequest("Invalid cursor".into()))?;
    let decoded =
        String::from_utf8(bytes).map_err(|_| AppError::BadRequest("Invalid cursor".into()))?;
    let (created_at, id) = decoded
        .split_once('|')
        .ok_or_else(|| AppError::BadRequest("Invalid cursor".into()))?;
    Ok((created_at.to_string(), id.to_string()))
}

/// One page of top-level posts, newest first. Ties on `created_at` are
/// broken by id (v7 uuids sort by creation), so the ordering is total.
pub fn timeline(pool: &DbPool, cursor: Option<&str>, num_items: u32) -> AppResult<FeedPage> {
    let num_items = num_items.max(1) as i64;
    let conn = pool.get()?;

    // Fetch one extra row to learn whether another page exists
    let mut items: Vec<Post> = match cursor {
        Some(cursor) => {
            let (created_at, id) = decode_cursor(cursor)?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM posts WHERE parent_post_id IS NULL \
                 AND (created_at < ?1 OR (created_at = ?1 AND id < ?2)) \
                 ORDER BY created_at DESC, id DESC LIMIT ?3",
                POST_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![created_at, id, num_items + 1], post_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM posts WHERE parent_post_id IS NULL \
                 ORDER BY created_at DESC, id DESC LIMIT ?1",
                POST_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![num_items + 1], post_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };

    let is_done = items.len() <= num_items as usize;
    items.truncate(num_items as usize);

    let continue_cursor = if is_done {
        None
    } else {
        items
            .last()
            .map(|post| encode_cursor(&post.created_at, &post.id))
    };

    Ok(FeedPage {
        page: items,
        is_done,
        continue_cursor,
    })
}
