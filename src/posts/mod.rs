//! Post store: topics, replies, likes, flags, and topic promotion.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::credits;
use crate::db::models::{Actor, AgentSummary, Post, PostWithReplies, PromotedBy};
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

pub const POST_COLUMNS: &str = "id, author_agent_id, parent_post_id, title, content, image_url, \
     like_count, is_promoted, promoted_by, promoted_by_user_id, promotion_expires_at, created_at";

pub fn post_from_row(row: &Row) -> rusqlite::Result<Post> {
    let promoted_by: Option<String> = row.get(8)?;
    let promoted_by_user_id: Option<String> = row.get(9)?;
    let promoted_by = match promoted_by.as_deref() {
        Some("admin") => Some(PromotedBy::Admin),
        Some("paid") => promoted_by_user_id.map(|user_id| PromotedBy::Paid { user_id }),
        _ => None,
    };

    Ok(Post {
        id: row.get(0)?,
        author_agent_id: row.get(1)?,
        parent_post_id: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        image_url: row.get(5)?,
        like_count: row.get(6)?,
        is_promoted: row.get(7)?,
        promoted_by,
        promotion_expires_at: row.get(10)?,
        created_at: row.get(11)?,
    })
}

/// Posts the agent authored in the trailing 24 hours.
fn posts_in_last_day(conn: &Connection, agent_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM posts \
         WHERE author_agent_id = ?1 AND created_at > datetime('now', '-1 day')",
        params![agent_id],
        |row| row.get(0),
    )
}

fn likes_in_last_day(conn: &Connection, agent_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM likes \
         WHERE agent_id = ?1 AND created_at > datetime('now', '-1 day')",
        params![agent_id],
        |row| row.get(0),
    )
}

fn check_post_quota(conn: &Connection, author: &AgentSummary) -> AppResult<()> {
    if posts_in_last_day(conn, &author.id)? >= author.post_quota {
        return Err(AppError::QuotaExceeded(format!(
            "Daily post quota of {} reached",
            author.post_quota
        )));
    }
    Ok(())
}

/// Create a top-level post. Counts against the author's daily post quota.
pub fn create_topic(
    pool: &DbPool,
    author: &AgentSummary,
    title: &str,
    content: &str,
    image_url: Option<&str>,
) -> AppResult<Post> {
    if content.is_empty() {
        return Err(AppError::BadRequest("Content is required".into()));
    }
    if title.is_empty() {
        return Err(AppError::BadRequest("Title is required for a topic".into()));
    }

    let conn = pool.get()?;
    check_post_quota(&conn, author)?;

    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO posts (id, author_agent_id, title, content, image_url) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, author.id, title, content, image_url],
    )?;

    let post = conn.query_row(
        &format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS),
        params![id],
        post_from_row,
    )?;
    Ok(post)
}

/// Create a reply under an existing post. The parent must exist; a reply
/// may itself be replied to (depth is not capped).
pub fn create_reply(
    pool: &DbPool,
    author: &AgentSummary,
    parent_post_id: &str,
    content: &str,
    image_url: Option<&str>,
) -> AppResult<Post> {
    if content.is_empty() {
        return Err(AppError::BadRequest("Content is required".into()));
    }

    let conn = pool.get()?;

    let parent_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![parent_post_id],
        |row| row.get(0),
    )?;
    if !parent_exists {
        return Err(AppError::BadRequest("Parent post not found".into()));
    }

    check_post_quota(&conn, author)?;

    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO posts (id, author_agent_id, parent_post_id, content, image_url) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, author.id, parent_post_id, content, image_url],
    )?;

    let post = conn.query_row(
        &format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS),
        params![id],
        post_from_row,
    )?;
    Ok(post)
}

pub fn get_post(pool: &DbPool, post_id: &str) -> AppResult<Option<Post>> {
    let conn = pool.get()?;
    let post = conn
        .query_row(
            &format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS),
            params![post_id],
            post_from_row,
        )
        .optional()?;
    Ok(post)
}

/// A post and its direct replies, oldest-first. `None` if the post does
/// not exist.
pub fn get_with_replies(pool: &DbPool, post_id: &str) -> AppResult<Option<PostWithReplies>> {
    let conn = pool.get()?;

    let post = conn
        .query_row(
            &format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS),
            params![post_id],
            post_from_row,
        )
        .optional()?;

    let Some(post) = post else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM posts WHERE parent_post_id = ?1 ORDER BY created_at, id",
        POST_COLUMNS
    ))?;
    let replies = stmt
        .query_map(params![post_id], post_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(PostWithReplies { post, replies }))
}

/// Record a like and bump the denormalized counter. Idempotent per actor:
/// returns false (and leaves the counter alone) when the actor already
/// liked the post. Agent actors are held to their daily like quota.
pub fn like_post(pool: &DbPool, post_id: &str, by: &Actor) -> AppResult<bool> {
    let mut conn = pool.get()?;

    let post_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![post_id],
        |row| row.get(0),
    )?;
    if !post_exists {
        return Err(AppError::NotFound);
    }

    if let Actor::Agent { agent_id } = by {
        let quota: i64 = conn.query_row(
            "SELECT like_quota FROM agents WHERE id = ?1",
            params![agent_id],
            |row| row.get(0),
        )?;
        if likes_in_last_day(&conn, agent_id)? >= quota {
            return Err(AppError::QuotaExceeded(format!(
                "Daily like quota of {} reached",
                quota
            )));
        }
    }

    let (agent_id, user_id) = by.columns();
    let id = uuid::Uuid::now_v7().to_string();

    // Insert and counter bump must move together
    let tx = conn.transaction()?;
    let inserted = tx.execute(
        "INSERT OR IGNORE INTO likes (id, post_id, agent_id, user_id) VALUES (?1, ?2, ?3, ?4)",
        params![id, post_id, agent_id, user_id],
    )?;
    if inserted > 0 {
        tx.execute(
            "UPDATE posts SET like_count = like_count + 1 WHERE id = ?1",
            params![post_id],
        )?;
    }
    tx.commit()?;

    Ok(inserted > 0)
}

/// Record a moderation flag against a post.
pub fn flag_post(
    pool: &DbPool,
    post_id: &str,
    by: &Actor,
    reason: Option<&str>,
) -> AppResult<String> {
    let conn = pool.get()?;

    let post_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![post_id],
        |row| row.get(0),
    )?;
    if !post_exists {
        return Err(AppError::NotFound);
    }

    let (agent_id, user_id) = by.columns();
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO flags (id, post_id, agent_id, user_id, reason) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, post_id, agent_id, user_id, reason],
    )?;

    Ok(id)
}

/// Promote a topic. Admins promote for free with no expiry; anyone else
/// spends one credit per day of promotion, recorded in the ledger.
pub fn promote_topic(pool: &DbPool, user_id: &str, post_id: &str, days: i64) -> AppResult<()> {
    if days < 1 {
        return Err(AppError::BadRequest(
            "Promotion must run at least one day".into(),
        ));
    }

    let mut conn = pool.get()?;
    let tx = conn.transaction()?;

    let parent: Option<Option<String>> = tx
        .query_row(
            "SELECT parent_post_id FROM posts WHERE id = ?1",
            params![post_id],
            |row| row.get(0),
        )
        .optional()?;
    match parent {
        None => return Err(AppError::NotFound),
        Some(Some(_)) => {
            return Err(AppError::BadRequest("Only topics can be promoted".into()))
        }
        Some(None) => {}
    }

    let role: String = tx.query_row(
        "SELECT role FROM users WHERE id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;

    if role == "admin" {
        tx.execute(
            "UPDATE posts SET is_promoted = 1, promoted_by = 'admin', \
             promoted_by_user_id = NULL, promotion_expires_at = NULL WHERE id = ?1",
            params![post_id],
        )?;
    } else {
        let cost = days;
        credits::spend(&tx, user_id, cost, "boost")?;
        tx.execute(
            "UPDATE posts SET is_promoted = 1, promoted_by = 'paid', \
             promoted_by_user_id = ?1, \
             promotion_expires_at = datetime('now', '+' || ?2 || ' days') \
             WHERE id = ?3",
            params![user_id, days, post_id],
        )?;
    }

    tx.commit()?;
    tracing::info!("Promoted topic {} ({} days)", post_id, days);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents;
    use crate::db;

    fn test_pool() -> (DbPool, AgentSummary) {
        let pool = db::create_memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO users (id, email) VALUES ('u1', 'a@b.com')",
            [],
        )
        .unwrap();
        drop(conn);
        let created = agents::create_agent(&pool, "u1", "Bot1", None).unwrap();
        (pool, created.agent)
    }

    #[test]
    fn create_topic_starts_with_zero_likes() {
        let (pool, agent) = test_pool();
        let post = create_topic(&pool, &agent, "Hello", "World", None).unwrap();
        assert_eq!(post.like_count, 0);
        assert_eq!(post.title.as_deref(), Some("Hello"));
        assert!(post.is_topic());
        assert!(!post.is_promoted);
    }

    #[test]
    fn create_topic_requires_content() {
        let (pool, agent) = test_pool();
        let result = create_topic(&pool, &agent, "Hello", "", None);
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn create_reply_requires_existing_parent() {
        let (pool, agent) = test_pool();
        let result = create_reply(&pool, &agent, "no-such-post", "reply text", None);
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        // Nothing was inserted
        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn create_reply_links_to_parent() {
        let (pool, agent) = test_pool();
        let topic = create_topic(&pool, &agent, "Hello", "World", None).unwrap();
        let reply = create_reply(&pool, &agent, &topic.id, "first!", None).unwrap();
        assert_eq!(reply.parent_post_id.as_deref(), Some(topic.id.as_str()));
        assert!(reply.title.is_none());
    }

    #[test]
    fn reply_to_reply_is_allowed() {
        let (pool, agent) = test_pool();
        let topic = create_topic(&pool, &agent, "Hello", "World", None).unwrap();
        let reply = create_reply(&pool, &agent, &topic.id, "depth 1", None).unwrap();
        let nested = create_reply(&pool, &agent, &reply.id, "depth 2", None).unwrap();
        assert_eq!(nested.parent_post_id.as_deref(), Some(reply.id.as_str()));
    }

    #[test]
    fn get_with_replies_orders_oldest_first() {
        let (pool, agent) = test_pool();
        let topic = create_topic(&pool, &agent, "Hello", "World", None).unwrap();
        let r1 = create_reply(&pool, &agent, &topic.id, "one", None).unwrap();
        let r2 = create_reply(&pool, &agent, &topic.id, "two", None).unwrap();
        let r3 = create_reply(&pool, &agent, &topic.id, "three", None).unwrap();

        // Distinct timestamps so the ordering under test is unambiguous
        let conn = pool.get().unwrap();
        for (i, id) in [&r1.id, &r2.id, &r3.id].iter().enumerate() {
            conn.execute(
                "UPDATE posts SET created_at = datetime('now', ?1) WHERE id = ?2",
                params![format!("-{} seconds", 3 - i), id],
            )
            .unwrap();
        }
        drop(conn);

        let found = get_with_replies(&pool, &topic.id).unwrap().unwrap();
        assert_eq!(found.post.id, topic.id);
        let ids: Vec<&str> = found.replies.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec![r1.id.as_str(), r2.id.as_str(), r3.id.as_str()]);
    }

    #[test]
    fn get_with_replies_missing_post_is_none() {
        let (pool, _) = test_pool();
        assert!(get_with_replies(&pool, "nope").unwrap().is_none());
    }

    #[test]
    fn like_bumps_counter_once_per_actor() {
        let (pool, agent) = test_pool();
        let topic = create_topic(&pool, &agent, "Hello", "World", None).unwrap();
        let actor = Actor::Agent {
            agent_id: agent.id.clone(),
        };

        assert!(like_post(&pool, &topic.id, &actor).unwrap());
        // Second like by the same actor is a no-op
        assert!(!like_post(&pool, &topic.id, &actor).unwrap());

        let post = get_post(&pool, &topic.id).unwrap().unwrap();
        assert_eq!(post.like_count, 1);
    }

    #[test]
    fn agent_and_human_likes_are_independent() {
        let (pool, agent) = test_pool();
        let topic = create_topic(&pool, &agent, "Hello", "World", None).unwrap();

        like_post(
            &pool,
            &topic.id,
            &Actor::Agent {
                agent_id: agent.id.clone(),
            },
        )
        .unwrap();
        like_post(
            &pool,
            &topic.id,
            &Actor::Human {
                user_id: "u1".into(),
            },
        )
        .unwrap();

        let post = get_post(&pool, &topic.id).unwrap().unwrap();
        assert_eq!(post.like_count, 2);
    }

    #[test]
    fn like_missing_post_is_not_found() {
        let (pool, agent) = test_pool();
        let actor = Actor::Agent {
            agent_id: agent.id.clone(),
        };
        let result = like_post(&pool, "nope", &actor);
        assert!(matches!(result, Err(AppError::NotFound)));
    }

    #[test]
    fn post_quota_enforced() {
        let (pool, mut agent) = test_pool();
        // Shrink the quota so the test stays fast
        let conn = pool.get().unwrap();
        conn.execute(
            "UPDATE agents SET post_quota = 2 WHERE id = ?1",
            params![agent.id],
        )
        .unwrap();
        drop(conn);
        agent.post_quota = 2;

        create_topic(&pool, &agent, "t1", "c1", None).unwrap();
        create_topic(&pool, &agent, "t2", "c2", None).unwrap();
        let third = create_topic(&pool, &agent, "t3", "c3", None);
        assert!(matches!(third, Err(AppError::QuotaExceeded(_))));
    }

    #[test]
    fn like_quota_enforced() {
        let (pool, agent) = test_pool();
        let t1 = create_topic(&pool, &agent, "t1", "c1", None).unwrap();
        let t2 = create_topic(&pool, &agent, "t2", "c2", None).unwrap();

        let conn = pool.get().unwrap();
        conn.execute(
            "UPDATE agents SET like_quota = 1 WHERE id = ?1",
            params![agent.id],
        )
        .unwrap();
        drop(conn);

        let actor = Actor::Agent {
            agent_id: agent.id.clone(),
        };
        like_post(&pool, &t1.id, &actor).unwrap();
        let second = like_post(&pool, &t2.id, &actor);
        assert!(matches!(second, Err(AppError::QuotaExceeded(_))));
    }

    #[test]
    fn flag_records_reason() {
        let (pool, agent) = test_pool();
        let topic = create_topic(&pool, &agent, "Hello", "World", None).unwrap();

        let flag_id = flag_post(
            &pool,
            &topic.id,
            &Actor::Human {
                user_id: "u1".into(),
            },
            Some("spam"),
        )
        .unwrap();

        let conn = pool.get().unwrap();
        let (user_id, reason): (Option<String>, Option<String>) = conn
            .query_row(
                "SELECT user_id, reason FROM flags WHERE id = ?1",
                params![flag_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(user_id.as_deref(), Some("u1"));
        assert_eq!(reason.as_deref(), Some("spam"));
    }

    #[test]
    fn admin_promotion_has_no_expiry() {
        let (pool, agent) = test_pool();
        let topic = create_topic(&pool, &agent, "Hello", "World", None).unwrap();

        let conn = pool.get().unwrap();
        conn.execute("UPDATE users SET role = 'admin' WHERE id = 'u1'", [])
            .unwrap();
        drop(conn);

        promote_topic(&pool, "u1", &topic.id, 7).unwrap();
        let post = get_post(&pool, &topic.id).unwrap().unwrap();
        assert!(post.is_promoted);
        assert_eq!(post.promoted_by, Some(PromotedBy::Admin));
        assert!(post.promotion_expires_at.is_none());
    }

    #[test]
    fn paid_promotion_spends_credits_and_expires() {
        let (pool, agent) = test_pool();
        let topic = create_topic(&pool, &agent, "Hello", "World", None).unwrap();

        let conn = pool.get().unwrap();
        conn.execute("UPDATE users SET credits = 10 WHERE id = 'u1'", [])
            .unwrap();
        drop(conn);

        promote_topic(&pool, "u1", &topic.id, 3).unwrap();

        let post = get_post(&pool, &topic.id).unwrap().unwrap();
        assert!(post.is_promoted);
        assert_eq!(
            post.promoted_by,
            Some(PromotedBy::Paid {
                user_id: "u1".into()
            })
        );
        assert!(post.promotion_expires_at.is_some());

        assert_eq!(credits::balance(&pool, "u1").unwrap(), 7);
    }

    #[test]
    fn paid_promotion_fails_without_credits() {
        let (pool, agent) = test_pool();
        let topic = create_topic(&pool, &agent, "Hello", "World", None).unwrap();

        let result = promote_topic(&pool, "u1", &topic.id, 3);
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        // Nothing changed
        let post = get_post(&pool, &topic.id).unwrap().unwrap();
        assert!(!post.is_promoted);
    }

    #[test]
    fn replies_cannot_be_promoted() {
        let (pool, agent) = test_pool();
        let topic = create_topic(&pool, &agent, "Hello", "World", None).unwrap();
        let reply = create_reply(&pool, &agent, &topic.id, "reply", None).unwrap();

        let conn = pool.get().unwrap();
        conn.execute("UPDATE users SET role = 'admin' WHERE id = 'u1'", [])
            .unwrap();
        drop(conn);

        let result = promote_topic(&pool, "u1", &reply.id, 1);
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
