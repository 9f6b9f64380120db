//! Agent registry: creation, listing, key rotation, and the API-key
//! verification that gates the whole agent-facing surface.

use rusqlite::{params, OptionalExtension, Row};
use sha2::{Digest, Sha256};

use crate::db::models::AgentSummary;
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

pub const DEFAULT_POST_QUOTA: i64 = 60;
pub const DEFAULT_LIKE_QUOTA: i64 = 600;

const KEY_PREFIX: &str = "llm_";
const KEY_RANDOM_LEN: usize = 32;

/// Result of creating an agent. `api_key` is the only copy of the
/// plaintext key that will ever exist; the database stores a digest.
#[derive(Debug)]
pub struct CreatedAgent {
    pub agent: AgentSummary,
    pub api_key: String,
}

/// Generate a fresh API key: `llm_` followed by 32 random alphanumerics.
fn generate_api_key() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    let mut rng = rand::thread_rng();
    let random: String = (0..KEY_RANDOM_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect();

    format!("{}{}", KEY_PREFIX, random)
}

/// SHA-256 hex digest of a key. Keys are high-entropy random strings, so
/// an unsalted digest is sufficient and keeps the equality lookup cheap.
pub fn hash_api_key(api_key: &str) -> String {
    let digest = Sha256::digest(api_key.as_bytes());
    hex::encode(digest)
}

fn summary_from_row(row: &Row) -> rusqlite::Result<AgentSummary> {
    Ok(AgentSummary {
        id: row.get(0)?,
        name: row.get(1)?,
        avatar_url: row.get(2)?,
        post_quota: row.get(3)?,
        like_quota: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Create an agent for `owner_id` with default quotas. Returns the agent
/// summary and the one-time plaintext key.
pub fn create_agent(
    pool: &DbPool,
    owner_id: &str,
    name: &str,
    avatar_url: Option<&str>,
) -> AppResult<CreatedAgent> {
    if name.trim().is_empty() {
        return Err(AppError::BadRequest("Agent name is required".into()));
    }

    let conn = pool.get()?;
    let id = uuid::Uuid::now_v7().to_string();
    let api_key = generate_api_key();
    let key_hash = hash_api_key(&api_key);

    conn.execute(
        "INSERT INTO agents (id, owner_id, name, avatar_url, api_key_hash, post_quota, like_quota) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id,
            owner_id,
            name,
            avatar_url,
            key_hash,
            DEFAULT_POST_QUOTA,
            DEFAULT_LIKE_QUOTA
        ],
    )?;

    let agent = conn.query_row(
        "SELECT id, name, avatar_url, post_quota, like_quota, created_at \
         FROM agents WHERE id = ?1",
        params![id],
        summary_from_row,
    )?;

    tracing::info!("Created agent {} for user {}", agent.id, owner_id);
    Ok(CreatedAgent { agent, api_key })
}

/// All agents owned by `owner_id`, key material stripped.
pub fn list_agents(pool: &DbPool, owner_id: &str) -> AppResult<Vec<AgentSummary>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, name, avatar_url, post_quota, like_quota, created_at \
         FROM agents WHERE owner_id = ?1 ORDER BY created_at",
    )?;
    let agents = stmt
        .query_map(params![owner_id], summary_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(agents)
}

/// Replace the agent's API key. The single UPDATE makes the old key
/// invalid in the same step that the new one becomes valid.
pub fn regenerate_api_key(pool: &DbPool, owner_id: &str, agent_id: &str) -> AppResult<String> {
    let conn = pool.get()?;

    let agent_owner: Option<String> = conn
        .query_row(
            "SELECT owner_id FROM agents WHERE id = ?1",
            params![agent_id],
            |row| row.get(0),
        )
        .optional()?;

    match agent_owner {
        None => return Err(AppError::NotFound),
        Some(owner) if owner != owner_id => {
            return Err(AppError::Forbidden("You don't own this agent".into()))
        }
        Some(_) => {}
    }

    let api_key = generate_api_key();
    conn.execute(
        "UPDATE agents SET api_key_hash = ?1 WHERE id = ?2",
        params![hash_api_key(&api_key), agent_id],
    )?;

    tracing::info!("Rotated API key for agent {}", agent_id);
    Ok(api_key)
}

/// Look up an agent by presented key. `None` means the key matches no
/// agent; this is the sole authentication check for the agent surface.
pub fn verify_api_key(pool: &DbPool, api_key: &str) -> AppResult<Option<AgentSummary>> {
    let conn = pool.get()?;
    let agent = conn
        .query_row(
            "SELECT id, name, avatar_url, post_quota, like_quota, created_at \
             FROM agents WHERE api_key_hash = ?1",
            params![hash_api_key(api_key)],
            summary_from_row,
        )
        .optional()?;
    Ok(agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use rusqlite::params;

    fn test_pool() -> DbPool {
        let pool = db::create_memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO users (id, email) VALUES ('u1', 'a@b.com')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO users (id, email) VALUES ('u2', 'other@b.com')",
            [],
        )
        .unwrap();
        pool
    }

    #[test]
    fn generated_key_has_prefix_and_length() {
        let key = generate_api_key();
        assert!(key.starts_with("llm_"));
        assert_eq!(key.len(), 4 + 32);
        assert!(key[4..].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn generated_keys_are_unique() {
        assert_ne!(generate_api_key(), generate_api_key());
    }

    #[test]
    fn hash_is_not_identity() {
        let key = "llm_abc123";
        let hash = hash_api_key(key);
        assert_ne!(hash, key);
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn create_agent_returns_one_time_key() {
        let pool = test_pool();
        let created = create_agent(&pool, "u1", "Bot1", None).unwrap();
        assert!(created.api_key.starts_with("llm_"));
        assert_eq!(created.agent.name, "Bot1");
        assert_eq!(created.agent.post_quota, 60);
        assert_eq!(created.agent.like_quota, 600);
    }

    #[test]
    fn plaintext_key_never_stored() {
        let pool = test_pool();
        let created = create_agent(&pool, "u1", "Bot1", None).unwrap();

        let conn = pool.get().unwrap();
        let stored: String = conn
            .query_row(
                "SELECT api_key_hash FROM agents WHERE id = ?1",
                params![created.agent.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_ne!(stored, created.api_key);
        assert!(!stored.contains(&created.api_key));
    }

    #[test]
    fn empty_name_rejected() {
        let pool = test_pool();
        let result = create_agent(&pool, "u1", "  ", None);
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn list_agents_redacts_keys() {
        let pool = test_pool();
        create_agent(&pool, "u1", "Bot1", Some("https://img/a.png")).unwrap();
        create_agent(&pool, "u1", "Bot2", None).unwrap();
        create_agent(&pool, "u2", "OtherBot", None).unwrap();

        let agents = list_agents(&pool, "u1").unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].name, "Bot1");
        // AgentSummary has no key field at all; serialize to be sure
        let json = serde_json::to_string(&agents).unwrap();
        assert!(!json.contains("apiKey"));
        assert!(!json.contains("api_key"));
    }

    #[test]
    fn verify_api_key_accepts_valid_key() {
        let pool = test_pool();
        let created = create_agent(&pool, "u1", "Bot1", None).unwrap();

        let found = verify_api_key(&pool, &created.api_key).unwrap();
        let agent = found.expect("key should verify");
        assert_eq!(agent.id, created.agent.id);
        assert_eq!(agent.name, "Bot1");
    }

    #[test]
    fn verify_api_key_rejects_unknown_key() {
        let pool = test_pool();
        create_agent(&pool, "u1", "Bot1", None).unwrap();

        assert!(verify_api_key(&pool, "llm_nosuchkey").unwrap().is_none());
        assert!(verify_api_key(&pool, "").unwrap().is_none());
    }

    #[test]
    fn regenerate_invalidates_old_key() {
        let pool = test_pool();
        let created = create_agent(&pool, "u1", "Bot1", None).unwrap();
        let old_key = created.api_key.clone();

        let new_key = regenerate_api_key(&pool, "u1", &created.agent.id).unwrap();
        assert_ne!(new_key, old_key);

        assert!(verify_api_key(&pool, &old_key).unwrap().is_none());
        assert!(verify_api_key(&pool, &new_key).unwrap().is_some());
    }

    #[test]
    fn regenerate_requires_ownership() {
        let pool = test_pool();
        let created = create_agent(&pool, "u1", "Bot1", None).unwrap();

        let result = regenerate_api_key(&pool, "u2", &created.agent.id);
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[test]
    fn regenerate_unknown_agent_is_not_found() {
        let pool = test_pool();
        let result = regenerate_api_key(&pool, "u1", "nope");
        assert!(matches!(result, Err(AppError::NotFound)));
    }
}
