//! Append-only credit ledger. Every balance change writes a
//! `credit_transactions` row; `users.credits` mirrors the running total.

use rusqlite::{params, Connection};

use crate::db::models::CreditTransaction;
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

/// Spend credits inside an existing transaction. The guarded UPDATE keeps
/// the balance from going negative under concurrent spends.
pub fn spend(conn: &Connection, user_id: &str, amount: i64, kind: &str) -> AppResult<()> {
    if amount < 1 {
        return Err(AppError::BadRequest("Amount must be positive".into()));
    }

    let updated = conn.execute(
        "UPDATE users SET credits = credits - ?1 WHERE id = ?2 AND credits >= ?1",
        params![amount, user_id],
    )?;
    if updated == 0 {
        return Err(AppError::BadRequest("Insufficient credits".into()));
    }

    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO credit_transactions (id, user_id, delta, kind) VALUES (?1, ?2, ?3, ?4)",
        params![id, user_id, -amount, kind],
    )?;
    Ok(())
}

/// Credit a purchase to a user's balance.
pub fn purchase(
    pool: &DbPool,
    user_id: &str,
    amount: i64,
    stripe_id: Option<&str>,
) -> AppResult<()> {
    if amount < 1 {
        return Err(AppError::BadRequest("Amount must be positive".into()));
    }

    let mut conn = pool.get()?;
    let tx = conn.transaction()?;

    let updated = tx.execute(
        "UPDATE users SET credits = credits + ?1 WHERE id = ?2",
        params![amount, user_id],
    )?;
    if updated == 0 {
        return Err(AppError::NotFound);
    }

    let id = uuid::Uuid::now_v7().to_string();
    tx.execute(
        "INSERT INTO credit_transactions (id, user_id, delta, kind, stripe_id) \
         VALUES (?1, ?2, ?3, 'purchase', ?4)",
        params![id, user_id, amount, stripe_id],
    )?;
    tx.commit()?;
    Ok(())
}

pub fn balance(pool: &DbPool, user_id: &str) -> AppResult<i64> {
    let conn = pool.get()?;
    let credits = conn.query_row(
        "SELECT credits FROM users WHERE id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(credits)
}

/// Ledger entries for a user, newest first.
pub fn history(pool: &DbPool, user_id: &str) -> AppResult<Vec<CreditTransaction>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, user_id, delta, kind, stripe_id, created_at \
         FROM credit_transactions WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
    )?;
    let entries = stmt
        .query_map(params![user_id], |row| {
            Ok(CreditTransaction {
                id: row.get(0)?,
                user_id: row.get(1)?,
                delta: row.get(2)?,
                kind: row.get(3)?,
                stripe_id: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_pool() -> DbPool {
        let pool = db::create_memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO users (id, email) VALUES ('u1', 'a@b.com')",
            [],
        )
        .unwrap();
        pool
    }

    #[test]
    fn purchase_increases_balance_and_writes_ledger() {
        let pool = test_pool();
        purchase(&pool, "u1", 25, Some("pi_123")).unwrap();

        assert_eq!(balance(&pool, "u1").unwrap(), 25);
        let entries = history(&pool, "u1").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].delta, 25);
        assert_eq!(entries[0].kind, "purchase");
        assert_eq!(entries[0].stripe_id.as_deref(), Some("pi_123"));
    }

    #[test]
    fn spend_decreases_balance_with_negative_delta() {
        let pool = test_pool();
        purchase(&pool, "u1", 10, None).unwrap();

        let conn = pool.get().unwrap();
        spend(&conn, "u1", 4, "boost").unwrap();
        drop(conn);

        assert_eq!(balance(&pool, "u1").unwrap(), 6);
        let entries = history(&pool, "u1").unwrap();
        assert_eq!(entries.len(), 2);
        let boost = entries.iter().find(|e| e.kind == "boost").unwrap();
        assert_eq!(boost.delta, -4);
    }

    #[test]
    fn spend_fails_when_balance_too_low() {
        let pool = test_pool();
        purchase(&pool, "u1", 3, None).unwrap();

        let conn = pool.get().unwrap();
        let result = spend(&conn, "u1", 5, "boost");
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        drop(conn);

        // Balance untouched, no ledger entry written
        assert_eq!(balance(&pool, "u1").unwrap(), 3);
        assert_eq!(history(&pool, "u1").unwrap().len(), 1);
    }

    #[test]
    fn purchase_for_unknown_user_is_not_found() {
        let pool = test_pool();
        let result = purchase(&pool, "ghost", 5, None);
        assert!(matches!(result, Err(AppError::NotFound)));
    }
}
