//! Database initialization and schema migrations.

use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::{debug, info};

/// Open (creating if needed) the ledger database, configure pragmas and apply the schema.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .after_connect(|conn, _meta| Box::pin(async move { configure_connection(conn).await }))
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;

    run_migrations(&pool).await?;

    info!(path = %db_path, "Ledger database initialized");
    Ok(pool)
}

/// Apply `schema.sql`. Every statement is `IF NOT EXISTS`, so reruns are no-ops.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let statements: Vec<&str> = include_str!("schema.sql")
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let mut tx = pool.begin().await?;
    for statement in &statements {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    info!(statements = statements.len(), "Ledger schema applied");
    Ok(())
}

/// Per-connection pragmas: foreign keys, WAL, busy timeout.
async fn configure_connection(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    use sqlx::Row;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await?;

    // journal_mode returns the mode actually in effect
    let row = sqlx::query("PRAGMA journal_mode = WAL")
        .fetch_one(&mut *conn)
        .await?;
    let journal_mode: String = row.get(0);

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&mut *conn)
        .await?;

    debug!(journal_mode = %journal_mode, "SQLite connection configured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn fresh_pool() -> (SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("ledger.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (pool, temp_dir)
    }

    #[tokio::test]
    async fn test_init_db_creates_ledger_tables() {
        let (pool, _temp) = fresh_pool().await;

        for table in [
            "media",
            "media_ownership",
            "tip_events",
            "allocations",
            "artist_accounts",
            "payout_requests",
            "payout_reservations",
        ] {
            let found: Option<(String,)> =
                sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name=?")
                    .bind(table)
                    .fetch_optional(&pool)
                    .await
                    .expect("query failed");
            assert!(found.is_some(), "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let (pool, _temp) = fresh_pool().await;
        run_migrations(&pool)
            .await
            .expect("second migration run failed");
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let (pool, _temp) = fresh_pool().await;
        let result: (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .expect("query failed");
        assert_eq!(result.0, 1);
    }

    #[tokio::test]
    async fn test_tip_split_must_conserve_amount() {
        let (pool, _temp) = fresh_pool().await;
        let result = sqlx::query(
            r#"
            INSERT INTO tip_events
            (tip_id, media_id, bidder_id, amount, artist_pool, platform_fee, tipped_at, processed_at)
            VALUES ('t1', 'm1', 'b1', 1000, 700, 299, 0, 0)
            "#,
        )
        .execute(&pool)
        .await;
        assert!(result.is_err(), "pool + fee != amount must be rejected");
    }

    #[tokio::test]
    async fn test_balance_cannot_go_negative() {
        let (pool, _temp) = fresh_pool().await;
        let result = sqlx::query(
            "INSERT INTO artist_accounts (artist_id, balance, updated_at) VALUES ('a1', -1, 0)",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_single_open_payout_per_artist() {
        let (pool, _temp) = fresh_pool().await;
        let insert = |id: &'static str, status: &'static str| {
            sqlx::query(
                r#"
                INSERT INTO payout_requests
                (request_id, artist_id, amount_approved, method, method_details,
                 total_earned_at_request, status, requested_at)
                VALUES (?, 'a1', 100, 'paypal', '{}', 3300, ?, 0)
                "#,
            )
            .bind(id)
            .bind(status)
        };

        insert("r1", "processed").execute(&pool).await.unwrap();
        insert("r2", "submitted").execute(&pool).await.unwrap();
        assert!(insert("r3", "submitted").execute(&pool).await.is_err());
    }
}
