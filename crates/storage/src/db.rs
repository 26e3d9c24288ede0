use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    // Pragmas live on the connect options so recycled connections keep them.
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(5000))
        .pragma("cache_size", "-32000");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;
    tracing::debug!("database ready at {}", path.display());

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bank_contacts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            bank_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            pin TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (url, bank_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            account_number TEXT,
            iban TEXT,
            bank_contact_id INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (bank_contact_id) REFERENCES bank_contacts(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rule_sets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            note TEXT,
            category_id INTEGER,
            FOREIGN KEY (category_id) REFERENCES categories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rule_set_fragments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            rule_set_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            fragment TEXT NOT NULL,
            FOREIGN KEY (rule_set_id) REFERENCES rule_sets(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rule_set_accounts (
            rule_set_id INTEGER NOT NULL,
            account_id INTEGER NOT NULL,
            PRIMARY KEY (rule_set_id, account_id),
            FOREIGN KEY (rule_set_id) REFERENCES rule_sets(id),
            FOREIGN KEY (account_id) REFERENCES accounts(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL,
            booking_date TEXT NOT NULL,
            value_date TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            text TEXT NOT NULL,
            notes TEXT,
            payee TEXT,
            payee_account_number TEXT,
            entry_text TEXT,
            bank_transaction_code TEXT,
            sequence_number TEXT,
            iban TEXT,
            bic TEXT,
            creditor_id TEXT,
            mandate_reference TEXT,
            end_to_end_reference TEXT,
            alt_originator TEXT,
            alt_beneficiary TEXT,
            remittance_info TEXT,
            category_id INTEGER,
            rule_set_id INTEGER,
            processed INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (account_id) REFERENCES accounts(id),
            FOREIGN KEY (category_id) REFERENCES categories(id),
            FOREIGN KEY (rule_set_id) REFERENCES rule_sets(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_account_value_date ON transactions (account_id, value_date)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS balances (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL,
            balance_date TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            kind TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (account_id) REFERENCES accounts(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_db_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        let pool = create_db(&path).await.unwrap();
        pool.close().await;

        // Second open re-runs the IF NOT EXISTS migrations against the same file.
        let pool = create_db(&path).await.unwrap();
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('transactions', 'rule_sets', 'balances')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("ledger.db")).await.unwrap();

        let result = sqlx::query(
            "INSERT INTO rule_set_fragments (rule_set_id, position, fragment) VALUES (999, 0, 'x')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }
}
