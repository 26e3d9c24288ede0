use bankfeed_core::{AccountId, Balance, BalanceKind, Money};
use chrono::NaiveDate;
use sqlx::SqliteConnection;

use crate::error::{StorageError, StorageResult};

pub async fn insert_balance(conn: &mut SqliteConnection, balance: &Balance) -> StorageResult<i64> {
    let result = sqlx::query(
        "INSERT INTO balances (account_id, balance_date, amount_cents, kind) VALUES (?, ?, ?, ?)",
    )
    .bind(balance.account_id.0)
    .bind(balance.date)
    .bind(balance.amount.to_cents())
    .bind(balance.kind.as_str())
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::classify(e, "balance"))?;

    Ok(result.last_insert_rowid())
}

/// Most recent balance by date, newest insert winning ties.
pub async fn latest_balance(
    conn: &mut SqliteConnection,
    account_id: AccountId,
) -> StorageResult<Option<Balance>> {
    let row = sqlx::query_as::<_, (i64, i64, NaiveDate, i64, String)>(
        "SELECT id, account_id, balance_date, amount_cents, kind FROM balances WHERE account_id = ? ORDER BY balance_date DESC, id DESC LIMIT 1",
    )
    .bind(account_id.0)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|r| {
        let kind = r
            .4
            .parse::<BalanceKind>()
            .map_err(|e| StorageError::Database(sqlx::Error::Decode(e.into())))?;
        Ok(Balance {
            id: Some(r.0),
            account_id: AccountId(r.1),
            date: r.2,
            amount: Money::from_cents(r.3),
            kind,
        })
    })
    .transpose()
}
