use bankfeed_core::{Account, AccountId, BankContact};
use sqlx::SqliteConnection;

use crate::error::{StorageError, StorageResult};

type AccountRow = (i64, String, Option<String>, Option<String>, Option<i64>);

fn account_from_row(r: AccountRow) -> Account {
    Account {
        id: Some(AccountId(r.0)),
        name: r.1,
        account_number: r.2,
        iban: r.3,
        bank_contact_id: r.4,
    }
}

pub async fn insert_bank_contact(
    conn: &mut SqliteConnection,
    contact: &BankContact,
) -> StorageResult<i64> {
    let result = sqlx::query(
        "INSERT INTO bank_contacts (name, url, bank_id, user_id, pin) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(contact.name.trim())
    .bind(contact.url.trim())
    .bind(contact.bank_id.trim())
    .bind(contact.user_id.trim())
    .bind(&contact.pin)
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::classify(e, "bank contact"))?;

    Ok(result.last_insert_rowid())
}

pub async fn get_bank_contact(
    conn: &mut SqliteConnection,
    id: i64,
) -> StorageResult<Option<BankContact>> {
    let row = sqlx::query_as::<_, (i64, String, String, String, String, Option<String>)>(
        "SELECT id, name, url, bank_id, user_id, pin FROM bank_contacts WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|r| BankContact {
        id: Some(r.0),
        name: r.1,
        url: r.2,
        bank_id: r.3,
        user_id: r.4,
        pin: r.5,
    }))
}

/// Forgets the stored PIN after the bank rejected it.
pub async fn clear_bank_contact_pin(conn: &mut SqliteConnection, id: i64) -> StorageResult<()> {
    let result = sqlx::query("UPDATE bank_contacts SET pin = NULL WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::NotFound {
            entity: "bank contact",
            id,
        });
    }
    Ok(())
}

pub async fn insert_account(conn: &mut SqliteConnection, account: &Account) -> StorageResult<AccountId> {
    let result = sqlx::query(
        "INSERT INTO accounts (name, account_number, iban, bank_contact_id) VALUES (?, ?, ?, ?)",
    )
    .bind(account.name.trim())
    .bind(&account.account_number)
    .bind(&account.iban)
    .bind(account.bank_contact_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::classify(e, "account"))?;

    Ok(AccountId(result.last_insert_rowid()))
}

pub async fn get_account(conn: &mut SqliteConnection, id: AccountId) -> StorageResult<Option<Account>> {
    let row = sqlx::query_as::<_, AccountRow>(
        "SELECT id, name, account_number, iban, bank_contact_id FROM accounts WHERE id = ?",
    )
    .bind(id.0)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(account_from_row))
}

pub async fn get_all_accounts(conn: &mut SqliteConnection) -> StorageResult<Vec<Account>> {
    let rows = sqlx::query_as::<_, AccountRow>(
        "SELECT id, name, account_number, iban, bank_contact_id FROM accounts ORDER BY name, id",
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(account_from_row).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_db;

    fn contact() -> BankContact {
        BankContact {
            id: None,
            name: "Sparkasse".to_string(),
            url: "https://banking.example/fints".to_string(),
            bank_id: "12030000".to_string(),
            user_id: "max".to_string(),
            pin: Some("12345".to_string()),
        }
    }

    #[tokio::test]
    async fn contact_pin_can_be_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("t.db")).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let id = insert_bank_contact(&mut conn, &contact()).await.unwrap();
        assert_eq!(
            get_bank_contact(&mut conn, id).await.unwrap().unwrap().pin.as_deref(),
            Some("12345")
        );

        clear_bank_contact_pin(&mut conn, id).await.unwrap();
        assert!(get_bank_contact(&mut conn, id).await.unwrap().unwrap().pin.is_none());
    }

    #[tokio::test]
    async fn duplicate_contact_login_is_exists() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("t.db")).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        insert_bank_contact(&mut conn, &contact()).await.unwrap();
        let err = insert_bank_contact(&mut conn, &contact()).await.unwrap_err();
        assert_eq!(err.cause(), bankfeed_core::ErrorCause::Exists);
    }

    #[tokio::test]
    async fn clearing_unknown_contact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("t.db")).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let err = clear_bank_contact_pin(&mut conn, 42).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { id: 42, .. }));
    }

    #[tokio::test]
    async fn account_with_missing_contact_is_constrain() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("t.db")).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let mut account = Account::new("Giro");
        account.bank_contact_id = Some(77);
        let err = insert_account(&mut conn, &account).await.unwrap_err();
        assert_eq!(err.cause(), bankfeed_core::ErrorCause::Constrain);
    }

    #[tokio::test]
    async fn accounts_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("t.db")).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let contact_id = insert_bank_contact(&mut conn, &contact()).await.unwrap();
        let mut account = Account::new("Giro");
        account.account_number = Some("1234567".to_string());
        account.bank_contact_id = Some(contact_id);
        let id = insert_account(&mut conn, &account).await.unwrap();

        let stored = get_account(&mut conn, id).await.unwrap().unwrap();
        assert_eq!(stored.account_number.as_deref(), Some("1234567"));
        assert_eq!(stored.bank_contact_id, Some(contact_id));
        assert_eq!(get_all_accounts(&mut conn).await.unwrap().len(), 1);
    }
}
