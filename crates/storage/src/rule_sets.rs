use bankfeed_core::{AccountId, RuleSet};
use sqlx::SqliteConnection;

use crate::error::{StorageError, StorageResult};

pub async fn insert_rule_set(conn: &mut SqliteConnection, rule_set: &RuleSet) -> StorageResult<i64> {
    let result = sqlx::query("INSERT INTO rule_sets (name, note, category_id) VALUES (?, ?, ?)")
        .bind(&rule_set.name)
        .bind(&rule_set.note)
        .bind(rule_set.category_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| StorageError::classify(e, "rule set"))?;

    let id = result.last_insert_rowid();
    insert_owned_rows(conn, id, rule_set).await?;
    Ok(id)
}

/// Overwrites the rule set row and replaces its fragments and account
/// scopes wholesale.
pub async fn replace_rule_set(conn: &mut SqliteConnection, id: i64, rule_set: &RuleSet) -> StorageResult<()> {
    let result = sqlx::query("UPDATE rule_sets SET name = ?, note = ?, category_id = ? WHERE id = ?")
        .bind(&rule_set.name)
        .bind(&rule_set.note)
        .bind(rule_set.category_id)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| StorageError::classify(e, "rule set"))?;

    if result.rows_affected() == 0 {
        return Err(StorageError::NotFound {
            entity: "rule set",
            id,
        });
    }

    delete_owned_rows(conn, id).await?;
    insert_owned_rows(conn, id, rule_set).await
}

async fn insert_owned_rows(conn: &mut SqliteConnection, id: i64, rule_set: &RuleSet) -> StorageResult<()> {
    for (position, fragment) in rule_set.fragments.iter().enumerate() {
        sqlx::query("INSERT INTO rule_set_fragments (rule_set_id, position, fragment) VALUES (?, ?, ?)")
            .bind(id)
            .bind(position as i64)
            .bind(fragment)
            .execute(&mut *conn)
            .await?;
    }

    for account_id in &rule_set.account_ids {
        sqlx::query("INSERT INTO rule_set_accounts (rule_set_id, account_id) VALUES (?, ?)")
            .bind(id)
            .bind(account_id.0)
            .execute(&mut *conn)
            .await
            .map_err(|e| StorageError::classify(e, "rule set account"))?;
    }

    Ok(())
}

async fn delete_owned_rows(conn: &mut SqliteConnection, id: i64) -> StorageResult<()> {
    sqlx::query("DELETE FROM rule_set_fragments WHERE rule_set_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM rule_set_accounts WHERE rule_set_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn rule_set_exists(conn: &mut SqliteConnection, id: i64) -> StorageResult<bool> {
    let row = sqlx::query_as::<_, (i64,)>("SELECT id FROM rule_sets WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

pub async fn get_rule_set(conn: &mut SqliteConnection, id: i64) -> StorageResult<Option<RuleSet>> {
    let row = sqlx::query_as::<_, (i64, String, Option<String>, Option<i64>)>(
        "SELECT id, name, note, category_id FROM rule_sets WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(r) => Ok(Some(load_owned_rows(conn, r).await?)),
        None => Ok(None),
    }
}

pub async fn list_rule_sets(conn: &mut SqliteConnection) -> StorageResult<Vec<RuleSet>> {
    let rows = sqlx::query_as::<_, (i64, String, Option<String>, Option<i64>)>(
        "SELECT id, name, note, category_id FROM rule_sets ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut rule_sets = Vec::with_capacity(rows.len());
    for r in rows {
        rule_sets.push(load_owned_rows(conn, r).await?);
    }
    Ok(rule_sets)
}

async fn load_owned_rows(
    conn: &mut SqliteConnection,
    (id, name, note, category_id): (i64, String, Option<String>, Option<i64>),
) -> StorageResult<RuleSet> {
    let fragments = sqlx::query_as::<_, (String,)>(
        "SELECT fragment FROM rule_set_fragments WHERE rule_set_id = ? ORDER BY position, id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|(f,)| f)
    .collect();

    let account_ids = sqlx::query_as::<_, (i64,)>(
        "SELECT account_id FROM rule_set_accounts WHERE rule_set_id = ? ORDER BY account_id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|(a,)| AccountId(a))
    .collect();

    Ok(RuleSet {
        id: Some(id),
        name,
        note,
        category_id,
        fragments,
        account_ids,
    })
}

/// Removes a rule set in dependency order: transaction references are
/// nulled first, then fragments, account scopes and the row itself.
/// Returns how many transactions lost their reference.
pub async fn delete_rule_set(conn: &mut SqliteConnection, id: i64) -> StorageResult<u64> {
    let detached = sqlx::query("UPDATE transactions SET rule_set_id = NULL WHERE rule_set_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    delete_owned_rows(conn, id).await?;

    let result = sqlx::query("DELETE FROM rule_sets WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| StorageError::classify(e, "rule set"))?;

    if result.rows_affected() == 0 {
        return Err(StorageError::NotFound {
            entity: "rule set",
            id,
        });
    }
    Ok(detached)
}
