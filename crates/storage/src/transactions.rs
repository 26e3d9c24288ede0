use bankfeed_core::{AccountId, DateRange, Money, RawTransaction, Remittance, Transaction, TransactionEdit};
use chrono::NaiveDate;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::error::{StorageError, StorageResult};

const SELECT_COLUMNS: &str = "SELECT id, account_id, booking_date, value_date, amount_cents, text, notes, \
     payee, payee_account_number, entry_text, bank_transaction_code, sequence_number, \
     iban, bic, creditor_id, mandate_reference, end_to_end_reference, alt_originator, \
     alt_beneficiary, remittance_info, category_id, rule_set_id, processed FROM transactions";

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    account_id: i64,
    booking_date: NaiveDate,
    value_date: NaiveDate,
    amount_cents: i64,
    text: String,
    notes: Option<String>,
    payee: Option<String>,
    payee_account_number: Option<String>,
    entry_text: Option<String>,
    bank_transaction_code: Option<String>,
    sequence_number: Option<String>,
    iban: Option<String>,
    bic: Option<String>,
    creditor_id: Option<String>,
    mandate_reference: Option<String>,
    end_to_end_reference: Option<String>,
    alt_originator: Option<String>,
    alt_beneficiary: Option<String>,
    remittance_info: Option<String>,
    category_id: Option<i64>,
    rule_set_id: Option<i64>,
    processed: bool,
}

impl From<TransactionRow> for Transaction {
    fn from(r: TransactionRow) -> Self {
        Transaction {
            id: r.id,
            account_id: AccountId(r.account_id),
            booking_date: r.booking_date,
            value_date: r.value_date,
            amount: Money::from_cents(r.amount_cents),
            text: r.text,
            notes: r.notes,
            payee: r.payee,
            payee_account_number: r.payee_account_number,
            entry_text: r.entry_text,
            bank_transaction_code: r.bank_transaction_code,
            sequence_number: r.sequence_number,
            remittance: Remittance {
                iban: r.iban,
                bic: r.bic,
                creditor_id: r.creditor_id,
                mandate_reference: r.mandate_reference,
                end_to_end_reference: r.end_to_end_reference,
                alt_originator: r.alt_originator,
                alt_beneficiary: r.alt_beneficiary,
                remittance_info: r.remittance_info,
            },
            category_id: r.category_id,
            rule_set_id: r.rule_set_id,
            processed: r.processed,
        }
    }
}

/// Ad hoc selection over stored transactions. Empty/`None` fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub ids: Vec<i64>,
    pub account_ids: Vec<AccountId>,
    pub value_dates: Option<DateRange>,
    /// Case-insensitive containment in the narrative text.
    pub text_contains: Option<String>,
    pub processed: Option<bool>,
    pub rule_set_id: Option<i64>,
}

pub async fn insert_transaction(
    conn: &mut SqliteConnection,
    account_id: AccountId,
    tx: &RawTransaction,
) -> StorageResult<i64> {
    let r = &tx.remittance;
    let result = sqlx::query(
        r#"
        INSERT INTO transactions (
            account_id, booking_date, value_date, amount_cents, text, notes, payee,
            payee_account_number, entry_text, bank_transaction_code, sequence_number,
            iban, bic, creditor_id, mandate_reference, end_to_end_reference,
            alt_originator, alt_beneficiary, remittance_info, processed
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(account_id.0)
    .bind(tx.booking_date)
    .bind(tx.value_date)
    .bind(tx.amount.to_cents())
    .bind(&tx.text)
    .bind(&tx.notes)
    .bind(&tx.payee)
    .bind(&tx.payee_account_number)
    .bind(&tx.entry_text)
    .bind(&tx.bank_transaction_code)
    .bind(&tx.sequence_number)
    .bind(&r.iban)
    .bind(&r.bic)
    .bind(&r.creditor_id)
    .bind(&r.mandate_reference)
    .bind(&r.end_to_end_reference)
    .bind(&r.alt_originator)
    .bind(&r.alt_beneficiary)
    .bind(&r.remittance_info)
    .bind(tx.processed.unwrap_or(false))
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::classify(e, "transaction"))?;

    Ok(result.last_insert_rowid())
}

pub async fn get_transaction(conn: &mut SqliteConnection, id: i64) -> StorageResult<Option<Transaction>> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(Transaction::from))
}

pub async fn list_transactions(
    conn: &mut SqliteConnection,
    filter: &TransactionFilter,
) -> StorageResult<Vec<Transaction>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_COLUMNS);
    qb.push(" WHERE 1 = 1");

    if !filter.ids.is_empty() {
        qb.push(" AND id IN (");
        let mut ids = qb.separated(", ");
        for id in &filter.ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(")");
    }
    if !filter.account_ids.is_empty() {
        qb.push(" AND account_id IN (");
        let mut accounts = qb.separated(", ");
        for account_id in &filter.account_ids {
            accounts.push_bind(account_id.0);
        }
        accounts.push_unseparated(")");
    }
    if let Some(range) = filter.value_dates {
        qb.push(" AND value_date >= ").push_bind(range.start);
        qb.push(" AND value_date <= ").push_bind(range.end);
    }
    if let Some(needle) = filter.text_contains.as_deref().filter(|n| !n.is_empty()) {
        qb.push(" AND LOWER(text) LIKE ")
            .push_bind(format!("%{}%", escape_like(&needle.to_lowercase())))
            .push(" ESCAPE '\\'");
    }
    if let Some(processed) = filter.processed {
        qb.push(" AND processed = ").push_bind(processed);
    }
    if let Some(rule_set_id) = filter.rule_set_id {
        qb.push(" AND rule_set_id = ").push_bind(rule_set_id);
    }
    qb.push(" ORDER BY value_date, id");

    let rows = qb
        .build_query_as::<TransactionRow>()
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows.into_iter().map(Transaction::from).collect())
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Overwrites the user-editable fields.
pub async fn update_transaction(
    conn: &mut SqliteConnection,
    id: i64,
    edit: &TransactionEdit,
) -> StorageResult<()> {
    let result = sqlx::query("UPDATE transactions SET notes = ?, category_id = ?, processed = ? WHERE id = ?")
        .bind(&edit.notes)
        .bind(edit.category_id)
        .bind(edit.processed)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| StorageError::classify(e, "transaction"))?;

    if result.rows_affected() == 0 {
        return Err(StorageError::NotFound {
            entity: "transaction",
            id,
        });
    }
    Ok(())
}

pub async fn delete_transaction(conn: &mut SqliteConnection, id: i64) -> StorageResult<()> {
    let result = sqlx::query("DELETE FROM transactions WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::NotFound {
            entity: "transaction",
            id,
        });
    }
    Ok(())
}

/// Selection of transactions the rule engine may (re)consider.
#[derive(Debug, Clone, Default)]
pub struct RuleCandidateFilter {
    /// Restrict to these rows; `None` means all rows.
    pub ids: Option<Vec<i64>>,
    pub include_processed: bool,
    pub include_with_rule_set: bool,
}

/// Returns `(id, text)` pairs for rule matching.
pub async fn select_rule_candidates(
    conn: &mut SqliteConnection,
    filter: &RuleCandidateFilter,
) -> StorageResult<Vec<(i64, String)>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT id, text FROM transactions WHERE 1 = 1");

    if let Some(ids) = &filter.ids {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        qb.push(" AND id IN (");
        let mut sep = qb.separated(", ");
        for id in ids {
            sep.push_bind(*id);
        }
        sep.push_unseparated(")");
    }
    if !filter.include_processed {
        qb.push(" AND processed = 0");
    }
    if !filter.include_with_rule_set {
        qb.push(" AND rule_set_id IS NULL");
    }
    qb.push(" ORDER BY id");

    Ok(qb
        .build_query_as::<(i64, String)>()
        .fetch_all(&mut *conn)
        .await?)
}

/// Marks a transaction as handled by a rule set. `None` values keep the
/// transaction's current note/category.
pub async fn assign_rule_set(
    conn: &mut SqliteConnection,
    transaction_id: i64,
    rule_set_id: i64,
    note: Option<&str>,
    category_id: Option<i64>,
) -> StorageResult<()> {
    sqlx::query(
        "UPDATE transactions SET processed = 1, rule_set_id = ?, notes = COALESCE(?, notes), category_id = COALESCE(?, category_id) WHERE id = ?",
    )
    .bind(rule_set_id)
    .bind(note)
    .bind(category_id)
    .bind(transaction_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::classify(e, "transaction"))?;

    Ok(())
}
