use bankfeed_core::{ErrorCause, RuleSet, RuleSettings, ValidationError};
use bankfeed_storage::{
    assign_rule_set, delete_rule_set, insert_rule_set, list_rule_sets, replace_rule_set,
    rule_set_exists, select_rule_candidates, DbPool, RuleCandidateFilter, StorageError,
};
use sqlx::SqliteConnection;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RuleSetError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Rule set {0} not found")]
    NotFound(i64),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RuleSetError {
    pub fn cause(&self) -> ErrorCause {
        match self {
            RuleSetError::Validation(e) => e.cause(),
            RuleSetError::NotFound(_) => ErrorCause::Unknown,
            RuleSetError::Storage(e) => e.cause(),
        }
    }
}

impl From<sqlx::Error> for RuleSetError {
    fn from(err: sqlx::Error) -> Self {
        RuleSetError::Storage(err.into())
    }
}

/// Which transactions one rule run considers.
#[derive(Debug, Clone, Default)]
pub struct RuleApplication {
    /// Restrict to these transactions; `None` means every stored row.
    pub transaction_ids: Option<Vec<i64>>,
    /// Reconsider transactions already marked processed.
    pub include_processed: bool,
    /// Reconsider transactions already attributed to a rule set.
    pub include_with_rule_set: bool,
    /// Overrides the engine's configured threshold.
    pub min_match_rate: Option<u32>,
}

impl RuleApplication {
    /// The run that follows an ingestion batch: only the given fresh rows,
    /// and only while they are unprocessed and unattributed.
    pub fn for_inserted(ids: Vec<i64>) -> Self {
        RuleApplication {
            transaction_ids: Some(ids),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleRunSummary {
    pub candidates: usize,
    pub rule_sets: usize,
    /// Transactions that received at least one rule set.
    pub matched: usize,
}

/// Percentage (floored) of `fragments` found case-insensitively in `text`.
/// A rule set without fragments has no rate.
pub fn match_rate(fragments: &[String], text: &str) -> Option<u32> {
    if fragments.is_empty() {
        return None;
    }
    let haystack = text.to_lowercase();
    let hits = fragments
        .iter()
        .filter(|f| haystack.contains(&f.to_lowercase()))
        .count();
    Some((hits * 100 / fragments.len()) as u32)
}

pub struct RuleMatchingEngine {
    min_match_rate: u32,
}

impl RuleMatchingEngine {
    pub fn new(settings: &RuleSettings) -> Self {
        Self {
            min_match_rate: settings.min_match_rate,
        }
    }

    pub fn min_match_rate(&self) -> u32 {
        self.min_match_rate
    }

    pub async fn create(&self, pool: &DbPool, rule_set: &RuleSet) -> Result<i64, RuleSetError> {
        let rule_set = rule_set.validated()?;
        let mut tx = pool.begin().await?;
        let id = insert_rule_set(&mut tx, &rule_set).await?;
        tx.commit().await?;

        info!(id, name = %rule_set.name, fragments = rule_set.fragments.len(), "Created rule set");
        Ok(id)
    }

    /// Replaces name, note, category and both owned collections.
    pub async fn update(&self, pool: &DbPool, id: i64, rule_set: &RuleSet) -> Result<(), RuleSetError> {
        let rule_set = rule_set.validated()?;
        let mut tx = pool.begin().await?;
        if !rule_set_exists(&mut tx, id).await? {
            return Err(RuleSetError::NotFound(id));
        }
        replace_rule_set(&mut tx, id, &rule_set).await?;
        tx.commit().await?;

        info!(id, name = %rule_set.name, "Updated rule set");
        Ok(())
    }

    /// Returns the number of transactions whose rule-set reference was cleared.
    pub async fn delete(&self, pool: &DbPool, id: i64) -> Result<u64, RuleSetError> {
        let mut tx = pool.begin().await?;
        if !rule_set_exists(&mut tx, id).await? {
            return Err(RuleSetError::NotFound(id));
        }
        let detached = delete_rule_set(&mut tx, id).await?;
        tx.commit().await?;

        info!(id, detached, "Deleted rule set");
        Ok(detached)
    }

    /// Runs the rules inside a transaction of its own.
    pub async fn apply(&self, pool: &DbPool, application: &RuleApplication) -> Result<RuleRunSummary, RuleSetError> {
        let mut tx = pool.begin().await?;
        let summary = self.apply_in(&mut tx, application).await?;
        tx.commit().await?;
        Ok(summary)
    }

    /// Runs the rules on a caller-supplied connection, typically an open
    /// ingestion transaction.
    pub async fn apply_in(
        &self,
        conn: &mut SqliteConnection,
        application: &RuleApplication,
    ) -> Result<RuleRunSummary, RuleSetError> {
        let threshold = application.min_match_rate.unwrap_or(self.min_match_rate);
        let filter = RuleCandidateFilter {
            ids: application.transaction_ids.clone(),
            include_processed: application.include_processed,
            include_with_rule_set: application.include_with_rule_set,
        };

        let candidates = select_rule_candidates(conn, &filter).await?;
        if candidates.is_empty() {
            return Ok(RuleRunSummary::default());
        }
        let rule_sets = list_rule_sets(conn).await?;

        let mut summary = RuleRunSummary {
            candidates: candidates.len(),
            rule_sets: rule_sets.len(),
            matched: 0,
        };

        for (transaction_id, text) in &candidates {
            let mut qualifying: Vec<(u32, &RuleSet)> = rule_sets
                .iter()
                .filter_map(|rs| {
                    match_rate(&rs.fragments, text)
                        .filter(|rate| *rate >= threshold)
                        .map(|rate| (rate, rs))
                })
                .collect();
            if qualifying.is_empty() {
                continue;
            }

            // Best match is written last and wins the reference.
            qualifying.sort_by_key(|(rate, rs)| (*rate, rs.id));
            for (rate, rs) in qualifying {
                let Some(rule_set_id) = rs.id else { continue };
                debug!(transaction_id, rule_set_id, rate, "Rule set matched");
                assign_rule_set(conn, *transaction_id, rule_set_id, rs.note.as_deref(), rs.category_id).await?;
            }
            summary.matched += 1;
        }

        info!(
            candidates = summary.candidates,
            matched = summary.matched,
            threshold,
            "Applied rule sets"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankfeed_core::{Account, Money, RawTransaction};
    use bankfeed_storage::{
        create_db, get_transaction, insert_account, insert_category, insert_transaction,
    };
    use chrono::NaiveDate;

    fn frags(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    async fn setup() -> (tempfile::TempDir, DbPool, bankfeed_core::AccountId) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("t.db")).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let account = insert_account(&mut conn, &Account::new("Giro")).await.unwrap();
        drop(conn);
        (dir, pool, account)
    }

    async fn add_tx(pool: &DbPool, account: bankfeed_core::AccountId, text: &str) -> i64 {
        let mut conn = pool.acquire().await.unwrap();
        let raw = RawTransaction::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            Money::from_cents(-1299),
            text,
        );
        insert_transaction(&mut conn, account, &raw).await.unwrap()
    }

    #[test]
    fn match_rate_counts_case_insensitive_fragments() {
        assert_eq!(match_rate(&frags(&["netflix", "abo"]), "NETFLIX.COM Monat"), Some(50));
        assert_eq!(match_rate(&frags(&["netflix", "monat"]), "NETFLIX.COM Monat"), Some(100));
        assert_eq!(match_rate(&frags(&["a", "b", "c"]), "a b"), Some(66));
        assert_eq!(match_rate(&[], "anything"), None);
    }

    #[tokio::test]
    async fn half_match_needs_lowered_threshold() {
        let (_dir, pool, account) = setup().await;
        let engine = RuleMatchingEngine::new(&RuleSettings::default());
        let mut rs = RuleSet::new("Streaming", &["netflix", "spotify"]);
        rs.note = Some("Abo".to_string());
        let rs_id = engine.create(&pool, &rs).await.unwrap();
        let tx_id = add_tx(&pool, account, "NETFLIX.COM 123").await;

        let summary = engine.apply(&pool, &RuleApplication::default()).await.unwrap();
        assert_eq!(summary.matched, 0);

        let summary = engine
            .apply(
                &pool,
                &RuleApplication {
                    min_match_rate: Some(50),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(summary.matched, 1);

        let mut conn = pool.acquire().await.unwrap();
        let stored = get_transaction(&mut conn, tx_id).await.unwrap().unwrap();
        assert!(stored.processed);
        assert_eq!(stored.rule_set_id, Some(rs_id));
        assert_eq!(stored.notes.as_deref(), Some("Abo"));
    }

    #[tokio::test]
    async fn empty_rule_values_keep_existing_fields() {
        let (_dir, pool, account) = setup().await;
        let engine = RuleMatchingEngine::new(&RuleSettings::default());
        let category = {
            let mut conn = pool.acquire().await.unwrap();
            insert_category(&mut conn, "Food").await.unwrap()
        };
        let mut rs = RuleSet::new("Bakery", &["baecker"]);
        rs.category_id = Some(category);
        engine.create(&pool, &rs).await.unwrap();

        let tx_id = add_tx(&pool, account, "Baecker Meier").await;
        {
            let mut conn = pool.acquire().await.unwrap();
            sqlx::query("UPDATE transactions SET notes = 'keep me' WHERE id = ?")
                .bind(tx_id)
                .execute(&mut *conn)
                .await
                .unwrap();
        }

        engine.apply(&pool, &RuleApplication::default()).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let stored = get_transaction(&mut conn, tx_id).await.unwrap().unwrap();
        assert_eq!(stored.notes.as_deref(), Some("keep me"));
        assert_eq!(stored.category_id, Some(category));
    }

    #[tokio::test]
    async fn processed_rows_are_skipped_unless_requested() {
        let (_dir, pool, account) = setup().await;
        let engine = RuleMatchingEngine::new(&RuleSettings::default());
        let rs_id = engine.create(&pool, &RuleSet::new("Rent", &["miete"])).await.unwrap();
        let tx_id = add_tx(&pool, account, "Miete Maerz").await;
        {
            let mut conn = pool.acquire().await.unwrap();
            sqlx::query("UPDATE transactions SET processed = 1 WHERE id = ?")
                .bind(tx_id)
                .execute(&mut *conn)
                .await
                .unwrap();
        }

        let summary = engine.apply(&pool, &RuleApplication::default()).await.unwrap();
        assert_eq!(summary.candidates, 0);

        let summary = engine
            .apply(
                &pool,
                &RuleApplication {
                    include_processed: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(summary.matched, 1);

        let mut conn = pool.acquire().await.unwrap();
        let stored = get_transaction(&mut conn, tx_id).await.unwrap().unwrap();
        assert_eq!(stored.rule_set_id, Some(rs_id));
    }

    #[tokio::test]
    async fn restricted_run_only_touches_given_rows() {
        let (_dir, pool, account) = setup().await;
        let engine = RuleMatchingEngine::new(&RuleSettings::default());
        engine.create(&pool, &RuleSet::new("Fuel", &["aral"])).await.unwrap();
        let old = add_tx(&pool, account, "ARAL Tankstelle").await;
        let fresh = add_tx(&pool, account, "ARAL Station").await;

        let summary = engine
            .apply(&pool, &RuleApplication::for_inserted(vec![fresh]))
            .await
            .unwrap();
        assert_eq!(summary.matched, 1);

        let mut conn = pool.acquire().await.unwrap();
        assert!(!get_transaction(&mut conn, old).await.unwrap().unwrap().processed);
        assert!(get_transaction(&mut conn, fresh).await.unwrap().unwrap().processed);
    }

    #[tokio::test]
    async fn deleting_referenced_rule_set_clears_references() {
        let (_dir, pool, account) = setup().await;
        let engine = RuleMatchingEngine::new(&RuleSettings::default());
        let mut coffee = RuleSet::new("Coffee", &["kaffee"]);
        coffee.account_ids = vec![account];
        let rs_id = engine.create(&pool, &coffee).await.unwrap();
        let ids = [
            add_tx(&pool, account, "Kaffee Bar").await,
            add_tx(&pool, account, "kaffee to go").await,
            add_tx(&pool, account, "KAFFEE").await,
        ];
        engine.apply(&pool, &RuleApplication::default()).await.unwrap();

        assert_eq!(engine.delete(&pool, rs_id).await.unwrap(), 3);

        let mut conn = pool.acquire().await.unwrap();
        for id in ids {
            let stored = get_transaction(&mut conn, id).await.unwrap().unwrap();
            assert_eq!(stored.rule_set_id, None);
        }
        assert!(!rule_set_exists(&mut conn, rs_id).await.unwrap());
        let (scopes,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rule_set_accounts")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        let (fragments,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rule_set_fragments")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!((scopes, fragments), (0, 0));
    }

    #[tokio::test]
    async fn crud_errors_carry_causes() {
        let (_dir, pool, _account) = setup().await;
        let engine = RuleMatchingEngine::new(&RuleSettings::default());

        let err = engine.create(&pool, &RuleSet::new("  ", &["x"])).await.unwrap_err();
        assert_eq!(err.cause(), ErrorCause::Invalid);

        let err = engine.update(&pool, 42, &RuleSet::new("x", &["y"])).await.unwrap_err();
        assert_eq!(err.cause(), ErrorCause::Unknown);

        let err = engine.delete(&pool, 42).await.unwrap_err();
        assert!(matches!(err, RuleSetError::NotFound(42)));
    }
}
