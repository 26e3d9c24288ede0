use bankfeed_core::{AccountId, Balance, DedupPolicy, DedupSettings, ErrorCause, RawTransaction, Settings, Transaction};
use bankfeed_storage::{
    get_account, insert_balance, insert_transaction, list_transactions, DbPool, StorageError,
    TransactionFilter,
};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::dedup::{filter_duplicates, lookup_range};
use crate::normalizer::normalize;
use crate::rules::{RuleApplication, RuleMatchingEngine, RuleRunSummary, RuleSetError};

/// Where a batch came from; selects the dedup policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestSource {
    BankDialog,
    BulkUpload,
}

impl fmt::Display for IngestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestSource::BankDialog => f.write_str("bank"),
            IngestSource::BulkUpload => f.write_str("bulk"),
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Account {0} not found")]
    UnknownAccount(i64),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Rules(#[from] RuleSetError),
}

impl IngestError {
    pub fn cause(&self) -> ErrorCause {
        match self {
            IngestError::UnknownAccount(_) => ErrorCause::Unknown,
            IngestError::Storage(e) => e.cause(),
            IngestError::Rules(e) => e.cause(),
        }
    }
}

impl From<sqlx::Error> for IngestError {
    fn from(err: sqlx::Error) -> Self {
        IngestError::Storage(err.into())
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    /// Stored rows as they look after rule matching, in value-date order.
    pub inserted: Vec<Transaction>,
    pub duplicates: usize,
    pub over_cap: usize,
    /// The persisted balance, with its id, when one was supplied.
    pub balance: Option<Balance>,
    pub rules: RuleRunSummary,
}

pub struct IngestionPipeline {
    dedup: DedupSettings,
    rules: RuleMatchingEngine,
}

impl IngestionPipeline {
    pub fn new(settings: &Settings) -> Self {
        Self {
            dedup: settings.dedup.clone(),
            rules: RuleMatchingEngine::new(&settings.rules),
        }
    }

    pub fn policy(&self, source: IngestSource) -> &DedupPolicy {
        match source {
            IngestSource::BankDialog => &self.dedup.bank,
            IngestSource::BulkUpload => &self.dedup.bulk,
        }
    }

    /// Normalizes, deduplicates and stores one account's batch, then runs
    /// the rule sets over the new rows. Everything happens in one storage
    /// transaction.
    pub async fn ingest(
        &self,
        pool: &DbPool,
        account_id: AccountId,
        source: IngestSource,
        candidates: Vec<RawTransaction>,
        balance: Option<Balance>,
    ) -> Result<IngestOutcome, IngestError> {
        let policy = self.policy(source);
        let candidates: Vec<RawTransaction> = candidates.into_iter().map(normalize).collect();
        let received = candidates.len();

        let mut tx = pool.begin().await?;

        if get_account(&mut tx, account_id).await?.is_none() {
            return Err(IngestError::UnknownAccount(account_id.0));
        }

        let mut outcome = IngestOutcome::default();

        if !candidates.is_empty() {
            let existing = list_transactions(
                &mut tx,
                &TransactionFilter {
                    account_ids: vec![account_id],
                    value_dates: lookup_range(policy, &candidates),
                    ..Default::default()
                },
            )
            .await?;
            debug!(account_id = account_id.0, existing = existing.len(), "Loaded rows for dedup");

            let filtered = filter_duplicates(policy, candidates, &existing);
            outcome.duplicates = filtered.duplicates;
            outcome.over_cap = filtered.over_cap;

            let mut ids = Vec::with_capacity(filtered.accepted.len());
            for raw in &filtered.accepted {
                ids.push(insert_transaction(&mut tx, account_id, raw).await?);
            }

            if !ids.is_empty() {
                outcome.rules = self
                    .rules
                    .apply_in(&mut tx, &RuleApplication::for_inserted(ids.clone()))
                    .await?;
                outcome.inserted = list_transactions(
                    &mut tx,
                    &TransactionFilter {
                        ids,
                        ..Default::default()
                    },
                )
                .await?;
            }
        }

        if let Some(mut balance) = balance {
            balance.account_id = account_id;
            balance.id = Some(insert_balance(&mut tx, &balance).await?);
            outcome.balance = Some(balance);
        }

        tx.commit().await?;

        info!(
            account_id = account_id.0,
            %source,
            received,
            inserted = outcome.inserted.len(),
            duplicates = outcome.duplicates,
            over_cap = outcome.over_cap,
            categorized = outcome.rules.matched,
            "Ingested batch"
        );
        Ok(outcome)
    }

    pub fn rules(&self) -> &RuleMatchingEngine {
        &self.rules
    }
}
