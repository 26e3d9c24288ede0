use bankfeed_core::{AccountId, BankContact, ErrorCause};
use bankfeed_import::{IngestError, IngestOutcome, IngestSource, IngestionPipeline};
use bankfeed_storage::{clear_bank_contact_pin, get_account, get_bank_contact, DbPool, StorageError};
use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use crate::controller::{BankSessionController, TanInput};
use crate::dialog::{DialogPayload, DialogResult, DialogStatus};
use crate::session::SessionIdentity;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Account {0} not found")]
    UnknownAccount(i64),
    #[error("Bank contact {0} not found")]
    UnknownBankContact(i64),
    #[error("Account {0} is not linked to a bank contact")]
    NoBankContact(i64),
    #[error("Account {0} has no account number")]
    NoAccountNumber(i64),
    #[error("Bank contact {0} has no stored PIN")]
    MissingPin(i64),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl SyncError {
    pub fn cause(&self) -> ErrorCause {
        match self {
            SyncError::UnknownAccount(_) | SyncError::UnknownBankContact(_) => ErrorCause::Unknown,
            SyncError::NoBankContact(_) | SyncError::NoAccountNumber(_) | SyncError::MissingPin(_) => {
                ErrorCause::Invalid
            }
            SyncError::Storage(e) => e.cause(),
            SyncError::Ingest(e) => e.cause(),
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Storage(err.into())
    }
}

/// Result of one account sync: either the batch was stored, or the dialog
/// ended with a status the caller has to act on (TAN, wrong PIN, ...).
#[derive(Debug)]
pub enum SyncOutcome {
    Ingested(IngestOutcome),
    Dialog(DialogResult),
}

/// Connects stored bank contacts with the dialog controller and the
/// ingestion pipeline.
pub struct BankSync {
    pool: DbPool,
    controller: BankSessionController,
    pipeline: IngestionPipeline,
}

impl BankSync {
    pub fn new(pool: DbPool, controller: BankSessionController, pipeline: IngestionPipeline) -> Self {
        Self {
            pool,
            controller,
            pipeline,
        }
    }

    pub fn controller(&self) -> &BankSessionController {
        &self.controller
    }

    /// Synchronizes a bank contact, e.g. to verify freshly entered credentials.
    pub async fn synchronize_contact(&self, contact_id: i64, tan: Option<TanInput>) -> Result<DialogResult, SyncError> {
        let contact = self.load_contact(contact_id).await?;
        let identity = identity_for(&contact, contact_id)?;

        let result = self.controller.dialog_for_sync(&identity, tan).await;
        self.handle_wrong_pin(&identity, contact_id, &result).await?;
        Ok(result)
    }

    /// Downloads and stores new transactions of `account_id`, plus its balance.
    pub async fn sync_account(
        &self,
        account_id: AccountId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        tan: Option<TanInput>,
    ) -> Result<SyncOutcome, SyncError> {
        let account = {
            let mut conn = self.pool.acquire().await?;
            get_account(&mut conn, account_id)
                .await?
                .ok_or(SyncError::UnknownAccount(account_id.0))?
        };
        let contact_id = account.bank_contact_id.ok_or(SyncError::NoBankContact(account_id.0))?;
        let account_number = account
            .account_number
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .ok_or(SyncError::NoAccountNumber(account_id.0))?;

        let contact = self.load_contact(contact_id).await?;
        let identity = identity_for(&contact, contact_id)?;

        let result = self
            .controller
            .dialog_for_statements(&identity, account_number, from, to, tan)
            .await;
        self.handle_wrong_pin(&identity, contact_id, &result).await?;

        let download = match result.payload {
            DialogPayload::Statements(download) if result.status == DialogStatus::Ok => download,
            _ => {
                info!(account_id = account_id.0, status = %result.status, "Bank sync stopped");
                return Ok(SyncOutcome::Dialog(result));
            }
        };

        let outcome = self
            .pipeline
            .ingest(
                &self.pool,
                account_id,
                IngestSource::BankDialog,
                download.transactions,
                download.balance.map(|b| b.into_balance(account_id)),
            )
            .await?;
        Ok(SyncOutcome::Ingested(outcome))
    }

    async fn load_contact(&self, contact_id: i64) -> Result<BankContact, SyncError> {
        let mut conn = self.pool.acquire().await?;
        get_bank_contact(&mut conn, contact_id)
            .await?
            .ok_or(SyncError::UnknownBankContact(contact_id))
    }

    /// A rejected PIN must not be tried again: forget it and the session.
    async fn handle_wrong_pin(
        &self,
        identity: &SessionIdentity,
        contact_id: i64,
        result: &DialogResult,
    ) -> Result<(), SyncError> {
        if result.status != DialogStatus::WrongPin {
            return Ok(());
        }
        warn!(contact_id, "Clearing stored PIN after bank rejected it");
        let mut conn = self.pool.acquire().await?;
        clear_bank_contact_pin(&mut conn, contact_id).await?;
        self.controller.evict(identity);
        Ok(())
    }
}

fn identity_for(contact: &BankContact, contact_id: i64) -> Result<SessionIdentity, SyncError> {
    let pin = contact
        .pin
        .clone()
        .filter(|p| !p.is_empty())
        .ok_or(SyncError::MissingPin(contact_id))?;
    Ok(SessionIdentity::new(&contact.url, &contact.bank_id, &contact.user_id, pin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{AccountStatement, AccountStatementsResponse};
    use crate::mock::{reply_failed, reply_ok, reply_tan, sync_ok, sync_with, MockBank};
    use bankfeed_core::{Account, Money, RawTransaction, Settings};
    use bankfeed_storage::{create_db, insert_account, insert_bank_contact, latest_balance};
    use std::sync::Arc;

    struct Fixture {
        _dir: tempfile::TempDir,
        pool: DbPool,
        bank: MockBank,
        sync: BankSync,
        account: AccountId,
        contact: i64,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("t.db")).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let contact = insert_bank_contact(
            &mut conn,
            &BankContact {
                id: None,
                name: "Sparkasse".to_string(),
                url: "https://banking.example/fints".to_string(),
                bank_id: "12030000".to_string(),
                user_id: "alice".to_string(),
                pin: Some("1234".to_string()),
            },
        )
        .await
        .unwrap();
        let mut account = Account::new("Giro");
        account.account_number = Some("1001".to_string());
        account.bank_contact_id = Some(contact);
        let account = insert_account(&mut conn, &account).await.unwrap();
        drop(conn);

        let settings = Settings::default();
        let bank = MockBank::default();
        let sync = BankSync::new(
            pool.clone(),
            BankSessionController::new(&settings, Arc::new(bank.clone())),
            IngestionPipeline::new(&settings),
        );
        Fixture {
            _dir: dir,
            pool,
            bank,
            sync,
            account,
            contact,
        }
    }

    fn statements(texts: &[&str]) -> AccountStatementsResponse {
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        AccountStatementsResponse {
            reply: reply_ok(),
            statements: vec![AccountStatement {
                closing_date: date,
                closing_balance: Money::from_cents(75_000),
                transactions: texts
                    .iter()
                    .map(|t| RawTransaction::new(date, Money::from_cents(-1_000), t))
                    .collect(),
            }],
        }
    }

    #[tokio::test]
    async fn downloads_are_ingested_with_balance() {
        let f = fixture().await;
        f.bank.push_sync(Ok(sync_ok(&["1001"])));
        f.bank.offer_account_statements("1001");
        f.bank.push_account_statements(Ok(statements(&["Kauf EREF: E1", "Miete"])));

        let outcome = f.sync.sync_account(f.account, None, None, None).await.unwrap();
        let SyncOutcome::Ingested(outcome) = outcome else {
            panic!("expected ingestion");
        };
        assert_eq!(outcome.inserted.len(), 2);
        assert!(outcome.inserted.iter().any(|t| t.text == "Kauf"));

        let mut conn = f.pool.acquire().await.unwrap();
        let balance = latest_balance(&mut conn, f.account).await.unwrap().unwrap();
        assert_eq!(balance.amount, Money::from_cents(75_000));
    }

    #[tokio::test]
    async fn second_download_skips_known_rows() {
        let f = fixture().await;
        f.bank.push_sync(Ok(sync_ok(&["1001"])));
        f.bank.offer_account_statements("1001");
        f.bank.push_account_statements(Ok(statements(&["Miete"])));
        f.bank.push_account_statements(Ok(statements(&["Miete", "Strom"])));

        f.sync.sync_account(f.account, None, None, None).await.unwrap();
        let SyncOutcome::Ingested(second) = f.sync.sync_account(f.account, None, None, None).await.unwrap() else {
            panic!("expected ingestion");
        };
        assert_eq!(second.duplicates, 1);
        assert_eq!(second.inserted.len(), 1);
        assert_eq!(f.bank.calls().synchronize, 1);
    }

    #[tokio::test]
    async fn wrong_pin_clears_stored_pin() {
        let f = fixture().await;
        f.bank.push_sync(Ok(sync_with(reply_failed("9910", "PIN falsch"))));

        let outcome = f.sync.sync_account(f.account, None, None, None).await.unwrap();
        let SyncOutcome::Dialog(result) = outcome else {
            panic!("expected dialog status");
        };
        assert_eq!(result.status, DialogStatus::WrongPin);
        assert_eq!(result.message.as_deref(), Some("PIN falsch"));

        let mut conn = f.pool.acquire().await.unwrap();
        let contact = get_bank_contact(&mut conn, f.contact).await.unwrap().unwrap();
        assert_eq!(contact.pin, None);
        assert!(f.sync.controller().store().is_empty());

        drop(conn);
        let err = f.sync.sync_account(f.account, None, None, None).await.unwrap_err();
        assert!(matches!(err, SyncError::MissingPin(_)));
        assert_eq!(err.cause(), ErrorCause::Invalid);
    }

    #[tokio::test]
    async fn tan_round_trip_through_sync() {
        let f = fixture().await;
        f.bank.push_sync(Ok(sync_with(reply_tan("sync-1"))));
        f.bank.push_sync(Ok(sync_ok(&["1001"])));
        f.bank.offer_account_statements("1001");
        f.bank.push_account_statements(Ok(statements(&["Gehalt"])));

        let SyncOutcome::Dialog(first) = f.sync.sync_account(f.account, None, None, None).await.unwrap() else {
            panic!("expected TAN challenge");
        };
        let reference = first.tan_challenge().unwrap().reference.clone();

        let second = f
            .sync
            .sync_account(f.account, None, None, Some(TanInput::new(&reference, "112233")))
            .await
            .unwrap();
        assert!(matches!(second, SyncOutcome::Ingested(ref o) if o.inserted.len() == 1));
    }

    #[tokio::test]
    async fn contact_sync_reports_dialog_status() {
        let f = fixture().await;
        f.bank.push_sync(Ok(sync_ok(&["1001", "2002"])));

        let result = f.sync.synchronize_contact(f.contact, None).await.unwrap();
        assert!(result.is_ok());

        let err = f.sync.synchronize_contact(99, None).await.unwrap_err();
        assert_eq!(err.cause(), ErrorCause::Unknown);
    }

    #[tokio::test]
    async fn unlinked_account_is_invalid() {
        let f = fixture().await;
        let mut conn = f.pool.acquire().await.unwrap();
        let cash = insert_account(&mut conn, &Account::new("Bargeld")).await.unwrap();
        drop(conn);

        let err = f.sync.sync_account(cash, None, None, None).await.unwrap_err();
        assert!(matches!(err, SyncError::NoBankContact(_)));
    }
}
