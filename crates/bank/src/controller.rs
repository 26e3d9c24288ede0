use bankfeed_core::{BalanceKind, Settings, SyncSettings};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::{
    AccountStatementsResponse, BankReply, ClientResult, ClientFactory, CreditCardStatementsResponse, ProductInfo,
    SyncResponse, TanMethod, WRONG_PIN_CODE,
};
use crate::dialog::{DialogPayload, DialogResult, DialogStatus, StatementBalance, StatementDownload};
use crate::session::{BankSession, PendingOperation, PendingTan, SessionIdentity, SessionState, SessionStore};

/// A TAN entered by the user for an earlier challenge.
#[derive(Debug, Clone)]
pub struct TanInput {
    pub reference: String,
    pub tan: String,
}

impl TanInput {
    pub fn new(reference: &str, tan: &str) -> Self {
        Self {
            reference: reference.to_string(),
            tan: tan.to_string(),
        }
    }
}

/// Drives bank dialogs for cached sessions. Never persists anything and
/// never returns an error: every failure becomes a `DialogResult` status.
pub struct BankSessionController {
    store: Arc<SessionStore>,
    factory: Arc<dyn ClientFactory>,
    product: ProductInfo,
    max_sync_attempts: u32,
}

impl BankSessionController {
    pub fn new(settings: &Settings, factory: Arc<dyn ClientFactory>) -> Self {
        Self::with_store(Arc::new(SessionStore::new(&settings.sessions)), factory, &settings.sync)
    }

    pub fn with_store(store: Arc<SessionStore>, factory: Arc<dyn ClientFactory>, sync: &SyncSettings) -> Self {
        Self {
            store,
            factory,
            product: ProductInfo {
                id: sync.product_id.clone(),
                version: sync.product_version.clone(),
            },
            max_sync_attempts: sync.max_sync_attempts.max(1),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Drops the cached session of `identity` for this controller's product.
    pub fn evict(&self, identity: &SessionIdentity) -> bool {
        self.store.evict(identity, &self.product)
    }

    /// Synchronizes with the bank, or resumes a synchronization that asked
    /// for a TAN. On success the payload lists the bank's accounts.
    pub async fn dialog_for_sync(&self, identity: &SessionIdentity, tan: Option<TanInput>) -> DialogResult {
        let shared = match self.store.checkout(identity, self.factory.as_ref(), &self.product) {
            Ok(session) => session,
            Err(e) => {
                warn!(url = %identity.url, error = %e, "Could not open bank session");
                return DialogResult::error(e.to_string());
            }
        };
        let mut session = shared.lock().await;
        if let Some(result) = rejected_pin(&session) {
            return result;
        }

        let tan = match tan {
            Some(input) => match take_pending(&mut session, &input) {
                Some(PendingOperation::Sync) => Some(input),
                _ => return unknown_reference(&input),
            },
            None => None,
        };

        let result = self.synchronize(&mut session, tan).await;
        if result.is_ok() {
            return DialogResult::ok(DialogPayload::Accounts(session.accounts.clone()));
        }
        result
    }

    /// Downloads the statements of one account, synchronizing first unless
    /// the session already is. A TAN resumes whichever step asked for it.
    pub async fn dialog_for_statements(
        &self,
        identity: &SessionIdentity,
        account_number: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        tan: Option<TanInput>,
    ) -> DialogResult {
        let shared = match self.store.checkout(identity, self.factory.as_ref(), &self.product) {
            Ok(session) => session,
            Err(e) => {
                warn!(url = %identity.url, error = %e, "Could not open bank session");
                return DialogResult::error(e.to_string());
            }
        };
        let mut session = shared.lock().await;
        if let Some(result) = rejected_pin(&session) {
            return result;
        }

        if let Some(input) = tan {
            match take_pending(&mut session, &input) {
                Some(PendingOperation::Sync) => {
                    let result = self.synchronize(&mut session, Some(input)).await;
                    if !result.is_ok() {
                        return result;
                    }
                }
                Some(PendingOperation::AccountStatements {
                    account_number,
                    from,
                    to,
                }) => {
                    let response = session
                        .client
                        .get_account_statements_with_tan(&input.reference, &input.tan)
                        .await;
                    let operation = PendingOperation::AccountStatements {
                        account_number: account_number.clone(),
                        from,
                        to,
                    };
                    return finish_account_statements(&mut session, &account_number, operation, response);
                }
                Some(PendingOperation::CreditCardStatements {
                    account_number,
                    from,
                    to,
                }) => {
                    let response = session
                        .client
                        .get_credit_card_statements_with_tan(&input.reference, &input.tan)
                        .await;
                    let operation = PendingOperation::CreditCardStatements {
                        account_number: account_number.clone(),
                        from,
                        to,
                    };
                    return finish_credit_card_statements(&mut session, &account_number, operation, response);
                }
                None => return unknown_reference(&input),
            }
        } else if session.state != SessionState::Synchronized {
            let result = self.synchronize(&mut session, None).await;
            if !result.is_ok() {
                return result;
            }
        } else {
            debug!(url = %identity.url, "Reusing synchronized session");
        }

        let Some(account) = session.find_account(account_number).cloned() else {
            info!(account_number, "Account not offered by bank");
            return DialogResult::status(DialogStatus::AccountNumberUnknownAtBank);
        };

        if session.client.can_get_account_statements(&account) {
            let response = session.client.get_account_statements(&account, from, to).await;
            let operation = PendingOperation::AccountStatements {
                account_number: account_number.to_string(),
                from,
                to,
            };
            finish_account_statements(&mut session, account_number, operation, response)
        } else if session.client.can_get_credit_card_statements(&account) {
            let response = session.client.get_credit_card_statements(&account, from, to).await;
            let operation = PendingOperation::CreditCardStatements {
                account_number: account_number.to_string(),
                from,
                to,
            };
            finish_credit_card_statements(&mut session, account_number, operation, response)
        } else {
            info!(account_number, "Bank offers no statements for account");
            DialogResult::status(DialogStatus::NoAccountStatements)
        }
    }

    /// Runs synchronize round-trips until the bank reports accounts, a
    /// non-retryable status comes back, or the attempt limit is hit.
    async fn synchronize(&self, session: &mut BankSession, mut tan: Option<TanInput>) -> DialogResult {
        session.state = SessionState::Synchronizing;
        let mut attempt = 0;

        let result = loop {
            attempt += 1;
            let response = match tan.take() {
                Some(input) => session.client.synchronize_with_tan(&input.reference, &input.tan).await,
                None => session.client.synchronize().await,
            };

            let result = match response {
                Ok(response) => self.evaluate_sync(session, response).await,
                Err(e) => {
                    warn!(attempt, error = %e, "Synchronize failed");
                    DialogResult::error(e.to_string())
                }
            };

            if result.status.is_retryable() && attempt < self.max_sync_attempts {
                debug!(attempt, "Bank reported no accounts, synchronizing again");
                continue;
            }
            break result;
        };

        session.state = match result.status {
            DialogStatus::Ok => SessionState::Synchronized,
            DialogStatus::RequiresTan => SessionState::RequiresTan,
            other => SessionState::Failed(other),
        };
        if result.status == DialogStatus::WrongPin {
            session.pin_rejection = result.message.clone();
        }
        info!(status = %result.status, attempts = attempt, "Synchronization finished");
        result
    }

    async fn evaluate_sync(&self, session: &mut BankSession, response: SyncResponse) -> DialogResult {
        if let Some(result) = check_reply(&response.reply) {
            return result;
        }
        if let Some(challenge) = response.reply.tan {
            session.pending_tan = Some(PendingTan {
                reference: challenge.reference.clone(),
                operation: PendingOperation::Sync,
            });
            return DialogResult::requires_tan(challenge);
        }

        if response.banking_information.is_none() && session.banking_information.is_none() {
            return DialogResult::status(DialogStatus::NoBankingInformation);
        }
        if !response.banking_information_updated && session.banking_information.is_none() {
            return DialogResult::status(DialogStatus::NoBankingInformationUpdated);
        }
        if let Some(info) = response.banking_information {
            session.banking_information = Some(info);
        }

        let Some(method) = choose_tan_method(&response.tan_methods) else {
            return DialogResult::status(DialogStatus::NoTanMethods);
        };
        if let Err(e) = session.client.select_tan_method(&method.id).await {
            warn!(method = %method.id, error = %e, "TAN method selection failed");
            return DialogResult::error(e.to_string());
        }

        if response.accounts.is_empty() {
            return DialogResult::status(DialogStatus::NoBankAccounts);
        }
        session.accounts = response.accounts;
        DialogResult::ok(DialogPayload::None)
    }
}

/// Always the first offered method; banks list their preferred one first.
fn choose_tan_method(offered: &[TanMethod]) -> Option<&TanMethod> {
    offered.first()
}

/// A session whose PIN the bank rejected never contacts the bank again.
/// A new PIN yields a different key and thus a fresh session.
fn rejected_pin(session: &BankSession) -> Option<DialogResult> {
    if session.state != SessionState::Failed(DialogStatus::WrongPin) {
        return None;
    }
    debug!("Skipping bank contact for rejected PIN");
    Some(DialogResult::wrong_pin(session.pin_rejection.clone().unwrap_or_default()))
}

/// Consumes the pending challenge if `input` answers it.
fn take_pending(session: &mut BankSession, input: &TanInput) -> Option<PendingOperation> {
    match &session.pending_tan {
        Some(pending) if pending.reference == input.reference => session.pending_tan.take().map(|p| p.operation),
        _ => None,
    }
}

fn unknown_reference(input: &TanInput) -> DialogResult {
    warn!(reference = %input.reference, "TAN for unknown reference");
    DialogResult::error(format!("No pending TAN challenge for reference {}", input.reference))
}

/// Maps envelope failures; `None` means the reply can be evaluated further.
fn check_reply(reply: &BankReply) -> Option<DialogResult> {
    if reply.answers.is_empty() {
        return Some(DialogResult::status(DialogStatus::NoBankMessages));
    }
    if let Some(answer) = reply.answer(WRONG_PIN_CODE) {
        warn!(code = %answer.code, "Bank rejected credentials");
        return Some(DialogResult::wrong_pin(answer.text.clone()));
    }
    if !reply.success {
        warn!(answers = %reply.message(), "Bank reported failure");
        return Some(DialogResult::error(reply.message()));
    }
    None
}

/// Shared handling of a statement reply: transport errors, envelope
/// failures and TAN challenges.
fn statement_reply(session: &mut BankSession, operation: PendingOperation, reply: &BankReply) -> Result<(), DialogResult> {
    if let Some(result) = check_reply(reply) {
        if result.status == DialogStatus::WrongPin {
            session.state = SessionState::Failed(DialogStatus::WrongPin);
            session.pin_rejection = result.message.clone();
        }
        return Err(result);
    }
    if let Some(challenge) = &reply.tan {
        session.pending_tan = Some(PendingTan {
            reference: challenge.reference.clone(),
            operation,
        });
        return Err(DialogResult::requires_tan(challenge.clone()));
    }
    Ok(())
}

fn finish_account_statements(
    session: &mut BankSession,
    account_number: &str,
    operation: PendingOperation,
    response: ClientResult<AccountStatementsResponse>,
) -> DialogResult {
    let response = match response {
        Ok(response) => response,
        Err(e) => {
            warn!(account_number, error = %e, "Statement download failed");
            return DialogResult::error(e.to_string());
        }
    };
    if let Err(result) = statement_reply(session, operation, &response.reply) {
        return result;
    }

    let balance = response.statements.last().map(|s| StatementBalance {
        date: s.closing_date,
        amount: s.closing_balance,
        kind: BalanceKind::AccountStatement,
    });
    let transactions: Vec<_> = response
        .statements
        .into_iter()
        .flat_map(|s| s.transactions)
        .collect();

    info!(account_number, transactions = transactions.len(), "Downloaded account statements");
    DialogResult::ok(DialogPayload::Statements(StatementDownload {
        account_number: account_number.to_string(),
        transactions,
        is_account_statement: true,
        balance,
    }))
}

fn finish_credit_card_statements(
    session: &mut BankSession,
    account_number: &str,
    operation: PendingOperation,
    response: ClientResult<CreditCardStatementsResponse>,
) -> DialogResult {
    let response = match response {
        Ok(response) => response,
        Err(e) => {
            warn!(account_number, error = %e, "Credit card download failed");
            return DialogResult::error(e.to_string());
        }
    };
    if let Err(result) = statement_reply(session, operation, &response.reply) {
        return result;
    }

    let balance = response.balance.map(|(date, amount)| StatementBalance {
        date,
        amount,
        kind: BalanceKind::CreditCard,
    });

    info!(account_number, transactions = response.transactions.len(), "Downloaded credit card statements");
    DialogResult::ok(DialogPayload::Statements(StatementDownload {
        account_number: account_number.to_string(),
        transactions: response.transactions,
        is_account_statement: false,
        balance,
    }))
}
