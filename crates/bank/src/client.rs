use async_trait::async_trait;
use bankfeed_core::{Money, RawTransaction};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionIdentity;

/// Answer code a bank sends for a wrong PIN or otherwise invalid credentials.
pub const WRONG_PIN_CODE: &str = "9910";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// One structured message returned by the bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAnswer {
    pub code: String,
    pub text: String,
}

impl BankAnswer {
    pub fn new(code: &str, text: &str) -> Self {
        Self {
            code: code.to_string(),
            text: text.to_string(),
        }
    }
}

/// Second-factor prompt. `reference` must accompany the TAN on the follow-up call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TanChallenge {
    pub challenge: String,
    pub photo: Option<Vec<u8>>,
    pub media_name: Option<String>,
    pub reference: String,
}

/// Envelope common to every response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankReply {
    pub success: bool,
    pub answers: Vec<BankAnswer>,
    pub tan: Option<TanChallenge>,
}

impl BankReply {
    pub fn answer(&self, code: &str) -> Option<&BankAnswer> {
        self.answers.iter().find(|a| a.code == code)
    }

    /// All answer texts, for surfacing an unclassified failure.
    pub fn message(&self) -> String {
        self.answers
            .iter()
            .map(|a| format!("{} {}", a.code, a.text))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TanMethod {
    pub id: String,
    pub name: String,
}

/// Bank parameter data. Banks only resend it when their version changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankingInformation {
    pub version: u32,
    pub bank_name: Option<String>,
}

/// An account as reported by the bank during synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    pub account_number: String,
    pub iban: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SyncResponse {
    pub reply: BankReply,
    pub banking_information: Option<BankingInformation>,
    pub banking_information_updated: bool,
    pub tan_methods: Vec<TanMethod>,
    pub accounts: Vec<BankAccount>,
}

/// One periodic statement with its embedded bookings.
#[derive(Debug, Clone)]
pub struct AccountStatement {
    pub closing_date: NaiveDate,
    pub closing_balance: Money,
    pub transactions: Vec<RawTransaction>,
}

#[derive(Debug, Clone, Default)]
pub struct AccountStatementsResponse {
    pub reply: BankReply,
    pub statements: Vec<AccountStatement>,
}

#[derive(Debug, Clone, Default)]
pub struct CreditCardStatementsResponse {
    pub reply: BankReply,
    pub transactions: Vec<RawTransaction>,
    pub balance: Option<(NaiveDate, Money)>,
}

/// Product registration sent with every dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductInfo {
    pub id: String,
    pub version: String,
}

/// Protocol client for one bank contact. Wire format and transport are up
/// to the implementation.
#[async_trait]
pub trait BankingClient: Send {
    async fn synchronize(&mut self) -> ClientResult<SyncResponse>;
    async fn synchronize_with_tan(&mut self, reference: &str, tan: &str) -> ClientResult<SyncResponse>;
    async fn select_tan_method(&mut self, method_id: &str) -> ClientResult<()>;

    fn can_get_account_statements(&self, account: &BankAccount) -> bool;
    fn can_get_credit_card_statements(&self, account: &BankAccount) -> bool;

    async fn get_account_statements(
        &mut self,
        account: &BankAccount,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> ClientResult<AccountStatementsResponse>;
    async fn get_account_statements_with_tan(
        &mut self,
        reference: &str,
        tan: &str,
    ) -> ClientResult<AccountStatementsResponse>;

    async fn get_credit_card_statements(
        &mut self,
        account: &BankAccount,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> ClientResult<CreditCardStatementsResponse>;
    async fn get_credit_card_statements_with_tan(
        &mut self,
        reference: &str,
        tan: &str,
    ) -> ClientResult<CreditCardStatementsResponse>;
}

/// Opens a protocol client for a credential identity.
pub trait ClientFactory: Send + Sync {
    fn create(&self, identity: &SessionIdentity, product: &ProductInfo) -> ClientResult<Box<dyn BankingClient>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_answers_by_code() {
        let reply = BankReply {
            success: false,
            answers: vec![
                BankAnswer::new("3920", "Zugelassene TAN-Verfahren"),
                BankAnswer::new(WRONG_PIN_CODE, "PIN ungültig"),
            ],
            tan: None,
        };
        assert_eq!(reply.answer("9910").map(|a| a.text.as_str()), Some("PIN ungültig"));
        assert!(reply.answer("0010").is_none());
        assert_eq!(reply.message(), "3920 Zugelassene TAN-Verfahren; 9910 PIN ungültig");
    }
}
