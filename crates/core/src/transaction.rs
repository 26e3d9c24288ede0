use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::account::AccountId;
use super::money::Money;

/// SEPA remittance sub-fields recovered from the narrative text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remittance {
    pub iban: Option<String>,
    pub bic: Option<String>,
    /// CRED
    pub creditor_id: Option<String>,
    /// MREF
    pub mandate_reference: Option<String>,
    /// EREF
    pub end_to_end_reference: Option<String>,
    /// ABWA
    pub alt_originator: Option<String>,
    /// ABWE
    pub alt_beneficiary: Option<String>,
    /// SVWZ
    pub remittance_info: Option<String>,
}

/// A transaction as delivered by a bank dialog or a bulk upload, before it
/// is attached to an account and stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub booking_date: NaiveDate,
    pub value_date: NaiveDate,
    pub amount: Money,
    pub text: String,
    pub notes: Option<String>,
    pub payee: Option<String>,
    pub payee_account_number: Option<String>,
    pub entry_text: Option<String>,
    pub bank_transaction_code: Option<String>,
    pub sequence_number: Option<String>,
    pub processed: Option<bool>,
    #[serde(default)]
    pub remittance: Remittance,
}

impl RawTransaction {
    pub fn new(date: NaiveDate, amount: Money, text: &str) -> Self {
        RawTransaction {
            booking_date: date,
            value_date: date,
            amount,
            text: text.to_string(),
            notes: None,
            payee: None,
            payee_account_number: None,
            entry_text: None,
            bank_transaction_code: None,
            sequence_number: None,
            processed: None,
            remittance: Remittance::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub account_id: AccountId,
    pub booking_date: NaiveDate,
    pub value_date: NaiveDate,
    pub amount: Money,
    pub text: String,
    pub notes: Option<String>,
    pub payee: Option<String>,
    pub payee_account_number: Option<String>,
    pub entry_text: Option<String>,
    pub bank_transaction_code: Option<String>,
    pub sequence_number: Option<String>,
    pub remittance: Remittance,
    pub category_id: Option<i64>,
    pub rule_set_id: Option<i64>,
    pub processed: bool,
}

/// Fields a user may change on a stored transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEdit {
    pub notes: Option<String>,
    pub category_id: Option<i64>,
    pub processed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceKind {
    AccountStatement,
    CreditCard,
}

impl BalanceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BalanceKind::AccountStatement => "account_statement",
            BalanceKind::CreditCard => "credit_card",
        }
    }
}

impl fmt::Display for BalanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BalanceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "account_statement" => Ok(BalanceKind::AccountStatement),
            "credit_card" => Ok(BalanceKind::CreditCard),
            other => Err(format!("Unknown balance kind: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub id: Option<i64>,
    pub account_id: AccountId,
    pub date: NaiveDate,
    pub amount: Money,
    pub kind: BalanceKind,
}
