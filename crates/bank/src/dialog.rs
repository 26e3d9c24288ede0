use bankfeed_core::{AccountId, Balance, BalanceKind, Money, RawTransaction};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::client::{BankAccount, TanChallenge};

/// Outcome vocabulary of a bank dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialogStatus {
    #[serde(rename = "OK")]
    Ok,
    Error,
    #[serde(rename = "WrongPIN")]
    WrongPin,
    /// Suspended until the TAN is supplied.
    #[serde(rename = "RequiresTAN")]
    RequiresTan,
    NoBankAccounts,
    NoBankMessages,
    NoBankingInformation,
    NoBankingInformationUpdated,
    NoTanMethods,
    NoAccountStatements,
    AccountNumberUnknownAtBank,
}

impl DialogStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DialogStatus::Ok => "OK",
            DialogStatus::Error => "Error",
            DialogStatus::WrongPin => "WrongPIN",
            DialogStatus::RequiresTan => "RequiresTAN",
            DialogStatus::NoBankAccounts => "NoBankAccounts",
            DialogStatus::NoBankMessages => "NoBankMessages",
            DialogStatus::NoBankingInformation => "NoBankingInformation",
            DialogStatus::NoBankingInformationUpdated => "NoBankingInformationUpdated",
            DialogStatus::NoTanMethods => "NoTanMethods",
            DialogStatus::NoAccountStatements => "NoAccountStatements",
            DialogStatus::AccountNumberUnknownAtBank => "AccountNumberUnknownAtBank",
        }
    }

    /// Only a missing account list is worth another synchronize round-trip.
    pub fn is_retryable(self) -> bool {
        self == DialogStatus::NoBankAccounts
    }
}

impl fmt::Display for DialogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Balance reported alongside a statement download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementBalance {
    pub date: NaiveDate,
    pub amount: Money,
    pub kind: BalanceKind,
}

impl StatementBalance {
    pub fn into_balance(self, account_id: AccountId) -> Balance {
        Balance {
            id: None,
            account_id,
            date: self.date,
            amount: self.amount,
            kind: self.kind,
        }
    }
}

/// Statements of one account flattened into a single list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementDownload {
    pub account_number: String,
    pub transactions: Vec<RawTransaction>,
    pub is_account_statement: bool,
    pub balance: Option<StatementBalance>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogPayload {
    None,
    Tan(TanChallenge),
    Accounts(Vec<BankAccount>),
    Statements(StatementDownload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogResult {
    pub status: DialogStatus,
    /// Bank or client text explaining a failure, passed through unchanged.
    pub message: Option<String>,
    pub payload: DialogPayload,
}

impl DialogResult {
    pub fn ok(payload: DialogPayload) -> Self {
        Self {
            status: DialogStatus::Ok,
            message: None,
            payload,
        }
    }

    pub fn status(status: DialogStatus) -> Self {
        Self {
            status,
            message: None,
            payload: DialogPayload::None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: DialogStatus::Error,
            message: Some(message.into()),
            payload: DialogPayload::None,
        }
    }

    pub fn wrong_pin(message: impl Into<String>) -> Self {
        Self {
            status: DialogStatus::WrongPin,
            message: Some(message.into()),
            payload: DialogPayload::None,
        }
    }

    pub fn requires_tan(challenge: TanChallenge) -> Self {
        Self {
            status: DialogStatus::RequiresTan,
            message: Some(challenge.challenge.clone()),
            payload: DialogPayload::Tan(challenge),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == DialogStatus::Ok
    }

    pub fn tan_challenge(&self) -> Option<&TanChallenge> {
        match &self.payload {
            DialogPayload::Tan(challenge) => Some(challenge),
            _ => None,
        }
    }
}
