use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Login data for one online-banking endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankContact {
    pub id: Option<i64>,
    pub name: String,
    pub url: String,
    pub bank_id: String,
    pub user_id: String,
    /// Cleared when the bank rejects it.
    #[serde(skip_serializing)]
    pub pin: Option<String>,
}

impl BankContact {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name"));
        }
        if self.url.trim().is_empty() {
            return Err(ValidationError::MissingField("url"));
        }
        if self.bank_id.trim().is_empty() {
            return Err(ValidationError::MissingField("bank_id"));
        }
        if self.user_id.trim().is_empty() {
            return Err(ValidationError::MissingField("user_id"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Option<AccountId>,
    pub name: String,
    /// Account number as known to the bank.
    pub account_number: Option<String>,
    pub iban: Option<String>,
    pub bank_contact_id: Option<i64>,
}

impl Account {
    pub fn new(name: &str) -> Self {
        Account {
            id: None,
            name: name.to_string(),
            account_number: None,
            iban: None,
            bank_contact_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Option<i64>,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_requires_login_fields() {
        let contact = BankContact {
            id: None,
            name: "Sparkasse".to_string(),
            url: "https://banking.example/fints".to_string(),
            bank_id: "12030000".to_string(),
            user_id: " ".to_string(),
            pin: None,
        };
        assert_eq!(contact.validate(), Err(ValidationError::MissingField("user_id")));
    }

    #[test]
    fn pin_never_serialized() {
        let contact = BankContact {
            id: Some(1),
            name: "Sparkasse".to_string(),
            url: "https://banking.example/fints".to_string(),
            bank_id: "12030000".to_string(),
            user_id: "max".to_string(),
            pin: Some("12345".to_string()),
        };
        let json = serde_json::to_string(&contact).unwrap();
        assert!(!json.contains("12345"));
    }
}
