use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::error::ValidationError;

/// Named collection of text fragments that, when matched against a
/// transaction's narrative text, assigns a note and/or category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub id: Option<i64>,
    pub name: String,
    pub note: Option<String>,
    pub category_id: Option<i64>,
    /// Ordered; matched case-insensitively as substrings.
    pub fragments: Vec<String>,
    /// Stored with the rule set but not consulted when matching.
    pub account_ids: Vec<AccountId>,
}

impl RuleSet {
    pub fn new(name: &str, fragments: &[&str]) -> Self {
        RuleSet {
            id: None,
            name: name.to_string(),
            note: None,
            category_id: None,
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            account_ids: Vec::new(),
        }
    }

    /// Checks required fields and returns a copy with trimmed name, blank
    /// fragments dropped and an empty note unset.
    pub fn validated(&self) -> Result<RuleSet, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingField("name"));
        }

        let fragments = self
            .fragments
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();

        let mut account_ids = self.account_ids.clone();
        account_ids.sort();
        account_ids.dedup();

        Ok(RuleSet {
            id: self.id,
            name: name.to_string(),
            note: self.note.as_deref().map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
            category_id: self.category_id,
            fragments,
            account_ids,
        })
    }
}
