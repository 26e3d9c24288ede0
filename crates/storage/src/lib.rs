pub mod accounts;
pub mod balances;
pub mod categories;
pub mod db;
pub mod error;
pub mod rule_sets;
pub mod transactions;

pub use accounts::{
    clear_bank_contact_pin, get_account, get_all_accounts, get_bank_contact, insert_account,
    insert_bank_contact,
};
pub use balances::{insert_balance, latest_balance};
pub use categories::{delete_category, insert_category, list_categories, CategoryError};
pub use db::{create_db, DbPool};
pub use error::{StorageError, StorageResult};
pub use rule_sets::{
    delete_rule_set, get_rule_set, insert_rule_set, list_rule_sets, replace_rule_set,
    rule_set_exists,
};
pub use transactions::{
    assign_rule_set, delete_transaction, get_transaction, insert_transaction, list_transactions,
    select_rule_candidates, update_transaction, RuleCandidateFilter, TransactionFilter,
};
