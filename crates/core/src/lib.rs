pub mod account;
pub mod config;
pub mod error;
pub mod money;
pub mod period;
pub mod rule_set;
pub mod transaction;

pub use account::{Account, AccountId, BankContact, Category};
pub use config::{
    ConfigError, DatabaseSettings, DedupPolicy, DedupSettings, DedupWindow, RuleSettings, SessionSettings,
    Settings, SyncSettings,
};
pub use error::{ErrorCause, ValidationError};
pub use money::Money;
pub use period::DateRange;
pub use rule_set::RuleSet;
pub use transaction::{Balance, BalanceKind, RawTransaction, Remittance, Transaction, TransactionEdit};
