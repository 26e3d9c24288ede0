use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bankfeed", version, about = "Bank transaction ingestion and rule-based categorization.")]
pub struct Cli {
    /// Configuration file (default: platform config dir / bankfeed.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// SQLite database, overrides the configured path
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage online-banking logins.
    Contacts {
        #[command(subcommand)]
        command: ContactsCommands,
    },
    /// Manage accounts.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommands,
    },
    /// Manage categories.
    Categories {
        #[command(subcommand)]
        command: CategoriesCommands,
    },
    /// Import a CSV export into an account and run the rule sets on it.
    Import {
        /// Path to the CSV file
        file: PathBuf,
        /// Account id to import into
        #[arg(long)]
        account: i64,
        /// TOML column-mapping profile
        #[arg(long)]
        profile: PathBuf,
    },
    /// Manage rule sets and re-run them.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
    /// List stored transactions.
    Transactions {
        #[arg(long)]
        account: Option<i64>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Case-insensitive text filter
        #[arg(long)]
        text: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ContactsCommands {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
        #[arg(long = "bank-id")]
        bank_id: String,
        #[arg(long = "user-id")]
        user_id: String,
        /// Read from BANKFEED_PIN when omitted
        #[arg(long, env = "BANKFEED_PIN", hide_env_values = true)]
        pin: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum AccountsCommands {
    Add {
        name: String,
        /// Account number as used by the bank
        #[arg(long)]
        number: Option<String>,
        #[arg(long)]
        iban: Option<String>,
        /// Bank contact id
        #[arg(long)]
        contact: Option<i64>,
    },
    List,
}

#[derive(Subcommand)]
pub enum CategoriesCommands {
    Add { name: String },
    List,
    Delete { id: i64 },
}

#[derive(Subcommand)]
pub enum RulesCommands {
    Add {
        name: String,
        /// Text fragment, repeatable
        #[arg(long = "fragment", required = true)]
        fragments: Vec<String>,
        #[arg(long)]
        note: Option<String>,
        #[arg(long)]
        category: Option<i64>,
    },
    List,
    Delete { id: i64 },
    /// Re-run rule sets over stored transactions.
    Apply {
        #[arg(long)]
        include_processed: bool,
        #[arg(long)]
        include_with_rule_set: bool,
        /// Percentage of fragments that must match (default from config)
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=100))]
        min_match_rate: Option<u32>,
    },
}
