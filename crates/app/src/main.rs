use anyhow::{Context, Result};
use bankfeed_core::Settings;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{AccountsCommands, CategoriesCommands, Cli, Commands, ContactsCommands, RulesCommands};
use commands::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let project_dirs = directories::ProjectDirs::from("com", "bankfeed", "Bankfeed")
        .context("Failed to get app directory")?;

    let settings = load_settings(cli.config.as_deref(), project_dirs.config_dir())?;
    let db_path = match cli.database.clone().or_else(|| settings.database.path.clone()) {
        Some(path) => path,
        None => {
            let data_dir = project_dirs.data_dir();
            std::fs::create_dir_all(data_dir)
                .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
            data_dir.join("bankfeed.db")
        }
    };
    tracing::debug!(path = %db_path.display(), "Opening database");

    let db = bankfeed_storage::create_db(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let state = AppState::new(db, settings);

    match cli.command {
        Commands::Contacts { command } => match command {
            ContactsCommands::Add {
                name,
                url,
                bank_id,
                user_id,
                pin,
            } => commands::add_contact(&state, &name, &url, &bank_id, &user_id, pin).await,
        },
        Commands::Accounts { command } => match command {
            AccountsCommands::Add {
                name,
                number,
                iban,
                contact,
            } => commands::add_account(&state, &name, number, iban, contact).await,
            AccountsCommands::List => commands::list_accounts(&state).await,
        },
        Commands::Categories { command } => match command {
            CategoriesCommands::Add { name } => commands::add_category(&state, &name).await,
            CategoriesCommands::List => commands::list_all_categories(&state).await,
            CategoriesCommands::Delete { id } => commands::remove_category(&state, id).await,
        },
        Commands::Import {
            file,
            account,
            profile,
        } => commands::import_file(&state, &file, account, &profile).await,
        Commands::Rules { command } => match command {
            RulesCommands::Add {
                name,
                fragments,
                note,
                category,
            } => commands::add_rule_set(&state, &name, fragments, note, category).await,
            RulesCommands::List => commands::list_all_rule_sets(&state).await,
            RulesCommands::Delete { id } => commands::remove_rule_set(&state, id).await,
            RulesCommands::Apply {
                include_processed,
                include_with_rule_set,
                min_match_rate,
            } => commands::apply_rules(&state, include_processed, include_with_rule_set, min_match_rate).await,
        },
        Commands::Transactions {
            account,
            from,
            to,
            text,
        } => commands::show_transactions(&state, account, from, to, text).await,
    }
}

/// An explicit path must exist; the default location is optional.
fn load_settings(explicit: Option<&Path>, config_dir: &Path) -> Result<Settings> {
    if let Some(path) = explicit {
        return Ok(Settings::load(path)?);
    }
    let default_path: PathBuf = config_dir.join("bankfeed.toml");
    if default_path.exists() {
        return Ok(Settings::load(&default_path)?);
    }
    Ok(Settings::default())
}
