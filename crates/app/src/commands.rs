use anyhow::{bail, Context, Result};
use bankfeed_core::{Account, AccountId, BankContact, DateRange, RuleSet, Settings};
use bankfeed_import::{import_csv, CsvImportProfile, IngestSource, IngestionPipeline, RuleApplication};
use bankfeed_storage::{
    delete_category, get_all_accounts, insert_account, insert_bank_contact, insert_category, list_categories,
    list_rule_sets, list_transactions, DbPool, TransactionFilter,
};
use chrono::NaiveDate;
use std::fs::File;
use std::path::Path;

/// Shared handles for one CLI invocation.
pub struct AppState {
    pub db: DbPool,
    pub settings: Settings,
    pub pipeline: IngestionPipeline,
}

impl AppState {
    pub fn new(db: DbPool, settings: Settings) -> Self {
        let pipeline = IngestionPipeline::new(&settings);
        Self { db, settings, pipeline }
    }
}

pub async fn add_contact(
    state: &AppState,
    name: &str,
    url: &str,
    bank_id: &str,
    user_id: &str,
    pin: Option<String>,
) -> Result<()> {
    let contact = BankContact {
        id: None,
        name: name.to_string(),
        url: url.to_string(),
        bank_id: bank_id.to_string(),
        user_id: user_id.to_string(),
        pin,
    };
    contact.validate()?;

    let mut conn = state.db.acquire().await?;
    let id = insert_bank_contact(&mut conn, &contact).await?;
    println!("Added bank contact {id}: {name}");
    Ok(())
}

pub async fn add_account(
    state: &AppState,
    name: &str,
    number: Option<String>,
    iban: Option<String>,
    contact: Option<i64>,
) -> Result<()> {
    if name.trim().is_empty() {
        bail!("Account name must not be empty");
    }
    let account = Account {
        id: None,
        name: name.trim().to_string(),
        account_number: number,
        iban,
        bank_contact_id: contact,
    };

    let mut conn = state.db.acquire().await?;
    let id = insert_account(&mut conn, &account).await?;
    println!("Added account {id}: {}", account.name);
    Ok(())
}

pub async fn list_accounts(state: &AppState) -> Result<()> {
    let mut conn = state.db.acquire().await?;
    for account in get_all_accounts(&mut conn).await? {
        let id = account.id.map(|i| i.0).unwrap_or_default();
        println!(
            "{id:>4}  {:<24} {:<16} {}",
            account.name,
            account.account_number.as_deref().unwrap_or("-"),
            account.iban.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

pub async fn add_category(state: &AppState, name: &str) -> Result<()> {
    let mut conn = state.db.acquire().await?;
    let id = insert_category(&mut conn, name).await?;
    println!("Added category {id}: {}", name.trim());
    Ok(())
}

pub async fn list_all_categories(state: &AppState) -> Result<()> {
    let mut conn = state.db.acquire().await?;
    for category in list_categories(&mut conn).await? {
        println!("{:>4}  {}", category.id.unwrap_or_default(), category.name);
    }
    Ok(())
}

pub async fn remove_category(state: &AppState, id: i64) -> Result<()> {
    let mut conn = state.db.acquire().await?;
    delete_category(&mut conn, id).await?;
    println!("Deleted category {id}");
    Ok(())
}

/// Bulk upload: parse with the profile, then ingest with the bulk dedup policy.
pub async fn import_file(state: &AppState, file: &Path, account: i64, profile: &Path) -> Result<()> {
    let profile_text = std::fs::read_to_string(profile)
        .with_context(|| format!("Failed to read profile {}", profile.display()))?;
    let profile = CsvImportProfile::from_toml(&profile_text)?;
    let data = File::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
    let candidates = import_csv(data, &profile)?;

    let outcome = state
        .pipeline
        .ingest(&state.db, AccountId(account), IngestSource::BulkUpload, candidates, None)
        .await?;

    println!(
        "Imported {} transactions ({} duplicates skipped, {} categorized)",
        outcome.inserted.len(),
        outcome.duplicates,
        outcome.rules.matched,
    );
    Ok(())
}

pub async fn add_rule_set(
    state: &AppState,
    name: &str,
    fragments: Vec<String>,
    note: Option<String>,
    category: Option<i64>,
) -> Result<()> {
    let rule_set = RuleSet {
        id: None,
        name: name.to_string(),
        note,
        category_id: category,
        fragments,
        account_ids: Vec::new(),
    };
    let id = state.pipeline.rules().create(&state.db, &rule_set).await?;
    println!("Added rule set {id}: {}", name.trim());
    Ok(())
}

pub async fn list_all_rule_sets(state: &AppState) -> Result<()> {
    let mut conn = state.db.acquire().await?;
    for rs in list_rule_sets(&mut conn).await? {
        println!(
            "{:>4}  {:<24} [{}]{}",
            rs.id.unwrap_or_default(),
            rs.name,
            rs.fragments.join(", "),
            rs.note.map(|n| format!("  note: {n}")).unwrap_or_default(),
        );
    }
    Ok(())
}

pub async fn remove_rule_set(state: &AppState, id: i64) -> Result<()> {
    let detached = state.pipeline.rules().delete(&state.db, id).await?;
    println!("Deleted rule set {id} ({detached} transactions detached)");
    Ok(())
}

pub async fn apply_rules(
    state: &AppState,
    include_processed: bool,
    include_with_rule_set: bool,
    min_match_rate: Option<u32>,
) -> Result<()> {
    let application = RuleApplication {
        transaction_ids: None,
        include_processed,
        include_with_rule_set,
        min_match_rate,
    };
    let summary = state.pipeline.rules().apply(&state.db, &application).await?;
    println!(
        "Matched {} of {} transactions against {} rule sets (threshold {}%)",
        summary.matched,
        summary.candidates,
        summary.rule_sets,
        min_match_rate.unwrap_or(state.settings.rules.min_match_rate),
    );
    Ok(())
}

pub async fn show_transactions(
    state: &AppState,
    account: Option<i64>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    text: Option<String>,
) -> Result<()> {
    let value_dates = match (from, to) {
        (None, None) => None,
        // Stored dates compare as ISO text, so open ends use four-digit years.
        (from, to) => Some(DateRange::new(
            from.or_else(|| NaiveDate::from_ymd_opt(1, 1, 1)).unwrap_or(NaiveDate::MIN),
            to.or_else(|| NaiveDate::from_ymd_opt(9999, 12, 31)).unwrap_or(NaiveDate::MAX),
        )),
    };
    let filter = TransactionFilter {
        account_ids: account.map(AccountId).into_iter().collect(),
        value_dates,
        text_contains: text,
        ..Default::default()
    };

    let mut conn = state.db.acquire().await?;
    for tx in list_transactions(&mut conn, &filter).await? {
        println!(
            "{:>6}  {}  {:>12}  {}{}",
            tx.id,
            tx.value_date,
            tx.amount.to_string(),
            tx.text,
            if tx.processed { "  *" } else { "" },
        );
    }
    Ok(())
}
