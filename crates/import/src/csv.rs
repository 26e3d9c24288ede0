use bankfeed_core::{ErrorCause, Money, RawTransaction};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::str::FromStr;
use thiserror::Error;

/// Zero-based column positions of a bulk upload file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvColumnMapping {
    pub booking_date_column: Option<usize>,
    /// Falls back to the booking date when unset or blank.
    pub value_date_column: Option<usize>,
    pub text_column: Option<usize>,
    /// Signed amount. Takes precedence over debit/credit.
    pub amount_column: Option<usize>,
    /// Outflow, stored negative.
    pub debit_column: Option<usize>,
    /// Inflow, stored positive.
    pub credit_column: Option<usize>,
    pub payee_column: Option<usize>,
    pub payee_account_column: Option<usize>,
    pub notes_column: Option<usize>,
    pub date_format: String,
}

impl Default for CsvColumnMapping {
    fn default() -> Self {
        Self {
            booking_date_column: None,
            value_date_column: None,
            text_column: None,
            amount_column: None,
            debit_column: None,
            credit_column: None,
            payee_column: None,
            payee_account_column: None,
            notes_column: None,
            date_format: "%Y-%m-%d".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvImportProfile {
    pub name: String,
    pub mapping: CsvColumnMapping,
    pub has_header: bool,
    pub delimiter: String,
    /// Amounts are written `1.234,56`.
    pub decimal_comma: bool,
}

impl Default for CsvImportProfile {
    fn default() -> Self {
        Self {
            name: "Unnamed Profile".to_string(),
            mapping: CsvColumnMapping::default(),
            has_header: true,
            delimiter: ",".to_string(),
            decimal_comma: false,
        }
    }
}

impl CsvImportProfile {
    pub fn from_toml(content: &str) -> Result<Self, CsvError> {
        Ok(toml::from_str(content)?)
    }
}

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Invalid profile: {0}")]
    Profile(#[from] toml::de::Error),
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("Invalid date format: {0}")]
    InvalidDate(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("No data rows")]
    NoDataRows,
}

impl CsvError {
    pub fn cause(&self) -> ErrorCause {
        match self {
            CsvError::IoError(_) => ErrorCause::Unknown,
            _ => ErrorCause::Invalid,
        }
    }
}

pub struct CsvImporter;

impl CsvImporter {
    pub fn parse_profile<R: Read>(
        reader: &mut csv::Reader<R>,
        profile: &CsvImportProfile,
    ) -> Result<Vec<RawTransaction>, CsvError> {
        let mapping = &profile.mapping;
        let date_col = mapping
            .booking_date_column
            .ok_or_else(|| CsvError::MissingColumn("booking_date_column".to_string()))?;
        if mapping.amount_column.is_none() && mapping.debit_column.is_none() && mapping.credit_column.is_none() {
            return Err(CsvError::MissingColumn("amount_column".to_string()));
        }

        let mut transactions = Vec::new();

        for result in reader.records() {
            let record = result?;

            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }

            let field = |col: Option<usize>| {
                col.and_then(|c| record.get(c))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
            };

            let booking_date = record
                .get(date_col)
                .ok_or_else(|| CsvError::MissingColumn(format!("booking_date_column {date_col}")))
                .and_then(|s| parse_date(s, &mapping.date_format))?;
            let value_date = field(mapping.value_date_column)
                .map(|s| parse_date(s, &mapping.date_format))
                .transpose()?
                .unwrap_or(booking_date);

            let amount = if let Some(col) = mapping.amount_column {
                let raw = record
                    .get(col)
                    .ok_or_else(|| CsvError::MissingColumn(format!("amount_column {col}")))?;
                parse_amount(raw, profile.decimal_comma)?
            } else {
                let debit_raw = field(mapping.debit_column);
                let credit_raw = field(mapping.credit_column);
                let magnitude = |raw: Option<&str>| -> Result<i64, CsvError> {
                    let Some(s) = raw else { return Ok(0) };
                    parse_amount(s, profile.decimal_comma)?
                        .to_cents()
                        .checked_abs()
                        .ok_or_else(|| CsvError::InvalidAmount(s.to_string()))
                };
                let debit = magnitude(debit_raw)?;
                let credit = magnitude(credit_raw)?;
                credit.checked_sub(debit).map(Money::from_cents).ok_or_else(|| {
                    CsvError::InvalidAmount(format!("{} / {}", debit_raw.unwrap_or(""), credit_raw.unwrap_or("")))
                })?
            };

            let mut tx = RawTransaction::new(booking_date, amount, field(mapping.text_column).unwrap_or_default());
            tx.value_date = value_date;
            tx.payee = field(mapping.payee_column).map(str::to_string);
            tx.payee_account_number = field(mapping.payee_account_column).map(str::to_string);
            tx.notes = field(mapping.notes_column).map(str::to_string);

            transactions.push(tx);
        }

        if transactions.is_empty() {
            return Err(CsvError::NoDataRows);
        }

        Ok(transactions)
    }
}

fn parse_date(s: &str, format: &str) -> Result<NaiveDate, CsvError> {
    let s = s.trim();

    if let Ok(date) = NaiveDate::parse_from_str(s, format) {
        return Ok(date);
    }

    for fmt in &["%d.%m.%Y", "%d.%m.%y", "%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    Err(CsvError::InvalidDate(s.to_string()))
}

fn parse_amount(s: &str, decimal_comma: bool) -> Result<Money, CsvError> {
    let s = s.trim();
    let (negative, s) = if s.starts_with('(') && s.ends_with(')') {
        (true, &s[1..s.len() - 1])
    } else {
        (false, s)
    };
    let mut cleaned = s.replace(['€', '$', ' ', '\u{a0}'], "");
    cleaned = if decimal_comma {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned.replace(',', "")
    };
    let mut dec = Decimal::from_str(&cleaned).map_err(|_| CsvError::InvalidAmount(s.to_string()))?;
    if negative {
        dec = -dec;
    }
    Money::from_decimal(dec).ok_or_else(|| CsvError::InvalidAmount(s.to_string()))
}

/// Reads a bulk upload into raw transactions, ready for the ingestion
/// pipeline.
pub fn import_csv<R: Read>(data: R, profile: &CsvImportProfile) -> Result<Vec<RawTransaction>, CsvError> {
    let delimiter = profile
        .delimiter
        .as_bytes()
        .first()
        .copied()
        .unwrap_or(b',');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(profile.has_header)
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(data);

    CsvImporter::parse_profile(&mut reader, profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cents(m: Money) -> i64 {
        m.to_cents()
    }

    #[test]
    fn parse_amount_plain() {
        assert_eq!(cents(parse_amount("123.45", false).unwrap()), 12345);
        assert_eq!(cents(parse_amount("-50.00", false).unwrap()), -5000);
        assert_eq!(cents(parse_amount("100", false).unwrap()), 10000);
    }

    #[test]
    fn parse_amount_thousands_separator() {
        assert_eq!(cents(parse_amount("1,234.56", false).unwrap()), 123456);
        assert_eq!(cents(parse_amount("1.234,56", true).unwrap()), 123456);
        assert_eq!(cents(parse_amount("-12,30 €", true).unwrap()), -1230);
    }

    #[test]
    fn parse_amount_accounting_parens() {
        assert_eq!(cents(parse_amount("(75.25)", false).unwrap()), -7525);
    }

    #[test]
    fn parse_amount_invalid() {
        assert!(parse_amount("not_a_number", false).is_err());
        assert!(parse_amount("", false).is_err());
    }

    #[test]
    fn oversized_amounts_are_invalid() {
        assert!(matches!(
            parse_amount("79228162514264337593543950335", false),
            Err(CsvError::InvalidAmount(_))
        ));

        let profile = CsvImportProfile {
            mapping: CsvColumnMapping {
                booking_date_column: Some(0),
                text_column: Some(1),
                debit_column: Some(2),
                credit_column: Some(3),
                ..Default::default()
            },
            ..default_profile()
        };
        // Fits into cents but has no positive counterpart.
        let data = b"date,text,debit,credit\n2024-01-15,Kaputt,-92233720368547758.08,\n";
        assert!(matches!(import_csv(data.as_ref(), &profile), Err(CsvError::InvalidAmount(_))));
    }

    #[test]
    fn parse_date_falls_back_to_german_format() {
        let d = parse_date("15.01.2024", "%Y-%m-%d").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert!(parse_date("not-a-date", "%Y-%m-%d").is_err());
    }

    fn default_profile() -> CsvImportProfile {
        CsvImportProfile {
            name: "test".to_string(),
            mapping: CsvColumnMapping {
                booking_date_column: Some(0),
                text_column: Some(1),
                amount_column: Some(2),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn import_csv_basic() {
        let data = b"date,text,amount\n2024-01-15,REWE SAGT DANKE,-49.99\n2024-01-16,Gehalt,2500.00\n";
        let txs = import_csv(data.as_ref(), &default_profile()).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(cents(txs[0].amount), -4999);
        assert_eq!(txs[0].text, "REWE SAGT DANKE");
        assert_eq!(txs[0].value_date, txs[0].booking_date);
        assert_eq!(txs[0].processed, None);
        assert_eq!(cents(txs[1].amount), 250000);
    }

    #[test]
    fn import_csv_debit_credit_columns() {
        let data = b"date,text,debit,credit\n2024-01-15,Einzahlung,,100.00\n2024-01-16,Lastschrift,50.00,\n";
        let profile = CsvImportProfile {
            mapping: CsvColumnMapping {
                booking_date_column: Some(0),
                text_column: Some(1),
                debit_column: Some(2),
                credit_column: Some(3),
                ..Default::default()
            },
            ..default_profile()
        };
        let txs = import_csv(data.as_ref(), &profile).unwrap();
        assert_eq!(cents(txs[0].amount), 10000);
        assert_eq!(cents(txs[1].amount), -5000);
    }

    #[test]
    fn import_german_export_from_toml_profile() {
        let profile = CsvImportProfile::from_toml(
            r#"
            name = "Sparkasse"
            delimiter = ";"
            decimal_comma = true

            [mapping]
            booking_date_column = 0
            value_date_column = 1
            text_column = 2
            payee_column = 3
            amount_column = 4
            date_format = "%d.%m.%Y"
            "#,
        )
        .unwrap();
        let data = "Buchung;Valuta;Text;Empfaenger;Betrag\n\
                    02.01.2024;03.01.2024;Miete Januar;Hausverwaltung;-1.250,00\n";
        let txs = import_csv(data.as_bytes(), &profile).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].value_date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert_eq!(txs[0].payee.as_deref(), Some("Hausverwaltung"));
        assert_eq!(cents(txs[0].amount), -125000);
    }

    #[test]
    fn profile_without_date_column_is_rejected() {
        let profile = CsvImportProfile::default();
        let err = import_csv(b"a,b\n1,2\n".as_ref(), &profile).unwrap_err();
        assert!(matches!(err, CsvError::MissingColumn(_)));
        assert_eq!(err.cause(), ErrorCause::Invalid);
    }

    #[test]
    fn import_csv_no_data_rows_errors() {
        let data = b"date,text,amount\n";
        let result = import_csv(data.as_ref(), &default_profile());
        assert!(matches!(result, Err(CsvError::NoDataRows)));
    }
}
