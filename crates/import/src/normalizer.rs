//! Recovers SEPA remittance sub-fields that banks pack into the narrative
//! text of a statement line.
//!
//! Markers are located by their last occurrence and consumed right to left,
//! so cutting the text at one marker never destroys a marker further left
//! that is still waiting to be extracted.

use std::str::FromStr;

use bankfeed_core::{RawTransaction, Remittance};
use rust_decimal::Decimal;

/// Values some banks send instead of leaving a reference empty.
const NOT_SPECIFIED: &[&str] = &["NICHTANGEGEBEN", "NOTPROVIDED"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemittanceField {
    Iban,
    Bic,
    CreditorId,
    MandateReference,
    EndToEndReference,
    AltBeneficiary,
    AltOriginator,
    RemittanceInfo,
}

/// How an extracted raw value is cleaned up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    /// All whitespace removed.
    Identifier,
    /// All whitespace removed; dropped when it is a not-specified sentinel.
    Reference,
    FreeText,
}

impl RemittanceField {
    pub const ALL: [RemittanceField; 8] = [
        RemittanceField::Iban,
        RemittanceField::Bic,
        RemittanceField::CreditorId,
        RemittanceField::MandateReference,
        RemittanceField::EndToEndReference,
        RemittanceField::AltBeneficiary,
        RemittanceField::AltOriginator,
        RemittanceField::RemittanceInfo,
    ];

    /// Marker synonyms, in preference order for equal positions.
    pub fn markers(self) -> &'static [&'static str] {
        match self {
            RemittanceField::Iban => &["IBAN+", "IBAN:", " IBAN "],
            RemittanceField::Bic => &["BIC+", "BIC:", " BIC "],
            RemittanceField::CreditorId => &["CRED+", "GLÄUBIGER-ID:", "GLAEUBIGER-ID:", "CRED:", " CRED "],
            RemittanceField::MandateReference => &["MREF+", "MANDATSREF.:", "MANDATSREF:", "MREF:", " MREF "],
            RemittanceField::EndToEndReference => &["EREF+", "END-TO-END-REF.:", "EREF:", " EREF "],
            RemittanceField::AltBeneficiary => &["ABWE+", "ABWE:"],
            RemittanceField::AltOriginator => &["ABWA+", "ABWA:"],
            RemittanceField::RemittanceInfo => &["SVWZ+", "SVWZ:"],
        }
    }

    fn kind(self) -> ValueKind {
        match self {
            RemittanceField::Iban
            | RemittanceField::Bic
            | RemittanceField::CreditorId
            | RemittanceField::MandateReference => ValueKind::Identifier,
            RemittanceField::EndToEndReference
            | RemittanceField::AltBeneficiary
            | RemittanceField::AltOriginator => ValueKind::Reference,
            RemittanceField::RemittanceInfo => ValueKind::FreeText,
        }
    }

    fn slot(self, r: &mut Remittance) -> &mut Option<String> {
        match self {
            RemittanceField::Iban => &mut r.iban,
            RemittanceField::Bic => &mut r.bic,
            RemittanceField::CreditorId => &mut r.creditor_id,
            RemittanceField::MandateReference => &mut r.mandate_reference,
            RemittanceField::EndToEndReference => &mut r.end_to_end_reference,
            RemittanceField::AltBeneficiary => &mut r.alt_beneficiary,
            RemittanceField::AltOriginator => &mut r.alt_originator,
            RemittanceField::RemittanceInfo => &mut r.remittance_info,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Marker {
    field: RemittanceField,
    position: usize,
    len: usize,
}

/// Rightmost occurrence of any synonym; longer synonyms win ties.
fn last_marker(text: &str, field: RemittanceField) -> Option<Marker> {
    field
        .markers()
        .iter()
        .filter_map(|m| text.rfind(m).map(|position| (position, m.len())))
        .max_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)))
        .map(|(position, len)| Marker { field, position, len })
}

fn clean_value(kind: ValueKind, raw: &str) -> Option<String> {
    let value = match kind {
        ValueKind::Identifier | ValueKind::Reference => strip_whitespace(raw),
        ValueKind::FreeText => raw.trim().to_string(),
    };
    if value.is_empty() {
        return None;
    }
    if kind == ValueKind::Reference && is_not_specified(&value) {
        return None;
    }
    Some(value)
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn is_not_specified(value: &str) -> bool {
    let folded = strip_whitespace(value).to_uppercase();
    NOT_SPECIFIED.contains(&folded.as_str())
}

/// Splits `text` into its free-text remainder and the remittance values
/// found in it. The remittance text (SVWZ), when present, leads the remainder.
pub fn extract_remittance(text: &str) -> (String, Vec<(RemittanceField, String)>) {
    let mut markers: Vec<Marker> = RemittanceField::ALL
        .iter()
        .filter_map(|f| last_marker(text, *f))
        .collect();
    markers.sort_by(|a, b| b.position.cmp(&a.position));

    let mut rest = text;
    let mut values = Vec::with_capacity(markers.len());
    for marker in markers {
        // A marker overlapping one already consumed to its right is gone.
        let value_start = marker.position + marker.len;
        if value_start > rest.len() {
            continue;
        }
        if let Some(value) = clean_value(marker.field.kind(), &rest[value_start..]) {
            values.push((marker.field, value));
        }
        rest = &rest[..marker.position];
    }

    let mut remainder = rest.trim().to_string();
    if let Some((_, info)) = values
        .iter()
        .find(|(f, _)| *f == RemittanceField::RemittanceInfo)
    {
        remainder = format!("{info} {remainder}").trim().to_string();
    }

    (remainder, values)
}

fn blank_to_none(value: &mut Option<String>) {
    *value = value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
}

fn is_numeric_zero(s: &str) -> bool {
    Decimal::from_str(s).is_ok_and(|d| d.is_zero())
}

/// Normalizes one raw record: narrative text reduced to its free-text
/// remainder, remittance fields populated, blank optionals unset, a zero
/// sequence number unset and `processed` defaulted to false.
///
/// Fields already populated are kept when the text carries no marker for
/// them. Normalizing a result again is a no-op as long as its remainder
/// holds no further markers; an earlier duplicate marker left in the text
/// is extracted on the next pass.
pub fn normalize(mut tx: RawTransaction) -> RawTransaction {
    let (text, values) = extract_remittance(&tx.text);
    tx.text = text;
    for (field, value) in values {
        *field.slot(&mut tx.remittance) = Some(value);
    }

    for slot in [
        &mut tx.notes,
        &mut tx.payee,
        &mut tx.payee_account_number,
        &mut tx.entry_text,
        &mut tx.bank_transaction_code,
        &mut tx.sequence_number,
    ] {
        blank_to_none(slot);
    }
    for field in RemittanceField::ALL {
        blank_to_none(field.slot(&mut tx.remittance));
    }

    if tx.sequence_number.as_deref().is_some_and(is_numeric_zero) {
        tx.sequence_number = None;
    }
    tx.processed = Some(tx.processed.unwrap_or(false));

    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankfeed_core::Money;
    use chrono::NaiveDate;

    fn raw(text: &str) -> RawTransaction {
        RawTransaction::new(
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            Money::from_cents(-4999),
            text,
        )
    }

    #[test]
    fn extracts_eref_and_mref() {
        let tx = normalize(raw("Kauf EREF: X123 MREF: M456"));
        assert_eq!(tx.text, "Kauf");
        assert_eq!(tx.remittance.end_to_end_reference.as_deref(), Some("X123"));
        assert_eq!(tx.remittance.mandate_reference.as_deref(), Some("M456"));
    }

    #[test]
    fn full_sepa_direct_debit_line() {
        let tx = normalize(raw(
            "Lastschrift EREF+ 2024 0115 01 MREF+ ABC 123 CRED+ DE98ZZZ09999999999 \
             IBAN+ DE02 1203 0000 0000 2020 51 BIC+ BYLADEM1001 SVWZ+ Strom Januar 2024",
        ));
        let r = &tx.remittance;
        assert_eq!(r.end_to_end_reference.as_deref(), Some("2024011501"));
        assert_eq!(r.mandate_reference.as_deref(), Some("ABC123"));
        assert_eq!(r.creditor_id.as_deref(), Some("DE98ZZZ09999999999"));
        assert_eq!(r.iban.as_deref(), Some("DE02120300000000202051"));
        assert_eq!(r.bic.as_deref(), Some("BYLADEM1001"));
        assert_eq!(r.remittance_info.as_deref(), Some("Strom Januar 2024"));
        assert_eq!(tx.text, "Strom Januar 2024 Lastschrift");
    }

    #[test]
    fn not_specified_sentinels_are_dropped() {
        let tx = normalize(raw("Gutschrift EREF+NOTPROVIDED"));
        assert!(tx.remittance.end_to_end_reference.is_none());
        assert_eq!(tx.text, "Gutschrift");

        let tx = normalize(raw("Gutschrift EREF: NICHT ANGEGEBEN"));
        assert!(tx.remittance.end_to_end_reference.is_none());

        let tx = normalize(raw("Miete ABWA+ nicht angegeben"));
        assert!(tx.remittance.alt_originator.is_none());
    }

    #[test]
    fn alternate_parties_are_whitespace_stripped() {
        let tx = normalize(raw("Gehalt ABWA+ Max Mustermann GmbH ABWE+ Erika Muster"));
        assert_eq!(tx.remittance.alt_originator.as_deref(), Some("MaxMustermannGmbH"));
        assert_eq!(tx.remittance.alt_beneficiary.as_deref(), Some("ErikaMuster"));
        assert_eq!(tx.text, "Gehalt");

        let tx = normalize(raw("Gehalt ABWA+ Max Mustermann EREF+ A B"));
        assert_eq!(tx.remittance.alt_originator.as_deref(), Some("MaxMustermann"));
        assert_eq!(tx.remittance.end_to_end_reference.as_deref(), Some("AB"));
    }

    #[test]
    fn only_last_occurrence_counts() {
        let tx = normalize(raw("EREF: FIRST Zahlung EREF: SECOND"));
        assert_eq!(tx.remittance.end_to_end_reference.as_deref(), Some("SECOND"));
        assert_eq!(tx.text, "EREF: FIRST Zahlung");
    }

    #[test]
    fn long_synonym_is_recognized() {
        let tx = normalize(raw("Kartenzahlung END-TO-END-REF.: 99887766"));
        assert_eq!(tx.remittance.end_to_end_reference.as_deref(), Some("99887766"));
        assert_eq!(tx.text, "Kartenzahlung");
    }

    #[test]
    fn text_without_markers_is_only_trimmed() {
        let tx = normalize(raw("   Bargeldauszahlung Automat 12  "));
        assert_eq!(tx.text, "Bargeldauszahlung Automat 12");
        assert_eq!(tx.remittance, Remittance::default());
    }

    #[test]
    fn normalize_is_idempotent() {
        let inputs = [
            "Kauf EREF: X123 MREF: M456",
            "SVWZ+ Rechnung 42 EREF+ R42 IBAN+ DE02120300000000202051",
            "Dauerauftrag Miete",
            "",
        ];
        for input in inputs {
            let once = normalize(raw(input));
            let twice = normalize(once.clone());
            assert_eq!(once, twice, "input: {input:?}");
        }
    }

    #[test]
    fn blank_optionals_become_unset() {
        let mut tx = raw("Kauf");
        tx.payee = Some("   ".to_string());
        tx.entry_text = Some(" Lastschrift ".to_string());
        tx.notes = Some(String::new());
        let tx = normalize(tx);
        assert!(tx.payee.is_none());
        assert!(tx.notes.is_none());
        assert_eq!(tx.entry_text.as_deref(), Some("Lastschrift"));
    }

    #[test]
    fn zero_or_blank_sequence_number_is_unset() {
        for seq in ["0", "000", " ", "0.00"] {
            let mut tx = raw("Kauf");
            tx.sequence_number = Some(seq.to_string());
            assert!(normalize(tx).sequence_number.is_none(), "seq: {seq:?}");
        }
        let mut tx = raw("Kauf");
        tx.sequence_number = Some("0815".to_string());
        assert_eq!(normalize(tx).sequence_number.as_deref(), Some("0815"));
    }

    #[test]
    fn processed_defaults_to_false() {
        assert_eq!(normalize(raw("x")).processed, Some(false));
        let mut tx = raw("x");
        tx.processed = Some(true);
        assert_eq!(normalize(tx).processed, Some(true));
    }
}
