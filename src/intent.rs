//! Transfer intent extraction
//!
//! Interprets a typed message or transcribed utterance and produces a
//! structured transfer intent (who, how much) or nothing. Advisory only:
//! the extractor never authorizes anything, it supplies a candidate that
//! downstream logic confirms or discards.

use crate::models::{Beneficiary, TransferIntent};

/// Saved recipients known to the extractor.
///
/// Recipient recognition is a case-insensitive substring match on the
/// alias, the full name, or the first name.
#[derive(Debug, Clone)]
pub struct BeneficiaryDirectory {
    entries: Vec<Beneficiary>,
}

impl BeneficiaryDirectory {
    pub fn new(entries: Vec<Beneficiary>) -> Self {
        Self { entries }
    }

    /// Demo directory matching the seeded test users
    pub fn with_defaults() -> Self {
        Self::new(vec![
            Beneficiary {
                alias: "akeem".to_string(),
                name: "Akeem Oluwaseun".to_string(),
                bank: "GTBank".to_string(),
                account_number: "0321230165".to_string(),
            },
            Beneficiary {
                alias: "tunde".to_string(),
                name: "Tunde Bakare".to_string(),
                bank: "Zenith".to_string(),
                account_number: "0987654321".to_string(),
            },
            Beneficiary {
                alias: "aminat".to_string(),
                name: "Aminat Adetunji".to_string(),
                bank: "Opay".to_string(),
                account_number: "1234567890".to_string(),
            },
        ])
    }

    /// Fuzzy lookup by free text
    pub fn lookup(&self, text: &str) -> Option<&Beneficiary> {
        let text_lower = text.to_lowercase();

        self.entries.iter().find(|b| {
            let first_name = b.name.split_whitespace().next().unwrap_or_default();
            text_lower.contains(&b.alias.to_lowercase())
                || text_lower.contains(&b.name.to_lowercase())
                || (!first_name.is_empty()
                    && text_lower.contains(&first_name.to_lowercase()))
        })
    }

    /// Exact lookup by account reference
    pub fn by_reference(&self, reference: &str) -> Option<&Beneficiary> {
        self.entries.iter().find(|b| b.account_number == reference)
    }

    pub fn entries(&self) -> &[Beneficiary] {
        &self.entries
    }
}

/// Intent extractor over a beneficiary directory
pub struct IntentExtractor {
    directory: BeneficiaryDirectory,
}

impl IntentExtractor {
    pub fn new(directory: BeneficiaryDirectory) -> Self {
        Self { directory }
    }

    /// Extract a transfer intent from free text, or nothing.
    ///
    /// No match on either recipient or amount means no intent; the caller
    /// must not proceed to a challenge on a partial match.
    pub fn extract(&self, text: &str) -> Option<TransferIntent> {
        let beneficiary = self.directory.lookup(text)?;
        let amount_minor_units = parse_amount_minor_units(text)?;

        Some(TransferIntent {
            recipient_reference: beneficiary.account_number.clone(),
            amount_minor_units,
        })
    }

    pub fn directory(&self) -> &BeneficiaryDirectory {
        &self.directory
    }
}

/// Parse the first monetary amount in the text into minor units (kobo).
///
/// Accepts plain integers, thousands separators, a currency sign, and the
/// spoken "k" shorthand ("5k" → 5000 major units).
pub fn parse_amount_minor_units(text: &str) -> Option<i64> {
    for raw in text.split_whitespace() {
        let token = raw
            .trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '.')
            .trim_start_matches('₦')
            .to_lowercase();

        if token.is_empty() {
            continue;
        }

        let (digits, multiplier) = match token.strip_suffix('k') {
            Some(rest) => (rest, 1000.0),
            None => (token.as_str(), 1.0),
        };

        let digits = digits.replace(',', "");
        if digits.is_empty() || !digits.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            continue;
        }

        if let Ok(value) = digits.parse::<f64>() {
            let major = value * multiplier;
            if major > 0.0 {
                return Some((major * 100.0).round() as i64);
            }
        }
    }

    None
}
