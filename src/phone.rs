//! Recipient number canonicalization.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::DEFAULT_COUNTRY_CODE;

static NON_DIALABLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\d+]").expect("static regex"));

const MIN_DIGITS: usize = 10;
const MAX_DIGITS: usize = 15;

/// Normalizes numbers into `+<country><subscriber>` form for a fixed default country.
#[derive(Debug, Clone)]
pub struct PhoneNormalizer {
    country_code: String,
}

impl Default for PhoneNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTRY_CODE)
    }
}

impl PhoneNormalizer {
    pub fn new(country_code: impl Into<String>) -> Self {
        Self {
            country_code: country_code.into(),
        }
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    /// Keeps digits and `+`; local numbers lose their leading zeros and gain the
    /// default country code unless they already carry it.
    pub fn normalize(&self, raw: &str) -> String {
        let cleaned = NON_DIALABLE.replace_all(raw, "");
        if cleaned.starts_with('+') {
            return cleaned.into_owned();
        }

        let local = cleaned.trim_start_matches('0');
        if local.starts_with(self.country_code.as_str()) {
            format!("+{local}")
        } else {
            format!("+{}{local}", self.country_code)
        }
    }

    pub fn is_valid(&self, raw: &str) -> bool {
        let digits = self
            .normalize(raw)
            .chars()
            .filter(|c| c.is_ascii_digit())
            .count();
        (MIN_DIGITS..=MAX_DIGITS).contains(&digits)
    }
}
