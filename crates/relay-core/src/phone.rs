//! Phone number → WhatsApp chat id normalization.
//!
//! Best-effort and lossy: local numbers without a configured default country
//! code pass through unchanged and may fail the registration lookup.

use crate::config::WhatsAppConfig;

/// Keep only ASCII digits.
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Turns raw phone strings into canonical chat ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNormalizer {
    country_code: Option<String>,
    suffix: String,
}

impl PhoneNormalizer {
    pub fn new(country_code: Option<&str>, suffix: &str) -> Self {
        let country_code = country_code
            .map(digits_only)
            .filter(|cc| !cc.is_empty());
        Self {
            country_code,
            suffix: suffix.trim_start_matches('@').to_string(),
        }
    }

    pub fn from_config(config: &WhatsAppConfig) -> Self {
        Self::new(
            Some(config.default_country_code.as_str()),
            &config.jid_suffix,
        )
    }

    /// Digits of the number with country code applied, without the suffix.
    pub fn canonical_digits(&self, raw: &str) -> String {
        let mut digits = digits_only(raw);
        if let Some(rest) = digits.strip_prefix("00") {
            digits = rest.to_string();
        }
        if let Some(ref cc) = self.country_code {
            if let Some(local) = digits.strip_prefix('0') {
                digits = format!("{cc}{local}");
            }
            if !digits.is_empty() && !digits.starts_with(cc.as_str()) {
                digits = format!("{cc}{digits}");
            }
        }
        digits
    }

    /// Canonical chat id (`digits@suffix`). `None` when the input has no digits.
    ///
    /// Inputs that already carry a `@server` part are returned as-is.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.contains('@') {
            return Some(trimmed.to_string());
        }
        let digits = self.canonical_digits(trimmed);
        if digits.is_empty() {
            return None;
        }
        Some(format!("{digits}@{}", self.suffix))
    }
}

/// User part of a chat id (`212600000000@c.us` → `212600000000`), digits only.
pub fn phone_from_jid(jid: &str) -> String {
    let user = jid.split('@').next().unwrap_or("");
    // Multi-device ids look like `212600000000:12@c.us`.
    let user = user.split(':').next().unwrap_or("");
    digits_only(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moroccan() -> PhoneNormalizer {
        PhoneNormalizer::new(Some("212"), "c.us")
    }

    #[test]
    fn test_leading_zero_replaced_by_country_code() {
        assert_eq!(
            moroccan().normalize("0659595284").as_deref(),
            Some("212659595284@c.us")
        );
    }

    #[test]
    fn test_international_forms_are_equivalent() {
        let n = moroccan();
        let expected = Some("212659595284@c.us".to_string());
        assert_eq!(n.normalize("+212659595284"), expected);
        assert_eq!(n.normalize("00212659595284"), expected);
        assert_eq!(n.normalize("212659595284"), expected);
        assert_eq!(n.normalize("+212 659-59-52-84"), expected);
    }

    #[test]
    fn test_missing_country_code_is_prepended() {
        assert_eq!(
            moroccan().normalize("659595284").as_deref(),
            Some("212659595284@c.us")
        );
    }

    #[test]
    fn test_no_country_code_passes_digits_through() {
        let n = PhoneNormalizer::new(None, "c.us");
        assert_eq!(n.normalize("0659595284").as_deref(), Some("0659595284@c.us"));
        let blank = PhoneNormalizer::new(Some(""), "@c.us");
        assert_eq!(blank.normalize("(065) 959").as_deref(), Some("065959@c.us"));
    }

    #[test]
    fn test_existing_jid_passes_through() {
        assert_eq!(
            moroccan().normalize(" 212600000000@c.us ").as_deref(),
            Some("212600000000@c.us")
        );
    }

    #[test]
    fn test_no_digits_is_none() {
        assert!(moroccan().normalize("n/a").is_none());
        assert!(moroccan().normalize("").is_none());
    }

    #[test]
    fn test_phone_from_jid() {
        assert_eq!(phone_from_jid("212600000000@c.us"), "212600000000");
        assert_eq!(phone_from_jid("212600000000:3@s.whatsapp.net"), "212600000000");
        assert_eq!(phone_from_jid(""), "");
    }
}
