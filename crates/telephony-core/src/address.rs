//! Address handling
//!
//! Parsing of dialed addresses (`tel:`, `sip:`, `voicemail:`), dial-string
//! normalization, carrier specific reformatting of received numbers and CNAP
//! (caller name) filtering.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::CarrierConfig;

/// URI scheme of a dialed address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    Tel,
    Sip,
    Voicemail,
}

/// A dialed or received address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub scheme: Scheme,
    pub number: String,
}

impl Address {
    pub fn tel(number: impl Into<String>) -> Self {
        Self {
            scheme: Scheme::Tel,
            number: number.into(),
        }
    }

    pub fn voicemail() -> Self {
        Self {
            scheme: Scheme::Voicemail,
            number: String::new(),
        }
    }

    /// Parse `scheme:number`; a bare number is a `tel:` address
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.split_once(':') {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("tel") => Self::tel(rest),
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("sip") => Self {
                scheme: Scheme::Sip,
                number: rest.to_string(),
            },
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("voicemail") => Self {
                scheme: Scheme::Voicemail,
                number: rest.to_string(),
            },
            _ => Self::tel(raw),
        }
    }

    pub fn is_voicemail(&self) -> bool {
        self.scheme == Scheme::Voicemail
    }

    /// The part that gets dialed
    ///
    /// A SIP address whose user part looks like a phone number dials that
    /// number. Any other SIP address is dialed as `user@host`, untouched. An
    /// empty user part yields an empty dial string.
    pub fn dial_string(&self) -> String {
        match self.scheme {
            Scheme::Sip => {
                let target = self.number.trim();
                let user = target.split('@').next().unwrap_or_default();
                if user.is_empty() {
                    String::new()
                } else if is_phone_number_like(user) {
                    normalize_dial_string(user)
                } else {
                    target.to_string()
                }
            }
            _ => normalize_dial_string(&self.number),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            Scheme::Tel => "tel",
            Scheme::Sip => "sip",
            Scheme::Voicemail => "voicemail",
        };
        write!(f, "{}:{}", scheme, self.number)
    }
}

/// Digits, dialable symbols and visual separators only, with at least one digit
fn is_phone_number_like(user: &str) -> bool {
    user.chars().any(|c| c.is_ascii_digit())
        && user
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '*' | '#' | ',' | ';' | '-' | '.' | '(' | ')' | ' '))
}

/// Strip visual separators, keeping dialable characters
///
/// Keeps digits, `+`, `*`, `#`, and the pause/wait characters `,` and `;`.
pub fn normalize_dial_string(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '+' | '*' | '#' | ',' | ';'))
        .collect()
}

/// Whether a dial string is an MMI/supplementary service code
///
/// Covers `*...#` style service codes and short two-digit strings that are
/// not emergency numbers (callers check emergency status first).
pub fn looks_like_mmi(dial_string: &str) -> bool {
    let s = dial_string;
    if s.is_empty() {
        return false;
    }
    let service_code = (s.starts_with('*') || s.starts_with('#')) && s.ends_with('#');
    let short_code = s.len() <= 2 && !s.starts_with('1') && s.chars().all(|c| c.is_ascii_digit());
    service_code || short_code
}

/// Whether a dial string matches one of the blocked call forwarding prefixes
pub fn is_call_forwarding_code(dial_string: &str, prefixes: &[String]) -> bool {
    prefixes
        .iter()
        .any(|prefix| !prefix.is_empty() && dial_string.starts_with(prefix.as_str()))
}

/// Reformat a received number according to carrier rules
pub fn format_for_carrier(number: &str, carrier: &CarrierConfig) -> String {
    if carrier.format_number_to_national_for_jp {
        if let Some(national) = number.strip_prefix("+81") {
            return format!("0{}", national);
        }
    }
    number.to_string()
}

/// Drop carrier placeholder caller names
pub fn filter_cnap_name(name: Option<&str>, carrier: &CarrierConfig) -> Option<String> {
    let name = name?.trim();
    if name.is_empty() {
        return None;
    }
    let filtered = carrier
        .filtered_cnap_names
        .iter()
        .any(|f| f.eq_ignore_ascii_case(name));
    if filtered {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_schemes() {
        assert_eq!(Address::parse("tel:112").scheme, Scheme::Tel);
        assert_eq!(Address::parse("sip:bob@example.com").scheme, Scheme::Sip);
        assert!(Address::parse("voicemail:").is_voicemail());
        assert_eq!(Address::parse("650 555 1212"), Address::tel("650 555 1212"));
    }

    #[test]
    fn test_normalize_strips_separators() {
        assert_eq!(normalize_dial_string("(650) 555-1212"), "6505551212");
        assert_eq!(normalize_dial_string("+1 650.555.1212,,123#"), "+16505551212,,123#");
    }

    #[test]
    fn test_sip_dial_string_uses_user_part() {
        assert_eq!(Address::parse("sip:+1-650-555@ims.example").dial_string(), "+1650555");
    }

    #[test]
    fn test_sip_dial_string_keeps_named_user() {
        assert_eq!(Address::parse("sip:alice@ims.example").dial_string(), "alice@ims.example");
        assert_eq!(Address::parse("sip:bob").dial_string(), "bob");
        assert_eq!(Address::parse("sip:@ims.example").dial_string(), "");
    }

    #[test]
    fn test_mmi_detection() {
        assert!(looks_like_mmi("*21*5551212#"));
        assert!(looks_like_mmi("#31#"));
        assert!(looks_like_mmi("22"));
        assert!(!looks_like_mmi("112"));
        assert!(!looks_like_mmi("6505551212"));
    }

    #[test]
    fn test_japan_national_format() {
        let mut carrier = CarrierConfig::default();
        assert_eq!(format_for_carrier("+81312345678", &carrier), "+81312345678");
        carrier.format_number_to_national_for_jp = true;
        assert_eq!(format_for_carrier("+81312345678", &carrier), "0312345678");
        assert_eq!(format_for_carrier("+14155550000", &carrier), "+14155550000");
    }

    #[test]
    fn test_cnap_filtering() {
        let carrier = CarrierConfig {
            filtered_cnap_names: vec!["UNKNOWN".to_string(), "PRIVATE".to_string()],
            ..CarrierConfig::default()
        };
        assert_eq!(filter_cnap_name(Some("unknown"), &carrier), None);
        assert_eq!(filter_cnap_name(Some(" Alice "), &carrier), Some("Alice".to_string()));
        assert_eq!(filter_cnap_name(None, &carrier), None);
    }

    #[test]
    fn test_call_forwarding_prefixes() {
        let prefixes = vec!["*21".to_string(), "**21".to_string()];
        assert!(is_call_forwarding_code("*21*5551212#", &prefixes));
        assert!(!is_call_forwarding_code("*31#", &prefixes));
        assert!(!is_call_forwarding_code("*21#", &[]));
    }
}
