//! Address validation and log anonymisation.

use std::sync::LazyLock;

use regex::Regex;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));

/// Loose syntactic check: `local@domain.tld`, no whitespace, one `@`.
pub fn is_valid_email(address: &str) -> bool {
    EMAIL_RE.is_match(address)
}

/// `max.mustermann@gmail.com` → `m...@g....com`.
pub fn anonymize_email(address: &str) -> String {
    if address.trim().is_empty() {
        return "[no address]".to_string();
    }
    let mut parts = address.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return "***".to_string();
    };
    let first = |s: &str| s.chars().next().map(String::from).unwrap_or_default();
    let domain_name = domain.split('.').next().unwrap_or_default();
    let tld = domain.rsplit('.').next().unwrap_or_default();
    format!("{}...@{}....{}", first(local), first(domain_name), tld)
}

/// Renders addresses for logs: anonymised unless debug mode is on.
#[derive(Debug, Clone, Copy, Default)]
pub struct Redactor {
    debug: bool,
}

impl Redactor {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    pub fn email(&self, address: &str) -> String {
        if self.debug {
            address.to_string()
        } else {
            anonymize_email(address)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_addresses() {
        assert!(is_valid_email("max@example.com"));
        assert!(is_valid_email("a.b+c@sub.example.de"));
        assert!(!is_valid_email("max@example"));
        assert!(!is_valid_email("max example@x.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("a@@example.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn anonymizes_with_tld() {
        assert_eq!(anonymize_email("max.mustermann@gmail.com"), "m...@g....com");
        assert_eq!(anonymize_email("jane@mail.example.de"), "j...@m....de");
    }

    #[test]
    fn anonymize_malformed() {
        assert_eq!(anonymize_email(""), "[no address]");
        assert_eq!(anonymize_email("no-at-sign"), "***");
        assert_eq!(anonymize_email("a@b@c.com"), "***");
    }

    #[test]
    fn redactor_respects_debug() {
        assert_eq!(Redactor::new(true).email("max@gmail.com"), "max@gmail.com");
        assert_eq!(Redactor::new(false).email("max@gmail.com"), "m...@g....com");
        assert_eq!(Redactor::default().email("max@gmail.com"), "m...@g....com");
    }
}
