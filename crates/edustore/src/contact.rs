// Contact addresses: the email or phone number a one-time code is sent to.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::ServiceError;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[\d\s\-\(\)]{10,}$").unwrap());

/// A validated, normalized contact address.
///
/// Emails are lowercased; phone numbers keep digits only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Contact {
    Email(String),
    Phone(String),
}

impl Contact {
    /// Parse the `email`/`phone` pair of a request. Exactly one must be
    /// given; blank strings count as absent.
    pub fn parse(email: Option<&str>, phone: Option<&str>) -> Result<Self, ServiceError> {
        let email = email.map(str::trim).filter(|s| !s.is_empty());
        let phone = phone.map(str::trim).filter(|s| !s.is_empty());

        match (email, phone) {
            (Some(_), Some(_)) => Err(ServiceError::validation(
                "Provide either an email or a phone number, not both",
            )),
            (None, None) => Err(ServiceError::validation(
                "Email or phone number is required",
            )),
            (Some(email), None) => Self::email(email),
            (None, Some(phone)) => Self::phone(phone),
        }
    }

    pub fn email(raw: &str) -> Result<Self, ServiceError> {
        if !EMAIL_RE.is_match(raw) {
            return Err(ServiceError::validation("Invalid email format"));
        }
        Ok(Self::Email(raw.to_lowercase()))
    }

    pub fn phone(raw: &str) -> Result<Self, ServiceError> {
        if !PHONE_RE.is_match(raw) {
            return Err(ServiceError::validation("Invalid phone number format"));
        }
        Ok(Self::Phone(raw.chars().filter(char::is_ascii_digit).collect()))
    }

    /// Column holding this kind of address (`email` or `phone`).
    pub fn field(&self) -> &'static str {
        match self {
            Self::Email(_) => "email",
            Self::Phone(_) => "phone",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Email(v) | Self::Phone(v) => v,
        }
    }

    /// Delivery channel name reported to clients.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Email(_) => "email",
            Self::Phone(_) => "sms",
        }
    }

    /// Short SHA-256 digest of the address, for log lines.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.value().as_bytes());
        hex::encode(&digest[..6])
    }

    pub fn as_email(&self) -> Option<&str> {
        match self {
            Self::Email(v) => Some(v),
            Self::Phone(_) => None,
        }
    }

    pub fn as_phone(&self) -> Option<&str> {
        match self {
            Self::Phone(v) => Some(v),
            Self::Email(_) => None,
        }
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_is_lowercased() {
        let c = Contact::parse(Some("Ada@Example.COM"), None).unwrap();
        assert_eq!(c, Contact::Email("ada@example.com".into()));
        assert_eq!(c.method(), "email");
    }

    #[test]
    fn test_phone_is_normalized_to_digits() {
        let c = Contact::parse(None, Some("+1 (555) 123-4567")).unwrap();
        assert_eq!(c, Contact::Phone("15551234567".into()));
        assert_eq!(c.field(), "phone");
        assert_eq!(c.method(), "sms");
    }

    #[test]
    fn test_blank_counts_as_absent() {
        let c = Contact::parse(Some("  "), Some("5551234567")).unwrap();
        assert!(matches!(c, Contact::Phone(_)));
    }

    #[test]
    fn test_fingerprint_hides_address() {
        let c = Contact::email("ada@example.com").unwrap();
        let fp = c.fingerprint();
        assert_eq!(fp.len(), 12);
        assert!(!fp.contains("ada"));
        assert_eq!(fp, Contact::email("ADA@example.com").unwrap().fingerprint());
    }

    #[test]
    fn test_rejections() {
        assert!(Contact::parse(None, None).is_err());
        assert!(Contact::parse(Some("a@b.co"), Some("5551234567")).is_err());
        assert!(Contact::parse(Some("not-an-email"), None).is_err());
        assert!(Contact::parse(Some("a b@c.de"), None).is_err());
        assert!(Contact::parse(None, Some("12345")).is_err());
        assert!(Contact::parse(None, Some("555-CALL-NOW1")).is_err());
    }
}
