//! Input rules for submitted records.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::{NewContact, NewCustomer};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{10,15}$").expect("valid phone regex"));

const MIN_NAME_CHARS: usize = 2;
const MIN_CONTENT_CHARS: usize = 3;

/// A submitted record that does not satisfy the input rules.
///
/// The display text is safe to return to callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must be at least {MIN_NAME_CHARS} characters")]
    NameTooShort,

    #[error("invalid email address")]
    InvalidEmail,

    #[error("phone number must be 10 to 15 digits")]
    InvalidPhone,

    #[error("invalid customer id")]
    InvalidCustomerId,

    #[error("contact content must be at least {MIN_CONTENT_CHARS} characters")]
    ContentTooShort,
}

pub fn is_email_valid(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn is_phone_valid(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

pub(crate) fn validate_customer(customer: &NewCustomer) -> Result<(), ValidationError> {
    if customer.name.chars().count() < MIN_NAME_CHARS {
        return Err(ValidationError::NameTooShort);
    }
    if !is_email_valid(&customer.email) {
        return Err(ValidationError::InvalidEmail);
    }
    if !is_phone_valid(&customer.phone) {
        return Err(ValidationError::InvalidPhone);
    }
    Ok(())
}

pub(crate) fn validate_contact(contact: &NewContact) -> Result<(), ValidationError> {
    if contact.customer_id <= 0 {
        return Err(ValidationError::InvalidCustomerId);
    }
    if contact.content.chars().count() < MIN_CONTENT_CHARS {
        return Err(ValidationError::ContentTooShort);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(name: &str, email: &str, phone: &str) -> NewCustomer {
        NewCustomer {
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
        }
    }

    #[test]
    fn test_email_rules() {
        assert!(is_email_valid("ali@example.com"));
        assert!(is_email_valid("first.last+tag@sub.example.co"));
        assert!(!is_email_valid("ali@example"));
        assert!(!is_email_valid("not-an-email"));
        assert!(!is_email_valid(""));
    }

    #[test]
    fn test_phone_rules() {
        assert!(is_phone_valid("5551234567"));
        assert!(is_phone_valid("905551234567123"));
        assert!(!is_phone_valid("555123"));
        assert!(!is_phone_valid("5551234567890123"));
        assert!(!is_phone_valid("555-123-4567"));
    }

    #[test]
    fn test_customer_name_counts_characters_not_bytes() {
        // Two characters, four bytes.
        assert_eq!(
            validate_customer(&customer("Çğ", "a@b.io", "5551234567")),
            Ok(())
        );
        assert_eq!(
            validate_customer(&customer("Ç", "a@b.io", "5551234567")),
            Err(ValidationError::NameTooShort)
        );
    }

    #[test]
    fn test_customer_field_order() {
        assert_eq!(
            validate_customer(&customer("Ali", "bad", "1")),
            Err(ValidationError::InvalidEmail)
        );
        assert_eq!(
            validate_customer(&customer("Ali", "ali@example.com", "1")),
            Err(ValidationError::InvalidPhone)
        );
    }

    #[test]
    fn test_contact_rules() {
        let ok = NewContact {
            customer_id: 1,
            content: "met".into(),
        };
        assert_eq!(validate_contact(&ok), Ok(()));

        let bad_id = NewContact {
            customer_id: 0,
            content: "meeting".into(),
        };
        assert_eq!(
            validate_contact(&bad_id),
            Err(ValidationError::InvalidCustomerId)
        );

        let short = NewContact {
            customer_id: 1,
            content: "hi".into(),
        };
        assert_eq!(
            validate_contact(&short),
            Err(ValidationError::ContentTooShort)
        );
    }
}
