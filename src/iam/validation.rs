//! Contact validation, applied before anything is persisted.

use regex::Regex;

use super::error::IamError;

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$";

/// Accept exactly 10 ASCII digits where the first one is in `6..=9`.
///
/// # Errors
/// Returns `PhoneNumberInvalid` for anything else.
pub fn validate_phone(number: &str) -> Result<(), IamError> {
    let bytes = number.as_bytes();
    if bytes.len() != 10 || !bytes.iter().all(u8::is_ascii_digit) {
        return Err(IamError::PhoneNumberInvalid);
    }
    if !(b'6'..=b'9').contains(&bytes[0]) {
        return Err(IamError::PhoneNumberInvalid);
    }
    Ok(())
}

/// # Errors
/// Returns `EmailIdInvalid` unless the value looks like `local@label(.label)*`
/// with every domain label at most 63 characters long.
pub fn validate_email_id(email_id: &str) -> Result<(), IamError> {
    if Regex::new(EMAIL_PATTERN).is_ok_and(|re| re.is_match(email_id)) {
        Ok(())
    } else {
        Err(IamError::EmailIdInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_accepts_leading_six_to_nine() {
        for number in ["6000000000", "7123456789", "8999999999", "9876543210"] {
            assert!(validate_phone(number).is_ok(), "{number} should be valid");
        }
    }

    #[test]
    fn phone_rejects_leading_zero_to_five() {
        for first in '0'..='5' {
            let number = format!("{first}123456789");
            assert!(matches!(
                validate_phone(&number),
                Err(IamError::PhoneNumberInvalid)
            ));
        }
    }

    #[test]
    fn phone_rejects_wrong_length_or_non_digits() {
        for number in [
            "",
            "987654321",
            "98765432100",
            "98765 4321",
            "+919876543",
            "98765432a1",
            "９８７６５４３２１０",
        ] {
            assert!(
                validate_phone(number).is_err(),
                "{number:?} should be rejected"
            );
        }
    }

    #[test]
    fn email_accepts_rfc_lite_addresses() {
        for email in [
            "admin@x.com",
            "first.last+tag@example.co.in",
            "o'brien@mail-server.example",
            "user@localhost",
            "a_b{c}@d.e",
        ] {
            assert!(validate_email_id(email).is_ok(), "{email} should be valid");
        }
    }

    #[test]
    fn email_rejects_malformed_addresses() {
        for email in [
            "",
            "no-at-sign.example.com",
            "missing-domain@",
            "@missing-local.com",
            "two@@example.com",
            "a@b@example.com",
            "empty-label@example..com",
            "leading-dot@.example.com",
            "trailing-dot@example.com.",
            "hyphen@-example.com",
            "space in@example.com",
        ] {
            assert!(
                matches!(validate_email_id(email), Err(IamError::EmailIdInvalid)),
                "{email:?} should be rejected"
            );
        }
    }

    #[test]
    fn email_domain_label_length_limit() {
        let ok_label = "a".repeat(63);
        let long_label = "a".repeat(64);
        assert!(validate_email_id(&format!("user@{ok_label}.com")).is_ok());
        assert!(validate_email_id(&format!("user@{long_label}.com")).is_err());
        assert!(validate_email_id(&format!("user@example.{long_label}")).is_err());
    }
}
