//! Interview request validation
//!
//! Pure checks run before an interview request is sent. Rules are applied in
//! order and the first failing rule decides the message.

use serde::Serialize;

use crate::error::{Result, ServiceError};

/// Minimum length of a phone-style contact
pub const MIN_CONTACT_LENGTH: usize = 10;

/// Outcome of `validate_interview_data`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterviewValidation {
    pub is_valid: bool,
    pub message: String,
}

impl InterviewValidation {
    fn valid() -> Self {
        Self {
            is_valid: true,
            message: String::new(),
        }
    }

    fn invalid(message: &str) -> Self {
        Self {
            is_valid: false,
            message: message.to_string(),
        }
    }

    /// Convert into a `Result`, mapping failures to `ServiceError::Validation`
    pub fn into_result(self) -> Result<()> {
        if self.is_valid {
            Ok(())
        } else {
            Err(ServiceError::validation(self.message))
        }
    }
}

/// Validate interview scheduling input.
///
/// An e-mail-like contact is accepted at any length; anything else must be
/// at least `MIN_CONTACT_LENGTH` characters and contain a digit.
pub fn validate_interview_data(day: &str, time_slot: &str, contact_info: &str) -> InterviewValidation {
    if day.trim().is_empty() {
        return InterviewValidation::invalid("Please select a day for the interview");
    }
    if time_slot.trim().is_empty() {
        return InterviewValidation::invalid("Please select a time slot for the interview");
    }

    let contact = contact_info.trim();
    if contact.is_empty() {
        return InterviewValidation::invalid("Please provide your contact information");
    }

    let email_like = is_email_like(contact);
    if !email_like && contact.chars().count() < MIN_CONTACT_LENGTH {
        return InterviewValidation::invalid(
            "Contact information is too short - please provide a full email address or phone number",
        );
    }
    if !email_like && !contact.chars().any(|c| c.is_ascii_digit()) {
        return InterviewValidation::invalid(
            "Contact information must include a valid email address or phone number",
        );
    }

    InterviewValidation::valid()
}

/// `@` present with a `.` somewhere after the last `@`
pub fn is_email_like(contact: &str) -> bool {
    match contact.rfind('@') {
        Some(at) => contact[at + 1..].contains('.'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_contact_rejected() {
        let outcome = validate_interview_data("Monday, Jan 1", "9:00-10:00", "short");
        assert!(!outcome.is_valid);
        assert!(outcome.message.contains("too short"));
    }

    #[test]
    fn test_email_contact_accepted() {
        let outcome = validate_interview_data("Monday, Jan 1", "9:00-10:00", "a@b.com");
        assert_eq!(outcome, InterviewValidation::valid());
        assert!(outcome.into_result().is_ok());
    }

    #[test]
    fn test_empty_day_rejected_first() {
        let outcome = validate_interview_data("", "9:00-10:00", "a@b.com");
        assert!(!outcome.is_valid);
        assert!(outcome.message.contains("day"));

        // day wins even when everything else is wrong too
        let outcome = validate_interview_data("  ", "", "");
        assert!(outcome.message.contains("day"));
    }

    #[test]
    fn test_rule_order() {
        assert!(validate_interview_data("Mon", " ", "a@b.com").message.contains("time slot"));
        assert!(validate_interview_data("Mon", "9:00", "   ").message.contains("contact"));
        assert!(validate_interview_data("Mon", "9:00", "no digits at all here")
            .message
            .contains("valid email"));
    }

    #[test]
    fn test_phone_contact_accepted() {
        assert!(validate_interview_data("Mon", "9:00", "+52 81 1234 5678").is_valid);
        assert!(!validate_interview_data("Mon", "9:00", "555-1234").is_valid);
    }

    #[test]
    fn test_email_like() {
        assert!(is_email_like("jane@example.com"));
        assert!(is_email_like("first.last@host.io"));
        assert!(!is_email_like("jane.doe@localhost"));
        assert!(!is_email_like("no-at-sign.com"));
        let err = validate_interview_data("", "x", "y").into_result().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }
}
