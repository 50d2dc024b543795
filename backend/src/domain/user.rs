//! User contact data consumed by the notification engine.
//!
//! Users are global identities. Some accounts carry a synthetic address on the
//! internal facade domain only because the identity provider requires an email
//! field; those addresses have no inbox and must never be handed to the email
//! transport.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::UserId;

/// Domain of the synthetic, non-deliverable addresses.
pub const INTERNAL_EMAIL_DOMAIN: &str = "pinpoint.internal";

/// Validation errors returned by [`EmailAddress::new`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmailValidationError {
    /// The address was blank.
    #[error("email address must not be empty")]
    Empty,
    /// The address does not have the `local@domain` shape.
    #[error("email address must have the form local@domain")]
    Malformed,
}

/// Syntactically valid email address with a lower-cased domain.
///
/// # Examples
/// ```
/// use pinpoint::domain::EmailAddress;
///
/// let address = EmailAddress::new(" Ops@Arcade.Example ").unwrap();
/// assert_eq!(address.as_ref(), "Ops@arcade.example");
/// assert!(!address.is_internal_facade());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Validate and normalise an address.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, EmailValidationError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(EmailValidationError::Empty);
        }
        let Some((local, domain)) = trimmed.split_once('@') else {
            return Err(EmailValidationError::Malformed);
        };
        if local.is_empty()
            || domain.is_empty()
            || domain.contains('@')
            || trimmed.chars().any(char::is_whitespace)
        {
            return Err(EmailValidationError::Malformed);
        }
        Ok(Self(format!("{local}@{}", domain.to_ascii_lowercase())))
    }

    /// Full normalised address.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Domain part, lower-cased.
    pub fn domain(&self) -> &str {
        self.0
            .rsplit_once('@')
            .map_or(self.0.as_str(), |(_, domain)| domain)
    }

    /// Whether the address is a synthetic placeholder with no inbox.
    ///
    /// This is the only place the facade domain is recognised.
    pub fn is_internal_facade(&self) -> bool {
        self.domain() == INTERNAL_EMAIL_DOMAIN
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = EmailValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self {
        value.0
    }
}

/// Contact details for a notification recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContact {
    /// User identifier.
    pub id: UserId,
    /// Name shown in notification messages.
    pub display_name: String,
    /// Address on file; username-only accounts have none.
    pub email: Option<EmailAddress>,
}

/// Address the email step may use for `contact`, if any.
pub fn deliverable_email(contact: &UserContact) -> Option<&EmailAddress> {
    contact
        .email
        .as_ref()
        .filter(|address| !address.is_internal_facade())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn contact(email: Option<&str>) -> UserContact {
        UserContact {
            id: UserId::random(),
            display_name: "Test Tech".to_owned(),
            email: email.map(|raw| EmailAddress::new(raw).expect("valid fixture address")),
        }
    }

    #[rstest]
    #[case::empty("", EmailValidationError::Empty)]
    #[case::blank("   ", EmailValidationError::Empty)]
    #[case::no_at("tech.example", EmailValidationError::Malformed)]
    #[case::no_local("@example.com", EmailValidationError::Malformed)]
    #[case::two_ats("a@b@example.com", EmailValidationError::Malformed)]
    #[case::inner_space("a b@example.com", EmailValidationError::Malformed)]
    fn rejects_malformed_addresses(#[case] raw: &str, #[case] expected: EmailValidationError) {
        assert_eq!(EmailAddress::new(raw), Err(expected));
    }

    #[rstest]
    #[case::facade("jdoe@pinpoint.internal", true)]
    #[case::facade_mixed_case("jdoe@PinPoint.Internal", true)]
    #[case::real("jdoe@arcade.example", false)]
    #[case::lookalike("jdoe@pinpoint.internal.example", false)]
    fn recognises_the_internal_facade(#[case] raw: &str, #[case] expected: bool) {
        let address = EmailAddress::new(raw).expect("valid address");
        assert_eq!(address.is_internal_facade(), expected);
    }

    #[rstest]
    fn deliverable_email_filters_facade_and_missing_addresses() {
        assert!(deliverable_email(&contact(None)).is_none());
        assert!(deliverable_email(&contact(Some("u3@pinpoint.internal"))).is_none());
        assert!(deliverable_email(&contact(Some("u3@arcade.example"))).is_some());
    }
}
