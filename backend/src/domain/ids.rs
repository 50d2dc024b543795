//! Strongly typed identifiers for tenant-scoped and global entities.
//!
//! Every identifier wraps a UUID. Parsing rejects blank input, surrounding
//! whitespace, and anything that is not a hyphenated UUID so that ids taken
//! from request payloads cannot silently alias each other.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Validation errors returned when parsing an identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdValidationError {
    /// The input was empty.
    #[error("{kind} must not be empty")]
    Empty {
        /// Identifier kind, e.g. `issue id`.
        kind: &'static str,
    },
    /// The input was not a valid UUID.
    #[error("{kind} must be a valid UUID")]
    Invalid {
        /// Identifier kind, e.g. `issue id`.
        kind: &'static str,
    },
}

fn parse_uuid(kind: &'static str, raw: &str) -> Result<Uuid, IdValidationError> {
    if raw.is_empty() {
        return Err(IdValidationError::Empty { kind });
    }
    if raw.trim() != raw {
        return Err(IdValidationError::Invalid { kind });
    }
    Uuid::parse_str(raw).map_err(|_| IdValidationError::Invalid { kind })
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Uuid);

        impl $name {
            /// Validate and construct the identifier from a string.
            pub fn new(raw: impl AsRef<str>) -> Result<Self, IdValidationError> {
                parse_uuid($kind, raw.as_ref()).map(Self)
            }

            /// Generate a new random identifier.
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID, typically read back from storage.
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Access the underlying UUID.
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = IdValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0.to_string()
            }
        }
    };
}

define_id!(
    /// Tenant identifier; the unit of data isolation.
    OrganizationId,
    "organization id"
);
define_id!(
    /// Global user identity, not tenant scoped.
    UserId,
    "user id"
);
define_id!(
    /// Role identifier, scoped to one organization.
    RoleId,
    "role id"
);
define_id!(
    /// Issue identifier.
    IssueId,
    "issue id"
);
define_id!(
    /// Machine identifier from the external catalogue.
    MachineId,
    "machine id"
);
define_id!(
    /// Comment identifier.
    CommentId,
    "comment id"
);
define_id!(
    /// Notification delivery record identifier.
    NotificationId,
    "notification id"
);
define_id!(
    /// Identifier of one state-changing event; retries reuse it.
    EventId,
    "event id"
);

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn parses_hyphenated_uuid() {
        let id = IssueId::new("3fa85f64-5717-4562-b3fc-2c963f66afa6").expect("valid id");
        assert_eq!(id.to_string(), "3fa85f64-5717-4562-b3fc-2c963f66afa6");
    }

    #[rstest]
    #[case::empty("", IdValidationError::Empty { kind: "user id" })]
    #[case::padded(" 3fa85f64-5717-4562-b3fc-2c963f66afa6", IdValidationError::Invalid { kind: "user id" })]
    #[case::garbage("not-a-uuid", IdValidationError::Invalid { kind: "user id" })]
    fn rejects_malformed_input(#[case] raw: &str, #[case] expected: IdValidationError) {
        assert_eq!(UserId::new(raw), Err(expected));
    }

    #[rstest]
    fn serialises_as_plain_string() {
        let id = OrganizationId::random();
        let json = serde_json::to_value(id).expect("serialise id");
        assert_eq!(json, serde_json::Value::String(id.to_string()));
    }
}
