//! Identifier types for tally.
//!
//! Clients are keyed by UUID, ledger entries and discounts by ULID so that they
//! sort chronologically, and catalog entries (plans, features, credit packs) by
//! the short slugs admins assign them (`"professional"`, `"ev"`, `"pack2"`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Define a UUID-backed identifier with serde-as-string, parsing and display.
macro_rules! uuid_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Create a new identifier from a UUID.
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Generate a new random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Return the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
                Ok(Self(uuid))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }
    };
}

/// Define a ULID-backed, time-ordered identifier.
macro_rules! ulid_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Ulid);

        impl $name {
            /// Create a new identifier from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Generate a new identifier with the current timestamp.
            #[must_use]
            pub fn generate() -> Self {
                Self(Ulid::new())
            }

            /// Return the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> &Ulid {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let ulid = Ulid::from_string(s).map_err(|_| IdError::InvalidUlid)?;
                Ok(Self(ulid))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }
    };
}

/// Define a catalog slug identifier. Slugs are non-empty and contain no whitespace.
macro_rules! slug_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create an identifier from a slug.
            ///
            /// # Errors
            ///
            /// Returns `IdError::InvalidSlug` if the slug is empty or contains whitespace.
            pub fn new(slug: impl Into<String>) -> Result<Self, IdError> {
                let slug = slug.into();
                if slug.is_empty() || slug.chars().any(char::is_whitespace) {
                    return Err(IdError::InvalidSlug(slug));
                }
                Ok(Self(slug))
            }

            /// Return the slug.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id_type!(ClientId, "A billed client (one subscribing organization).");

ulid_id_type!(TransactionId, "A credit ledger entry identifier, time-ordered.");
ulid_id_type!(DiscountId, "A discount attached to a billing period.");

slug_id_type!(PlanId, "A subscription plan in the catalog.");
slug_id_type!(FeatureId, "A metered feature in the catalog.");
slug_id_type!(PackId, "A purchasable credit pack in the catalog.");

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,

    /// The input is not a valid ULID.
    #[error("invalid ULID format")]
    InvalidUlid,

    /// The input is not a usable catalog slug.
    #[error("invalid catalog id: {0:?}")]
    InvalidSlug(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_serde_json() {
        let id = ClientId::generate();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ClientId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn client_id_rejects_garbage() {
        assert_eq!("not-a-uuid".parse::<ClientId>(), Err(IdError::InvalidUuid));
    }

    #[test]
    fn transaction_ids_sort_by_creation_time() {
        let earlier = TransactionId::from_ulid(Ulid::from_parts(1_000, 7));
        let later = TransactionId::from_ulid(Ulid::from_parts(2_000, 1));
        assert!(earlier < later);
        assert_eq!(earlier.to_string().parse::<TransactionId>().unwrap(), earlier);
    }

    #[test]
    fn slug_ids_reject_blank_and_whitespace() {
        assert!(FeatureId::new("ev").is_ok());
        assert!(matches!(PlanId::new(""), Err(IdError::InvalidSlug(_))));
        assert!(matches!(PackId::new("small boost"), Err(IdError::InvalidSlug(_))));
    }

    #[test]
    fn slug_id_deserialize_validates() {
        let ok: PlanId = serde_json::from_str("\"starter\"").unwrap();
        assert_eq!(ok.as_str(), "starter");
        assert!(serde_json::from_str::<PlanId>("\"\"").is_err());
    }
}
