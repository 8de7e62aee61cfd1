//! Newtype IDs for type-safe entity references.
//!
//! The marketplace API identifies every entity with a positive integer. Use the
//! `define_id!` macro to create wrappers that prevent accidentally passing an
//! order ID where a product ID is expected.

/// Errors that can occur when parsing an ID from user input.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The input is not an integer.
    #[error("'{0}' is not a valid id")]
    NotANumber(String),
    /// The input is zero or negative.
    #[error("id must be a positive number (got {0})")]
    NotPositive(i64),
}

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around `i64` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `Ord`
/// - Conversion methods: `new()`, `as_i64()`
/// - `From<i64>`, `Into<i64>`, `Display` and `FromStr`
///
/// # Example
///
/// ```rust
/// # use soko_core::define_id;
/// define_id!(WishlistId);
///
/// let id: WishlistId = "42".parse().unwrap();
/// assert_eq!(id.as_i64(), 42);
/// assert!("-1".parse::<WishlistId>().is_err());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Create a new ID from an i64 value.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Get the underlying i64 value.
            #[must_use]
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = $crate::types::id::IdError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                let id = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| $crate::types::id::IdError::NotANumber(s.to_owned()))?;
                if id <= 0 {
                    return Err($crate::types::id::IdError::NotPositive(id));
                }
                Ok(Self(id))
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(UserId);
define_id!(ProductId);
define_id!(CategoryId);
define_id!(AddressId);
define_id!(OrderId);
define_id!(DeliveryZoneId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_whitespace() {
        let id: OrderId = " 17 ".parse().unwrap();
        assert_eq!(id, OrderId::new(17));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            "abc".parse::<ProductId>(),
            Err(IdError::NotANumber(_))
        ));
        assert!(matches!(
            "0".parse::<ProductId>(),
            Err(IdError::NotPositive(0))
        ));
    }

    #[test]
    fn test_serde_is_transparent() {
        let json = serde_json::to_string(&AddressId::new(9)).unwrap();
        assert_eq!(json, "9");
        let parsed: AddressId = serde_json::from_str("9").unwrap();
        assert_eq!(parsed.as_i64(), 9);
    }
}
