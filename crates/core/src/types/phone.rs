//! Kenyan mobile phone numbers.
//!
//! M-Pesa STK push only accepts numbers in international format without the
//! plus sign (`2547XXXXXXXX` or `2541XXXXXXXX`). Customers type them in every
//! shape imaginable, so parsing normalises before validating.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`PhoneNumber`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneNumberError {
    /// The input string is empty.
    #[error("phone number cannot be empty")]
    Empty,
    /// The input contains characters other than digits, spaces, dashes or a leading plus.
    #[error("phone number may only contain digits")]
    InvalidCharacters,
    /// The digits do not form a Kenyan mobile number.
    #[error("enter a Kenyan mobile number such as 0712 345 678")]
    NotKenyanMobile,
}

/// A Kenyan mobile number in `254XXXXXXXXX` form.
///
/// Accepted inputs include `0712345678`, `712345678`, `+254 712 345 678`,
/// `254-712-345678` and the `01XX` Safaricom/Airtel ranges.
///
/// ```
/// use soko_core::PhoneNumber;
///
/// let phone = PhoneNumber::parse("0712 345 678").unwrap();
/// assert_eq!(phone.as_str(), "254712345678");
/// assert_eq!(phone.local_format(), "0712345678");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    const COUNTRY_CODE: &'static str = "254";
    const SUBSCRIBER_DIGITS: usize = 9;

    /// Parse and normalise a phone number.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, contains letters or other
    /// punctuation, or does not normalise to a `2547`/`2541` number with nine
    /// subscriber digits.
    pub fn parse(s: &str) -> Result<Self, PhoneNumberError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(PhoneNumberError::Empty);
        }

        let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
        let mut digits = String::with_capacity(unsigned.len());
        for c in unsigned.chars() {
            match c {
                '0'..='9' => digits.push(c),
                ' ' | '-' | '(' | ')' => {}
                _ => return Err(PhoneNumberError::InvalidCharacters),
            }
        }

        let subscriber = if let Some(rest) = digits.strip_prefix(Self::COUNTRY_CODE) {
            rest
        } else if let Some(rest) = digits.strip_prefix('0') {
            rest
        } else {
            digits.as_str()
        };

        let valid_prefix = subscriber.starts_with('7') || subscriber.starts_with('1');
        if subscriber.len() != Self::SUBSCRIBER_DIGITS || !valid_prefix {
            return Err(PhoneNumberError::NotKenyanMobile);
        }

        Ok(Self(format!("{}{subscriber}", Self::COUNTRY_CODE)))
    }

    /// The normalised `254XXXXXXXXX` form sent to the payment API.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The local `07XXXXXXXX` form shown to customers.
    #[must_use]
    pub fn local_format(&self) -> String {
        let subscriber = self.0.get(Self::COUNTRY_CODE.len()..).unwrap_or_default();
        format!("0{subscriber}")
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for PhoneNumber {
    type Err = PhoneNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = PhoneNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_common_shapes() {
        for input in [
            "0712345678",
            "712345678",
            "254712345678",
            "+254712345678",
            "+254 712 345 678",
            "0712-345-678",
        ] {
            assert_eq!(
                PhoneNumber::parse(input).unwrap().as_str(),
                "254712345678",
                "input: {input}"
            );
        }
    }

    #[test]
    fn test_accepts_01_range() {
        assert_eq!(
            PhoneNumber::parse("0110123456").unwrap().as_str(),
            "254110123456"
        );
    }

    #[test]
    fn test_rejects_invalid() {
        assert_eq!(PhoneNumber::parse(""), Err(PhoneNumberError::Empty));
        assert_eq!(
            PhoneNumber::parse("07123abc78"),
            Err(PhoneNumberError::InvalidCharacters)
        );
        assert_eq!(
            PhoneNumber::parse("071234567"),
            Err(PhoneNumberError::NotKenyanMobile)
        );
        assert_eq!(
            PhoneNumber::parse("0812345678"),
            Err(PhoneNumberError::NotKenyanMobile)
        );
        assert_eq!(
            PhoneNumber::parse("+255712345678"),
            Err(PhoneNumberError::NotKenyanMobile)
        );
    }

    #[test]
    fn test_local_format() {
        let phone = PhoneNumber::parse("254722000111").unwrap();
        assert_eq!(phone.local_format(), "0722000111");
    }
}
