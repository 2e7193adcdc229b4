//! Taxpayer Identification Number

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::{INVALID_TIN_MESSAGE, TIN_PATTERN};
use crate::errors::{MyInvoisError, Result};

static TIN_REGEX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(TIN_PATTERN).ok());

/// A validated TIN: `C` followed by exactly ten digits
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tin(String);

impl Tin {
    /// Validate and wrap a TIN
    ///
    /// The error names the `tin` field so callers can surface it next to the
    /// offending input.
    pub fn parse(value: &str) -> Result<Self> {
        if Self::is_valid(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(MyInvoisError::validation_field("tin", INVALID_TIN_MESSAGE))
        }
    }

    /// Check the format without allocating
    pub fn is_valid(value: &str) -> bool {
        TIN_REGEX.as_ref().is_some_and(|re| re.is_match(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Tin {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Tin {
    type Err = MyInvoisError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Tin {
    type Error = MyInvoisError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Tin> for String {
    fn from(tin: Tin) -> Self {
        tin.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_c_and_ten_digits() {
        let tin = Tin::parse("C1234567890").unwrap();
        assert_eq!(tin.as_str(), "C1234567890");
        assert_eq!(tin.to_string(), "C1234567890");
    }

    #[test]
    fn rejects_malformed_values_with_tin_field() {
        let samples =
            ["", "C123", "C12345678901", "c1234567890", "D1234567890", "C12345X7890", " C1234567890"];
        for bad in samples {
            let err = Tin::parse(bad).unwrap_err();
            let fields = err.field_errors().expect("validation error");
            assert!(fields.contains_key("tin"), "{bad:?} should be rejected on the tin field");
        }
    }

    #[test]
    fn deserialization_validates() {
        let ok: Tin = serde_json::from_str("\"C0000000001\"").unwrap();
        assert_eq!(ok.as_str(), "C0000000001");
        assert!(serde_json::from_str::<Tin>("\"IG123\"").is_err());
    }
}
