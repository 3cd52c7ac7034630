//! Validated names for cache client registrations.
//!
//! A client name doubles as the identity the store client reports to the
//! server, so it is restricted to ASCII letters. Validation happens once,
//! when the name is registered.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

static VALID_CLIENT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]+$").expect("client name pattern is valid"));

/// A non-empty, alphabetic-only cache client name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientName(String);

impl ClientName {
    /// Name used by [`ClientName::default`] and by factories when the caller
    /// does not ask for a specific client.
    pub const DEFAULT: &'static str = "Default";

    /// Validate and wrap a client name.
    pub fn new(name: impl Into<String>) -> Result<Self, AppError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AppError::validation(
                "A cache client must have a name to prevent conflicts between clients",
            ));
        }
        if !VALID_CLIENT_NAME.is_match(&name) {
            return Err(AppError::validation(format!(
                "Invalid cache client name '{name}': only alphabetical characters (uppercase and lowercase) are allowed"
            )));
        }
        Ok(Self(name))
    }

    /// Borrow the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientName {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for ClientName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ClientName {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ClientName {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ClientName> for String {
    fn from(name: ClientName) -> Self {
        name.0
    }
}

impl AsRef<str> for ClientName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_alphabetic_names_are_accepted() {
        for name in ["Orders", "billing", "A", "Default", "ZzZz"] {
            let parsed = ClientName::new(name).unwrap();
            assert_eq!(parsed.as_str(), name);
        }
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        for name in ["", "   ", "Orders1", "order-cache", "order cache", "Ünicode", "_x"] {
            let err = ClientName::new(name).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Validation, "name: {name:?}");
        }
    }

    #[test]
    fn test_default_name_is_valid() {
        assert_eq!(ClientName::default(), ClientName::new(ClientName::DEFAULT).unwrap());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: ClientName = serde_json::from_str("\"Orders\"").unwrap();
        assert_eq!(ok.as_str(), "Orders");
        assert!(serde_json::from_str::<ClientName>("\"Orders2\"").is_err());
    }
}
