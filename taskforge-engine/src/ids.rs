//! Identifier newtypes for subjects and roles.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a progressing subject (a player).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl SubjectId {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Case-insensitive role identifier, stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RoleId(String);

impl RoleId {
    /// Construct a role id, trimming whitespace and lowercasing.
    #[must_use]
    pub fn new(value: &str) -> Self {
        Self(value.trim().to_ascii_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoleId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RoleId {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<RoleId> for String {
    fn from(value: RoleId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ids_normalize_case() {
        assert_eq!(RoleId::new(" Miner "), RoleId::from("miner"));
        assert_eq!(RoleId::new("FARMER").to_string(), "farmer");
        let parsed: RoleId = serde_json::from_str("\"Fisher\"").unwrap();
        assert_eq!(parsed.as_str(), "fisher");
    }

    #[test]
    fn subject_ids_are_verbatim() {
        let subject = SubjectId::from("Steve");
        assert_eq!(subject.as_str(), "Steve");
        assert_ne!(subject, SubjectId::from("steve"));
    }
}
