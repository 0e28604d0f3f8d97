use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::EnumString;

/// How many instances of a bean exist and how long each one lives.
///
/// `Application`, `Request` and custom scopes are *normal* scopes: consumers
/// reach their instances through a client proxy. `Singleton` and `Dependent`
/// are pseudo-scopes and are injected directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumString, Default)]
#[strum(ascii_case_insensitive)]
pub enum Scope {
    #[default]
    Dependent,
    Singleton,
    Application,
    Request,
    #[strum(default)]
    Custom(String),
}

impl Scope {
    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom(name.into())
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, Self::Application | Self::Request | Self::Custom(_))
    }

    pub fn is_dependent(&self) -> bool {
        matches!(self, Self::Dependent)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dependent => f.write_str("Dependent"),
            Self::Singleton => f.write_str("Singleton"),
            Self::Application => f.write_str("Application"),
            Self::Request => f.write_str("Request"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_parse_builtin_scopes_case_insensitively() {
        assert_eq!(Scope::from_str("singleton").unwrap(), Scope::Singleton);
        assert_eq!(Scope::from_str("REQUEST").unwrap(), Scope::Request);
    }

    #[test]
    fn test_unknown_names_become_custom_scopes() {
        assert_eq!(Scope::from_str("Session").unwrap(), Scope::custom("Session"));
        assert_eq!(Scope::custom("Session").to_string(), "Session");
    }

    #[test]
    fn test_normal_scopes() {
        assert!(Scope::Application.is_normal());
        assert!(Scope::Request.is_normal());
        assert!(Scope::custom("Session").is_normal());
        assert!(!Scope::Singleton.is_normal());
        assert!(!Scope::Dependent.is_normal());
    }
}
