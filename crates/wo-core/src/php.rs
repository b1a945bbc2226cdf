// ── PHP version registry ──
//
// The single table of supported PHP releases. Resolver rows, pool paths,
// unit names and backup filters all derive from `PhpVersion::all()`;
// supporting a new release means appending one entry to `REGISTRY`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

/// A supported PHP release, identified by its flag key (`php84`) and its
/// dotted version (`8.4`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhpVersion {
    key: &'static str,
    dotted: &'static str,
}

const REGISTRY: &[PhpVersion] = &[
    PhpVersion::new("php74", "7.4"),
    PhpVersion::new("php80", "8.0"),
    PhpVersion::new("php81", "8.1"),
    PhpVersion::new("php82", "8.2"),
    PhpVersion::new("php83", "8.3"),
    PhpVersion::new("php84", "8.4"),
];

impl PhpVersion {
    const fn new(key: &'static str, dotted: &'static str) -> Self {
        Self { key, dotted }
    }

    /// Every supported version, oldest first.
    pub fn all() -> &'static [PhpVersion] {
        REGISTRY
    }

    /// The newest supported version.
    pub fn latest() -> PhpVersion {
        // The registry is a non-empty constant.
        REGISTRY[REGISTRY.len() - 1]
    }

    /// Look up by flag key (`php84`).
    pub fn from_key(key: &str) -> Option<PhpVersion> {
        REGISTRY.iter().copied().find(|v| v.key == key)
    }

    /// Look up by dotted version (`8.4`).
    pub fn from_dotted(dotted: &str) -> Option<PhpVersion> {
        REGISTRY.iter().copied().find(|v| v.dotted == dotted)
    }

    /// Whether a feature flag name selects a PHP version.
    pub fn is_version_flag(name: &str) -> bool {
        Self::from_key(name).is_some()
    }

    /// Flag key, e.g. `php84`.
    pub fn key(self) -> &'static str {
        self.key
    }

    /// Dotted version, e.g. `8.4`.
    pub fn dotted(self) -> &'static str {
        self.dotted
    }

    /// Compact version without the `php` prefix, e.g. `84`.
    pub fn short(self) -> &'static str {
        self.key.trim_start_matches("php")
    }

    /// Position in the registry; newer versions sort higher.
    pub fn rank(self) -> usize {
        REGISTRY
            .iter()
            .position(|v| *v == self)
            .unwrap_or_default()
    }
}

impl fmt::Display for PhpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dotted)
    }
}

impl FromStr for PhpVersion {
    type Err = CoreError;

    /// Accepts `php84`, `8.4` or `84`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::from_key(s)
            .or_else(|| Self::from_dotted(s))
            .or_else(|| REGISTRY.iter().copied().find(|v| v.short() == s))
            .ok_or_else(|| CoreError::UnknownPhpVersion { value: s.into() })
    }
}

impl Serialize for PhpVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.dotted)
    }
}

impl<'de> Deserialize<'de> for PhpVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn keys_and_dotted_versions_map_one_to_one() {
        for v in PhpVersion::all() {
            assert_eq!(PhpVersion::from_key(v.key()), Some(*v));
            assert_eq!(PhpVersion::from_dotted(v.dotted()), Some(*v));
            assert_eq!(v.key(), format!("php{}", v.dotted().replace('.', "")));
        }
    }

    #[test]
    fn latest_is_last_entry() {
        assert_eq!(PhpVersion::latest().key(), "php84");
        assert!(PhpVersion::all().iter().all(|v| v.rank() <= PhpVersion::latest().rank()));
    }

    #[test]
    fn version_flag_predicate() {
        assert!(PhpVersion::is_version_flag("php81"));
        assert!(!PhpVersion::is_version_flag("php"));
        assert!(!PhpVersion::is_version_flag("php72"));
        assert!(!PhpVersion::is_version_flag("8.1"));
    }

    #[test]
    fn parses_every_spelling() {
        let v: PhpVersion = "8.3".parse().unwrap();
        assert_eq!(v.key(), "php83");
        assert_eq!("php83".parse::<PhpVersion>().unwrap(), v);
        assert_eq!("83".parse::<PhpVersion>().unwrap(), v);
        assert!(matches!(
            "5.6".parse::<PhpVersion>(),
            Err(CoreError::UnknownPhpVersion { .. })
        ));
    }

    #[test]
    fn serializes_as_dotted_string() {
        let v = PhpVersion::from_key("php80").unwrap();
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"8.0\"");
        let back: PhpVersion = serde_json::from_str("\"8.0\"").unwrap();
        assert_eq!(back, v);
    }
}
