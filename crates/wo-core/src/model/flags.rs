// ── Site feature flags ──

use std::collections::BTreeSet;

use serde::Serialize;

use super::site::{CacheType, SiteKind};
use crate::error::CoreError;
use crate::php::PhpVersion;

/// Site-type flags that are not PHP versions.
pub const BASE_TYPE_FLAGS: &[&str] = &["html", "php", "mysql", "wp", "wpsubdir", "wpsubdomain"];

/// The set of active feature flags describing a site's desired shape.
///
/// Set semantics: duplicates collapse and order is irrelevant. Iteration is
/// sorted, which keeps error messages and snapshots stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SiteFlags(BTreeSet<String>);

/// How a single flag name participates in resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagClass {
    Type(SiteKind),
    Version(PhpVersion),
    Cache(CacheType),
}

impl FlagClass {
    pub fn of(name: &str) -> Option<FlagClass> {
        if let Some(v) = PhpVersion::from_key(name) {
            return Some(Self::Version(v));
        }
        if let Some(c) = CacheType::from_flag(name) {
            return Some(Self::Cache(c));
        }
        if BASE_TYPE_FLAGS.contains(&name) {
            return name.parse().ok().map(Self::Type);
        }
        None
    }

    /// Type flags include PHP-version flags.
    pub fn is_type(self) -> bool {
        matches!(self, Self::Type(_) | Self::Version(_))
    }
}

impl SiteFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a flag set, rejecting names that are not feature flags.
    pub fn parse<I, S>(names: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut flags = Self::new();
        for name in names {
            let name = name.as_ref().trim().to_lowercase();
            if FlagClass::of(&name).is_none() {
                return Err(CoreError::validation(format!(
                    "unknown site flag '{name}'"
                )));
            }
            flags.0.insert(name);
        }
        Ok(flags)
    }

    pub fn insert(&mut self, flag: impl Into<String>) -> bool {
        self.0.insert(flag.into())
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.0.contains(flag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }

    pub(crate) fn as_set(&self) -> &BTreeSet<String> {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for SiteFlags {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
