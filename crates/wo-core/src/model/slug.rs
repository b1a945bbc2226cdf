// ── Site identity types ──
//
// `Slug` is the filesystem and user-name safe key every per-site host
// resource is named after: pool users, unit instances, sockets, logs,
// lock files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Derive the slug for a domain: dots become dashes, case is folded.
///
/// Pure and idempotent: `slug(slug(d)) == slug(d)`.
pub fn slug(domain: &str) -> String {
    domain.trim().to_lowercase().replace('.', "-")
}

/// Canonical form of a user-supplied domain: scheme, trailing slash and a
/// leading `www.` are stripped, case is folded.
pub fn normalize_domain(input: &str) -> Result<String, CoreError> {
    let mut domain = input.trim().to_lowercase();
    for prefix in ["https://", "http://"] {
        if let Some(rest) = domain.strip_prefix(prefix) {
            domain = rest.to_owned();
        }
    }
    let domain = domain.trim_end_matches('/');
    let domain = domain.strip_prefix("www.").unwrap_or(domain);

    let valid_label = |label: &str| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };
    if domain.len() > 253 || !domain.contains('.') || !domain.split('.').all(valid_label) {
        return Err(CoreError::validation(format!("invalid domain name '{input}'")));
    }
    Ok(domain.to_owned())
}

/// Slug of a domain name (`Example.COM` -> `example-com`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    pub fn new(domain: impl AsRef<str>) -> Self {
        Self(slug(domain.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Dedicated Unix user (and group) owning the site's PHP-FPM pool.
    pub fn pool_user(&self) -> String {
        format!("php-{}", self.0)
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Slug {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn folds_case_and_dots() {
        assert_eq!(slug("Example.COM"), "example-com");
        assert_eq!(slug("example.com"), "example-com");
        assert_eq!(slug("Example.COM"), slug("example.com"));
    }

    #[test]
    fn keeps_existing_dashes() {
        assert_eq!(slug("my-site.example.org"), "my-site-example-org");
    }

    #[test]
    fn is_idempotent() {
        for domain in ["a.b.c", "Sub.Domain-X.io", "already-a-slug", "UPPER"] {
            let once = slug(domain);
            assert_eq!(slug(&once), once);
        }
    }

    #[test]
    fn normalizes_user_input() {
        assert_eq!(normalize_domain("https://WWW.Example.com/").unwrap(), "example.com");
        assert_eq!(normalize_domain(" sub.example.co.uk ").unwrap(), "sub.example.co.uk");
        for bad in ["localhost", "-a.com", "a..com", "a_b.com", "", "exa mple.com"] {
            assert!(normalize_domain(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn pool_user_is_prefixed() {
        let s: Slug = "blog.example.net".parse().unwrap();
        assert_eq!(s.as_str(), "blog-example-net");
        assert_eq!(s.pool_user(), "php-blog-example-net");
    }
}
