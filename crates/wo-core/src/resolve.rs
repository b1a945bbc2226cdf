// ── Site configuration resolver ──
//
// Pure derivation of a canonical (site type, cache type) pair from a set
// of feature flags. Multi-flag inputs are matched against a combination
// table generated from the PHP version registry; the tightest matching
// row wins.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use serde::Serialize;

use crate::error::CoreError;
use crate::model::{CacheType, FlagClass, SiteFlags, SiteKind, SiteType};
use crate::php::PhpVersion;

/// Outcome of resolving a flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    #[serde(flatten)]
    pub site_type: SiteType,
    pub cache_type: CacheType,
}

impl Resolution {
    pub fn kind(&self) -> SiteKind {
        self.site_type.kind
    }

    pub fn php(&self) -> Option<PhpVersion> {
        self.site_type.php
    }
}

// ── Combination table ───────────────────────────────────────────────

struct Combination {
    flags: BTreeSet<String>,
    outcome: SiteType,
}

impl Combination {
    fn new(flags: &[&str], outcome: SiteType) -> Self {
        Self {
            flags: flags.iter().map(|f| (*f).to_owned()).collect(),
            outcome,
        }
    }
}

const BASE_ROWS: &[(&[&str], SiteKind)] = &[
    (&["php", "mysql", "html"], SiteKind::Mysql),
    (&["html", "mysql"], SiteKind::Mysql),
    (&["php", "mysql"], SiteKind::Mysql),
    (&["php", "html"], SiteKind::Php),
    (&["wp", "wpsubdir"], SiteKind::Wpsubdir),
    (&["wp", "wpsubdomain"], SiteKind::Wpsubdomain),
];

/// Rows instantiated once per registry version; the version flag is added
/// to each row and qualifies its outcome.
const VERSION_ROWS: &[(&[&str], SiteKind)] = &[
    (&["mysql", "html"], SiteKind::Mysql),
    (&["mysql"], SiteKind::Mysql),
    (&["php"], SiteKind::Php),
    (&["wp"], SiteKind::Wp),
    (&["wpsubdir"], SiteKind::Wpsubdir),
    (&["wpsubdomain"], SiteKind::Wpsubdomain),
    (&["wp", "wpsubdir"], SiteKind::Wpsubdir),
    (&["wp", "wpsubdomain"], SiteKind::Wpsubdomain),
];

static COMBINATIONS: LazyLock<Vec<Combination>> = LazyLock::new(|| {
    let mut rows: Vec<Combination> = BASE_ROWS
        .iter()
        .map(|(flags, kind)| Combination::new(flags, SiteType::new(*kind)))
        .collect();

    for version in PhpVersion::all() {
        for (flags, kind) in VERSION_ROWS {
            let mut with_version = flags.to_vec();
            with_version.push(version.key());
            rows.push(Combination::new(
                &with_version,
                SiteType::tagged(*kind, *version),
            ));
        }
    }
    rows
});

// ── Resolution ──────────────────────────────────────────────────────

/// Resolve a flag set into a canonical site/cache type pair.
///
/// Zero or one type flag never conflicts. Several type flags must be a
/// subset of some permitted combination; among all such combinations the
/// one with the fewest flags decides.
pub fn resolve(flags: &SiteFlags) -> Result<Resolution, CoreError> {
    let mut types = Vec::new();
    let mut caches = Vec::new();
    for name in flags.iter() {
        match FlagClass::of(name) {
            Some(class) if class.is_type() => types.push(class),
            Some(FlagClass::Cache(cache)) => caches.push(cache),
            _ => {
                return Err(CoreError::validation(format!(
                    "unknown site flag '{name}'"
                )));
            }
        }
    }

    if caches.len() > 1 {
        return Err(conflict("multiple cache types", flags));
    }
    let cache_type = caches.first().copied().unwrap_or_default();

    let versions: Vec<PhpVersion> = types
        .iter()
        .filter_map(|t| match t {
            FlagClass::Version(v) => Some(*v),
            _ => None,
        })
        .collect();
    if versions.len() > 1 {
        return Err(conflict("multiple PHP versions", flags));
    }

    let site_type = match types.as_slice() {
        [] if cache_type == CacheType::Basic => SiteType::new(SiteKind::Html),
        [] => SiteType::new(SiteKind::Wp),
        [FlagClass::Version(v)] if cache_type == CacheType::Basic => {
            SiteType::tagged(SiteKind::Php, *v)
        }
        [FlagClass::Version(v)] => SiteType::tagged(SiteKind::Wp, *v),
        [FlagClass::Type(kind)] => SiteType::new(*kind),
        _ => match_combination(flags)?,
    };

    Ok(Resolution {
        site_type,
        cache_type,
    })
}

/// Resolve a reverse-proxy site. Any type or cache flag conflicts with it.
pub fn resolve_proxy(flags: &SiteFlags) -> Result<Resolution, CoreError> {
    if !flags.is_empty() {
        let mut offending = flags.to_vec();
        offending.push("proxy".into());
        return Err(CoreError::Conflict {
            reason: "proxy sites take no type or cache options".into(),
            flags: offending,
        });
    }
    Ok(Resolution {
        site_type: SiteType::new(SiteKind::Proxy),
        cache_type: CacheType::Basic,
    })
}

fn match_combination(flags: &SiteFlags) -> Result<SiteType, CoreError> {
    let wanted: BTreeSet<String> = flags
        .as_set()
        .iter()
        .filter(|f| FlagClass::of(f).is_some_and(FlagClass::is_type))
        .cloned()
        .collect();

    let candidates: Vec<&Combination> = COMBINATIONS
        .iter()
        .filter(|row| wanted.is_subset(&row.flags))
        .collect();

    let Some(tightest) = candidates.iter().map(|row| row.flags.len()).min() else {
        return Err(conflict("unsupported combination", flags));
    };

    let mut outcomes: Vec<SiteType> = Vec::new();
    for row in candidates.iter().filter(|row| row.flags.len() == tightest) {
        if !outcomes.contains(&row.outcome) {
            outcomes.push(row.outcome);
        }
    }

    match outcomes.as_slice() {
        [only] => Ok(*only),
        many => Err(CoreError::AmbiguousCombination {
            flags: flags.to_vec(),
            candidates: many
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" | "),
        }),
    }
}

fn conflict(reason: &str, flags: &SiteFlags) -> CoreError {
    CoreError::Conflict {
        reason: reason.into(),
        flags: flags.to_vec(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn flags(names: &[&str]) -> SiteFlags {
        SiteFlags::parse(names).unwrap()
    }

    fn php(key: &str) -> PhpVersion {
        PhpVersion::from_key(key).unwrap()
    }

    #[test]
    fn empty_flags_default_to_html_basic() {
        let res = resolve(&SiteFlags::new()).unwrap();
        assert_eq!(res.site_type, SiteType::new(SiteKind::Html));
        assert_eq!(res.cache_type, CacheType::Basic);
    }

    #[test]
    fn single_type_with_single_cache_never_conflicts() {
        let types = ["html", "php", "mysql", "wp", "wpsubdir", "wpsubdomain", "php82"];
        let caches = ["wpfc", "wpsc", "wpredis", "wprocket", "wpce"];
        for t in types {
            assert!(resolve(&flags(&[t])).is_ok(), "{t}");
            for c in caches {
                assert!(resolve(&flags(&[t, c])).is_ok(), "{t} + {c}");
            }
        }
        for c in caches {
            assert_eq!(resolve(&flags(&[c])).unwrap().kind(), SiteKind::Wp);
        }
    }

    #[test]
    fn two_cache_flags_conflict() {
        let err = resolve(&flags(&["wpfc", "wpredis"])).unwrap_err();
        match err {
            CoreError::Conflict { reason, flags } => {
                assert_eq!(reason, "multiple cache types");
                assert_eq!(flags, vec!["wpfc".to_owned(), "wpredis".to_owned()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(resolve(&flags(&["wp", "wpsc", "wpce", "wprocket"])).is_err());
    }

    #[test]
    fn version_mysql_html_resolves_to_tagged_mysql_for_every_version() {
        for v in PhpVersion::all() {
            let res = resolve(&flags(&[v.key(), "mysql", "html"])).unwrap();
            assert_eq!(res.site_type, SiteType::tagged(SiteKind::Mysql, *v));
        }
    }

    #[test]
    fn mysql_stack_with_redis_cache() {
        let res = resolve(&flags(&["php84", "mysql", "html", "wpredis"])).unwrap();
        insta::assert_json_snapshot!(res, @r#"
        {
          "site_type": "mysql",
          "php_version": "8.4",
          "cache_type": "wpredis"
        }
        "#);
    }

    #[test]
    fn multisite_subdir_with_version_and_rocket() {
        let res = resolve(&flags(&["wpsubdir", "php83", "wprocket"])).unwrap();
        assert_eq!(res.site_type, SiteType::tagged(SiteKind::Wpsubdir, php("php83")));
        assert_eq!(res.cache_type, CacheType::Wprocket);
    }

    #[test]
    fn tightest_row_wins_over_first_listed() {
        // {php, html} is also a subset of {php, mysql, html}.
        let res = resolve(&flags(&["php", "html"])).unwrap();
        assert_eq!(res.kind(), SiteKind::Php);

        let res = resolve(&flags(&["wp", "wpsubdomain", "php81"])).unwrap();
        assert_eq!(res.site_type, SiteType::tagged(SiteKind::Wpsubdomain, php("php81")));
    }

    #[test]
    fn version_alone_selects_php_or_wp() {
        let res = resolve(&flags(&["php80"])).unwrap();
        assert_eq!(res.site_type, SiteType::tagged(SiteKind::Php, php("php80")));
        let res = resolve(&flags(&["php80", "wpfc"])).unwrap();
        assert_eq!(res.site_type, SiteType::tagged(SiteKind::Wp, php("php80")));
        let res = resolve(&flags(&["php", "php80"])).unwrap();
        assert_eq!(res.site_type, SiteType::tagged(SiteKind::Php, php("php80")));
    }

    #[test]
    fn unsupported_combinations_conflict() {
        for set in [&["html", "wp"][..], &["mysql", "wpsubdir"], &["wpsubdir", "wpsubdomain"]] {
            match resolve(&flags(set)) {
                Err(CoreError::Conflict { reason, .. }) => {
                    assert_eq!(reason, "unsupported combination");
                }
                other => panic!("{set:?}: {other:?}"),
            }
        }
    }

    #[test]
    fn two_versions_conflict() {
        match resolve(&flags(&["wp", "php74", "php84"])) {
            Err(CoreError::Conflict { reason, .. }) => assert_eq!(reason, "multiple PHP versions"),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn table_has_no_equal_size_disagreements() {
        for a in COMBINATIONS.iter() {
            for b in COMBINATIONS.iter() {
                if a.flags == b.flags {
                    assert_eq!(a.outcome, b.outcome, "{:?}", a.flags);
                }
            }
        }
    }

    #[test]
    fn proxy_excludes_other_flags() {
        assert_eq!(resolve_proxy(&SiteFlags::new()).unwrap().kind(), SiteKind::Proxy);
        assert!(matches!(
            resolve_proxy(&flags(&["wp"])),
            Err(CoreError::Conflict { .. })
        ));
    }
}
