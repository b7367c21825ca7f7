//! Series key and identifier derivation
//!
//! Pure string functions plus [`KeyDeriver`], which adds the one impure step:
//! resolving an owning group's abbreviation through a [`GroupDirectory`].
//!
//! ```text
//! display name "Spar Group (Pty) Ltd" ──► prefix "SPA"
//! group "Acme Inc" ──directory──► abbr "ACM"
//! series key  = type_tag + prefix + abbr   = "CUSTSPAACM"
//! identifier  = prefix + abbr + seq(3+)    = "SPAACM001"
//! ```

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

use nomen_core::limits::{DEFAULT_GROUP_ABBR, DEFAULT_NAME_PREFIX, MAX_PREFIX_LENGTH};
use nomen_core::{EntityIdentifier, GroupDirectory, SeriesKey};

/// Clean, uppercase, alphanumeric prefix of a display name
///
/// Strips every character outside `[A-Za-z0-9]`, uppercases, and keeps the
/// first three characters. Returns `"UNK"` when nothing remains.
pub fn derive_prefix(display_name: &str) -> String {
    let prefix: String = display_name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_PREFIX_LENGTH)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if prefix.is_empty() {
        DEFAULT_NAME_PREFIX.to_string()
    } else {
        prefix
    }
}

/// Decimal string left-padded with zeros to at least `padding` digits
pub fn format_sequence(value: i64, padding: usize) -> String {
    format!("{value:0padding$}")
}

/// `{type_tag}{prefix}{abbr}`
pub fn series_key(type_tag: &str, prefix: &str, abbr: &str) -> SeriesKey {
    SeriesKey::compose(type_tag, prefix, abbr)
}

/// `{prefix}{abbr}{sequence padded to padding}`
pub fn build_identifier(prefix: &str, abbr: &str, sequence: i64, padding: usize) -> EntityIdentifier {
    EntityIdentifier::compose(prefix, abbr, &format_sequence(sequence, padding))
}

/// True when `identifier` is `{prefix}{abbr}` followed by at least `padding`
/// ASCII digits and nothing else
pub fn matches_scheme(identifier: &str, prefix: &str, abbr: &str, padding: usize) -> bool {
    identifier
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix(abbr))
        .map(|digits| digits.len() >= padding && digits.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// Numeric suffix of `identifier` after `combined_prefix`
///
/// Returns `None` unless the suffix is a non-empty run of ASCII digits that
/// fits in an `i64`.
pub fn parse_sequence(identifier: &str, combined_prefix: &str) -> Option<i64> {
    let digits = identifier.strip_prefix(combined_prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Expected prefix and abbreviation for one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameParts {
    /// Name prefix, e.g. `SPA`
    pub prefix: String,
    /// Group abbreviation, e.g. `ACM`
    pub abbr: String,
}

impl NameParts {
    /// `{prefix}{abbr}`, the part of an identifier before the sequence
    pub fn combined(&self) -> String {
        format!("{}{}", self.prefix, self.abbr)
    }

    /// Series key for `type_tag`
    pub fn series_key(&self, type_tag: &str) -> SeriesKey {
        series_key(type_tag, &self.prefix, &self.abbr)
    }

    /// Identifier for `sequence`
    pub fn identifier(&self, sequence: i64, padding: usize) -> EntityIdentifier {
        build_identifier(&self.prefix, &self.abbr, sequence, padding)
    }

    /// True when `identifier` already follows the scheme for these parts
    pub fn matches(&self, identifier: &str, padding: usize) -> bool {
        matches_scheme(identifier, &self.prefix, &self.abbr, padding)
    }
}

/// Derives name parts, resolving group abbreviations with caching
pub struct KeyDeriver {
    directory: Arc<dyn GroupDirectory>,
    default_group: Option<String>,
    cache: DashMap<String, String>,
}

impl KeyDeriver {
    /// Create a deriver over a group directory
    pub fn new(directory: Arc<dyn GroupDirectory>) -> Self {
        Self {
            directory,
            default_group: None,
            cache: DashMap::new(),
        }
    }

    /// Override the directory's default group
    pub fn with_default_group(mut self, group: Option<String>) -> Self {
        self.default_group = group;
        self
    }

    /// Abbreviation of the owning group, or `"CO"`
    ///
    /// A missing or empty `group_id` falls back to the configured default
    /// group, then to the directory's default. Lookup failures, unknown
    /// groups, and empty abbreviations all degrade to the sentinel with a
    /// warning; this never fails.
    pub fn resolve_group_abbr(&self, group_id: Option<&str>) -> String {
        let group = match group_id.filter(|g| !g.trim().is_empty()) {
            Some(g) => Some(g.to_string()),
            None => {
                let fallback = self
                    .default_group
                    .clone()
                    .or_else(|| self.directory.default_group());
                debug!(target: "nomen::naming", default = ?fallback, "No group provided, using default group");
                fallback
            }
        };

        let Some(group) = group else {
            warn!(target: "nomen::naming", "No group found (default or provided), using default abbreviation");
            return DEFAULT_GROUP_ABBR.to_string();
        };

        if let Some(abbr) = self.cache.get(&group) {
            return abbr.clone();
        }

        match self.directory.abbreviation(&group) {
            Ok(Some(abbr)) if !abbr.trim().is_empty() => {
                debug!(target: "nomen::naming", group = %group, abbr = %abbr, "Fetched group abbreviation");
                self.cache.insert(group, abbr.clone());
                abbr
            }
            Ok(_) => {
                warn!(target: "nomen::naming", group = %group, "Group has no abbreviation, using default");
                DEFAULT_GROUP_ABBR.to_string()
            }
            Err(e) => {
                error!(target: "nomen::naming", group = %group, error = %e, "Error fetching group abbreviation");
                DEFAULT_GROUP_ABBR.to_string()
            }
        }
    }

    /// Expected prefix and abbreviation for a display name and group
    pub fn name_parts(&self, display_name: &str, group_id: Option<&str>) -> NameParts {
        NameParts {
            prefix: derive_prefix(display_name),
            abbr: self.resolve_group_abbr(group_id),
        }
    }

    /// Series key for an entity
    pub fn build_series_key(
        &self,
        type_tag: &str,
        display_name: &str,
        group_id: Option<&str>,
    ) -> SeriesKey {
        self.name_parts(display_name, group_id).series_key(type_tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nomen_core::{Error, Result};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDirectory {
        lookups: AtomicUsize,
    }

    impl GroupDirectory for CountingDirectory {
        fn default_group(&self) -> Option<String> {
            Some("Acme Inc".to_string())
        }

        fn abbreviation(&self, group_id: &str) -> Result<Option<String>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            match group_id {
                "Acme Inc" => Ok(Some("ACM".to_string())),
                "Blank Co" => Ok(Some(String::new())),
                "Broken" => Err(Error::Storage("catalog offline".to_string())),
                _ => Ok(None),
            }
        }
    }

    fn deriver() -> (KeyDeriver, Arc<CountingDirectory>) {
        let dir = Arc::new(CountingDirectory {
            lookups: AtomicUsize::new(0),
        });
        (KeyDeriver::new(dir.clone()), dir)
    }

    #[test]
    fn test_derive_prefix_examples() {
        assert_eq!(derive_prefix("Spar Group (Pty) Ltd"), "SPA");
        assert_eq!(derive_prefix("---"), "UNK");
        assert_eq!(derive_prefix(""), "UNK");
        assert_eq!(derive_prefix("a-b"), "AB");
        assert_eq!(derive_prefix("3M Company"), "3MC");
        assert_eq!(derive_prefix("Émile Zola"), "MIL");
    }

    #[test]
    fn test_format_sequence_pads_without_truncating() {
        assert_eq!(format_sequence(1, 3), "001");
        assert_eq!(format_sequence(42, 3), "042");
        assert_eq!(format_sequence(1000, 3), "1000");
    }

    #[test]
    fn test_matches_scheme() {
        assert!(matches_scheme("SPAACM001", "SPA", "ACM", 3));
        assert!(matches_scheme("SPAACM1234", "SPA", "ACM", 3));
        assert!(!matches_scheme("SPAACM01", "SPA", "ACM", 3));
        assert!(!matches_scheme("SPAACM001X", "SPA", "ACM", 3));
        assert!(!matches_scheme("CUST-0001", "SPA", "ACM", 3));
        assert!(!matches_scheme("SPACO001", "SPA", "ACM", 3));
    }

    #[test]
    fn test_parse_sequence() {
        assert_eq!(parse_sequence("SPAACM007", "SPAACM"), Some(7));
        assert_eq!(parse_sequence("SPAACM", "SPAACM"), None);
        assert_eq!(parse_sequence("SPAACM12A", "SPAACM"), None);
        assert_eq!(parse_sequence("XYZ001", "SPAACM"), None);
    }

    #[test]
    fn test_resolve_known_group_is_cached() {
        let (deriver, dir) = deriver();
        assert_eq!(deriver.resolve_group_abbr(Some("Acme Inc")), "ACM");
        assert_eq!(deriver.resolve_group_abbr(Some("Acme Inc")), "ACM");
        assert_eq!(dir.lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_resolve_degrades_to_sentinel() {
        let (deriver, _) = deriver();
        assert_eq!(deriver.resolve_group_abbr(Some("Unknown")), "CO");
        assert_eq!(deriver.resolve_group_abbr(Some("Blank Co")), "CO");
        assert_eq!(deriver.resolve_group_abbr(Some("Broken")), "CO");
    }

    #[test]
    fn test_resolve_missing_group_uses_default() {
        let (deriver, _) = deriver();
        assert_eq!(deriver.resolve_group_abbr(None), "ACM");
        assert_eq!(deriver.resolve_group_abbr(Some("  ")), "ACM");

        let (deriver, _) = self::deriver();
        let deriver = deriver.with_default_group(Some("Unknown".to_string()));
        assert_eq!(deriver.resolve_group_abbr(None), "CO");
    }

    #[test]
    fn test_build_series_key() {
        let (deriver, _) = deriver();
        let key = deriver.build_series_key("CUST", "Spar", Some("Acme Inc"));
        assert_eq!(key.as_str(), "CUSTSPAACM");
        assert_eq!(build_identifier("SPA", "ACM", 3, 3), "SPAACM003");
    }

    proptest! {
        #[test]
        fn prop_derive_prefix_is_deterministic(name in ".*") {
            prop_assert_eq!(derive_prefix(&name), derive_prefix(&name));
        }

        #[test]
        fn prop_derive_prefix_shape(name in ".*") {
            let prefix = derive_prefix(&name);
            prop_assert!(!prefix.is_empty() && prefix.len() <= MAX_PREFIX_LENGTH);
            prop_assert!(prefix.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
        }

        #[test]
        fn prop_built_identifier_matches_scheme(name in "[A-Za-z0-9 ]{0,12}", seq in 1i64..100_000) {
            let prefix = derive_prefix(&name);
            let id = build_identifier(&prefix, "ACM", seq, 3);
            prop_assert!(matches_scheme(id.as_str(), &prefix, "ACM", 3));
            prop_assert_eq!(parse_sequence(id.as_str(), &format!("{prefix}ACM")), Some(seq));
        }
    }
}
