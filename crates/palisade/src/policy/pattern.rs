//! Specifier classification and rule-name matching.

use crate::config::PackageRule;

/// Marker that turns a rule name into a prefix pattern.
const WILDCARD: char = '*';

/// Returns true if `rule_name` matches `candidate`.
///
/// A name ending in `*` matches any candidate sharing the prefix before it
/// (`@scope/*` matches every package in the scope). Anything else must match
/// exactly. Matching is case-sensitive.
pub fn matches(rule_name: &str, candidate: &str) -> bool {
    match rule_name.strip_suffix(WILDCARD) {
        Some(prefix) => candidate.starts_with(prefix),
        None => rule_name == candidate,
    }
}

/// First rule in list order matching any of the candidates.
pub fn find_rule<'a>(rules: &'a [PackageRule], candidates: &[&str]) -> Option<&'a PackageRule> {
    rules
        .iter()
        .find(|rule| candidates.iter().any(|c| matches(&rule.name, c)))
}

/// Returns true for specifiers that start with a same-directory or
/// parent-directory marker.
pub fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// Top-level package name of a specifier.
///
/// Scoped specifiers keep their first two segments (`@scope/name/sub` →
/// `@scope/name`); everything else is cut at the first `/`.
pub fn root_package_name(specifier: &str) -> &str {
    if specifier.starts_with('@') {
        let mut slashes = specifier.match_indices('/');
        match (slashes.next(), slashes.next()) {
            (Some(_), Some((second, _))) => &specifier[..second],
            _ => specifier,
        }
    } else {
        match specifier.find('/') {
            Some(idx) => &specifier[..idx],
            None => specifier,
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(matches("lodash", "lodash"));
        assert!(!matches("lodash", "lodash-es"));
        assert!(!matches("lodash", "Lodash"));
    }

    #[test]
    fn test_wildcard_boundary() {
        // The prefix itself matches.
        assert!(matches("lodash*", "lodash"));
        assert!(matches("lodash*", "lodash.merge"));
        // Near miss on the prefix.
        assert!(!matches("lodash*", "lodas"));
        assert!(!matches("lodash*", "xlodash"));
    }

    #[test]
    fn test_scoped_wildcard() {
        assert!(matches("@evil/*", "@evil/pkg"));
        assert!(matches("@evil/*", "@evil/other"));
        assert!(!matches("@evil/*", "@evilcorp/pkg"));
        assert!(!matches("@evil/*", "@good/pkg"));
    }

    #[test]
    fn test_wildcard_equivalent_to_starts_with() {
        let prefixes = ["node:", "@scope/", "react", ""];
        let candidates = ["node:fs", "node", "@scope/x", "@scope", "react-dom", "re", ""];
        for prefix in prefixes {
            let rule = format!("{prefix}*");
            for candidate in candidates {
                assert_eq!(
                    matches(&rule, candidate),
                    candidate.starts_with(prefix),
                    "rule {rule:?} vs {candidate:?}"
                );
            }
        }
    }

    #[test]
    fn test_find_rule_list_order() {
        let rules = vec![
            PackageRule::new("re*").with_reason("first"),
            PackageRule::new("react").with_reason("second"),
        ];
        let rule = find_rule(&rules, &["react"]).unwrap();
        assert_eq!(rule.reason.as_deref(), Some("first"));
        assert!(find_rule(&rules, &["vue"]).is_none());
    }

    #[test]
    fn test_relative_markers() {
        assert!(is_relative("./some-local-module"));
        assert!(is_relative("../up"));
        assert!(is_relative("."));
        assert!(is_relative(".."));
        assert!(!is_relative(".hidden"));
        assert!(!is_relative("lodash"));
    }

    #[test]
    fn test_root_package_name() {
        assert_eq!(root_package_name("lodash"), "lodash");
        assert_eq!(root_package_name("lodash/fp/merge"), "lodash");
        assert_eq!(root_package_name("@scope/name"), "@scope/name");
        assert_eq!(root_package_name("@scope/name/sub/path"), "@scope/name");
        assert_eq!(root_package_name("@scope"), "@scope");
        assert_eq!(root_package_name("node:fs"), "node:fs");
        assert_eq!(root_package_name("fs/promises"), "fs");
    }
}
