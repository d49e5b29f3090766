//! Matching of a scope hint against `Chunk::source`.
//!
//! Fuzzy matching grades each source: an exact match after normalisation beats
//! a prefix match, which beats a substring match. Only the best grade present
//! among the known sources is accepted, so "manual1" never pulls in "manual10"
//! when "manual1" itself exists.
use std::collections::BTreeSet;

use ragctx_core::config::ScopeMatch;

/// Partial (prefix or substring) matches need at least this many normalised
/// characters in the scope.
pub const MIN_PARTIAL_SCOPE: usize = 3;

/// Lowercased alphanumeric characters only, so "Manual-A" and "manual a" agree.
pub fn normalize(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).flat_map(char::to_lowercase).collect()
}

/// How closely a source matches a scope hint. Ordered best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScopeFit {
    Exact,
    Prefix,
    Contains,
}

/// Grade of `source` for `scope`, or `None` when it does not match at all.
/// A source is never matched for being contained in the scope.
pub fn scope_fit(mode: ScopeMatch, scope: &str, source: &str) -> Option<ScopeFit> {
    match mode {
        ScopeMatch::Exact => (scope == source).then_some(ScopeFit::Exact),
        ScopeMatch::Fuzzy => {
            let (s, src) = (normalize(scope), normalize(source));
            if s.is_empty() || src.is_empty() {
                return None;
            }
            if s == src {
                Some(ScopeFit::Exact)
            } else if s.chars().count() < MIN_PARTIAL_SCOPE {
                None
            } else if src.starts_with(&s) {
                Some(ScopeFit::Prefix)
            } else if src.contains(&s) {
                Some(ScopeFit::Contains)
            } else {
                None
            }
        }
    }
}

pub fn scope_matches(mode: ScopeMatch, scope: &str, source: &str) -> bool {
    scope_fit(mode, scope, source).is_some()
}

/// The sources a scope resolves to: those sharing the best grade found.
pub fn resolve_scope<'a, I>(mode: ScopeMatch, scope: &str, sources: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let graded: Vec<(ScopeFit, &str)> =
        sources.into_iter().filter_map(|src| scope_fit(mode, scope, src).map(|fit| (fit, src))).collect();
    let Some(best) = graded.iter().map(|(fit, _)| *fit).min() else { return BTreeSet::new() };
    graded.into_iter().filter(|(fit, _)| *fit == best).map(|(_, src)| src.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuzzy_ignores_case_and_punctuation() {
        assert!(scope_matches(ScopeMatch::Fuzzy, "Manual-A", "manual_a"));
        assert!(scope_matches(ScopeMatch::Fuzzy, "Bosch 500", "bosch500_dishwasher"));
        assert!(!scope_matches(ScopeMatch::Fuzzy, "manualB", "manualA"));
        assert!(!scope_matches(ScopeMatch::Fuzzy, "--", "manualA"));
    }

    #[test]
    fn source_inside_scope_is_not_a_match() {
        assert!(!scope_matches(ScopeMatch::Fuzzy, "bosch500 dishwasher series", "bosch500"));
        assert!(!scope_matches(ScopeMatch::Fuzzy, "manual10", "manual1"));
    }

    #[test]
    fn short_scopes_only_match_exactly() {
        assert!(!scope_matches(ScopeMatch::Fuzzy, "a", "manualA"));
        assert!(!scope_matches(ScopeMatch::Fuzzy, "al", "manualA"));
        assert_eq!(scope_fit(ScopeMatch::Fuzzy, "A", "a"), Some(ScopeFit::Exact));
    }

    #[test]
    fn grades_rank_exact_then_prefix_then_contains() {
        assert_eq!(scope_fit(ScopeMatch::Fuzzy, "manual1", "Manual 1"), Some(ScopeFit::Exact));
        assert_eq!(scope_fit(ScopeMatch::Fuzzy, "manual1", "manual10"), Some(ScopeFit::Prefix));
        assert_eq!(scope_fit(ScopeMatch::Fuzzy, "dishwasher", "bosch_dishwasher"), Some(ScopeFit::Contains));
    }

    #[test]
    fn exact_source_shadows_longer_neighbours() {
        let sources = ["manual1", "manual10", "manual11"];
        let resolved = resolve_scope(ScopeMatch::Fuzzy, "manual1", sources);
        assert_eq!(resolved.into_iter().collect::<Vec<_>>(), vec!["manual1"]);

        let resolved = resolve_scope(ScopeMatch::Fuzzy, "manual10", ["manual1", "manual10"]);
        assert_eq!(resolved.into_iter().collect::<Vec<_>>(), vec!["manual10"]);

        let resolved = resolve_scope(ScopeMatch::Fuzzy, "manual1", ["manual10", "manual11", "guide1"]);
        assert_eq!(resolved.into_iter().collect::<Vec<_>>(), vec!["manual10", "manual11"]);
        assert!(resolve_scope(ScopeMatch::Fuzzy, "oven", ["manual1"]).is_empty());
    }

    #[test]
    fn exact_is_byte_equality() {
        assert!(scope_matches(ScopeMatch::Exact, "manualA", "manualA"));
        assert!(!scope_matches(ScopeMatch::Exact, "manuala", "manualA"));
    }
}
