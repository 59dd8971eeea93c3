//! Target path syntax (SPEC_FULL.md §6) and the dotted absolute paths used by
//! [`crate::config::Configuration`]'s rendering and `is_in` queries.

/// A parsed transition target reference, as authored in a chart document.
/// Resolved to a [`crate::chart::NodeId`] by [`crate::chart::ChartBuilder`];
/// the rest of the crate never sees this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRef {
    /// `.` alone: the transition's own source, taken as an internal transition.
    SelfTarget,
    /// Leading `.`: relative descendant path from the source.
    Relative(Vec<String>),
    /// Leading `#<root-id>.`: absolute path from the chart root.
    Absolute(Vec<String>),
    /// Bare name or dotted name with no leading marker: resolved first as a
    /// descendant of the source, then as a sibling, then as a descendant of
    /// successive ancestors (SCXML-style nearest-scope resolution).
    Unqualified(Vec<String>),
}

/// Parse a single target string per SPEC_FULL.md §6's target path syntax.
pub fn parse_target(raw: &str) -> TargetRef {
    if raw == "." {
        return TargetRef::SelfTarget;
    }
    if let Some(rest) = raw.strip_prefix('#') {
        // "#<root-id>.a.b" -> drop the root-id segment, keep the rest.
        let mut segments: Vec<String> = rest.split('.').map(str::to_string).collect();
        if !segments.is_empty() {
            segments.remove(0);
        }
        return TargetRef::Absolute(segments);
    }
    if let Some(rest) = raw.strip_prefix('.') {
        return TargetRef::Relative(rest.split('.').map(str::to_string).collect());
    }
    TargetRef::Unqualified(raw.split('.').map(str::to_string).collect())
}

/// Join document-order path segments into the canonical dotted absolute path
/// used by `is_in`/`active_full`/`active_leaves` (e.g. `"A.A1.A1b"`).
pub fn join(segments: &[String]) -> String {
    segments.join(".")
}

/// `contains_path` semantics from SPEC_FULL.md §4.3: a query path matches an
/// active full path if it equals it, or is a dot-boundary prefix of it.
pub fn is_prefix_at_boundary(query: &str, full: &str) -> bool {
    if query == full {
        return true;
    }
    full.strip_prefix(query)
        .map(|rest| rest.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_self_target() {
        assert_eq!(parse_target("."), TargetRef::SelfTarget);
    }

    #[test]
    fn parses_absolute() {
        assert_eq!(
            parse_target("#m.A.A1"),
            TargetRef::Absolute(vec!["A".into(), "A1".into()])
        );
    }

    #[test]
    fn parses_relative() {
        assert_eq!(
            parse_target(".A1b"),
            TargetRef::Relative(vec!["A1b".into()])
        );
    }

    #[test]
    fn parses_unqualified() {
        assert_eq!(
            parse_target("A.A1"),
            TargetRef::Unqualified(vec!["A".into(), "A1".into()])
        );
    }

    #[test]
    fn boundary_prefix_matches() {
        assert!(is_prefix_at_boundary("A", "A.A1.A1b"));
        assert!(is_prefix_at_boundary("A.A1", "A.A1.A1b"));
        assert!(is_prefix_at_boundary("A.A1.A1b", "A.A1.A1b"));
        assert!(!is_prefix_at_boundary("A.A", "A.A1.A1b"));
        assert!(!is_prefix_at_boundary("B", "A.A1.A1b"));
    }
}
