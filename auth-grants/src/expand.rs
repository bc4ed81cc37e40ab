use crate::{
    error::{GrantError, Result},
    models::{GrantField, GrantPattern},
};
use tracing::debug;

/// Expand a triple into every stored pattern that would authorize it.
///
/// Candidates replace zero, one or two positions with the wildcard. The
/// all-wildcard candidate is never produced, and candidates that coincide
/// (only possible when the input already holds wildcards) are kept once, in
/// first-occurrence order.
pub fn expand_patterns(
    subject: &GrantField,
    relation: &GrantField,
    entity: &GrantField,
) -> Result<Vec<GrantPattern>> {
    let any = || GrantField::Wildcard;
    let candidates = [
        GrantPattern::new(subject.clone(), relation.clone(), entity.clone()),
        GrantPattern::new(any(), relation.clone(), entity.clone()),
        GrantPattern::new(subject.clone(), any(), entity.clone()),
        GrantPattern::new(subject.clone(), relation.clone(), any()),
        GrantPattern::new(subject.clone(), any(), any()),
        GrantPattern::new(any(), relation.clone(), any()),
        GrantPattern::new(any(), any(), entity.clone()),
    ];

    let mut patterns: Vec<GrantPattern> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if candidate.is_all_wildcard() || patterns.contains(&candidate) {
            continue;
        }
        patterns.push(candidate);
    }

    if patterns.is_empty() {
        return Err(GrantError::InvariantViolation(
            "no pattern to match for an all-wildcard triple".to_string(),
        ));
    }

    debug!(
        "Expanded ({}, {}, {}) into {} patterns",
        subject,
        relation,
        entity,
        patterns.len()
    );
    Ok(patterns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn c(value: &str) -> GrantField {
        GrantField::concrete(value).unwrap()
    }

    #[test]
    fn test_concrete_triple_expands_to_canonical_seven() {
        let patterns = expand_patterns(&c("u"), &c("r"), &c("e")).unwrap();
        let w = GrantField::Wildcard;
        assert_eq!(
            patterns,
            vec![
                GrantPattern::new(c("u"), c("r"), c("e")),
                GrantPattern::new(w.clone(), c("r"), c("e")),
                GrantPattern::new(c("u"), w.clone(), c("e")),
                GrantPattern::new(c("u"), c("r"), w.clone()),
                GrantPattern::new(c("u"), w.clone(), w.clone()),
                GrantPattern::new(w.clone(), c("r"), w.clone()),
                GrantPattern::new(w.clone(), w, c("e")),
            ]
        );
    }

    #[test]
    fn test_wildcard_subject_collapses_duplicates() {
        let w = GrantField::Wildcard;
        let patterns = expand_patterns(&w, &c("editor"), &c("doc1")).unwrap();
        assert_eq!(
            patterns,
            vec![
                GrantPattern::new(w.clone(), c("editor"), c("doc1")),
                GrantPattern::new(w.clone(), w.clone(), c("doc1")),
                GrantPattern::new(w.clone(), c("editor"), w),
            ]
        );
    }

    #[test]
    fn test_single_concrete_field_yields_one_pattern() {
        let w = GrantField::Wildcard;
        let patterns = expand_patterns(&w, &w, &c("doc1")).unwrap();
        assert_eq!(patterns, vec![GrantPattern::new(w.clone(), w, c("doc1"))]);
    }

    #[test]
    fn test_all_wildcard_is_invariant_violation() {
        let w = GrantField::Wildcard;
        assert!(matches!(
            expand_patterns(&w, &w, &w),
            Err(GrantError::InvariantViolation(_))
        ));
    }

    proptest! {
        #[test]
        fn concrete_triples_expand_to_seven_distinct_patterns(
            u in "[a-z0-9:_-]{1,16}",
            r in "[a-z0-9:_-]{1,16}",
            e in "[a-z0-9:_-]{1,16}",
        ) {
            let patterns = expand_patterns(&c(&u), &c(&r), &c(&e)).unwrap();
            prop_assert_eq!(patterns.len(), 7);
            let distinct: HashSet<_> = patterns.iter().collect();
            prop_assert_eq!(distinct.len(), 7);
            prop_assert!(patterns.iter().all(|p| !p.is_all_wildcard()));
        }
    }
}
