//! Binding sets: named assignments of terms to query variables
//!
//! A [`BindingSet`] is the row type flowing through the federation engine.
//! Insertion order is preserved (projection order matters when rendering
//! requests) and lookups are by name. Rows are small (a handful of
//! variables), so an ordered vector beats a hash map here.

use crate::term::RdfTerm;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Two bindings assign different values to the same variable during a
/// strict merge. This is an implementation error in the calling pipeline,
/// not a user-facing query error.
#[derive(Error, Debug)]
#[error("conflicting values for variable '{var}': {left} vs {right}")]
pub struct MergeConflict {
    pub var: Arc<str>,
    pub left: String,
    pub right: String,
}

/// An immutable mapping from variable name to RDF term
///
/// Cheap to clone: names and terms are Arc-backed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindingSet {
    entries: Vec<(Arc<str>, RdfTerm)>,
}

impl BindingSet {
    /// Create an empty binding set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a binding set from name/term pairs
    ///
    /// Later duplicates of a name are ignored (first occurrence wins).
    pub fn from_pairs<I, N>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, RdfTerm)>,
        N: Into<Arc<str>>,
    {
        let mut set = Self::new();
        for (name, term) in pairs {
            let name = name.into();
            if !set.is_bound(&name) {
                set.entries.push((name, term));
            }
        }
        set
    }

    /// Single-entry binding set
    pub fn singleton(name: impl Into<Arc<str>>, term: RdfTerm) -> Self {
        Self {
            entries: vec![(name.into(), term)],
        }
    }

    /// Look up a variable by name
    pub fn get(&self, name: &str) -> Option<&RdfTerm> {
        self.entries
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, t)| t)
    }

    /// True if the variable is bound
    pub fn is_bound(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of bound variables
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no variables are bound
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over (name, term) entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &RdfTerm)> {
        self.entries.iter().map(|(n, t)| (n, t))
    }

    /// Variable names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &Arc<str>> {
        self.entries.iter().map(|(n, _)| n)
    }

    /// Return a copy with one additional binding
    ///
    /// If `name` is already bound, the existing value is kept.
    pub fn with(&self, name: impl Into<Arc<str>>, term: RdfTerm) -> Self {
        let name = name.into();
        let mut out = self.clone();
        if !out.is_bound(&name) {
            out.entries.push((name, term));
        }
        out
    }

    /// Return a copy without the named binding
    pub fn without(&self, name: &str) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(n, _)| n.as_ref() != name)
                .cloned()
                .collect(),
        }
    }

    /// Strict merge: union of both sides, conflicting values are an error
    ///
    /// Keys present in only one side are copied in. A key bound on both
    /// sides must carry the same value; a mismatch indicates a correlation
    /// bug upstream and surfaces as [`MergeConflict`].
    pub fn try_merge(&self, other: &BindingSet) -> Result<BindingSet, MergeConflict> {
        let mut out = self.clone();
        for (name, term) in other.iter() {
            match out.get(name) {
                None => out.entries.push((name.clone(), term.clone())),
                Some(existing) if existing == term => {}
                Some(existing) => {
                    return Err(MergeConflict {
                        var: name.clone(),
                        left: existing.to_string(),
                        right: term.to_string(),
                    });
                }
            }
        }
        Ok(out)
    }

    /// Priority merge: `base` values win on name collision
    ///
    /// Used when correlating remote result rows back to their originating
    /// upstream bindings: the upstream values are already fixed, so a
    /// remote endpoint echoing a different value must not clobber them.
    pub fn merged_over(&self, base: &BindingSet) -> BindingSet {
        let mut out = base.clone();
        for (name, term) in self.iter() {
            if !out.is_bound(name) {
                out.entries.push((name.clone(), term.clone()));
            }
        }
        out
    }
}

impl fmt::Display for BindingSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, term)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "?{name}={term}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iri(s: &str) -> RdfTerm {
        RdfTerm::iri(s)
    }

    #[test]
    fn test_from_pairs_preserves_order() {
        let b = BindingSet::from_pairs([("x", iri("http://a")), ("y", iri("http://b"))]);
        let names: Vec<_> = b.names().map(|n| n.to_string()).collect();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[test]
    fn test_try_merge_disjoint() {
        let a = BindingSet::singleton("x", iri("http://a"));
        let b = BindingSet::singleton("y", iri("http://b"));
        let merged = a.try_merge(&b).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get("x"), Some(&iri("http://a")));
        assert_eq!(merged.get("y"), Some(&iri("http://b")));
    }

    #[test]
    fn test_try_merge_agreeing_overlap() {
        let a = BindingSet::from_pairs([("x", iri("http://a")), ("y", iri("http://b"))]);
        let b = BindingSet::singleton("x", iri("http://a"));
        assert_eq!(a.try_merge(&b).unwrap().len(), 2);
    }

    #[test]
    fn test_try_merge_conflict() {
        let a = BindingSet::singleton("x", iri("http://a"));
        let b = BindingSet::singleton("x", iri("http://other"));
        let err = a.try_merge(&b).unwrap_err();
        assert_eq!(err.var.as_ref(), "x");
    }

    #[test]
    fn test_merged_over_base_wins() {
        let remote = BindingSet::from_pairs([("x", iri("http://remote")), ("v", iri("http://v"))]);
        let base = BindingSet::singleton("x", iri("http://upstream"));
        let merged = remote.merged_over(&base);
        assert_eq!(merged.get("x"), Some(&iri("http://upstream")));
        assert_eq!(merged.get("v"), Some(&iri("http://v")));
    }

    #[test]
    fn test_with_does_not_clobber() {
        let b = BindingSet::singleton("x", iri("http://a"));
        let b2 = b.with("x", iri("http://b"));
        assert_eq!(b2.get("x"), Some(&iri("http://a")));
    }
}
