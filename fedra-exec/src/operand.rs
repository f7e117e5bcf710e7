//! Query operand: the remote request fragment
//!
//! An [`Operand`] is an immutable basic graph pattern representing the
//! right-hand side of a join (or a SERVICE body / union arm). It knows its
//! free variable names and can render itself as SPARQL source text given a
//! variable substitution; request construction around it lives in
//! [`query_render`](crate::query_render).

use fedra_model::{BindingSet, RdfTerm};
use std::sync::Arc;

/// A triple pattern position: a concrete term or a variable
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TermOrVar {
    Term(RdfTerm),
    Var(Arc<str>),
}

impl TermOrVar {
    /// Shorthand for a variable position
    pub fn var(name: impl Into<Arc<str>>) -> Self {
        TermOrVar::Var(name.into())
    }

    /// Shorthand for a concrete term position
    pub fn term(term: RdfTerm) -> Self {
        TermOrVar::Term(term)
    }

    /// Render this position, substituting variables that `substitution`
    /// binds with their concrete value.
    fn render(&self, out: &mut String, substitution: &BindingSet) {
        match self {
            TermOrVar::Term(term) => term.render_sparql(out),
            TermOrVar::Var(name) => match substitution.get(name) {
                Some(term) => term.render_sparql(out),
                None => {
                    out.push('?');
                    out.push_str(name);
                }
            },
        }
    }
}

/// One triple pattern of the operand's graph pattern
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriplePattern {
    pub subject: TermOrVar,
    pub predicate: TermOrVar,
    pub object: TermOrVar,
}

impl TriplePattern {
    pub fn new(subject: TermOrVar, predicate: TermOrVar, object: TermOrVar) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// Append `s p o . ` with the given substitution applied
    pub fn render(&self, out: &mut String, substitution: &BindingSet) {
        self.subject.render(out, substitution);
        out.push(' ');
        self.predicate.render(out, substitution);
        out.push(' ');
        self.object.render(out, substitution);
        out.push_str(" . ");
    }

    fn collect_vars(&self, into: &mut Vec<Arc<str>>) {
        for position in [&self.subject, &self.predicate, &self.object] {
            if let TermOrVar::Var(name) = position {
                if !into.iter().any(|v| v == name) {
                    into.push(name.clone());
                }
            }
        }
    }
}

/// An immutable query fragment evaluated against a remote endpoint
#[derive(Clone, Debug)]
pub struct Operand {
    patterns: Vec<TriplePattern>,
    silent: bool,
}

impl Operand {
    /// Create an operand from its graph pattern
    pub fn new(patterns: Vec<TriplePattern>) -> Self {
        Self {
            patterns,
            silent: false,
        }
    }

    /// Mark this operand silent: remote failures are suppressed and the
    /// upstream bindings pass through unenriched instead of failing the
    /// query.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// True if remote failures should be suppressed
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// The operand's triple patterns
    pub fn patterns(&self) -> &[TriplePattern] {
        &self.patterns
    }

    /// Free variable names in first-occurrence order, deduplicated
    pub fn free_vars(&self) -> Vec<Arc<str>> {
        let mut vars = Vec::new();
        for pattern in &self.patterns {
            pattern.collect_vars(&mut vars);
        }
        vars
    }

    /// Free variables still unbound after applying `substitution`
    pub fn free_vars_after(&self, substitution: &BindingSet) -> Vec<Arc<str>> {
        self.free_vars()
            .into_iter()
            .filter(|v| !substitution.is_bound(v))
            .collect()
    }

    /// The operand's free variables that are bound by at least one entry
    /// of `block` ("relevant binding names"). An empty result means no
    /// WHERE-clause correlation exists and the join degenerates to a cross
    /// product.
    pub fn relevant_names(&self, block: &[BindingSet]) -> Vec<Arc<str>> {
        self.free_vars()
            .into_iter()
            .filter(|v| block.iter().any(|b| b.is_bound(v)))
            .collect()
    }

    /// Render the graph pattern with a substitution applied
    pub fn render_pattern(&self, out: &mut String, substitution: &BindingSet) {
        for pattern in &self.patterns {
            pattern.render(out, substitution);
        }
    }
}
