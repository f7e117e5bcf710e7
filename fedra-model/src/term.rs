//! RDF term type and SPARQL source-text rendering
//!
//! Terms are Arc-backed and cheap to clone: binding sets flow through
//! channels and merge operations constantly, so cloning must not copy
//! string data.

use std::fmt;
use std::sync::Arc;

/// Dummy IRI substituted for blank nodes when rendering a remote request.
///
/// Blank node identifiers are scoped to one result set and cannot be
/// transported in a SPARQL request; a fresh term with this IRI matches
/// nothing at the remote endpoint, which is the intended behavior.
pub const BNODE_PLACEHOLDER_IRI: &str = "urn:fedra:bnode";

/// A typed RDF term
///
/// # Invariants
///
/// - `Literal` carries at most one of `lang` / `datatype`; a language-tagged
///   literal implicitly has datatype `rdf:langString` and never renders an
///   explicit datatype
/// - Equality is structural (same variant, same components)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RdfTerm {
    /// IRI reference
    Iri(Arc<str>),
    /// Blank node with result-set-scoped identifier
    BNode(Arc<str>),
    /// Literal with lexical form and optional language tag or datatype IRI
    Literal {
        lexical: Arc<str>,
        lang: Option<Arc<str>>,
        datatype: Option<Arc<str>>,
    },
}

impl RdfTerm {
    /// Create an IRI term
    pub fn iri(value: impl Into<Arc<str>>) -> Self {
        RdfTerm::Iri(value.into())
    }

    /// Create a blank node term
    pub fn bnode(id: impl Into<Arc<str>>) -> Self {
        RdfTerm::BNode(id.into())
    }

    /// Create a plain (untyped) literal
    pub fn literal(lexical: impl Into<Arc<str>>) -> Self {
        RdfTerm::Literal {
            lexical: lexical.into(),
            lang: None,
            datatype: None,
        }
    }

    /// Create a language-tagged literal
    pub fn lang_literal(lexical: impl Into<Arc<str>>, lang: impl Into<Arc<str>>) -> Self {
        RdfTerm::Literal {
            lexical: lexical.into(),
            lang: Some(lang.into()),
            datatype: None,
        }
    }

    /// Create a datatyped literal
    pub fn typed_literal(lexical: impl Into<Arc<str>>, datatype: impl Into<Arc<str>>) -> Self {
        RdfTerm::Literal {
            lexical: lexical.into(),
            lang: None,
            datatype: Some(datatype.into()),
        }
    }

    /// Lexical form for literals, identifier for IRIs and blank nodes
    pub fn lexical(&self) -> &str {
        match self {
            RdfTerm::Iri(iri) => iri,
            RdfTerm::BNode(id) => id,
            RdfTerm::Literal { lexical, .. } => lexical,
        }
    }

    /// True if this term is a blank node
    pub fn is_bnode(&self) -> bool {
        matches!(self, RdfTerm::BNode(_))
    }

    /// Render this term as SPARQL source text for embedding in a request
    ///
    /// Rules (preserved byte-for-byte since the output is spliced into a
    /// remote request string):
    ///
    /// - IRI: `<iri>`
    /// - Literal: `'''lexical'''` with `"` escaped as `\"`, followed by
    ///   `@lang` or `^^<datatype>` when present
    /// - Blank node: rendered as [`BNODE_PLACEHOLDER_IRI`] (matches nothing
    ///   remotely; callers log this substitution)
    pub fn render_sparql(&self, out: &mut String) {
        match self {
            RdfTerm::Iri(iri) => {
                out.push('<');
                out.push_str(iri);
                out.push('>');
            }
            RdfTerm::BNode(_) => {
                out.push('<');
                out.push_str(BNODE_PLACEHOLDER_IRI);
                out.push('>');
            }
            RdfTerm::Literal {
                lexical,
                lang,
                datatype,
            } => {
                out.push_str("'''");
                if lexical.contains('"') {
                    out.push_str(&lexical.replace('"', "\\\""));
                } else {
                    out.push_str(lexical);
                }
                out.push_str("'''");
                if let Some(lang) = lang {
                    out.push('@');
                    out.push_str(lang);
                } else if let Some(dt) = datatype {
                    out.push_str("^^<");
                    out.push_str(dt);
                    out.push('>');
                }
            }
        }
    }

    /// Convenience wrapper around [`render_sparql`](Self::render_sparql)
    pub fn to_sparql(&self) -> String {
        let mut s = String::new();
        self.render_sparql(&mut s);
        s
    }
}

impl fmt::Display for RdfTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RdfTerm::BNode(id) => write!(f, "_:{id}"),
            other => write!(f, "{}", other.to_sparql()),
        }
    }
}
