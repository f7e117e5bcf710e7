//! Data model for the FEDRA federation engine
//!
//! This crate contains the value types shared by the execution core and by
//! endpoint implementations:
//!
//! - [`RdfTerm`]: a typed RDF term (IRI, blank node, literal) with SPARQL
//!   source-text rendering suitable for embedding in a remote request
//! - [`BindingSet`]: an immutable mapping from variable name to term,
//!   cheap to clone, with strict and priority merge operations

pub mod binding;
pub mod term;

pub use binding::{BindingSet, MergeConflict};
pub use term::RdfTerm;
