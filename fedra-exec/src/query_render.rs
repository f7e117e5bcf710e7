//! Remote request construction
//!
//! Builds the SPARQL source text sent to endpoints. The batched form packs
//! a whole block of upstream bindings into one request via a VALUES clause
//! carrying a synthetic row-index variable:
//!
//! ```sparql
//! SELECT ?v ?__index WHERE {
//!    VALUES (?x ?__index) {
//!      (<http://s1> "0")
//!      (<http://s2> "1")
//!    }
//!    ?x <http://p> ?v .
//! }
//! ```
//!
//! Each result row echoes `?__index`, which correlates it back to the
//! block position that produced it.

use crate::operand::Operand;
use fedra_model::{BindingSet, RdfTerm};
use tracing::debug;

/// Synthetic row-index variable injected into batched requests.
///
/// Known limitation: the name is a fixed literal. A user query that
/// declares a real `?__index` variable has undefined behavior on the
/// batched path; collision-avoiding name generation would change
/// observable query semantics and is deliberately not attempted here.
pub const ROW_INDEX_VAR: &str = "__index";

/// Build the VALUES-batched bound-join request for one block
///
/// Projects the operand's free variables plus [`ROW_INDEX_VAR`]. The
/// VALUES clause binds each relevant name and the row index; entries not
/// binding a relevant name contribute `UNDEF`. Row indices are rendered as
/// quoted decimal strings so they survive round-tripping through endpoints
/// that are careless with literal datatypes.
pub fn select_bound_join_values(
    operand: &Operand,
    block: &[BindingSet],
    relevant: &[std::sync::Arc<str>],
) -> String {
    let mut out = String::with_capacity(256 + block.len() * 32);
    out.push_str("SELECT");
    for var in operand.free_vars() {
        out.push_str(" ?");
        out.push_str(&var);
    }
    out.push_str(" ?");
    out.push_str(ROW_INDEX_VAR);
    out.push_str(" WHERE { VALUES (");
    for var in relevant {
        out.push('?');
        out.push_str(var);
        out.push(' ');
    }
    out.push('?');
    out.push_str(ROW_INDEX_VAR);
    out.push_str(") { ");
    for (index, binding) in block.iter().enumerate() {
        out.push('(');
        for var in relevant {
            match binding.get(var) {
                Some(term) => {
                    render_term(&mut out, term);
                    out.push(' ');
                }
                None => out.push_str("UNDEF "),
            }
        }
        out.push('"');
        out.push_str(&index.to_string());
        out.push_str("\") ");
    }
    out.push_str("} ");
    operand.render_pattern(&mut out, &BindingSet::new());
    out.push('}');
    out
}

/// Build a plain bound request for a single upstream binding
///
/// The binding's values are substituted directly into the pattern; only
/// the still-unbound variables are projected. Structurally simpler than
/// the VALUES form and used for single-entry blocks.
pub fn select_bound(operand: &Operand, binding: &BindingSet) -> String {
    let mut out = String::with_capacity(128);
    out.push_str("SELECT");
    for var in operand.free_vars_after(binding) {
        out.push_str(" ?");
        out.push_str(&var);
    }
    out.push_str(" WHERE { ");
    operand.render_pattern(&mut out, binding);
    out.push('}');
    out
}

/// Build the unbound request (no upstream values substituted)
///
/// Used once per block on the cross-product path.
pub fn select_unbound(operand: &Operand) -> String {
    select_bound(operand, &BindingSet::new())
}

/// Build an ASK request with a binding substituted
///
/// Used when the substitution leaves no free variable: the remote side
/// only needs to confirm the pattern's existence.
pub fn ask_bound(operand: &Operand, binding: &BindingSet) -> String {
    let mut out = String::with_capacity(128);
    out.push_str("ASK { ");
    operand.render_pattern(&mut out, binding);
    out.push('}');
    out
}

fn render_term(out: &mut String, term: &RdfTerm) {
    if term.is_bnode() {
        // BNode identifiers cannot be transported in a request; the
        // placeholder IRI matches nothing remotely.
        debug!(bnode = term.lexical(), "blank node in VALUES clause replaced with placeholder IRI");
    }
    term.render_sparql(out);
}
