//! Odoo domain expressions.
//!
//! A domain is a flat prefix-notation boolean filter: condition triples
//! combined by `&`/`|`/`!` tokens, e.g.
//! `['|', ('state', '=', 'done'), ('active', '=', False)]`. The compiler in
//! [`compile`] turns a domain into the equivalent Python boolean expression
//! used by the new-style view attributes.

pub mod compile;
pub mod literal;

use thiserror::Error;

pub use compile::{compile_attr, compile_domain, stringify_leaf};
pub use literal::{parse_mapping, parse_value, LiteralError};

/// An evaluated Python-literal value as found in `attrs` mappings.
///
/// `Opaque` is the non-literal escape hatch: field references, dotted context
/// expressions and `%(xml_id)d` placeholders are carried verbatim instead of
/// being evaluated, and render unquoted.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Opaque(String),
}

impl Value {
    /// Python-repr rendering: strings quoted, everything else verbatim.
    pub fn py_repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format!("{f:?}"),
            Value::Str(s) => quote(s),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::py_repr).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Opaque(text) => text.clone(),
        }
    }

    /// Unquoted rendering for left operands, which are field references.
    pub fn raw(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Opaque(text) => text.clone(),
            other => other.py_repr(),
        }
    }

    /// Python falsiness of the literals the `=`/`!=` shortcuts care about:
    /// `False`, `0` and the empty list. (`0 == False` in Python, which is why
    /// `0` takes the same branch.)
    pub fn is_falsy_literal(&self) -> bool {
        matches!(self, Value::Bool(false) | Value::Int(0)) || matches!(self, Value::List(v) if v.is_empty())
    }

    pub fn is_truthy_literal(&self) -> bool {
        matches!(self, Value::Bool(true) | Value::Int(1))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

fn quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

/// A single condition triple within a domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub left: Value,
    pub op: String,
    pub right: Value,
}

/// One term of a prefix-notation domain.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainTerm {
    Leaf(Leaf),
    /// `!`, arity 1
    Not,
    /// `&`, arity 2
    And,
    /// `|`, arity 2
    Or,
}

#[derive(Error, Debug)]
pub enum ExprError {
    #[error("'like' operators with wildcards cannot be translated: {pattern:?}")]
    WildcardLike { pattern: String },

    #[error("unrecognized domain term: {text}")]
    UnrecognizedTerm { text: String },

    #[error("combinator {combinator:?} is missing its operands")]
    MissingOperand { combinator: &'static str },

    #[error("domain contains no condition leaf")]
    NoLeaf,

    #[error("attribute value is neither a boolean literal nor a domain: {text}")]
    UnsupportedAttr { text: String },
}

/// Interpret an evaluated list value as a sequence of domain terms.
pub fn domain_from_values(items: &[Value]) -> Result<Vec<DomainTerm>, ExprError> {
    items
        .iter()
        .map(|item| match item {
            Value::Str(s) if s == "&" => Ok(DomainTerm::And),
            Value::Str(s) if s == "|" => Ok(DomainTerm::Or),
            Value::Str(s) if s == "!" => Ok(DomainTerm::Not),
            Value::List(triple) if triple.len() == 3 => Ok(DomainTerm::Leaf(Leaf {
                left: triple[0].clone(),
                op: triple[1].raw(),
                right: triple[2].clone(),
            })),
            other => Err(ExprError::UnrecognizedTerm {
                text: other.py_repr(),
            }),
        })
        .collect()
}

/// Insert the implicit `&` combinators so that every position's arity
/// contribution is fully accounted for.
///
/// Scans left to right with an expected-operand counter seeded at 1; each
/// leaf consumes one, each combinator contributes `arity - 1`. When a term
/// arrives with the counter exhausted (the implicit-conjunction case, as in
/// `[A, B]`), an `&` is prepended to the accumulated sequence, which keeps
/// the result in valid prefix form.
pub fn normalize(domain: Vec<DomainTerm>) -> Vec<DomainTerm> {
    if domain.len() <= 1 {
        return domain;
    }
    let mut result: Vec<DomainTerm> = Vec::with_capacity(domain.len() + 2);
    let mut expected: i64 = 1;
    for term in domain {
        if expected == 0 {
            result.insert(0, DomainTerm::And);
            expected = 1;
        }
        match &term {
            DomainTerm::Leaf(_) => expected -= 1,
            DomainTerm::Not => {}
            DomainTerm::And | DomainTerm::Or => expected += 1,
        }
        result.push(term);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaf(field: &str) -> DomainTerm {
        DomainTerm::Leaf(Leaf {
            left: Value::Str(field.to_string()),
            op: "=".to_string(),
            right: Value::Int(1),
        })
    }

    /// Net operand demand of a term: leaves produce one, `!` is neutral,
    /// binary combinators demand one more than they produce.
    fn arity_delta(term: &DomainTerm) -> i64 {
        match term {
            DomainTerm::Leaf(_) => -1,
            DomainTerm::Not => 0,
            DomainTerm::And | DomainTerm::Or => 1,
        }
    }

    fn is_balanced(domain: &[DomainTerm]) -> bool {
        let mut expected = 1i64;
        for term in domain {
            if expected == 0 {
                return false;
            }
            expected += arity_delta(term);
        }
        expected == 0
    }

    #[test]
    fn implicit_conjunction_is_prepended() {
        let normalized = normalize(vec![leaf("a"), leaf("b")]);
        assert_eq!(normalized[0], DomainTerm::And);
        assert_eq!(normalized.len(), 3);
        assert!(is_balanced(&normalized));
    }

    #[test]
    fn three_bare_leaves_need_two_conjunctions() {
        let normalized = normalize(vec![leaf("a"), leaf("b"), leaf("c")]);
        assert_eq!(normalized[0], DomainTerm::And);
        assert_eq!(normalized[1], DomainTerm::And);
        assert!(is_balanced(&normalized));
    }

    #[test]
    fn explicit_prefix_is_untouched() {
        let domain = vec![DomainTerm::Or, leaf("a"), leaf("b")];
        assert_eq!(normalize(domain.clone()), domain);
    }

    #[test]
    fn negation_followed_by_leaf_gets_conjunction() {
        let normalized = normalize(vec![DomainTerm::Not, leaf("a"), leaf("b")]);
        assert_eq!(
            normalized,
            vec![DomainTerm::And, DomainTerm::Not, leaf("a"), leaf("b")]
        );
    }

    #[test]
    fn single_term_is_returned_unchanged() {
        assert_eq!(normalize(vec![leaf("a")]), vec![leaf("a")]);
    }

    /// A balanced prefix sub-domain.
    fn balanced_domain() -> impl Strategy<Value = Vec<DomainTerm>> {
        let leaf_strategy = "[a-z]{1,8}".prop_map(|name| vec![leaf(&name)]);
        leaf_strategy.prop_recursive(4, 24, 2, |inner| {
            prop_oneof![
                inner.clone().prop_map(|mut sub| {
                    let mut out = vec![DomainTerm::Not];
                    out.append(&mut sub);
                    out
                }),
                (inner.clone(), inner.clone(), any::<bool>()).prop_map(|(mut a, mut b, and)| {
                    let mut out = vec![if and { DomainTerm::And } else { DomainTerm::Or }];
                    out.append(&mut a);
                    out.append(&mut b);
                    out
                }),
            ]
        })
    }

    proptest! {
        /// Concatenations of balanced sub-domains (Odoo's implicit-AND list
        /// form) normalize to a fully balanced prefix sequence.
        #[test]
        fn normalize_accounts_for_every_arity(parts in prop::collection::vec(balanced_domain(), 1..4)) {
            let domain: Vec<DomainTerm> = parts.into_iter().flatten().collect();
            let normalized = normalize(domain.clone());
            prop_assert!(is_balanced(&normalized));
            // Normalization only inserts combinators, never drops terms.
            let leaves = |d: &[DomainTerm]| d.iter().filter(|t| matches!(t, DomainTerm::Leaf(_))).count();
            prop_assert_eq!(leaves(&domain), leaves(&normalized));
        }
    }
}
