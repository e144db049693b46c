//! Domain-to-expression compiler.
//!
//! Reproduces the evaluation order of Odoo's own `osv/expression.py` parser:
//! normalization inserts the implicit `&` combinators, leaves are stringified
//! through the operator table, and a reverse scan reduces combinators with
//! minimal human-style parenthesization.

use super::{domain_from_values, normalize, DomainTerm, ExprError, Leaf, Value};

/// Compile one `attrs` mapping value into the new attribute expression.
///
/// Boolean scalars pass through textually; list values are interpreted as
/// domains and compiled.
pub fn compile_attr(value: &Value) -> Result<String, ExprError> {
    match value {
        Value::Bool(_) | Value::Int(0) | Value::Int(1) => Ok(value.py_repr()),
        Value::Str(s) if matches!(s.as_str(), "True" | "False" | "1" | "0") => Ok(s.clone()),
        Value::List(items) => {
            let domain = domain_from_values(items)?;
            compile_domain(&domain)
        }
        other => Err(ExprError::UnsupportedAttr {
            text: other.py_repr(),
        }),
    }
}

/// Compile a prefix-notation domain into a Python boolean expression.
pub fn compile_domain(terms: &[DomainTerm]) -> Result<String, ExprError> {
    // Parenthesization cutoff, computed on the input sequence: the largest
    // reverse-scan index holding a term other than `|`/`!`. Combinators past
    // it are trailing top-level ones and need no grouping.
    let cutoff = terms
        .iter()
        .rev()
        .enumerate()
        .filter(|(_, term)| !matches!(term, DomainTerm::Or | DomainTerm::Not))
        .map(|(index, _)| index)
        .max()
        .ok_or(ExprError::NoLeaf)?;

    let normalized = normalize(terms.to_vec());

    let mut stack: Vec<String> = Vec::new();
    for (index, term) in normalized.iter().rev().enumerate() {
        match term {
            DomainTerm::Leaf(leaf) => stack.push(stringify_leaf(leaf)?),
            DomainTerm::Not => {
                let operand = stack
                    .pop()
                    .ok_or(ExprError::MissingOperand { combinator: "!" })?;
                stack.push(format!("(not ({operand}))"));
            }
            DomainTerm::And | DomainTerm::Or => {
                let word = if matches!(term, DomainTerm::And) {
                    "and"
                } else {
                    "or"
                };
                let left = stack
                    .pop()
                    .ok_or(ExprError::MissingOperand { combinator: "&/|" })?;
                match stack.pop() {
                    Some(right) => {
                        let joined = if index > cutoff {
                            format!("{left} {word} {right}")
                        } else {
                            format!("({left} {word} {right})")
                        };
                        stack.push(joined);
                    }
                    // A single dangling combinator: the element also carries
                    // a states list, appended later as the missing operand.
                    None => stack.push(format!("{left} {word}")),
                }
            }
        }
    }

    stack.into_iter().next().ok_or(ExprError::NoLeaf)
}

/// Stringify one condition triple.
///
/// The left operand is a field reference and is never quoted; string right
/// operands are quoted, everything else renders verbatim.
pub fn stringify_leaf(leaf: &Leaf) -> Result<String, ExprError> {
    let left = leaf.left.raw();
    let op = leaf.op.as_str();
    let right = &leaf.right;

    if op == "=?" {
        let r = right.py_repr();
        return Ok(format!("({r} in [None, False] or {left} == {r})"));
    }

    let mut operator = op.to_string();
    let mut swap = false;
    let mut case_insensitive = false;

    match op {
        "=" => {
            if right.is_falsy_literal() {
                return Ok(format!("not {left}"));
            }
            if right.is_truthy_literal() {
                return Ok(left);
            }
            operator = "==".to_string();
        }
        "!=" => {
            if right.is_falsy_literal() {
                return Ok(left);
            }
            if right.is_truthy_literal() {
                return Ok(format!("not {left}"));
            }
        }
        _ if op.contains("like") => {
            case_insensitive = op.contains("ilike");
            if let Some(s) = right.as_str() {
                // Wildcards have no equivalent after conversion; refusing
                // beats emitting an expression that behaves differently.
                if s.contains('%') || s.contains('_') {
                    return Err(ExprError::WildcardLike {
                        pattern: s.to_string(),
                    });
                }
            }
            if op == "=like" || op == "=ilike" {
                operator = "==".to_string();
            } else {
                operator = if op.contains("not") { "not in" } else { "in" }.to_string();
                swap = true;
            }
        }
        _ => {}
    }

    let mut lhs = left;
    let mut rhs = right.py_repr();
    if swap {
        std::mem::swap(&mut lhs, &mut rhs);
    }
    if case_insensitive {
        Ok(format!("{lhs}.lower() {operator} {rhs}.lower()"))
    } else {
        Ok(format!("{lhs} {operator} {rhs}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(left: &str, op: &str, right: Value) -> Leaf {
        Leaf {
            left: Value::Str(left.to_string()),
            op: op.to_string(),
            right,
        }
    }

    fn term(left: &str, op: &str, right: Value) -> DomainTerm {
        DomainTerm::Leaf(leaf(left, op, right))
    }

    #[test]
    fn equality_with_false_becomes_negation() {
        let s = stringify_leaf(&leaf("a", "=", Value::Bool(false))).unwrap();
        assert_eq!(s, "not a");
    }

    #[test]
    fn equality_with_true_is_the_field_itself() {
        let s = stringify_leaf(&leaf("a", "=", Value::Bool(true))).unwrap();
        assert_eq!(s, "a");
    }

    #[test]
    fn inequality_with_false_is_the_field_itself() {
        let s = stringify_leaf(&leaf("a", "!=", Value::Bool(false))).unwrap();
        assert_eq!(s, "a");
    }

    #[test]
    fn equality_with_string_is_quoted() {
        let s = stringify_leaf(&leaf("a", "=", Value::Str("x".to_string()))).unwrap();
        assert_eq!(s, "a == 'x'");
    }

    #[test]
    fn equality_with_empty_list_becomes_negation() {
        let s = stringify_leaf(&leaf("a", "=", Value::List(vec![]))).unwrap();
        assert_eq!(s, "not a");
    }

    #[test]
    fn zero_and_one_take_the_boolean_branches() {
        assert_eq!(
            stringify_leaf(&leaf("a", "=", Value::Int(0))).unwrap(),
            "not a"
        );
        assert_eq!(stringify_leaf(&leaf("a", "=", Value::Int(1))).unwrap(), "a");
    }

    #[test]
    fn maybe_equal_operator() {
        let s = stringify_leaf(&leaf("a", "=?", Value::Str("x".to_string()))).unwrap();
        assert_eq!(s, "('x' in [None, False] or a == 'x')");
    }

    #[test]
    fn like_swaps_into_membership() {
        let s = stringify_leaf(&leaf("name", "like", Value::Str("abc".to_string()))).unwrap();
        assert_eq!(s, "'abc' in name");
    }

    #[test]
    fn not_ilike_swaps_and_casefolds() {
        let s = stringify_leaf(&leaf("name", "not ilike", Value::Str("abc".to_string()))).unwrap();
        assert_eq!(s, "'abc'.lower() not in name.lower()");
    }

    #[test]
    fn eq_like_is_plain_equality() {
        let s = stringify_leaf(&leaf("name", "=like", Value::Str("abc".to_string()))).unwrap();
        assert_eq!(s, "name == 'abc'");
    }

    #[test]
    fn like_with_wildcard_is_rejected() {
        let result = stringify_leaf(&leaf("name", "like", Value::Str("ab%".to_string())));
        assert!(matches!(result, Err(ExprError::WildcardLike { .. })));
        let result = stringify_leaf(&leaf("name", "ilike", Value::Str("a_c".to_string())));
        assert!(matches!(result, Err(ExprError::WildcardLike { .. })));
    }

    #[test]
    fn comparison_operators_pass_through() {
        let s = stringify_leaf(&leaf("qty", ">=", Value::Int(5))).unwrap();
        assert_eq!(s, "qty >= 5");
    }

    #[test]
    fn membership_against_list() {
        let s = stringify_leaf(&leaf(
            "state",
            "in",
            Value::List(vec![
                Value::Str("draft".to_string()),
                Value::Str("sent".to_string()),
            ]),
        ))
        .unwrap();
        assert_eq!(s, "state in ['draft', 'sent']");
    }

    #[test]
    fn opaque_right_operand_is_never_quoted() {
        let s = stringify_leaf(&leaf(
            "company_id",
            "=",
            Value::Opaque("parent.company_id".to_string()),
        ))
        .unwrap();
        assert_eq!(s, "company_id == parent.company_id");
    }

    #[test]
    fn single_leaf_domain() {
        let s = compile_domain(&[term("state", "=", Value::Str("done".to_string()))]).unwrap();
        assert_eq!(s, "state == 'done'");
    }

    #[test]
    fn explicit_conjunction_is_parenthesized() {
        let s = compile_domain(&[
            DomainTerm::And,
            term("a", "=", Value::Int(1)),
            term("b", "=", Value::Int(2)),
        ])
        .unwrap();
        assert_eq!(s, "(a == 1 and b == 2)");
    }

    #[test]
    fn leading_disjunction_is_not_parenthesized() {
        let s = compile_domain(&[
            DomainTerm::Or,
            term("a", "=", Value::Int(1)),
            term("b", "=", Value::Int(2)),
        ])
        .unwrap();
        assert_eq!(s, "a == 1 or b == 2");
    }

    #[test]
    fn chained_disjunctions_stay_flat() {
        let s = compile_domain(&[
            DomainTerm::Or,
            DomainTerm::Or,
            term("a", "=", Value::Int(1)),
            term("b", "=", Value::Int(2)),
            term("c", "=", Value::Int(3)),
        ])
        .unwrap();
        assert_eq!(s, "a == 1 or b == 2 or c == 3");
    }

    #[test]
    fn implicit_conjunction_stays_flat() {
        let s = compile_domain(&[
            term("a", "=", Value::Int(1)),
            term("b", "=", Value::Int(2)),
        ])
        .unwrap();
        assert_eq!(s, "a == 1 and b == 2");
    }

    #[test]
    fn trailing_disjunction_under_implicit_and_is_grouped() {
        let s = compile_domain(&[
            term("a", "=", Value::Int(1)),
            DomainTerm::Or,
            term("b", "=", Value::Int(2)),
            term("c", "=", Value::Int(3)),
        ])
        .unwrap();
        assert_eq!(s, "a == 1 and (b == 2 or c == 3)");
    }

    #[test]
    fn negation_wraps_its_operand() {
        let s = compile_domain(&[
            DomainTerm::Not,
            term("state", "=", Value::Str("done".to_string())),
        ])
        .unwrap();
        assert_eq!(s, "(not (state == 'done'))");
    }

    #[test]
    fn dangling_combinator_degrades_to_trailing_connective() {
        // A lone `|` with one leaf: the element's states list supplies the
        // other operand during the merge.
        let s = compile_domain(&[DomainTerm::Or, term("a", "=", Value::Int(1))]).unwrap();
        assert_eq!(s, "a == 1 or");
    }

    #[test]
    fn domain_without_leaves_is_an_error() {
        let result = compile_domain(&[DomainTerm::Or, DomainTerm::Not]);
        assert!(matches!(result, Err(ExprError::NoLeaf)));
    }

    #[test]
    fn attr_scalars_pass_through() {
        assert_eq!(compile_attr(&Value::Bool(true)).unwrap(), "True");
        assert_eq!(compile_attr(&Value::Bool(false)).unwrap(), "False");
        assert_eq!(compile_attr(&Value::Int(1)).unwrap(), "1");
        assert_eq!(
            compile_attr(&Value::Str("False".to_string())).unwrap(),
            "False"
        );
    }

    #[test]
    fn attr_domain_list_is_compiled() {
        let value = Value::List(vec![Value::List(vec![
            Value::Str("state".to_string()),
            Value::Str("=".to_string()),
            Value::Str("done".to_string()),
        ])]);
        assert_eq!(compile_attr(&value).unwrap(), "state == 'done'");
    }

    #[test]
    fn attr_arbitrary_string_is_rejected() {
        let result = compile_attr(&Value::Str("whatever".to_string()));
        assert!(matches!(result, Err(ExprError::UnsupportedAttr { .. })));
    }
}
