//! Condition compilation (spec §4.7): parsing a restricted boolean
//! expression subset from the source AST and emitting it as a natural-
//! prose line in which references render as `jq` sub-expressions.

use crate::context::TransformContext;
use crate::error::CompileError;

/// A parsed condition expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// A reference to a runtime variable, possibly with a dotted property
    /// path (e.g. `ctx.error` -> root `ctx`, path `["error"]`).
    Ref {
        /// Shell variable name backing the root identifier.
        var_name: String,
        /// Dotted property path, empty for a bare variable reference.
        path: Vec<String>,
    },
    /// A boolean literal.
    Bool(bool),
    /// A string literal.
    Str(String),
    /// A numeric literal, kept as source text.
    Num(String),
    /// Logical negation.
    Not(Box<Condition>),
    /// Logical conjunction.
    And(Box<Condition>, Box<Condition>),
    /// Logical disjunction.
    Or(Box<Condition>, Box<Condition>),
    /// Comparison operators.
    Compare(CompareOp, Box<Condition>, Box<Condition>),
}

/// The comparison operators accepted in a condition (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `===`
    Eq,
    /// `!==`
    Neq,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
}

impl CompareOp {
    fn as_prose(self) -> &'static str {
        match self {
            CompareOp::Eq => "equals",
            CompareOp::Neq => "does not equal",
            CompareOp::Gt => "is greater than",
            CompareOp::Gte => "is at least",
            CompareOp::Lt => "is less than",
            CompareOp::Lte => "is at most",
        }
    }

    /// Binding precedence used to decide when output needs parentheses to
    /// preserve the original grouping. Comparisons bind tighter than `and`,
    /// which binds tighter than `or`; `not` binds tightest of all.
    const PRECEDENCE: u8 = 3;
}

impl Condition {
    fn precedence(&self) -> u8 {
        match self {
            Condition::Ref { .. } | Condition::Bool(_) | Condition::Str(_) | Condition::Num(_) => 4,
            Condition::Not(_) => 4,
            Condition::Compare(..) => CompareOp::PRECEDENCE,
            Condition::And(..) => 2,
            Condition::Or(..) => 1,
        }
    }

    /// Emits this condition tree as the natural-prose fragment used after
    /// `**If ` / before `:**`. References render as `jq` sub-expressions.
    pub fn emit_prose(&self) -> String {
        self.emit_inner(0)
    }

    fn emit_inner(&self, parent_precedence: u8) -> String {
        let needs_parens = self.precedence() < parent_precedence;
        let rendered = match self {
            Condition::Ref { var_name, path } => render_ref(var_name, path),
            Condition::Bool(b) => b.to_string(),
            Condition::Str(s) => format!("\"{s}\""),
            Condition::Num(n) => n.clone(),
            Condition::Not(inner) => format!("not {}", inner.emit_inner(self.precedence())),
            Condition::And(lhs, rhs) => format!(
                "{} and {}",
                lhs.emit_inner(self.precedence()),
                rhs.emit_inner(self.precedence())
            ),
            Condition::Or(lhs, rhs) => format!(
                "{} or {}",
                lhs.emit_inner(self.precedence()),
                rhs.emit_inner(self.precedence())
            ),
            Condition::Compare(op, lhs, rhs) => format!(
                "{} {} {}",
                lhs.emit_inner(CompareOp::PRECEDENCE),
                op.as_prose(),
                rhs.emit_inner(CompareOp::PRECEDENCE)
            ),
        };
        if needs_parens {
            format!("({rendered})")
        } else {
            rendered
        }
    }
}

/// Renders a reference as a `jq` sub-expression: `$(echo "$NAME" | jq -r '.a.b')`,
/// or bare `$NAME` when there is no property path.
fn render_ref(var_name: &str, path: &[String]) -> String {
    if path.is_empty() {
        format!("${var_name}")
    } else {
        let jq_path = path
            .iter()
            .map(|segment| format!(".{segment}"))
            .collect::<String>();
        format!("$(echo \"${var_name}\" | jq -r '{jq_path}')")
    }
}

/// Minimal tokenized view of a condition source expression, produced by the
/// transformer from the AST view's expression nodes (see
/// [`crate::ast_view`]). Conditions are only ever built from a small,
/// already-structured expression shape (logical/comparison operators over
/// literals and identifier/member chains) so this module works over an
/// already-parsed [`ExprNode`] tree rather than re-tokenizing source text.
#[derive(Debug, Clone)]
pub enum ExprNode {
    /// `!expr`
    Not(Box<ExprNode>),
    /// `lhs && rhs`
    And(Box<ExprNode>, Box<ExprNode>),
    /// `lhs || rhs`
    Or(Box<ExprNode>, Box<ExprNode>),
    /// A binary comparison.
    Binary(&'static str, Box<ExprNode>, Box<ExprNode>),
    /// A parenthesized sub-expression.
    Paren(Box<ExprNode>),
    /// `true` / `false`.
    Bool(bool),
    /// A string literal.
    Str(String),
    /// A numeric literal.
    Num(String),
    /// An identifier or member-access chain, e.g. `ctx.error` as
    /// `["ctx", "error"]`.
    Ident(Vec<String>),
}

/// Parses an already-structured expression node into a [`Condition`] tree,
/// resolving the root identifier of any reference against
/// `ctx.script_vars` (spec §4.7: "unknown roots are errors").
pub fn parse_condition(
    expr: &ExprNode,
    ctx: &TransformContext,
    line: u32,
) -> Result<Condition, CompileError> {
    match expr {
        ExprNode::Paren(inner) => parse_condition(inner, ctx, line),
        ExprNode::Not(inner) => Ok(Condition::Not(Box::new(parse_condition(inner, ctx, line)?))),
        ExprNode::And(lhs, rhs) => Ok(Condition::And(
            Box::new(parse_condition(lhs, ctx, line)?),
            Box::new(parse_condition(rhs, ctx, line)?),
        )),
        ExprNode::Or(lhs, rhs) => Ok(Condition::Or(
            Box::new(parse_condition(lhs, ctx, line)?),
            Box::new(parse_condition(rhs, ctx, line)?),
        )),
        ExprNode::Binary(op, lhs, rhs) => {
            let op = match *op {
                "===" => CompareOp::Eq,
                "!==" => CompareOp::Neq,
                ">" => CompareOp::Gt,
                ">=" => CompareOp::Gte,
                "<" => CompareOp::Lt,
                "<=" => CompareOp::Lte,
                other => {
                    return Err(ctx.errors.transform(
                        line,
                        "If",
                        format!("unsupported comparison operator '{other}'"),
                    ))
                }
            };
            Ok(Condition::Compare(
                op,
                Box::new(parse_condition(lhs, ctx, line)?),
                Box::new(parse_condition(rhs, ctx, line)?),
            ))
        }
        ExprNode::Bool(b) => Ok(Condition::Bool(*b)),
        ExprNode::Str(s) => Ok(Condition::Str(s.clone())),
        ExprNode::Num(n) => Ok(Condition::Num(n.clone())),
        ExprNode::Ident(chain) => {
            let root = chain.first().ok_or_else(|| {
                ctx.errors
                    .transform(line, "If", "empty identifier chain in condition")
            })?;
            let var_name = ctx.resolve_script_var(root).ok_or_else(|| {
                ctx.errors
                    .resolution(line, root.clone(), "unknown identifier in condition")
            })?;
            Ok(Condition::Ref {
                var_name,
                path: chain[1..].to_vec(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TransformContext;

    fn ctx_with(root: &str, var_name: &str) -> TransformContext {
        let mut ctx = TransformContext::new_for_test();
        ctx.declare_script_var(root, var_name);
        ctx
    }

    #[test]
    fn emits_simple_ref() {
        let ctx = ctx_with("ctx", "CTX");
        let expr = ExprNode::Ident(vec!["ctx".into(), "error".into()]);
        let cond = parse_condition(&expr, &ctx, 1).unwrap();
        assert_eq!(cond.emit_prose(), "$(echo \"$CTX\" | jq -r '.error')");
    }

    #[test]
    fn emits_bare_var_without_path() {
        let ctx = ctx_with("ctx", "CTX");
        let expr = ExprNode::Ident(vec!["ctx".into()]);
        let cond = parse_condition(&expr, &ctx, 1).unwrap();
        assert_eq!(cond.emit_prose(), "$CTX");
    }

    #[test]
    fn unknown_root_is_error() {
        let ctx = TransformContext::new_for_test();
        let expr = ExprNode::Ident(vec!["missing".into()]);
        assert!(parse_condition(&expr, &ctx, 1).is_err());
    }

    #[test]
    fn and_or_precedence_adds_parens_only_when_needed() {
        let ctx = ctx_with("ctx", "CTX");
        // (ctx.a === 1) && (ctx.b === 2)
        let expr = ExprNode::And(
            Box::new(ExprNode::Binary(
                "===",
                Box::new(ExprNode::Ident(vec!["ctx".into(), "a".into()])),
                Box::new(ExprNode::Num("1".into())),
            )),
            Box::new(ExprNode::Binary(
                "===",
                Box::new(ExprNode::Ident(vec!["ctx".into(), "b".into()])),
                Box::new(ExprNode::Num("2".into())),
            )),
        );
        let cond = parse_condition(&expr, &ctx, 1).unwrap();
        assert_eq!(
            cond.emit_prose(),
            "$(echo \"$CTX\" | jq -r '.a') equals 1 and $(echo \"$CTX\" | jq -r '.b') equals 2"
        );
    }

    #[test]
    fn or_inside_and_gets_parenthesized() {
        let ctx = ctx_with("ctx", "CTX");
        // a || b, then the result used inside an And -- must be parenthesized.
        let or_expr = Condition::Or(
            Box::new(Condition::Bool(true)),
            Box::new(Condition::Bool(false)),
        );
        let and_expr = Condition::And(Box::new(or_expr), Box::new(Condition::Bool(true)));
        assert_eq!(and_expr.emit_prose(), "(true or false) and true");
    }
}
