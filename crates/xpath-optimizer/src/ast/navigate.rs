//! Structural queries over expressions: children, absoluteness, root replacement.

use super::{Axis, BinaryOp, Expr, FlworClause, FunCall, SortKey};
use crate::model::ValueType;

fn builtin_return_type(name: &str) -> ValueType {
    match name {
        "count" | "position" | "last" | "string-length" => ValueType::Integer,
        "exists" | "empty" | "not" | "boolean" | "true" | "false" | "contains" | "starts-with" | "ends-with"
        | "matches" | "deep-equal" => ValueType::Boolean,
        "string" | "concat" | "string-join" | "substring" | "substring-before" | "substring-after" | "name"
        | "local-name" | "normalize-space" | "upper-case" | "lower-case" | "translate" => ValueType::String,
        "number" => ValueType::Double,
        "root" | "doc" | "collection" => ValueType::Document,
        "data" | "sum" | "avg" | "min" | "max" => ValueType::Atomic,
        _ => ValueType::Value,
    }
}

impl Expr {
    /// Direct children in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Self::Root | Self::Dot | Self::Literal(_) | Self::Variable(_) | Self::Step(_) | Self::Search(_) => Vec::new(),
            Self::Path { lhs, rhs } => vec![&**lhs, &**rhs],
            Self::Predicate { base, filter } => vec![&**base, &**filter],
            Self::FunctionCall(call) => call.args.iter().collect(),
            Self::Binary { left, right, .. } => vec![&**left, &**right],
            Self::Sequence(items) | Self::SetOperation { operands: items, .. } => items.iter().collect(),
            Self::Subsequence { base, start, length } => {
                let mut out = vec![&**base, &**start];
                out.extend(length.as_deref());
                out
            }
            Self::Flwor(flwor) => {
                let mut out = Vec::with_capacity(flwor.clauses.len() + 1);
                for clause in &flwor.clauses {
                    match clause {
                        FlworClause::For { seq, .. } | FlworClause::Let { seq, .. } | FlworClause::Where(seq) => {
                            out.push(seq);
                        }
                        FlworClause::OrderBy(keys) => out.extend(keys.iter().map(|k| &k.key)),
                    }
                }
                out.push(&flwor.return_expr);
                out
            }
            Self::UnaryMinus(inner) | Self::DocumentSort(inner) => vec![&**inner],
        }
    }

    /// Rebuild this node with every direct child passed through `f`.
    pub fn map_children<E, F>(self, f: &mut F) -> Result<Expr, E>
    where
        F: FnMut(Expr) -> Result<Expr, E>,
    {
        let bx = |e: Box<Expr>, f: &mut F| f(*e).map(Box::new);
        Ok(match self {
            leaf @ (Self::Root | Self::Dot | Self::Literal(_) | Self::Variable(_) | Self::Step(_) | Self::Search(_)) => {
                leaf
            }
            Self::Path { lhs, rhs } => Self::Path { lhs: bx(lhs, f)?, rhs: bx(rhs, f)? },
            Self::Predicate { base, filter } => Self::Predicate { base: bx(base, f)?, filter: bx(filter, f)? },
            Self::FunctionCall(FunCall { name, args }) => {
                Self::FunctionCall(FunCall { name, args: args.into_iter().map(&mut *f).collect::<Result<_, _>>()? })
            }
            Self::Binary { left, op, right } => Self::Binary { left: bx(left, f)?, op, right: bx(right, f)? },
            Self::Sequence(items) => Self::Sequence(items.into_iter().map(&mut *f).collect::<Result<_, _>>()?),
            Self::SetOperation { op, operands } => {
                Self::SetOperation { op, operands: operands.into_iter().map(&mut *f).collect::<Result<_, _>>()? }
            }
            Self::Subsequence { base, start, length } => Self::Subsequence {
                base: bx(base, f)?,
                start: bx(start, f)?,
                length: match length {
                    Some(l) => Some(bx(l, f)?),
                    None => None,
                },
            },
            Self::Flwor(mut flwor) => {
                let mut clauses = Vec::with_capacity(flwor.clauses.len());
                for clause in flwor.clauses {
                    clauses.push(match clause {
                        FlworClause::For { var, seq } => FlworClause::For { var, seq: f(seq)? },
                        FlworClause::Let { var, seq } => FlworClause::Let { var, seq: f(seq)? },
                        FlworClause::Where(e) => FlworClause::Where(f(e)?),
                        FlworClause::OrderBy(keys) => FlworClause::OrderBy(
                            keys.into_iter()
                                .map(|k| Ok(SortKey { key: f(k.key)?, ..k }))
                                .collect::<Result<_, E>>()?,
                        ),
                    });
                }
                flwor.clauses = clauses;
                flwor.return_expr = bx(flwor.return_expr, f)?;
                Self::Flwor(flwor)
            }
            Self::UnaryMinus(inner) => Self::UnaryMinus(bx(inner, f)?),
            Self::DocumentSort(inner) => Self::DocumentSort(bx(inner, f)?),
        })
    }

    /// Anchored at a document root rather than at the context item.
    pub fn is_absolute(&self) -> bool {
        match self {
            Self::Root => true,
            Self::Path { lhs, .. } => lhs.is_absolute(),
            Self::Predicate { base, .. } => base.is_absolute(),
            _ => false,
        }
    }

    /// The expression with its leading root removed, or `None` when nothing follows the root.
    pub fn tail(&self) -> Option<Expr> {
        match self {
            Self::Path { lhs, rhs } if matches!(**lhs, Self::Root) => Some((**rhs).clone()),
            Self::Path { lhs, rhs } => lhs.tail().map(|t| Self::path(t, (**rhs).clone())),
            Self::Predicate { base, filter } => base.tail().map(|t| Self::predicate(t, (**filter).clone())),
            _ => None,
        }
    }

    /// Substitute `root` for the leading root of an absolute expression. Relative expressions
    /// are returned unchanged.
    pub fn replace_root(self, root: Expr) -> Expr {
        match self {
            Self::Root => root,
            Self::Path { lhs, rhs } if lhs.is_absolute() => Self::Path { lhs: Box::new(lhs.replace_root(root)), rhs },
            Self::Predicate { base, filter } if base.is_absolute() => {
                Self::Predicate { base: Box::new(base.replace_root(root)), filter }
            }
            other => other,
        }
    }

    /// The rightmost step that supplies the context for what follows.
    pub fn last_context_step(&self) -> &Expr {
        match self {
            Self::Path { rhs, .. } => rhs.last_context_step(),
            Self::Predicate { base, .. } => base.last_context_step(),
            other => other,
        }
    }

    /// Static result type.
    pub fn result_type(&self) -> ValueType {
        match self {
            Self::Root => ValueType::Document,
            Self::Dot | Self::Variable(_) => ValueType::Value,
            Self::Literal(l) => l.value_type(),
            Self::Step(step) => match step.axis {
                Axis::SelfAxis if step.test.is_loosely_typed() => ValueType::Node,
                _ => step.test.kind(),
            },
            Self::Path { rhs, .. } => rhs.result_type(),
            Self::Predicate { base, .. } | Self::Subsequence { base, .. } => base.result_type(),
            Self::FunctionCall(call) => call.builtin_name().map_or(ValueType::Value, builtin_return_type),
            Self::Binary { left, op, right } => match op {
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::IDiv | BinaryOp::Mod => {
                    ValueType::Atomic
                }
                BinaryOp::Union | BinaryOp::Intersect | BinaryOp::Except => {
                    left.result_type().promote(right.result_type())
                }
                _ => ValueType::Boolean,
            },
            Self::Sequence(items) | Self::SetOperation { operands: items, .. } => {
                items.iter().fold(ValueType::Empty, |acc, e| acc.promote(e.result_type()))
            }
            Self::Flwor(flwor) => flwor.return_expr.result_type(),
            Self::UnaryMinus(_) => ValueType::Atomic,
            Self::DocumentSort(inner) => inner.result_type(),
            Self::Search(call) => call.result_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_and_replace_root() {
        let e = Expr::root_descendant("foo").slash(Expr::child("bar"));
        assert!(e.is_absolute());
        assert_eq!(e.tail(), Some(Expr::path(Expr::descendant("foo"), Expr::child("bar"))));
        let replaced = e.replace_root(Expr::Dot);
        assert_eq!(replaced, Expr::path(Expr::path(Expr::Dot, Expr::descendant("foo")), Expr::child("bar")));
        assert!(!replaced.is_absolute());
        assert_eq!(Expr::Root.tail(), None);
    }

    #[test]
    fn last_context_step_walks_right_then_into_base() {
        let e = Expr::root_descendant("foo").slash(Expr::child("bar")).filter(Expr::attribute("id"));
        assert_eq!(e.last_context_step(), &Expr::child("bar"));
        assert_eq!(Expr::Dot.last_context_step(), &Expr::Dot);
    }

    #[test]
    fn static_types() {
        assert_eq!(Expr::root_descendant("foo").result_type(), ValueType::Element);
        assert_eq!(Expr::call("count", vec![Expr::Dot]).result_type(), ValueType::Integer);
        assert_eq!(Expr::Sequence(vec![Expr::child("a"), Expr::attribute("b")]).result_type(), ValueType::Node);
        assert_eq!(Expr::Sequence(vec![]).result_type(), ValueType::Empty);
    }
}
