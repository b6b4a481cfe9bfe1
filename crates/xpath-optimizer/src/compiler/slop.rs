//! Node distance across the boundary between two adjacent path components.
//!
//! Forward counting starts at the left end of the right-hand operand, reverse counting at
//! the right end of the left-hand operand. A named step ends the walk; each wildcard step
//! crossed adds one. Any axis other than child or attribute makes the distance unbounded.

use crate::ast::{Axis, Expr, PathStep};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Walk {
    /// Reached a named step after crossing this many wildcards.
    Stopped(u32),
    /// Crossed this many wildcards and can keep going.
    Open(u32),
    Unbounded,
}

impl Walk {
    fn plus(self, n: u32) -> Walk {
        match self {
            Self::Stopped(m) => Self::Stopped(m + n),
            Self::Open(m) => Self::Open(m + n),
            Self::Unbounded => Self::Unbounded,
        }
    }

    fn distance(self) -> Option<u32> {
        match self {
            Self::Stopped(n) | Self::Open(n) => Some(n),
            Self::Unbounded => None,
        }
    }
}

fn bounded_axis(axis: Axis) -> bool {
    matches!(axis, Axis::Child | Axis::Attribute)
}

/// Whether the slop counter accepts `expr`. Value-producing nodes such as literals and
/// operators are not path components; opaque nodes like function calls are, with an
/// unbounded distance.
pub fn is_path_component(expr: &Expr) -> bool {
    !matches!(expr, Expr::Literal(_) | Expr::Binary { .. } | Expr::UnaryMinus(_))
}

fn reject(expr: &Expr) -> Result<Walk> {
    Err(Error::NotPathComponent(expr.kind_name()))
}

fn forward_step(step: &PathStep) -> Walk {
    if !bounded_axis(step.axis) {
        return Walk::Unbounded;
    }
    if step.test.qname().is_some() { Walk::Stopped(0) } else { Walk::Open(1) }
}

fn reverse_step(step: &PathStep) -> Walk {
    if step.test.qname().is_some() {
        return Walk::Stopped(0);
    }
    if bounded_axis(step.axis) { Walk::Open(1) } else { Walk::Unbounded }
}

fn forward_walk(expr: &Expr) -> Result<Walk> {
    Ok(match expr {
        Expr::Root => Walk::Stopped(0),
        Expr::Dot => Walk::Open(0),
        Expr::Step(step) => forward_step(step),
        Expr::Path { lhs, rhs } => match forward_walk(lhs)? {
            Walk::Open(n) => forward_walk(rhs)?.plus(n),
            done => done,
        },
        Expr::Predicate { base, .. } => forward_walk(base)?,
        Expr::Literal(_) | Expr::Binary { .. } | Expr::UnaryMinus(_) => return reject(expr),
        _ => Walk::Unbounded,
    })
}

fn reverse_walk(expr: &Expr) -> Result<Walk> {
    Ok(match expr {
        Expr::Root => Walk::Stopped(0),
        Expr::Dot => Walk::Open(0),
        Expr::Step(step) => reverse_step(step),
        Expr::Path { lhs, rhs } => match reverse_walk(rhs)? {
            Walk::Open(n) => reverse_walk(lhs)?.plus(n),
            done => done,
        },
        // the filter's terms may lie below the context node, so nothing can follow them
        Expr::Predicate { .. } => Walk::Unbounded,
        Expr::Literal(_) | Expr::Binary { .. } | Expr::UnaryMinus(_) => return reject(expr),
        _ => Walk::Unbounded,
    })
}

/// Distance from the left end of `expr` to its first named step, `None` when unbounded.
pub fn forward_slop(expr: &Expr) -> Result<Option<u32>> {
    forward_walk(expr).map(Walk::distance)
}

/// Distance from the right end of `expr` back to its last named step.
pub fn reverse_slop(expr: &Expr) -> Result<Option<u32>> {
    reverse_walk(expr).map(Walk::distance)
}

/// Total slop for combining `left` followed by `right`, when both sides are bounded.
pub fn adjacent_slop(left: &Expr, right: &Expr) -> Result<Option<u32>> {
    let Some(r) = forward_slop(right)? else { return Ok(None) };
    Ok(reverse_slop(left)?.map(|l| l + r))
}
