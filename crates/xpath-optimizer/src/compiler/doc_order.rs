//! Removal of document-order sorts the ordering analysis proves redundant.

use std::convert::Infallible;

use tracing::debug;

use crate::ast::Expr;

/// Strip every [`Expr::DocumentSort`] wrapper at the top of `expr` whose operand is already
/// known to be in document order.
pub fn assert_document_order(expr: Expr) -> Expr {
    let mut expr = expr;
    loop {
        match expr {
            Expr::DocumentSort(inner) if inner.is_document_ordered() => {
                debug!(node = inner.kind_name(), "document sort elided");
                expr = *inner;
            }
            other => return other,
        }
    }
}

/// Apply [`assert_document_order`] at every node, bottom-up.
pub fn elide_document_sorts(expr: Expr) -> Expr {
    match expr.map_children(&mut |child| Ok::<_, Infallible>(elide_document_sorts(child))) {
        Ok(expr) => assert_document_order(expr),
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(e: Expr) -> Expr {
        Expr::DocumentSort(Box::new(e))
    }

    #[test]
    fn ordered_operand_loses_its_sort() {
        let path = Expr::Root.slash(Expr::child("a"));
        assert_eq!(assert_document_order(sorted(sorted(path.clone()))), path);
    }

    #[test]
    fn unordered_operand_keeps_its_sort() {
        let path = Expr::root_descendant("a").slash(Expr::descendant("b"));
        let e = sorted(path);
        assert_eq!(assert_document_order(e.clone()), e);
    }

    #[test]
    fn nested_sorts_are_elided_bottom_up() {
        let inner = Expr::Root.slash(Expr::child("a"));
        let e = Expr::call("count", vec![sorted(inner.clone())]);
        assert_eq!(elide_document_sorts(e), Expr::call("count", vec![inner]));
    }
}
