use super::{Axis, Expr};

/// Static ordering properties of an expression's result sequence.
///
/// `peer` means no result is an ancestor of another, `downward` that every result lies at or
/// below its context node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderProps {
    pub ordered: bool,
    pub peer: bool,
    pub singleton: bool,
    pub downward: bool,
}

impl OrderProps {
    const SINGLE_NODE: Self = Self { ordered: true, peer: true, singleton: true, downward: true };

    fn of_axis(axis: Axis) -> Self {
        match axis {
            Axis::SelfAxis => Self::SINGLE_NODE,
            Axis::Parent => Self { ordered: true, peer: true, singleton: true, downward: false },
            Axis::Child | Axis::Attribute | Axis::Namespace => {
                Self { ordered: true, peer: true, singleton: false, downward: true }
            }
            Axis::Descendant | Axis::DescendantOrSelf => {
                Self { ordered: true, peer: false, singleton: false, downward: true }
            }
            Axis::FollowingSibling | Axis::PrecedingSibling => {
                Self { ordered: true, peer: true, singleton: false, downward: false }
            }
            Axis::Following | Axis::Preceding | Axis::Ancestor | Axis::AncestorOrSelf => {
                Self { ordered: true, peer: false, singleton: false, downward: false }
            }
        }
    }

    /// Properties of `lhs/rhs` given those of both sides.
    fn then(self, rhs: Self) -> Self {
        let ordered = self.ordered && rhs.ordered && (self.singleton || (self.peer && rhs.downward));
        Self {
            ordered,
            peer: ordered && rhs.peer && (self.singleton || (self.peer && rhs.downward)),
            singleton: self.singleton && rhs.singleton,
            downward: self.downward && rhs.downward,
        }
    }
}

impl Expr {
    pub fn order_props(&self) -> OrderProps {
        match self {
            Self::Root | Self::Dot => OrderProps { downward: false, ..OrderProps::SINGLE_NODE },
            Self::Step(step) => OrderProps::of_axis(step.axis),
            Self::Path { lhs, rhs } => lhs.order_props().then(rhs.order_props()),
            Self::Predicate { base, .. } | Self::Subsequence { base, .. } => base.order_props(),
            Self::DocumentSort(inner) => {
                let inner = inner.order_props();
                OrderProps { ordered: true, ..inner }
            }
            Self::Search(call) if call.sort.is_none() && call.kind == super::SearchKind::Search => {
                OrderProps { ordered: true, peer: true, singleton: false, downward: false }
            }
            _ => OrderProps::default(),
        }
    }

    /// Whether the result sequence is statically known to be in document order.
    pub fn is_document_ordered(&self) -> bool {
        self.order_props().ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_chains_from_root_are_ordered() {
        assert!(Expr::Root.slash(Expr::child("a")).slash(Expr::child("b")).is_document_ordered());
        assert!(Expr::root_descendant("a").is_document_ordered());
    }

    #[test]
    fn descendant_after_descendant_is_not() {
        let e = Expr::root_descendant("a").slash(Expr::descendant("b"));
        assert!(!e.is_document_ordered());
        let e = Expr::root_descendant("a").slash(Expr::child("b"));
        assert!(!e.is_document_ordered());
    }

    #[test]
    fn attributes_of_children_are_ordered() {
        let e = Expr::Root.slash(Expr::child("a")).slash(Expr::attribute("id"));
        assert!(e.is_document_ordered());
    }
}
