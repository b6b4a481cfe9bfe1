//! Expression tree consumed and produced by the optimizer.
//!
//! Paths are binary: `/a/b` is `Path(Path(Root, child::a), child::b)` and `//a` is
//! `Path(Root, descendant::a)`. Predicates wrap their base. Search primitives inserted by the
//! optimizer are ordinary nodes of the same tree.

mod navigate;
mod order;

pub use order::OrderProps;

use crate::model::{QName, SEARCH_NAMESPACE, ValueType};
use crate::query::{Facts, QueryElement, StructuredQuery};
use crate::error::QueryError;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Double(f64),
    String(String),
    Boolean(bool),
    UntypedAtomic(String),
}

impl Literal {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Integer(_) => ValueType::Integer,
            Self::Double(_) => ValueType::Double,
            Self::String(_) => ValueType::String,
            Self::Boolean(_) => ValueType::Boolean,
            Self::UntypedAtomic(_) => ValueType::UntypedAtomic,
        }
    }

    /// Text of a string-valued literal. Numeric and boolean literals compare by value, so
    /// no single index term stands for them.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::UntypedAtomic(s) => Some(s),
            _ => None,
        }
    }

    pub fn lexical(&self) -> String {
        match self {
            Self::Integer(i) => i.to_string(),
            Self::Double(d) => d.to_string(),
            Self::String(s) | Self::UntypedAtomic(s) => s.clone(),
            Self::Boolean(b) => b.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Child,
    Descendant,
    Attribute,
    SelfAxis,
    DescendantOrSelf,
    FollowingSibling,
    Following,
    Namespace,
    Parent,
    Ancestor,
    PrecedingSibling,
    Preceding,
    AncestorOrSelf,
}

impl Axis {
    /// Principal node kind selected by a name test on this axis.
    pub fn principal_kind(self) -> ValueType {
        match self {
            Self::Attribute => ValueType::Attribute,
            _ => ValueType::Element,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WildcardName {
    Any,
    NsWildcard(String),
    LocalWildcard(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NameTest {
    QName(QName),
    Wildcard(WildcardName),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeTest {
    /// Kind test such as `node()`, `text()` or `document-node()`.
    Kind(ValueType),
    Name { kind: ValueType, name: NameTest },
}

impl NodeTest {
    pub fn kind(&self) -> ValueType {
        match self {
            Self::Kind(kind) | Self::Name { kind, .. } => *kind,
        }
    }

    /// The exact name tested for, if any. Wildcards have none.
    pub fn qname(&self) -> Option<&QName> {
        match self {
            Self::Name { name: NameTest::QName(q), .. } => Some(q),
            _ => None,
        }
    }

    /// `node()` and `item()`-like tests that accept any prevailing type.
    pub fn is_loosely_typed(&self) -> bool {
        matches!(self, Self::Kind(ValueType::Node | ValueType::Value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathStep {
    pub axis: Axis,
    pub test: NodeTest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    And,
    Or,
    General(ComparisonOp),
    Value(ComparisonOp),
    Is,
    Precedes,
    Follows,
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOp {
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunCall {
    pub name: QName,
    pub args: Vec<Expr>,
}

impl FunCall {
    /// Local name of a built-in function; `None` for user or extension functions.
    pub fn builtin_name(&self) -> Option<&str> {
        match self.name.ns_uri.as_deref() {
            None | Some(crate::model::FN_NAMESPACE) => Some(self.name.local.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub key: Expr,
    pub descending: bool,
    pub empty_greatest: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlworClause {
    For { var: QName, seq: Expr },
    Let { var: QName, seq: Expr },
    Where(Expr),
    OrderBy(Vec<SortKey>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Flwor {
    pub clauses: Vec<FlworClause>,
    pub return_expr: Box<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchKind {
    /// Returns the matching documents.
    Search,
    /// Returns the number of matching documents.
    Count,
    /// Returns whether any document matches.
    Exists,
}

impl SearchKind {
    pub fn function_name(self) -> QName {
        let local = match self {
            Self::Search => "search",
            Self::Count => "count",
            Self::Exists => "exists",
        };
        QName::with_ns(Some("search"), local, SEARCH_NAMESPACE)
    }
}

/// Inserted search primitive: run `query` against the index, then evaluate the rest of the
/// expression over the returned documents only.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCall {
    pub kind: SearchKind,
    /// Tree form of the structured query.
    pub query: QueryElement,
    pub facts: Facts,
    pub result_type: ValueType,
    /// Index sort string, `name [descending] [empty greatest]` entries joined by commas.
    pub sort: Option<String>,
}

impl SearchCall {
    pub fn new(kind: SearchKind, query: &StructuredQuery, facts: Facts, result_type: ValueType) -> Self {
        Self { kind, query: query.to_element(), facts, result_type, sort: None }
    }

    pub fn with_sort(mut self, sort: Option<String>) -> Self {
        self.sort = sort;
        self
    }

    pub fn structured_query(&self) -> Result<StructuredQuery, QueryError> {
        StructuredQuery::from_element(&self.query)
    }

    /// Flat string form of the query.
    pub fn query_string(&self) -> Result<String, QueryError> {
        self.structured_query().map(|q| q.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Root,
    Dot,
    Literal(Literal),
    Variable(QName),
    Step(PathStep),
    Path { lhs: Box<Expr>, rhs: Box<Expr> },
    Predicate { base: Box<Expr>, filter: Box<Expr> },
    FunctionCall(FunCall),
    Binary { left: Box<Expr>, op: BinaryOp, right: Box<Expr> },
    Sequence(Vec<Expr>),
    Subsequence { base: Box<Expr>, start: Box<Expr>, length: Option<Box<Expr>> },
    Flwor(Flwor),
    SetOperation { op: SetOp, operands: Vec<Expr> },
    UnaryMinus(Box<Expr>),
    /// Explicit document-order sort with duplicate elimination.
    DocumentSort(Box<Expr>),
    Search(SearchCall),
}

impl Expr {
    pub fn step(axis: Axis, test: NodeTest) -> Self {
        Self::Step(PathStep { axis, test })
    }

    /// Name step on `axis`, selecting the axis' principal node kind.
    pub fn named(axis: Axis, name: QName) -> Self {
        Self::step(axis, NodeTest::Name { kind: axis.principal_kind(), name: NameTest::QName(name) })
    }

    pub fn child(local: &str) -> Self {
        Self::named(Axis::Child, QName::local(local))
    }

    pub fn descendant(local: &str) -> Self {
        Self::named(Axis::Descendant, QName::local(local))
    }

    pub fn attribute(local: &str) -> Self {
        Self::named(Axis::Attribute, QName::local(local))
    }

    /// `axis::*`
    pub fn wildcard(axis: Axis) -> Self {
        Self::step(axis, NodeTest::Name { kind: axis.principal_kind(), name: NameTest::Wildcard(WildcardName::Any) })
    }

    pub fn kind_step(axis: Axis, kind: ValueType) -> Self {
        Self::step(axis, NodeTest::Kind(kind))
    }

    pub fn path(lhs: Expr, rhs: Expr) -> Self {
        Self::Path { lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    /// `self/step`
    pub fn slash(self, step: Expr) -> Self {
        Self::path(self, step)
    }

    /// `//local`
    pub fn root_descendant(local: &str) -> Self {
        Self::path(Self::Root, Self::descendant(local))
    }

    pub fn predicate(base: Expr, filter: Expr) -> Self {
        Self::Predicate { base: Box::new(base), filter: Box::new(filter) }
    }

    /// `self[filter]`
    pub fn filter(self, filter: Expr) -> Self {
        Self::predicate(self, filter)
    }

    pub fn call(local: &str, args: Vec<Expr>) -> Self {
        Self::FunctionCall(FunCall { name: QName::function(local), args })
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Self::Binary { left: Box::new(left), op, right: Box::new(right) }
    }

    pub fn string(s: &str) -> Self {
        Self::Literal(Literal::String(s.to_string()))
    }

    pub fn integer(i: i64) -> Self {
        Self::Literal(Literal::Integer(i))
    }

    pub fn var(local: &str) -> Self {
        Self::Variable(QName::local(local))
    }

    pub fn subsequence(base: Expr, start: Expr, length: Option<Expr>) -> Self {
        Self::Subsequence { base: Box::new(base), start: Box::new(start), length: length.map(Box::new) }
    }

    pub fn flwor(clauses: Vec<FlworClause>, return_expr: Expr) -> Self {
        Self::Flwor(Flwor { clauses, return_expr: Box::new(return_expr) })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Dot => "context item",
            Self::Literal(_) => "literal",
            Self::Variable(_) => "variable",
            Self::Step(_) => "path step",
            Self::Path { .. } => "path",
            Self::Predicate { .. } => "predicate",
            Self::FunctionCall(_) => "function call",
            Self::Binary { .. } => "binary operation",
            Self::Sequence(_) => "sequence",
            Self::Subsequence { .. } => "subsequence",
            Self::Flwor(_) => "FLWOR",
            Self::SetOperation { .. } => "set operation",
            Self::UnaryMinus(_) => "unary minus",
            Self::DocumentSort(_) => "document sort",
            Self::Search(_) => "search call",
        }
    }

    /// Search primitives anywhere in the tree, in pre-order.
    pub fn search_calls(&self) -> Vec<&SearchCall> {
        let mut out = Vec::new();
        self.collect_searches(&mut out);
        out
    }

    fn collect_searches<'a>(&'a self, out: &mut Vec<&'a SearchCall>) {
        if let Self::Search(call) = self {
            out.push(call);
        }
        for child in self.children() {
            child.collect_searches(out);
        }
    }
}
