//! Reference semantics used by the soundness tests: a small arena document model, an
//! evaluator for the expression shapes the generators produce, and a matcher that decides
//! which documents a structured query selects.
//!
//! Absolute expressions range over the whole collection: `/` yields the root of every
//! document, which is also what an inserted search primitive narrows.
#![allow(dead_code)]

use xpath_optimizer::ast::{BinaryOp, ComparisonOp, Expr, FlworClause, Literal, NameTest, NodeTest, SearchCall};
use xpath_optimizer::query::{Clause, StructuredQuery};
use xpath_optimizer::{Axis, IndexConfig, IndexField, Occur, QName, SearchKind, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Document,
    Element,
    Attribute,
    Text,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: Kind,
    pub name: String,
    pub value: String,
    pub parent: Option<usize>,
    pub attrs: Vec<usize>,
    pub children: Vec<usize>,
}

impl Node {
    fn new(kind: Kind, name: &str, value: &str, parent: Option<usize>) -> Self {
        Self { kind, name: name.to_string(), value: value.to_string(), parent, attrs: Vec::new(), children: Vec::new() }
    }
}

/// Builder description of a document's element tree.
#[derive(Debug, Clone)]
pub enum Tree {
    Element { name: String, attrs: Vec<(String, String)>, children: Vec<Tree> },
    Text(String),
}

pub fn elem(name: &str, attrs: &[(&str, &str)], children: Vec<Tree>) -> Tree {
    Tree::Element {
        name: name.to_string(),
        attrs: attrs.iter().map(|(n, v)| (n.to_string(), v.to_string())).collect(),
        children,
    }
}

pub fn text(value: &str) -> Tree {
    Tree::Text(value.to_string())
}

/// Nodes are stored in document order; node 0 is the document node.
#[derive(Debug, Clone)]
pub struct Doc {
    pub nodes: Vec<Node>,
}

impl Doc {
    pub fn new(root: &Tree) -> Self {
        let mut doc = Doc { nodes: vec![Node::new(Kind::Document, "", "", None)] };
        let id = doc.add(0, root);
        doc.nodes[0].children.push(id);
        doc
    }

    fn add(&mut self, parent: usize, tree: &Tree) -> usize {
        let id = self.nodes.len();
        match tree {
            Tree::Text(value) => self.nodes.push(Node::new(Kind::Text, "", value, Some(parent))),
            Tree::Element { name, attrs, children } => {
                self.nodes.push(Node::new(Kind::Element, name, "", Some(parent)));
                for (n, v) in attrs {
                    let a = self.nodes.len();
                    self.nodes.push(Node::new(Kind::Attribute, n, v, Some(id)));
                    self.nodes[id].attrs.push(a);
                }
                for child in children {
                    let c = self.add(id, child);
                    self.nodes[id].children.push(c);
                }
            }
        }
        id
    }

    pub fn string_value(&self, id: usize) -> String {
        let node = &self.nodes[id];
        match node.kind {
            Kind::Text | Kind::Attribute => node.value.clone(),
            Kind::Document | Kind::Element => {
                self.descendants(id).into_iter().filter(|&d| self.nodes[d].kind == Kind::Text).map(|d| self.nodes[d].value.as_str()).collect()
            }
        }
    }

    /// Descendants in document order, attributes excluded.
    pub fn descendants(&self, id: usize) -> Vec<usize> {
        let mut out = Vec::new();
        for &c in &self.nodes[id].children {
            out.push(c);
            out.extend(self.descendants(c));
        }
        out
    }

    fn ancestors(&self, id: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut cur = self.nodes[id].parent;
        while let Some(p) = cur {
            out.push(p);
            cur = self.nodes[p].parent;
        }
        out
    }

    /// Name path from the root element down to `id`; attributes are written `@name`.
    fn path_of(&self, id: usize) -> Vec<String> {
        let mut chain: Vec<usize> = self.ancestors(id).into_iter().rev().collect();
        chain.push(id);
        chain
            .into_iter()
            .filter_map(|n| {
                let node = &self.nodes[n];
                match node.kind {
                    Kind::Element => Some(node.name.clone()),
                    Kind::Attribute => Some(format!("@{}", node.name)),
                    _ => None,
                }
            })
            .collect()
    }

    fn axis(&self, id: usize, axis: Axis) -> Vec<usize> {
        let node = &self.nodes[id];
        match axis {
            Axis::Child => node.children.clone(),
            Axis::Attribute => node.attrs.clone(),
            Axis::Descendant => self.descendants(id),
            Axis::DescendantOrSelf => std::iter::once(id).chain(self.descendants(id)).collect(),
            Axis::SelfAxis => vec![id],
            Axis::Parent => node.parent.into_iter().collect(),
            Axis::Ancestor => self.ancestors(id),
            Axis::AncestorOrSelf => std::iter::once(id).chain(self.ancestors(id)).collect(),
            other => panic!("axis {other:?} is not modelled"),
        }
    }

    fn kind_is(&self, id: usize, kind: ValueType) -> bool {
        let node_kind = self.nodes[id].kind;
        match kind {
            ValueType::Node | ValueType::Value => true,
            ValueType::Document => node_kind == Kind::Document,
            ValueType::Element => node_kind == Kind::Element,
            ValueType::Attribute => node_kind == Kind::Attribute,
            ValueType::Text => node_kind == Kind::Text,
            _ => false,
        }
    }

    fn test(&self, id: usize, test: &NodeTest) -> bool {
        match test {
            NodeTest::Kind(kind) => self.kind_is(id, *kind),
            NodeTest::Name { kind, name } => {
                self.kind_is(id, *kind)
                    && match name {
                        NameTest::QName(q) => q.ns_uri.is_none() && self.nodes[id].name == q.local,
                        NameTest::Wildcard(_) => true,
                    }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Node(usize, usize),
    Str(String),
    Int(i64),
    Bool(bool),
}

#[derive(Clone)]
struct Focus {
    item: Option<Item>,
    position: usize,
    size: usize,
}

impl Focus {
    const NONE: Focus = Focus { item: None, position: 0, size: 0 };
}

type Env = Vec<(QName, Vec<Item>)>;

pub struct Evaluator<'a> {
    docs: &'a [Doc],
    config: &'a IndexConfig,
}

fn sort_nodes(items: &mut Vec<Item>) {
    if items.iter().all(|i| matches!(i, Item::Node(..))) {
        items.sort_by_key(|i| match i {
            Item::Node(d, n) => (*d, *n),
            _ => (0, 0),
        });
        items.dedup();
    }
}

impl<'a> Evaluator<'a> {
    pub fn new(docs: &'a [Doc], config: &'a IndexConfig) -> Self {
        Self { docs, config }
    }

    pub fn eval(&self, expr: &Expr) -> Vec<Item> {
        self.eval_in(expr, &Focus::NONE, &mut Vec::new())
    }

    fn atomize(&self, item: &Item) -> String {
        match item {
            Item::Node(d, n) => self.docs[*d].string_value(*n),
            Item::Str(s) => s.clone(),
            Item::Int(i) => i.to_string(),
            Item::Bool(b) => b.to_string(),
        }
    }

    fn ebv(&self, items: &[Item]) -> bool {
        match items {
            [] => false,
            [Item::Node(..), ..] => true,
            [Item::Bool(b)] => *b,
            [Item::Str(s)] => !s.is_empty(),
            [Item::Int(i)] => *i != 0,
            _ => panic!("no effective boolean value for {items:?}"),
        }
    }

    fn roots(&self) -> Vec<Item> {
        (0..self.docs.len()).map(|d| Item::Node(d, 0)).collect()
    }

    fn eval_search(&self, call: &SearchCall) -> Vec<Item> {
        let query = call.structured_query().expect("search query re-parses");
        let matching: Vec<usize> = (0..self.docs.len()).filter(|&d| self.matches(&query, &self.docs[d])).collect();
        match call.kind {
            SearchKind::Search => matching.into_iter().map(|d| Item::Node(d, 0)).collect(),
            SearchKind::Count => vec![Item::Int(matching.len() as i64)],
            SearchKind::Exists => {
                let any = !matching.is_empty();
                vec![Item::Bool(if call.result_type == ValueType::BooleanFalse { !any } else { any })]
            }
        }
    }

    fn eval_in(&self, expr: &Expr, focus: &Focus, env: &mut Env) -> Vec<Item> {
        match expr {
            Expr::Root => self.roots(),
            Expr::Dot => focus.item.clone().into_iter().collect(),
            Expr::Literal(Literal::Integer(i)) => vec![Item::Int(*i)],
            Expr::Literal(Literal::Boolean(b)) => vec![Item::Bool(*b)],
            Expr::Literal(other) => vec![Item::Str(other.lexical())],
            Expr::Variable(name) => {
                env.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v.clone()).expect("bound variable")
            }
            Expr::Step(step) => match &focus.item {
                Some(Item::Node(d, n)) => {
                    let doc = &self.docs[*d];
                    doc.axis(*n, step.axis).into_iter().filter(|&m| doc.test(m, &step.test)).map(|m| Item::Node(*d, m)).collect()
                }
                _ => Vec::new(),
            },
            Expr::Path { lhs, rhs } => {
                let left = self.eval_in(lhs, focus, env);
                let size = left.len();
                let mut out = Vec::new();
                for (i, item) in left.into_iter().enumerate() {
                    if matches!(item, Item::Node(..)) {
                        let inner = Focus { item: Some(item), position: i + 1, size };
                        out.extend(self.eval_in(rhs, &inner, env));
                    }
                }
                sort_nodes(&mut out);
                out
            }
            Expr::Predicate { base, filter } => {
                let items = self.eval_in(base, focus, env);
                let size = items.len();
                let mut out = Vec::new();
                for (i, item) in items.into_iter().enumerate() {
                    let inner = Focus { item: Some(item.clone()), position: i + 1, size };
                    let result = self.eval_in(filter, &inner, env);
                    let keep = match result.as_slice() {
                        [Item::Int(n)] => *n == (i + 1) as i64,
                        other => self.ebv(other),
                    };
                    if keep {
                        out.push(item);
                    }
                }
                out
            }
            Expr::FunctionCall(call) => {
                let name = call.builtin_name().expect("built-in function");
                let args: Vec<Vec<Item>> = call.args.iter().map(|a| self.eval_in(a, focus, env)).collect();
                match (name, args.as_slice()) {
                    ("count", [a]) => vec![Item::Int(a.len() as i64)],
                    ("exists", [a]) => vec![Item::Bool(!a.is_empty())],
                    ("empty", [a]) => vec![Item::Bool(a.is_empty())],
                    ("not", [a]) => vec![Item::Bool(!self.ebv(a))],
                    ("boolean", [a]) => vec![Item::Bool(self.ebv(a))],
                    ("string", [a]) => vec![Item::Str(a.first().map(|i| self.atomize(i)).unwrap_or_default())],
                    ("root", []) => match &focus.item {
                        Some(Item::Node(d, _)) => vec![Item::Node(*d, 0)],
                        _ => Vec::new(),
                    },
                    ("last", []) => vec![Item::Int(focus.size as i64)],
                    ("position", []) => vec![Item::Int(focus.position as i64)],
                    ("contains", [a, b]) => {
                        let hay = a.first().map(|i| self.atomize(i)).unwrap_or_default();
                        let needle = b.first().map(|i| self.atomize(i)).unwrap_or_default();
                        vec![Item::Bool(hay.contains(&needle))]
                    }
                    _ => panic!("function {name} is not modelled"),
                }
            }
            Expr::Binary { left, op, right } => {
                let l = self.eval_in(left, focus, env);
                let r = self.eval_in(right, focus, env);
                match op {
                    BinaryOp::And => vec![Item::Bool(self.ebv(&l) && self.ebv(&r))],
                    BinaryOp::Or => vec![Item::Bool(self.ebv(&l) || self.ebv(&r))],
                    BinaryOp::General(ComparisonOp::Eq) => {
                        let eq = l.iter().any(|a| r.iter().any(|b| self.atomize(a) == self.atomize(b)));
                        vec![Item::Bool(eq)]
                    }
                    BinaryOp::Union => {
                        let mut out = l;
                        out.extend(r);
                        sort_nodes(&mut out);
                        out
                    }
                    BinaryOp::Intersect => {
                        let mut out: Vec<Item> = l.into_iter().filter(|i| r.contains(i)).collect();
                        sort_nodes(&mut out);
                        out
                    }
                    BinaryOp::Except => {
                        let mut out: Vec<Item> = l.into_iter().filter(|i| !r.contains(i)).collect();
                        sort_nodes(&mut out);
                        out
                    }
                    other => panic!("operator {other:?} is not modelled"),
                }
            }
            Expr::Sequence(items) => items.iter().flat_map(|e| self.eval_in(e, focus, env)).collect(),
            Expr::Subsequence { base, start, length } => {
                let items = self.eval_in(base, focus, env);
                let size = items.len();
                let bound_focus = Focus { item: focus.item.clone(), position: focus.position, size };
                let start = match self.eval_in(start, &bound_focus, env).as_slice() {
                    [Item::Int(n)] => *n,
                    other => panic!("subsequence start {other:?}"),
                };
                let length = length.as_ref().map(|l| match self.eval_in(l, focus, env).as_slice() {
                    [Item::Int(n)] => *n,
                    other => panic!("subsequence length {other:?}"),
                });
                items
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| {
                        let pos = *i as i64 + 1;
                        pos >= start && length.is_none_or(|len| pos < start + len)
                    })
                    .map(|(_, item)| item)
                    .collect()
            }
            Expr::Flwor(flwor) => {
                let mut out = Vec::new();
                self.eval_clauses(&flwor.clauses, &flwor.return_expr, focus, env, &mut out);
                out
            }
            Expr::DocumentSort(inner) => {
                let mut out = self.eval_in(inner, focus, env);
                sort_nodes(&mut out);
                out
            }
            Expr::Search(call) => self.eval_search(call),
            other => panic!("{} is not modelled", other.kind_name()),
        }
    }

    fn eval_clauses(&self, clauses: &[FlworClause], ret: &Expr, focus: &Focus, env: &mut Env, out: &mut Vec<Item>) {
        let Some((first, rest)) = clauses.split_first() else {
            out.extend(self.eval_in(ret, focus, env));
            return;
        };
        match first {
            FlworClause::For { var, seq } => {
                for item in self.eval_in(seq, focus, env) {
                    env.push((var.clone(), vec![item]));
                    self.eval_clauses(rest, ret, focus, env, out);
                    env.pop();
                }
            }
            FlworClause::Let { var, seq } => {
                let value = self.eval_in(seq, focus, env);
                env.push((var.clone(), value));
                self.eval_clauses(rest, ret, focus, env, out);
                env.pop();
            }
            FlworClause::Where(cond) => {
                let holds = self.eval_in(cond, focus, env);
                if self.ebv(&holds) {
                    self.eval_clauses(rest, ret, focus, env, out);
                }
            }
            FlworClause::OrderBy(_) => self.eval_clauses(rest, ret, focus, env, out),
        }
    }

    /// Whether `doc` is selected by `query` under the modelled index.
    pub fn matches(&self, query: &StructuredQuery, doc: &Doc) -> bool {
        match query {
            StructuredQuery::MatchAll => true,
            StructuredQuery::Term(t) | StructuredQuery::SpanTerm(t) => self.term_matches(&t.field, &t.text, doc),
            StructuredQuery::SpanNear(_) => {
                doc.nodes.iter().enumerate().filter(|(_, n)| matches!(n.kind, Kind::Element | Kind::Attribute)).any(
                    |(id, _)| {
                        let tokens = doc.path_of(id);
                        !self.spans(query, &tokens).is_empty()
                    },
                )
            }
            StructuredQuery::Boolean(b) => {
                let clauses = b.clauses();
                let holds = |c: &Clause| self.matches(&c.query, doc);
                let musts: Vec<&Clause> = clauses.iter().filter(|c| c.occur == Occur::Must).collect();
                let shoulds: Vec<&Clause> = clauses.iter().filter(|c| c.occur == Occur::Should).collect();
                let excluded = clauses.iter().filter(|c| c.occur == Occur::MustNot).any(holds);
                if excluded {
                    return false;
                }
                if musts.is_empty() {
                    shoulds.into_iter().any(holds)
                } else {
                    musts.into_iter().all(holds)
                }
            }
        }
    }

    fn term_matches(&self, field: &str, text: &str, doc: &Doc) -> bool {
        let is = |f: IndexField| self.config.field(f) == field;
        let value_matches = |value: String, wanted: &str| value == wanted || value.split_whitespace().any(|t| t == wanted);
        let nodes = || doc.nodes.iter().enumerate();
        if is(IndexField::ElementName) {
            nodes().any(|(_, n)| n.kind == Kind::Element && n.name == text)
        } else if is(IndexField::AttributeName) {
            nodes().any(|(_, n)| n.kind == Kind::Attribute && n.name == text)
        } else if is(IndexField::Path) {
            nodes().any(|(_, n)| match n.kind {
                Kind::Element => n.name == text,
                Kind::Attribute => text.strip_prefix('@') == Some(n.name.as_str()),
                _ => false,
            })
        } else if is(IndexField::ElementText) || is(IndexField::AttributeText) {
            let kind = if is(IndexField::ElementText) { Kind::Element } else { Kind::Attribute };
            let Some((name, value)) = text.split_once(':') else { return false };
            nodes().any(|(id, n)| n.kind == kind && n.name == name && value_matches(doc.string_value(id), value))
        } else if is(IndexField::XmlText) {
            nodes().any(|(id, n)| n.kind != Kind::Document && value_matches(doc.string_value(id), text))
        } else {
            false
        }
    }

    /// Spans `(start, end, gaps)` of `query` over one path token stream.
    fn spans(&self, query: &StructuredQuery, tokens: &[String]) -> Vec<(usize, usize, u32)> {
        match query {
            StructuredQuery::SpanTerm(t) => {
                tokens.iter().enumerate().filter(|(_, tok)| **tok == t.text).map(|(i, _)| (i, i + 1, 0)).collect()
            }
            StructuredQuery::SpanNear(span) => {
                let mut clauses = span.clauses().iter();
                let Some(first) = clauses.next() else { return Vec::new() };
                let mut acc = self.spans(first, tokens);
                for clause in clauses {
                    let next = self.spans(clause, tokens);
                    let mut joined = Vec::new();
                    for &(s, e, g) in &acc {
                        for &(s2, e2, g2) in &next {
                            if s2 >= e {
                                joined.push((s, e2, g + g2 + (s2 - e) as u32));
                            } else if !span.in_order && e2 <= s {
                                joined.push((s2, e, g + g2 + (s - e2) as u32));
                            }
                        }
                    }
                    acc = joined;
                }
                acc.into_iter().filter(|&(_, _, g)| g <= span.slop).collect()
            }
            _ => Vec::new(),
        }
    }
}
