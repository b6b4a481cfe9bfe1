//! Index-aware rewrite of expression trees.
//!
//! Every node is annotated bottom-up with a conservative index query describing the
//! documents that can contribute to its result. Where an absolute sub-expression is reached
//! at a top-level position (the whole expression, a predicate filter, an operand, a function
//! argument, a FLWOR clause) the accumulated query is spliced in as a search primitive that
//! replaces the expression's root.

pub mod doc_order;
mod functions;
pub mod slop;

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::ast::{
    Axis, BinaryOp, ComparisonOp, Expr, Flwor, FlworClause, FunCall, Literal, NameTest, NodeTest, PathStep, SearchCall,
    SearchKind, SortKey, WildcardName,
};
use crate::config::{IndexConfig, IndexField, IndexOptions};
use crate::error::Result;
use crate::model::{FN_NAMESPACE, QName, ValueType};
use crate::query::{AnnotatedQuery, Clause, Facts, MATCH_ALL, Occur, StructuredQuery, UNINDEXED};
use functions::{ArgPolicy, Lowering};

type Visited = (Expr, AnnotatedQuery);

/// Rewritten expression together with the query left over at its top level.
#[derive(Debug, Clone, PartialEq)]
pub struct Optimized {
    pub expr: Expr,
    pub query: AnnotatedQuery,
}

/// Optimize using the shared default configuration.
pub fn optimize(expr: Expr) -> Result<Optimized> {
    PathOptimizer::new(IndexConfig::shared_default()).optimize(expr)
}

/// Optimize with an explicitly provided configuration.
pub fn optimize_with_config(expr: Expr, config: &IndexConfig) -> Result<Optimized> {
    PathOptimizer::new(config).optimize(expr)
}

pub struct PathOptimizer<'a> {
    config: &'a IndexConfig,
    /// Set while deriving the constraint an expression places on the document of one
    /// variable's item. That variable then stands for the context, and everything else is
    /// unindexed.
    focus: Option<&'a QName>,
}

fn is_integer_one(e: &Expr) -> bool {
    matches!(e, Expr::Literal(Literal::Integer(1)))
}

fn call_is_root(name: &QName) -> bool {
    matches!(name.ns_uri.as_deref(), None | Some(FN_NAMESPACE)) && name.local == "root"
}

fn is_last_call(e: &Expr) -> bool {
    matches!(e, Expr::FunctionCall(call) if call.args.is_empty() && call.builtin_name() == Some("last"))
}

/// Whether an unnamed step yields at least one node from every context of type `context`.
fn always_selects(step: &PathStep, context: ValueType) -> bool {
    let any_element = matches!(
        &step.test,
        NodeTest::Name { kind: ValueType::Element, name: NameTest::Wildcard(WildcardName::Any) }
    );
    let loose = step.test.is_loosely_typed();
    match step.axis {
        Axis::SelfAxis | Axis::AncestorOrSelf | Axis::DescendantOrSelf if loose => true,
        // every document has a root element
        Axis::Child | Axis::Descendant | Axis::DescendantOrSelf => {
            context == ValueType::Document && (loose || any_element)
        }
        Axis::Ancestor | Axis::AncestorOrSelf => {
            step.test == NodeTest::Kind(ValueType::Document)
                && context.is_node()
                && (step.axis == Axis::AncestorOrSelf || !matches!(context, ValueType::Document | ValueType::Node))
        }
        _ => false,
    }
}

/// `/descendant-or-self::node()`: every node of each document, the document node included.
fn reaches_every_node(expr: &Expr) -> bool {
    root_step(expr).is_some_and(|step| {
        step.axis == Axis::DescendantOrSelf && step.test == NodeTest::Kind(ValueType::Node)
    })
}

/// Every element of each document, whatever else is selected with them.
fn reaches_every_element(expr: &Expr) -> bool {
    let any_element = NodeTest::Name { kind: ValueType::Element, name: NameTest::Wildcard(WildcardName::Any) };
    root_step(expr).is_some_and(|step| {
        matches!(step.axis, Axis::Descendant | Axis::DescendantOrSelf)
            && (step.test == NodeTest::Kind(ValueType::Node) || step.test == any_element)
    })
}

fn root_step(expr: &Expr) -> Option<&PathStep> {
    match expr {
        Expr::Path { lhs, rhs } if matches!(**lhs, Expr::Root) => match &**rhs {
            Expr::Step(step) => Some(step),
            _ => None,
        },
        _ => None,
    }
}

fn mentions(var: &QName, expr: &Expr) -> bool {
    matches!(expr, Expr::Variable(v) if v == var) || expr.children().into_iter().any(|c| mentions(var, c))
}

fn binds(clause: &FlworClause, var: &QName) -> bool {
    matches!(clause, FlworClause::For { var: v, .. } | FlworClause::Let { var: v, .. } if v == var)
}

/// Whether `expr` is a path or filter chain over `var` whose steps and filters never refer
/// to `var` again, so it yields the union of what each item of `var` yields on its own.
fn applies_per_item(var: &QName, expr: &Expr) -> bool {
    fn chain(var: &QName, expr: &Expr) -> bool {
        match expr {
            Expr::Variable(v) => v == var,
            Expr::Path { lhs, rhs } => chain(var, lhs) && !mentions(var, rhs),
            Expr::Predicate { base, filter } => chain(var, base) && !mentions(var, filter),
            _ => false,
        }
    }
    match expr {
        Expr::Sequence(items) => items.iter().all(|item| !mentions(var, item) || applies_per_item(var, item)),
        _ => chain(var, expr) && !positional_over_collection(expr),
    }
}

/// Whether the leading expression of `expr` is the context item or a step from it.
fn reads_context(expr: &Expr) -> bool {
    match expr {
        Expr::Dot | Expr::Step(_) => true,
        Expr::Path { lhs, .. } => reads_context(lhs),
        Expr::Predicate { base, .. } => reads_context(base),
        Expr::FunctionCall(call) => call.args.is_empty() && call_is_root(&call.name),
        _ => false,
    }
}

/// Whether a filter selects by position rather than by truth.
fn is_positional(filter: &Expr) -> bool {
    filter.result_type().may_be_numeric() || mentions_position(filter)
}

fn mentions_position(expr: &Expr) -> bool {
    let reads_focus = matches!(
        expr,
        Expr::FunctionCall(call) if call.args.is_empty() && matches!(call.builtin_name(), Some("position" | "last"))
    );
    reads_focus || expr.children().into_iter().any(mentions_position)
}

/// Whether the leading expression of `expr` yields items from more than one document.
fn spans_collection(expr: &Expr) -> bool {
    match expr {
        Expr::Root | Expr::Variable(_) | Expr::Search(_) => true,
        Expr::Path { lhs, .. } => spans_collection(lhs),
        Expr::Predicate { base, .. } => spans_collection(base),
        _ => false,
    }
}

/// Whether positions are counted across documents somewhere along the leading path of
/// `expr`. Narrowing the documents searched would then renumber them, so nothing applied
/// after such a filter may constrain the search.
fn positional_over_collection(expr: &Expr) -> bool {
    match expr {
        Expr::Path { lhs, .. } => positional_over_collection(lhs),
        Expr::Predicate { base, filter } => {
            (spans_collection(base) && is_positional(filter)) || positional_over_collection(base)
        }
        _ => false,
    }
}

/// A conjunction of two constraints is exact only when one side constrains nothing, or when
/// the left side yields whole documents and the right is evaluated from each of them.
fn conjunction_is_exact(left: &AnnotatedQuery, right: &AnnotatedQuery) -> bool {
    left.is_match_all() || right.is_match_all() || left.result_type() == ValueType::Document
}

/// Whether the query's matches are exactly the documents where the expression is true, given
/// that they are the documents where it is non-empty.
fn decides_truth(query: &AnnotatedQuery) -> bool {
    query.result_type().is_node() || query.has(Facts::BOOLEAN_TRUE)
}

/// The query of an expression used for its effective boolean value.
fn as_condition(query: AnnotatedQuery) -> AnnotatedQuery {
    if decides_truth(&query) { query } else { query.without(Facts::MINIMAL) }
}

/// The query of an expression used for its value. A truth value is a non-empty result
/// whether or not its query matches.
fn as_value(query: AnnotatedQuery) -> AnnotatedQuery {
    if query.result_type().polarity().is_none() {
        return query;
    }
    let sentinel = if query.is_unindexed() { UNINDEXED } else { MATCH_ALL };
    sentinel.with_result_type(query.result_type())
}

/// Facts carried by a search-and-reduce primitive. Lowering only happens over exact
/// queries, so the primitive is exact as well.
fn primitive_facts(base: Facts, lowering: Lowering) -> Facts {
    (base | lowering.fact() | Facts::MINIMAL) - Facts::DOCUMENT_RESULTS
}

impl<'a> PathOptimizer<'a> {
    pub fn new(config: &'a IndexConfig) -> Self {
        Self { config, focus: None }
    }

    /// Rewrite `expr`, splicing a search primitive at the top when it is absolute.
    pub fn optimize(&self, expr: Expr) -> Result<Optimized> {
        let (expr, query) = self.visit(expr, &MATCH_ALL)?;
        let (expr, query) = self.splice(expr, query, None);
        Ok(Optimized { expr, query })
    }

    /// Annotate `expr` without splicing at the top level. Nested top-level positions are
    /// still spliced.
    pub fn annotate(&self, expr: Expr) -> Result<Optimized> {
        let (expr, query) = self.visit(expr, &MATCH_ALL)?;
        Ok(Optimized { expr, query })
    }

    /// `prevailing` is the query of whatever supplies the context item: the left side of a
    /// path, or the base of a predicate.
    fn visit(&self, expr: Expr, prevailing: &AnnotatedQuery) -> Result<Visited> {
        let kind = expr.kind_name();
        let (expr, query) = self.visit_node(expr, prevailing)?;
        trace!(node = kind, query = %query.query(), facts = ?query.facts(), result_type = %query.result_type(), "annotated");
        Ok((expr, query))
    }

    fn visit_node(&self, expr: Expr, prevailing: &AnnotatedQuery) -> Result<Visited> {
        match expr {
            // in focus mode only the focus variable's document is described
            Expr::Root if self.focus.is_some() => Ok((Expr::Root, UNINDEXED.with_result_type(ValueType::Document))),
            Expr::Root => Ok((Expr::Root, AnnotatedQuery::match_all(Facts::MINIMAL, ValueType::Document))),
            Expr::Dot if prevailing.is_unindexed() => Ok((Expr::Dot, UNINDEXED.with_result_type(prevailing.result_type()))),
            Expr::Dot => Ok((Expr::Dot, AnnotatedQuery::match_all(Facts::MINIMAL, prevailing.result_type()))),
            lit @ Expr::Literal(_) => Ok((lit, MATCH_ALL)),
            Expr::Variable(name) => {
                let query = if self.focus == Some(&name) { MATCH_ALL } else { UNINDEXED };
                Ok((Expr::Variable(name), query))
            }
            Expr::Step(step) => {
                let query = self.step_query(&step, prevailing, None);
                Ok((Expr::Step(step), query))
            }
            Expr::Path { lhs, rhs } => {
                let (lhs, lq) = self.visit(*lhs, prevailing)?;
                let lq = as_value(lq);
                let (rhs, rq) = match *rhs {
                    Expr::Step(step) => {
                        let query = self.step_query(&step, &lq, Some(&lhs));
                        trace!(node = "path step", query = %query.query(), facts = ?query.facts(), "annotated");
                        (Expr::Step(step), query)
                    }
                    rhs => {
                        // an absolute right side ranges over the whole collection
                        let (rhs, rq) = self.visit(rhs, &lq)?;
                        self.splice(rhs, as_value(rq), None)
                    }
                };
                let rq = as_value(rq);
                let query = if lq.is_unindexed() || rq.is_unindexed() {
                    // the items come from documents this query does not describe
                    UNINDEXED.with_result_type(rq.result_type())
                } else if positional_over_collection(&lhs) {
                    lq.with_result_type(rq.result_type()).without(Facts::MINIMAL)
                } else {
                    self.combine_adjacent(&lhs, &rhs, &lq, &rq, rq.result_type())?
                };
                Ok((Expr::path(lhs, rhs), query))
            }
            Expr::Predicate { base, filter } => self.visit_predicate(*base, *filter, prevailing),
            Expr::FunctionCall(call) => self.visit_function_call(call, prevailing),
            Expr::Binary { left, op, right } => self.visit_binary(*left, op, *right, prevailing),
            Expr::Sequence(items) => {
                let mut members = Vec::with_capacity(items.len());
                let mut queries: SmallVec<[AnnotatedQuery; 4]> = SmallVec::new();
                for item in items {
                    let (item, q) = self.visit(item, prevailing)?;
                    let (item, q) = self.splice(item, as_value(q), None);
                    members.push(item);
                    queries.push(q);
                }
                let result_type = queries.iter().fold(ValueType::Empty, |t, q| t.promote(q.result_type()));
                let query = AnnotatedQuery::combine_all(queries, Occur::Should, result_type)?;
                Ok((Expr::Sequence(members), query))
            }
            Expr::Subsequence { base, start, length } => self.visit_subsequence(*base, *start, length.map(|l| *l), prevailing),
            Expr::Flwor(flwor) => self.visit_flwor(flwor, prevailing),
            Expr::Search(call) => {
                let query = UNINDEXED.with_result_type(call.result_type);
                Ok((Expr::Search(call), query))
            }
            other @ (Expr::SetOperation { .. } | Expr::UnaryMinus(_) | Expr::DocumentSort(_)) => {
                // children are optimized on their own; nothing is inferred for the node itself
                let expr = other.map_children(&mut |child| self.optimize_subexpression(child, prevailing))?;
                let query = UNINDEXED.with_result_type(expr.result_type());
                Ok((expr, query))
            }
        }
    }

    /// Visit `expr` as a top-level position of its own.
    fn optimize_subexpression(&self, expr: Expr, prevailing: &AnnotatedQuery) -> Result<Expr> {
        let (expr, query) = self.visit(expr, prevailing)?;
        Ok(self.splice(expr, query, None).0)
    }

    /// Insert a search primitive for an absolute expression. The returned query is
    /// [`UNINDEXED`]: the constraint has been consumed by the search, and the items range over
    /// the collection rather than the context documents.
    fn splice(&self, expr: Expr, query: AnnotatedQuery, sort: Option<String>) -> Visited {
        if !expr.is_absolute() {
            return (expr, query);
        }
        let consumed = UNINDEXED.with_result_type(query.result_type());
        if self.focus.is_some() {
            return (expr, consumed);
        }
        debug!(
            query = %query.query(),
            facts = ?query.facts(),
            result_type = %query.result_type(),
            sort = ?sort,
            "splicing search"
        );
        let search = Expr::Search(
            SearchCall::new(SearchKind::Search, query.query(), query.facts(), ValueType::Document).with_sort(sort),
        );
        let expr = match expr.tail() {
            Some(tail) if query.result_type() == ValueType::Document && !positional_over_collection(&expr) => {
                Expr::predicate(search, tail)
            }
            _ => expr.replace_root(search),
        };
        (expr, consumed)
    }

    fn name_query(&self, kind: ValueType, name: &QName) -> StructuredQuery {
        let encoded = name.encoded();
        let indexable = matches!(kind, ValueType::Element | ValueType::Attribute);
        if !indexable {
            StructuredQuery::MatchAll
        } else if self.config.has(IndexOptions::INDEX_PATHS) {
            let token = if kind == ValueType::Attribute { format!("@{encoded}") } else { encoded };
            StructuredQuery::span_term(self.config.field(IndexField::Path), token)
        } else if self.config.has(IndexOptions::INDEX_QNAMES) {
            let field = if kind == ValueType::Attribute { IndexField::AttributeName } else { IndexField::ElementName };
            StructuredQuery::term(self.config.field(field), encoded)
        } else {
            StructuredQuery::MatchAll
        }
    }

    /// `context` is the expression supplying the context items, when it is known.
    fn step_query(&self, step: &PathStep, prevailing: &AnnotatedQuery, context: Option<&Expr>) -> AnnotatedQuery {
        let query = self.indexed_step_query(step, prevailing, context);
        if prevailing.is_unindexed() { UNINDEXED.with_result_type(query.result_type()) } else { query }
    }

    fn indexed_step_query(&self, step: &PathStep, prevailing: &AnnotatedQuery, context: Option<&Expr>) -> AnnotatedQuery {
        let kind = step.test.kind();
        if let Some(name) = step.test.qname() {
            let every_node = context.is_some_and(reaches_every_node);
            let minimal = match step.axis {
                Axis::Descendant | Axis::DescendantOrSelf => {
                    every_node || prevailing.result_type() == ValueType::Document
                }
                Axis::Attribute => context.is_some_and(reaches_every_element),
                Axis::Child => every_node,
                _ => false,
            };
            let facts = if minimal { Facts::MINIMAL } else { Facts::empty() };
            return AnnotatedQuery::new(self.name_query(kind, name), facts, kind);
        }
        let loose = step.test.is_loosely_typed();
        let result_type = match step.axis {
            Axis::SelfAxis if loose => prevailing.result_type(),
            Axis::AncestorOrSelf if loose && prevailing.result_type() == ValueType::Document => ValueType::Document,
            _ => kind,
        };
        let query = AnnotatedQuery::match_all(prevailing.facts(), result_type);
        if always_selects(step, prevailing.result_type()) { query } else { query.without(Facts::MINIMAL) }
    }

    /// Combine two syntactically adjacent components, as a proximity query when the path
    /// index allows it and the distance between them is bounded.
    fn combine_adjacent(
        &self,
        left: &Expr,
        right: &Expr,
        lq: &AnnotatedQuery,
        rq: &AnnotatedQuery,
        result_type: ValueType,
    ) -> Result<AnnotatedQuery> {
        let slop = if self.config.has(IndexOptions::INDEX_PATHS)
            && slop::is_path_component(left)
            && slop::is_path_component(right)
        {
            slop::adjacent_slop(left, right)?
        } else {
            None
        };
        let combined = AnnotatedQuery::combine_span(lq, rq, Occur::Must, result_type, slop)?;
        Ok(if conjunction_is_exact(lq, rq) { combined } else { combined.without(Facts::MINIMAL) })
    }

    fn visit_predicate(&self, base: Expr, filter: Expr, prevailing: &AnnotatedQuery) -> Result<Visited> {
        let (base, bq) = self.visit(base, prevailing)?;
        let bq = as_value(bq);
        let (filter, fq) = match filter {
            Expr::Step(step) => {
                let query = self.step_query(&step, &bq, Some(&base));
                (Expr::Step(step), query)
            }
            filter => self.visit(filter, &bq)?,
        };
        let (filter, fq) = self.splice(filter, fq, None);
        if bq.is_unindexed() {
            return Ok((Expr::predicate(base, filter), UNINDEXED.with_result_type(bq.result_type())));
        }
        if positional_over_collection(&base) {
            return Ok((Expr::predicate(base, filter), bq.without(Facts::MINIMAL)));
        }
        if fq.result_type().may_be_numeric() {
            // a positional filter depends on every item of the base, so only the base constrains
            trace!(filter_type = %fq.result_type(), "positional filter");
            let query = bq.clone().without(Facts::MINIMAL);
            return Ok((Expr::predicate(base, filter), query));
        }
        let fq = as_condition(fq);
        let mut query = self.combine_adjacent(&base, &filter, &bq, &fq, bq.result_type())?;
        query = if bq.has(Facts::COUNTING) { query.adding(Facts::COUNTING) } else { query.without(Facts::COUNTING) };
        let query = self.optimize_comparison(&base, &filter, query)?;
        Ok((Expr::predicate(base, filter), query))
    }

    /// Term query matching `value` as the text of the node selected by `step`.
    fn value_term(&self, step: Option<&PathStep>, value: &str) -> AnnotatedQuery {
        let named = step.and_then(|s| s.test.qname().map(|q| (s.test.kind(), q)));
        let query = match named {
            Some((ValueType::Element, name)) => {
                StructuredQuery::term(self.config.field(IndexField::ElementText), format!("{}:{value}", name.encoded()))
            }
            Some((ValueType::Attribute, name)) => {
                StructuredQuery::term(self.config.field(IndexField::AttributeText), format!("{}:{value}", name.encoded()))
            }
            _ => StructuredQuery::term(self.config.field(IndexField::XmlText), value),
        };
        AnnotatedQuery::new(query, Facts::MINIMAL, step.map_or(ValueType::Node, |s| s.test.kind()))
    }

    fn comparison_operands<'e>(&self, filter: &'e Expr) -> Option<(&'e Expr, &'e Literal)> {
        match filter {
            Expr::Binary {
                left,
                op: BinaryOp::General(ComparisonOp::Eq) | BinaryOp::Value(ComparisonOp::Eq),
                right,
            } => match (&**left, &**right) {
                (Expr::Literal(_), Expr::Literal(_)) => None,
                (path, Expr::Literal(lit)) | (Expr::Literal(lit), path) => Some((path, lit)),
                _ => None,
            },
            Expr::FunctionCall(call) if self.config.lowers_contains() && call.builtin_name() == Some("contains") => {
                match call.args.as_slice() {
                    [path, Expr::Literal(lit)] => Some((path, lit)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Add the text-value term implied by a `path = 'literal'` filter.
    fn optimize_comparison(&self, base: &Expr, filter: &Expr, query: AnnotatedQuery) -> Result<AnnotatedQuery> {
        if !self.config.has(IndexOptions::INDEX_FULLTEXT) {
            return Ok(query);
        }
        let Some((path, text)) = self.comparison_operands(filter).and_then(|(p, lit)| Some((p, lit.text()?))) else {
            return Ok(query);
        };
        if !reads_context(path) {
            return Ok(query);
        }
        let step = match path.last_context_step() {
            Expr::Step(step) => step,
            Expr::Dot => match base.last_context_step() {
                Expr::Step(step) => step,
                _ => return Ok(query),
            },
            _ => return Ok(query),
        };
        let term = self.value_term(Some(step), text);
        debug!(term = %term.query(), "comparison lowered to value term");
        Ok(AnnotatedQuery::combine_boolean(&term, Occur::Must, &query, Occur::Must, query.result_type())?)
    }

    fn visit_function_call(&self, call: FunCall, prevailing: &AnnotatedQuery) -> Result<Visited> {
        let FunCall { name, args } = call;
        if args.is_empty() && call_is_root(&name) {
            // the document containing the context node
            if prevailing.is_unindexed() {
                return Ok((Expr::FunctionCall(FunCall { name, args }), UNINDEXED.with_result_type(ValueType::Document)));
            }
            let context = prevailing.result_type();
            let query = AnnotatedQuery::match_all(prevailing.facts(), ValueType::Document);
            let query = if context.is_node() { query } else { query.without(Facts::MINIMAL) };
            return Ok((Expr::FunctionCall(FunCall { name, args }), query));
        }
        let mut visited: SmallVec<[Visited; 4]> = SmallVec::with_capacity(args.len());
        for arg in args {
            visited.push(self.visit(arg, prevailing)?);
        }
        if let Some(lowering) = Lowering::for_call(&name, visited.len(), self.config) {
            if let Some(lowered) = self.lower(lowering, &visited)? {
                return Ok((lowered, MATCH_ALL));
            }
        }
        let mut args = Vec::with_capacity(visited.len());
        let mut queries: SmallVec<[AnnotatedQuery; 4]> = SmallVec::with_capacity(visited.len());
        for (arg, q) in visited {
            let (arg, q) = self.splice(arg, q, None);
            args.push(arg);
            queries.push(q);
        }
        let policy = functions::arg_policy(&name);
        let call = FunCall { name, args };
        // a truth test holds exactly where its argument is non-empty
        let condition = match (call.builtin_name(), queries.as_slice(), call.args.as_slice()) {
            (Some("exists"), [arg], _) => Some(as_value(arg.clone()).adding(Facts::BOOLEAN_TRUE)),
            (Some("boolean"), [arg], _) if decides_truth(arg) => Some(arg.clone().adding(Facts::BOOLEAN_TRUE)),
            // only a non-empty string can contain a non-empty needle
            (Some("contains" | "starts-with" | "ends-with"), [arg, _], [_, Expr::Literal(needle)])
                if needle.text().is_some_and(|t| !t.is_empty()) =>
            {
                Some(as_value(arg.clone()).without(Facts::MINIMAL))
            }
            _ => None,
        };
        let call = Expr::FunctionCall(call);
        let result_type = call.result_type();
        let query = match (condition, policy) {
            (Some(query), _) => query.with_result_type(result_type),
            (None, ArgPolicy::Foreign) => UNINDEXED.with_result_type(result_type),
            (None, ArgPolicy::Discard) => MATCH_ALL.with_result_type(result_type),
            (None, ArgPolicy::Conjoin) => {
                let foreign = queries.iter().any(AnnotatedQuery::is_unindexed);
                let query = AnnotatedQuery::combine_all(queries.into_iter().map(as_value), Occur::Must, result_type)?;
                // nodes may come from wherever an unindexed argument's items live
                if foreign && !result_type.is_atomic() { UNINDEXED.with_result_type(result_type) } else { query }
            }
        };
        Ok((call, query))
    }

    /// Replace a whole call by a search-and-reduce primitive when its argument is exact.
    fn lower(&self, lowering: Lowering, visited: &[Visited]) -> Result<Option<Expr>> {
        let result_type = lowering.result_type();
        let call = match (lowering, visited) {
            (Lowering::Count | Lowering::Exists | Lowering::Empty, [(Expr::Search(inner), _)])
                if inner.kind == SearchKind::Search =>
            {
                SearchCall {
                    kind: lowering.primitive(),
                    query: inner.query.clone(),
                    facts: primitive_facts(inner.facts, lowering),
                    result_type,
                    sort: None,
                }
            }
            (Lowering::Count | Lowering::Exists | Lowering::Empty, [(arg, aq)]) => {
                let applies = arg.is_absolute()
                    && aq.is_minimal()
                    && !aq.is_unindexed()
                    && (lowering != Lowering::Count || aq.result_type() == ValueType::Document);
                if !applies {
                    return Ok(None);
                }
                SearchCall::new(lowering.primitive(), aq.query(), primitive_facts(aq.facts(), lowering), result_type)
            }
            (Lowering::Contains, [(arg, aq), (Expr::Literal(lit), _)]) => {
                let Some(text) = lit.text().filter(|_| arg.is_absolute() && aq.is_minimal()) else {
                    return Ok(None);
                };
                let step = match arg.last_context_step() {
                    Expr::Step(step) => Some(step),
                    _ => None,
                };
                let term = self.value_term(step, text);
                let query = AnnotatedQuery::combine_boolean(aq, Occur::Must, &term, Occur::Must, result_type)?;
                // token matching only approximates containment, so no exactness is claimed
                let facts = (query.facts() | Facts::BOOLEAN_TRUE) - Facts::MINIMAL - Facts::DOCUMENT_RESULTS;
                SearchCall::new(SearchKind::Exists, query.query(), facts, result_type)
            }
            _ => return Ok(None),
        };
        debug!(
            function = lowering.name(),
            primitive = %call.kind.function_name(),
            facts = ?call.facts,
            "function lowered to search primitive"
        );
        Ok(Some(Expr::Search(call)))
    }

    /// `exists(a) or exists(b)` and `empty(a) and empty(b)` become one existence search.
    fn merge_existence(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Option<Expr>> {
        let (Expr::Search(a), Expr::Search(b)) = (left, right) else {
            return Ok(None);
        };
        let polarity = match op {
            BinaryOp::Or => true,
            BinaryOp::And => false,
            _ => return Ok(None),
        };
        let exact = |c: &SearchCall| c.kind == SearchKind::Exists && c.sort.is_none() && c.facts.contains(Facts::MINIMAL);
        if !exact(a) || !exact(b) || !a.result_type.same_truth(b.result_type) || a.result_type.polarity() != Some(polarity) {
            return Ok(None);
        }
        let query = StructuredQuery::boolean(vec![
            Clause::should(a.structured_query()?),
            Clause::should(b.structured_query()?),
        ])?;
        debug!(query = %query, "merged existence searches");
        Ok(Some(Expr::Search(SearchCall::new(SearchKind::Exists, &query, a.facts & b.facts, a.result_type))))
    }

    fn visit_binary(&self, left: Expr, op: BinaryOp, right: Expr, prevailing: &AnnotatedQuery) -> Result<Visited> {
        let (left, lq) = self.visit(left, prevailing)?;
        let (right, rq) = self.visit(right, prevailing)?;
        if let Some(merged) = self.merge_existence(op, &left, &right)? {
            return Ok((merged, MATCH_ALL));
        }
        let (left, lq) = self.splice(left, lq, None);
        let (right, rq) = self.splice(right, rq, None);
        let promoted = lq.result_type().promote(rq.result_type());
        let (lv, rv) = (as_value(lq.clone()), as_value(rq.clone()));
        let combine = |occur, result_type| AnnotatedQuery::combine_boolean(&lv, occur, &rv, occur, result_type);
        let condition = |occur| {
            let (lc, rc) = (as_condition(lq.clone()), as_condition(rq.clone()));
            AnnotatedQuery::combine_boolean(&lc, occur, &rc, occur, ValueType::Boolean)
                .map(|q| if q.is_minimal() { q.adding(Facts::BOOLEAN_TRUE) } else { q })
        };
        let query = match op {
            BinaryOp::And => condition(Occur::Must)?,
            BinaryOp::Or => condition(Occur::Should)?,
            BinaryOp::Intersect => {
                let both_documents = lq.result_type() == ValueType::Document && rq.result_type() == ValueType::Document;
                let query = combine(Occur::Must, promoted)?;
                if both_documents {
                    query
                } else {
                    query.without(Facts::MINIMAL)
                }
            }
            BinaryOp::Union => combine(Occur::Should, promoted)?,
            // documents lacking the right operand still contribute the left operand's items
            BinaryOp::Except => lv.clone().with_result_type(promoted).without(Facts::MINIMAL),
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::IDiv | BinaryOp::Mod => {
                combine(Occur::Should, ValueType::Atomic)?.without(Facts::MINIMAL)
            }
            BinaryOp::General(_) | BinaryOp::Value(_) => combine(Occur::Should, ValueType::Boolean)?.without(Facts::MINIMAL),
            BinaryOp::Is | BinaryOp::Precedes | BinaryOp::Follows => combine(Occur::Should, promoted)?.without(Facts::MINIMAL),
        };
        Ok((Expr::binary(left, op, right), query))
    }

    fn visit_subsequence(
        &self,
        base: Expr,
        start: Expr,
        length: Option<Expr>,
        prevailing: &AnnotatedQuery,
    ) -> Result<Visited> {
        let (base, bq) = self.visit(base, prevailing)?;
        let (base, bq) = self.splice(base, as_value(bq), None);
        let (start, sq) = self.visit(start, prevailing)?;
        let (start, sq) = self.splice(start, as_value(sq), None);
        let (length, lq) = match length {
            Some(length) => {
                let (length, lq) = self.visit(length, prevailing)?;
                let (length, lq) = self.splice(length, as_value(lq), None);
                (Some(length), Some(lq))
            }
            None => (None, None),
        };
        let single_item = is_last_call(&start) || (is_integer_one(&start) && length.as_ref().is_some_and(is_integer_one));
        let query = if single_item {
            bq
        } else {
            let result_type = bq.result_type();
            let queries = std::iter::once(bq).chain(std::iter::once(sq)).chain(lq);
            AnnotatedQuery::combine_all(queries, Occur::Should, result_type)?.without(Facts::MINIMAL)
        };
        Ok((Expr::subsequence(base, start, length), query))
    }

    /// Sort string for a FLWOR whose order-by keys are all simple child or attribute steps
    /// from the first `for` variable.
    fn index_sort(clauses: &[FlworClause]) -> Option<String> {
        let Some(FlworClause::For { var, .. }) = clauses.first() else {
            return None;
        };
        let keys = clauses.iter().find_map(|c| match c {
            FlworClause::OrderBy(keys) => Some(keys),
            _ => None,
        })?;
        let mut parts = Vec::with_capacity(keys.len());
        for SortKey { key, descending, empty_greatest } in keys {
            let Expr::Path { lhs, rhs } = key else { return None };
            let (Expr::Variable(v), Expr::Step(step)) = (lhs.as_ref(), rhs.as_ref()) else {
                return None;
            };
            let name = step.test.qname()?;
            if v != var {
                return None;
            }
            let mut part = match step.axis {
                Axis::Child => name.encoded(),
                Axis::Attribute => format!("@{}", name.encoded()),
                _ => return None,
            };
            if *descending {
                part.push_str(" descending");
            }
            if *empty_greatest {
                part.push_str(" empty greatest");
            }
            parts.push(part);
        }
        if parts.is_empty() { None } else { Some(parts.join(",")) }
    }

    fn visit_flwor(&self, flwor: Flwor, prevailing: &AnnotatedQuery) -> Result<Visited> {
        let Flwor { clauses, return_expr } = flwor;
        if let Some(focus) = self.focus.filter(|v| clauses.iter().any(|c| binds(c, v))) {
            trace!(variable = %focus, "focus variable rebound");
            let query = UNINDEXED.with_result_type(return_expr.result_type());
            return Ok((Expr::Flwor(Flwor { clauses, return_expr }), query));
        }
        // restrictions only change the rewrite, so focus mode skips them
        let restrictions = if self.focus.is_some() {
            vec![MATCH_ALL; clauses.len()]
        } else {
            (0..clauses.len())
                .map(|i| self.binding_restriction(&clauses, i, &return_expr))
                .collect::<Result<Vec<_>>>()?
        };
        let mut sort = Self::index_sort(&clauses);

        let (ret, rq) = self.visit(*return_expr, prevailing)?;
        let rq = as_value(rq);
        let result_type = rq.result_type();
        let (ret, rq) = self.splice(ret, rq, None);
        let unindexed = rq.is_unindexed();

        // every tuple that returns something needs its for sequences non-empty and its
        // where conditions true
        let mut parts: SmallVec<[AnnotatedQuery; 4]> = SmallVec::new();
        parts.push(rq);
        let mut rewritten = Vec::with_capacity(clauses.len());
        for (i, (clause, restriction)) in clauses.into_iter().zip(restrictions).enumerate() {
            let clause = match clause {
                FlworClause::For { var, seq } => {
                    let clause_sort = if i == 0 { sort.take() } else { None };
                    let (seq, rest) = self.restrict_clause(seq, &restriction, clause_sort, prevailing)?;
                    parts.push(rest);
                    FlworClause::For { var, seq }
                }
                FlworClause::Let { var, seq } => {
                    let (seq, _) = self.restrict_clause(seq, &restriction, None, prevailing)?;
                    FlworClause::Let { var, seq }
                }
                FlworClause::Where(cond) => {
                    let (cond, q) = self.visit(cond, prevailing)?;
                    let (cond, q) = self.splice(cond, q, None);
                    parts.push(as_condition(q));
                    FlworClause::Where(cond)
                }
                FlworClause::OrderBy(keys) => {
                    // sort keys never restrict which documents contribute
                    let keys = keys
                        .into_iter()
                        .map(|k| Ok(SortKey { key: self.optimize_subexpression(k.key, prevailing)?, ..k }))
                        .collect::<Result<Vec<_>>>()?;
                    FlworClause::OrderBy(keys)
                }
            };
            rewritten.push(clause);
        }
        let query = if unindexed {
            UNINDEXED.with_result_type(result_type)
        } else {
            AnnotatedQuery::combine_all(parts, Occur::Must, result_type)?.without(Facts::MINIMAL)
        };
        Ok((Expr::flwor(rewritten, ret), query))
    }

    /// The constraint that `expr` places on the document of `var`'s item.
    fn constraint_on(&self, var: &QName, expr: &Expr) -> Result<AnnotatedQuery> {
        let focused = PathOptimizer { config: self.config, focus: Some(var) };
        Ok(focused.visit(expr.clone(), &UNINDEXED)?.1)
    }

    /// What every document contributing an item to the binding of clause `index` must
    /// match. A `for` item yields a tuple of its own, so the constraints of later clauses
    /// and of the return are conjoined. A `let` sequence is bound whole, and is only
    /// narrowed when nothing after it but a per-item return reads it.
    fn binding_restriction(&self, clauses: &[FlworClause], index: usize, ret: &Expr) -> Result<AnnotatedQuery> {
        let later = &clauses[index + 1..];
        let mut parts: SmallVec<[AnnotatedQuery; 4]> = SmallVec::new();
        match &clauses[index] {
            FlworClause::For { var, .. } => {
                for clause in later {
                    match clause {
                        FlworClause::For { seq, .. } => parts.push(as_value(self.constraint_on(var, seq)?)),
                        FlworClause::Where(cond) => parts.push(as_condition(self.constraint_on(var, cond)?)),
                        FlworClause::Let { .. } | FlworClause::OrderBy(_) => {}
                    }
                    if binds(clause, var) {
                        return Ok(AnnotatedQuery::combine_all(parts, Occur::Must, ValueType::Value)?);
                    }
                }
                parts.push(as_value(self.constraint_on(var, ret)?));
            }
            FlworClause::Let { var, .. } => {
                let read_later = later.iter().any(|c| match c {
                    FlworClause::For { var: v, seq } | FlworClause::Let { var: v, seq } => v == var || mentions(var, seq),
                    FlworClause::Where(cond) => mentions(var, cond),
                    FlworClause::OrderBy(keys) => keys.iter().any(|k| mentions(var, &k.key)),
                });
                if !read_later && applies_per_item(var, ret) {
                    parts.push(as_value(self.constraint_on(var, ret)?));
                }
            }
            FlworClause::Where(_) | FlworClause::OrderBy(_) => {}
        }
        Ok(AnnotatedQuery::combine_all(parts, Occur::Must, ValueType::Value)?)
    }

    /// Narrow a binding sequence by `restriction`, then splice it. A positional selection
    /// across the collection would be renumbered by narrowing, so it keeps its own query.
    fn restrict_clause(
        &self,
        expr: Expr,
        restriction: &AnnotatedQuery,
        sort: Option<String>,
        prevailing: &AnnotatedQuery,
    ) -> Result<Visited> {
        let (expr, q) = self.visit(expr, prevailing)?;
        let q = as_value(q);
        let renumbered = expr.is_absolute() && positional_over_collection(&expr);
        let narrowed = if q.is_unindexed() || restriction.is_match_all() || renumbered {
            q
        } else {
            AnnotatedQuery::combine_boolean(&q, Occur::Must, restriction, Occur::Must, q.result_type())?
        };
        let sort = sort.filter(|_| expr.is_absolute());
        Ok(self.splice(expr, narrowed, sort))
    }
}
