//! Structured index queries and their annotated wrappers.
//!
//! A [`StructuredQuery`] is what the search engine executes. Boolean combinations are
//! kept normalized: a combination never nests another combination whose clauses all share
//! the occurrence of the enclosing clause, and a combination of exactly one MUST clause
//! serializes as that clause alone.

mod annotated;
mod display;
mod parser;
mod xml;

pub use annotated::{AnnotatedQuery, Facts, MATCH_ALL, UNINDEXED};
pub use parser::QueryParser;
pub use xml::QueryElement;

use crate::error::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occur {
    Must,
    Should,
    MustNot,
}

impl Occur {
    /// Value of the `occurs` attribute in the tree form.
    pub fn as_attr(self) -> &'static str {
        match self {
            Self::Must => "must",
            Self::Should => "should",
            Self::MustNot => "mustNot",
        }
    }

    pub fn from_attr(value: &str) -> Option<Self> {
        match value {
            "must" => Some(Self::Must),
            "should" => Some(Self::Should),
            "mustNot" => Some(Self::MustNot),
            _ => None,
        }
    }

    pub(crate) fn prefix(self) -> &'static str {
        match self {
            Self::Must => "+",
            Self::Should => "",
            Self::MustNot => "-",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Term {
    pub field: String,
    pub text: String,
}

impl Term {
    pub fn new(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self { field: field.into(), text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Clause {
    pub occur: Occur,
    pub query: StructuredQuery,
}

impl Clause {
    pub fn new(occur: Occur, query: StructuredQuery) -> Self {
        Self { occur, query }
    }

    pub fn must(query: StructuredQuery) -> Self {
        Self::new(Occur::Must, query)
    }

    pub fn should(query: StructuredQuery) -> Self {
        Self::new(Occur::Should, query)
    }

    pub fn must_not(query: StructuredQuery) -> Self {
        Self::new(Occur::MustNot, query)
    }
}

/// A normalized, non-empty list of boolean clauses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BooleanQuery {
    clauses: Vec<Clause>,
}

impl BooleanQuery {
    /// Build a combination, splicing in nested combinations whose clauses all carry the
    /// occurrence of the clause that wraps them.
    pub fn new(clauses: Vec<Clause>) -> Result<Self, QueryError> {
        if clauses.is_empty() {
            return Err(QueryError::EmptyBoolean);
        }
        let mut merged = Vec::with_capacity(clauses.len());
        for Clause { occur, query } in clauses {
            match query.into_flattened() {
                StructuredQuery::Boolean(inner)
                    if occur != Occur::MustNot && inner.clauses.iter().all(|c| c.occur == occur) =>
                {
                    merged.extend(inner.clauses);
                }
                query => merged.push(Clause { occur, query }),
            }
        }
        Ok(Self { clauses: merged })
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// The sole clause when this combination is equivalent to it: a lone MUST, or a lone
    /// SHOULD, which must then match.
    pub fn sole_clause(&self) -> Option<&StructuredQuery> {
        match self.clauses.as_slice() {
            [Clause { occur: Occur::Must | Occur::Should, query }] => Some(query),
            _ => None,
        }
    }
}

/// Ordered or unordered proximity match over span-capable clauses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpanNear {
    clauses: Vec<StructuredQuery>,
    pub slop: u32,
    pub in_order: bool,
}

impl SpanNear {
    pub fn new(clauses: Vec<StructuredQuery>, slop: u32, in_order: bool) -> Result<Self, QueryError> {
        if clauses.is_empty() {
            return Err(QueryError::EmptySpan);
        }
        if let Some(bad) = clauses.iter().find(|c| !c.is_span()) {
            return Err(QueryError::NotSpanQuery(bad.to_string()));
        }
        Ok(Self { clauses, slop, in_order })
    }

    pub fn clauses(&self) -> &[StructuredQuery] {
        &self.clauses
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StructuredQuery {
    MatchAll,
    Term(Term),
    SpanTerm(Term),
    SpanNear(SpanNear),
    Boolean(BooleanQuery),
}

impl StructuredQuery {
    pub fn term(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Term(Term::new(field, text))
    }

    pub fn span_term(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::SpanTerm(Term::new(field, text))
    }

    pub fn boolean(clauses: Vec<Clause>) -> Result<Self, QueryError> {
        BooleanQuery::new(clauses).map(Self::Boolean)
    }

    pub fn span_near(clauses: Vec<StructuredQuery>, slop: u32, in_order: bool) -> Result<Self, QueryError> {
        SpanNear::new(clauses, slop, in_order).map(Self::SpanNear)
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self.flattened(), Self::MatchAll)
    }

    /// Span queries can take part in proximity combinations.
    pub fn is_span(&self) -> bool {
        matches!(self.flattened(), Self::SpanTerm(_) | Self::SpanNear(_))
    }

    /// Strip boolean wrappers around a single MUST or SHOULD clause.
    pub fn flattened(&self) -> &StructuredQuery {
        let mut q = self;
        while let Self::Boolean(b) = q {
            match b.sole_clause() {
                Some(inner) => q = inner,
                None => break,
            }
        }
        q
    }

    pub fn into_flattened(self) -> StructuredQuery {
        match self {
            Self::Boolean(b) if b.sole_clause().is_some() => {
                let mut clauses = b.clauses;
                match clauses.pop() {
                    Some(clause) => clause.query.into_flattened(),
                    None => Self::MatchAll,
                }
            }
            other => other,
        }
    }

    /// Parse the flat string form.
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        QueryParser::parse_query(input)
    }

    pub fn to_element(&self) -> QueryElement {
        xml::to_element(self)
    }

    /// Parse the tree form.
    pub fn from_element(element: &QueryElement) -> Result<Self, QueryError> {
        xml::from_element(element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(text: &str) -> StructuredQuery {
        StructuredQuery::term("elt_name", text)
    }

    #[test]
    fn empty_boolean_is_rejected() {
        assert_eq!(StructuredQuery::boolean(vec![]), Err(QueryError::EmptyBoolean));
    }

    #[test]
    fn nested_must_clauses_merge() {
        let inner = StructuredQuery::boolean(vec![Clause::must(t("a")), Clause::must(t("b"))]).unwrap();
        let outer = StructuredQuery::boolean(vec![Clause::must(inner), Clause::must(t("c"))]).unwrap();
        let StructuredQuery::Boolean(b) = outer else { panic!("expected boolean") };
        assert_eq!(b.clauses().len(), 3);
    }

    #[test]
    fn mixed_occurrence_stays_nested() {
        let inner = StructuredQuery::boolean(vec![Clause::should(t("a")), Clause::should(t("b"))]).unwrap();
        let outer = StructuredQuery::boolean(vec![Clause::must(inner), Clause::must(t("c"))]).unwrap();
        let StructuredQuery::Boolean(b) = outer else { panic!("expected boolean") };
        assert_eq!(b.clauses().len(), 2);
    }

    #[test]
    fn span_near_rejects_plain_terms() {
        let err = StructuredQuery::span_near(vec![t("a")], 0, true).unwrap_err();
        assert!(matches!(err, QueryError::NotSpanQuery(_)));
    }
}
