use bitflags::bitflags;

use super::{Clause, Occur, StructuredQuery};
use crate::error::QueryError;
use crate::model::ValueType;

bitflags! {
    /// Static facts about the expression an [`AnnotatedQuery`] was derived from.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Facts: u32 {
        /// Every matching document yields at least one result.
        const MINIMAL = 1;
        /// The expression counts document-level matches.
        const COUNTING = 1 << 1;
        /// The expression is a truth value that holds when the query matches.
        const BOOLEAN_TRUE = 1 << 2;
        /// The expression is a truth value that holds when the query does not match.
        const BOOLEAN_FALSE = 1 << 3;
        /// Result items are whole documents.
        const DOCUMENT_RESULTS = 1 << 4;
    }
}

/// A structured query paired with the result type and facts of the sub-expression it bounds.
///
/// Values are immutable; every adjustment returns a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedQuery {
    query: StructuredQuery,
    result_type: ValueType,
    facts: Facts,
    unindexed: bool,
}

/// No constraint and no known facts.
pub const MATCH_ALL: AnnotatedQuery = AnnotatedQuery {
    query: StructuredQuery::MatchAll,
    result_type: ValueType::Value,
    facts: Facts::empty(),
    unindexed: false,
};

/// Same content as [`MATCH_ALL`], marking an expression that must not be searched through,
/// such as a variable reference.
pub const UNINDEXED: AnnotatedQuery = AnnotatedQuery {
    query: StructuredQuery::MatchAll,
    result_type: ValueType::Value,
    facts: Facts::empty(),
    unindexed: true,
};

fn normalize(facts: Facts, result_type: ValueType) -> Facts {
    let mut facts = facts;
    facts.set(Facts::DOCUMENT_RESULTS, result_type == ValueType::Document);
    facts
}

impl AnnotatedQuery {
    pub fn new(query: StructuredQuery, facts: Facts, result_type: ValueType) -> Self {
        Self { query: query.into_flattened(), result_type, facts: normalize(facts, result_type), unindexed: false }
    }

    /// The match-all query carrying the given facts and type.
    pub fn match_all(facts: Facts, result_type: ValueType) -> Self {
        Self::new(StructuredQuery::MatchAll, facts, result_type)
    }

    pub fn query(&self) -> &StructuredQuery {
        &self.query
    }

    pub fn result_type(&self) -> ValueType {
        self.result_type
    }

    pub fn facts(&self) -> Facts {
        self.facts
    }

    pub fn has(&self, facts: Facts) -> bool {
        self.facts.contains(facts)
    }

    pub fn is_minimal(&self) -> bool {
        self.has(Facts::MINIMAL)
    }

    pub fn is_match_all(&self) -> bool {
        self.query.is_match_all()
    }

    pub fn is_unindexed(&self) -> bool {
        self.unindexed
    }

    pub fn with_result_type(mut self, result_type: ValueType) -> Self {
        self.result_type = result_type;
        self.facts = normalize(self.facts, result_type);
        self
    }

    pub fn with_facts(mut self, facts: Facts) -> Self {
        self.facts = normalize(facts, self.result_type);
        self
    }

    pub fn adding(self, facts: Facts) -> Self {
        let f = self.facts | facts;
        self.with_facts(f)
    }

    pub fn without(self, facts: Facts) -> Self {
        let f = self.facts - facts;
        self.with_facts(f)
    }

    /// Boolean combination of two annotated queries.
    ///
    /// MUST with a match-all operand yields the other operand's content; SHOULD with a
    /// match-all operand matches everything. Facts are intersected.
    pub fn combine_boolean(
        left: &AnnotatedQuery,
        occur_left: Occur,
        right: &AnnotatedQuery,
        occur_right: Occur,
        result_type: ValueType,
    ) -> Result<AnnotatedQuery, QueryError> {
        let facts = left.facts & right.facts;
        let query = match (occur_left, occur_right) {
            (Occur::Must, Occur::Must) if left.is_match_all() => right.query.clone(),
            (Occur::Must, Occur::Must) if right.is_match_all() => left.query.clone(),
            (Occur::Should, Occur::Should) if left.is_match_all() || right.is_match_all() => StructuredQuery::MatchAll,
            _ => StructuredQuery::boolean(vec![
                Clause::new(occur_left, left.query.clone()),
                Clause::new(occur_right, right.query.clone()),
            ])?,
        };
        let mut combined = Self::new(query, facts, result_type);
        combined.unindexed = combined.is_match_all() && (left.unindexed || right.unindexed);
        Ok(combined)
    }

    /// Ordered proximity combination of `left` followed by `right` within `slop` positions.
    ///
    /// `None` slop, a match-all operand, or an operand that is not a span query falls back to
    /// [`AnnotatedQuery::combine_boolean`] with `occur` on both sides.
    pub fn combine_span(
        left: &AnnotatedQuery,
        right: &AnnotatedQuery,
        occur: Occur,
        result_type: ValueType,
        slop: Option<u32>,
    ) -> Result<AnnotatedQuery, QueryError> {
        let spannable = !left.is_match_all() && !right.is_match_all() && left.query.is_span() && right.query.is_span();
        match slop {
            Some(slop) if spannable => {
                let query = StructuredQuery::span_near(vec![left.query.clone(), right.query.clone()], slop, true)?;
                Ok(Self::new(query, left.facts & right.facts, result_type))
            }
            _ => Self::combine_boolean(left, occur, right, occur, result_type),
        }
    }

    /// Combine any number of queries with one occurrence. Zero queries give [`MATCH_ALL`];
    /// a single query is only re-typed.
    pub fn combine_all<I>(queries: I, occur: Occur, result_type: ValueType) -> Result<AnnotatedQuery, QueryError>
    where
        I: IntoIterator<Item = AnnotatedQuery>,
    {
        let mut iter = queries.into_iter();
        let Some(first) = iter.next() else {
            return Ok(MATCH_ALL.with_result_type(result_type));
        };
        let mut acc = first.with_result_type(result_type);
        for next in iter {
            acc = Self::combine_boolean(&acc, occur, &next, occur, result_type)?;
        }
        Ok(acc)
    }
}
