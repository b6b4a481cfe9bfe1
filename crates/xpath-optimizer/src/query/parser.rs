use pest::Parser;
use pest::iterators::Pair;

use super::{Clause, Occur, StructuredQuery};
use crate::error::QueryError;

#[derive(pest_derive::Parser)]
#[grammar = "query/query.pest"]
pub struct QueryParser;

fn syntax(message: impl Into<String>) -> QueryError {
    QueryError::Syntax(message.into())
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

impl QueryParser {
    /// Parse the flat string form back into a structured query.
    pub fn parse_query(input: &str) -> Result<StructuredQuery, QueryError> {
        let mut pairs = Self::parse(Rule::query, input).map_err(|e| syntax(e.to_string()))?;
        let root = pairs.next().ok_or_else(|| syntax("empty input"))?;
        let clauses = root
            .into_inner()
            .find(|p| p.as_rule() == Rule::clauses)
            .ok_or_else(|| syntax("expected at least one clause"))?;
        Self::build_clauses(clauses)
    }

    fn build_clauses(pair: Pair<Rule>) -> Result<StructuredQuery, QueryError> {
        let mut clauses = Vec::new();
        let mut bare_single = false;
        for clause in pair.into_inner() {
            let mut occur = None;
            let mut query = None;
            for part in clause.into_inner() {
                match part.as_rule() {
                    Rule::occur => {
                        occur = Some(if part.as_str() == "+" { Occur::Must } else { Occur::MustNot });
                    }
                    _ => query = Some(Self::build_primary(part)?),
                }
            }
            let query = query.ok_or_else(|| syntax("clause without query"))?;
            bare_single = occur.is_none();
            clauses.push(Clause::new(occur.unwrap_or(Occur::Should), query));
        }
        if clauses.len() == 1 && bare_single {
            if let Some(clause) = clauses.pop() {
                return Ok(clause.query);
            }
        }
        StructuredQuery::boolean(clauses)
    }

    fn build_primary(pair: Pair<Rule>) -> Result<StructuredQuery, QueryError> {
        match pair.as_rule() {
            Rule::match_all => Ok(StructuredQuery::MatchAll),
            Rule::group => {
                let inner = pair.into_inner().next().ok_or_else(|| syntax("empty group"))?;
                Self::build_clauses(inner)
            }
            Rule::term => {
                let (field, text) = Self::term_parts(pair)?;
                Ok(StructuredQuery::term(field, text))
            }
            Rule::span_near => Self::build_span(pair),
            other => Err(syntax(format!("unexpected {other:?}"))),
        }
    }

    fn term_parts(pair: Pair<Rule>) -> Result<(String, String), QueryError> {
        let mut field = None;
        let mut text = None;
        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::field => {
                    let inner = part.into_inner().next().ok_or_else(|| syntax("empty field"))?;
                    field = Some(match inner.as_rule() {
                        Rule::quoted => unescape(inner.into_inner().next().map_or("", |p| p.as_str())),
                        _ => inner.as_str().to_string(),
                    });
                }
                Rule::bare => text = Some(part.as_str().to_string()),
                Rule::quoted => {
                    let inner = part.into_inner().next().map_or("", |p| p.as_str());
                    text = Some(unescape(inner));
                }
                _ => {}
            }
        }
        match (field, text) {
            (Some(f), Some(t)) => Ok((f, t)),
            _ => Err(syntax("malformed term")),
        }
    }

    fn build_span(pair: Pair<Rule>) -> Result<StructuredQuery, QueryError> {
        let mut clauses = Vec::new();
        let mut slop = 0;
        let mut in_order = true;
        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::span_list => {
                    for item in part.into_inner() {
                        clauses.push(match item.as_rule() {
                            Rule::term => {
                                let (field, text) = Self::term_parts(item)?;
                                StructuredQuery::span_term(field, text)
                            }
                            _ => Self::build_span(item)?,
                        });
                    }
                }
                Rule::slop => {
                    slop = part.as_str().parse().map_err(|_| syntax(format!("bad slop {}", part.as_str())))?;
                }
                Rule::in_order => in_order = part.as_str() == "true",
                _ => {}
            }
        }
        StructuredQuery::span_near(clauses, slop, in_order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(s: &str) {
        let q = StructuredQuery::parse(s).unwrap();
        assert_eq!(q.to_string(), s);
    }

    #[test]
    fn parses_printed_forms() {
        roundtrip("elt_name:foo");
        roundtrip("+elt_name:foo +att_name:id");
        roundtrip("elt_name:foo elt_name:bar");
        roundtrip("+(f:a f:b) -f:c");
        roundtrip("*:*");
        roundtrip(r#"elt_text:"bar:some \"quoted\" text""#);
        roundtrip("spanNear([path:ACT, spanNear([path:SCENE, path:@id], 0, true)], 1, true)");
        roundtrip(r#"+"elt-name":foo "my field":bar"#);
    }

    #[test]
    fn unusual_field_names_survive_reparsing() {
        let q = StructuredQuery::term("elt-name", "foo");
        assert_eq!(q.to_string(), r#""elt-name":foo"#);
        assert_eq!(StructuredQuery::parse(&q.to_string()).unwrap(), q);
    }

    #[test]
    fn single_should_clause_is_the_clause() {
        assert_eq!(StructuredQuery::parse("f:a").unwrap(), StructuredQuery::term("f", "a"));
        assert_eq!(StructuredQuery::parse("(f:a)").unwrap(), StructuredQuery::term("f", "a"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(StructuredQuery::parse("+(f:a"), Err(QueryError::Syntax(_))));
        assert!(matches!(StructuredQuery::parse(""), Err(QueryError::Syntax(_))));
    }
}
