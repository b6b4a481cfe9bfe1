//! Tree form of structured queries.
//!
//! The element vocabulary follows the XML query syntax understood by Lucene-style engines:
//! `BooleanQuery`/`Clause`, `TermQuery`, `SpanTerm`, `SpanNear` and `MatchAllDocsQuery`.

use std::fmt::{self, Write};

use super::{Clause, Occur, StructuredQuery, Term};
use crate::error::QueryError;

const BOOLEAN: &str = "BooleanQuery";
const CLAUSE: &str = "Clause";
const TERM: &str = "TermQuery";
const SPAN_TERM: &str = "SpanTerm";
const SPAN_NEAR: &str = "SpanNear";
const MATCH_ALL: &str = "MatchAllDocsQuery";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<QueryElement>,
    pub text: Option<String>,
}

impl QueryElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attributes: Vec::new(), children: Vec::new(), text: None }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: QueryElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    fn required_attr(&self, name: &str) -> Result<&str, QueryError> {
        self.attr(name).ok_or_else(|| QueryError::MissingAttribute {
            element: self.name.clone(),
            attribute: name.to_string(),
        })
    }
}

fn escape(f: &mut fmt::Formatter<'_>, s: &str, in_attr: bool) -> fmt::Result {
    for c in s.chars() {
        match c {
            '&' => f.write_str("&amp;")?,
            '<' => f.write_str("&lt;")?,
            '>' => f.write_str("&gt;")?,
            '"' if in_attr => f.write_str("&quot;")?,
            _ => f.write_char(c)?,
        }
    }
    Ok(())
}

impl fmt::Display for QueryElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        for (name, value) in &self.attributes {
            write!(f, " {name}=\"")?;
            escape(f, value, true)?;
            f.write_char('"')?;
        }
        if self.children.is_empty() && self.text.is_none() {
            return f.write_str("/>");
        }
        f.write_char('>')?;
        if let Some(text) = &self.text {
            escape(f, text, false)?;
        }
        for child in &self.children {
            write!(f, "{child}")?;
        }
        write!(f, "</{}>", self.name)
    }
}

fn term_element(name: &str, term: &Term) -> QueryElement {
    QueryElement::new(name).with_attr("fieldName", term.field.clone()).with_text(term.text.clone())
}

pub(super) fn to_element(query: &StructuredQuery) -> QueryElement {
    match query.flattened() {
        StructuredQuery::MatchAll => QueryElement::new(MATCH_ALL),
        StructuredQuery::Term(t) => term_element(TERM, t),
        StructuredQuery::SpanTerm(t) => term_element(SPAN_TERM, t),
        StructuredQuery::SpanNear(span) => span.clauses().iter().fold(
            QueryElement::new(SPAN_NEAR)
                .with_attr("slop", span.slop.to_string())
                .with_attr("inOrder", span.in_order.to_string()),
            |el, c| el.with_child(to_element(c)),
        ),
        StructuredQuery::Boolean(b) => b.clauses().iter().fold(QueryElement::new(BOOLEAN), |el, c| {
            el.with_child(QueryElement::new(CLAUSE).with_attr("occurs", c.occur.as_attr()).with_child(to_element(&c.query)))
        }),
    }
}

fn element_term(el: &QueryElement) -> Result<Term, QueryError> {
    Ok(Term::new(el.required_attr("fieldName")?, el.text.clone().unwrap_or_default()))
}

pub(super) fn from_element(el: &QueryElement) -> Result<StructuredQuery, QueryError> {
    match el.name.as_str() {
        MATCH_ALL => Ok(StructuredQuery::MatchAll),
        TERM => element_term(el).map(StructuredQuery::Term),
        SPAN_TERM => element_term(el).map(StructuredQuery::SpanTerm),
        SPAN_NEAR => {
            let slop = el.required_attr("slop")?;
            let slop = slop.parse().map_err(|_| QueryError::InvalidAttribute {
                attribute: "slop".to_string(),
                value: slop.to_string(),
            })?;
            let in_order = match el.attr("inOrder") {
                None | Some("true") => true,
                Some("false") => false,
                Some(other) => {
                    return Err(QueryError::InvalidAttribute {
                        attribute: "inOrder".to_string(),
                        value: other.to_string(),
                    });
                }
            };
            let clauses = el.children.iter().map(from_element).collect::<Result<Vec<_>, _>>()?;
            StructuredQuery::span_near(clauses, slop, in_order)
        }
        BOOLEAN => {
            let mut clauses = Vec::with_capacity(el.children.len());
            for child in &el.children {
                if child.name != CLAUSE {
                    return Err(QueryError::UnknownElement(child.name.clone()));
                }
                let occur = match child.attr("occurs") {
                    None => Occur::Should,
                    Some(v) => Occur::from_attr(v).ok_or_else(|| QueryError::InvalidAttribute {
                        attribute: "occurs".to_string(),
                        value: v.to_string(),
                    })?,
                };
                let inner = child.children.first().ok_or(QueryError::EmptyBoolean)?;
                clauses.push(Clause::new(occur, from_element(inner)?));
            }
            StructuredQuery::boolean(clauses)
        }
        other => Err(QueryError::UnknownElement(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_boolean_tree() {
        let q = StructuredQuery::boolean(vec![
            Clause::must(StructuredQuery::term("elt_name", "foo")),
            Clause::must(StructuredQuery::term("att_name", "id")),
        ])
        .unwrap();
        assert_eq!(
            q.to_element().to_string(),
            r#"<BooleanQuery><Clause occurs="must"><TermQuery fieldName="elt_name">foo</TermQuery></Clause><Clause occurs="must"><TermQuery fieldName="att_name">id</TermQuery></Clause></BooleanQuery>"#
        );
    }

    #[test]
    fn single_must_clause_renders_as_clause() {
        let term = StructuredQuery::term("elt_name", "foo");
        let q = StructuredQuery::boolean(vec![Clause::must(term.clone())]).unwrap();
        assert_eq!(q.to_element(), term.to_element());
    }

    #[test]
    fn escapes_text() {
        let el = StructuredQuery::term("elt_text", "a<b & \"c\"").to_element();
        assert_eq!(el.to_string(), r#"<TermQuery fieldName="elt_text">a&lt;b &amp; "c"</TermQuery>"#);
    }

    #[test]
    fn rejects_unknown_elements() {
        let el = QueryElement::new("RegexpQuery");
        assert_eq!(StructuredQuery::from_element(&el), Err(QueryError::UnknownElement("RegexpQuery".into())));
        let bad = QueryElement::new(SPAN_NEAR).with_attr("slop", "-1");
        assert!(matches!(StructuredQuery::from_element(&bad), Err(QueryError::InvalidAttribute { .. })));
    }
}
