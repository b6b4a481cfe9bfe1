//! Flat string form: `+field:a field:b -(x:y x:z)`.

use std::fmt::{self, Write};

use super::{StructuredQuery, Term};

const SPECIAL: &[char] = &['+', '-', '(', ')', '[', ']', ',', '"', ':', '\\', '*', '{', '}'];

fn needs_quotes(text: &str) -> bool {
    text.is_empty() || text.chars().any(|c| c.is_whitespace() || SPECIAL.contains(&c))
}

/// Field names print bare only when they are plain identifiers.
fn field_needs_quotes(field: &str) -> bool {
    field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn write_quoted(f: &mut fmt::Formatter<'_>, raw: &str) -> fmt::Result {
    f.write_char('"')?;
    for c in raw.chars() {
        if c == '"' || c == '\\' {
            f.write_char('\\')?;
        }
        f.write_char(c)?;
    }
    f.write_char('"')
}

fn write_term(f: &mut fmt::Formatter<'_>, term: &Term) -> fmt::Result {
    if field_needs_quotes(&term.field) {
        write_quoted(f, &term.field)?;
    } else {
        f.write_str(&term.field)?;
    }
    f.write_char(':')?;
    if needs_quotes(&term.text) { write_quoted(f, &term.text) } else { f.write_str(&term.text) }
}

impl fmt::Display for StructuredQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.flattened() {
            StructuredQuery::MatchAll => f.write_str("*:*"),
            StructuredQuery::Term(t) | StructuredQuery::SpanTerm(t) => write_term(f, t),
            StructuredQuery::SpanNear(span) => {
                f.write_str("spanNear([")?;
                for (i, clause) in span.clauses().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{clause}")?;
                }
                write!(f, "], {}, {})", span.slop, span.in_order)
            }
            StructuredQuery::Boolean(b) => {
                for (i, clause) in b.clauses().iter().enumerate() {
                    if i > 0 {
                        f.write_char(' ')?;
                    }
                    f.write_str(clause.occur.prefix())?;
                    if matches!(clause.query.flattened(), StructuredQuery::Boolean(_)) {
                        write!(f, "({})", clause.query)?;
                    } else {
                        write!(f, "{}", clause.query)?;
                    }
                }
                Ok(())
            }
        }
    }
}
