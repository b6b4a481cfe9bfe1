//! How function calls propagate argument constraints, and which calls can be replaced by a
//! search primitive outright.

use crate::ast::SearchKind;
use crate::config::IndexConfig;
use crate::model::{FN_NAMESPACE, QName, ValueType, XS_NAMESPACE};
use crate::query::Facts;

/// Built-ins whose result says nothing about whether their arguments were empty.
const UNCONSTRAINED: &[&str] = &["uri-collection", "unparsed-text", "generate-id", "deep-equal", "error"];

/// Built-ins that return a value even when an argument is the empty sequence.
const VALUE_ON_EMPTY: &[&str] = &[
    "boolean",
    "codepoints-to-string",
    "concat",
    "contains",
    "count",
    "doc-available",
    "empty",
    "encode-for-uri",
    "ends-with",
    "escape-html-uri",
    "exists",
    "false",
    "iri-to-uri",
    "lang",
    "last",
    "local-name",
    "lower-case",
    "matches",
    "name",
    "namespace-uri",
    "normalize-space",
    "normalize-unicode",
    "not",
    "number",
    "position",
    "replace",
    "starts-with",
    "string",
    "string-join",
    "string-length",
    "substring",
    "substring-after",
    "substring-before",
    "sum",
    "translate",
    "true",
    "upper-case",
];

/// Built-ins yielding nodes of documents other than the context's.
const FOREIGN_NODES: &[&str] = &["collection", "doc"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArgPolicy {
    /// Argument constraints are dropped.
    Discard,
    /// The result is empty whenever any argument is, so argument queries are conjoined.
    Conjoin,
    /// Argument constraints are dropped and the result items come from elsewhere, so nothing
    /// applied to them constrains the context documents.
    Foreign,
}

pub(crate) fn arg_policy(name: &QName) -> ArgPolicy {
    match name.ns_uri.as_deref() {
        None | Some(FN_NAMESPACE) => match name.local.as_str() {
            local if FOREIGN_NODES.contains(&local) => ArgPolicy::Foreign,
            local if UNCONSTRAINED.contains(&local) || VALUE_ON_EMPTY.contains(&local) => ArgPolicy::Discard,
            _ => ArgPolicy::Conjoin,
        },
        Some(XS_NAMESPACE) => ArgPolicy::Conjoin,
        // search primitives and user functions alike
        Some(_) => ArgPolicy::Foreign,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lowering {
    Count,
    Exists,
    Empty,
    Contains,
}

impl Lowering {
    pub(crate) fn for_call(name: &QName, arity: usize, config: &IndexConfig) -> Option<Self> {
        if !matches!(name.ns_uri.as_deref(), None | Some(FN_NAMESPACE)) {
            return None;
        }
        match (name.local.as_str(), arity) {
            ("count", 1) => Some(Self::Count),
            ("exists", 1) => Some(Self::Exists),
            ("empty", 1) => Some(Self::Empty),
            ("contains", 2) if config.lowers_contains() => Some(Self::Contains),
            _ => None,
        }
    }

    pub(crate) fn primitive(self) -> SearchKind {
        match self {
            Self::Count => SearchKind::Count,
            Self::Exists | Self::Empty | Self::Contains => SearchKind::Exists,
        }
    }

    pub(crate) fn fact(self) -> Facts {
        match self {
            Self::Count => Facts::COUNTING,
            Self::Exists | Self::Contains => Facts::BOOLEAN_TRUE,
            Self::Empty => Facts::BOOLEAN_FALSE,
        }
    }

    pub(crate) fn result_type(self) -> ValueType {
        match self {
            Self::Count => ValueType::Int,
            Self::Exists | Self::Contains => ValueType::Boolean,
            Self::Empty => ValueType::BooleanFalse,
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Exists => "exists",
            Self::Empty => "empty",
            Self::Contains => "contains",
        }
    }
}
