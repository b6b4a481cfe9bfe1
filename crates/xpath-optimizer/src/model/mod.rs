//! Names and the static type lattice shared by the expression tree and the query algebra.

mod value_type;

pub use value_type::ValueType;

use std::fmt;

pub const FN_NAMESPACE: &str = "http://www.w3.org/2005/xpath-functions";
pub const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
/// Namespace of the inserted search primitives.
pub const SEARCH_NAMESPACE: &str = "urn:xpath-optimizer:search";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
    pub ns_uri: Option<String>,
}

impl QName {
    pub fn local(local: impl Into<String>) -> Self {
        Self { prefix: None, local: local.into(), ns_uri: None }
    }

    pub fn with_ns(prefix: Option<&str>, local: impl Into<String>, ns_uri: impl Into<String>) -> Self {
        Self { prefix: prefix.map(str::to_string), local: local.into(), ns_uri: Some(ns_uri.into()) }
    }

    /// Name of a built-in function (`fn:` namespace).
    pub fn function(local: impl Into<String>) -> Self {
        Self::with_ns(Some("fn"), local, FN_NAMESPACE)
    }

    /// The form written into index terms: `local`, or `local{uri}` for names in a namespace.
    pub fn encoded(&self) -> String {
        match &self.ns_uri {
            Some(uri) if !uri.is_empty() => format!("{}{{{uri}}}", self.local),
            _ => self.local.clone(),
        }
    }

    pub fn is_in(&self, ns_uri: &str) -> bool {
        self.ns_uri.as_deref() == Some(ns_uri)
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(p) => write!(f, "{p}:{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}
