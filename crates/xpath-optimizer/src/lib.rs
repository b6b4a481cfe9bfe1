pub mod ast;
pub mod compiler;
pub mod config;
pub mod error;
pub mod model;
pub mod query;

pub use ast::{Axis, BinaryOp, Expr, FlworClause, Literal, NodeTest, SearchCall, SearchKind};
pub use compiler::doc_order::{assert_document_order, elide_document_sorts};
pub use compiler::{Optimized, PathOptimizer, optimize, optimize_with_config};
pub use config::{ContainsPolicy, IndexConfig, IndexField, IndexOptions};
pub use error::{Error, QueryError, Result};
pub use model::{QName, ValueType};
pub use query::{AnnotatedQuery, Facts, MATCH_ALL, Occur, StructuredQuery, UNINDEXED};
