use std::fmt;

use serde::{Deserialize, Serialize};

/// Static result types of expressions.
///
/// `Value` is the top of the lattice and `Empty` the bottom. Node kinds sit below `Node`,
/// atomic kinds below `Atomic`. `BooleanFalse` is a boolean whose sense is inverted: an
/// expression of that type is true exactly when the underlying test fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Value,
    Document,
    Node,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Atomic,
    String,
    UntypedAtomic,
    Int,
    Integer,
    Decimal,
    Float,
    Double,
    Boolean,
    BooleanFalse,
    Date,
    DateTime,
    Time,
    QName,
    Empty,
}

impl ValueType {
    pub const ALL: [ValueType; 23] = [
        Self::Value,
        Self::Document,
        Self::Node,
        Self::Element,
        Self::Attribute,
        Self::Text,
        Self::Comment,
        Self::ProcessingInstruction,
        Self::Atomic,
        Self::String,
        Self::UntypedAtomic,
        Self::Int,
        Self::Integer,
        Self::Decimal,
        Self::Float,
        Self::Double,
        Self::Boolean,
        Self::BooleanFalse,
        Self::Date,
        Self::DateTime,
        Self::Time,
        Self::QName,
        Self::Empty,
    ];

    pub fn is_node(self) -> bool {
        matches!(
            self,
            Self::Document
                | Self::Node
                | Self::Element
                | Self::Attribute
                | Self::Text
                | Self::Comment
                | Self::ProcessingInstruction
        )
    }

    pub fn is_atomic(self) -> bool {
        !self.is_node() && !matches!(self, Self::Value | Self::Empty)
    }

    /// Whether a value of this type could be a number, which makes it positional when used as
    /// a predicate.
    pub fn may_be_numeric(self) -> bool {
        matches!(
            self,
            Self::Value | Self::Atomic | Self::Int | Self::Integer | Self::Decimal | Self::Float | Self::Double
        )
    }

    /// Subtype test: `self` is-a `other`.
    pub fn is(self, other: ValueType) -> bool {
        self == other
            || self == Self::Empty
            || other == Self::Value
            || (other == Self::Node && self.is_node())
            || (other == Self::Atomic && self.is_atomic())
            || (self == Self::BooleanFalse && other == Self::Boolean)
    }

    /// Least upper bound of two types.
    pub fn promote(self, other: ValueType) -> ValueType {
        if self == other || other == Self::Empty {
            return self;
        }
        if self == Self::Empty {
            return other;
        }
        if self.is(other) {
            return other;
        }
        if other.is(self) {
            return self;
        }
        if self.is_node() && other.is_node() {
            Self::Node
        } else if self.is_atomic() && other.is_atomic() {
            Self::Atomic
        } else {
            Self::Value
        }
    }

    /// Narrow `self` by `other` when one subsumes the other, else fall back to `Value`.
    pub fn restrict(self, other: ValueType) -> ValueType {
        if self.is(other) {
            self
        } else if other.is(self) {
            other
        } else {
            Self::Value
        }
    }

    /// Truth carried by a boolean-valued result: `Some(true)` for `Boolean`, `Some(false)` for the
    /// inverted `BooleanFalse`, `None` otherwise. Compare polarities through this, never by `==`
    /// on the types themselves.
    pub fn polarity(self) -> Option<bool> {
        match self {
            Self::Boolean => Some(true),
            Self::BooleanFalse => Some(false),
            _ => None,
        }
    }

    /// True when both types denote booleans that hold under the same condition.
    pub fn same_truth(self, other: ValueType) -> bool {
        matches!((self.polarity(), other.polarity()), (Some(a), Some(b)) if a == b)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Value => "item()",
            Self::Document => "document-node()",
            Self::Node => "node()",
            Self::Element => "element()",
            Self::Attribute => "attribute()",
            Self::Text => "text()",
            Self::Comment => "comment()",
            Self::ProcessingInstruction => "processing-instruction()",
            Self::Atomic => "xs:anyAtomicType",
            Self::String => "xs:string",
            Self::UntypedAtomic => "xs:untypedAtomic",
            Self::Int => "xs:int",
            Self::Integer => "xs:integer",
            Self::Decimal => "xs:decimal",
            Self::Float => "xs:float",
            Self::Double => "xs:double",
            Self::Boolean => "xs:boolean",
            Self::BooleanFalse => "xs:boolean (negated)",
            Self::Date => "xs:date",
            Self::DateTime => "xs:dateTime",
            Self::Time => "xs:time",
            Self::QName => "xs:QName",
            Self::Empty => "empty-sequence()",
        };
        f.write_str(s)
    }
}
