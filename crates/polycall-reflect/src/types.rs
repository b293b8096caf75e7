//! Value tag enumeration.
//!
//! The numeric id of every tag is part of the boundary contract: ids are
//! stable and must be preserved bit-for-bit whenever a tag is persisted or
//! transmitted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The tag of a [`Value`](crate::Value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Type {
    Bool = 0,
    Char = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    Float = 5,
    Double = 6,
    String = 7,
    Buffer = 8,
    Array = 9,
    Map = 10,
    Pointer = 11,
    Future = 12,
    Function = 13,
    Null = 14,
    Class = 15,
    Object = 16,
    Exception = 17,
    Throwable = 18,
}

impl Type {
    /// Number of tags.
    pub const COUNT: usize = 19;

    /// Every tag in id order.
    pub const ALL: [Type; Type::COUNT] = [
        Type::Bool,
        Type::Char,
        Type::Short,
        Type::Int,
        Type::Long,
        Type::Float,
        Type::Double,
        Type::String,
        Type::Buffer,
        Type::Array,
        Type::Map,
        Type::Pointer,
        Type::Future,
        Type::Function,
        Type::Null,
        Type::Class,
        Type::Object,
        Type::Exception,
        Type::Throwable,
    ];

    /// Stable numeric id of the tag.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Look a tag up by its numeric id.
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Tag name as used in logs and guest descriptions.
    pub fn name(self) -> &'static str {
        match self {
            Type::Bool => "Bool",
            Type::Char => "Char",
            Type::Short => "Short",
            Type::Int => "Int",
            Type::Long => "Long",
            Type::Float => "Float",
            Type::Double => "Double",
            Type::String => "String",
            Type::Buffer => "Buffer",
            Type::Array => "Array",
            Type::Map => "Map",
            Type::Pointer => "Pointer",
            Type::Future => "Future",
            Type::Function => "Function",
            Type::Null => "Null",
            Type::Class => "Class",
            Type::Object => "Object",
            Type::Exception => "Exception",
            Type::Throwable => "Throwable",
        }
    }

    /// Bool, Char and the integer and floating point tags.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Type::Bool
                | Type::Char
                | Type::Short
                | Type::Int
                | Type::Long
                | Type::Float
                | Type::Double
        )
    }

    /// Tags that own other values.
    pub fn is_composite(self) -> bool {
        matches!(self, Type::Array | Type::Map)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a tag name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown type name: {0}")]
pub struct UnknownType(pub String);

impl FromStr for Type {
    type Err = UnknownType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|ty| ty.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownType(s.to_string()))
    }
}
