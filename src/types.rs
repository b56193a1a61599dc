use std::collections::HashMap;

use crate::error::StoreError;

/// The data types the store multiplexes over one path
///
/// Cross-type commands iterate these in the fixed order below; the scan
/// cursor and the per-type status maps are keyed by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Strings,
    Hashes,
    Sets,
    Lists,
}

/// Iteration order for cross-type commands
pub const DATA_TYPES: [DataType; 4] = [
    DataType::Strings,
    DataType::Hashes,
    DataType::Sets,
    DataType::Lists,
];

impl DataType {
    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            DataType::Strings => "strings",
            DataType::Hashes => "hashes",
            DataType::Sets => "sets",
            DataType::Lists => "lists",
        }
    }

    /// One-byte tag used in scan cursors
    pub fn tag(&self) -> u8 {
        match self {
            DataType::Strings => b'k',
            DataType::Hashes => b'h',
            DataType::Sets => b's',
            DataType::Lists => b'l',
        }
    }

    /// Reverse of [`tag`](Self::tag)
    pub fn from_tag(tag: u8) -> Option<DataType> {
        match tag {
            b'k' => Some(DataType::Strings),
            b'h' => Some(DataType::Hashes),
            b's' => Some(DataType::Sets),
            b'l' => Some(DataType::Lists),
            _ => None,
        }
    }
}

/// Per-type status produced by cross-type lifecycle commands
pub type TypeStatusMap = HashMap<DataType, Option<StoreError>>;

/// A key/value pair for batch string writes
#[derive(Debug, Clone)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// A field/value pair for batch hash writes
#[derive(Debug, Clone)]
pub struct FieldValue {
    pub field: Vec<u8>,
    pub value: Vec<u8>,
}

/// Bitwise operation selector for BitOp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOpType {
    And,
    Or,
    Xor,
    Not,
}

/// Where LInsert places the new element relative to the pivot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Before,
    After,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags_round_trip() {
        for ty in DATA_TYPES {
            assert_eq!(DataType::from_tag(ty.tag()), Some(ty));
        }
        assert_eq!(DataType::from_tag(b'z'), None);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(DataType::Strings.type_name(), "strings");
        assert_eq!(DataType::Lists.type_name(), "lists");
    }
}
