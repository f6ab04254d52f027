//! Tag bytes for Byfl's binary-output format, mirroring
//! `include/binarytagdefs.h`. Numeric values are part of the on-disk
//! format and must not be renumbered.

/// The 7-byte magic sequence every binary-output file begins with.
pub const MAGIC: &[u8; 7] = b"BYFLBIN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TableTag {
    /// No more tables follow (end of file).
    None = 0,
    Basic = 1,
    KeyVal = 2,
}

impl TableTag {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(TableTag::None),
            1 => Some(TableTag::Basic),
            2 => Some(TableTag::KeyVal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ColumnTag {
    /// No more column headers follow.
    None = 0,
    Uint64 = 1,
    String = 2,
    Bool = 3,
}

impl ColumnTag {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(ColumnTag::None),
            1 => Some(ColumnTag::Uint64),
            2 => Some(ColumnTag::String),
            3 => Some(ColumnTag::Bool),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RowTag {
    /// No columns in this row (end of table).
    None = 0,
    Data = 1,
}

impl RowTag {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(RowTag::None),
            1 => Some(RowTag::Data),
            _ => None,
        }
    }
}

/// A column's declared type, shared between the writer's header builder
/// and the reader's per-column callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Uint64,
    String,
    Bool,
}

impl ColumnType {
    pub(crate) fn tag(self) -> ColumnTag {
        match self {
            ColumnType::Uint64 => ColumnTag::Uint64,
            ColumnType::String => ColumnTag::String,
            ColumnType::Bool => ColumnTag::Bool,
        }
    }
}
