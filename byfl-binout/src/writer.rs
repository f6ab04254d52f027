//! Streaming writer for the binary-output format (spec.md §4.8).
//!
//! Grounded on `lib/byfl/binaryoutput.{h,cpp}`: a `BinaryOStream`
//! writes big-endian tag/length/value records to an underlying sink;
//! a null sink silently discards everything so that disabling output
//! costs nothing but the call overhead (spec.md §9 "the binary-output
//! sink likewise has two implementations... a tagged variant fits").

use std::fs::File;
use std::io::{self, BufWriter, Write};

use byteorder::{BigEndian, WriteBytesExt};

use crate::error::BinoutError;
use crate::tags::{ColumnTag, ColumnType, RowTag, TableTag, MAGIC};

/// Where a [`BinoutWriter`] sends its bytes. `Null` discards every
/// write, mirroring `BinaryOStream`'s no-op overloads.
pub enum Sink {
    Real(BufWriter<File>),
    Null,
}

impl Sink {
    pub fn file(file: File) -> Self {
        Sink::Real(BufWriter::new(file))
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Real(w) => w.write(buf),
            Sink::Null => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Real(w) => w.flush(),
            Sink::Null => Ok(()),
        }
    }
}

/// Writes one binary-output file: a magic header, then a sequence of
/// basic or key:value tables, terminated by `TableTag::None`.
///
/// Generic over the underlying sink so tests can write to an in-memory
/// buffer; [`Sink`] is the usual choice for a real run, since it also
/// covers the suppressed/null case.
pub struct BinoutWriter<W: Write> {
    sink: W,
    columns: Vec<ColumnType>,
    next_col: usize,
    in_row: bool,
}

impl<W: Write> BinoutWriter<W> {
    /// Opens a new writer and immediately emits the magic header.
    pub fn new(mut sink: W) -> Result<Self, BinoutError> {
        sink.write_all(MAGIC)?;
        Ok(BinoutWriter {
            sink,
            columns: Vec::new(),
            next_col: 0,
            in_row: false,
        })
    }

    fn write_tag(&mut self, tag: u8) -> Result<(), BinoutError> {
        self.sink.write_u8(tag)?;
        Ok(())
    }

    fn write_str(&mut self, s: &str) -> Result<(), BinoutError> {
        let bytes = s.as_bytes();
        let len: u16 = bytes
            .len()
            .try_into()
            .map_err(|_| BinoutError::format(format!("string {} bytes exceeds u16", bytes.len())))?;
        self.sink.write_u16::<BigEndian>(len)?;
        self.sink.write_all(bytes)?;
        Ok(())
    }

    pub fn begin_basic_table(&mut self, name: &str) -> Result<(), BinoutError> {
        self.write_tag(TableTag::Basic as u8)?;
        self.write_str(name)
    }

    pub fn begin_keyval_table(&mut self, name: &str) -> Result<(), BinoutError> {
        self.write_tag(TableTag::KeyVal as u8)?;
        self.write_str(name)
    }

    /// Writes one `(name, value)` pair of a key:value table. Unlike a basic
    /// table's column header, each pair carries its value inline in the
    /// stream (spec.md §4.8's key:value tables interleave column and value);
    /// there is no separate row to begin or end.
    pub fn write_keyval_uint64(&mut self, name: &str, value: u64) -> Result<(), BinoutError> {
        self.write_tag(ColumnTag::Uint64 as u8)?;
        self.write_str(name)?;
        self.sink.write_u64::<BigEndian>(value)?;
        Ok(())
    }

    pub fn write_keyval_string(&mut self, name: &str, value: &str) -> Result<(), BinoutError> {
        self.write_tag(ColumnTag::String as u8)?;
        self.write_str(name)?;
        self.write_str(value)
    }

    pub fn write_keyval_bool(&mut self, name: &str, value: bool) -> Result<(), BinoutError> {
        self.write_tag(ColumnTag::Bool as u8)?;
        self.write_str(name)?;
        self.sink.write_u8(value as u8)?;
        Ok(())
    }

    /// Terminates a key:value table's sequence of pairs. Unlike
    /// [`Self::end_table`], this writes no [`RowTag`]: a key:value table's
    /// single implicit row ends the moment its columns do.
    pub fn end_keyval_table(&mut self) -> Result<(), BinoutError> {
        self.write_tag(ColumnTag::None as u8)?;
        self.sink.flush()?;
        Ok(())
    }

    /// Writes the column-header block for a basic table:
    /// `(type, name)` pairs terminated by [`ColumnTag::None`].
    pub fn write_column_header(&mut self, columns: &[(&str, ColumnType)]) -> Result<(), BinoutError> {
        self.columns.clear();
        for &(name, ty) in columns {
            self.write_tag(ty.tag() as u8)?;
            self.write_str(name)?;
            self.columns.push(ty);
        }
        self.write_tag(ColumnTag::None as u8)?;
        Ok(())
    }

    /// Starts a data row; subsequent `write_*` calls must supply
    /// exactly the columns declared by [`Self::write_column_header`],
    /// in order.
    pub fn begin_row(&mut self) -> Result<(), BinoutError> {
        self.write_tag(RowTag::Data as u8)?;
        self.next_col = 0;
        self.in_row = true;
        Ok(())
    }

    fn expect_column(&mut self, ty: ColumnType) -> Result<(), BinoutError> {
        if !self.in_row {
            return Err(BinoutError::format("write called outside of begin_row/end_row"));
        }
        match self.columns.get(self.next_col) {
            Some(&declared) if declared == ty => {
                self.next_col += 1;
                Ok(())
            }
            Some(&declared) => Err(BinoutError::format(format!(
                "column {} expects {declared:?}, got {ty:?}",
                self.next_col
            ))),
            None => Err(BinoutError::format("too many values written for this row")),
        }
    }

    pub fn write_uint64(&mut self, value: u64) -> Result<(), BinoutError> {
        self.expect_column(ColumnType::Uint64)?;
        self.sink.write_u64::<BigEndian>(value)?;
        Ok(())
    }

    pub fn write_string(&mut self, value: &str) -> Result<(), BinoutError> {
        self.expect_column(ColumnType::String)?;
        self.write_str(value)
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), BinoutError> {
        self.expect_column(ColumnType::Bool)?;
        self.sink.write_u8(value as u8)?;
        Ok(())
    }

    pub fn end_row(&mut self) -> Result<(), BinoutError> {
        if self.next_col != self.columns.len() {
            return Err(BinoutError::format(format!(
                "row has {} of {} declared columns",
                self.next_col,
                self.columns.len()
            )));
        }
        self.in_row = false;
        Ok(())
    }

    /// Terminates the current table's row sequence.
    pub fn end_table(&mut self) -> Result<(), BinoutError> {
        self.write_tag(RowTag::None as u8)?;
        self.sink.flush()?;
        Ok(())
    }

    /// Terminates the file. A parent process that kills the
    /// instrumented program before this runs still leaves a readable
    /// prefix, since every table is flushed as it completes.
    pub fn end_file(mut self) -> Result<(), BinoutError> {
        self.write_tag(TableTag::None as u8)?;
        self.sink.flush()?;
        Ok(())
    }
}
