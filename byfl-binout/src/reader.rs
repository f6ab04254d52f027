//! Streaming parser for the binary-output format (spec.md §4.8).
//!
//! Grounded on `tools/postproc/parsebfbin.c`'s `bf_process_byfl_file`:
//! a single entry point drives a state machine over the file, invoking
//! callbacks for every structural event. The original uses `setjmp`/
//! `longjmp` to unwind to one error handler (spec.md §9 "exceptions for
//! control flow... reimplement as an explicit result type threaded
//! through the reader"); here every read returns a `Result` instead,
//! and `?` does the unwinding.
//!
//! In live-tail mode (`live = true`) a short read at EOF is not an
//! error: the reader sleeps with exponential backoff (1s, 2s, 4s, ...,
//! capped at 32s) and retries, so a tool can follow a writer that is
//! still appending tables.

use std::io::Read;
use std::thread;
use std::time::Duration;

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::BinoutError;
use crate::tags::{ColumnTag, RowTag, TableTag};

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(32);

/// Callbacks invoked while parsing a binary-output file. All methods
/// have no-op default bodies, so a consumer only overrides the events
/// it cares about. Mirrors `bfbin_callback_t`.
pub trait ParseCallbacks {
    fn file_begin(&mut self) {}
    fn error(&mut self, _message: &str) {}
    fn table_basic_begin(&mut self, _name: &str) {}
    fn table_keyval_begin(&mut self, _name: &str) {}
    fn table_end(&mut self) {}
    fn column_begin(&mut self) {}
    fn column_uint64(&mut self, _name: &str) {}
    fn column_string(&mut self, _name: &str) {}
    fn column_bool(&mut self, _name: &str) {}
    fn column_end(&mut self) {}
    fn row_begin(&mut self) {}
    fn data_uint64(&mut self, _value: u64) {}
    fn data_string(&mut self, _value: &str) {}
    fn data_bool(&mut self, _value: bool) {}
    fn row_end(&mut self) {}
    fn file_end(&mut self) {}
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ColumnSpec {
    Uint64,
    String,
    Bool,
}

/// Reads bytes from `src`, blocking on short reads with exponential
/// backoff when `live` is set rather than failing.
struct PatientReader<R: Read> {
    src: R,
    live: bool,
}

impl<R: Read> PatientReader<R> {
    fn read_exact_patient(&mut self, buf: &mut [u8]) -> Result<(), BinoutError> {
        let mut filled = 0;
        let mut delay = MIN_BACKOFF;
        while filled < buf.len() {
            match self.src.read(&mut buf[filled..]) {
                Ok(0) => {
                    if !self.live {
                        return Err(BinoutError::Io(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "short read",
                        )));
                    }
                    log::debug!("short read while live-tailing, retrying in {delay:?}");
                    thread::sleep(delay);
                    delay = (delay * 2).min(MAX_BACKOFF);
                }
                Ok(n) => {
                    filled += n;
                    delay = MIN_BACKOFF;
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(BinoutError::Io(e)),
            }
        }
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8, BinoutError> {
        let mut buf = [0u8; 1];
        self.read_exact_patient(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u64(&mut self) -> Result<u64, BinoutError> {
        let mut buf = [0u8; 8];
        self.read_exact_patient(&mut buf)?;
        Ok((&buf[..]).read_u64::<BigEndian>().expect("exactly 8 bytes"))
    }

    fn read_string(&mut self) -> Result<String, BinoutError> {
        let mut len_buf = [0u8; 2];
        self.read_exact_patient(&mut len_buf)?;
        let len = (&len_buf[..]).read_u16::<BigEndian>().expect("exactly 2 bytes") as usize;
        let mut bytes = vec![0u8; len];
        self.read_exact_patient(&mut bytes)?;
        String::from_utf8(bytes).map_err(|e| BinoutError::format(format!("non-UTF-8 string: {e}")))
    }
}

/// Parses a complete binary-output stream, invoking `callbacks` for
/// every structural event. With `live = true`, a short read at EOF
/// blocks and retries rather than returning, so the caller can tail a
/// file that is still being written.
///
/// Errors are also delivered through [`ParseCallbacks::error`] before
/// being returned, matching the original's single error-callback exit
/// path.
pub fn process_byfl_stream<R: Read>(
    src: R,
    live: bool,
    callbacks: &mut dyn ParseCallbacks,
) -> Result<(), BinoutError> {
    let mut reader = PatientReader { src, live };
    match drive(&mut reader, callbacks) {
        Ok(()) => {
            callbacks.file_end();
            Ok(())
        }
        Err(e) => {
            callbacks.error(&e.to_string());
            Err(e)
        }
    }
}

fn drive<R: Read>(reader: &mut PatientReader<R>, callbacks: &mut dyn ParseCallbacks) -> Result<(), BinoutError> {
    let mut magic = [0u8; 7];
    reader.read_exact_patient(&mut magic)?;
    if &magic != crate::tags::MAGIC {
        return Err(BinoutError::format("bad magic header: not a Byfl binary-output file"));
    }
    callbacks.file_begin();

    loop {
        let tag_byte = reader.read_u8()?;
        let tag = TableTag::from_byte(tag_byte)
            .ok_or_else(|| BinoutError::format(format!("unknown table tag {tag_byte}")))?;
        if tag == TableTag::None {
            return Ok(());
        }
        let name = reader.read_string()?;
        match tag {
            TableTag::Basic => {
                callbacks.table_basic_begin(&name);
                process_basic_table(reader, callbacks)?;
            }
            TableTag::KeyVal => {
                callbacks.table_keyval_begin(&name);
                process_keyval_table(reader, callbacks)?;
            }
            TableTag::None => unreachable!(),
        }
        callbacks.table_end();
    }
}

fn read_column_header<R: Read>(
    reader: &mut PatientReader<R>,
    callbacks: &mut dyn ParseCallbacks,
) -> Result<Vec<ColumnSpec>, BinoutError> {
    let mut columns = Vec::new();
    callbacks.column_begin();
    loop {
        let tag_byte = reader.read_u8()?;
        let tag = ColumnTag::from_byte(tag_byte)
            .ok_or_else(|| BinoutError::format(format!("unknown column tag {tag_byte}")))?;
        if tag == ColumnTag::None {
            break;
        }
        let name = reader.read_string()?;
        match tag {
            ColumnTag::Uint64 => {
                columns.push(ColumnSpec::Uint64);
                callbacks.column_uint64(&name);
            }
            ColumnTag::String => {
                columns.push(ColumnSpec::String);
                callbacks.column_string(&name);
            }
            ColumnTag::Bool => {
                columns.push(ColumnSpec::Bool);
                callbacks.column_bool(&name);
            }
            ColumnTag::None => unreachable!(),
        }
    }
    callbacks.column_end();
    Ok(columns)
}

fn process_basic_table<R: Read>(
    reader: &mut PatientReader<R>,
    callbacks: &mut dyn ParseCallbacks,
) -> Result<(), BinoutError> {
    let columns = read_column_header(reader, callbacks)?;

    loop {
        let row_tag_byte = reader.read_u8()?;
        let row_tag = RowTag::from_byte(row_tag_byte)
            .ok_or_else(|| BinoutError::format(format!("unknown row tag {row_tag_byte}")))?;
        if row_tag == RowTag::None {
            return Ok(());
        }
        callbacks.row_begin();
        for col in &columns {
            match col {
                ColumnSpec::Uint64 => callbacks.data_uint64(reader.read_u64()?),
                ColumnSpec::String => {
                    let s = reader.read_string()?;
                    callbacks.data_string(&s);
                }
                ColumnSpec::Bool => callbacks.data_bool(reader.read_u8()? != 0),
            }
        }
        callbacks.row_end();
    }
}

enum KeyValCell {
    Uint64(u64),
    String(String),
    Bool(bool),
}

/// A key:value table interleaves each column's header with its single
/// value in the stream; the whole row is buffered so that the
/// per-value callbacks can still be issued in column order after
/// `column_end`, matching `process_byfl_keyval_table`.
fn process_keyval_table<R: Read>(
    reader: &mut PatientReader<R>,
    callbacks: &mut dyn ParseCallbacks,
) -> Result<(), BinoutError> {
    let mut row = Vec::new();
    callbacks.column_begin();
    loop {
        let tag_byte = reader.read_u8()?;
        let tag = ColumnTag::from_byte(tag_byte)
            .ok_or_else(|| BinoutError::format(format!("unknown column tag {tag_byte}")))?;
        if tag == ColumnTag::None {
            break;
        }
        let name = reader.read_string()?;
        match tag {
            ColumnTag::Uint64 => {
                callbacks.column_uint64(&name);
                row.push(KeyValCell::Uint64(reader.read_u64()?));
            }
            ColumnTag::String => {
                callbacks.column_string(&name);
                row.push(KeyValCell::String(reader.read_string()?));
            }
            ColumnTag::Bool => {
                callbacks.column_bool(&name);
                row.push(KeyValCell::Bool(reader.read_u8()? != 0));
            }
            ColumnTag::None => unreachable!(),
        }
    }
    callbacks.column_end();

    callbacks.row_begin();
    for cell in &row {
        match cell {
            KeyValCell::Uint64(v) => callbacks.data_uint64(*v),
            KeyValCell::String(s) => callbacks.data_string(s),
            KeyValCell::Bool(b) => callbacks.data_bool(*b),
        }
    }
    callbacks.row_end();
    Ok(())
}
