//! Reader and writer for Byfl's binary-output format: a stream of
//! big-endian tag-length-value records describing a sequence of basic
//! or key:value tables (spec.md §4.8).
//!
//! This crate has no dependency on `byfl-runtime`'s in-memory counter
//! model; `byfl` glues the two together by driving a [`writer::BinoutWriter`]
//! from a [`byfl_runtime::RuntimeState`] and by implementing
//! [`reader::ParseCallbacks`] to render a parsed file back to text.

mod error;
mod reader;
mod tags;
mod writer;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub use error::BinoutError;
pub use reader::{process_byfl_stream, ParseCallbacks};
pub use tags::{ColumnTag, ColumnType, RowTag, TableTag, MAGIC};
pub use writer::{BinoutWriter, Sink};

/// Opens `path` and parses it as a Byfl binary-output file, invoking
/// `callbacks` for every structural event. With `live = true`, the
/// parser blocks and retries (exponential backoff) on a short read at
/// EOF instead of failing, so it can tail a file still being written.
pub fn process_byfl_file(
    path: impl AsRef<Path>,
    live: bool,
    callbacks: &mut dyn ParseCallbacks,
) -> Result<(), BinoutError> {
    let file = File::open(path)?;
    process_byfl_stream(BufReader::new(file), live, callbacks)
}
