//! Streams a finished [`byfl_runtime::RuntimeState`] out through
//! `byfl-binout`, mirroring the table layout `lib/byfl/basicblocks.cpp`
//! writes at program exit: a key:value table of run-time arguments
//! followed by basic tables of rolled-up counters.

use std::fs::File;
use std::path::Path;

use byfl_binout::{BinoutWriter, ColumnType, Sink};
use byfl_pass::PassConfig;
use byfl_runtime::RuntimeState;

use crate::error::AppError;

pub fn write_report(state: &RuntimeState, config: &PassConfig, path: &Path) -> Result<(), AppError> {
    let file = File::create(path)?;
    let mut writer = BinoutWriter::new(Sink::file(file))?;

    writer.begin_keyval_table("Run-time arguments")?;
    writer.write_keyval_string("Options", &config.option_summary())?;
    writer.end_keyval_table()?;

    write_counter_table(&mut writer, "Global totals", std::iter::once(("(whole program)".to_string(), state.global_totals().clone())))?;

    if config.per_func {
        let per_func: Vec<_> = state
            .per_func_totals()
            .iter()
            .map(|(key, bundle)| (format!("{key:#x}"), bundle.clone()))
            .collect();
        write_counter_table(&mut writer, "Function totals", per_func)?;
    }

    if config.every_bb {
        let bb_rows: Vec<_> = state
            .bb_reports()
            .iter()
            .map(|(key, bundle)| (format!("{key:#x}"), bundle.clone()))
            .collect();
        write_counter_table(&mut writer, "Basic-block totals", bb_rows)?;
    }

    writer.end_file()?;
    Ok(())
}

fn write_counter_table(
    writer: &mut BinoutWriter<Sink>,
    name: &str,
    rows: impl IntoIterator<Item = (String, byfl_runtime::CounterBundle)>,
) -> Result<(), AppError> {
    writer.begin_basic_table(name)?;
    writer.write_column_header(&[
        ("Name", ColumnType::String),
        ("Loads", ColumnType::Uint64),
        ("Stores", ColumnType::Uint64),
        ("Load instructions", ColumnType::Uint64),
        ("Store instructions", ColumnType::Uint64),
        ("Call instructions", ColumnType::Uint64),
        ("Flops", ColumnType::Uint64),
        ("Ops", ColumnType::Uint64),
        ("Op bits", ColumnType::Uint64),
    ])?;

    for (name, bundle) in rows {
        writer.begin_row()?;
        writer.write_string(&name)?;
        writer.write_uint64(bundle.loads)?;
        writer.write_uint64(bundle.stores)?;
        writer.write_uint64(bundle.load_ins)?;
        writer.write_uint64(bundle.store_ins)?;
        writer.write_uint64(bundle.call_ins)?;
        writer.write_uint64(bundle.flops)?;
        writer.write_uint64(bundle.ops)?;
        writer.write_uint64(bundle.op_bits)?;
        writer.end_row()?;
    }

    writer.end_table()?;
    Ok(())
}
