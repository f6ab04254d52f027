use byfl_binout::{process_byfl_stream, BinoutWriter, ColumnType, ParseCallbacks};

#[derive(Default)]
struct Recorder {
    events: Vec<String>,
}

impl ParseCallbacks for Recorder {
    fn file_begin(&mut self) {
        self.events.push("file_begin".into());
    }

    fn table_basic_begin(&mut self, name: &str) {
        self.events.push(format!("table_begin({name})"));
    }

    fn table_end(&mut self) {
        self.events.push("table_end".into());
    }

    fn column_begin(&mut self) {
        self.events.push("column_begin".into());
    }

    fn column_uint64(&mut self, name: &str) {
        self.events.push(format!("column_uint64({name})"));
    }

    fn column_end(&mut self) {
        self.events.push("column_end".into());
    }

    fn row_begin(&mut self) {
        self.events.push("row_begin".into());
    }

    fn data_uint64(&mut self, value: u64) {
        self.events.push(format!("data_uint64({value})"));
    }

    fn row_end(&mut self) {
        self.events.push("row_end".into());
    }

    fn file_end(&mut self) {
        self.events.push("file_end".into());
    }
}

/// Basic table with one UINT64 column and values [42, 0, 2^63],
/// written and re-parsed (spec.md §8 end-to-end scenario 6).
#[test]
fn basic_table_round_trips_through_writer_and_parser() {
    let mut buf = Vec::new();
    {
        let mut writer = BinoutWriter::new(&mut buf).unwrap();
        writer.begin_basic_table("Example").unwrap();
        writer
            .write_column_header(&[("x", ColumnType::Uint64)])
            .unwrap();
        for value in [42u64, 0, 1u64 << 63] {
            writer.begin_row().unwrap();
            writer.write_uint64(value).unwrap();
            writer.end_row().unwrap();
        }
        writer.end_table().unwrap();
        writer.end_file().unwrap();
    }

    let mut recorder = Recorder::default();
    process_byfl_stream(&buf[..], false, &mut recorder).unwrap();

    assert_eq!(
        recorder.events,
        vec![
            "file_begin",
            "table_begin(Example)",
            "column_begin",
            "column_uint64(x)",
            "column_end",
            "row_begin",
            "data_uint64(42)",
            "row_end",
            "row_begin",
            "data_uint64(0)",
            "row_end",
            "row_begin",
            "data_uint64(9223372036854775808)",
            "row_end",
            "table_end",
            "file_end",
        ]
    );
}

#[test]
fn writer_rejects_wrong_column_type() {
    let mut buf = Vec::new();
    let mut writer = BinoutWriter::new(&mut buf).unwrap();
    writer.begin_basic_table("T").unwrap();
    writer
        .write_column_header(&[("n", ColumnType::Uint64)])
        .unwrap();
    writer.begin_row().unwrap();
    assert!(writer.write_string("oops").is_err());
}

#[test]
fn parser_rejects_bad_magic() {
    let mut recorder = Recorder::default();
    let bogus = b"NOTAFILE";
    let result = process_byfl_stream(&bogus[..], false, &mut recorder);
    assert!(result.is_err());
}

#[test]
fn keyval_table_buffers_row_before_emitting_callbacks() {
    let mut buf = Vec::new();
    {
        let mut writer = BinoutWriter::new(&mut buf).unwrap();
        writer.begin_keyval_table("Run").unwrap();
        writer.write_keyval_string("host", "node01").unwrap();
        writer.write_keyval_bool("ok", true).unwrap();
        writer.end_keyval_table().unwrap();
        writer.end_file().unwrap();
    }

    struct KeyValRecorder {
        columns_before_row: bool,
        row_values: Vec<String>,
    }
    impl ParseCallbacks for KeyValRecorder {
        fn column_end(&mut self) {
            self.columns_before_row = true;
        }
        fn data_string(&mut self, value: &str) {
            self.row_values.push(value.to_string());
        }
        fn data_bool(&mut self, value: bool) {
            self.row_values.push(value.to_string());
        }
    }

    let mut recorder = KeyValRecorder {
        columns_before_row: false,
        row_values: Vec::new(),
    };
    process_byfl_stream(&buf[..], false, &mut recorder).unwrap();
    assert!(recorder.columns_before_row);
    assert_eq!(recorder.row_values, vec!["node01", "true"]);
}
