//! A [`ParseCallbacks`] implementation that prints a binary output file's
//! tables back out as indented text, for the `byfl dump` action.

use byfl_binout::ParseCallbacks;

#[derive(Default)]
pub struct TextDumper {
    column_names: Vec<String>,
    next_column: usize,
}

impl ParseCallbacks for TextDumper {
    fn file_begin(&mut self) {
        println!("Byfl binary output file");
    }

    fn error(&mut self, message: &str) {
        eprintln!("error: {message}");
    }

    fn table_basic_begin(&mut self, name: &str) {
        println!("\n[{name}] (basic)");
    }

    fn table_keyval_begin(&mut self, name: &str) {
        println!("\n[{name}] (key:value)");
    }

    fn column_begin(&mut self) {
        self.column_names.clear();
    }

    fn column_uint64(&mut self, name: &str) {
        self.column_names.push(name.to_string());
    }

    fn column_string(&mut self, name: &str) {
        self.column_names.push(name.to_string());
    }

    fn column_bool(&mut self, name: &str) {
        self.column_names.push(name.to_string());
    }

    fn row_begin(&mut self) {
        self.next_column = 0;
        print!("  ");
    }

    fn data_uint64(&mut self, value: u64) {
        self.print_cell(&value.to_string());
    }

    fn data_string(&mut self, value: &str) {
        self.print_cell(&format!("{value:?}"));
    }

    fn data_bool(&mut self, value: bool) {
        self.print_cell(&value.to_string());
    }

    fn row_end(&mut self) {
        println!();
    }
}

impl TextDumper {
    fn print_cell(&mut self, rendered: &str) {
        let name = self
            .column_names
            .get(self.next_column)
            .map(String::as_str)
            .unwrap_or("?");
        print!("{name}={rendered} ");
        self.next_column += 1;
    }
}
