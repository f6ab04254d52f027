//! String interning, `SymbolInfo` records, and the function call stack.
//!
//! Grounded on `lib/byfl/symtable.cpp` (`bf_string_to_symbol`, pointer-
//! identity interning keyed on string equality) and `lib/byfl/CallStack.{h,cpp}`
//! (push/pop of the "current function + ancestors" combined name, the
//! `[EMPTY]` sentinel, and `max_depth` tracking).

use std::sync::{Arc, Mutex};

use crate::fast_hash_map::FastHashMap;

/// An interned string: cheap to clone and compare, since equal contents
/// always share the same allocation once interned.
pub type Interned = Arc<str>;

/// Process-wide string interner. The original keeps a single static
/// `map<const char*, const char*>` guarded implicitly by Byfl's single
/// compile-time-generated intern call sites; here the table is an explicit,
/// lockable, per-`RuntimeState` structure so multiple synthetic-workload
/// runs in the same process (as in tests) do not share state.
#[derive(Default)]
pub struct SymbolTable {
    interned: Mutex<FastHashMap<Box<str>, Interned>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `s`, returning the table's single shared copy. Two calls
    /// with equal strings return pointer-identical (`Arc::ptr_eq`) values.
    pub fn intern(&self, s: &str) -> Interned {
        let mut table = self.interned.lock().expect("symbol table poisoned");
        if let Some(existing) = table.get(s) {
            return Arc::clone(existing);
        }
        let interned: Interned = Arc::from(s);
        table.insert(Box::from(s), Arc::clone(&interned));
        interned
    }

    pub fn len(&self) -> usize {
        self.interned.lock().expect("symbol table poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `(ID, origin, symbol, function, file, line)` — the record a counter
/// bundle, data-structure counter, or access pattern is ultimately traced
/// back to (spec.md §3 "Symbol info").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolInfo {
    /// Deterministic 64-bit key, generated by [`crate::mt19937::FunctionKeyGen`].
    pub id: u64,
    pub origin: Interned,
    pub symbol: Interned,
    pub function: Interned,
    pub file: Interned,
    pub line: u32,
}

impl SymbolInfo {
    pub fn new(
        id: u64,
        origin: Interned,
        symbol: Interned,
        function: Interned,
        file: Interned,
        line: u32,
    ) -> Self {
        SymbolInfo {
            id,
            origin,
            symbol,
            function,
            file,
            line,
        }
    }
}

/// Tracks the function call stack, producing interned combined names of the
/// form `"fN fN-1 ... f1"` on each push and popping back to `[EMPTY]` once
/// the stack empties, mirroring `CallStack::push_function` /
/// `CallStack::pop_function`.
#[derive(Default)]
pub struct CallStack {
    /// `(combined name, function key)` pairs, most recent call last.
    stack: Vec<(Interned, u64)>,
    pub max_depth: usize,
}

/// Sentinel returned by [`CallStack::pop_function`] once the stack is empty.
pub const EMPTY_STACK: &str = "[EMPTY]";

impl CallStack {
    pub fn new() -> Self {
        CallStack {
            stack: Vec::new(),
            max_depth: 0,
        }
    }

    /// Pushes `funcname` (keyed by `key`), returning the interned combined
    /// name of this call and all of its ancestors.
    pub fn push_function(&mut self, symtab: &SymbolTable, funcname: &str, key: u64) -> Interned {
        let combined = match self.stack.last() {
            None => funcname.to_string(),
            Some((ancestors, _)) => format!("{} {}", funcname, ancestors),
        };
        let interned = symtab.intern(&combined);
        self.stack.push((Arc::clone(&interned), key));
        if self.stack.len() > self.max_depth {
            self.max_depth = self.stack.len();
        }
        interned
    }

    /// Pops the most recent call, returning the new top of the stack
    /// (combined name and its function key), or `("[EMPTY]", 0)` once the
    /// stack has been fully unwound.
    pub fn pop_function(&mut self, symtab: &SymbolTable) -> (Interned, u64) {
        self.stack.pop();
        match self.stack.last() {
            Some((name, key)) => (Arc::clone(name), *key),
            None => (symtab.intern(EMPTY_STACK), 0),
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

/// Best-effort cleanup of a call-point origin label for display purposes
/// only (it never affects counter values). Ported in spirit, not
/// line-for-line, from `demangle_func_name` in `include/byfl-common.h`:
/// strips a `@@<version>` symbol-versioning suffix, and recognizes the
/// "LLVM IR line" shape Byfl falls back to when a call point has no source
/// symbol (e.g. `"%x = add i32 ..."`), turning it into a short human label
/// instead of echoing the raw IR text.
pub fn simplify_label(raw: &str) -> String {
    if let Some(at_version) = raw.find("@@") {
        return simplify_label(&raw[..at_version]);
    }

    if raw.contains('%') {
        let after_eq = raw.find(" = ").map(|i| i + 3).unwrap_or(0);
        let opcode_end = raw[after_eq..]
            .find(|c: char| c.is_whitespace())
            .map(|i| after_eq + i)
            .unwrap_or(raw.len());
        let opcode = &raw[after_eq..opcode_end];
        if opcode.is_empty() {
            return raw.to_string();
        }
        return format!("LLVM {} instruction", opcode);
    }

    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_collapses_equal_strings() {
        let table = SymbolTable::new();
        let a = table.intern("main");
        let b = table.intern("main");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn distinct_strings_get_distinct_entries() {
        let table = SymbolTable::new();
        table.intern("foo");
        table.intern("bar");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn call_stack_builds_combined_names_and_tracks_depth() {
        let table = SymbolTable::new();
        let mut stack = CallStack::new();

        let top = stack.push_function(&table, "main", 1);
        assert_eq!(&*top, "main");

        let top = stack.push_function(&table, "helper", 2);
        assert_eq!(&*top, "helper main");
        assert_eq!(stack.max_depth, 2);

        let (top, key) = stack.pop_function(&table);
        assert_eq!(&*top, "main");
        assert_eq!(key, 1);

        let (top, key) = stack.pop_function(&table);
        assert_eq!(&*top, EMPTY_STACK);
        assert_eq!(key, 0);

        // Depth shrinks but the high-water mark is retained.
        assert_eq!(stack.depth(), 0);
        assert_eq!(stack.max_depth, 2);
    }

    #[test]
    fn simplify_label_passes_through_ordinary_symbols() {
        assert_eq!(simplify_label("main"), "main");
    }

    #[test]
    fn simplify_label_strips_version_suffix() {
        assert_eq!(simplify_label("memcpy@@GLIBC_2.14"), "memcpy");
    }

    #[test]
    fn simplify_label_handles_llvm_ir_fallback() {
        assert_eq!(
            simplify_label("%x = add i32 %a, %b"),
            "LLVM add instruction"
        );
    }
}
