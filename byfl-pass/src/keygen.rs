//! Per-module function-key assignment (spec.md §4.1 "Per-module
//! finalization"): one [`FunctionKeyGen`] seeded from the module
//! identifier, asked for one key per function in declaration order, so
//! recompiling the same source reproduces the same key assignment.

use byfl_runtime::FunctionKeyGen;

use crate::ir::Module;

/// Assigns a stable key to every function in `module`, in declaration
/// order, mirroring the module constructor that registers
/// `(keys[], names[])` at load time.
pub fn assign_function_keys(module: &Module) -> Vec<(String, u64)> {
    let mut keygen = FunctionKeyGen::for_module(&module.identifier);
    module
        .functions
        .iter()
        .map(|f| (f.name.clone(), keygen.next_key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Function;

    #[test]
    fn same_module_identifier_reproduces_the_same_keys() {
        let mut a = Module::new("foo.c");
        a.functions.push(Function::new("main"));
        a.functions.push(Function::new("helper"));

        let mut b = Module::new("foo.c");
        b.functions.push(Function::new("main"));
        b.functions.push(Function::new("helper"));

        assert_eq!(assign_function_keys(&a), assign_function_keys(&b));
    }

    #[test]
    fn distinct_modules_overwhelmingly_diverge() {
        let mut a = Module::new("foo.c");
        a.functions.push(Function::new("main"));
        let mut b = Module::new("bar.c");
        b.functions.push(Function::new("main"));

        assert_ne!(assign_function_keys(&a), assign_function_keys(&b));
    }
}
