//! IR instrumentation pass: classifies a generic instruction stream and
//! drives a `byfl_runtime::RuntimeState` from it, per the Byfl counting
//! rules (spec.md §4.1).
//!
//! This crate has no dependency on a specific host compiler's IR — see
//! [`ir`] for the generic instruction model it operates over instead, and
//! [`instrument::run_module`] for the driver that walks it.

mod classify;
mod config;
mod error;
mod instrument;
mod ir;
mod keygen;

pub use classify::{
    classify_arith, classify_call, classify_getelementptr, classify_load_store, ArithEffect, CallEffect, GepEffect,
    IntrinsicFamily, LoadStoreEffect, INT_BITS,
};
pub use config::{PassConfig, ReuseDistanceMode};
pub use error::{ConfigError, PassError};
pub use instrument::{run_module, Categorizer};
pub use ir::{BasicBlock, ElementType, Function, Instr, MemIntrinsicKind, Module, OperandType, Terminator};
pub use keygen::assign_function_keys;
