//! Thread-local counters, symbol interning, and the memory / reuse-distance
//! / data-structure / stride / vector / cache engines backing Byfl's
//! instrumented-program runtime.
//!
//! This crate implements spec.md §3 (data model) and §4.2–§4.7 (run-time
//! engines). It has no dependency on any particular host-compiler IR —
//! `byfl-pass` drives it through the call points documented on
//! [`aggregation::RuntimeState`], and `byfl-binout` consumes its counter
//! bundles and tracker tables to produce the on-disk format.

mod aggregation;
mod cache;
mod counters;
mod dstruct;
mod error;
mod fast_hash_map;
mod mt19937;
mod pagetable;
mod reuse_distance;
mod stride;
mod symbol;

pub use aggregation::{RuntimeConfig, RuntimeState};
pub use cache::{Cache, CacheModel};
pub use counters::{
    mem_type_to_index, CounterBundle, MemAgg, MemIntrinsic, MemOp, MemRef, MemType, MemWidth,
    Terminator, BF_END_BB_NUM, BF_NUM_MEM_INTRIN, NUM_MEM_INSTS,
};
pub use dstruct::{DataStructCounters, DataStructureTracker, Interval, StaticSymbol};
pub use error::RuntimeError;
pub use fast_hash_map::{FastHashMap, FastHashSet};
pub use mt19937::{hash_module_identifier, FunctionKeyGen, Mt19937_64};
pub use pagetable::{BitPageTable, ByteCount, PageTable, PageTableEntry, WordPageTable};
pub use reuse_distance::ReuseDistanceEngine;
pub use stride::{AccessPattern, StrideTracker, VectorShape, VectorTracker, NUM_STRIDES};
pub use symbol::{simplify_label, CallStack, Interned, SymbolInfo, SymbolTable, EMPTY_STACK};
