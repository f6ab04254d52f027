//! The counter bundle: the fundamental record carried at every aggregation
//! scope (current basic block, per-function, per-partition, global).
//!
//! Grounded on `lib/byfl/basicblocks.cpp`'s `ByteFlopCounters` and the enums
//! in `include/byfl-common.h` (`BF_OP_*`/`BF_REF_*`/`BF_AGG_*`/`BF_TYPE_*`/
//! `BF_WIDTH_*`, `BF_END_BB_*`, the memory-intrinsic indices).

use std::ops::{Index, IndexMut};

/// Operand reference kind for the `mem_insts` histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemOp {
    Load,
    Store,
}
const BF_OP_NUM: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemRef {
    Value,
    Pointer,
}
const BF_REF_NUM: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemAgg {
    Scalar,
    Vector,
}
const BF_AGG_NUM: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemType {
    Int,
    Fp,
    Other,
}
const BF_TYPE_NUM: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemWidth {
    W8,
    W16,
    W32,
    W64,
    W128,
    Other,
}
const BF_WIDTH_NUM: usize = 6;

/// Size of the flattened 5-D `mem_insts` histogram
/// (`BF_OP_NUM * BF_REF_NUM * BF_AGG_NUM * BF_TYPE_NUM * BF_WIDTH_NUM`).
pub const NUM_MEM_INSTS: usize = BF_OP_NUM * BF_REF_NUM * BF_AGG_NUM * BF_TYPE_NUM * BF_WIDTH_NUM;

/// Flattens a `(op, ref, agg, type, width)` memory-access classification
/// into an index into `mem_insts`, matching `mem_type_to_index` exactly:
/// `idx = ((((op*R+ref)*A+agg)*T+type)*W+width)`.
pub fn mem_type_to_index(op: MemOp, mref: MemRef, agg: MemAgg, ty: MemType, width: MemWidth) -> usize {
    let mut idx = 0usize;
    idx = idx * BF_OP_NUM + op as usize;
    idx = idx * BF_REF_NUM + mref as usize;
    idx = idx * BF_AGG_NUM + agg as usize;
    idx = idx * BF_TYPE_NUM + ty as usize;
    idx = idx * BF_WIDTH_NUM + width as usize;
    idx
}

/// Basic-block terminator kind, indexing `terminators[]`. `Any` is the
/// running total across every other variant (spec.md §3 invariant:
/// `terminators[ANY] = Σᵢ≠ANY terminators[i]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Terminator {
    Any = 0,
    UncondReal,
    UncondFake,
    CondNotTaken,
    CondTaken,
    Indirect,
    Switch,
    Return,
    Invoke,
}
pub const BF_END_BB_NUM: usize = 9;

/// Memory-intrinsic tally index (`memset`/`memcpy`/`memmove` calls and
/// bytes moved).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum MemIntrinsic {
    MemsetCalls = 0,
    MemsetBytes,
    MemxferCalls,
    MemxferBytes,
}
pub const BF_NUM_MEM_INTRIN: usize = 4;

/// The fundamental counter record (spec.md §3 "Counter bundle"), carried at
/// basic-block, per-function, per-partition, and global scope.
///
/// `mem_insts` and `inst_mix_histo` are heap-allocated because they are
/// only ever populated when the corresponding tracking mode
/// (`-bf-types` / `-bf-inst-mix` equivalents) is enabled; an empty `Vec`
/// means "not tracked," matching the original's `NULL` initial pointers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterBundle {
    pub loads: u64,
    pub stores: u64,
    pub load_ins: u64,
    pub store_ins: u64,
    pub call_ins: u64,
    pub flops: u64,
    pub fp_bits: u64,
    pub ops: u64,
    pub op_bits: u64,
    pub mem_insts: Vec<u64>,
    pub inst_mix_histo: Vec<u64>,
    pub terminators: [u64; BF_END_BB_NUM],
    pub mem_intrinsics: [u64; BF_NUM_MEM_INTRIN],
}

impl Default for CounterBundle {
    fn default() -> Self {
        CounterBundle {
            loads: 0,
            stores: 0,
            load_ins: 0,
            store_ins: 0,
            call_ins: 0,
            flops: 0,
            fp_bits: 0,
            ops: 0,
            op_bits: 0,
            mem_insts: Vec::new(),
            inst_mix_histo: Vec::new(),
            terminators: [0; BF_END_BB_NUM],
            mem_intrinsics: [0; BF_NUM_MEM_INTRIN],
        }
    }
}

impl CounterBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a zeroed `mem_insts` histogram (enables `-bf-types`-style
    /// per-access-shape tracking for this bundle).
    pub fn enable_mem_insts_tracking(&mut self) {
        if self.mem_insts.is_empty() {
            self.mem_insts = vec![0; NUM_MEM_INSTS];
        }
    }

    /// Allocates a zeroed `inst_mix_histo` of `num_opcodes` entries
    /// (enables `-bf-inst-mix`-style per-opcode tracking).
    pub fn enable_inst_mix_tracking(&mut self, num_opcodes: usize) {
        if self.inst_mix_histo.is_empty() {
            self.inst_mix_histo = vec![0; num_opcodes];
        }
    }

    pub fn mem_insts_tracked(&self) -> bool {
        !self.mem_insts.is_empty()
    }

    pub fn inst_mix_tracked(&self) -> bool {
        !self.inst_mix_histo.is_empty()
    }

    /// Zeroes every counter without deallocating `mem_insts` /
    /// `inst_mix_histo`, mirroring the per-basic-block reset the original
    /// performs on its global arrays between blocks.
    pub fn reset(&mut self) {
        let mem_insts_len = self.mem_insts.len();
        let inst_mix_len = self.inst_mix_histo.len();
        *self = CounterBundle::default();
        if mem_insts_len > 0 {
            self.mem_insts = vec![0; mem_insts_len];
        }
        if inst_mix_len > 0 {
            self.inst_mix_histo = vec![0; inst_mix_len];
        }
    }

    /// Rolls `other`'s counters into `self`, unconditionally for the
    /// scalars/terminators/intrinsics and only when both sides are tracking
    /// `mem_insts`/`inst_mix_histo`, mirroring `ByteFlopCounters::accumulate`.
    pub fn accumulate(&mut self, other: &CounterBundle) {
        if self.mem_insts_tracked() && other.mem_insts_tracked() {
            for (a, b) in self.mem_insts.iter_mut().zip(other.mem_insts.iter()) {
                *a += b;
            }
        }
        if self.inst_mix_tracked() && other.inst_mix_tracked() {
            for (a, b) in self.inst_mix_histo.iter_mut().zip(other.inst_mix_histo.iter()) {
                *a += b;
            }
        }
        for i in 0..BF_END_BB_NUM {
            self.terminators[i] += other.terminators[i];
        }
        for i in 0..BF_NUM_MEM_INTRIN {
            self.mem_intrinsics[i] += other.mem_intrinsics[i];
        }
        self.loads += other.loads;
        self.stores += other.stores;
        self.load_ins += other.load_ins;
        self.store_ins += other.store_ins;
        self.call_ins += other.call_ins;
        self.flops += other.flops;
        self.fp_bits += other.fp_bits;
        self.ops += other.ops;
        self.op_bits += other.op_bits;
    }

    /// Returns `self - other`, field by field. Unlike the original
    /// `ByteFlopCounters::difference`'s allocating overload — which assigns
    /// `call_ins = other->call_ins` instead of subtracting, a bug recorded
    /// in DESIGN.md — this always subtracts.
    pub fn difference(&self, other: &CounterBundle) -> CounterBundle {
        let mem_insts = if self.mem_insts_tracked() && other.mem_insts_tracked() {
            self.mem_insts
                .iter()
                .zip(other.mem_insts.iter())
                .map(|(a, b)| a - b)
                .collect()
        } else {
            Vec::new()
        };
        let inst_mix_histo = if self.inst_mix_tracked() && other.inst_mix_tracked() {
            self.inst_mix_histo
                .iter()
                .zip(other.inst_mix_histo.iter())
                .map(|(a, b)| a - b)
                .collect()
        } else {
            Vec::new()
        };
        let mut terminators = [0u64; BF_END_BB_NUM];
        for i in 0..BF_END_BB_NUM {
            terminators[i] = self.terminators[i] - other.terminators[i];
        }
        let mut mem_intrinsics = [0u64; BF_NUM_MEM_INTRIN];
        for i in 0..BF_NUM_MEM_INTRIN {
            mem_intrinsics[i] = self.mem_intrinsics[i] - other.mem_intrinsics[i];
        }

        CounterBundle {
            loads: self.loads - other.loads,
            stores: self.stores - other.stores,
            load_ins: self.load_ins - other.load_ins,
            store_ins: self.store_ins - other.store_ins,
            call_ins: self.call_ins - other.call_ins,
            flops: self.flops - other.flops,
            fp_bits: self.fp_bits - other.fp_bits,
            ops: self.ops - other.ops,
            op_bits: self.op_bits - other.op_bits,
            mem_insts,
            inst_mix_histo,
            terminators,
            mem_intrinsics,
        }
    }

    pub fn terminator_count(&self, t: Terminator) -> u64 {
        self.terminators[t as usize]
    }

    pub fn add_terminator(&mut self, t: Terminator) {
        self.terminators[Terminator::Any as usize] += 1;
        if t != Terminator::Any {
            self.terminators[t as usize] += 1;
        }
    }

    pub fn mem_intrinsic_count(&self, k: MemIntrinsic) -> u64 {
        self.mem_intrinsics[k as usize]
    }
}

impl Index<MemIntrinsic> for CounterBundle {
    type Output = u64;
    fn index(&self, k: MemIntrinsic) -> &u64 {
        &self.mem_intrinsics[k as usize]
    }
}

impl IndexMut<MemIntrinsic> for CounterBundle {
    fn index_mut(&mut self, k: MemIntrinsic) -> &mut u64 {
        &mut self.mem_intrinsics[k as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_type_to_index_matches_flattening_order() {
        // All-zero classification flattens to 0.
        assert_eq!(
            mem_type_to_index(MemOp::Load, MemRef::Value, MemAgg::Scalar, MemType::Int, MemWidth::W8),
            0
        );
        // Bumping the innermost (width) dimension increments by 1.
        assert_eq!(
            mem_type_to_index(MemOp::Load, MemRef::Value, MemAgg::Scalar, MemType::Int, MemWidth::W16),
            1
        );
        // Bumping the outermost (op) dimension jumps by the product of the rest.
        let stride = BF_REF_NUM * BF_AGG_NUM * BF_TYPE_NUM * BF_WIDTH_NUM;
        assert_eq!(
            mem_type_to_index(MemOp::Store, MemRef::Value, MemAgg::Scalar, MemType::Int, MemWidth::W8),
            stride
        );
    }

    #[test]
    fn accumulate_sums_scalars_and_arrays() {
        let mut a = CounterBundle::new();
        a.loads = 10;
        a.add_terminator(Terminator::Return);

        let mut b = CounterBundle::new();
        b.loads = 5;
        b.add_terminator(Terminator::Return);

        a.accumulate(&b);
        assert_eq!(a.loads, 15);
        assert_eq!(a.terminator_count(Terminator::Return), 2);
        assert_eq!(a.terminator_count(Terminator::Any), 2);
    }

    #[test]
    fn accumulate_skips_mem_insts_unless_both_sides_track_it() {
        let mut a = CounterBundle::new();
        a.enable_mem_insts_tracking();
        let b = CounterBundle::new(); // not tracking
        a.accumulate(&b);
        assert!(a.mem_insts.iter().all(|&v| v == 0));
    }

    #[test]
    fn difference_subtracts_call_ins_rather_than_assigning_it() {
        let mut a = CounterBundle::new();
        a.call_ins = 100;
        let mut b = CounterBundle::new();
        b.call_ins = 3;

        let d = a.difference(&b);
        assert_eq!(d.call_ins, 97);

        // Symmetric check that this is a real subtraction, not an
        // accidental pass-through of either operand.
        a.call_ins = 7;
        b.call_ins = 7;
        assert_eq!(a.difference(&b).call_ins, 0);
    }

    #[test]
    fn reset_zeroes_without_deallocating_optional_histograms() {
        let mut bundle = CounterBundle::new();
        bundle.enable_mem_insts_tracking();
        bundle.mem_insts[0] = 42;
        bundle.loads = 99;

        bundle.reset();
        assert_eq!(bundle.loads, 0);
        assert!(bundle.mem_insts_tracked());
        assert_eq!(bundle.mem_insts[0], 0);
    }

    #[test]
    fn terminators_any_invariant_holds_after_several_adds() {
        let mut bundle = CounterBundle::new();
        bundle.add_terminator(Terminator::Return);
        bundle.add_terminator(Terminator::CondTaken);
        bundle.add_terminator(Terminator::CondNotTaken);

        let sum: u64 = bundle.terminators[1..].iter().sum();
        assert_eq!(bundle.terminators[Terminator::Any as usize], sum);
    }
}
