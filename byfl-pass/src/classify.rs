//! Pure instruction classification (spec.md §4.1 "For each original
//! instruction, classify: ..."), factored out of [`crate::instrument`] so
//! the counting rules can be tested without a [`byfl_runtime::RuntimeState`]
//! in hand.

use byfl_runtime::{mem_type_to_index, MemAgg, MemOp, MemRef, MemType, MemWidth};

use crate::ir::{ElementType, MemIntrinsicKind, OperandType};

/// Width, in bits, of the host `int` type used by the getelementptr
/// op-bits rule (spec.md §4.1: "3·sizeof(int) op-bits" / "6·sizeof(int)
/// op-bits").
pub const INT_BITS: u64 = 32;

/// The effect of a load or store on the counter bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadStoreEffect {
    pub bytes: u64,
    /// `mem_insts` flattened index, present only when type tracking is on.
    pub mem_insts_index: Option<usize>,
}

pub fn classify_load_store(is_store: bool, ty: &OperandType, is_pointer: bool, track_types: bool) -> LoadStoreEffect {
    let bytes = ty.total_bits().div_ceil(8);
    let mem_insts_index = if track_types {
        Some(mem_type_to_index(
            if is_store { MemOp::Store } else { MemOp::Load },
            if is_pointer { MemRef::Pointer } else { MemRef::Value },
            if ty.is_vector() { MemAgg::Vector } else { MemAgg::Scalar },
            mem_type_of(ty.elt),
            mem_width_of(ty.bits),
        ))
    } else {
        None
    };
    LoadStoreEffect { bytes, mem_insts_index }
}

fn mem_type_of(elt: ElementType) -> MemType {
    match elt {
        ElementType::Int => MemType::Int,
        ElementType::Float => MemType::Fp,
        ElementType::Other => MemType::Other,
    }
}

fn mem_width_of(bits: u32) -> MemWidth {
    match bits {
        8 => MemWidth::W8,
        16 => MemWidth::W16,
        32 => MemWidth::W32,
        64 => MemWidth::W64,
        128 => MemWidth::W128,
        _ => MemWidth::Other,
    }
}

/// The effect of a getelementptr instruction: a constant operand counts as
/// one op at `3*sizeof(int)` bits; a non-constant operand counts as two ops
/// at `6*sizeof(int)` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GepEffect {
    pub ops: u64,
    pub op_bits: u64,
}

pub fn classify_getelementptr(constant_operand: bool) -> GepEffect {
    if constant_operand {
        GepEffect {
            ops: 1,
            op_bits: 3 * INT_BITS,
        }
    } else {
        GepEffect {
            ops: 2,
            op_bits: 6 * INT_BITS,
        }
    }
}

/// The effect of an arithmetic/compare/cast/branch instruction: always an
/// op; also a flop if the element type is floating-point; also a vector
/// tally if the type is a vector and the opcode is not an
/// extract/insert-element/value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArithEffect {
    pub ops: u64,
    pub op_bits: u64,
    pub is_flop: bool,
    /// `(num_elements, bits_per_element, is_flop)` for the vector-tally
    /// callback, when applicable.
    pub vector_tally: Option<(u32, u32, bool)>,
}

pub fn classify_arith(ty: &OperandType, is_extract_or_insert: bool) -> ArithEffect {
    let is_flop = ty.is_float();
    let vector_tally = (ty.is_vector() && !is_extract_or_insert).then_some((ty.num_elements, ty.bits, is_flop));
    ArithEffect {
        ops: 1,
        op_bits: ty.total_bits(),
        is_flop,
        vector_tally,
    }
}

/// Which family of memory-intrinsic cells (spec.md §3 `mem_intrinsics`) a
/// call's intrinsic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrinsicFamily {
    Memset,
    Memxfer,
}

impl From<MemIntrinsicKind> for IntrinsicFamily {
    fn from(kind: MemIntrinsicKind) -> Self {
        match kind {
            MemIntrinsicKind::Memset => IntrinsicFamily::Memset,
            MemIntrinsicKind::Memcpy | MemIntrinsicKind::Memmove => IntrinsicFamily::Memxfer,
        }
    }
}

/// The effect of a call instruction: an ignored debug/lifetime intrinsic
/// contributes nothing; any other call increments `call_ins` and, for
/// memory intrinsics, the matching `mem_intrinsics` call/byte cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallEffect {
    pub call_ins: u64,
    pub intrinsic: Option<(IntrinsicFamily, u64)>,
}

pub fn classify_call(ignored: bool, mem_intrinsic: Option<(MemIntrinsicKind, u64)>) -> CallEffect {
    if ignored {
        return CallEffect {
            call_ins: 0,
            intrinsic: None,
        };
    }
    CallEffect {
        call_ins: 1,
        intrinsic: mem_intrinsic.map(|(kind, len)| (kind.into(), len)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_64_bit_load_counts_8_bytes() {
        let ty = OperandType::scalar(ElementType::Int, 64);
        let effect = classify_load_store(false, &ty, false, false);
        assert_eq!(effect.bytes, 8);
        assert_eq!(effect.mem_insts_index, None);
    }

    #[test]
    fn type_tracking_populates_mem_insts_index() {
        let ty = OperandType::scalar(ElementType::Fp, 64);
        let effect = classify_load_store(true, &ty, false, true);
        assert!(effect.mem_insts_index.is_some());
    }

    #[test]
    fn constant_gep_operand_is_one_op() {
        let effect = classify_getelementptr(true);
        assert_eq!(effect.ops, 1);
        assert_eq!(effect.op_bits, 3 * INT_BITS);
    }

    #[test]
    fn variable_gep_operand_is_two_ops() {
        let effect = classify_getelementptr(false);
        assert_eq!(effect.ops, 2);
        assert_eq!(effect.op_bits, 6 * INT_BITS);
    }

    #[test]
    fn float_arith_is_also_a_flop() {
        let ty = OperandType::scalar(ElementType::Float, 32);
        let effect = classify_arith(&ty, false);
        assert!(effect.is_flop);
        assert!(effect.vector_tally.is_none());
    }

    #[test]
    fn vector_arith_emits_a_vector_tally_unless_extract_or_insert() {
        let ty = OperandType::vector(ElementType::Float, 32, 4);
        let effect = classify_arith(&ty, false);
        assert_eq!(effect.vector_tally, Some((4, 32, true)));

        let extract_effect = classify_arith(&ty, true);
        assert!(extract_effect.vector_tally.is_none());
    }

    #[test]
    fn ignored_calls_contribute_nothing() {
        let effect = classify_call(true, Some((MemIntrinsicKind::Memcpy, 4096)));
        assert_eq!(effect.call_ins, 0);
        assert!(effect.intrinsic.is_none());
    }

    #[test]
    fn memcpy_and_memmove_share_the_memxfer_family() {
        let a = classify_call(false, Some((MemIntrinsicKind::Memcpy, 100)));
        let b = classify_call(false, Some((MemIntrinsicKind::Memmove, 100)));
        assert_eq!(a.intrinsic.unwrap().0, IntrinsicFamily::Memxfer);
        assert_eq!(b.intrinsic.unwrap().0, IntrinsicFamily::Memxfer);
    }
}
