//! A small generic instruction model standing in for a host compiler's IR
//! (spec.md §4.1, SPEC_FULL.md §1: "expressed over a small generic
//! instruction model rather than a specific host compiler's IR, since no
//! LLVM binding is part of the ambient stack").
//!
//! Unlike a real compiler pass, which inserts counter-update code that only
//! executes later when the instrumented binary runs, this crate has no
//! separate compile/run split: each [`Instr`] already carries the concrete
//! operands (address, byte width, ...) of one dynamic occurrence, and
//! [`crate::instrument::run_module`] classifies and records each one against
//! a [`byfl_runtime::RuntimeState`] as it walks the block — playing the role
//! of the inserted instrumentation actually firing at run time.

pub use byfl_runtime::Terminator;

/// The element kind of a value flowing through an instruction, used by the
/// memory-access classifier's type dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Int,
    Float,
    Other,
}

/// The type of an operand: scalar or vector, with `bits` the width of one
/// element (spec.md §3 "`mem_insts` ... (width ∈ {8,16,32,64,128,other})").
#[derive(Debug, Clone, Copy)]
pub struct OperandType {
    pub elt: ElementType,
    pub bits: u32,
    pub num_elements: u32,
}

impl OperandType {
    pub fn scalar(elt: ElementType, bits: u32) -> Self {
        OperandType {
            elt,
            bits,
            num_elements: 1,
        }
    }

    pub fn vector(elt: ElementType, bits: u32, num_elements: u32) -> Self {
        OperandType {
            elt,
            bits,
            num_elements,
        }
    }

    pub fn is_vector(&self) -> bool {
        self.num_elements > 1
    }

    pub fn is_float(&self) -> bool {
        self.elt == ElementType::Float
    }

    pub fn total_bits(&self) -> u64 {
        self.bits as u64 * self.num_elements as u64
    }
}

/// Which memory intrinsic a call instruction invokes (spec.md §4.1 "For
/// memory intrinsics (memset / memcpy / memmove), bump the `mem_intrinsics`
/// cells").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemIntrinsicKind {
    Memset,
    Memcpy,
    Memmove,
}

/// One dynamically-occurring instruction within a basic block.
#[derive(Debug, Clone)]
pub enum Instr {
    /// A memory read of `ty` at `addr`. `is_pointer` marks a load whose
    /// result is itself used as an address (the `ref` dimension of the
    /// `mem_insts` classifier).
    Load { addr: u64, ty: OperandType, is_pointer: bool },
    Store { addr: u64, ty: OperandType, is_pointer: bool },
    /// A call instruction. `ignored` covers debug and lifetime intrinsics,
    /// which are tallied nowhere (spec.md §4.1 "Ignore debug and lifetime
    /// intrinsics").
    Call {
        callee: String,
        ignored: bool,
        mem_intrinsic: Option<(MemIntrinsicKind, u64)>,
    },
    /// Address-arithmetic instruction. `constant_operand` selects between
    /// the one-op/3-op-bit and two-op/6-op-bit tallying rules.
    GetElementPtr { constant_operand: bool },
    /// Arithmetic, comparison, cast, or branch producing a value of `ty`.
    /// Vector-typed, non-extract/insert arithmetic also emits a vector
    /// tally (spec.md §4.1 "if the type is a vector ... emit a vector-tally
    /// callback").
    Arith { ty: OperandType, is_extract_or_insert: bool },
    /// PHI, bit-cast, landing-pad, and ignored intrinsics: no-ops for
    /// counting purposes.
    NoOp,
}

/// One basic block: its instrumented instructions in program order,
/// followed by a terminator.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub instrs: Vec<Instr>,
    pub terminator: Terminator,
}

impl BasicBlock {
    pub fn new(terminator: Terminator) -> Self {
        BasicBlock {
            instrs: Vec::new(),
            terminator,
        }
    }
}

/// One function: a name (used both for display and for call-stack /
/// per-function aggregation) and its sequence of basic blocks.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub blocks: Vec<BasicBlock>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Function {
            name: name.into(),
            blocks: Vec::new(),
        }
    }
}

/// A compilation unit: the module identifier that seeds its function-key
/// generator (spec.md §4.9), plus its functions in declaration order.
#[derive(Debug, Clone)]
pub struct Module {
    pub identifier: String,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(identifier: impl Into<String>) -> Self {
        Module {
            identifier: identifier.into(),
            functions: Vec::new(),
        }
    }
}
