//! Canned synthetic workloads, built directly as [`byfl_pass::ir::Module`]
//! values since this binary has no compiler front end to instrument real
//! source with.

use byfl_pass::{BasicBlock, ElementType, Function, Instr, MemIntrinsicKind, Module, OperandType, Terminator};

use crate::cli::WorkloadKind;

pub fn build(kind: WorkloadKind) -> Module {
    match kind {
        WorkloadKind::ScalarLoop => scalar_loop(),
        WorkloadKind::VectorMath => vector_math(),
        WorkloadKind::Memcpy => memcpy(),
    }
}

/// A tight loop touching one 8-byte scalar repeatedly: a load, an add, and
/// a store per iteration, closing with a `RETURN` terminator.
fn scalar_loop() -> Module {
    let mut module = Module::new("scalar_loop.c");
    let mut main = Function::new("main");
    let mut block = BasicBlock::new(Terminator::Return);

    let ty = OperandType::scalar(ElementType::Int, 64);
    for i in 0..64u64 {
        let addr = 0x1000 + (i % 8) * 8;
        block.instrs.push(Instr::Load {
            addr,
            ty,
            is_pointer: false,
        });
        block.instrs.push(Instr::Arith {
            ty,
            is_extract_or_insert: false,
        });
        block.instrs.push(Instr::Store {
            addr,
            ty,
            is_pointer: false,
        });
    }

    main.blocks.push(block);
    module.functions.push(main);
    module
}

/// A loop of 4-lane float vector arithmetic, to exercise the flop and
/// vector-tally counting rules.
fn vector_math() -> Module {
    let mut module = Module::new("vector_math.c");
    let mut main = Function::new("main");
    let mut block = BasicBlock::new(Terminator::Return);

    let ty = OperandType::vector(ElementType::Float, 32, 4);
    for _ in 0..16u64 {
        block.instrs.push(Instr::Arith {
            ty,
            is_extract_or_insert: false,
        });
    }

    main.blocks.push(block);
    module.functions.push(main);
    module
}

/// `main` calls a large `memcpy`, exercising the memory-intrinsic tally
/// path instead of per-byte load/store counting.
fn memcpy() -> Module {
    let mut module = Module::new("memcpy.c");
    let mut main = Function::new("main");
    let mut block = BasicBlock::new(Terminator::Return);

    block.instrs.push(Instr::Call {
        callee: "memcpy".to_string(),
        ignored: false,
        mem_intrinsic: Some((MemIntrinsicKind::Memcpy, 1 << 20)),
    });

    main.blocks.push(block);
    module.functions.push(main);
    module
}
