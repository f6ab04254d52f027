//! Drives a [`Module`] through the pass: walks every instrumented
//! function's basic blocks, classifies each instruction, and records its
//! effect on a [`RuntimeState`] — playing, in one pass, both the role of
//! the compile-time instrumentation inserter (spec.md §4.1) and of the
//! instrumented binary actually executing (spec.md §4.2), since this crate
//! has no separate compiler/runtime split (SPEC_FULL.md §1).
//!
//! Mirrors the structure of `lib/bytesflops/Instrument.cpp`'s per-basic-
//! block walk: per-instruction classification and counter updates, call-
//! boundary `bf_push_basic_block`/`bf_pop_basic_block` pairs around calls,
//! and an end-of-block roll-up through `bf_accumulate_bb_tallies`.

use byfl_runtime::{hash_module_identifier, Interned, RuntimeConfig, RuntimeState, VectorShape};

use crate::config::PassConfig;
use crate::error::PassError;
use crate::ir::{Instr, Module};
use crate::keygen::assign_function_keys;
use crate::{classify, ir};

const NUM_SYNTHETIC_OPCODES: usize = 6;

fn opcode_index(instr: &Instr) -> usize {
    match instr {
        Instr::Load { .. } => 0,
        Instr::Store { .. } => 1,
        Instr::Call { .. } => 2,
        Instr::GetElementPtr { .. } => 3,
        Instr::Arith { .. } => 4,
        Instr::NoOp => 5,
    }
}

/// User override for `bf_categorize_counters()`: given the active
/// function's name, returns the partition tag its counters should also
/// roll up into, or `None`.
pub type Categorizer<'a> = dyn Fn(&str) -> Option<String> + 'a;

/// Walks every instrumented function of `module`, classifying and
/// recording each instruction against a freshly-created [`RuntimeState`],
/// which is returned for inspection once the whole module has run.
pub fn run_module(
    module: &Module,
    config: &PassConfig,
    categorize: Option<&Categorizer<'_>>,
) -> Result<RuntimeState, PassError> {
    config.validate()?;

    let runtime_config = RuntimeConfig {
        per_func: config.per_func,
        every_bb: config.every_bb,
        bb_merge: config.bb_merge,
        track_mem_insts: config.track_types,
        inst_mix_opcodes: config.tally_inst_mix.then_some(NUM_SYNTHETIC_OPCODES),
        track_unique_bytes: config.unique_bytes || config.mem_footprint,
        unique_bytes_page_size: 8192,
        reuse_distance_window: config.reuse_distance.and(config.max_reuse_distance),
        cache_model: None,
    };
    let mut state = RuntimeState::new(runtime_config);

    let keys = assign_function_keys(module);

    for (function, (_, key)) in module.functions.iter().zip(keys.iter()) {
        if !config.should_instrument(&function.name) {
            log::debug!("skipping excluded function {}", function.name);
            continue;
        }
        let key = *key;
        let func_tag = state.push_function(&function.name, key);
        let partition: Option<Interned> = categorize
            .and_then(|f| f(&function.name))
            .map(|tag| state.symtab.intern(&tag));

        // Per-function rows key by the full call stack (`bf_func_and_parents_id`)
        // when `call_stack` is on, else by the plain per-module function key
        // (`bf_assoc_counters_with_func`, basicblocks.cpp:520-529).
        let per_func_key = if config.call_stack {
            hash_module_identifier(&func_tag)
        } else {
            key
        };

        for block in &function.blocks {
            run_block(&mut state, block, config, &func_tag)?;
            state.end_basic_block(per_func_key, partition.clone());
        }

        state.pop_function();
    }

    Ok(state)
}

fn run_block(
    state: &mut RuntimeState,
    block: &ir::BasicBlock,
    config: &PassConfig,
    func_tag: &Interned,
) -> Result<(), PassError> {
    for instr in &block.instrs {
        if config.tally_inst_mix {
            let idx = opcode_index(instr);
            let bundle = state.pending_mut();
            if bundle.inst_mix_tracked() {
                bundle.inst_mix_histo[idx] += 1;
            }
        }

        match instr {
            Instr::Load { addr, ty, is_pointer } => {
                record_load_store(state, false, *addr, ty, *is_pointer, config)?;
            }
            Instr::Store { addr, ty, is_pointer } => {
                record_load_store(state, true, *addr, ty, *is_pointer, config)?;
            }
            Instr::Call {
                callee: _,
                ignored,
                mem_intrinsic,
            } => {
                let effect = classify::classify_call(*ignored, *mem_intrinsic);
                if !*ignored {
                    state.push_basic_block();
                }
                let bundle = state.pending_mut();
                bundle.call_ins += effect.call_ins;
                if let Some((family, len)) = effect.intrinsic {
                    use byfl_runtime::MemIntrinsic::*;
                    match family {
                        classify::IntrinsicFamily::Memset => {
                            bundle[MemsetCalls] += 1;
                            bundle[MemsetBytes] += len;
                        }
                        classify::IntrinsicFamily::Memxfer => {
                            bundle[MemxferCalls] += 1;
                            bundle[MemxferBytes] += len;
                        }
                    }
                }
                if !*ignored {
                    state.accumulate_bb_tallies();
                    state.pop_basic_block();
                }
            }
            Instr::GetElementPtr { constant_operand } => {
                let effect = classify::classify_getelementptr(*constant_operand);
                let bundle = state.pending_mut();
                bundle.ops += effect.ops;
                bundle.op_bits += effect.op_bits;
            }
            Instr::Arith { ty, is_extract_or_insert } => {
                let effect = classify::classify_arith(ty, *is_extract_or_insert);
                let bundle = state.pending_mut();
                bundle.ops += effect.ops;
                bundle.op_bits += effect.op_bits;
                if effect.is_flop {
                    bundle.flops += 1;
                    bundle.fp_bits += effect.op_bits;
                }
                if config.vectors {
                    if let Some((num_elements, bits, is_flop)) = effect.vector_tally {
                        state.tally_vector_operation(
                            func_tag.clone(),
                            VectorShape {
                                num_elements: num_elements as u64,
                                element_bits: bits as u64,
                                is_flop,
                            },
                        );
                    }
                }
            }
            Instr::NoOp => {}
        }
    }

    state.pending_mut().add_terminator(block.terminator);
    Ok(())
}

fn record_load_store(
    state: &mut RuntimeState,
    is_store: bool,
    addr: u64,
    ty: &ir::OperandType,
    is_pointer: bool,
    config: &PassConfig,
) -> Result<(), PassError> {
    let effect = classify::classify_load_store(is_store, ty, is_pointer, config.track_types);

    {
        let bundle = state.pending_mut();
        if is_store {
            bundle.stores += effect.bytes;
            bundle.store_ins += 1;
        } else {
            bundle.loads += effect.bytes;
            bundle.load_ins += 1;
        }
        bundle.ops += 1;
        bundle.op_bits += ty.total_bits();
        if let Some(idx) = effect.mem_insts_index {
            if bundle.mem_insts_tracked() {
                bundle.mem_insts[idx] += 1;
            }
        }
    }

    if config.unique_bytes || config.mem_footprint {
        state.touch_unique_bytes(addr, effect.bytes);
    }

    if let Some(mode) = config.reuse_distance {
        let tracks_this_op = match mode {
            crate::config::ReuseDistanceMode::Loads => !is_store,
            crate::config::ReuseDistanceMode::Stores => is_store,
            crate::config::ReuseDistanceMode::Both => true,
        };
        if tracks_this_op {
            state.touch_reuse_distance(addr)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BasicBlock, ElementType, Function, OperandType};
    use byfl_runtime::Terminator;

    fn simple_module() -> Module {
        let mut module = Module::new("test.c");
        let mut main = Function::new("main");
        let mut block = BasicBlock::new(Terminator::Return);
        block.instrs.push(Instr::Load {
            addr: 1000,
            ty: OperandType::scalar(ElementType::Int, 64),
            is_pointer: false,
        });
        block.instrs.push(Instr::Store {
            addr: 1000,
            ty: OperandType::scalar(ElementType::Int, 64),
            is_pointer: false,
        });
        main.blocks.push(block);
        module.functions.push(main);
        module
    }

    #[test]
    fn runs_a_simple_module_and_rolls_up_counters() {
        let module = simple_module();
        let config = PassConfig {
            per_func: true,
            ..Default::default()
        };
        let state = run_module(&module, &config, None).unwrap();

        assert_eq!(state.global_totals().loads, 8);
        assert_eq!(state.global_totals().stores, 8);
        assert_eq!(state.global_totals().load_ins, 1);
        assert_eq!(state.global_totals().store_ins, 1);
        assert_eq!(
            state.global_totals().terminator_count(Terminator::Return),
            1
        );
    }

    #[test]
    fn excluded_functions_are_not_instrumented() {
        let module = simple_module();
        let config = PassConfig {
            exclude: vec!["main".into()],
            ..Default::default()
        };
        let state = run_module(&module, &config, None).unwrap();
        assert_eq!(state.global_totals().loads, 0);
    }

    #[test]
    fn call_boundary_keeps_callee_traffic_out_of_caller_bundle() {
        let mut module = Module::new("test.c");
        let mut main = Function::new("main");
        let mut block = BasicBlock::new(Terminator::Return);
        block.instrs.push(Instr::Call {
            callee: "helper".to_string(),
            ignored: false,
            mem_intrinsic: None,
        });
        main.blocks.push(block);
        module.functions.push(main);

        let config = PassConfig::default();
        let state = run_module(&module, &config, None).unwrap();
        assert_eq!(state.global_totals().call_ins, 1);
        assert_eq!(state.global_totals().loads, 0);
    }

    #[test]
    fn memcpy_intrinsic_bumps_mem_intrinsic_cells_not_load_store() {
        let mut module = Module::new("test.c");
        let mut main = Function::new("main");
        let mut block = BasicBlock::new(Terminator::Return);
        block.instrs.push(Instr::Call {
            callee: "memcpy".to_string(),
            ignored: false,
            mem_intrinsic: Some((crate::ir::MemIntrinsicKind::Memcpy, 4096)),
        });
        main.blocks.push(block);
        module.functions.push(main);

        let config = PassConfig::default();
        let state = run_module(&module, &config, None).unwrap();
        use byfl_runtime::MemIntrinsic::*;
        assert_eq!(state.global_totals()[MemxferCalls], 1);
        assert_eq!(state.global_totals()[MemxferBytes], 4096);
        assert_eq!(state.global_totals().loads + state.global_totals().stores, 0);
    }

    #[test]
    fn every_bb_reports_a_row_per_block() {
        let mut module = Module::new("test.c");
        let mut main = Function::new("main");
        for _ in 0..2 {
            let mut block = BasicBlock::new(Terminator::Return);
            block.instrs.push(Instr::Load {
                addr: 1000,
                ty: OperandType::scalar(ElementType::Int, 64),
                is_pointer: false,
            });
            main.blocks.push(block);
        }
        module.functions.push(main);

        let config = PassConfig {
            every_bb: true,
            ..Default::default()
        };
        let state = run_module(&module, &config, None).unwrap();
        assert_eq!(state.bb_reports().len(), 2);
        assert!(state.bb_reports().iter().all(|(_, b)| b.loads == 8));
    }

    #[test]
    fn call_stack_keys_per_func_totals_by_combined_name() {
        let mut module = Module::new("test.c");
        let mut main = Function::new("main");
        let mut block = BasicBlock::new(Terminator::Return);
        block.instrs.push(Instr::Load {
            addr: 1000,
            ty: OperandType::scalar(ElementType::Int, 64),
            is_pointer: false,
        });
        main.blocks.push(block);
        module.functions.push(main);

        let by_key = PassConfig {
            per_func: true,
            ..Default::default()
        };
        let state = run_module(&module, &by_key, None).unwrap();
        assert_eq!(state.per_func_totals().len(), 1);

        let by_call_stack = PassConfig {
            per_func: true,
            call_stack: true,
            ..Default::default()
        };
        let state = run_module(&module, &by_call_stack, None).unwrap();
        assert_eq!(state.per_func_totals().len(), 1);
        let (_, bundle) = state.per_func_totals().iter().next().unwrap();
        assert_eq!(bundle.loads, 8);
    }

    #[test]
    fn config_validation_error_surfaces_before_any_instrumentation() {
        let module = simple_module();
        let config = PassConfig {
            call_stack: true, // requires per_func
            ..Default::default()
        };
        assert!(run_module(&module, &config, None).is_err());
    }
}
