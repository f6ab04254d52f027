//! The counter & aggregation engine (spec.md §4.2): thread-local tallies
//! rolled into a per-basic-block bundle, rolled in turn into global,
//! per-function, and user-defined-partition totals, plus the `RuntimeState`
//! facade that ties every other engine in this crate together.
//!
//! Grounded on `lib/byfl/basicblocks.cpp`'s `bf_accumulate_bb_tallies` /
//! `bf_reset_bb_tallies` / `bf_push_basic_block` / `bf_pop_basic_block` and
//! `lib/byfl/byfl.cpp`'s `bf_push_function` / `bf_pop_function` /
//! `bf_initialize_if_necessary`.

use crate::cache::CacheModel;
use crate::counters::CounterBundle;
use crate::dstruct::{DataStructureTracker, StaticSymbol};
use crate::error::RuntimeError;
use crate::fast_hash_map::FastHashMap;
use crate::pagetable::BitPageTable;
use crate::reuse_distance::ReuseDistanceEngine;
use crate::stride::{StrideTracker, VectorShape, VectorTracker};
use crate::symbol::{CallStack, Interned, SymbolTable};

/// Which optional tracking modes a [`RuntimeState`] carries, mirroring the
/// command-line flags of spec.md §4.1's "Configuration surface" that this
/// crate's engines (rather than `byfl-pass`'s `PassConfig`) need to know
/// about to allocate the right bookkeeping up front.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Whether `end_basic_block` rolls counters into `per_func_totals` at
    /// all. Mirrors `lib/bytesflops/bytesflops.cpp`'s `TallyByFunction`
    /// guard around `assoc_counts_with_func`: with this off, no call ever
    /// populates `per_func_totals`, not even under key `0`.
    pub per_func: bool,
    /// Whether `end_basic_block` also calls `bf_report_bb_tallies` and
    /// appends a row to `bb_reports`, one row per basic block (or per
    /// `bb_merge`-sized batch of them).
    pub every_bb: bool,
    /// How many consecutive basic blocks' worth of per-BB reporting to
    /// merge into one `bb_reports` row; `0` reports every block
    /// individually.
    pub bb_merge: u64,
    pub track_mem_insts: bool,
    pub inst_mix_opcodes: Option<usize>,
    pub track_unique_bytes: bool,
    pub unique_bytes_page_size: usize,
    pub reuse_distance_window: Option<u64>,
    pub cache_model: Option<(u64, u32)>,
}

/// Ties together every engine in this crate: the symbol table, call stack,
/// the three-scope counter roll-up, the optional unique-byte page table,
/// reuse-distance tree, data-structure tracker, stride/vector trackers, and
/// cache model (spec.md §1 "the aggregation engine ... behind a
/// `RuntimeState`").
pub struct RuntimeState {
    config: RuntimeConfig,

    pub symtab: SymbolTable,
    pub call_stack: CallStack,

    /// The "thread-local" counters instrumented code increments directly.
    /// Modeled as a single bundle rather than one per OS thread, since this
    /// crate's synthetic-workload harness runs single-threaded; see
    /// DESIGN.md.
    pending: CounterBundle,
    bb_stack: Vec<CounterBundle>,
    free_bb_pool: Vec<CounterBundle>,

    global_totals: CounterBundle,
    per_func_totals: FastHashMap<u64, CounterBundle>,
    user_defined_totals: FastHashMap<Interned, CounterBundle>,
    func_call_tallies: FastHashMap<u64, u64>,

    /// Rows emitted by `bf_report_bb_tallies`, one per basic block or
    /// `bb_merge`-sized batch, only populated when `every_bb` is set.
    bb_reports: Vec<(u64, CounterBundle)>,
    bb_report_accum: CounterBundle,
    bb_report_count: u64,

    unique_bytes: Option<BitPageTable>,
    reuse_dist: Option<ReuseDistanceEngine>,
    pub dstruct: DataStructureTracker,
    pub stride: StrideTracker,
    pub vectors: VectorTracker,
    cache: Option<CacheModel>,
}

impl RuntimeState {
    pub fn new(config: RuntimeConfig) -> Self {
        let unique_bytes = config
            .track_unique_bytes
            .then(|| BitPageTable::new(config.unique_bytes_page_size.max(1)));
        let reuse_dist = config.reuse_distance_window.map(ReuseDistanceEngine::new);
        let cache = config
            .cache_model
            .map(|(line_size, max_set_bits)| CacheModel::new(line_size, max_set_bits));

        let mut pending = CounterBundle::new();
        if config.track_mem_insts {
            pending.enable_mem_insts_tracking();
        }
        if let Some(n) = config.inst_mix_opcodes {
            pending.enable_inst_mix_tracking(n);
        }

        let mut bb_report_accum = CounterBundle::new();
        if config.track_mem_insts {
            bb_report_accum.enable_mem_insts_tracking();
        }
        if let Some(n) = config.inst_mix_opcodes {
            bb_report_accum.enable_inst_mix_tracking(n);
        }

        RuntimeState {
            config,
            symtab: SymbolTable::new(),
            call_stack: CallStack::new(),
            pending,
            bb_stack: Vec::new(),
            free_bb_pool: Vec::new(),
            global_totals: CounterBundle::new(),
            per_func_totals: FastHashMap::default(),
            user_defined_totals: FastHashMap::default(),
            func_call_tallies: FastHashMap::default(),
            bb_reports: Vec::new(),
            bb_report_accum,
            bb_report_count: 0,
            unique_bytes,
            reuse_dist,
            dstruct: DataStructureTracker::new(),
            stride: StrideTracker::new(config.track_unique_bytes),
            vectors: VectorTracker::new(),
            cache,
        }
    }

    fn fresh_bundle(&self) -> CounterBundle {
        let mut bundle = CounterBundle::new();
        if self.config.track_mem_insts {
            bundle.enable_mem_insts_tracking();
        }
        if let Some(n) = self.config.inst_mix_opcodes {
            bundle.enable_inst_mix_tracking(n);
        }
        bundle
    }

    /// Direct access to the thread-local counters instrumented code
    /// increments, e.g. `state.pending_mut().loads += width_bytes`.
    pub fn pending_mut(&mut self) -> &mut CounterBundle {
        &mut self.pending
    }

    /// Registers a new function activation: pushes the combined call-stack
    /// name and bumps its invocation tally, mirroring `bf_push_function`.
    pub fn push_function(&mut self, funcname: &str, key: u64) -> Interned {
        *self.func_call_tallies.entry(key).or_insert(0) += 1;
        self.call_stack.push_function(&self.symtab, funcname, key)
    }

    /// Mirrors `bf_pop_function`.
    pub fn pop_function(&mut self) -> (Interned, u64) {
        self.call_stack.pop_function(&self.symtab)
    }

    /// Pushes a fresh per-BB bundle onto the stack, used around call
    /// instructions so the callee's tallies don't leak into the caller's
    /// current block (mirrors `bf_push_basic_block`).
    pub fn push_basic_block(&mut self) {
        let bundle = self.free_bb_pool.pop().unwrap_or_else(|| self.fresh_bundle());
        self.bb_stack.push(bundle);
    }

    /// Mirrors `bf_pop_basic_block`: discards the top-of-stack bundle back
    /// to the free-list pool, exposing the caller's bundle underneath.
    pub fn pop_basic_block(&mut self) {
        if let Some(mut bundle) = self.bb_stack.pop() {
            bundle.reset();
            self.free_bb_pool.push(bundle);
        }
    }

    /// Folds the thread-local counters into the top-of-stack per-BB bundle
    /// and zeroes them, mirroring `bf_accumulate_bb_tallies`'s first half.
    pub fn accumulate_bb_tallies(&mut self) {
        if self.bb_stack.is_empty() {
            self.push_basic_block();
        }
        if let Some(top) = self.bb_stack.last_mut() {
            top.accumulate(&self.pending);
        }
        self.pending.reset();
    }

    /// Zeroes the top-of-stack per-BB bundle without popping it, mirroring
    /// `bf_reset_bb_tallies`.
    pub fn reset_bb_tallies(&mut self) {
        if let Some(top) = self.bb_stack.last_mut() {
            top.reset();
        }
    }

    /// The full end-of-basic-block roll-up (spec.md §4.1 "End-of-basic-block
    /// code" / §4.2 `accumulate_bb_tallies`): folds thread-local counters
    /// into the current per-BB bundle, then that bundle into `global_totals`,
    /// `per_func_totals[func_key]` (only if `per_func` is enabled), and (if
    /// `partition` is `Some`) `user_defined_totals[partition]`, and finally
    /// resets the per-BB bundle for the next block.
    pub fn end_basic_block(&mut self, func_key: u64, partition: Option<Interned>) {
        self.accumulate_bb_tallies();
        if let Some(top) = self.bb_stack.last() {
            self.global_totals.accumulate(top);
            if self.config.per_func {
                self.per_func_totals
                    .entry(func_key)
                    .or_insert_with(|| self.fresh_bundle())
                    .accumulate(top);
            }
            if let Some(tag) = partition {
                self.user_defined_totals
                    .entry(tag)
                    .or_insert_with(|| self.fresh_bundle())
                    .accumulate(top);
            }
            if self.config.every_bb {
                self.report_bb_tallies(func_key);
            }
        }
        self.reset_bb_tallies();
    }

    /// Mirrors `bf_report_bb_tallies`: folds the just-accumulated per-BB
    /// bundle into the merge-in-progress accumulator, and once `bb_merge`
    /// blocks have been batched (or immediately, when `bb_merge` is `0`),
    /// appends a row to `bb_reports` and starts a fresh batch.
    fn report_bb_tallies(&mut self, func_key: u64) {
        if let Some(top) = self.bb_stack.last() {
            self.bb_report_accum.accumulate(top);
        }
        self.bb_report_count += 1;
        let window = self.config.bb_merge.max(1);
        if self.bb_report_count >= window {
            let mut row = self.fresh_bundle();
            row.accumulate(&self.bb_report_accum);
            self.bb_reports.push((func_key, row));
            self.bb_report_accum.reset();
            self.bb_report_count = 0;
        }
    }

    /// Per-basic-block (or per-`bb_merge`-batch) report rows, only
    /// populated when `RuntimeConfig::every_bb` is set.
    pub fn bb_reports(&self) -> &[(u64, CounterBundle)] {
        &self.bb_reports
    }

    pub fn global_totals(&self) -> &CounterBundle {
        &self.global_totals
    }

    pub fn per_func_totals(&self) -> &FastHashMap<u64, CounterBundle> {
        &self.per_func_totals
    }

    pub fn user_defined_totals(&self) -> &FastHashMap<Interned, CounterBundle> {
        &self.user_defined_totals
    }

    pub fn func_call_tally(&self, key: u64) -> u64 {
        self.func_call_tallies.get(&key).copied().unwrap_or(0)
    }

    /// Registers a statically-allocated symbol with the data-structure
    /// tracker, a thin pass-through kept here so callers driving a whole
    /// run only need to hold a `RuntimeState`.
    pub fn register_static_symbol(&mut self, sym: &StaticSymbol) -> bool {
        self.dstruct.register_static_symbol(sym)
    }

    /// Records `num_addrs` bytes touched at `base_addr` in the program-wide
    /// unique-byte page table, a no-op when unique-byte tracking is off.
    pub fn touch_unique_bytes(&mut self, base_addr: u64, num_addrs: u64) {
        if let Some(pt) = self.unique_bytes.as_mut() {
            pt.access(base_addr, num_addrs);
        }
    }

    pub fn unique_bytes_tally(&self) -> Option<u64> {
        self.unique_bytes.as_ref().map(|pt| pt.tally_unique())
    }

    /// Feeds an address into the reuse-distance engine, a no-op when reuse
    /// distance tracking is off.
    pub fn touch_reuse_distance(&mut self, address: u64) -> Result<(), RuntimeError> {
        match self.reuse_dist.as_mut() {
            Some(engine) => engine.process_address(address),
            None => Ok(()),
        }
    }

    pub fn reuse_distance_stats(&self) -> Option<(&[u64], u64, (u64, u64))> {
        self.reuse_dist
            .as_ref()
            .map(|e| (e.histogram(), e.unique_addrs(), e.compute_median()))
    }

    /// Records a strided access at a call point and, if unique-byte or
    /// footprint tracking is active, also feeds the program-wide page
    /// table, mirroring the pass emitting both `bf_track_stride` and
    /// `bf_assoc_addresses_with_prog` calls at the same call site.
    pub fn track_stride(&mut self, symbol_id: u64, base_addr: u64, num_bytes: u64, is_store: bool) {
        self.stride.track_stride(symbol_id, base_addr, num_bytes, is_store);
        self.touch_unique_bytes(base_addr, num_bytes);
    }

    pub fn tally_vector_operation(&mut self, tag: Interned, shape: VectorShape) {
        self.vectors.tally(tag, shape);
    }

    /// Touches the cache model for the accessor identified by `cache_id`
    /// (see [`CacheModel::new_cache`]), a no-op when the cache model is
    /// disabled.
    pub fn touch_cache(&mut self, cache_id: usize, base_addr: u64, num_addrs: u64) {
        if let Some(cache) = self.cache.as_mut() {
            cache.touch(cache_id, base_addr, num_addrs);
        }
    }

    pub fn new_cache_accessor(&mut self) -> Option<usize> {
        self.cache.as_mut().map(CacheModel::new_cache)
    }

    pub fn cache_model(&self) -> Option<&CacheModel> {
        self.cache.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_basic_block_rolls_thread_locals_into_every_scope() {
        let mut state = RuntimeState::new(RuntimeConfig {
            per_func: true,
            ..Default::default()
        });
        state.push_basic_block();
        state.pending_mut().loads = 64;
        state.pending_mut().load_ins = 1;
        state.end_basic_block(42, None);

        assert_eq!(state.global_totals().loads, 64);
        assert_eq!(state.per_func_totals()[&42].loads, 64);
        assert!(state.user_defined_totals().is_empty());
    }

    #[test]
    fn per_func_totals_stay_empty_when_disabled() {
        let mut state = RuntimeState::new(RuntimeConfig::default());
        state.push_basic_block();
        state.pending_mut().loads = 64;
        state.end_basic_block(42, None);

        assert_eq!(state.global_totals().loads, 64);
        assert!(state.per_func_totals().is_empty());
    }

    #[test]
    fn partition_tag_rolls_up_alongside_func_and_global() {
        let mut state = RuntimeState::new(RuntimeConfig::default());
        let tag: Interned = Interned::from("hot-loop");
        state.push_basic_block();
        state.pending_mut().flops = 10;
        state.end_basic_block(1, Some(tag.clone()));

        assert_eq!(state.global_totals().flops, 10);
        assert_eq!(state.user_defined_totals()[&tag].flops, 10);
    }

    #[test]
    fn global_totals_equal_sum_of_per_func_totals_without_partitions() {
        let mut state = RuntimeState::new(RuntimeConfig {
            per_func: true,
            ..Default::default()
        });
        for key in [1u64, 2, 3] {
            state.push_basic_block();
            state.pending_mut().ops = key * 10;
            state.end_basic_block(key, None);
        }
        let sum: u64 = state.per_func_totals().values().map(|b| b.ops).sum();
        assert_eq!(state.global_totals().ops, sum);
    }

    #[test]
    fn push_function_tracks_call_stack_and_invocation_tally() {
        let mut state = RuntimeState::new(RuntimeConfig::default());
        let top = state.push_function("main", 100);
        assert_eq!(&*top, "main");
        assert_eq!(state.func_call_tally(100), 1);

        state.push_function("main", 100); // recursive call
        assert_eq!(state.func_call_tally(100), 2);
    }

    #[test]
    fn call_boundary_push_pop_preserves_caller_bb_counts() {
        let mut state = RuntimeState::new(RuntimeConfig::default());
        state.push_basic_block();
        state.pending_mut().call_ins = 1;
        state.accumulate_bb_tallies();

        state.push_basic_block(); // entering the callee
        state.pending_mut().loads = 999; // callee's own traffic
        state.accumulate_bb_tallies();
        state.pop_basic_block(); // back to the caller

        let caller_bundle = &state.bb_stack[0];
        assert_eq!(caller_bundle.call_ins, 1);
        assert_eq!(caller_bundle.loads, 0); // callee's traffic never leaked in
    }

    #[test]
    fn pending_counters_allocate_mem_insts_histogram_when_configured() {
        let mut state = RuntimeState::new(RuntimeConfig {
            track_mem_insts: true,
            per_func: true,
            ..Default::default()
        });
        state.push_basic_block();
        state.pending_mut().mem_insts[0] += 1;
        state.end_basic_block(1, None);
        assert_eq!(state.global_totals().mem_insts[0], 1);
        assert_eq!(state.per_func_totals()[&1].mem_insts[0], 1);
    }

    #[test]
    fn every_bb_reports_one_row_per_block_when_bb_merge_is_zero() {
        let mut state = RuntimeState::new(RuntimeConfig {
            every_bb: true,
            ..Default::default()
        });
        for loads in [8u64, 16, 32] {
            state.push_basic_block();
            state.pending_mut().loads = loads;
            state.end_basic_block(1, None);
        }
        let reports = state.bb_reports();
        assert_eq!(reports.len(), 3);
        assert_eq!(reports.iter().map(|(_, b)| b.loads).collect::<Vec<_>>(), vec![8, 16, 32]);
    }

    #[test]
    fn bb_merge_batches_consecutive_blocks_into_one_row() {
        let mut state = RuntimeState::new(RuntimeConfig {
            every_bb: true,
            bb_merge: 2,
            ..Default::default()
        });
        for loads in [8u64, 16, 32, 64] {
            state.push_basic_block();
            state.pending_mut().loads = loads;
            state.end_basic_block(1, None);
        }
        let reports = state.bb_reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].1.loads, 24);
        assert_eq!(reports[1].1.loads, 96);
    }

    #[test]
    fn no_bb_reports_when_every_bb_disabled() {
        let mut state = RuntimeState::new(RuntimeConfig::default());
        state.push_basic_block();
        state.pending_mut().loads = 8;
        state.end_basic_block(1, None);
        assert!(state.bb_reports().is_empty());
    }

    #[test]
    fn unique_bytes_and_reuse_distance_are_opt_in() {
        let mut off = RuntimeState::new(RuntimeConfig::default());
        off.touch_unique_bytes(0, 8);
        assert!(off.unique_bytes_tally().is_none());
        off.touch_reuse_distance(0).unwrap();
        assert!(off.reuse_distance_stats().is_none());

        let mut on = RuntimeState::new(RuntimeConfig {
            track_unique_bytes: true,
            unique_bytes_page_size: 4096,
            reuse_distance_window: Some(1000),
            ..Default::default()
        });
        on.touch_unique_bytes(0, 8);
        assert_eq!(on.unique_bytes_tally(), Some(8));
        on.touch_reuse_distance(1).unwrap();
        assert!(on.reuse_distance_stats().is_some());
    }
}
