//! Per-call-point stride classification and vector-operation tallying.
//!
//! Grounded on `lib/byfl/strides.cpp` (`AccessPattern`, `increment_tally`,
//! `bf_track_stride`, `bf_partition_unique_addresses`) and
//! `lib/byfl/vectors.cpp` (`VectorOperation`, `bf_tally_vector_operation`,
//! `bf_get_vector_statistics`).

use std::collections::BTreeMap;

use crate::fast_hash_map::FastHashMap;
use crate::pagetable::BitPageTable;
use crate::symbol::Interned;

/// log_2 of the largest word stride tracked precisely; larger power-of-two
/// strides fall into [`OTHER_STRIDE`] alongside non-power-of-two ones.
pub const MAX_POW2_STRIDE: usize = 6;
/// Bucket for a repeated access to the same address (stride of zero).
pub const ZERO_STRIDE: usize = MAX_POW2_STRIDE + 1;
/// Bucket for any non-zero, non-power-of-two (or too-large) word stride.
pub const OTHER_STRIDE: usize = ZERO_STRIDE + 1;
/// Number of buckets in [`AccessPattern::stride_tally`].
pub const NUM_STRIDES: usize = OTHER_STRIDE + 1;

/// The page size `touched_data` page tables are keyed on, local to this
/// module and distinct from the page size a cache model or global
/// unique-byte tracker might use elsewhere.
const LOGICAL_PAGE_SIZE: usize = 1024;

/// One call point's strided-access history (spec.md §3 "Access pattern").
pub struct AccessPattern {
    prev_addr: u64,
    num_bytes: u64,
    pub stride_tally: [u64; NUM_STRIDES],
    pub backward_strides: u64,
    pub total_strides: u64,
    pub is_store: bool,
    /// `Some` only when unique-byte or footprint tracking is enabled,
    /// mirroring the original's `touched_data == nullptr` gate.
    touched_data: Option<BitPageTable>,
}

impl AccessPattern {
    fn new(base_addr: u64, num_bytes: u64, is_store: bool, track_bytes: bool) -> Self {
        let mut touched_data =
            track_bytes.then(|| BitPageTable::new(LOGICAL_PAGE_SIZE));
        if let Some(pt) = touched_data.as_mut() {
            pt.access(base_addr, num_bytes);
        }
        AccessPattern {
            prev_addr: base_addr,
            num_bytes,
            stride_tally: [0; NUM_STRIDES],
            backward_strides: 0,
            total_strides: 0,
            is_store,
            touched_data,
        }
    }

    /// Classifies the stride from the previous access to `new_addr` and
    /// tallies it, then records `new_addr` as the new previous address.
    fn increment_tally(&mut self, new_addr: u64) {
        self.total_strides += 1;

        if new_addr == self.prev_addr {
            self.stride_tally[ZERO_STRIDE] += 1;
            return;
        }

        if self.prev_addr > new_addr {
            self.backward_strides += 1;
        }

        let abs_stride = new_addr.abs_diff(self.prev_addr);
        if self.num_bytes == 0 || abs_stride % self.num_bytes != 0 {
            self.stride_tally[OTHER_STRIDE] += 1;
            return;
        }

        let word_stride = abs_stride / self.num_bytes;
        if word_stride != 0 && (word_stride & (word_stride - 1)) == 0 {
            let log2_stride = word_stride.trailing_zeros() as usize;
            if log2_stride <= MAX_POW2_STRIDE {
                self.stride_tally[log2_stride] += 1;
            } else {
                self.stride_tally[OTHER_STRIDE] += 1;
            }
            return;
        }

        self.stride_tally[OTHER_STRIDE] += 1;
    }

    /// Bytes per access (word size) at this call point.
    pub fn num_bytes(&self) -> u64 {
        self.num_bytes
    }

    /// Number of distinct bytes touched by this call point, if tracked.
    pub fn unique_bytes(&self) -> Option<u64> {
        self.touched_data.as_ref().map(|pt| pt.tally_unique())
    }

    /// Sum of the power-of-two and zero-stride buckets: the number of
    /// accesses this call point made to a single, unchanging word address.
    fn nonzero_pow2_strides(&self) -> u64 {
        self.stride_tally[..=MAX_POW2_STRIDE].iter().sum()
    }
}

/// Tracks every call point's [`AccessPattern`], keyed by its symbol-info ID.
/// A `BTreeMap` (rather than a hash map) mirrors the original's
/// `CachedOrderedMap`, whose ordering downstream reports rely on as a stable
/// iteration order prior to the by-total-strides sort.
pub struct StrideTracker {
    patterns: BTreeMap<u64, AccessPattern>,
    track_bytes: bool,
}

impl StrideTracker {
    /// `track_bytes` mirrors `bf_unique_bytes || bf_mem_footprint`: whether
    /// each call point additionally maintains a per-byte touch page table.
    pub fn new(track_bytes: bool) -> Self {
        StrideTracker {
            patterns: BTreeMap::new(),
            track_bytes,
        }
    }

    /// Records an access of `num_bytes` bytes at `base_addr` from the call
    /// point identified by `symbol_id`, mirroring `bf_track_stride`.
    pub fn track_stride(
        &mut self,
        symbol_id: u64,
        base_addr: u64,
        num_bytes: u64,
        is_store: bool,
    ) {
        match self.patterns.get_mut(&symbol_id) {
            None => {
                self.patterns.insert(
                    symbol_id,
                    AccessPattern::new(base_addr, num_bytes, is_store, self.track_bytes),
                );
            }
            Some(info) => {
                info.increment_tally(base_addr);
                info.prev_addr = base_addr;
                if let Some(pt) = info.touched_data.as_mut() {
                    pt.access(base_addr, num_bytes);
                }
            }
        }
    }

    pub fn get(&self, symbol_id: u64) -> Option<&AccessPattern> {
        self.patterns.get(&symbol_id)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &AccessPattern)> {
        self.patterns.iter()
    }

    /// Splits every call point's touched-byte page table into one of two
    /// aggregate tables: uni-targeted (UTI, every observed stride was zero
    /// or a tracked power of two — the call point always lands on the same
    /// word or a regular multiple of it) or multi-targeted (MTI, some
    /// stride fell into [`OTHER_STRIDE`] or an untracked large power of
    /// two). Returns `(unique bytes touched by UTI call points, unique
    /// bytes touched by MTI call points)`, mirroring
    /// `bf_partition_unique_addresses`.
    pub fn partition_unique_addresses(&self) -> (u64, u64) {
        let mut uti_pt = BitPageTable::new(LOGICAL_PAGE_SIZE);
        let mut mti_pt = BitPageTable::new(LOGICAL_PAGE_SIZE);
        for info in self.patterns.values() {
            let Some(touched) = info.touched_data.as_ref() else {
                continue;
            };
            if info.nonzero_pow2_strides() == info.total_strides {
                uti_pt.merge_from(touched);
            } else {
                mti_pt.merge_from(touched);
            }
        }
        (uti_pt.tally_unique(), mti_pt.tally_unique())
    }
}

/// The `(element count, bits per element, is-floating-point)` signature of
/// one vector operation, used as a tally key (spec.md §3 "Vector shape").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorShape {
    pub num_elements: u64,
    pub element_bits: u64,
    pub is_flop: bool,
}

/// Tallies vector operations by an arbitrary tag (a function's combined
/// call-stack name, or a user-defined partition label), mirroring the
/// `name_to_vector_t` maps `bf_tally_vector_operation` updates.
#[derive(Default)]
pub struct VectorTracker {
    by_tag: FastHashMap<Interned, FastHashMap<VectorShape, u64>>,
}

impl VectorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tally(&mut self, tag: Interned, shape: VectorShape) {
        *self.by_tag.entry(tag).or_default().entry(shape).or_insert(0) += 1;
    }

    /// Aggregate `(operation count, total elements, total bits)` across
    /// every tag, mirroring the tag-less overload of
    /// `bf_get_vector_statistics`.
    pub fn statistics(&self) -> (u64, u64, u64) {
        let mut num_ops = 0u64;
        let mut total_elts = 0u64;
        let mut total_bits = 0u64;
        for tally in self.by_tag.values() {
            for (shape, count) in tally {
                num_ops += count;
                total_elts += shape.num_elements * count;
                total_bits += shape.element_bits * count;
            }
        }
        (num_ops, total_elts, total_bits)
    }

    /// Same as [`Self::statistics`] but restricted to a single tag,
    /// mirroring the tagged overload of `bf_get_vector_statistics`. Returns
    /// `(0, 0, 0)` for a tag never tallied.
    pub fn statistics_for_tag(&self, tag: &str) -> (u64, u64, u64) {
        let Some(tally) = self.by_tag.get(tag) else {
            return (0, 0, 0);
        };
        let mut num_ops = 0u64;
        let mut total_elts = 0u64;
        let mut total_bits = 0u64;
        for (shape, count) in tally {
            num_ops += count;
            total_elts += shape.num_elements * count;
            total_bits += shape.element_bits * count;
        }
        (num_ops, total_elts, total_bits)
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_same_address_is_zero_stride() {
        let mut t = StrideTracker::new(false);
        t.track_stride(1, 100, 8, false);
        t.track_stride(1, 100, 8, false);
        let info = t.get(1).unwrap();
        assert_eq!(info.stride_tally[ZERO_STRIDE], 1);
        assert_eq!(info.total_strides, 1);
    }

    #[test]
    fn unit_word_stride_forward() {
        let mut t = StrideTracker::new(false);
        t.track_stride(1, 0, 8, false);
        t.track_stride(1, 8, 8, false);
        let info = t.get(1).unwrap();
        assert_eq!(info.stride_tally[0], 1); // 2^0 word stride
        assert_eq!(info.backward_strides, 0);
    }

    #[test]
    fn power_of_two_word_stride_is_bucketed_by_log2() {
        let mut t = StrideTracker::new(false);
        t.track_stride(1, 0, 8, false);
        t.track_stride(1, 32, 8, false); // word stride = 4 = 2^2
        let info = t.get(1).unwrap();
        assert_eq!(info.stride_tally[2], 1);
    }

    #[test]
    fn backward_stride_is_tallied_independently_of_bucket() {
        let mut t = StrideTracker::new(false);
        t.track_stride(1, 64, 8, false);
        t.track_stride(1, 0, 8, false); // backward, word stride 8 -> bucket 3
        let info = t.get(1).unwrap();
        assert_eq!(info.backward_strides, 1);
        assert_eq!(info.stride_tally[3], 1);
    }

    #[test]
    fn non_multiple_of_word_size_is_other() {
        let mut t = StrideTracker::new(false);
        t.track_stride(1, 0, 8, false);
        t.track_stride(1, 5, 8, false); // stride 5, not a multiple of 8
        let info = t.get(1).unwrap();
        assert_eq!(info.stride_tally[OTHER_STRIDE], 1);
    }

    #[test]
    fn large_power_of_two_beyond_max_is_other() {
        let mut t = StrideTracker::new(false);
        t.track_stride(1, 0, 8, false);
        let big_word_stride = 1u64 << (MAX_POW2_STRIDE + 3);
        t.track_stride(1, big_word_stride * 8, 8, false);
        let info = t.get(1).unwrap();
        assert_eq!(info.stride_tally[OTHER_STRIDE], 1);
    }

    #[test]
    fn non_power_of_two_word_stride_is_other() {
        let mut t = StrideTracker::new(false);
        t.track_stride(1, 0, 8, false);
        t.track_stride(1, 24, 8, false); // word stride 3, not a power of two
        let info = t.get(1).unwrap();
        assert_eq!(info.stride_tally[OTHER_STRIDE], 1);
    }

    #[test]
    fn byte_tracking_is_opt_in() {
        let mut untracked = StrideTracker::new(false);
        untracked.track_stride(1, 0, 8, false);
        assert!(untracked.get(1).unwrap().unique_bytes().is_none());

        let mut tracked = StrideTracker::new(true);
        tracked.track_stride(1, 0, 8, false);
        assert_eq!(tracked.get(1).unwrap().unique_bytes(), Some(8));
    }

    #[test]
    fn partition_unique_addresses_splits_uti_from_mti() {
        let mut t = StrideTracker::new(true);
        // Call point 1: always a unit word stride -> UTI.
        t.track_stride(1, 0, 8, false);
        t.track_stride(1, 8, 8, false);
        t.track_stride(1, 16, 8, false);
        // Call point 2: one OTHER stride -> MTI.
        t.track_stride(2, 100, 8, false);
        t.track_stride(2, 105, 8, false);

        let (uti, mti) = t.partition_unique_addresses();
        assert_eq!(uti, 24); // three non-overlapping 8-byte accesses at 0,8,16
        assert_eq!(mti, 13); // 100..=107 union 105..=112, overlapping on 105..=107
    }

    #[test]
    fn vector_tracker_tallies_by_shape_and_tag() {
        let mut v = VectorTracker::new();
        let tag: Interned = Interned::from("main");
        let shape = VectorShape {
            num_elements: 4,
            element_bits: 32,
            is_flop: true,
        };
        v.tally(tag.clone(), shape);
        v.tally(tag.clone(), shape);

        let (num_ops, total_elts, total_bits) = v.statistics();
        assert_eq!(num_ops, 2);
        assert_eq!(total_elts, 8);
        assert_eq!(total_bits, 64);

        let (tag_ops, ..) = v.statistics_for_tag("main");
        assert_eq!(tag_ops, 2);
        let (missing_ops, missing_elts, missing_bits) = v.statistics_for_tag("nope");
        assert_eq!((missing_ops, missing_elts, missing_bits), (0, 0, 0));
    }
}
