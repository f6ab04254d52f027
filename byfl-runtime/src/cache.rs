//! Fully-associative LRU cache-miss-rate model.
//!
//! Grounded on `lib/byfl/cache-model.cpp`: each line access walks the line
//! list from most- to least-recently-used, classifies the match against
//! every other line by how many high-order address bits (above the
//! line-offset bits) it shares, and turns that per-line tally into a
//! reuse-distance-in-sets histogram for every cache size from one set up to
//! `2^(max_set_bits-1)` sets.

use crate::fast_hash_map::FastHashMap;

/// One (conceptually per-thread) fully-associative cache instance.
pub struct Cache {
    /// MRU at the back, LRU at the front.
    lines: Vec<u64>,
    line_size: u64,
    log2_line_size: u32,
    max_set_bits: u32,
    accesses: u64,
    split_accesses: u64,
    cold_misses: u64,
    /// `hits[set]` maps a reuse distance, expressed in units of `2^set`
    /// lines, to how many times an access at that distance hit a
    /// `2^set`-line cache.
    hits: Vec<FastHashMap<u64, u64>>,
}

impl Cache {
    pub fn new(line_size: u64, max_set_bits: u32) -> Self {
        assert!(line_size.is_power_of_two(), "line size must be a power of two");
        assert!(max_set_bits >= 1, "must track at least one set-size bit");
        Cache {
            lines: Vec::new(),
            line_size,
            log2_line_size: line_size.trailing_zeros(),
            max_set_bits,
            accesses: 0,
            split_accesses: 0,
            cold_misses: 0,
            hits: vec![FastHashMap::default(); max_set_bits as usize],
        }
    }

    /// Number of leading (high-order, line-offset-bits-excluded) bits `a`
    /// and `b` share, clamped to `max_set_bits - 1`.
    fn right_match(&self, a: u64, b: u64) -> usize {
        let diff_bits = ((a ^ b) >> self.log2_line_size) | (1u64 << (self.max_set_bits - 1));
        diff_bits.trailing_zeros() as usize
    }

    /// Records an access to `num_addrs` bytes starting at `base_addr`,
    /// walking every cache line touched by the range.
    pub fn access(&mut self, base_addr: u64, num_addrs: u64) {
        let mut num_accesses = 0u64;
        let mut addr = base_addr / self.line_size * self.line_size;
        let end = (base_addr + num_addrs) / self.line_size * self.line_size;

        while addr <= end {
            num_accesses += 1;
            let mut right_match_tally = vec![0u64; self.max_set_bits as usize];
            let mut found_idx = None;
            for (i, &line) in self.lines.iter().enumerate().rev() {
                let rm = self.right_match(addr, line);
                right_match_tally[rm] += 1;
                if addr == line {
                    found_idx = Some(i);
                    break;
                }
            }

            if let Some(i) = found_idx {
                self.lines.remove(i);
                let mut sum = 0u64;
                for set in (0..self.max_set_bits as usize).rev() {
                    right_match_tally[set] += sum;
                    sum = right_match_tally[set];
                }
                for set in 0..self.max_set_bits as usize {
                    let idx = right_match_tally[set] * (1u64 << set);
                    *self.hits[set].entry(idx).or_insert(0) += 1;
                }
            } else {
                self.cold_misses += 1;
            }

            self.lines.push(addr);
            addr += self.line_size;
        }

        self.accesses += num_accesses;
        if num_accesses != 1 {
            self.split_accesses += 1;
        }
    }

    pub fn accesses(&self) -> u64 {
        self.accesses
    }

    pub fn cold_misses(&self) -> u64 {
        self.cold_misses
    }

    pub fn split_accesses(&self) -> u64 {
        self.split_accesses
    }

    pub fn hits(&self) -> &[FastHashMap<u64, u64>] {
        &self.hits
    }
}

/// Owns one [`Cache`] per concurrent accessor (conceptually one per thread,
/// as `bf_touch_cache` lazily allocates via a thread-local pointer) and
/// aggregates their statistics, mirroring `bf_get_cache_accesses` /
/// `bf_get_cache_hits` / `bf_get_cold_misses` / `bf_get_split_accesses`.
pub struct CacheModel {
    line_size: u64,
    max_set_bits: u32,
    caches: Vec<Cache>,
}

impl CacheModel {
    pub fn new(line_size: u64, max_set_bits: u32) -> Self {
        CacheModel {
            line_size,
            max_set_bits,
            caches: Vec::new(),
        }
    }

    /// Allocates a fresh per-accessor cache, returning a handle for use
    /// with [`Self::touch`].
    pub fn new_cache(&mut self) -> usize {
        self.caches.push(Cache::new(self.line_size, self.max_set_bits));
        self.caches.len() - 1
    }

    pub fn touch(&mut self, cache_id: usize, base_addr: u64, num_addrs: u64) {
        self.caches[cache_id].access(base_addr, num_addrs);
    }

    pub fn total_accesses(&self) -> u64 {
        self.caches.iter().map(Cache::accesses).sum()
    }

    pub fn total_cold_misses(&self) -> u64 {
        self.caches.iter().map(Cache::cold_misses).sum()
    }

    pub fn total_split_accesses(&self) -> u64 {
        self.caches.iter().map(Cache::split_accesses).sum()
    }

    /// Sums every cache's hit histogram set-by-set. The result has
    /// `max_set_bits + 1` entries, matching the original's allocation; the
    /// final entry is always empty since no individual cache ever populates
    /// past `max_set_bits - 1`.
    pub fn aggregate_hits(&self) -> Vec<FastHashMap<u64, u64>> {
        let mut total = vec![FastHashMap::default(); self.max_set_bits as usize + 1];
        for cache in &self.caches {
            for (set, tally) in cache.hits().iter().enumerate() {
                for (&idx, &count) in tally {
                    *total[set].entry(idx).or_insert(0) += count;
                }
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_access_to_a_line_is_a_cold_miss() {
        let mut cache = Cache::new(64, 4);
        cache.access(0, 1);
        assert_eq!(cache.cold_misses(), 1);
        assert_eq!(cache.accesses(), 1);
    }

    #[test]
    fn repeated_access_to_same_line_hits_every_set_size() {
        let mut cache = Cache::new(64, 4);
        cache.access(0, 1); // cold miss, line now in the cache
        cache.access(0, 1); // immediate re-access: nothing else in between
        assert_eq!(cache.cold_misses(), 1);
        for set in 0..4 {
            let total_hits: u64 = cache.hits()[set].values().sum();
            assert_eq!(total_hits, 1);
        }
    }

    #[test]
    fn a_wide_access_spanning_multiple_lines_counts_as_split() {
        let mut cache = Cache::new(64, 4);
        cache.access(0, 128); // spans 3 lines: 0, 64, 128
        assert_eq!(cache.accesses(), 3);
        assert_eq!(cache.split_accesses(), 1);
    }

    #[test]
    fn single_line_access_is_not_split() {
        let mut cache = Cache::new(64, 4);
        cache.access(0, 8);
        assert_eq!(cache.split_accesses(), 0);
    }

    #[test]
    fn cache_model_aggregates_across_multiple_handles() {
        let mut model = CacheModel::new(64, 4);
        let a = model.new_cache();
        let b = model.new_cache();
        model.touch(a, 0, 1);
        model.touch(b, 0, 1);
        assert_eq!(model.total_accesses(), 2);
        assert_eq!(model.total_cold_misses(), 2);

        let hits = model.aggregate_hits();
        assert_eq!(hits.len(), 5); // max_set_bits + 1
        assert!(hits[4].is_empty());
    }

    #[test]
    fn reaccessing_a_line_pushed_out_by_many_others_is_not_a_cold_miss() {
        let mut cache = Cache::new(64, 4);
        cache.access(0, 1);
        for line in 1..20u64 {
            cache.access(line * 64, 1);
        }
        cache.access(0, 1);
        assert_eq!(cache.cold_misses(), 20); // the 20 distinct first-touches, not the re-touch
    }
}
