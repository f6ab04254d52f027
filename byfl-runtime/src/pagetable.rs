//! Per-byte access tracking for unique-byte and footprint metrics.
//!
//! Grounded on `lib/byfl/pagetable.{h,cpp}`: a `PageTable<PTE>` maps page
//! number (`address / logical_page_size`) to a lazily-created page-table
//! entry, in either a 1-bit-per-byte variant (`BitPageTableEntry`, self-
//! deallocating its bit-vector once saturated) or a saturating-counter
//! variant (`WordPageTableEntry`, clamped at `u32::MAX`).

use crate::fast_hash_map::FastHashMap;

/// Per-byte access counter with saturating-add semantics at `u32::MAX`,
/// matching `bytecount_t` / `bf_max_bytecount` in `lib/byfl/byfl.h`.
pub type ByteCount = u32;

/// A single page's worth of per-byte tracking. Both variants expose the
/// same two operations (`increment`, `count`), so higher-level code is
/// generic over `PageTableEntry` rather than matching on a tag (spec.md
/// §10 "Dynamic dispatch": two operations, concrete types behind a small
/// capability interface).
pub trait PageTableEntry {
    fn new(logical_page_size: usize) -> Self;
    /// Marks bytes `pos1..=pos2` (inclusive, 0-based within the page) as
    /// touched.
    fn increment(&mut self, pos1: usize, pos2: usize);
    /// Number of distinct bytes touched so far.
    fn count(&self) -> usize;
}

/// Bit-per-byte page entry. Self-deallocates its bit-vector once every
/// byte on the page has been touched, since no further state needs to be
/// tracked past that point.
pub struct BitPageTableEntry {
    logical_page_size: usize,
    bytes_touched: usize,
    bits: Option<Vec<u64>>,
}

impl BitPageTableEntry {
    fn words(page_size: usize) -> usize {
        page_size.div_ceil(64)
    }

    /// Combines `other`'s touched bits into `self`. If `other` has already
    /// saturated (its bit-vector deallocated), every bit in `self` is set.
    pub fn merge(&mut self, other: &BitPageTableEntry) {
        let Some(bits) = self.bits.as_mut() else {
            return;
        };
        match &other.bits {
            None => {
                for word in bits.iter_mut() {
                    let before = word.count_ones();
                    *word = u64::MAX;
                    self.bytes_touched += (word.count_ones() - before) as usize;
                }
            }
            Some(other_bits) => {
                for (word, other_word) in bits.iter_mut().zip(other_bits.iter()) {
                    let newly_set = !*word & other_word;
                    self.bytes_touched += newly_set.count_ones() as usize;
                    *word |= other_word;
                }
            }
        }
        if self.bytes_touched >= self.logical_page_size {
            self.bits = None;
        }
    }
}

impl PageTableEntry for BitPageTableEntry {
    fn new(logical_page_size: usize) -> Self {
        BitPageTableEntry {
            logical_page_size,
            bytes_touched: 0,
            bits: Some(vec![0u64; Self::words(logical_page_size)]),
        }
    }

    fn increment(&mut self, pos1: usize, pos2: usize) {
        let Some(bits) = self.bits.as_mut() else {
            return;
        };
        for pos in pos1..=pos2 {
            let word_ofs = pos / 64;
            let bit_ofs = pos % 64;
            let mask = 1u64 << bit_ofs;
            if bits[word_ofs] & mask == 0 {
                bits[word_ofs] |= mask;
                self.bytes_touched += 1;
            }
        }
        if self.bytes_touched >= self.logical_page_size {
            self.bits = None;
        }
    }

    fn count(&self) -> usize {
        self.bytes_touched
    }
}

/// Saturating-counter-per-byte page entry.
pub struct WordPageTableEntry {
    bytes_touched: usize,
    counters: Vec<ByteCount>,
}

impl WordPageTableEntry {
    pub fn raw_counts(&self) -> &[ByteCount] {
        &self.counters
    }

    /// Sums `other`'s per-byte counters into `self` with saturation,
    /// incrementing `bytes_touched` for each position transitioning from
    /// zero to non-zero (spec.md §4.3).
    pub fn merge(&mut self, other: &WordPageTableEntry) {
        for (count0, count1) in self.counters.iter_mut().zip(other.counters.iter()) {
            if *count1 == 0 {
                continue;
            }
            let was_zero = *count0 == 0;
            *count0 = count0.saturating_add(*count1);
            if was_zero {
                self.bytes_touched += 1;
            }
        }
    }
}

impl PageTableEntry for WordPageTableEntry {
    fn new(logical_page_size: usize) -> Self {
        WordPageTableEntry {
            bytes_touched: 0,
            counters: vec![0; logical_page_size],
        }
    }

    fn increment(&mut self, pos1: usize, pos2: usize) {
        for pos in pos1..=pos2 {
            if self.counters[pos] == ByteCount::MAX {
                continue;
            }
            if self.counters[pos] == 0 {
                self.bytes_touched += 1;
            }
            self.counters[pos] += 1;
        }
    }

    fn count(&self) -> usize {
        self.bytes_touched
    }
}

/// A lazily-populated mapping from page number to page-table entry,
/// generic over the entry representation (spec.md §3 "Page table").
pub struct PageTable<E: PageTableEntry> {
    pages: FastHashMap<u64, E>,
    logical_page_size: usize,
}

impl<E: PageTableEntry> PageTable<E> {
    pub fn new(logical_page_size: usize) -> Self {
        PageTable {
            pages: FastHashMap::default(),
            logical_page_size,
        }
    }

    /// Records an access to `num_addrs` consecutive bytes starting at
    /// `base_addr`. Takes the fast single-page path when possible and
    /// falls back to a byte-at-a-time path when the range spans multiple
    /// logical pages.
    pub fn access(&mut self, base_addr: u64, num_addrs: u64) {
        if num_addrs == 0 {
            return;
        }
        let page_size = self.logical_page_size as u64;
        let first_page = base_addr / page_size;
        let last_page = (base_addr + num_addrs - 1) / page_size;

        if first_page == last_page {
            let page_base = (base_addr % page_size) as usize;
            let entry = self
                .pages
                .entry(first_page)
                .or_insert_with(|| E::new(self.logical_page_size));
            entry.increment(page_base, page_base + (num_addrs as usize) - 1);
        } else {
            for i in 0..num_addrs {
                let address = base_addr + i;
                let page_num = address / page_size;
                let bit_offset = (address % page_size) as usize;
                let entry = self
                    .pages
                    .entry(page_num)
                    .or_insert_with(|| E::new(self.logical_page_size));
                entry.increment(bit_offset, bit_offset);
            }
        }
    }

    /// Total number of distinct bytes touched across every page.
    pub fn tally_unique(&self) -> u64 {
        self.pages.values().map(|e| e.count() as u64).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &E)> {
        self.pages.iter()
    }

    pub fn get(&self, page_num: u64) -> Option<&E> {
        self.pages.get(&page_num)
    }

    pub fn entry_or_create(&mut self, page_num: u64) -> &mut E {
        self.pages
            .entry(page_num)
            .or_insert_with(|| E::new(self.logical_page_size))
    }
}

pub type BitPageTable = PageTable<BitPageTableEntry>;
pub type WordPageTable = PageTable<WordPageTableEntry>;

impl PageTable<BitPageTableEntry> {
    /// Merges every page of `other` into `self`, creating pages as needed.
    /// Used to combine several call points' per-byte touch tables into one
    /// aggregate, as `bf_partition_unique_addresses` does for its UTI/MTI
    /// page tables.
    pub fn merge_from(&mut self, other: &PageTable<BitPageTableEntry>) {
        for (&page_num, other_entry) in other.pages.iter() {
            self.pages
                .entry(page_num)
                .or_insert_with(|| BitPageTableEntry::new(self.logical_page_size))
                .merge(other_entry);
        }
    }
}

impl PageTable<WordPageTableEntry> {
    /// Merges every page of `other` into `self`, creating pages as needed.
    pub fn merge_from(&mut self, other: &PageTable<WordPageTableEntry>) {
        for (&page_num, other_entry) in other.pages.iter() {
            self.pages
                .entry(page_num)
                .or_insert_with(|| WordPageTableEntry::new(self.logical_page_size))
                .merge(other_entry);
        }
    }
}
