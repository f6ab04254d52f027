//! The data-structure tracker: an interval tree over address ranges,
//! counters shared across all allocations at a given allocation site, and
//! the disassociate/associate bookkeeping used for reallocation and
//! stack-variable reuse.
//!
//! Grounded on `lib/byfl/datastructs.cpp`'s `Interval<T>`, `DataStructCounters`,
//! the `data_structs` interval tree + `location_to_counters` side map, and
//! `{dis,}assoc_addresses_with_dstruct{,_stack}` / `bf_access_data_struct`.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::fast_hash_map::FastHashMap;

/// Half-open `[lower, upper]` address range with point-containment
/// comparison: `a < b` iff `a.upper < b.lower`, and equality means neither
/// less nor greater — so a single-point interval compares equal to any
/// interval containing it, giving point lookup in an ordered map (spec.md
/// §3 "Interval").
#[derive(Debug, Clone, Copy)]
pub struct Interval {
    pub lower: u64,
    pub upper: u64,
}

impl Interval {
    pub fn new(lower: u64, upper: u64) -> Self {
        Interval { lower, upper }
    }

    pub fn point(addr: u64) -> Self {
        Interval {
            lower: addr,
            upper: addr,
        }
    }

    pub fn len(&self) -> u64 {
        self.upper - self.lower + 1
    }
}

impl PartialEq for Interval {
    fn eq(&self, other: &Self) -> bool {
        !(self.upper < other.lower) && !(self.lower > other.upper)
    }
}
impl Eq for Interval {}

impl PartialOrd for Interval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Interval {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.upper < other.lower {
            Ordering::Less
        } else if self.lower > other.upper {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }
}

/// Per-data-structure counters, created on first allocation at a PC and
/// shared across every allocation made at that PC (spec.md §3
/// "Data-structure counters").
#[derive(Debug, Clone)]
pub struct DataStructCounters {
    pub name: String,
    pub demangled_name: String,
    pub origin: String,
    pub current_size: u64,
    pub max_size: u64,
    pub bytes_loaded: u64,
    pub bytes_stored: u64,
    pub load_ops: u64,
    pub store_ops: u64,
    pub bytes_alloced: u64,
    pub num_allocs: u64,
}

impl DataStructCounters {
    fn new_static(name: String, demangled_name: String, size: u64, origin: String) -> Self {
        DataStructCounters {
            name,
            demangled_name,
            origin,
            current_size: size,
            max_size: size,
            bytes_loaded: 0,
            bytes_stored: 0,
            load_ops: 0,
            store_ops: 0,
            bytes_alloced: size,
            num_allocs: 1,
        }
    }

    fn new_dynamic(label: String, size: u64, origin: String) -> Self {
        DataStructCounters {
            name: label.clone(),
            demangled_name: label,
            origin,
            current_size: size,
            max_size: size,
            bytes_loaded: 0,
            bytes_stored: 0,
            load_ops: 0,
            store_ops: 0,
            bytes_alloced: size,
            num_allocs: 1,
        }
    }

    fn grow(&mut self, added_bytes: u64) {
        self.current_size += added_bytes;
        if self.current_size > self.max_size {
            self.max_size = self.current_size;
        }
        self.bytes_alloced += added_bytes;
        self.num_allocs += 1;
    }
}

type CountersRef = Rc<RefCell<DataStructCounters>>;

/// A statically-known symbol eligible for interval-tree registration
/// (`initialize_data_structures`'s BFD-derived symbol table, minus the
/// parts this crate has no BFD binding to reproduce: callers supply the
/// resolved `(name, address, size, section)` directly).
pub struct StaticSymbol<'a> {
    pub name: &'a str,
    pub address: u64,
    pub size: u64,
    pub section: &'a str,
}

/// The data-structure tracker: an interval tree from address range to
/// shared counters, plus a side map from allocation PC to the same
/// counters (so repeated allocations at one call site share one record).
#[derive(Default)]
pub struct DataStructureTracker {
    data_structs: BTreeMap<Interval, CountersRef>,
    location_to_counters: FastHashMap<u64, CountersRef>,
}

impl DataStructureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a statically-allocated symbol, skipping Byfl's own
    /// internal `bf_`-prefixed symbols and zero-sized entries, matching
    /// `initialize_data_structures`'s filtering of the BFD symbol table.
    pub fn register_static_symbol(&mut self, sym: &StaticSymbol) -> bool {
        if sym.size == 0 || sym.name.starts_with("bf_") {
            return false;
        }
        let counters = Rc::new(RefCell::new(DataStructCounters::new_static(
            format!("Static variable {}", sym.name),
            format!("Static variable {}", sym.name),
            sym.size,
            sym.section.to_string(),
        )));
        let interval = Interval::new(sym.address, sym.address + sym.size - 1);
        self.data_structs.insert(interval, Rc::clone(&counters));
        self.location_to_counters.insert(sym.address, counters);
        true
    }

    /// Disassociates the range starting at `base_addr` from whatever data
    /// structure currently owns it, shrinking that structure's
    /// `current_size` and removing the interval. Returns the address just
    /// past the disassociated range (mirrors
    /// `disassoc_addresses_with_dstruct`'s "keep walking" return value: one
    /// past `baseptr` when nothing was found there).
    pub fn disassoc(&mut self, base_addr: u64) -> u64 {
        let key = Interval::point(base_addr);
        let Some((&interval, counters)) = self.data_structs.get_key_value(&key) else {
            return base_addr + 1;
        };
        counters.borrow_mut().current_size -= interval.len();
        self.data_structs.remove(&interval);
        interval.upper + 1
    }

    fn find_or_create_by_location(&mut self, caller_addr: u64, label: String, size: u64, origin: &str) -> CountersRef {
        match self.location_to_counters.get(&caller_addr) {
            Some(existing) => {
                existing.borrow_mut().grow(size);
                Rc::clone(existing)
            }
            None => {
                let counters = Rc::new(RefCell::new(DataStructCounters::new_dynamic(
                    label,
                    size,
                    origin.to_string(),
                )));
                self.location_to_counters.insert(caller_addr, Rc::clone(&counters));
                counters
            }
        }
    }

    /// Associates `[new_base, new_base+num_addrs)` with a dynamically
    /// allocated data structure. When `old_base` is `Some`, this is a
    /// realloc: the previous interval is found, its counters reused and
    /// shrunk/grown in place, and the old interval removed. When `None`,
    /// counters are looked up (or created) by `caller_addr`, matching
    /// `assoc_addresses_with_dstruct`.
    pub fn assoc(
        &mut self,
        caller_addr: u64,
        origin: &str,
        old_base: Option<u64>,
        new_base: u64,
        num_addrs: u64,
        label: &str,
    ) {
        if num_addrs == 0 {
            return;
        }
        let counters = match old_base {
            None => self.find_or_create_by_location(caller_addr, label.to_string(), num_addrs, origin),
            Some(old) => {
                let old_key = Interval::point(old);
                let (&old_interval, existing) = self
                    .data_structs
                    .get_key_value(&old_key)
                    .expect("realloc must reference a previously associated range");
                let counters = Rc::clone(existing);
                {
                    let mut c = counters.borrow_mut();
                    c.current_size -= old_interval.len();
                    c.current_size += num_addrs;
                    if c.current_size > c.max_size {
                        c.max_size = c.current_size;
                    }
                    c.bytes_alloced += num_addrs;
                    c.num_allocs += 1;
                }
                self.data_structs.remove(&old_interval);
                counters
            }
        };
        let new_interval = Interval::new(new_base, new_base + num_addrs - 1);
        self.data_structs.insert(new_interval, counters);
    }

    /// Associates a stack-allocated variable's address range, first
    /// disassociating every interval that currently overlaps it. Doing the
    /// disassociate-then-associate as one call (spec.md §9 Open Question
    /// (d)) avoids a window where an address belongs to neither data
    /// structure, matching `bf_assoc_addresses_with_dstruct_stack`'s
    /// disassociate loop immediately followed by association.
    pub fn assoc_stack(&mut self, caller_addr: u64, origin: &str, base_addr: u64, num_addrs: u64, varname: &str) {
        if num_addrs == 0 {
            return;
        }
        let last_addr = base_addr + num_addrs;
        let mut addr = base_addr;
        while addr < last_addr {
            addr = self.disassoc(addr);
        }
        let label = if varname == "*UNNAMED*" {
            "Compiler-generated variable".to_string()
        } else {
            format!("Variable {}", varname)
        };
        self.assoc(caller_addr, origin, None, base_addr, num_addrs, &label);
    }

    /// Increments the load/store counters for the data structure owning
    /// `base_addr`, auto-registering an "unknown" data structure (the same
    /// fallback `bf_access_data_struct` performs for ranges that were
    /// never seen by an `assoc` call, e.g. allocated by an uninstrumented
    /// library function) when `caller_addr_if_unknown` is supplied.
    pub fn access(&mut self, base_addr: u64, num_addrs: u64, is_store: bool, caller_addr_if_unknown: Option<u64>) {
        let key = Interval::point(base_addr);
        if self.data_structs.get(&key).is_none() {
            let Some(caller_addr) = caller_addr_if_unknown else {
                return;
            };
            let last_addr = base_addr + num_addrs;
            let mut addr = base_addr;
            while addr < last_addr {
                addr = self.disassoc(addr);
            }
            self.assoc(caller_addr, "unknown", None, base_addr, num_addrs, "Unknown data structure");
        }
        let Some(counters) = self.data_structs.get(&key) else {
            return;
        };
        let mut c = counters.borrow_mut();
        if is_store {
            c.store_ops += 1;
            c.bytes_stored += num_addrs;
        } else {
            c.load_ops += 1;
            c.bytes_loaded += num_addrs;
        }
    }

    pub fn counters_at(&self, addr: u64) -> Option<DataStructCounters> {
        self.data_structs.get(&Interval::point(addr)).map(|c| c.borrow().clone())
    }

    pub fn len(&self) -> usize {
        self.data_structs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_structs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_point_containment_equality() {
        let range = Interval::new(100, 199);
        let point_inside = Interval::point(150);
        let point_outside = Interval::point(200);
        assert_eq!(range, point_inside);
        assert_ne!(range, point_outside);
    }

    #[test]
    fn static_symbol_registration_skips_bf_prefix_and_zero_size() {
        let mut tracker = DataStructureTracker::new();
        assert!(!tracker.register_static_symbol(&StaticSymbol {
            name: "bf_internal_counter",
            address: 0x1000,
            size: 8,
            section: ".data",
        }));
        assert!(!tracker.register_static_symbol(&StaticSymbol {
            name: "empty_struct",
            address: 0x2000,
            size: 0,
            section: ".bss",
        }));
        assert!(tracker.register_static_symbol(&StaticSymbol {
            name: "global_buffer",
            address: 0x3000,
            size: 64,
            section: ".data",
        }));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn dynamic_allocation_tracks_loads_and_stores() {
        let mut tracker = DataStructureTracker::new();
        tracker.assoc(0xCA11E4, "Data", None, 0x4000, 128, "Data");
        tracker.access(0x4000, 8, false, None);
        tracker.access(0x4008, 4, true, None);

        let counters = tracker.counters_at(0x4000).unwrap();
        assert_eq!(counters.load_ops, 1);
        assert_eq!(counters.bytes_loaded, 8);
        assert_eq!(counters.store_ops, 1);
        assert_eq!(counters.bytes_stored, 4);
    }

    #[test]
    fn realloc_reuses_counters_and_moves_the_interval() {
        let mut tracker = DataStructureTracker::new();
        tracker.assoc(0xCA11E4, "Data", None, 0x4000, 64, "Data");
        tracker.assoc(0xCA11E4, "Data", Some(0x4000), 0x8000, 128, "Data");

        assert!(tracker.counters_at(0x4000).is_none());
        let counters = tracker.counters_at(0x8000).unwrap();
        assert_eq!(counters.current_size, 128);
        assert_eq!(counters.bytes_alloced, 64 + 128);
        assert_eq!(counters.num_allocs, 2);
    }

    #[test]
    fn stack_reuse_disassociates_overlapping_ranges_atomically() {
        let mut tracker = DataStructureTracker::new();
        // First function's locals occupy [0x1000, 0x1010).
        tracker.assoc_stack(0xCA11A, "Stack", 0x1000, 16, "x");
        assert_eq!(tracker.len(), 1);

        // A later function reuses the same stack slots for a bigger local.
        tracker.assoc_stack(0xCA11B, "Stack", 0x1000, 16, "y");
        assert_eq!(tracker.len(), 1);
        let counters = tracker.counters_at(0x1000).unwrap();
        assert_eq!(counters.name, "Variable y");
    }

    #[test]
    fn unknown_access_auto_registers_a_placeholder_structure() {
        let mut tracker = DataStructureTracker::new();
        tracker.access(0x9000, 8, false, Some(0xCA11E4));
        let counters = tracker.counters_at(0x9000).unwrap();
        assert_eq!(counters.name, "Unknown data structure");
        assert_eq!(counters.load_ops, 1);
    }
}
