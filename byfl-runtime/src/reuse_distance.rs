//! Reuse-distance tracking: a splay tree keyed on access time, a side map
//! from address to its last access time, bounded-window pruning, and a
//! histogram with median/MAD summary statistics.
//!
//! Ported from `lib/byfl/reuse-dist.cpp`'s `RDnode` (the splay tree) and
//! `ReuseDistance` (the engine wrapping it). The tree is implemented here as
//! an arena of nodes addressed by index rather than raw pointers — the
//! traversal and rotation logic is otherwise a direct, non-recursive port
//! of the original's top-down splay.

use crate::error::RuntimeError;
use crate::fast_hash_map::FastHashMap;

const INFINITE_DISTANCE: u64 = u64::MAX;

#[derive(Clone, Copy)]
struct Node {
    address: u64,
    time: u64,
    weight: u64,
    left: Option<usize>,
    right: Option<usize>,
}

impl Node {
    fn new(address: u64, time: u64) -> Self {
        Node {
            address,
            time,
            weight: 1,
            left: None,
            right: None,
        }
    }
}

/// The reuse-distance engine: the splay tree of live addresses, the
/// address→time side map, the clock, and the accumulated histogram
/// (spec.md §3 "Reuse-distance node", §4.4).
pub struct ReuseDistanceEngine {
    nodes: Vec<Node>,
    free: Vec<usize>,
    root: Option<usize>,
    last_access: FastHashMap<u64, u64>,
    clock: u64,
    hist: Vec<u64>,
    unique_entries: u64,
    /// Window beyond which live addresses are pruned from the tree and map
    /// (`bf_max_reuse_distance` in the original).
    max_window: u64,
}

impl ReuseDistanceEngine {
    pub fn new(max_window: u64) -> Self {
        ReuseDistanceEngine {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            last_access: FastHashMap::default(),
            clock: 0,
            hist: Vec::new(),
            unique_entries: 0,
            max_window,
        }
    }

    fn alloc(&mut self, address: u64, time: u64) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Node::new(address, time);
                idx
            }
            None => {
                self.nodes.push(Node::new(address, time));
                self.nodes.len() - 1
            }
        }
    }

    fn fix_node_weight(&mut self, idx: usize) {
        let mut w = 1u64;
        if let Some(l) = self.nodes[idx].left {
            w += self.nodes[l].weight;
        }
        if let Some(r) = self.nodes[idx].right {
            w += self.nodes[r].weight;
        }
        self.nodes[idx].weight = w;
    }

    fn fix_path_weights(&mut self, start: usize, target: u64) {
        let mut parent: Option<usize> = None;
        let mut node: Option<usize> = Some(start);
        while let Some(n) = node {
            let child;
            if target < self.nodes[n].time {
                child = self.nodes[n].left;
                self.nodes[n].left = parent;
            } else {
                child = self.nodes[n].right;
                self.nodes[n].right = parent;
            }
            parent = Some(n);
            node = child;
        }

        while let Some(p) = parent {
            let prev_node = node;
            node = Some(p);
            if target < self.nodes[p].time {
                parent = self.nodes[p].left;
                self.nodes[p].left = prev_node;
            } else {
                parent = self.nodes[p].right;
                self.nodes[p].right = prev_node;
            }
            self.fix_node_weight(p);
        }
    }

    /// Splays `target` (or the nearest value present) to the root of the
    /// subtree rooted at `root`, returning the new subtree root.
    fn splay(&mut self, root: usize, target: u64) -> usize {
        let mut node = root;
        let mut small_head: Option<usize> = None;
        let mut small_tail: Option<usize> = None;
        let mut large_head: Option<usize> = None;
        let mut large_tail: Option<usize> = None;

        loop {
            let t = self.nodes[node].time;
            if target < t {
                let Some(nl) = self.nodes[node].left else {
                    break;
                };
                if target < self.nodes[nl].time {
                    // Rotate right.
                    let parent = nl;
                    self.nodes[node].left = self.nodes[parent].right;
                    self.nodes[parent].right = Some(node);
                    node = parent;
                    if let Some(r) = self.nodes[node].right {
                        self.fix_node_weight(r);
                    }
                    self.fix_node_weight(node);
                    if self.nodes[node].left.is_none() {
                        break;
                    }
                }
                match small_tail {
                    None => small_head = Some(node),
                    Some(tail) => self.nodes[tail].right = Some(node),
                }
                small_tail = Some(node);
                node = self.nodes[node].left.expect("checked above");
            } else if target > t {
                let Some(nr) = self.nodes[node].right else {
                    break;
                };
                if target > self.nodes[nr].time {
                    // Rotate left.
                    let parent = nr;
                    self.nodes[node].right = self.nodes[parent].left;
                    self.nodes[parent].left = Some(node);
                    node = parent;
                    if let Some(l) = self.nodes[node].left {
                        self.fix_node_weight(l);
                    }
                    self.fix_node_weight(node);
                    if self.nodes[node].right.is_none() {
                        break;
                    }
                }
                match large_tail {
                    None => large_head = Some(node),
                    Some(tail) => self.nodes[tail].left = Some(node),
                }
                large_tail = Some(node);
                node = self.nodes[node].right.expect("checked above");
            } else {
                break;
            }
        }

        let node_left = self.nodes[node].left;
        let node_right = self.nodes[node].right;
        match small_tail {
            None => small_head = node_left,
            Some(tail) => self.nodes[tail].right = node_left,
        }
        match large_tail {
            None => large_head = node_right,
            Some(tail) => self.nodes[tail].left = node_right,
        }
        self.nodes[node].left = small_head;
        self.nodes[node].right = large_head;

        let target_time = self.nodes[node].time;
        if let Some(l) = self.nodes[node].left {
            self.fix_path_weights(l, target_time);
        }
        if let Some(r) = self.nodes[node].right {
            self.fix_path_weights(r, target_time);
        }

        node
    }

    /// Inserts `new_node` (already allocated, with its `time` set) into the
    /// tree rooted at `root`. Duplicate timestamps are an internal error
    /// (spec.md §9 Open Question (c)): since `time` is a monotonically
    /// increasing clock, this can only happen on `u64` overflow.
    fn insert(&mut self, root: usize, new_node: usize) -> Result<usize, RuntimeError> {
        let target = self.nodes[new_node].time;
        let node = self.splay(root, target);
        let node_time = self.nodes[node].time;
        if target == node_time {
            log::warn!("reuse-distance clock collided at timestamp {target}, likely u64 wraparound");
            return Err(RuntimeError::DuplicateTimestamp(target));
        }
        if target > node_time {
            self.nodes[new_node].right = self.nodes[node].right;
            self.nodes[new_node].left = Some(node);
            self.nodes[node].right = None;
        } else {
            self.nodes[new_node].left = self.nodes[node].left;
            self.nodes[new_node].right = Some(node);
            self.nodes[node].left = None;
        }
        self.fix_node_weight(node);
        self.fix_node_weight(new_node);
        Ok(new_node)
    }

    /// Removes `target`'s node from the tree rooted at `root`, returning
    /// the new root (if any) and the index of the removed node (which the
    /// caller may reuse immediately, as `process_address` does).
    fn remove(&mut self, root: usize, target: u64) -> (Option<usize>, usize) {
        let node = self.splay(root, target);
        debug_assert_eq!(self.nodes[node].time, target);
        let new_root = match self.nodes[node].left {
            None => self.nodes[node].right,
            Some(l) => {
                let new_subroot = self.splay(l, target);
                let node_right = self.nodes[node].right;
                self.nodes[new_subroot].right = node_right;
                if let Some(r) = node_right {
                    self.fix_node_weight(r);
                }
                self.fix_node_weight(new_subroot);
                Some(new_subroot)
            }
        };
        (new_root, node)
    }

    /// Removes every node with `time < timestamp` from the tree rooted at
    /// `root`, erasing their addresses from `last_access`, and returns the
    /// new root.
    fn prune_tree(&mut self, root: usize, timestamp: u64) -> Option<usize> {
        let mut current = Some(self.splay(root, 0));
        while let Some(nt) = current {
            if self.nodes[nt].time >= timestamp {
                break;
            }
            let dead = nt;
            let mut next = self.nodes[dead].right;
            if let Some(nxt) = next {
                if self.nodes[nxt].left.is_some() {
                    next = Some(self.splay(nxt, 0));
                }
            }
            current = next;
            self.last_access.remove(&self.nodes[dead].address);
            self.free.push(dead);
        }
        current
    }

    /// Number of nodes in the tree rooted at `root` whose timestamp is
    /// strictly greater than `timestamp`.
    fn tree_dist(&self, root: usize, timestamp: u64) -> u64 {
        let mut node = root;
        let mut num_larger = 0u64;
        loop {
            let t = self.nodes[node].time;
            if timestamp > t {
                match self.nodes[node].right {
                    Some(r) => node = r,
                    None => return num_larger,
                }
            } else if timestamp < t {
                num_larger += 1;
                if let Some(r) = self.nodes[node].right {
                    num_larger += self.nodes[r].weight;
                }
                match self.nodes[node].left {
                    Some(l) => node = l,
                    None => return num_larger,
                }
            } else {
                if let Some(r) = self.nodes[node].right {
                    num_larger += self.nodes[r].weight;
                }
                return num_larger;
            }
        }
    }

    /// Incorporates a new address access into the reuse-distance histogram.
    pub fn process_address(&mut self, address: u64) -> Result<(), RuntimeError> {
        let mut distance = INFINITE_DISTANCE;
        let mut reused_node: Option<usize> = None;

        if let Some(&prev_time) = self.last_access.get(&address) {
            distance = self.tree_dist(self.root.expect("address tracked implies tree non-empty"), prev_time);
            let (new_root, removed) = self.remove(self.root.unwrap(), prev_time);
            self.root = new_root;
            reused_node = Some(removed);
        }

        let hist_len = self.hist.len() as u64;
        if distance < hist_len {
            self.hist[distance as usize] += 1;
        } else if distance == INFINITE_DISTANCE {
            self.unique_entries += 1;
        } else {
            self.hist.resize((distance + 1) as usize, 0);
            self.hist[distance as usize] += 1;
        }

        let new_node = match reused_node {
            Some(idx) => {
                self.nodes[idx] = Node::new(address, self.clock);
                idx
            }
            None => self.alloc(address, self.clock),
        };
        self.root = Some(match self.root {
            None => new_node,
            Some(r) => self.insert(r, new_node)?,
        });
        self.last_access.insert(address, self.clock);
        self.clock += 1;

        if self.last_access.len() as u64 > self.max_window {
            let cutoff = self.clock - self.max_window;
            self.root = self.root.and_then(|r| self.prune_tree(r, cutoff));
        }
        Ok(())
    }

    pub fn histogram(&self) -> &[u64] {
        &self.hist
    }

    pub fn unique_addrs(&self) -> u64 {
        self.unique_entries
    }

    /// Computes the median reuse distance and the median absolute
    /// deviation of the histogram, matching `ReuseDistance::compute_median`.
    pub fn compute_median(&self) -> (u64, u64) {
        let hist_len = self.hist.len() as u64;
        let mut total_tally = self.unique_entries.saturating_sub(hist_len);
        for &v in &self.hist {
            total_tally += v;
        }

        let mut median_distance = INFINITE_DISTANCE;
        let mut median_tally = 0u64;
        for (dist, &v) in self.hist.iter().enumerate() {
            median_distance = dist as u64;
            median_tally += v;
            if median_tally > total_tally / 2 {
                break;
            }
        }

        let mut absdev = vec![0u64; self.hist.len()];
        for (dist, &tally) in self.hist.iter().enumerate() {
            let dist = dist as u64;
            let deviation = if dist > median_distance {
                dist - median_distance
            } else {
                median_distance - dist
            };
            if (deviation as usize) < absdev.len() {
                absdev[deviation as usize] += tally;
            }
        }

        let mut mad = 0u64;
        let mut absdev_tally = 0u64;
        for (dev, &tally) in absdev.iter().enumerate() {
            mad = dev as u64;
            absdev_tally += tally;
            if absdev_tally > total_tally / 2 {
                break;
            }
        }

        (median_distance, mad)
    }

    /// Debug-only structural check: every node's `weight` must equal `1 +
    /// weight(left) + weight(right)`.
    pub fn validate_weights(&self) -> Result<(), RuntimeError> {
        if let Some(root) = self.root {
            self.validate_weights_at(root)?;
        }
        Ok(())
    }

    fn validate_weights_at(&self, idx: usize) -> Result<u64, RuntimeError> {
        let mut expected = 1u64;
        if let Some(l) = self.nodes[idx].left {
            expected += self.validate_weights_at(l)?;
        }
        if let Some(r) = self.nodes[idx].right {
            expected += self.validate_weights_at(r)?;
        }
        let recorded = self.nodes[idx].weight;
        if recorded != expected {
            return Err(RuntimeError::SplayWeightMismatch {
                time: self.nodes[idx].time,
                recorded,
                expected,
            });
        }
        Ok(recorded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_access_to_each_address_is_infinite_reuse_distance() {
        let mut engine = ReuseDistanceEngine::new(1_000_000);
        engine.process_address(1).unwrap();
        engine.process_address(2).unwrap();
        engine.process_address(3).unwrap();
        assert_eq!(engine.unique_addrs(), 3);
        assert!(engine.histogram().is_empty());
    }

    #[test]
    fn repeated_access_records_finite_reuse_distance() {
        let mut engine = ReuseDistanceEngine::new(1_000_000);
        engine.process_address(1).unwrap(); // time 0
        engine.process_address(2).unwrap(); // time 1
        engine.process_address(1).unwrap(); // time 2, reuse distance 1 (one distinct address accessed since)
        assert_eq!(engine.unique_addrs(), 2);
        assert_eq!(engine.histogram()[1], 1);
        engine.validate_weights().unwrap();
    }

    #[test]
    fn weights_stay_consistent_across_many_insertions_and_removals() {
        let mut engine = ReuseDistanceEngine::new(1_000_000);
        for round in 0..5 {
            for addr in 0..50u64 {
                engine.process_address(addr + round * 7).unwrap();
            }
        }
        engine.validate_weights().unwrap();
    }

    #[test]
    fn window_pruning_bounds_the_live_address_count() {
        let mut engine = ReuseDistanceEngine::new(10);
        for addr in 0..1000u64 {
            engine.process_address(addr).unwrap();
        }
        assert!(engine.last_access.len() as u64 <= 11);
        engine.validate_weights().unwrap();
    }

    #[test]
    fn median_and_mad_on_a_simple_histogram() {
        let mut engine = ReuseDistanceEngine::new(1_000_000);
        // Access pattern 1,2,1,2,1,2 gives repeated reuse distance 1.
        for _ in 0..3 {
            engine.process_address(1).unwrap();
            engine.process_address(2).unwrap();
        }
        let (median, mad) = engine.compute_median();
        assert_eq!(median, 1);
        assert_eq!(mad, 0);
    }
}
