pub use rustc_hash::{FxHashMap as FastHashMap, FxHashSet as FastHashSet};
