//! Pass configuration, built either programmatically or (in the `byfl`
//! binary) by flattening this struct into a `clap::Parser` command line,
//! following `samply/src/cli.rs`'s `Opt` / subcommand-args layout.
//!
//! Mirrors spec.md §6 "Configuration surface": per-basic-block output,
//! per-function tallying, call-stack tracking, unique-byte tracking,
//! type-differentiated memory tallying, instruction-mix histogram, vector
//! tallying, reuse-distance tracking, maximum reuse distance, thread
//! safety, include/exclude function lists, and BB-merge count.

use crate::error::ConfigError;

/// Which of loads, stores, or both feed the reuse-distance engine
/// (spec.md §6: "reuse-distance tracking (for loads / stores / both)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Default)]
pub enum ReuseDistanceMode {
    Loads,
    Stores,
    #[default]
    Both,
}

#[derive(Debug, Clone, clap::Args)]
pub struct PassConfig {
    /// Report and reset counters at every basic block, not just at
    /// function/program exit.
    #[arg(long = "bf-every-bb")]
    pub every_bb: bool,

    /// Merge this many consecutive basic blocks' worth of reporting into
    /// one roll-up (0 disables merging).
    #[arg(long = "bf-bb-merge", default_value_t = 0)]
    pub bb_merge: u64,

    /// Maintain per-function counter totals.
    #[arg(long = "bf-per-func")]
    pub per_func: bool,

    /// Track the full call stack rather than only the immediate caller;
    /// requires `per_func`.
    #[arg(long = "bf-call-stack")]
    pub call_stack: bool,

    /// Differentiate memory accesses by int/fp/other type and width in the
    /// `mem_insts` histogram.
    #[arg(long = "bf-types")]
    pub track_types: bool,

    /// Maintain a per-opcode instruction-mix histogram.
    #[arg(long = "bf-inst-mix")]
    pub tally_inst_mix: bool,

    /// Track program-wide unique-byte coverage via the bit page table.
    #[arg(long = "bf-unique-bytes")]
    pub unique_bytes: bool,

    /// Track per-data-structure memory traffic via the interval tree.
    #[arg(long = "bf-mem-footprint")]
    pub mem_footprint: bool,

    /// Tally vector-lane operations by shape.
    #[arg(long = "bf-vectors")]
    pub vectors: bool,

    /// Which access kinds feed the reuse-distance engine, if enabled at
    /// all (`None` means reuse-distance tracking is off).
    #[arg(long = "bf-reuse-dist")]
    pub reuse_distance: Option<ReuseDistanceMode>,

    /// Reuse-distance window size; required when `reuse_distance` is set.
    #[arg(long = "bf-max-reuse-distance")]
    pub max_reuse_distance: Option<u64>,

    /// Emit acquire/release around each basic block's counter updates.
    #[arg(long = "bf-thread-safe")]
    pub thread_safe: bool,

    /// Only instrument these functions (mutually exclusive with `exclude`).
    #[arg(long = "bf-include")]
    pub include: Vec<String>,

    /// Instrument every function except these (mutually exclusive with
    /// `include`).
    #[arg(long = "bf-exclude")]
    pub exclude: Vec<String>,
}

impl Default for PassConfig {
    fn default() -> Self {
        PassConfig {
            every_bb: false,
            bb_merge: 0,
            per_func: false,
            call_stack: false,
            track_types: false,
            tally_inst_mix: false,
            unique_bytes: false,
            mem_footprint: false,
            vectors: false,
            reuse_distance: None,
            max_reuse_distance: None,
            thread_safe: false,
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl PassConfig {
    /// Validates flag combinations at pass initialization (spec.md §4.1).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.include.is_empty() && !self.exclude.is_empty() {
            return Err(ConfigError::IncludeExcludeConflict);
        }
        if self.call_stack && !self.per_func {
            return Err(ConfigError::CallStackWithoutPerFunc);
        }
        if self.reuse_distance.is_some() && self.max_reuse_distance.is_none() {
            return Err(ConfigError::ReuseDistanceWithoutWindow);
        }
        Ok(())
    }

    /// Returns whether `function_name` should be instrumented under the
    /// active include/exclude lists.
    pub fn should_instrument(&self, function_name: &str) -> bool {
        if !self.include.is_empty() {
            return self.include.iter().any(|f| f == function_name);
        }
        if !self.exclude.is_empty() {
            return !self.exclude.iter().any(|f| f == function_name);
        }
        true
    }

    /// Renders the active flags into one string, mirroring
    /// `bf_option_string`'s summary of the run's instrumentation options
    /// for embedding in the output file's run-metadata table.
    pub fn option_summary(&self) -> String {
        let mut opts = Vec::new();
        if self.every_bb {
            opts.push("every-bb".to_string());
        }
        if self.bb_merge > 0 {
            opts.push(format!("bb-merge={}", self.bb_merge));
        }
        if self.per_func {
            opts.push("per-func".to_string());
        }
        if self.call_stack {
            opts.push("call-stack".to_string());
        }
        if self.track_types {
            opts.push("types".to_string());
        }
        if self.tally_inst_mix {
            opts.push("inst-mix".to_string());
        }
        if self.unique_bytes {
            opts.push("unique-bytes".to_string());
        }
        if self.mem_footprint {
            opts.push("mem-footprint".to_string());
        }
        if self.vectors {
            opts.push("vectors".to_string());
        }
        if let Some(mode) = self.reuse_distance {
            opts.push(format!(
                "reuse-dist={}",
                match mode {
                    ReuseDistanceMode::Loads => "loads",
                    ReuseDistanceMode::Stores => "stores",
                    ReuseDistanceMode::Both => "both",
                }
            ));
        }
        if let Some(w) = self.max_reuse_distance {
            opts.push(format!("max-reuse-distance={w}"));
        }
        if self.thread_safe {
            opts.push("thread-safe".to_string());
        }
        if !self.include.is_empty() {
            opts.push(format!("include={}", self.include.join(",")));
        }
        if !self.exclude.is_empty() {
            opts.push(format!("exclude={}", self.exclude.join(",")));
        }
        opts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_conflicting_include_and_exclude() {
        let cfg = PassConfig {
            include: vec!["foo".into()],
            exclude: vec!["bar".into()],
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::IncludeExcludeConflict)));
    }

    #[test]
    fn rejects_call_stack_without_per_func() {
        let cfg = PassConfig {
            call_stack: true,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::CallStackWithoutPerFunc)));
    }

    #[test]
    fn rejects_reuse_distance_without_window() {
        let cfg = PassConfig {
            reuse_distance: Some(ReuseDistanceMode::Both),
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::ReuseDistanceWithoutWindow)));
    }

    #[test]
    fn accepts_a_reasonable_configuration() {
        let cfg = PassConfig {
            per_func: true,
            call_stack: true,
            reuse_distance: Some(ReuseDistanceMode::Loads),
            max_reuse_distance: Some(1_000_000),
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn include_list_limits_instrumented_functions() {
        let cfg = PassConfig {
            include: vec!["hot".into()],
            ..Default::default()
        };
        assert!(cfg.should_instrument("hot"));
        assert!(!cfg.should_instrument("cold"));
    }

    #[test]
    fn exclude_list_excludes_named_functions() {
        let cfg = PassConfig {
            exclude: vec!["noisy".into()],
            ..Default::default()
        };
        assert!(!cfg.should_instrument("noisy"));
        assert!(cfg.should_instrument("anything-else"));
    }

    #[test]
    fn option_summary_lists_active_flags() {
        let cfg = PassConfig {
            per_func: true,
            vectors: true,
            ..Default::default()
        };
        let summary = cfg.option_summary();
        assert!(summary.contains("per-func"));
        assert!(summary.contains("vectors"));
        assert!(!summary.contains("call-stack"));
    }
}
