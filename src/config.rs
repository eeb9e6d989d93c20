//! Parallelization options.
//!
//! All knobs recognized by the parallelizer, with eager validation.
//! Options can be loaded from a TOML file or derived from cluster
//! sizing via [`ParallelizeOptions::for_cluster`].

use crate::error::{PlannerError, Result};
use crate::wire::FragmentCodec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelizeOptions {
    /// Cost quantum: a fragment prefers `ceil(cost / slice_target)`
    /// minor fragments.
    #[serde(default = "default_slice_target")]
    pub slice_target: u64,

    /// Upper bound of minor fragments per endpoint, per fragment.
    #[serde(default = "default_max_width_per_node")]
    pub max_width_per_node: usize,

    /// Upper bound of minor fragments across the whole query.
    #[serde(default = "default_max_global_width")]
    pub max_global_width: usize,

    /// Weight of affinity versus uniform spread in balanced
    /// assignment; must be within [0, 1].
    #[serde(default = "default_affinity_factor")]
    pub affinity_factor: f64,

    /// Selects the balanced assignment creator instead of the legacy
    /// round-robin one.
    #[serde(default = "default_true")]
    pub use_new_assignment_creator: bool,

    /// Cap multiplier on per-endpoint load in balanced mode; must be
    /// at least 1.0.
    #[serde(default = "default_balance_factor")]
    pub assignment_creator_balance_factor: f64,

    /// Codec applied to the serialized fragment and option blobs.
    #[serde(default)]
    pub fragment_codec: FragmentCodec,
}

fn default_slice_target() -> u64 {
    1
}

fn default_max_width_per_node() -> usize {
    num_cpus::get().max(1)
}

fn default_max_global_width() -> usize {
    1000
}

fn default_affinity_factor() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

fn default_balance_factor() -> f64 {
    1.25
}

impl Default for ParallelizeOptions {
    fn default() -> Self {
        Self {
            slice_target: default_slice_target(),
            max_width_per_node: default_max_width_per_node(),
            max_global_width: default_max_global_width(),
            affinity_factor: default_affinity_factor(),
            use_new_assignment_creator: default_true(),
            assignment_creator_balance_factor: default_balance_factor(),
            fragment_codec: FragmentCodec::default(),
        }
    }
}

impl ParallelizeOptions {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PlannerError::InvalidOption(format!("cannot read {:?}: {}", path, e)))?;
        let options: ParallelizeOptions = toml::from_str(&content)
            .map_err(|e| PlannerError::InvalidOption(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Derive the per-node width from cluster sizing: the average
    /// executor core count scaled by a load-shedding factor in (0, 1].
    pub fn for_cluster(mut self, average_executor_cores: usize, max_width_factor: f64) -> Result<Self> {
        if !(max_width_factor > 0.0 && max_width_factor <= 1.0) {
            return Err(PlannerError::InvalidOption(format!(
                "max_width_factor must be in (0, 1], got {}",
                max_width_factor
            )));
        }
        self.max_width_per_node =
            ((average_executor_cores as f64 * max_width_factor) as usize).max(1);
        if max_width_factor < 1.0 {
            debug!(
                max_width_factor,
                max_width_per_node = self.max_width_per_node,
                "cluster load reduced per-node width"
            );
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.slice_target < 1 {
            return Err(PlannerError::InvalidOption(
                "slice_target must be at least 1".to_string(),
            ));
        }
        if self.max_width_per_node < 1 {
            return Err(PlannerError::InvalidOption(
                "max_width_per_node must be at least 1".to_string(),
            ));
        }
        if self.max_global_width < 1 {
            return Err(PlannerError::InvalidOption(
                "max_global_width must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.affinity_factor) {
            return Err(PlannerError::InvalidOption(format!(
                "affinity_factor must be within [0, 1], got {}",
                self.affinity_factor
            )));
        }
        if self.assignment_creator_balance_factor < 1.0 {
            return Err(PlannerError::InvalidOption(format!(
                "assignment_creator_balance_factor must be at least 1.0, got {}",
                self.assignment_creator_balance_factor
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        ParallelizeOptions::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range() {
        let mut opts = ParallelizeOptions::default();
        opts.affinity_factor = 1.5;
        assert!(opts.validate().is_err());

        let mut opts = ParallelizeOptions::default();
        opts.assignment_creator_balance_factor = 0.5;
        assert!(opts.validate().is_err());

        let mut opts = ParallelizeOptions::default();
        opts.max_global_width = 0;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn cluster_factor_scales_node_width() {
        let opts = ParallelizeOptions::default()
            .for_cluster(16, 0.5)
            .unwrap();
        assert_eq!(opts.max_width_per_node, 8);

        // Factor of 1.0 keeps the raw core count.
        let opts = ParallelizeOptions::default().for_cluster(4, 1.0).unwrap();
        assert_eq!(opts.max_width_per_node, 4);

        // Tiny clusters never drop below one slot.
        let opts = ParallelizeOptions::default().for_cluster(1, 0.1).unwrap();
        assert_eq!(opts.max_width_per_node, 1);

        assert!(ParallelizeOptions::default().for_cluster(8, 0.0).is_err());
        assert!(ParallelizeOptions::default().for_cluster(8, 1.5).is_err());
    }

    #[test]
    fn parses_codec_from_toml() {
        let opts: ParallelizeOptions = toml::from_str(
            r#"
            slice_target = 100000
            fragment_codec = "SNAPPY"
            "#,
        )
        .unwrap();
        assert_eq!(opts.slice_target, 100000);
        assert_eq!(opts.fragment_codec, FragmentCodec::Snappy);
    }
}
