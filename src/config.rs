//! Simulation configuration
//!
//! [`SimConfig`] holds the options the simulator recognizes. It can be built
//! in code, loaded from a JSON file (keys in camelCase, all optional), and is
//! then overridden field by field from command-line flags.
//!
//! ```json
//! { "stackCapacityBytes": 4096, "haltOnFirstFatal": false }
//! ```

use crate::diagnostics::Severity;
use crate::interpreter::constants::{
    DEFAULT_HEAP_CAPACITY, DEFAULT_SNAPSHOT_LIMIT, DEFAULT_STACK_CAPACITY, MAX_ADDRESS_SPACE,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimConfig {
    /// Size of the stack region in bytes
    pub stack_capacity_bytes: usize,
    /// Size of the heap region in bytes
    pub heap_capacity_bytes: usize,
    /// Stop at the first fatal finding. When false, the faulting instruction
    /// is skipped and execution continues; capacity faults still halt.
    pub halt_on_first_fatal: bool,
    /// Record reads of never-written memory
    pub report_uninitialized_reads: bool,
    /// Treat uninitialized reads as fatal instead of a warning
    pub uninitialized_reads_fatal: bool,
    /// Keep a per-instruction snapshot history
    pub record_history: bool,
    /// Memory budget for the snapshot history in bytes
    pub snapshot_memory_limit: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            stack_capacity_bytes: DEFAULT_STACK_CAPACITY,
            heap_capacity_bytes: DEFAULT_HEAP_CAPACITY,
            halt_on_first_fatal: true,
            report_uninitialized_reads: true,
            uninitialized_reads_fatal: false,
            record_history: true,
            snapshot_memory_limit: DEFAULT_SNAPSHOT_LIMIT,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),

    #[error("heap and stack capacities total more than {max} bytes")]
    CapacityTooLarge { max: usize },
}

impl SimConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stack_capacity_bytes == 0 {
            return Err(ConfigError::ZeroCapacity("stackCapacityBytes"));
        }
        if self.heap_capacity_bytes == 0 {
            return Err(ConfigError::ZeroCapacity("heapCapacityBytes"));
        }
        let total = self
            .heap_capacity_bytes
            .checked_add(self.stack_capacity_bytes);
        if total.map_or(true, |total| total > MAX_ADDRESS_SPACE) {
            return Err(ConfigError::CapacityTooLarge {
                max: MAX_ADDRESS_SPACE,
            });
        }
        Ok(())
    }

    /// Severity of an uninitialized read, or `None` when they are not reported
    pub fn uninitialized_read_severity(&self) -> Option<Severity> {
        if !self.report_uninitialized_reads {
            None
        } else if self.uninitialized_reads_fatal {
            Some(Severity::Fatal)
        } else {
            Some(Severity::Warning)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            SimConfig::from_json(r#"{ "stackCapacityBytes": 128, "haltOnFirstFatal": false }"#)
                .unwrap();
        assert_eq!(config.stack_capacity_bytes, 128);
        assert!(!config.halt_on_first_fatal);
        assert_eq!(config.heap_capacity_bytes, DEFAULT_HEAP_CAPACITY);
        assert!(config.report_uninitialized_reads);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = SimConfig::from_json(r#"{ "heapCapacityBytes": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroCapacity("heapCapacityBytes")));
    }

    #[test]
    fn test_oversized_capacity_rejected() {
        let err = SimConfig::from_json(r#"{ "heapCapacityBytes": 18446744073709551615 }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::CapacityTooLarge { .. }));

        let config = SimConfig {
            heap_capacity_bytes: 1 << 40,
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CapacityTooLarge { max: MAX_ADDRESS_SPACE })
        ));

        let config = SimConfig {
            heap_capacity_bytes: MAX_ADDRESS_SPACE - DEFAULT_STACK_CAPACITY,
            ..SimConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_json_is_error() {
        assert!(matches!(
            SimConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_uninitialized_read_severity() {
        let mut config = SimConfig::default();
        assert_eq!(config.uninitialized_read_severity(), Some(Severity::Warning));
        config.uninitialized_reads_fatal = true;
        assert_eq!(config.uninitialized_read_severity(), Some(Severity::Fatal));
        config.report_uninitialized_reads = false;
        assert_eq!(config.uninitialized_read_severity(), None);
    }
}
