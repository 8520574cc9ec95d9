//! Limits and constraints for schema compilation
//!
//! Compilation unrolls bounded repetition and determinizes content models,
//! so hostile schemas can ask for unbounded work. These limits keep every
//! stage linear in what the caller agreed to pay.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default DFA state budget per content model
pub const DEFAULT_MAX_DFA_STATES: u32 = 4096;

/// Default upper bound for `maxOccurs` / `minOccurs`
pub const DEFAULT_MAX_OCCURS_LIMIT: u32 = 1_000_000;

/// Default Glushkov position budget per content model
pub const DEFAULT_MAX_POSITIONS: u32 = 4096;

/// Compile configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileConfig {
    /// DFA state budget per content model; 0 selects the default. A model
    /// that needs more states is kept as an NFA.
    pub max_dfa_states: u32,

    /// Largest accepted occurrence bound
    pub max_occurs_limit: u32,

    /// Position budget per content model after unrolling; 0 selects the
    /// default
    pub max_positions: u32,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            max_dfa_states: 0,
            max_occurs_limit: DEFAULT_MAX_OCCURS_LIMIT,
            max_positions: 0,
        }
    }
}

impl CompileConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create strict limits (more restrictive)
    pub fn strict() -> Self {
        Self {
            max_dfa_states: 512,
            max_occurs_limit: 10_000,
            max_positions: 1024,
        }
    }

    /// Create permissive limits (less restrictive, use with caution)
    pub fn permissive() -> Self {
        Self {
            max_dfa_states: 65_536,
            max_occurs_limit: u32::MAX,
            max_positions: 65_536,
        }
    }

    /// Set the DFA state budget
    pub fn with_max_dfa_states(mut self, states: u32) -> Self {
        self.max_dfa_states = states;
        self
    }

    /// Set the occurrence limit
    pub fn with_max_occurs_limit(mut self, limit: u32) -> Self {
        self.max_occurs_limit = limit;
        self
    }

    /// The state budget actually applied
    pub fn effective_max_dfa_states(&self) -> usize {
        if self.max_dfa_states == 0 {
            DEFAULT_MAX_DFA_STATES as usize
        } else {
            self.max_dfa_states as usize
        }
    }

    /// The position budget actually applied
    pub fn effective_max_positions(&self) -> usize {
        if self.max_positions == 0 {
            DEFAULT_MAX_POSITIONS as usize
        } else {
            self.max_positions as usize
        }
    }

    /// Check an occurrence bound and narrow it to `u32`
    pub fn check_occurs(&self, value: u64) -> Result<u32> {
        if value > u64::from(self.max_occurs_limit) {
            Err(Error::OccursTooLarge {
                value,
                limit: self.max_occurs_limit,
            })
        } else {
            Ok(value as u32)
        }
    }

    /// Check the number of positions of one content model
    pub fn check_positions(&self, count: usize) -> Result<()> {
        let max = self.effective_max_positions();
        if count > max {
            Err(Error::structural(format!(
                "content model needs {} positions, limit is {}",
                count, max
            )))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CompileConfig::default();
        assert_eq!(config.effective_max_dfa_states(), 4096);
        assert_eq!(config.max_occurs_limit, 1_000_000);
    }

    #[test]
    fn test_occurs_boundary() {
        let config = CompileConfig::default().with_max_occurs_limit(10);
        assert_eq!(config.check_occurs(10).unwrap(), 10);
        let err = config.check_occurs(11).unwrap_err();
        assert!(matches!(err, Error::OccursTooLarge { value: 11, limit: 10 }));
    }

    #[test]
    fn test_strict_and_permissive() {
        assert!(
            CompileConfig::strict().effective_max_dfa_states()
                < CompileConfig::default().effective_max_dfa_states()
        );
        assert!(CompileConfig::permissive().check_occurs(5_000_000).is_ok());
    }

    #[test]
    fn test_positions_limit() {
        let config = CompileConfig::strict();
        assert!(config.check_positions(1024).is_ok());
        assert!(config.check_positions(1025).is_err());
    }

    #[test]
    fn test_config_from_json() {
        let config: CompileConfig = serde_json::from_str(r#"{"max_dfa_states": 7}"#).unwrap();
        assert_eq!(config.effective_max_dfa_states(), 7);
        assert_eq!(config.max_occurs_limit, DEFAULT_MAX_OCCURS_LIMIT);
    }
}
