use serde::{Deserialize, Serialize};

use crate::error::{InterpError, Result};
use crate::variant::VariantKind;

/// Settings for building an [`crate::Interpreter`] from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    pub variant: VariantKind,
    /// State machine index within the block.
    pub sm: usize,
    /// GPIO used as the serial pin (OUT and IN base).
    pub pin: u8,
    /// Load offset. The dispatch programs are fixed at 0.
    pub offset: u8,
    /// Depth, in bits, of each direction of the serial link.
    pub link_capacity: usize,
    /// Route transmitted bits back into the receive queue.
    pub loopback: bool,
    /// Upper bound on cycles spent returning to dispatch after one command.
    pub max_cycles: u64,
    /// Upper bound on Brainfuck instructions executed by the runner.
    pub step_limit: u64,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            variant: VariantKind::Full,
            sm: 0,
            pin: 0,
            offset: 0,
            link_capacity: 64,
            loopback: false,
            max_cycles: 1_000_000,
            step_limit: 10_000_000,
        }
    }
}

impl InterpreterConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|err| InterpError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pin >= 32 {
            return Err(InterpError::InvalidConfig(format!("pin {} out of range", self.pin)));
        }
        if self.link_capacity == 0 {
            return Err(InterpError::InvalidConfig(
                "link_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_cycles == 0 {
            return Err(InterpError::InvalidConfig(
                "max_cycles must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_overrides_defaults() {
        let cfg = InterpreterConfig::from_json(r#"{"variant": "minimal", "pin": 25}"#).unwrap();
        assert_eq!(cfg.variant, VariantKind::Minimal);
        assert_eq!(cfg.pin, 25);
        assert_eq!(cfg.link_capacity, 64);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(InterpreterConfig::from_json(r#"{"pin": 40}"#).is_err());
        assert!(InterpreterConfig::from_json(r#"{"variant": "huge"}"#).is_err());
        assert!(InterpreterConfig::from_json(r#"{"link_capacity": 0}"#).is_err());
    }
}
