//! Per-state-machine configuration (the SDK's `pio_sm_config`).

use serde::{Deserialize, Serialize};

use crate::error::{PioError, Result};
use crate::{FIFO_DEPTH, INSTRUCTION_MEMORY_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftDirection {
    /// Towards the MSB: data leaves (OSR) or enters (ISR) at bit 31 first.
    Left,
    /// Towards the LSB.
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FifoJoin {
    #[default]
    None,
    /// RX storage is given to TX (depth 8 TX, no RX).
    Tx,
    /// TX storage is given to RX (depth 8 RX, no TX).
    Rx,
}

impl FifoJoin {
    /// `(tx_depth, rx_depth)`
    pub fn depths(self) -> (usize, usize) {
        match self {
            FifoJoin::None => (FIFO_DEPTH, FIFO_DEPTH),
            FifoJoin::Tx => (FIFO_DEPTH * 2, 0),
            FifoJoin::Rx => (0, FIFO_DEPTH * 2),
        }
    }
}

/// What `mov x, status` compares against `status_n`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    /// All-ones when the TX FIFO level is below `status_n`.
    #[default]
    TxLevel,
    /// All-ones when the RX FIFO level is below `status_n`.
    RxLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmConfig {
    /// Where execution continues after the instruction at `wrap_top`.
    pub wrap_target: u8,
    /// Last instruction of the wrapped region.
    pub wrap_top: u8,

    pub out_shift: ShiftDirection,
    pub autopull: bool,
    /// 1..=32 bits shifted out before the OSR counts as empty.
    pub pull_threshold: u8,

    pub in_shift: ShiftDirection,
    pub autopush: bool,
    /// 1..=32 bits shifted in before the ISR counts as full.
    pub push_threshold: u8,

    pub out_base: u8,
    pub out_count: u8,
    pub set_base: u8,
    pub set_count: u8,
    pub in_base: u8,
    /// GPIO tested by `jmp pin`.
    pub jmp_pin: u8,

    pub fifo_join: FifoJoin,
    pub status_source: StatusSource,
    pub status_n: u8,

    /// Integer clock divider: the state machine advances once every `clock_divider` block
    /// cycles.
    pub clock_divider: u16,
}

impl Default for SmConfig {
    fn default() -> Self {
        Self {
            wrap_target: 0,
            wrap_top: (INSTRUCTION_MEMORY_SIZE - 1) as u8,
            out_shift: ShiftDirection::Right,
            autopull: false,
            pull_threshold: 32,
            in_shift: ShiftDirection::Right,
            autopush: false,
            push_threshold: 32,
            out_base: 0,
            out_count: 32,
            set_base: 0,
            set_count: 5,
            in_base: 0,
            jmp_pin: 0,
            fifo_join: FifoJoin::None,
            status_source: StatusSource::TxLevel,
            status_n: 0,
            clock_divider: 1,
        }
    }
}

fn threshold(bits: u8) -> u8 {
    // The hardware encodes 32 as 0.
    if bits == 0 {
        32
    } else {
        bits.min(32)
    }
}

impl SmConfig {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn set_wrap(&mut self, target: u8, top: u8) -> &mut Self {
        self.wrap_target = target;
        self.wrap_top = top;
        self
    }

    pub fn set_out_pins(&mut self, base: u8, count: u8) -> &mut Self {
        self.out_base = base;
        self.out_count = count;
        self
    }

    pub fn set_set_pins(&mut self, base: u8, count: u8) -> &mut Self {
        self.set_base = base;
        self.set_count = count;
        self
    }

    pub fn set_in_pins(&mut self, base: u8) -> &mut Self {
        self.in_base = base;
        self
    }

    pub fn set_jmp_pin(&mut self, pin: u8) -> &mut Self {
        self.jmp_pin = pin;
        self
    }

    pub fn set_out_shift(&mut self, dir: ShiftDirection, autopull: bool, bits: u8) -> &mut Self {
        self.out_shift = dir;
        self.autopull = autopull;
        self.pull_threshold = threshold(bits);
        self
    }

    pub fn set_in_shift(&mut self, dir: ShiftDirection, autopush: bool, bits: u8) -> &mut Self {
        self.in_shift = dir;
        self.autopush = autopush;
        self.push_threshold = threshold(bits);
        self
    }

    pub fn set_fifo_join(&mut self, join: FifoJoin) -> &mut Self {
        self.fifo_join = join;
        self
    }

    pub fn set_mov_status(&mut self, source: StatusSource, n: u8) -> &mut Self {
        self.status_source = source;
        self.status_n = n;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let size = INSTRUCTION_MEMORY_SIZE as u8;
        if self.wrap_target >= size || self.wrap_top >= size {
            return Err(PioError::InvalidConfig("wrap address out of range"));
        }
        if !(1..=32).contains(&self.pull_threshold) || !(1..=32).contains(&self.push_threshold) {
            return Err(PioError::InvalidConfig("shift threshold must be 1..=32"));
        }
        if self.out_count > 32 || self.set_count > 5 {
            return Err(PioError::InvalidConfig("pin count out of range"));
        }
        if self.out_base >= 32 || self.set_base >= 32 || self.in_base >= 32 || self.jmp_pin >= 32
        {
            return Err(PioError::InvalidConfig("pin number out of range"));
        }
        if self.clock_divider == 0 {
            return Err(PioError::InvalidConfig("clock divider must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        SmConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg = SmConfig::from_json(r#"{ "out_shift": "left", "wrap_top": 15 }"#).unwrap();
        assert_eq!(cfg.out_shift, ShiftDirection::Left);
        assert_eq!(cfg.wrap_top, 15);
        assert_eq!(cfg.in_shift, ShiftDirection::Right);
        assert_eq!(cfg.pull_threshold, 32);
    }

    #[test]
    fn zero_threshold_means_32() {
        let mut cfg = SmConfig::default();
        cfg.set_out_shift(ShiftDirection::Left, true, 0);
        assert_eq!(cfg.pull_threshold, 32);
    }

    #[test]
    fn rejects_out_of_range_wrap() {
        let mut cfg = SmConfig::default();
        cfg.set_wrap(0, 32);
        assert_eq!(
            cfg.validate(),
            Err(PioError::InvalidConfig("wrap address out of range"))
        );
    }
}
