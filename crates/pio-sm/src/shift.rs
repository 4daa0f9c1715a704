use serde::{Deserialize, Serialize};

use crate::config::ShiftDirection;

/// A 32-bit shift register with its shift counter.
///
/// `count` is the number of bits shifted in (ISR) or out (OSR) since the register was last
/// loaded or cleared, saturating at 32.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftRegister {
    pub value: u32,
    pub count: u8,
}

fn mask(n: u8) -> u32 {
    if n >= 32 {
        u32::MAX
    } else {
        (1u32 << n) - 1
    }
}

impl ShiftRegister {
    pub const fn new(value: u32) -> Self {
        Self { value, count: 0 }
    }

    /// Loads a full value and resets the counter (`mov isr, ..`, `mov osr, ..`, `pull`).
    pub fn set(&mut self, value: u32) {
        self.value = value;
        self.count = 0;
    }

    /// Marks the register empty: OSR fully shifted out.
    pub fn drain(&mut self) {
        self.count = 32;
    }

    pub fn clear(&mut self) {
        self.set(0);
    }

    /// Shifts `n` (1..=32) bits out and returns them right-aligned.
    pub fn shift_out(&mut self, n: u8, dir: ShiftDirection) -> u32 {
        let n = n.clamp(1, 32);
        let out = match dir {
            ShiftDirection::Right => {
                let out = self.value & mask(n);
                self.value = if n == 32 { 0 } else { self.value >> n };
                out
            }
            ShiftDirection::Left => {
                let out = if n == 32 {
                    self.value
                } else {
                    self.value >> (32 - n)
                };
                self.value = if n == 32 { 0 } else { self.value << n };
                out
            }
        };
        self.count = (self.count + n).min(32);
        out
    }

    /// Shifts the low `n` (1..=32) bits of `data` in.
    pub fn shift_in(&mut self, data: u32, n: u8, dir: ShiftDirection) {
        let n = n.clamp(1, 32);
        let data = data & mask(n);
        self.value = if n == 32 {
            data
        } else {
            match dir {
                ShiftDirection::Left => (self.value << n) | data,
                ShiftDirection::Right => (self.value >> n) | (data << (32 - n)),
            }
        };
        self.count = (self.count + n).min(32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_out_left_is_msb_first() {
        let mut osr = ShiftRegister::new(0xA000_0001);
        assert_eq!(osr.shift_out(4, ShiftDirection::Left), 0xA);
        assert_eq!(osr.value, 0x0000_0010);
        assert_eq!(osr.count, 4);
    }

    #[test]
    fn shift_out_right_is_lsb_first() {
        let mut osr = ShiftRegister::new(0x0000_0035);
        assert_eq!(osr.shift_out(5, ShiftDirection::Right), 0x15);
        assert_eq!(osr.value, 0x1);
    }

    #[test]
    fn full_width_shifts_empty_the_register() {
        let mut osr = ShiftRegister::new(0xDEAD_BEEF);
        assert_eq!(osr.shift_out(32, ShiftDirection::Left), 0xDEAD_BEEF);
        assert_eq!(osr.value, 0);
        assert_eq!(osr.count, 32);

        let mut isr = ShiftRegister::new(0x1234);
        isr.shift_in(0xCAFE_F00D, 32, ShiftDirection::Right);
        assert_eq!(isr.value, 0xCAFE_F00D);
    }

    #[test]
    fn shift_in_directions() {
        let mut isr = ShiftRegister::default();
        isr.shift_in(1, 1, ShiftDirection::Left);
        isr.shift_in(0, 1, ShiftDirection::Left);
        isr.shift_in(1, 1, ShiftDirection::Left);
        assert_eq!(isr.value, 0b101);

        let mut isr = ShiftRegister::default();
        isr.shift_in(1, 1, ShiftDirection::Right);
        assert_eq!(isr.value, 0x8000_0000);
        isr.shift_in(0b11, 2, ShiftDirection::Right);
        assert_eq!(isr.value, 0xE000_0000);
        assert_eq!(isr.count, 3);
    }

    #[test]
    fn counter_saturates() {
        let mut osr = ShiftRegister::new(0);
        for _ in 0..10 {
            osr.shift_out(8, ShiftDirection::Left);
        }
        assert_eq!(osr.count, 32);
    }
}
