//! Pin channels seen by a state machine.
//!
//! The PIO block never owns its pins. Every step receives a [`PinChannel`], which decides whether
//! a read or write can complete. A channel that cannot accept or produce data right now makes the
//! instruction stall, with no state committed, until the channel changes.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinPoll {
    Ready,
    /// The channel cannot accept more output.
    Full,
}

pub trait PinChannel {
    /// Samples `count` pins starting at `base` (wrapping at 32); bit 0 is `base`.
    ///
    /// Returns `None` when no input is available, which stalls the reading instruction.
    fn read_pins(&mut self, base: u8, count: u8) -> Option<u32>;

    /// Drives `count` pins starting at `base` from the low bits of `value`.
    fn write_pins(&mut self, base: u8, count: u8, value: u32) -> PinPoll;

    fn set_pindirs(&mut self, base: u8, count: u8, value: u32);

    /// Level of a single GPIO, without consuming input. Used by `wait gpio` and `jmp pin`.
    fn level(&self, pin: u8) -> bool;
}

fn spread(base: u8, count: u8, value: u32) -> (u32, u32) {
    let mut mask = 0u32;
    let mut bits = 0u32;
    for i in 0..count.min(32) as u32 {
        let pin = (base as u32 + i) % 32;
        mask |= 1 << pin;
        if value & (1 << i) != 0 {
            bits |= 1 << pin;
        }
    }
    (mask, bits)
}

fn gather(base: u8, count: u8, levels: u32) -> u32 {
    let mut out = 0u32;
    for i in 0..count.min(32) as u32 {
        let pin = (base as u32 + i) % 32;
        if levels & (1 << pin) != 0 {
            out |= 1 << i;
        }
    }
    out
}

/// 32 ideal GPIOs. Never stalls.
///
/// A pin configured as output reads back its driven value; an input pin reads whatever the
/// test harness set with [`GpioBank::set_input`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpioBank {
    outputs: u32,
    inputs: u32,
    dirs: u32,
    writes: u64,
}

impl GpioBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_input(&mut self, pin: u8, high: bool) {
        let bit = 1u32 << (pin % 32);
        if high {
            self.inputs |= bit;
        } else {
            self.inputs &= !bit;
        }
    }

    pub fn set_inputs(&mut self, levels: u32) {
        self.inputs = levels;
    }

    pub fn output(&self, pin: u8) -> bool {
        self.outputs & (1 << (pin % 32)) != 0
    }

    pub fn outputs(&self) -> u32 {
        self.outputs
    }

    pub fn pindirs(&self) -> u32 {
        self.dirs
    }

    /// Number of completed `write_pins` calls.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    fn levels(&self) -> u32 {
        (self.outputs & self.dirs) | (self.inputs & !self.dirs)
    }
}

impl PinChannel for GpioBank {
    fn read_pins(&mut self, base: u8, count: u8) -> Option<u32> {
        Some(gather(base, count, self.levels()))
    }

    fn write_pins(&mut self, base: u8, count: u8, value: u32) -> PinPoll {
        let (mask, bits) = spread(base, count, value);
        self.outputs = (self.outputs & !mask) | bits;
        self.writes += 1;
        PinPoll::Ready
    }

    fn set_pindirs(&mut self, base: u8, count: u8, value: u32) {
        let (mask, bits) = spread(base, count, value);
        self.dirs = (self.dirs & !mask) | bits;
    }

    fn level(&self, pin: u8) -> bool {
        self.levels() & (1 << (pin % 32)) != 0
    }
}

/// A one-bit serial link with bounded queues in both directions.
///
/// Each `write_pins` transmits bit 0 of the value; each `read_pins` receives one bit into bit 0.
/// Writes stall once `capacity` bits are waiting for the peer, reads stall while nothing has been
/// fed. In loopback mode transmitted bits land in the receive queue instead.
#[derive(Debug, Clone)]
pub struct SerialLink {
    tx: VecDeque<bool>,
    rx: VecDeque<bool>,
    capacity: usize,
    loopback: bool,
    dirs: u32,
}

impl SerialLink {
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: VecDeque::with_capacity(capacity),
            rx: VecDeque::with_capacity(capacity),
            capacity,
            loopback: false,
            dirs: 0,
        }
    }

    pub fn loopback(capacity: usize) -> Self {
        Self {
            loopback: true,
            ..Self::new(capacity)
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_loopback(&self) -> bool {
        self.loopback
    }

    pub fn pindirs(&self) -> u32 {
        self.dirs
    }

    /// Bits transmitted by the state machine and not yet taken by the peer.
    pub fn output_len(&self) -> usize {
        self.tx.len()
    }

    /// Bits fed by the peer and not yet sampled.
    pub fn input_len(&self) -> usize {
        self.rx.len()
    }

    pub fn pop_output_bit(&mut self) -> Option<bool> {
        self.tx.pop_front()
    }

    pub fn take_output(&mut self) -> Vec<bool> {
        self.tx.drain(..).collect()
    }

    /// Takes 32 transmitted bits as one word, first bit in the MSB. Returns `None` (and takes
    /// nothing) until 32 bits are waiting.
    pub fn pop_output_word(&mut self) -> Option<u32> {
        if self.tx.len() < 32 {
            return None;
        }
        Some(
            self.tx
                .drain(..32)
                .fold(0u32, |word, bit| (word << 1) | bit as u32),
        )
    }

    /// Queues one bit for the state machine. Returns `false` if the input queue is full.
    pub fn feed_bit(&mut self, bit: bool) -> bool {
        if self.rx.len() >= self.capacity {
            return false;
        }
        self.rx.push_back(bit);
        true
    }

    /// Queues the low `bits` bits of `word`, most significant first. Returns `false`, feeding
    /// nothing, if they do not all fit.
    pub fn feed_word(&mut self, word: u32, bits: u8) -> bool {
        let bits = bits.min(32) as usize;
        if self.capacity - self.rx.len().min(self.capacity) < bits {
            return false;
        }
        for i in (0..bits).rev() {
            self.rx.push_back(word & (1 << i) != 0);
        }
        true
    }

    pub fn feed_byte(&mut self, byte: u8) -> bool {
        self.feed_word(byte as u32, 8)
    }
}

impl PinChannel for SerialLink {
    fn read_pins(&mut self, _base: u8, _count: u8) -> Option<u32> {
        self.rx.pop_front().map(u32::from)
    }

    fn write_pins(&mut self, _base: u8, _count: u8, value: u32) -> PinPoll {
        let queue = if self.loopback {
            &mut self.rx
        } else {
            &mut self.tx
        };
        if queue.len() >= self.capacity {
            return PinPoll::Full;
        }
        queue.push_back(value & 1 != 0);
        PinPoll::Ready
    }

    fn set_pindirs(&mut self, base: u8, count: u8, value: u32) {
        let (mask, bits) = spread(base, count, value);
        self.dirs = (self.dirs & !mask) | bits;
    }

    fn level(&self, _pin: u8) -> bool {
        self.rx.front().copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpio_pins_wrap_at_32() {
        let mut gpio = GpioBank::new();
        gpio.set_pindirs(30, 4, 0xf);
        gpio.write_pins(30, 4, 0b1011);
        assert!(gpio.output(30));
        assert!(gpio.output(31));
        assert!(!gpio.output(0));
        assert!(gpio.output(1));
        assert_eq!(gpio.read_pins(30, 4), Some(0b1011));
    }

    #[test]
    fn gpio_inputs_read_when_not_driven() {
        let mut gpio = GpioBank::new();
        gpio.set_input(5, true);
        assert_eq!(gpio.read_pins(5, 1), Some(1));
        gpio.set_pindirs(5, 1, 1);
        assert_eq!(gpio.read_pins(5, 1), Some(0));
    }

    #[test]
    fn serial_link_backpressure() {
        let mut link = SerialLink::new(2);
        assert_eq!(link.write_pins(0, 1, 1), PinPoll::Ready);
        assert_eq!(link.write_pins(0, 1, 0), PinPoll::Ready);
        assert_eq!(link.write_pins(0, 1, 1), PinPoll::Full);
        assert_eq!(link.pop_output_bit(), Some(true));
        assert_eq!(link.write_pins(0, 1, 1), PinPoll::Ready);
        assert_eq!(link.take_output(), vec![false, true]);
        assert_eq!(link.pop_output_bit(), None);
        assert_eq!(link.read_pins(0, 1), None);
    }

    #[test]
    fn serial_link_words_are_msb_first() {
        let mut link = SerialLink::loopback(64);
        for i in (0..32).rev() {
            let bit = (0x8000_0001u32 >> i) & 1;
            assert_eq!(link.write_pins(0, 1, bit), PinPoll::Ready);
        }
        assert_eq!(link.input_len(), 32);
        assert_eq!(link.read_pins(0, 1), Some(1));

        let mut link = SerialLink::new(64);
        for bit in [1, 0, 1, 0] {
            link.write_pins(0, 1, bit);
        }
        assert_eq!(link.pop_output_word(), None);
        for _ in 0..28 {
            link.write_pins(0, 1, 0);
        }
        assert_eq!(link.pop_output_word(), Some(0xA000_0000));
    }

    #[test]
    fn feed_word_is_all_or_nothing() {
        let mut link = SerialLink::new(8);
        assert!(link.feed_byte(0x81));
        assert!(!link.feed_bit(true));
        let mut link = SerialLink::new(4);
        assert!(!link.feed_byte(0xff));
        assert_eq!(link.input_len(), 0);
    }
}
