use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::instruction::Instruction;

/// Wrap boundaries, relative to the start of the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Wrap {
    /// Last instruction before wrapping (`.wrap`).
    pub source: u8,
    /// First instruction after wrapping (`.wrap_target`).
    pub target: u8,
}

/// An assembled, not yet loaded, PIO program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub name: Option<String>,
    pub code: Vec<u16>,
    /// Fixed load offset, if the program was written for one.
    pub origin: Option<u8>,
    pub wrap: Wrap,
    /// Bound labels, relative to the program start.
    pub labels: BTreeMap<String, u8>,
}

impl Program {
    pub fn new(code: Vec<u16>) -> Self {
        let source = code.len().saturating_sub(1) as u8;
        Self {
            name: None,
            code,
            origin: None,
            wrap: Wrap { source, target: 0 },
            labels: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn label(&self, name: &str) -> Option<u8> {
        self.labels.get(name).copied()
    }

    /// The code with every JMP target moved by `offset`, as stored in instruction memory.
    pub fn relocated(&self, offset: u8) -> Vec<u16> {
        self.code
            .iter()
            .map(|&word| {
                if word >> 13 == 0 {
                    (word & !0x1f) | (word.wrapping_add(offset as u16) & 0x1f)
                } else {
                    word
                }
            })
            .collect()
    }

    /// `(wrap_target, wrap_top)` in absolute addresses for a program loaded at `offset`.
    pub fn wrap_at(&self, offset: u8) -> (u8, u8) {
        (
            (self.wrap.target + offset) % 32,
            (self.wrap.source + offset) % 32,
        )
    }

    /// One line per instruction: address, hex word, disassembly. Labels and wrap points are
    /// printed on their own lines.
    pub fn listing(&self, offset: u8) -> String {
        let mut out = String::new();
        let mut labels: BTreeMap<u8, Vec<&str>> = BTreeMap::new();
        for (name, &addr) in &self.labels {
            labels.entry(addr).or_default().push(name);
        }
        for (i, word) in self.relocated(offset).into_iter().enumerate() {
            let rel = i as u8;
            if rel == self.wrap.target {
                out.push_str(".wrap_target\n");
            }
            for name in labels.get(&rel).into_iter().flatten() {
                let _ = writeln!(out, "{name}:");
            }
            let text = match Instruction::decode(word) {
                Ok(inst) => inst.to_string(),
                Err(_) => "<reserved>".to_string(),
            };
            let _ = writeln!(out, "  {:2}: {word:#06x}  {text}", rel + offset);
            if rel == self.wrap.source {
                out.push_str(".wrap\n");
            }
        }
        out
    }
}
