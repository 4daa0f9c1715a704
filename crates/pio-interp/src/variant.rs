use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{InterpError, Result};

/// Width of the dispatch field taken from each command word by `out pc, N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldWidth {
    /// Top nibble first, OSR shifting left. 16 micro-ops.
    Four,
    /// Low five bits first, OSR shifting right. 32 micro-ops, several per word.
    Five,
}

impl FieldWidth {
    pub fn bits(self) -> u8 {
        match self {
            FieldWidth::Four => 4,
            FieldWidth::Five => 5,
        }
    }

    /// Number of distinct field values.
    pub fn slots(self) -> usize {
        1 << self.bits()
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Return a 28-bit payload to the host through the RX FIFO.
        const EARLY_EXIT = 1 << 0;
        /// Execute a 16-bit instruction taken from the command word.
        const INJECT = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Variant {
    width: FieldWidth,
    caps: Capabilities,
}

impl Variant {
    /// The 20-instruction listing: 5-bit fields, no inject, no early exit.
    pub const fn minimal() -> Self {
        Self {
            width: FieldWidth::Five,
            caps: Capabilities::empty(),
        }
    }

    /// 4-bit fields with register, load and serial handlers only.
    pub const fn standard() -> Self {
        Self {
            width: FieldWidth::Four,
            caps: Capabilities::empty(),
        }
    }

    /// 4-bit fields with every handler.
    pub const fn full() -> Self {
        Self {
            width: FieldWidth::Four,
            caps: Capabilities::all(),
        }
    }

    pub fn new(width: FieldWidth, caps: Capabilities) -> Result<Self> {
        if width == FieldWidth::Five && !caps.is_empty() {
            return Err(InterpError::UnsupportedVariant(
                "the 5-bit layout has no room for inject or early exit",
            ));
        }
        Ok(Self { width, caps })
    }

    pub fn width(&self) -> FieldWidth {
        self.width
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    pub fn supports(&self, caps: Capabilities) -> bool {
        self.caps.contains(caps)
    }

    pub fn name(&self) -> &'static str {
        match (self.width, self.caps) {
            (FieldWidth::Five, _) => "minimal",
            (FieldWidth::Four, caps) if caps.is_empty() => "standard",
            (FieldWidth::Four, caps) if caps.is_all() => "full",
            (FieldWidth::Four, caps) if caps == Capabilities::INJECT => "standard+inject",
            (FieldWidth::Four, _) => "standard+early-exit",
        }
    }
}

impl Default for Variant {
    fn default() -> Self {
        Self::full()
    }
}

/// Named variants, as accepted in configuration files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    Minimal,
    Standard,
    #[default]
    Full,
}

impl From<VariantKind> for Variant {
    fn from(kind: VariantKind) -> Self {
        match kind {
            VariantKind::Minimal => Variant::minimal(),
            VariantKind::Standard => Variant::standard(),
            VariantKind::Full => Variant::full(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_bit_rejects_capabilities() {
        assert!(Variant::new(FieldWidth::Five, Capabilities::INJECT).is_err());
        assert_eq!(
            Variant::new(FieldWidth::Five, Capabilities::empty()),
            Ok(Variant::minimal())
        );
    }

    #[test]
    fn names() {
        assert_eq!(Variant::minimal().name(), "minimal");
        assert_eq!(Variant::standard().name(), "standard");
        assert_eq!(Variant::full().name(), "full");
        let custom = Variant::new(FieldWidth::Four, Capabilities::EARLY_EXIT).unwrap();
        assert_eq!(custom.name(), "standard+early-exit");
        assert!(custom.supports(Capabilities::EARLY_EXIT));
        assert!(!custom.supports(Capabilities::all()));
    }
}
