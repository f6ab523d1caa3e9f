//! Decoded description of a single memory access.

use std::fmt;

/// Transfer width of a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AccessWidth {
    /// 8-bit access.
    Byte = 1,
    /// 16-bit access.
    Word = 2,
    /// 32-bit access.
    Long = 4,
}

impl AccessWidth {
    /// Returns the width in bytes.
    #[must_use]
    pub const fn bytes(self) -> u32 {
        self as u32
    }

    /// Returns the width in bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.bytes() * 8
    }

    /// Masks `value` down to the width of this access.
    #[must_use]
    pub const fn truncate(self, value: u32) -> u32 {
        match self {
            Self::Byte => value & 0xFF,
            Self::Word => value & 0xFFFF,
            Self::Long => value,
        }
    }

    const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Byte),
            1 => Some(Self::Word),
            2 => Some(Self::Long),
            _ => None,
        }
    }

    const fn code(self) -> u32 {
        match self {
            Self::Byte => 0,
            Self::Word => 1,
            Self::Long => 2,
        }
    }
}

/// Bus cycle class of an access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FunctionCode {
    /// Operand access.
    #[default]
    Data,
    /// Instruction fetch.
    Program,
}

impl FunctionCode {
    const fn name(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Program => "program",
        }
    }
}

/// Bit layout of the packed access flags carried by memory events.
pub mod flags {
    /// Mask of the width code (0 = byte, 1 = word, 2 = long).
    pub const WIDTH_MASK: u32 = 0x3;
    /// Set for write accesses.
    pub const WRITE: u32 = 0x100;
    /// Set for data accesses.
    pub const DATA: u32 = 0x10;
    /// Set for program fetches.
    pub const PROGRAM: u32 = 0x20;
}

/// One memory access as seen by special regions, hooks and event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemAccess {
    /// Target byte address.
    pub addr: u32,
    /// Value written, or value read once known.
    pub value: u32,
    /// Transfer width.
    pub width: AccessWidth,
    /// `true` for writes.
    pub write: bool,
    /// Bus cycle class.
    pub fc: FunctionCode,
}

impl MemAccess {
    /// Describes a data read.
    #[must_use]
    pub const fn read(addr: u32, width: AccessWidth) -> Self {
        Self {
            addr,
            value: 0,
            width,
            write: false,
            fc: FunctionCode::Data,
        }
    }

    /// Describes a data write of `value`.
    #[must_use]
    pub const fn write(addr: u32, width: AccessWidth, value: u32) -> Self {
        Self {
            addr,
            value: width.truncate(value),
            width,
            write: true,
            fc: FunctionCode::Data,
        }
    }

    /// Returns the same access tagged as an instruction fetch.
    #[must_use]
    pub const fn program(mut self) -> Self {
        self.fc = FunctionCode::Program;
        self
    }

    /// Packs width, direction and function code into event flags.
    #[must_use]
    pub const fn flags(&self) -> u32 {
        let mut packed = self.width.code();
        if self.write {
            packed |= flags::WRITE;
        }
        packed
            | match self.fc {
                FunctionCode::Data => flags::DATA,
                FunctionCode::Program => flags::PROGRAM,
            }
    }

    /// Rebuilds an access from event fields, `None` for malformed flags.
    #[must_use]
    pub const fn from_flags(addr: u32, value: u32, packed: u32) -> Option<Self> {
        let Some(width) = AccessWidth::from_code(packed & flags::WIDTH_MASK) else {
            return None;
        };
        let fc = if packed & flags::PROGRAM != 0 {
            FunctionCode::Program
        } else {
            FunctionCode::Data
        };
        Some(Self {
            addr,
            value,
            width,
            write: packed & flags::WRITE != 0,
            fc,
        })
    }
}

impl fmt::Display for MemAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = if self.write { 'W' } else { 'R' };
        let digits = self.width.bytes() as usize * 2;
        write!(
            f,
            "{dir}{} @{:08x} = {:0digits$x} ({})",
            self.width.bits(),
            self.addr,
            self.value,
            self.fc.name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessWidth, FunctionCode, MemAccess};

    #[test]
    fn flags_survive_packing() {
        let access = MemAccess::write(0x1000, AccessWidth::Word, 0x1_0042);
        assert_eq!(access.value, 0x42);
        let back = MemAccess::from_flags(access.addr, access.value, access.flags());
        assert_eq!(back, Some(access));

        let fetch = MemAccess::read(0x2000, AccessWidth::Long).program();
        let back = MemAccess::from_flags(fetch.addr, 0, fetch.flags()).expect("valid flags");
        assert_eq!(back.fc, FunctionCode::Program);
        assert!(!back.write);
    }

    #[test]
    fn malformed_width_code_is_rejected() {
        assert_eq!(MemAccess::from_flags(0, 0, 0x3), None);
    }

    #[test]
    fn display_pads_value_to_access_width() {
        let access = MemAccess::write(0x1000, AccessWidth::Word, 0x42);
        assert_eq!(access.to_string(), "W16 @00001000 = 0042 (data)");
        let access = MemAccess::read(0xFF, AccessWidth::Byte);
        assert_eq!(access.to_string(), "R8 @000000ff = 00 (data)");
    }
}
