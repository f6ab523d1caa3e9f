//! Error types for layout building, labels, host callbacks, engines and runs.

use thiserror::Error;

use crate::memory::RangeKind;
use crate::{EventKind, RuntimeState};

/// Layout and configuration failures raised while building or validating a system.
///
/// A rejected operation never mutates the builder it was called on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Size token is empty or its numeric core is not all digits.
    #[error("invalid size given: `{0}`")]
    InvalidSize(String),
    /// Size token ends in a unit suffix other than `k`, `m`, `g` or `p`.
    #[error("unknown size units: `{0}`")]
    UnknownUnit(char),
    /// Byte value is not a multiple of the page size and auto-align is off.
    #[error("size value {bytes:#x} is not page aligned")]
    Misaligned {
        /// Resolved byte count.
        bytes: u64,
    },
    /// Byte value does not fit the 32-bit page index space.
    #[error("size value {bytes:#x} exceeds the addressable page range")]
    SizeOverflow {
        /// Resolved byte count.
        bytes: u64,
    },
    /// A range covering zero pages was requested.
    #[error("range at page {start_page} covers no pages")]
    EmptyRange {
        /// Requested first page.
        start_page: u32,
    },
    /// New range overlaps an existing one and sparse placement was not requested.
    #[error("range {start_page}+{num_pages} overlaps {existing_start}+{existing_pages}")]
    Overlap {
        /// Requested first page.
        start_page: u32,
        /// Requested page count.
        num_pages: u32,
        /// First page of the conflicting range.
        existing_start: u32,
        /// Page count of the conflicting range.
        existing_pages: u32,
    },
    /// Sparse placement found no free page inside the requested span.
    #[error("no free pages left in {start_page}+{num_pages}")]
    NoFreePages {
        /// Requested first page.
        start_page: u32,
        /// Requested page count.
        num_pages: u32,
    },
    /// Layout holds no ranges at all.
    #[error("no memory entries found")]
    EmptyLayout,
    /// Layout needs more pages than the CPU bus can address.
    #[error("too many pages: want={want} max={max}")]
    TooManyPages {
        /// Pages required by the layout.
        want: u32,
        /// Page budget of the target.
        max: u32,
    },
    /// RAM-at-zero policy is active but page 0 is not RAM.
    #[error("no RAM at page 0")]
    NoRamAtZero,
    /// ROM content is not page sized and no padding was requested.
    #[error("ROM image of {len} bytes needs padding")]
    RomNeedsPadding {
        /// Content length in bytes.
        len: usize,
    },
    /// ROM content is larger than the range it is placed in.
    #[error("ROM image of {len} bytes does not fit into {num_pages} pages")]
    RomTooLarge {
        /// Content length in bytes.
        len: usize,
        /// Page count of the ROM range.
        num_pages: u32,
    },
    /// Range payload does not match its kind.
    #[error("{kind} range at page {start_page} carries a mismatched payload")]
    InvalidPayload {
        /// First page of the range.
        start_page: u32,
        /// Kind of the range.
        kind: RangeKind,
    },
    /// Mirror base span runs past the last page.
    #[error("mirror {start_page}+{num_pages} aliases base page {base_page:#x} out of range")]
    MirrorOutOfRange {
        /// First page of the mirror range.
        start_page: u32,
        /// Page count of the mirror range.
        num_pages: u32,
        /// First base page it aliases.
        base_page: u32,
    },
    /// CPU model string or number is not recognized.
    #[error("invalid CPU type: `{0}`")]
    InvalidCpuType(String),
}

/// Rejected label insertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LabelError {
    /// Label covers no bytes.
    #[error("label at {addr:#010x} has zero size")]
    ZeroSize {
        /// Requested start address.
        addr: u32,
    },
    /// Label end lies beyond the 32-bit address space.
    #[error("label {addr:#010x}+{size:#x} wraps the address space")]
    AddressOverflow {
        /// Requested start address.
        addr: u32,
        /// Requested size.
        size: u32,
    },
    /// Label reaches past the pages covered by the store.
    #[error("label {addr:#010x}+{size:#x} exceeds {num_pages} pages")]
    OutOfRange {
        /// Requested start address.
        addr: u32,
        /// Requested size.
        size: u32,
        /// Page count of the store.
        num_pages: u32,
    },
}

/// Failure reported by a host-supplied callback.
///
/// Returned from special-region accessors, trace hooks and trap callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    /// Host asked to abort the current run.
    #[error("host abort requested")]
    Abort,
    /// Callback failed for a host-specific reason.
    #[error("callback failed: {0}")]
    Failed(String),
}

impl CallbackError {
    /// Returns `true` for the host abort signal.
    #[must_use]
    pub const fn is_abort(&self) -> bool {
        matches!(self, Self::Abort)
    }
}

/// Failures raised by an [`Engine`](crate::Engine) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Engine was used before `init` or after `shutdown`.
    #[error("engine is not initialized")]
    NotInitialized,
    /// Region does not fit the page count the engine was initialized with.
    #[error("pages {start_page}+{num_pages} exceed the {max_pages}-page address space")]
    PageOutOfRange {
        /// First page of the region.
        start_page: u32,
        /// Page count of the region.
        num_pages: u32,
        /// Page count of the engine.
        max_pages: u32,
    },
    /// Mirror region points at a base page without a backing store.
    #[error("mirror page {page:#x} has no backing base page {base_page:#x}")]
    InvalidMirror {
        /// Mirror page being realized.
        page: u32,
        /// Base page it should alias.
        base_page: u32,
    },
    /// Fetched opcode is not understood by the engine.
    #[error("illegal instruction {opcode:#06x} at {pc:#010x}")]
    IllegalInstruction {
        /// Address of the opcode.
        pc: u32,
        /// Raw opcode word.
        opcode: u16,
    },
    /// Host access hit an unmapped, reserved or out-of-bounds page.
    #[error("host access to unmapped address {addr:#010x}")]
    Unmapped {
        /// Target address.
        addr: u32,
    },
    /// Host write hit a read-only page.
    #[error("host write to read-only address {addr:#010x}")]
    ReadOnly {
        /// Target address.
        addr: u32,
    },
    /// A special-region accessor failed during a host access.
    #[error(transparent)]
    Callback(#[from] CallbackError),
}

/// Failures surfaced by the event dispatch [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Configuration was rejected while initializing.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Engine operation failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Operation is not allowed in the current lifecycle state.
    #[error("runtime is {state:?}, operation requires {expected}")]
    InvalidState {
        /// Current state.
        state: RuntimeState,
        /// Human-readable description of the accepted states.
        expected: &'static str,
    },
    /// A host callback failed; carries the original failure unchanged.
    #[error("callback raised: {0}")]
    Callback(CallbackError),
    /// Host abort signal was raised and abort catching is disabled.
    #[error("run aborted by host")]
    Aborted,
    /// An event arrived with neither a bound nor a default handler.
    #[error("no handler for {0} event")]
    Unhandled(EventKind),
    /// All A-line trap opcodes are allocated.
    #[error("no free trap opcodes left")]
    TrapsExhausted,
    /// Label could not be added.
    #[error(transparent)]
    Label(#[from] LabelError),
    /// Opcode is not an A-line trap or not bound.
    #[error("opcode {0:#06x} is not a bound trap")]
    UnknownTrap(u16),
}

#[cfg(test)]
mod tests {
    use super::{CallbackError, ConfigError, EngineError, RuntimeError};

    #[test]
    fn abort_is_the_only_abort_callback_error() {
        assert!(CallbackError::Abort.is_abort());
        assert!(!CallbackError::Failed("boom".into()).is_abort());
    }

    #[test]
    fn runtime_error_wraps_layers_transparently() {
        let err: RuntimeError = ConfigError::NoRamAtZero.into();
        assert_eq!(err.to_string(), "no RAM at page 0");

        let err: RuntimeError = EngineError::NotInitialized.into();
        assert_eq!(err, RuntimeError::Engine(EngineError::NotInitialized));
    }

    #[test]
    fn config_error_messages_name_the_offending_values() {
        let err = ConfigError::TooManyPages { want: 4, max: 2 };
        assert_eq!(err.to_string(), "too many pages: want=4 max=2");
        assert_eq!(
            ConfigError::UnknownUnit('q').to_string(),
            "unknown size units: `q`"
        );
    }
}
