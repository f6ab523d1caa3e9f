//! Contract between the runtime and an instruction engine, plus a small
//! deterministic reference engine.

use std::fmt;
use std::rc::Rc;

use crate::memory::SpecialHandlers;
use crate::{CallbackError, CpuContext, CpuType, EngineError, EventRecord};

/// Memory access descriptions shared by engines, regions and events.
pub mod access;
/// Reference engine used by tests and demos.
pub mod mini;
/// Cycle costs of the reference engine's instructions.
pub mod timing;

pub use access::{AccessWidth, FunctionCode, MemAccess};
pub use mini::MiniEngine;

/// Per-page access permissions of a backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemFlags(u8);

impl MemFlags {
    /// Pages may be read.
    pub const READ: Self = Self(1 << 0);
    /// Pages may be written.
    pub const WRITE: Self = Self(1 << 1);
    /// A-line opcodes fetched from these pages raise trap events.
    pub const TRAPS: Self = Self(1 << 2);
    /// Read and write.
    pub const RW: Self = Self(Self::READ.0 | Self::WRITE.0);

    /// Returns the union of both flag sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns `true` when every flag of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// How a run of pages is realized inside the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionBinding {
    /// Engine-owned backing store, optionally preloaded with `content`.
    Memory {
        /// Access permissions.
        flags: MemFlags,
        /// Initial bytes, at most the region size.
        content: Option<Rc<[u8]>>,
    },
    /// Accesses are forwarded to host accessors.
    Special(SpecialHandlers),
    /// Reads answer the fill word, writes are dropped.
    Empty(u32),
    /// Pages alias the backing of the pages starting at `base_page`.
    Mirror {
        /// First aliased page.
        base_page: u32,
    },
}

/// Result of an instruction or CPU memory hook: `Some(text)` raises an event.
pub type HookResult = Result<Option<String>, CallbackError>;

/// Callback invoked by the engine for tracing.
pub enum TraceHook {
    /// Called before each instruction with `(pc, opcode)`.
    Instruction(Box<dyn FnMut(u32, u16) -> HookResult>),
    /// Called for each memory access made by the CPU.
    CpuMemory(Box<dyn FnMut(&MemAccess) -> HookResult>),
    /// Called for each memory access made by the host.
    ApiMemory(Box<dyn FnMut(&MemAccess) -> Result<(), CallbackError>>),
}

impl TraceHook {
    /// Returns the slot this hook occupies.
    #[must_use]
    pub const fn kind(&self) -> TraceHookKind {
        match self {
            Self::Instruction(_) => TraceHookKind::Instruction,
            Self::CpuMemory(_) => TraceHookKind::CpuMemory,
            Self::ApiMemory(_) => TraceHookKind::ApiMemory,
        }
    }
}

impl fmt::Debug for TraceHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceHook::{:?}", self.kind())
    }
}

/// Trace hook slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceHookKind {
    /// Instruction hook.
    Instruction,
    /// CPU memory hook.
    CpuMemory,
    /// Host memory hook.
    ApiMemory,
}

/// Operations the runtime needs from an instruction engine.
///
/// Engines raise [`EventRecord`]s while executing; the runtime fetches and
/// dispatches them between batches.
pub trait Engine {
    /// Prepares the engine for `num_pages` pages of the given CPU.
    ///
    /// # Errors
    ///
    /// Fails when the page count exceeds what the CPU can address.
    fn init(&mut self, cpu_type: CpuType, num_pages: u32, labels_enabled: bool)
        -> Result<(), EngineError>;

    /// Releases all regions, hooks and state.
    fn shutdown(&mut self);

    /// Realizes a run of pages.
    ///
    /// # Errors
    ///
    /// Fails for pages outside the address space or mirrors of unbacked pages.
    fn map_region(
        &mut self,
        start_page: u32,
        num_pages: u32,
        binding: RegionBinding,
    ) -> Result<(), EngineError>;

    /// Loads the stack pointer and program counter from the reset vectors.
    ///
    /// # Errors
    ///
    /// Fails when the vectors cannot be read.
    fn pulse_reset(&mut self) -> Result<(), EngineError>;

    /// Executes until at least one event is pending or `cycle_budget` cycles
    /// are used up (0 means no budget). Returns the number of pending events.
    ///
    /// # Errors
    ///
    /// Fails on instructions the engine cannot execute.
    fn execute_until_event(&mut self, cycle_budget: u64) -> Result<usize, EngineError>;

    /// Drains pending events in the order they were raised.
    fn fetch_pending_events(&mut self) -> Vec<EventRecord>;

    /// Captures the register context.
    fn context(&self) -> CpuContext;

    /// Restores a register context.
    fn set_context(&mut self, ctx: &CpuContext);

    /// Zeroes the cycle counters.
    fn clear_cycle_counters(&mut self);

    /// Cycles used by the last execute call.
    fn done_cycles(&self) -> u64;

    /// Cycles used since the counters were last cleared.
    fn total_cycles(&self) -> u64;

    /// Host read access.
    ///
    /// # Errors
    ///
    /// Fails for unmapped addresses and failing special accessors.
    fn read_memory(&mut self, addr: u32, width: AccessWidth) -> Result<u32, EngineError>;

    /// Host write access.
    ///
    /// # Errors
    ///
    /// Fails for unmapped or read-only addresses and failing special accessors.
    fn write_memory(&mut self, addr: u32, width: AccessWidth, value: u32)
        -> Result<(), EngineError>;

    /// Installs a trace hook, replacing one of the same kind.
    fn register_trace_hook(&mut self, hook: TraceHook);

    /// Removes the hook of `kind`.
    fn clear_trace_hook(&mut self, kind: TraceHookKind);

    /// Records the last `depth` program counters, 0 disables recording.
    fn setup_pc_trace(&mut self, depth: usize);

    /// Recorded program counters, oldest first.
    fn pc_trace(&self) -> Vec<u32>;
}
