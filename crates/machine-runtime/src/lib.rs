//! Paged memory layouts, an event dispatch runtime and address labels for
//! embedded CPU engines.

/// Paged address-space model and the layout builder.
pub mod memory;
pub use memory::{
    page_of, page_start, pages_for, parse_size, MemoryLayout, MemoryLayoutBuilder, MemoryRange,
    RangeKind, RangeOptions, RangePayload, RomPadding, SizeToken, SpecialHandlers, SpecialRead,
    SpecialWrite, GIB, KIB, MIB, PAGE_BYTES, PAGE_MASK, PAGE_SHIFT,
};

/// CPU model and run loop configuration.
pub mod config;
pub use config::{CpuConfig, CpuType, RunConfig, DEFAULT_PC_TRACE_SIZE};

/// Error taxonomy of every layer.
pub mod error;
pub use error::{CallbackError, ConfigError, EngineError, LabelError, RuntimeError};

/// Engine events, handler results and per-kind counters.
pub mod event;
pub use event::{EventData, EventKind, EventRecord, EventStats, HandlerResult, EVENT_KIND_COUNT};

/// Register context and runtime lifecycle states.
pub mod state;
pub use state::{CpuContext, Register, RuntimeState, REGISTER_COUNT, SR_RESET};

/// Engine abstraction and the built-in reference engine.
pub mod engine;
pub use engine::{
    AccessWidth, Engine, FunctionCode, HookResult, MemAccess, MemFlags, MiniEngine, RegionBinding,
    TraceHook, TraceHookKind,
};

/// Address labels and their page-indexed store.
pub mod label;
pub use label::{format_label, Label, LabelData, LabelIndex, LabelRef, LabelStore, NullLabelStore};

/// Host abort flag.
pub mod abort;
pub use abort::AbortSignal;

/// Event dispatch runtime.
pub mod runtime;
pub use runtime::{
    EventHandlerTable, HandlerFn, RunInfo, RunRequest, Runtime, TrapFn, TrapMode, TrapTable,
};

#[cfg(test)]
use env_logger as _;
#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
