//! CPU register context and runtime lifecycle state.

/// Register context captured from and restored into the engine.
pub mod registers;
/// Lifecycle state machine of the runtime.
pub mod run_state;

pub use registers::{CpuContext, Register, REGISTER_COUNT, SR_RESET};
pub use run_state::RuntimeState;
