//! Log-backed instrumentation armed around the outermost run.

use log::info;

use crate::engine::{TraceHook, TraceHookKind};
use crate::{Engine, RunConfig};

/// Log target of the instruction trace.
pub const INSTR_TARGET: &str = "machine_runtime::trace::instr";
/// Log target of the CPU memory trace.
pub const CPU_MEM_TARGET: &str = "machine_runtime::trace::mem_cpu";
/// Log target of the host memory trace.
pub const API_MEM_TARGET: &str = "machine_runtime::trace::mem_api";

/// Installs the PC ring trace and the configured log hooks.
pub(crate) fn arm<E: Engine>(engine: &mut E, config: &RunConfig) {
    engine.setup_pc_trace(config.pc_trace_size);
    if config.instr_trace {
        engine.register_trace_hook(TraceHook::Instruction(Box::new(|pc, opcode| {
            info!(target: INSTR_TARGET, "@{pc:08x}: {opcode:04x}");
            Ok(None)
        })));
    }
    if config.cpu_mem_trace {
        engine.register_trace_hook(TraceHook::CpuMemory(Box::new(|access| {
            info!(target: CPU_MEM_TARGET, "{access}");
            Ok(None)
        })));
    }
    if config.api_mem_trace {
        engine.register_trace_hook(TraceHook::ApiMemory(Box::new(|access| {
            info!(target: API_MEM_TARGET, "{access}");
            Ok(())
        })));
    }
}

/// Removes the hooks installed by [`arm`]. The PC trace stays readable.
pub(crate) fn disarm<E: Engine>(engine: &mut E, config: &RunConfig) {
    if config.instr_trace {
        engine.clear_trace_hook(TraceHookKind::Instruction);
    }
    if config.cpu_mem_trace {
        engine.clear_trace_hook(TraceHookKind::CpuMemory);
    }
    if config.api_mem_trace {
        engine.clear_trace_hook(TraceHookKind::ApiMemory);
    }
}

#[cfg(test)]
mod tests {
    use super::{arm, disarm};
    use crate::engine::TraceHookKind;
    use crate::{CpuType, Engine, MiniEngine, RunConfig};

    #[test]
    fn only_configured_hooks_are_armed_and_disarmed() {
        let mut engine = MiniEngine::new();
        engine.init(CpuType::M68000, 1, false).expect("fits");
        let config = RunConfig {
            instr_trace: true,
            api_mem_trace: true,
            ..RunConfig::default()
        };

        arm(&mut engine, &config);
        assert!(engine.has_trace_hook(TraceHookKind::Instruction));
        assert!(!engine.has_trace_hook(TraceHookKind::CpuMemory));
        assert!(engine.has_trace_hook(TraceHookKind::ApiMemory));

        disarm(&mut engine, &config);
        assert!(!engine.has_trace_hook(TraceHookKind::Instruction));
        assert!(!engine.has_trace_hook(TraceHookKind::ApiMemory));
    }
}
