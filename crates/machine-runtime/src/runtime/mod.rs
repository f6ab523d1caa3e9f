//! Event dispatch runtime driving an [`Engine`] through nested runs.

use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::engine::{AccessWidth, MemFlags, RegionBinding};
use crate::label::{format_label, LabelIndex, LabelStore, NullLabelStore};
use crate::memory::{MemoryLayout, MemoryLayoutBuilder, MemoryRange, RangeKind, RangePayload};
use crate::{
    AbortSignal, ConfigError, CpuConfig, CpuContext, Engine, EventKind, EventRecord, EventStats,
    HandlerResult, RunConfig, RuntimeError, RuntimeState,
};

/// Per-kind handler registry.
pub mod handlers;
/// Result summary of a run.
pub mod info;
/// A-line trap table.
pub mod traps;
/// Log-backed trace hooks.
pub mod trace;

pub use handlers::{EventHandlerTable, HandlerFn};
pub use info::RunInfo;
pub use traps::{TrapFn, TrapMode, TrapTable};

/// Optional overrides for one `run` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunRequest {
    /// Finish the run when a `RESET` reports this address.
    pub end_pc: Option<u32>,
    /// Program counter to start from.
    pub start_pc: Option<u32>,
    /// Stack pointer to start with.
    pub start_sp: Option<u32>,
}

impl RunRequest {
    /// Request finishing at `end_pc`.
    #[must_use]
    pub const fn until(end_pc: u32) -> Self {
        Self {
            end_pc: Some(end_pc),
            start_pc: None,
            start_sp: None,
        }
    }

    /// Starts at `pc`.
    #[must_use]
    pub const fn from_pc(mut self, pc: u32) -> Self {
        self.start_pc = Some(pc);
        self
    }

    /// Starts with stack pointer `sp`.
    #[must_use]
    pub const fn with_sp(mut self, sp: u32) -> Self {
        self.start_sp = Some(sp);
        self
    }
}

/// Owns an engine and runs it until handlers decide to stop.
///
/// Runs nest: a handler or trap callback may call [`Runtime::run_with`] again,
/// the outer register context is restored when the inner run returns.
pub struct Runtime<E> {
    engine: E,
    state: RuntimeState,
    cpu: CpuConfig,
    run_config: RunConfig,
    layout: Option<MemoryLayout>,
    handlers: EventHandlerTable<E>,
    traps: TrapTable<E>,
    labels: Box<dyn LabelIndex>,
    end_pcs: Vec<Option<u32>>,
    stats: EventStats,
    abort: AbortSignal,
    reset_pc: u32,
    reset_sp: u32,
}

impl<E: fmt::Debug> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("engine", &self.engine)
            .field("state", &self.state)
            .field("cpu", &self.cpu)
            .field("run_config", &self.run_config)
            .field("handlers", &self.handlers)
            .field("traps", &self.traps)
            .field("labels", &self.labels)
            .field("end_pcs", &self.end_pcs)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<E: Engine + 'static> Runtime<E> {
    /// Wraps an engine; call [`Runtime::init`] before running.
    #[must_use]
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            state: RuntimeState::Uninitialized,
            cpu: CpuConfig::default(),
            run_config: RunConfig::default(),
            layout: None,
            handlers: EventHandlerTable::new(),
            traps: TrapTable::new(),
            labels: Box::new(NullLabelStore),
            end_pcs: Vec::new(),
            stats: EventStats::default(),
            abort: AbortSignal::new(),
            reset_pc: 0,
            reset_sp: 0,
        }
    }

    fn require(&self, ok: bool, expected: &'static str) -> Result<(), RuntimeError> {
        if ok {
            Ok(())
        } else {
            Err(RuntimeError::InvalidState {
                state: self.state,
                expected,
            })
        }
    }

    /// Validates `layout`, configures the engine and installs the default handlers.
    ///
    /// # Errors
    ///
    /// Fails outside the uninitialized and shutdown states, for layouts that do
    /// not fit the CPU, and when the engine rejects a region.
    pub fn init(
        &mut self,
        cpu: CpuConfig,
        layout: MemoryLayoutBuilder,
        run_config: RunConfig,
    ) -> Result<(), RuntimeError> {
        self.require(self.state.can_init(), "uninitialized or shutdown")?;
        let layout = layout.build(cpu.max_pages())?;
        let num_pages = layout.num_pages();

        self.engine
            .init(cpu.cpu_type, num_pages, run_config.with_labels)?;
        if let Err(err) = self.realize(&layout) {
            self.engine.shutdown();
            return Err(err);
        }

        self.cpu = cpu;
        self.run_config = run_config;
        self.handlers = EventHandlerTable::with_defaults();
        self.traps.clear();
        self.labels = if run_config.with_labels {
            Box::new(LabelStore::new(num_pages))
        } else {
            Box::new(NullLabelStore)
        };
        self.end_pcs.clear();
        self.stats.clear();
        debug!(
            "init {} with {num_pages} pages: {}",
            cpu.cpu_type,
            layout.page_map()
        );
        self.layout = Some(layout);
        self.state = RuntimeState::Ready;
        Ok(())
    }

    /// Maps every range into the engine, mirrors last so their base pages exist.
    fn realize(&mut self, layout: &MemoryLayout) -> Result<(), RuntimeError> {
        let (mirrors, direct): (Vec<_>, Vec<_>) = layout
            .ranges()
            .iter()
            .partition(|range| range.kind == RangeKind::Mirror);
        for range in direct.into_iter().chain(mirrors) {
            if let Some(binding) = binding_for(range)? {
                debug!("map {range}");
                self.engine
                    .map_region(range.start_page, range.num_pages, binding)?;
            }
        }
        Ok(())
    }

    /// Releases the engine; only [`Runtime::init`] is accepted afterwards.
    ///
    /// # Errors
    ///
    /// Fails unless the runtime is ready.
    pub fn shutdown(&mut self) -> Result<(), RuntimeError> {
        self.require(self.state == RuntimeState::Ready, "ready")?;
        self.engine.shutdown();
        self.layout = None;
        self.handlers = EventHandlerTable::new();
        self.traps.clear();
        self.labels = Box::new(NullLabelStore);
        self.end_pcs.clear();
        self.state = RuntimeState::Shutdown;
        debug!("shutdown");
        Ok(())
    }

    /// Stores the reset vectors, pulses reset and clears the cycle counters.
    ///
    /// # Errors
    ///
    /// Fails when not initialized or when the vectors cannot be written.
    pub fn reset(&mut self, pc: u32, sp: u32) -> Result<(), RuntimeError> {
        self.require(self.state.is_active(), "ready or running")?;
        self.engine.write_memory(0, AccessWidth::Long, sp)?;
        self.engine.write_memory(4, AccessWidth::Long, pc)?;
        self.engine.pulse_reset()?;
        self.engine.clear_cycle_counters();
        self.reset_pc = pc;
        self.reset_sp = sp;
        Ok(())
    }

    /// Runs until a handler terminates the run.
    ///
    /// # Errors
    ///
    /// See [`Runtime::run_with`].
    pub fn run(&mut self) -> Result<RunInfo, RuntimeError> {
        self.run_with(RunRequest::default())
    }

    /// Runs with optional end pc and start overrides.
    ///
    /// # Errors
    ///
    /// Fails when not initialized, on engine errors, unhandled events,
    /// re-raised callback failures and uncaught host aborts.
    pub fn run_with(&mut self, request: RunRequest) -> Result<RunInfo, RuntimeError> {
        self.require(self.state.is_active(), "ready or running")?;
        let nested = !self.end_pcs.is_empty();
        let saved_ctx = nested.then(|| self.engine.context());
        let outer_stats = nested.then_some(self.stats);
        self.stats.clear();

        if request.start_pc.is_some() || request.start_sp.is_some() {
            let mut ctx = self.engine.context();
            if let Some(pc) = request.start_pc {
                ctx.set_pc(pc);
            }
            if let Some(sp) = request.start_sp {
                ctx.set_sp(sp);
            }
            self.engine.set_context(&ctx);
        }

        self.end_pcs.push(request.end_pc);
        if !nested {
            trace::arm(&mut self.engine, &self.run_config);
            self.state = RuntimeState::Running;
        }

        let start_cycles = self.engine.total_cycles();
        let started = Instant::now();
        let mut engine_time = Duration::ZERO;
        let outcome = self.run_loop(&mut engine_time);
        let wall_time = started.elapsed();

        self.end_pcs.pop();
        if let Some(ctx) = saved_ctx {
            self.engine.set_context(&ctx);
        }
        if !nested {
            trace::disarm(&mut self.engine, &self.run_config);
            self.state = RuntimeState::Ready;
        }
        let stats = self.stats;
        if let Some(outer) = outer_stats {
            self.stats = outer;
        }

        let info = RunInfo {
            wall_time,
            engine_time,
            total_cycles: self.engine.total_cycles().saturating_sub(start_cycles),
            results: outcome?,
            stats,
        };
        info!("{info}");
        Ok(info)
    }

    fn run_loop(
        &mut self,
        engine_time: &mut Duration,
    ) -> Result<Vec<(HandlerResult, EventRecord)>, RuntimeError> {
        let mut results = Vec::new();
        loop {
            let batch_start = Instant::now();
            let executed = self
                .engine
                .execute_until_event(self.run_config.cycles_per_run);
            *engine_time += batch_start.elapsed();
            executed?;
            let events = self.engine.fetch_pending_events();

            if self.abort.take() {
                if !self.run_config.catch_abort {
                    return Err(RuntimeError::Aborted);
                }
                debug!("host abort at batch boundary, {} events dropped", events.len());
                let record = EventRecord::new(EventKind::UserAbort, self.engine.context().pc());
                self.stats.record(EventKind::UserAbort);
                results.push((HandlerResult::Abort, record));
                return Ok(results);
            }

            let mut finished = false;
            for event in events {
                self.stats.record(event.kind);
                match self.dispatch(&event)? {
                    HandlerResult::Abort => {
                        let record = EventRecord::new(EventKind::UserAbort, event.addr)
                            .with_data(event.data);
                        self.stats.record(EventKind::UserAbort);
                        results.push((HandlerResult::Abort, record));
                        return Ok(results);
                    }
                    result => {
                        finished |= result.is_terminal();
                        results.push((result, event));
                    }
                }
            }
            if finished {
                return Ok(results);
            }
        }
    }

    fn dispatch(&mut self, event: &EventRecord) -> Result<HandlerResult, RuntimeError> {
        let handler = self
            .handlers
            .get(event.kind)
            .cloned()
            .ok_or(RuntimeError::Unhandled(event.kind))?;
        handler(self, event)
    }

    /// Runs the callback bound to `opcode` and applies its trap mode.
    pub(crate) fn invoke_trap(
        &mut self,
        opcode: u16,
        event: &EventRecord,
    ) -> Result<(), RuntimeError> {
        let (mode, callback) = self
            .traps
            .get(opcode)
            .ok_or(RuntimeError::UnknownTrap(opcode))?;
        if mode == TrapMode::OneShot {
            self.traps.free(opcode)?;
        }
        callback(self, event)?;
        if mode == TrapMode::AutoRts {
            let mut ctx = self.engine.context();
            let ret = self.engine.read_memory(ctx.sp(), AccessWidth::Long)?;
            ctx.set_pc(ret);
            ctx.set_sp(ctx.sp().wrapping_add(4));
            self.engine.set_context(&ctx);
        }
        Ok(())
    }

    /// Renders `addr` with the label covering it, if any.
    #[must_use]
    pub fn describe_addr(&self, addr: u32) -> String {
        match self.labels.find(addr) {
            Some(label) => format!("{addr:08x} ({})", format_label(&label, addr)),
            None => format!("{addr:08x}"),
        }
    }

    /// Binds `handler` to `kind`.
    pub fn set_handler<F>(&mut self, kind: EventKind, handler: F)
    where
        F: Fn(&mut Self, &EventRecord) -> Result<HandlerResult, RuntimeError> + 'static,
    {
        self.handlers.set(kind, handler);
    }

    /// Returns the end pc of the innermost active run.
    #[must_use]
    pub fn top_end_pc(&self) -> Option<u32> {
        self.end_pcs.last().copied().flatten()
    }

    /// Returns the number of active (nested) runs.
    #[must_use]
    pub fn run_depth(&self) -> usize {
        self.end_pcs.len()
    }

    /// Returns the PC ring trace, oldest first.
    #[must_use]
    pub fn pc_trace(&self) -> Vec<u32> {
        self.engine.pc_trace()
    }

    /// Captures the current register context.
    #[must_use]
    pub fn context(&self) -> CpuContext {
        self.engine.context()
    }
}

impl<E> Runtime<E> {
    /// Returns the engine.
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    /// Returns the engine for direct memory and register access.
    pub const fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Returns the lifecycle state.
    pub const fn state(&self) -> RuntimeState {
        self.state
    }

    /// Returns the CPU configuration of the last `init`.
    pub const fn cpu_config(&self) -> &CpuConfig {
        &self.cpu
    }

    /// Returns the run configuration of the last `init`.
    pub const fn run_config(&self) -> &RunConfig {
        &self.run_config
    }

    /// Returns the realized layout while initialized.
    pub const fn layout(&self) -> Option<&MemoryLayout> {
        self.layout.as_ref()
    }

    /// Returns the label store.
    pub fn labels(&self) -> &dyn LabelIndex {
        self.labels.as_ref()
    }

    /// Returns the label store for mutation.
    pub fn labels_mut(&mut self) -> &mut dyn LabelIndex {
        self.labels.as_mut()
    }

    /// Returns the handler table.
    pub const fn handlers(&self) -> &EventHandlerTable<E> {
        &self.handlers
    }

    /// Returns the handler table for mutation.
    pub const fn handlers_mut(&mut self) -> &mut EventHandlerTable<E> {
        &mut self.handlers
    }

    /// Returns the trap table.
    pub const fn traps(&self) -> &TrapTable<E> {
        &self.traps
    }

    /// Returns the trap table for mutation.
    pub const fn traps_mut(&mut self) -> &mut TrapTable<E> {
        &mut self.traps
    }

    /// Returns the abort signal; clone it to raise aborts from elsewhere.
    pub const fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    /// Returns the counters of the innermost active or last finished run.
    pub const fn stats(&self) -> &EventStats {
        &self.stats
    }

    /// Returns the pc passed to the last `reset`.
    pub const fn reset_pc(&self) -> u32 {
        self.reset_pc
    }

    /// Returns the sp passed to the last `reset`.
    pub const fn reset_sp(&self) -> u32 {
        self.reset_sp
    }
}

/// Translates a layout range into an engine binding; unmapped kinds yield `None`.
fn binding_for(range: &MemoryRange) -> Result<Option<RegionBinding>, RuntimeError> {
    if !range.kind.is_mapped() {
        return Ok(None);
    }
    let mut flags = MemFlags::READ;
    if range.traps {
        flags = flags.union(MemFlags::TRAPS);
    }
    let binding = match (range.kind, &range.payload) {
        (RangeKind::Ram, RangePayload::None) => RegionBinding::Memory {
            flags: flags.union(MemFlags::WRITE),
            content: None,
        },
        (RangeKind::Rom, RangePayload::None) => RegionBinding::Memory {
            flags,
            content: None,
        },
        (RangeKind::Rom, RangePayload::Rom(data)) => RegionBinding::Memory {
            flags,
            content: Some(data.clone()),
        },
        (RangeKind::Special, RangePayload::Special(handlers)) => {
            RegionBinding::Special(handlers.clone())
        }
        (RangeKind::Empty, RangePayload::Empty(fill)) => RegionBinding::Empty(*fill),
        (RangeKind::Mirror, RangePayload::Mirror(base_page)) => RegionBinding::Mirror {
            base_page: *base_page,
        },
        (kind, _) => {
            return Err(ConfigError::InvalidPayload {
                start_page: range.start_page,
                kind,
            }
            .into())
        }
    };
    Ok(Some(binding))
}

#[cfg(test)]
mod tests {
    use super::{binding_for, RunRequest, Runtime};
    use crate::engine::{MemFlags, RegionBinding};
    use crate::memory::{MemoryLayoutBuilder, MemoryRange, RangeKind, RangeOptions};
    use crate::{CpuConfig, MiniEngine, RunConfig, RuntimeError, RuntimeState};

    #[test]
    fn run_requests_compose() {
        let request = RunRequest::until(0x2008).from_pc(0x2000).with_sp(0x4000);
        assert_eq!(request.end_pc, Some(0x2008));
        assert_eq!(request.start_pc, Some(0x2000));
        assert_eq!(request.start_sp, Some(0x4000));
        assert_eq!(RunRequest::default().end_pc, None);
    }

    #[test]
    fn reserve_ranges_stay_unmapped_and_ram_gets_write_access() {
        assert_eq!(
            binding_for(&MemoryRange::new(1, 1, RangeKind::Reserve)),
            Ok(None)
        );
        let mut ram = MemoryRange::new(0, 1, RangeKind::Ram);
        ram.traps = false;
        assert_eq!(
            binding_for(&ram),
            Ok(Some(RegionBinding::Memory {
                flags: MemFlags::RW,
                content: None
            }))
        );
        assert!(matches!(
            binding_for(&MemoryRange::new(2, 1, RangeKind::Mirror)),
            Err(RuntimeError::Config(_))
        ));
    }

    #[test]
    fn lifecycle_is_enforced() {
        let mut rt = Runtime::new(MiniEngine::new());
        assert!(matches!(
            rt.run(),
            Err(RuntimeError::InvalidState {
                state: RuntimeState::Uninitialized,
                ..
            })
        ));

        let mut layout = MemoryLayoutBuilder::new();
        layout
            .add_ram_range(0, 1, &RangeOptions::default())
            .expect("fits");
        rt.init(CpuConfig::default(), layout.clone(), RunConfig::default())
            .expect("valid layout");
        assert_eq!(rt.state(), RuntimeState::Ready);
        assert!(rt
            .init(CpuConfig::default(), layout.clone(), RunConfig::default())
            .is_err());

        rt.shutdown().expect("ready");
        assert!(rt.reset(0x1000, 0x8000).is_err());
        assert!(rt.shutdown().is_err());
        rt.init(CpuConfig::default(), layout, RunConfig::default())
            .expect("re-init after shutdown");
        assert_eq!(rt.state(), RuntimeState::Ready);
    }
}
