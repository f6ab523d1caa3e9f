//! Per-kind event handler registry and the default handlers.

use std::fmt;
use std::rc::Rc;

use log::{debug, error, info, warn};

use crate::event::EVENT_KIND_COUNT;
use crate::runtime::Runtime;
use crate::{CallbackError, Engine, EventKind, EventRecord, HandlerResult, RuntimeError};

/// Handler bound to one event kind.
pub type HandlerFn<E> =
    Rc<dyn Fn(&mut Runtime<E>, &EventRecord) -> Result<HandlerResult, RuntimeError>>;

/// One optional handler per event kind.
pub struct EventHandlerTable<E> {
    slots: [Option<HandlerFn<E>>; EVENT_KIND_COUNT],
}

impl<E> fmt::Debug for EventHandlerTable<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound: Vec<EventKind> = EventKind::ALL
            .into_iter()
            .filter(|kind| self.slots[kind.index()].is_some())
            .collect();
        f.debug_struct("EventHandlerTable")
            .field("bound", &bound)
            .finish()
    }
}

impl<E: Engine + 'static> Default for EventHandlerTable<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Engine + 'static> EventHandlerTable<E> {
    /// Creates a table without any handler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Creates a table with the default handler of every engine-raised kind.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        for kind in EventKind::ALL {
            table.restore_default(kind);
        }
        table
    }

    /// Returns the default handler of `kind`; synthesized kinds have none.
    #[must_use]
    pub fn default_handler(kind: EventKind) -> Option<HandlerFn<E>> {
        let handler: HandlerFn<E> = match kind {
            EventKind::CallbackError => Rc::new(on_callback_error::<E>),
            EventKind::Reset => Rc::new(on_reset::<E>),
            EventKind::AlineTrap => Rc::new(on_aline_trap::<E>),
            EventKind::MemAccess | EventKind::MemBounds => Rc::new(on_bad_access::<E>),
            EventKind::MemTrace
            | EventKind::MemSpecial
            | EventKind::InstrHook
            | EventKind::IntAck
            | EventKind::Breakpoint
            | EventKind::Watchpoint
            | EventKind::Timer => Rc::new(on_notice::<E>),
            EventKind::UserAbort | EventKind::Done => return None,
        };
        Some(handler)
    }

    /// Returns the handler bound to `kind`.
    #[must_use]
    pub fn get(&self, kind: EventKind) -> Option<&HandlerFn<E>> {
        self.slots[kind.index()].as_ref()
    }

    /// Returns `true` when `kind` has a handler.
    #[must_use]
    pub fn is_bound(&self, kind: EventKind) -> bool {
        self.slots[kind.index()].is_some()
    }

    /// Binds `handler` to `kind`, replacing the previous one.
    pub fn set<F>(&mut self, kind: EventKind, handler: F)
    where
        F: Fn(&mut Runtime<E>, &EventRecord) -> Result<HandlerResult, RuntimeError> + 'static,
    {
        self.slots[kind.index()] = Some(Rc::new(handler));
    }

    /// Removes the handler of `kind`; such events then fail the run.
    pub fn clear(&mut self, kind: EventKind) {
        self.slots[kind.index()] = None;
    }

    /// Rebinds the default handler of `kind`.
    pub fn restore_default(&mut self, kind: EventKind) {
        self.slots[kind.index()] = Self::default_handler(kind);
    }
}

fn on_callback_error<E: Engine + 'static>(
    rt: &mut Runtime<E>,
    event: &EventRecord,
) -> Result<HandlerResult, RuntimeError> {
    let err = event
        .error()
        .cloned()
        .unwrap_or_else(|| CallbackError::Failed("callback failed without details".into()));
    if err.is_abort() && rt.run_config().catch_abort {
        debug!("host abort inside callback @{:08x}", event.addr);
        return Ok(HandlerResult::Abort);
    }
    error!("handle CALLBACK raised: {err}");
    Err(RuntimeError::Callback(err))
}

fn on_reset<E: Engine + 'static>(
    rt: &mut Runtime<E>,
    event: &EventRecord,
) -> Result<HandlerResult, RuntimeError> {
    info!("handle RESET @{:08x}", event.addr);
    match rt.top_end_pc() {
        None => Ok(HandlerResult::Terminate(EventKind::Done)),
        Some(end_pc) if end_pc == event.addr => Ok(HandlerResult::Terminate(EventKind::Done)),
        Some(_) => Ok(HandlerResult::Continue),
    }
}

fn on_aline_trap<E: Engine + 'static>(
    rt: &mut Runtime<E>,
    event: &EventRecord,
) -> Result<HandlerResult, RuntimeError> {
    let opcode = u16::try_from(event.value & 0xFFFF).unwrap_or_default();
    if rt.traps().is_bound(opcode) {
        debug!("bound ALINE handler @{:08x}: {opcode:04x}", event.addr);
        rt.invoke_trap(opcode, event)?;
        return Ok(HandlerResult::Continue);
    }
    warn!("unbound ALINE encountered @{:08x}: {opcode:04x}", event.addr);
    Ok(HandlerResult::Terminate(EventKind::AlineTrap))
}

fn on_bad_access<E: Engine + 'static>(
    rt: &mut Runtime<E>,
    event: &EventRecord,
) -> Result<HandlerResult, RuntimeError> {
    let access = event
        .access()
        .map_or_else(|| format!("@{:08x}", event.addr), |access| access.to_string());
    let trail: Vec<String> = rt
        .pc_trace()
        .into_iter()
        .map(|pc| rt.describe_addr(pc))
        .collect();
    error!("{}: {access} pc trace [{}]", event.kind, trail.join(", "));
    for line in rt.context().lines() {
        error!("{line}");
    }
    Ok(HandlerResult::Terminate(event.kind))
}

fn on_notice<E: Engine + 'static>(
    _rt: &mut Runtime<E>,
    event: &EventRecord,
) -> Result<HandlerResult, RuntimeError> {
    info!("{event}");
    Ok(HandlerResult::Continue)
}

#[cfg(test)]
mod tests {
    use super::EventHandlerTable;
    use crate::{EventKind, HandlerResult, MiniEngine};

    #[test]
    fn defaults_cover_every_engine_kind() {
        let table = EventHandlerTable::<MiniEngine>::with_defaults();
        for kind in EventKind::ALL {
            assert_eq!(table.is_bound(kind), !kind.is_synthesized(), "{kind}");
        }
    }

    #[test]
    fn handlers_can_be_replaced_cleared_and_restored() {
        let mut table = EventHandlerTable::<MiniEngine>::with_defaults();
        let default = table.get(EventKind::Timer).cloned().expect("default");

        table.set(EventKind::Timer, |_, _| Ok(HandlerResult::Abort));
        let custom = table.get(EventKind::Timer).cloned().expect("custom");
        assert!(!std::rc::Rc::ptr_eq(&default, &custom));

        table.clear(EventKind::Timer);
        assert!(!table.is_bound(EventKind::Timer));

        table.restore_default(EventKind::Timer);
        assert!(table.is_bound(EventKind::Timer));
        assert!(format!("{table:?}").contains("Timer"));
    }
}
