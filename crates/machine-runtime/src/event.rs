//! Event records raised by the engine and the results handlers resolve them to.

use std::fmt;

use crate::{CallbackError, MemAccess};

/// Number of event kinds, engine-raised and runtime-synthesized.
pub const EVENT_KIND_COUNT: usize = 14;

/// Reason the engine paused, or a marker synthesized by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum EventKind {
    /// A host callback failed while the engine was executing.
    CallbackError = 0,
    /// `RESET` instruction executed.
    Reset = 1,
    /// A-line opcode fetched from a trap-enabled page.
    AlineTrap = 2,
    /// Access to a reserved, unmapped or read-only location.
    MemAccess = 3,
    /// Access beyond the configured page count.
    MemBounds = 4,
    /// CPU memory trace hook asked for attention.
    MemTrace = 5,
    /// Special region requested attention.
    MemSpecial = 6,
    /// Instruction hook asked for attention.
    InstrHook = 7,
    /// Interrupt acknowledge cycle.
    IntAck = 8,
    /// Breakpoint hit.
    Breakpoint = 9,
    /// Watchpoint hit.
    Watchpoint = 10,
    /// Timer expired.
    Timer = 11,
    /// Host abort, synthesized by the runtime.
    UserAbort = 12,
    /// Run finished at its end pc, synthesized by the runtime.
    Done = 13,
}

impl EventKind {
    /// All kinds in code order.
    pub const ALL: [Self; EVENT_KIND_COUNT] = [
        Self::CallbackError,
        Self::Reset,
        Self::AlineTrap,
        Self::MemAccess,
        Self::MemBounds,
        Self::MemTrace,
        Self::MemSpecial,
        Self::InstrHook,
        Self::IntAck,
        Self::Breakpoint,
        Self::Watchpoint,
        Self::Timer,
        Self::UserAbort,
        Self::Done,
    ];

    /// Returns the table index of this kind.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Converts a stable code back into a kind.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        if (code as usize) < EVENT_KIND_COUNT {
            Some(Self::ALL[code as usize])
        } else {
            None
        }
    }

    /// Returns `true` for kinds only the runtime synthesizes.
    #[must_use]
    pub const fn is_synthesized(self) -> bool {
        matches!(self, Self::UserAbort | Self::Done)
    }

    /// Returns the upper-case display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CallbackError => "CALLBACK_ERROR",
            Self::Reset => "RESET",
            Self::AlineTrap => "ALINE_TRAP",
            Self::MemAccess => "MEM_ACCESS",
            Self::MemBounds => "MEM_BOUNDS",
            Self::MemTrace => "MEM_TRACE",
            Self::MemSpecial => "MEM_SPECIAL",
            Self::InstrHook => "INSTR_HOOK",
            Self::IntAck => "INT_ACK",
            Self::Breakpoint => "BREAKPOINT",
            Self::Watchpoint => "WATCHPOINT",
            Self::Timer => "TIMER",
            Self::UserAbort => "USER_ABORT",
            Self::Done => "DONE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Extra payload attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EventData {
    /// Nothing attached.
    #[default]
    None,
    /// Text produced by a trace hook.
    Text(String),
    /// Failure captured from a host callback.
    Error(CallbackError),
}

/// One event produced by the engine during an execution batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Event kind.
    pub kind: EventKind,
    /// Address associated with the event (pc or access address).
    pub addr: u32,
    /// Kind-dependent value (opcode, accessed value).
    pub value: u32,
    /// Packed access flags for memory events.
    pub flags: u32,
    /// Attached payload.
    pub data: EventData,
}

impl EventRecord {
    /// Creates a record without value, flags or payload.
    #[must_use]
    pub const fn new(kind: EventKind, addr: u32) -> Self {
        Self {
            kind,
            addr,
            value: 0,
            flags: 0,
            data: EventData::None,
        }
    }

    /// Creates a memory event describing `access`.
    #[must_use]
    pub const fn memory(kind: EventKind, access: &MemAccess) -> Self {
        Self {
            kind,
            addr: access.addr,
            value: access.value,
            flags: access.flags(),
            data: EventData::None,
        }
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_data(mut self, data: EventData) -> Self {
        self.data = data;
        self
    }

    /// Sets the value field.
    #[must_use]
    pub const fn with_value(mut self, value: u32) -> Self {
        self.value = value;
        self
    }

    /// Decodes the access carried by a memory event.
    #[must_use]
    pub const fn access(&self) -> Option<MemAccess> {
        MemAccess::from_flags(self.addr, self.value, self.flags)
    }

    /// Returns the captured callback failure, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&CallbackError> {
        match &self.data {
            EventData::Error(err) => Some(err),
            EventData::None | EventData::Text(_) => None,
        }
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @{:08x} value={:08x} flags={:04x}",
            self.kind, self.addr, self.value, self.flags
        )?;
        match &self.data {
            EventData::None => Ok(()),
            EventData::Text(text) => write!(f, " '{text}'"),
            EventData::Error(err) => write!(f, " [{err}]"),
        }
    }
}

/// Decision returned by an event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HandlerResult {
    /// Keep executing.
    #[default]
    Continue,
    /// Stop after the current batch with the given code.
    Terminate(EventKind),
    /// Stop immediately; recorded as a host abort.
    Abort,
}

impl HandlerResult {
    /// Returns the result code, `None` for [`HandlerResult::Continue`].
    #[must_use]
    pub const fn code(self) -> Option<EventKind> {
        match self {
            Self::Continue => None,
            Self::Terminate(kind) => Some(kind),
            Self::Abort => Some(EventKind::UserAbort),
        }
    }

    /// Returns `true` when the run loop must stop.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Continue)
    }
}

impl fmt::Display for HandlerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code() {
            None => f.write_str("CONTINUE"),
            Some(kind) => kind.fmt(f),
        }
    }
}

/// Per-kind event counters with a running total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct EventStats {
    counts: [u64; EVENT_KIND_COUNT],
    total: u64,
}

impl EventStats {
    /// Counts one event of `kind`.
    pub const fn record(&mut self, kind: EventKind) {
        self.counts[kind.index()] += 1;
        self.total += 1;
    }

    /// Returns the counter for `kind`.
    #[must_use]
    pub const fn count(&self, kind: EventKind) -> u64 {
        self.counts[kind.index()]
    }

    /// Returns the number of events counted.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Resets every counter.
    pub const fn clear(&mut self) {
        self.counts = [0; EVENT_KIND_COUNT];
        self.total = 0;
    }
}

impl fmt::Display for EventStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "total={}", self.total)?;
        for kind in EventKind::ALL {
            let count = self.count(kind);
            if count > 0 {
                write!(f, " {kind}={count}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{EventData, EventKind, EventRecord, EventStats, HandlerResult};
    use crate::{AccessWidth, CallbackError, MemAccess};

    #[test]
    fn kind_codes_roundtrip() {
        for (code, kind) in EventKind::ALL.iter().enumerate() {
            let code = u8::try_from(code).expect("small index");
            assert_eq!(EventKind::from_u8(code), Some(*kind));
            assert_eq!(kind.index(), usize::from(code));
        }
        assert_eq!(EventKind::from_u8(14), None);
        assert!(EventKind::Done.is_synthesized());
        assert!(!EventKind::Timer.is_synthesized());
    }

    #[test]
    fn abort_result_reports_user_abort_code() {
        assert_eq!(HandlerResult::Continue.code(), None);
        assert_eq!(
            HandlerResult::Terminate(EventKind::Done).code(),
            Some(EventKind::Done)
        );
        assert_eq!(HandlerResult::Abort.code(), Some(EventKind::UserAbort));
        assert!(!HandlerResult::Continue.is_terminal());
        assert_eq!(HandlerResult::Abort.to_string(), "USER_ABORT");
    }

    #[test]
    fn memory_records_decode_their_access() {
        let access = MemAccess::write(0x20, AccessWidth::Long, 7);
        let record = EventRecord::memory(EventKind::MemAccess, &access);
        assert_eq!(record.access(), Some(access));

        let record = EventRecord::new(EventKind::CallbackError, 0)
            .with_data(EventData::Error(CallbackError::Abort));
        assert_eq!(record.error(), Some(&CallbackError::Abort));
    }

    #[test]
    fn stats_count_per_kind_and_total() {
        let mut stats = EventStats::default();
        stats.record(EventKind::Reset);
        stats.record(EventKind::Reset);
        stats.record(EventKind::Timer);
        assert_eq!(stats.count(EventKind::Reset), 2);
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.to_string(), "total=3 RESET=2 TIMER=1");
        stats.clear();
        assert_eq!(stats, EventStats::default());
    }
}
