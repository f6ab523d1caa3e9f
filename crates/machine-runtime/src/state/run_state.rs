use std::fmt;

/// Lifecycle state of a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RuntimeState {
    /// Created, `init` not yet called.
    #[default]
    Uninitialized,
    /// Engine configured, runs may start.
    Ready,
    /// Inside at least one `run` call.
    Running,
    /// Engine released; only `init` is accepted.
    Shutdown,
}

impl RuntimeState {
    /// Returns `true` when `init` may be called.
    #[must_use]
    pub const fn can_init(self) -> bool {
        matches!(self, Self::Uninitialized | Self::Shutdown)
    }

    /// Returns `true` when the engine is configured.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}
