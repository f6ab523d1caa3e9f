//! Per-run summary returned by `Runtime::run`.

use std::fmt;
use std::time::Duration;

use crate::{EventKind, EventRecord, EventStats, HandlerResult};

/// Summary of one `run` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    /// Wall-clock time of the whole run, handlers included.
    pub wall_time: Duration,
    /// Time spent inside the engine's execute calls.
    pub engine_time: Duration,
    /// Cycles executed during the run, nested runs included.
    pub total_cycles: u64,
    /// Every dispatched event with the result its handler returned, in order.
    pub results: Vec<(HandlerResult, EventRecord)>,
    /// Per-kind event counters of this run.
    pub stats: EventStats,
}

impl RunInfo {
    /// Returns the last dispatched result.
    #[must_use]
    pub fn last_result(&self) -> Option<&(HandlerResult, EventRecord)> {
        self.results.last()
    }

    /// Returns the code that ended the run.
    #[must_use]
    pub fn result_code(&self) -> Option<EventKind> {
        self.last_result().and_then(|(result, _)| result.code())
    }

    /// Returns the engine share of wall time in percent.
    #[must_use]
    pub fn engine_share(&self) -> f64 {
        if self.wall_time.is_zero() {
            return 0.0;
        }
        100.0 * self.engine_time.as_secs_f64() / self.wall_time.as_secs_f64()
    }

    /// Returns executed cycles per wall-clock second.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cycles_per_second(&self) -> f64 {
        if self.wall_time.is_zero() {
            return 0.0;
        }
        self.total_cycles as f64 / self.wall_time.as_secs_f64()
    }
}

impl fmt::Display for RunInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.result_code().map_or("none", EventKind::name);
        write!(
            f,
            "run {code}: {} cycles in {:?} (engine {:.1}%), events {}",
            self.total_cycles,
            self.wall_time,
            self.engine_share(),
            self.stats
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::RunInfo;
    use crate::{EventKind, EventRecord, EventStats, HandlerResult};

    #[test]
    fn result_code_comes_from_the_last_result() {
        let mut info = RunInfo {
            wall_time: Duration::from_millis(10),
            engine_time: Duration::from_millis(5),
            total_cycles: 264,
            results: vec![(
                HandlerResult::Continue,
                EventRecord::new(EventKind::Reset, 0x1002),
            )],
            stats: EventStats::default(),
        };
        assert_eq!(info.result_code(), None);

        info.results.push((
            HandlerResult::Terminate(EventKind::Done),
            EventRecord::new(EventKind::Reset, 0x1004),
        ));
        assert_eq!(info.result_code(), Some(EventKind::Done));
        assert!((info.engine_share() - 50.0).abs() < 1e-9);
        assert!(info.to_string().starts_with("run DONE: 264 cycles"));
    }
}
