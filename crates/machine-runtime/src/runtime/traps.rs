//! A-line trap opcode bindings.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::runtime::Runtime;
use crate::{EventRecord, RuntimeError};

/// First A-line trap opcode.
pub const TRAP_FIRST: u16 = 0xA000;
/// Last A-line trap opcode.
pub const TRAP_LAST: u16 = 0xAFFF;
/// Number of A-line trap opcodes.
pub const TRAP_COUNT: usize = (TRAP_LAST - TRAP_FIRST) as usize + 1;

/// Host callback bound to a trap opcode.
pub type TrapFn<E> = Rc<dyn Fn(&mut Runtime<E>, &EventRecord) -> Result<(), RuntimeError>>;

/// What happens around a trap callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TrapMode {
    /// Call the callback, execution resumes after the opcode.
    #[default]
    Default,
    /// Free the binding before the first call.
    OneShot,
    /// Return from subroutine after the call: `pc = mem32[sp]; sp += 4`.
    AutoRts,
}

struct TrapBinding<E> {
    mode: TrapMode,
    callback: TrapFn<E>,
}

impl<E> Clone for TrapBinding<E> {
    fn clone(&self) -> Self {
        Self {
            mode: self.mode,
            callback: Rc::clone(&self.callback),
        }
    }
}

/// Allocation table of A-line trap opcodes.
pub struct TrapTable<E> {
    bindings: BTreeMap<u16, TrapBinding<E>>,
}

impl<E> fmt::Debug for TrapTable<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.bindings.iter().map(|(op, b)| (format!("{op:04x}"), b.mode)))
            .finish()
    }
}

impl<E> Default for TrapTable<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> TrapTable<E> {
    /// Creates a table with every opcode free.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bindings: BTreeMap::new(),
        }
    }

    /// Returns `true` for A-line opcodes.
    #[must_use]
    pub const fn is_trap_opcode(opcode: u16) -> bool {
        opcode >= TRAP_FIRST && opcode <= TRAP_LAST
    }

    /// Binds `callback` to the lowest free opcode and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::TrapsExhausted`] when no opcode is free.
    pub fn setup<F>(&mut self, mode: TrapMode, callback: F) -> Result<u16, RuntimeError>
    where
        F: Fn(&mut Runtime<E>, &EventRecord) -> Result<(), RuntimeError> + 'static,
    {
        let opcode = (TRAP_FIRST..=TRAP_LAST)
            .find(|op| !self.bindings.contains_key(op))
            .ok_or(RuntimeError::TrapsExhausted)?;
        self.insert(opcode, mode, Rc::new(callback));
        Ok(opcode)
    }

    /// Binds `callback` to `opcode`, replacing an existing binding.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownTrap`] for non A-line opcodes.
    pub fn setup_at<F>(
        &mut self,
        opcode: u16,
        mode: TrapMode,
        callback: F,
    ) -> Result<(), RuntimeError>
    where
        F: Fn(&mut Runtime<E>, &EventRecord) -> Result<(), RuntimeError> + 'static,
    {
        if !Self::is_trap_opcode(opcode) {
            return Err(RuntimeError::UnknownTrap(opcode));
        }
        self.insert(opcode, mode, Rc::new(callback));
        Ok(())
    }

    fn insert(&mut self, opcode: u16, mode: TrapMode, callback: TrapFn<E>) {
        self.bindings.insert(opcode, TrapBinding { mode, callback });
    }

    /// Releases `opcode`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownTrap`] when the opcode is not bound.
    pub fn free(&mut self, opcode: u16) -> Result<(), RuntimeError> {
        self.bindings
            .remove(&opcode)
            .map(|_| ())
            .ok_or(RuntimeError::UnknownTrap(opcode))
    }

    /// Returns `true` when `opcode` is bound.
    #[must_use]
    pub fn is_bound(&self, opcode: u16) -> bool {
        self.bindings.contains_key(&opcode)
    }

    /// Returns the mode and callback bound to `opcode`.
    #[must_use]
    pub fn get(&self, opcode: u16) -> Option<(TrapMode, TrapFn<E>)> {
        self.bindings
            .get(&opcode)
            .map(|b| (b.mode, Rc::clone(&b.callback)))
    }

    /// Returns the number of free opcodes.
    #[must_use]
    pub fn num_free(&self) -> usize {
        TRAP_COUNT - self.bindings.len()
    }

    /// Releases every opcode.
    pub fn clear(&mut self) {
        self.bindings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{TrapMode, TrapTable, TRAP_COUNT, TRAP_FIRST};
    use crate::{MiniEngine, RuntimeError};

    #[test]
    fn setup_hands_out_the_lowest_free_opcode() {
        let mut traps = TrapTable::<MiniEngine>::new();
        assert_eq!(traps.setup(TrapMode::Default, |_, _| Ok(())), Ok(TRAP_FIRST));
        assert_eq!(traps.setup(TrapMode::OneShot, |_, _| Ok(())), Ok(TRAP_FIRST + 1));
        traps.free(TRAP_FIRST).expect("bound");
        assert_eq!(traps.setup(TrapMode::AutoRts, |_, _| Ok(())), Ok(TRAP_FIRST));
        assert_eq!(traps.num_free(), TRAP_COUNT - 2);
        assert_eq!(traps.get(TRAP_FIRST).map(|(mode, _)| mode), Some(TrapMode::AutoRts));
    }

    #[test]
    fn fixed_opcodes_must_be_aline() {
        let mut traps = TrapTable::<MiniEngine>::new();
        assert_eq!(
            traps.setup_at(0x4E75, TrapMode::Default, |_, _| Ok(())),
            Err(RuntimeError::UnknownTrap(0x4E75))
        );
        traps
            .setup_at(0xAFFF, TrapMode::Default, |_, _| Ok(()))
            .expect("a-line");
        assert!(traps.is_bound(0xAFFF));
        assert_eq!(traps.free(0xA123), Err(RuntimeError::UnknownTrap(0xA123)));
    }

    #[test]
    fn table_runs_out_after_every_opcode_is_bound() {
        let mut traps = TrapTable::<MiniEngine>::new();
        for _ in 0..TRAP_COUNT {
            traps.setup(TrapMode::Default, |_, _| Ok(())).expect("free opcode");
        }
        assert_eq!(traps.num_free(), 0);
        assert_eq!(
            traps.setup(TrapMode::Default, |_, _| Ok(())),
            Err(RuntimeError::TrapsExhausted)
        );
        traps.clear();
        assert_eq!(traps.num_free(), TRAP_COUNT);
    }
}
