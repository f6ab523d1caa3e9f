/// Instruction forms of the reference engine with fixed cycle costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleCostKind {
    /// `RESET`.
    Reset,
    /// `NOP`.
    Nop,
    /// `RTS`.
    Rts,
    /// `MOVE.L #imm,D0`.
    MoveImmediate,
    /// `MOVE.L abs.l,D0`.
    MoveLoad,
    /// `MOVE.L D0,abs.l`.
    MoveStore,
    /// A-line trap issue.
    AlineTrap,
}

/// Cycle cost of every instruction form the reference engine executes.
pub const CYCLE_COST_TABLE: &[(CycleCostKind, u16)] = &[
    (CycleCostKind::Reset, 132),
    (CycleCostKind::Nop, 4),
    (CycleCostKind::Rts, 16),
    (CycleCostKind::MoveImmediate, 12),
    (CycleCostKind::MoveLoad, 20),
    (CycleCostKind::MoveStore, 20),
    (CycleCostKind::AlineTrap, 4),
];

/// Looks up the cycle cost for a cycle-cost kind.
#[must_use]
pub fn cycle_cost(kind: CycleCostKind) -> Option<u16> {
    CYCLE_COST_TABLE
        .iter()
        .find_map(|(entry_kind, cycles)| (*entry_kind == kind).then_some(*cycles))
}
