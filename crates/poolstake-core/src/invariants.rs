use crate::PoolstakeError;

/// Stable identifiers for the data-model invariants guarded by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InvariantId {
    /// A pool was removed while holding tokens or while not `Unbonded`.
    PoolRemoval,

    /// A bonding state transition was attempted from the wrong state.
    StateTransition,

    /// An operator maturity-queue entry referenced a missing or non-unbonding pool.
    PoolQueue,

    /// A historical reward reference count went below zero or above two.
    ReferenceCount,

    /// A cumulative reward ratio decreased between two periods.
    NegativeRewards,

    /// A delegation's recorded stake exceeded its current stake beyond tolerance.
    StakeDrift,

    /// Token, share or reward accounting underflowed.
    Accounting,

    /// A record the data model guarantees to exist was missing.
    MissingRecord,

    /// Module account balances disagree with the pool and reward records.
    ModuleAccounts,

    /// A delegation record holds zero shares.
    PositiveDelegation,

    /// A pool's delegator shares disagree with the sum of its delegations.
    DelegatorShares,

    /// Outstanding rewards went negative.
    NonNegativeOutstanding,

    /// Force-withdrawing every reward and commission failed.
    CanWithdraw,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvariantViolation {
    pub id: InvariantId,
    pub details: String,
}

impl InvariantViolation {
    pub fn new(id: InvariantId, details: impl Into<String>) -> Self {
        Self {
            id,
            details: details.into(),
        }
    }
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.id, self.details)
    }
}

impl std::error::Error for InvariantViolation {}

impl From<InvariantViolation> for PoolstakeError {
    fn from(v: InvariantViolation) -> Self {
        PoolstakeError::Invariant(v)
    }
}

/// Shorthand for building the fatal error variant.
pub(crate) fn fatal(id: InvariantId, details: impl Into<String>) -> PoolstakeError {
    PoolstakeError::Invariant(InvariantViolation::new(id, details))
}
