//! poolstake: bonding, delegation and continuous (F1) reward distribution.
//!
//! The engine is a set of keepers operating on an ordered key-value store through a
//! [`context::Context`]. Every externally triggered state change (a command or a block hook)
//! runs inside a cached view of the store and is committed only when it succeeds.

use thiserror::Error;

pub mod address;
pub mod bank;
pub mod coins;
pub mod config;
pub mod context;
pub mod dec;
pub mod handler;
pub mod invariants;
pub mod keeper;
pub mod keys;
pub mod msgs;
pub mod params;
pub mod store;
pub mod types;

pub use address::Address;
pub use bank::{StoreBank, TokenTransfer};
pub use coins::{Coin, Coins, DecCoins};
pub use config::PoolstakeConfig;
pub use context::{BlockHeader, Context};
pub use dec::Dec;
pub use handler::MsgResponse;
pub use invariants::{InvariantId, InvariantViolation};
pub use keeper::{GenesisState, Keeper};
pub use msgs::Msg;
pub use params::Params;
pub use store::{CacheStore, KvStore, MemStore};
pub use types::{
    CurrentRewards, Delegation, DelegatorStartingInfo, Description, FeePool, HistoricalRewards,
    PoolStatus, StakePool, UnbondingDelegation, UnbondingDelegationEntry,
};

/// Engine error.
///
/// Every variant except [`PoolstakeError::Invariant`] is a caller-facing validation error:
/// the operation that produced it left the store untouched. `Invariant` reports a broken
/// data-model invariant and must abort the enclosing block or transaction.
#[derive(Debug, Error)]
pub enum PoolstakeError {
    // Address validation
    #[error("empty operator address")]
    EmptyOperatorAddr,

    #[error("empty delegator address")]
    EmptyDelegatorAddr,

    #[error("operator address must equal the self-delegator address")]
    BadOperatorAddr,

    #[error("empty withdraw address")]
    EmptyWithdrawAddr,

    #[error("withdraw address {0} is blocked")]
    BlockedWithdrawAddr(Address),

    // Pool lookup / lifecycle
    #[error("stake pool {0} not found")]
    PoolNotFound(Address),

    #[error("stake pool {0} already exists")]
    PoolExists(Address),

    #[error("invalid description: {0}")]
    InvalidDescription(String),

    #[error("minimum self delegation must be a positive integer")]
    MinSelfDelegationInvalid,

    #[error("minimum self delegation cannot be decreased")]
    MinSelfDelegationDecreased,

    #[error("self delegation below minimum self delegation")]
    SelfDelegationBelowMinimum,

    // Amounts and shares
    #[error("invalid coin denomination: got {got}, expected {expected}")]
    BadDenom { got: String, expected: String },

    #[error("amount must be positive")]
    BadDelegationAmount,

    #[error("invalid shares amount")]
    BadSharesAmount,

    #[error("insufficient delegation shares")]
    InsufficientShares,

    #[error("not enough delegation shares: have {have}")]
    NotEnoughDelegationShares { have: Dec },

    #[error("cannot delegate to a pool with invalid (zero) exchange rate")]
    InvalidExchangeRate,

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    // Delegations
    #[error("no delegation for ({delegator}, {operator})")]
    NoDelegation { delegator: Address, operator: Address },

    #[error("no unbonding delegation found")]
    NoUnbondingDelegation,

    #[error("too many unbonding delegation entries for (delegator, pool) tuple")]
    MaxUnbondingEntries,

    // Distribution
    #[error("no delegation distribution info")]
    EmptyDelegationDistInfo,

    #[error("no distribution info for pool {0}")]
    NoPoolDistInfo(Address),

    #[error("no pool commission to withdraw")]
    NoPoolCommission,

    // Structural
    #[error("invalid genesis state: {0}")]
    InvalidGenesis(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("bounded value exceeded: {0}")]
    BoundedValueExceeded(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    // Fatal
    #[error("invariant violated: {0}")]
    Invariant(InvariantViolation),
}

impl PoolstakeError {
    /// True for errors that indicate corrupted state rather than a rejected request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PoolstakeError::Invariant(_))
    }
}

impl From<serde_json::Error> for PoolstakeError {
    fn from(e: serde_json::Error) -> Self {
        PoolstakeError::Codec(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PoolstakeError>;
