//! The staking keeper.
//!
//! One [`Keeper`] owns every bonding, delegation and reward operation. Its methods are
//! split across submodules by concern; all of them read and write through the
//! [`Context`] they are given and never cache state of their own.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::bank::{StoreBank, TokenTransfer};
use crate::context::Context;
use crate::invariants::{fatal, InvariantId};
use crate::keys;
use crate::params::Params;
use crate::Result;

pub mod abci;
pub mod delegation;
pub mod distribution;
pub mod fee_pool;
pub mod genesis;
pub mod invariants;
pub mod pool_set;
pub mod queries;
pub mod registry;

pub use abci::PoolUpdate;
pub use fee_pool::MintOutcome;
pub use genesis::{validate_genesis, GenesisState};

pub struct Keeper<B: TokenTransfer = StoreBank> {
    bank: B,
}

impl<B: TokenTransfer> Keeper<B> {
    pub fn new(bank: B) -> Self {
        Self { bank }
    }

    pub fn bank(&self) -> &B {
        &self.bank
    }

    /// Stored parameters. Missing parameters mean genesis never ran.
    pub fn params(&self, ctx: &Context<'_>) -> Result<Params> {
        get_json(ctx, keys::PARAMS_KEY)?
            .ok_or_else(|| fatal(InvariantId::MissingRecord, "params not initialized"))
    }

    pub fn set_params(&self, ctx: &mut Context<'_>, params: &Params) -> Result<()> {
        params.validate()?;
        set_json(ctx, keys::PARAMS_KEY.to_vec(), params)
    }

    pub fn bond_denom(&self, ctx: &Context<'_>) -> Result<String> {
        Ok(self.params(ctx)?.bond_denom)
    }
}

impl Default for Keeper<StoreBank> {
    fn default() -> Self {
        Keeper::new(StoreBank::new())
    }
}

pub(crate) fn get_json<T: DeserializeOwned>(ctx: &Context<'_>, key: &[u8]) -> Result<Option<T>> {
    match ctx.store().get(key) {
        Some(bz) => Ok(Some(serde_json::from_slice(&bz)?)),
        None => Ok(None),
    }
}

pub(crate) fn set_json<T: Serialize>(ctx: &mut Context<'_>, key: Vec<u8>, value: &T) -> Result<()> {
    let bz = serde_json::to_vec(value)?;
    ctx.store_mut().set(key, bz);
    Ok(())
}

/// Decodes every record under `prefix`, keeping the raw key alongside.
pub(crate) fn prefix_json<T: DeserializeOwned>(
    ctx: &Context<'_>,
    prefix: &[u8],
) -> Result<Vec<(Vec<u8>, T)>> {
    ctx.store()
        .prefix(prefix)
        .into_iter()
        .map(|(k, v)| Ok((k, serde_json::from_slice(&v)?)))
        .collect()
}
