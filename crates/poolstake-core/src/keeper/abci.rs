//! Block hooks.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::address::Address;
use crate::bank::TokenTransfer;
use crate::context::Context;
use crate::Result;

use super::Keeper;

/// A change in a pool's bonded power. Power zero means the pool left the bonded set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolUpdate {
    pub operator: Address,
    pub power: u128,
}

impl<B: TokenTransfer> Keeper<B> {
    pub fn begin_block(&self, ctx: &mut Context<'_>) -> Result<()> {
        ctx.cached(|c| self.track_historical_info(c))
    }

    /// Updates the bonded set, then matures unbonding pools and unbonding delegations.
    ///
    /// The whole sweep is one atomic batch. A single unbonding delegation that fails with a
    /// caller-facing error is skipped; any fatal error aborts the block.
    pub fn end_block(&self, ctx: &mut Context<'_>) -> Result<Vec<PoolUpdate>> {
        ctx.cached(|c| {
            let updates = self.apply_pool_set_updates(c)?;
            self.unbond_all_mature_pools(c)?;

            let now = c.time();
            for pair in self.dequeue_all_mature_ubd_queue(c, now)? {
                let res = c.cached(|inner| {
                    self.complete_unbonding(inner, &pair.delegator, &pair.operator)
                });
                match res {
                    Ok(paid) if !paid.is_zero() => info!(
                        delegator = %pair.delegator,
                        operator = %pair.operator,
                        %paid,
                        "unbonding completed"
                    ),
                    Ok(_) => {}
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => debug!(
                        delegator = %pair.delegator,
                        operator = %pair.operator,
                        error = %e,
                        "skipping unbonding completion"
                    ),
                }
            }
            Ok(updates)
        })
    }
}
