//! Bonded-set selection and historical info.

use tracing::{debug, info};

use crate::bank::TokenTransfer;
use crate::context::Context;
use crate::keys;
use crate::types::{HistoricalInfo, PoolStatus};
use crate::Result;

use super::{get_json, set_json, Keeper, PoolUpdate};

impl<B: TokenTransfer> Keeper<B> {
    /// Re-selects the bonded set: the `max_pools` non-unbonding pools with the most tokens,
    /// ties broken by operator address.
    ///
    /// Newly selected pools are bonded and report their tokens as power; bonded pools that
    /// fall out begin unbonding and report power zero.
    pub fn apply_pool_set_updates(&self, ctx: &mut Context<'_>) -> Result<Vec<PoolUpdate>> {
        let max_pools = self.params(ctx)?.max_pools as usize;
        let pools = self.all_pools(ctx)?;

        let mut candidates: Vec<_> = pools
            .iter()
            .filter(|p| p.status != PoolStatus::Unbonding && p.tokens > 0)
            .collect();
        candidates.sort_by(|a, b| b.tokens.cmp(&a.tokens).then(a.operator.cmp(&b.operator)));
        candidates.truncate(max_pools);

        let mut updates = Vec::new();
        for pool in pools.iter().filter(|p| p.is_bonded()) {
            if !candidates.iter().any(|c| c.operator == pool.operator) {
                self.begin_unbonding(ctx, pool.clone())?;
                updates.push(PoolUpdate {
                    operator: pool.operator,
                    power: 0,
                });
            }
        }
        for pool in candidates.into_iter().filter(|p| p.is_unbonded()) {
            let bonded = self.bond(ctx, pool.clone())?;
            updates.push(PoolUpdate {
                operator: bonded.operator,
                power: bonded.tokens,
            });
        }

        if !updates.is_empty() {
            info!(changes = updates.len(), "bonded set updated");
        }
        Ok(updates)
    }

    /// Records the current header and bonded set, pruning entries beyond
    /// `historical_entries`.
    pub fn track_historical_info(&self, ctx: &mut Context<'_>) -> Result<()> {
        let entries = u64::from(self.params(ctx)?.historical_entries);
        let height = ctx.height();

        if height >= entries {
            let cutoff = keys::historical_info_key(height - entries);
            let stale = ctx
                .store()
                .range(&[keys::HISTORICAL_INFO_PREFIX], Some(&keys::inclusive_end(&cutoff)));
            for (key, _) in stale {
                ctx.store_mut().delete(&key);
            }
        }
        if entries == 0 {
            return Ok(());
        }

        let pools = self
            .all_pools(ctx)?
            .into_iter()
            .filter(|p| p.is_bonded())
            .collect();
        let info = HistoricalInfo {
            height,
            time: ctx.time(),
            pools,
        };
        set_json(ctx, keys::historical_info_key(height), &info)?;
        debug!(height, "historical info recorded");
        Ok(())
    }

    pub fn historical_info(&self, ctx: &Context<'_>, height: u64) -> Result<Option<HistoricalInfo>> {
        get_json(ctx, &keys::historical_info_key(height))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::bank::{BONDED_POOL, NOT_BONDED_POOL};
    use crate::context::BlockHeader;
    use crate::dec::Dec;
    use crate::store::MemStore;

    #[test]
    fn selects_top_pools_by_tokens() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::new(1, 1_000));
        let k = setup(&mut ctx);
        let (a, b, c) = (addr("a"), addr("b"), addr("c"));
        create_pool(&k, &mut ctx, &a, 100);
        create_pool(&k, &mut ctx, &b, 300);
        create_pool(&k, &mut ctx, &c, 200);

        let mut updates = k.apply_pool_set_updates(&mut ctx).unwrap();
        updates.sort_by_key(|u| u.power);
        assert_eq!(
            updates,
            vec![
                PoolUpdate { operator: c, power: 200 },
                PoolUpdate { operator: b, power: 300 },
            ]
        );
        assert!(k.get_pool(&ctx, &a).unwrap().unwrap().is_unbonded());
        assert_eq!(k.bank().module_balance(&ctx, BONDED_POOL, "stake").unwrap(), 500);
        assert_eq!(k.bank().module_balance(&ctx, NOT_BONDED_POOL, "stake").unwrap(), 100);

        assert!(k.apply_pool_set_updates(&mut ctx).unwrap().is_empty());
    }

    #[test]
    fn displaced_pool_begins_unbonding() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::new(1, 1_000));
        let k = setup(&mut ctx);
        let (a, b, c) = (addr("a"), addr("b"), addr("c"));
        create_pool(&k, &mut ctx, &a, 100);
        create_pool(&k, &mut ctx, &b, 300);
        k.apply_pool_set_updates(&mut ctx).unwrap();

        create_pool(&k, &mut ctx, &c, 200);
        let updates = k.apply_pool_set_updates(&mut ctx).unwrap();
        assert!(updates.contains(&PoolUpdate { operator: a, power: 0 }));
        assert!(updates.contains(&PoolUpdate { operator: c, power: 200 }));
        assert!(k.get_pool(&ctx, &a).unwrap().unwrap().is_unbonding());
    }

    #[test]
    fn self_unbonded_pool_is_not_reselected() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::new(1, 1_000));
        let k = setup(&mut ctx);
        let (a, b) = (addr("a"), addr("b"));
        create_pool(&k, &mut ctx, &a, 100);
        fund(&k, &mut ctx, &b, 10);
        k.apply_pool_set_updates(&mut ctx).unwrap();

        // Another delegator keeps the pool alive after the operator's stake is gone.
        k.delegate(&mut ctx, &b, &a, 10, PoolStatus::Unbonded, true)
            .unwrap();
        k.undelegate(&mut ctx, &a, &a, Dec::from_int(100).unwrap())
            .unwrap();
        assert!(k.get_pool(&ctx, &a).unwrap().unwrap().is_unbonding());
        assert!(k.apply_pool_set_updates(&mut ctx).unwrap().is_empty());
    }

    #[test]
    fn historical_info_is_pruned() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::new(1, 1_000));
        let k = setup(&mut ctx);
        let mut params = k.params(&ctx).unwrap();
        params.historical_entries = 2;
        k.set_params(&mut ctx, &params).unwrap();
        let a = addr("a");
        create_pool(&k, &mut ctx, &a, 100);
        k.apply_pool_set_updates(&mut ctx).unwrap();

        for _ in 0..4 {
            k.track_historical_info(&mut ctx).unwrap();
            advance(&mut ctx, 1, 5);
        }
        assert!(k.historical_info(&ctx, 2).unwrap().is_none());
        let latest = k.historical_info(&ctx, 4).unwrap().unwrap();
        assert_eq!(latest.pools.len(), 1);
        assert!(k.historical_info(&ctx, 3).unwrap().is_some());
    }
}
