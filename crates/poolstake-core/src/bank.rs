//! Token transfer service.
//!
//! [`StoreBank`] keeps balances in the same store as the ledger records, so every transfer
//! commits or rolls back together with the operation that issued it.

use tracing::debug;

use crate::address::Address;
use crate::coins::Coins;
use crate::context::Context;
use crate::keys;
use crate::{PoolstakeError, Result};

/// Holds the tokens of `Bonded` pools.
pub const BONDED_POOL: &str = "bonded_pool";
/// Holds the tokens of non-bonded pools and of pending unbonding entries.
pub const NOT_BONDED_POOL: &str = "not_bonded_pool";
/// Holds outstanding rewards and the community pool.
pub const DISTRIBUTION: &str = "distribution";

pub const MODULE_ACCOUNTS: [&str; 3] = [BONDED_POOL, NOT_BONDED_POOL, DISTRIBUTION];

pub fn module_address(name: &str) -> Address {
    Address::from_label(&format!("module/{name}"))
}

/// Moves fungible balances between accounts and named module accounts.
///
/// Postconditions (all transfer methods):
/// - on `Err`, no balance has changed.
pub trait TokenTransfer {
    fn balance(&self, ctx: &Context<'_>, account: &Address, denom: &str) -> Result<u128>;

    fn balances(&self, ctx: &Context<'_>, account: &Address) -> Result<Coins>;

    /// Every account holding a non-zero balance, in address order.
    fn accounts(&self, ctx: &Context<'_>) -> Result<Vec<(Address, Coins)>>;

    /// Overwrites an account's balances, adjusting supply by the difference (genesis import).
    fn set_balances(&self, ctx: &mut Context<'_>, account: &Address, amount: &Coins)
        -> Result<()>;

    fn send_account_to_module(
        &self,
        ctx: &mut Context<'_>,
        from: &Address,
        module: &str,
        amount: &Coins,
    ) -> Result<()>;

    fn send_module_to_account(
        &self,
        ctx: &mut Context<'_>,
        module: &str,
        to: &Address,
        amount: &Coins,
    ) -> Result<()>;

    fn send_module_to_module(
        &self,
        ctx: &mut Context<'_>,
        from: &str,
        to: &str,
        amount: &Coins,
    ) -> Result<()>;

    fn mint(&self, ctx: &mut Context<'_>, module: &str, amount: &Coins) -> Result<()>;

    fn burn(&self, ctx: &mut Context<'_>, module: &str, amount: &Coins) -> Result<()>;

    /// Accounts that may not receive user withdrawals.
    fn is_blocked(&self, account: &Address) -> bool;
}

/// Store-backed bank.
#[derive(Clone, Copy, Debug, Default)]
pub struct StoreBank;

fn decode_amount(bz: &[u8]) -> Result<u128> {
    let raw: [u8; 16] = bz
        .try_into()
        .map_err(|_| PoolstakeError::Codec("balance must be 16 bytes".into()))?;
    Ok(u128::from_be_bytes(raw))
}

impl StoreBank {
    pub fn new() -> Self {
        StoreBank
    }

    fn read(ctx: &Context<'_>, key: &[u8]) -> Result<u128> {
        match ctx.store().get(key) {
            Some(bz) => decode_amount(&bz),
            None => Ok(0),
        }
    }

    fn write(ctx: &mut Context<'_>, key: Vec<u8>, amount: u128) {
        if amount == 0 {
            ctx.store_mut().delete(&key);
        } else {
            ctx.store_mut().set(key, amount.to_be_bytes().to_vec());
        }
    }

    fn move_coins(
        ctx: &mut Context<'_>,
        from: &Address,
        to: &Address,
        amount: &Coins,
    ) -> Result<()> {
        let mut updates = Vec::new();
        for (denom, amt) in amount.iter() {
            let from_bal = Self::read(ctx, &keys::balance_key(from, denom))?;
            let rest = from_bal.checked_sub(amt).ok_or_else(|| {
                PoolstakeError::InsufficientFunds(format!(
                    "{from} has {from_bal}{denom}, needs {amt}{denom}"
                ))
            })?;
            updates.push((denom.to_string(), rest, amt));
        }
        // Commit.
        for (denom, rest, amt) in updates {
            Self::write(ctx, keys::balance_key(from, &denom), rest);
            let to_key = keys::balance_key(to, &denom);
            let to_bal = Self::read(ctx, &to_key)?;
            let sum = to_bal.checked_add(amt).ok_or_else(|| {
                PoolstakeError::BoundedValueExceeded(format!("balance overflow for {to}"))
            })?;
            Self::write(ctx, to_key, sum);
        }
        Ok(())
    }

    fn adjust_supply(ctx: &mut Context<'_>, amount: &Coins, increase: bool) -> Result<()> {
        for (denom, amt) in amount.iter() {
            let key = keys::supply_key(denom);
            let cur = Self::read(ctx, &key)?;
            let next = if increase {
                cur.checked_add(amt).ok_or_else(|| {
                    PoolstakeError::BoundedValueExceeded(format!("supply overflow for {denom}"))
                })?
            } else {
                cur.checked_sub(amt).ok_or_else(|| {
                    PoolstakeError::InsufficientFunds(format!("supply underflow for {denom}"))
                })?
            };
            Self::write(ctx, key, next);
        }
        Ok(())
    }

    fn credit(ctx: &mut Context<'_>, account: &Address, amount: &Coins) -> Result<()> {
        for (denom, amt) in amount.iter() {
            let key = keys::balance_key(account, denom);
            let cur = Self::read(ctx, &key)?;
            let next = cur.checked_add(amt).ok_or_else(|| {
                PoolstakeError::BoundedValueExceeded(format!("balance overflow for {account}"))
            })?;
            Self::write(ctx, key, next);
        }
        Ok(())
    }

    /// Mints directly into a user account (faucet / test funding).
    pub fn fund_account(
        &self,
        ctx: &mut Context<'_>,
        account: &Address,
        amount: &Coins,
    ) -> Result<()> {
        Self::adjust_supply(ctx, amount, true)?;
        Self::credit(ctx, account, amount)
    }

    pub fn supply(&self, ctx: &Context<'_>, denom: &str) -> Result<u128> {
        Self::read(ctx, &keys::supply_key(denom))
    }

    pub fn module_balance(&self, ctx: &Context<'_>, module: &str, denom: &str) -> Result<u128> {
        self.balance(ctx, &module_address(module), denom)
    }
}

impl TokenTransfer for StoreBank {
    fn balance(&self, ctx: &Context<'_>, account: &Address, denom: &str) -> Result<u128> {
        Self::read(ctx, &keys::balance_key(account, denom))
    }

    fn balances(&self, ctx: &Context<'_>, account: &Address) -> Result<Coins> {
        let prefix = keys::balances_prefix(account);
        let mut out = Coins::new();
        for (key, value) in ctx.store().prefix(&prefix) {
            let denom = String::from_utf8(key[prefix.len()..].to_vec())
                .map_err(|e| PoolstakeError::Codec(e.to_string()))?;
            out = out.add(&Coins::single(denom, decode_amount(&value)?))?;
        }
        Ok(out)
    }

    fn accounts(&self, ctx: &Context<'_>) -> Result<Vec<(Address, Coins)>> {
        let mut out: Vec<(Address, Coins)> = Vec::new();
        for (key, value) in ctx.store().prefix(&[keys::BALANCE_PREFIX]) {
            let account = keys::address_at(&key, 1)?;
            let denom = String::from_utf8(key[1 + Address::LEN..].to_vec())
                .map_err(|e| PoolstakeError::Codec(e.to_string()))?;
            let coins = Coins::single(denom, decode_amount(&value)?);
            match out.last_mut() {
                Some((last, acc)) if *last == account => *acc = acc.add(&coins)?,
                _ => out.push((account, coins)),
            }
        }
        Ok(out)
    }

    fn set_balances(
        &self,
        ctx: &mut Context<'_>,
        account: &Address,
        amount: &Coins,
    ) -> Result<()> {
        let old = self.balances(ctx, account)?;
        Self::adjust_supply(ctx, &old, false)?;
        for (key, _) in ctx.store().prefix(&keys::balances_prefix(account)) {
            ctx.store_mut().delete(&key);
        }
        Self::adjust_supply(ctx, amount, true)?;
        Self::credit(ctx, account, amount)
    }

    fn send_account_to_module(
        &self,
        ctx: &mut Context<'_>,
        from: &Address,
        module: &str,
        amount: &Coins,
    ) -> Result<()> {
        debug!(%from, module, %amount, "account -> module");
        Self::move_coins(ctx, from, &module_address(module), amount)
    }

    fn send_module_to_account(
        &self,
        ctx: &mut Context<'_>,
        module: &str,
        to: &Address,
        amount: &Coins,
    ) -> Result<()> {
        debug!(module, %to, %amount, "module -> account");
        Self::move_coins(ctx, &module_address(module), to, amount)
    }

    fn send_module_to_module(
        &self,
        ctx: &mut Context<'_>,
        from: &str,
        to: &str,
        amount: &Coins,
    ) -> Result<()> {
        debug!(from, to, %amount, "module -> module");
        Self::move_coins(ctx, &module_address(from), &module_address(to), amount)
    }

    fn mint(&self, ctx: &mut Context<'_>, module: &str, amount: &Coins) -> Result<()> {
        Self::adjust_supply(ctx, amount, true)?;
        Self::credit(ctx, &module_address(module), amount)
    }

    fn burn(&self, ctx: &mut Context<'_>, module: &str, amount: &Coins) -> Result<()> {
        let addr = module_address(module);
        Self::move_coins(ctx, &addr, &Address::EMPTY, amount)?;
        for (denom, _) in amount.iter() {
            Self::write(ctx, keys::balance_key(&Address::EMPTY, denom), 0);
        }
        Self::adjust_supply(ctx, amount, false)
    }

    fn is_blocked(&self, account: &Address) -> bool {
        MODULE_ACCOUNTS.iter().any(|m| module_address(m) == *account)
    }
}
