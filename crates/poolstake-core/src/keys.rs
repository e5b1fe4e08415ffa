//! Store key layout.
//!
//! Fixed-width big-endian integers keep lexicographic key order equal to numeric order,
//! which the maturity queues rely on.

use crate::address::Address;
use crate::{PoolstakeError, Result};

pub const PARAMS_KEY: &[u8] = &[0x01];
pub const FEE_POOL_KEY: &[u8] = &[0x11];

pub const POOL_PREFIX: u8 = 0x21;

pub const DELEGATION_PREFIX: u8 = 0x31;
pub const UBD_PREFIX: u8 = 0x32;
pub const UBD_BY_POOL_PREFIX: u8 = 0x33;

pub const UBD_QUEUE_PREFIX: u8 = 0x41;
pub const POOL_QUEUE_PREFIX: u8 = 0x43;

pub const HISTORICAL_INFO_PREFIX: u8 = 0x50;

pub const OUTSTANDING_PREFIX: u8 = 0x61;
pub const WITHDRAW_ADDR_PREFIX: u8 = 0x62;
pub const STARTING_INFO_PREFIX: u8 = 0x63;
pub const HISTORICAL_REWARDS_PREFIX: u8 = 0x64;
pub const CURRENT_REWARDS_PREFIX: u8 = 0x65;
pub const COMMISSION_PREFIX: u8 = 0x66;

pub const BALANCE_PREFIX: u8 = 0x90;
pub const SUPPLY_PREFIX: u8 = 0x91;

fn key(prefix: u8, parts: &[&[u8]]) -> Vec<u8> {
    let len = 1 + parts.iter().map(|p| p.len()).sum::<usize>();
    let mut bz = Vec::with_capacity(len);
    bz.push(prefix);
    for p in parts {
        bz.extend_from_slice(p);
    }
    bz
}

/// Reads the address stored at `offset` in a key.
pub fn address_at(key: &[u8], offset: usize) -> Result<Address> {
    let end = offset + Address::LEN;
    let bz = key
        .get(offset..end)
        .ok_or_else(|| PoolstakeError::Codec(format!("key too short for address at {offset}")))?;
    Address::from_slice(bz)
}

fn u64_at(key: &[u8], offset: usize) -> Result<u64> {
    let bz: [u8; 8] = key
        .get(offset..offset + 8)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| PoolstakeError::Codec(format!("key too short for u64 at {offset}")))?;
    Ok(u64::from_be_bytes(bz))
}

pub fn pool_key(operator: &Address) -> Vec<u8> {
    key(POOL_PREFIX, &[operator.as_bytes()])
}

pub fn delegation_key(delegator: &Address, operator: &Address) -> Vec<u8> {
    key(DELEGATION_PREFIX, &[delegator.as_bytes(), operator.as_bytes()])
}

pub fn delegations_by_delegator_prefix(delegator: &Address) -> Vec<u8> {
    key(DELEGATION_PREFIX, &[delegator.as_bytes()])
}

pub fn ubd_key(delegator: &Address, operator: &Address) -> Vec<u8> {
    key(UBD_PREFIX, &[delegator.as_bytes(), operator.as_bytes()])
}

pub fn ubds_by_delegator_prefix(delegator: &Address) -> Vec<u8> {
    key(UBD_PREFIX, &[delegator.as_bytes()])
}

/// Index entry `(operator, delegator)` pointing at a `ubd_key`.
pub fn ubd_by_pool_key(operator: &Address, delegator: &Address) -> Vec<u8> {
    key(UBD_BY_POOL_PREFIX, &[operator.as_bytes(), delegator.as_bytes()])
}

pub fn ubds_by_pool_prefix(operator: &Address) -> Vec<u8> {
    key(UBD_BY_POOL_PREFIX, &[operator.as_bytes()])
}

pub fn ubd_queue_key(completion_time: u64) -> Vec<u8> {
    key(UBD_QUEUE_PREFIX, &[&completion_time.to_be_bytes()])
}

pub fn pool_queue_key(unbonding_time: u64, unbonding_height: u64) -> Vec<u8> {
    key(
        POOL_QUEUE_PREFIX,
        &[&unbonding_time.to_be_bytes(), &unbonding_height.to_be_bytes()],
    )
}

/// Inverse of [`pool_queue_key`].
pub fn parse_pool_queue_key(bz: &[u8]) -> Result<(u64, u64)> {
    if bz.first() != Some(&POOL_QUEUE_PREFIX) || bz.len() != 17 {
        return Err(PoolstakeError::Codec(format!(
            "invalid pool queue key: {}",
            hex::encode(bz)
        )));
    }
    Ok((u64_at(bz, 1)?, u64_at(bz, 9)?))
}

/// Exclusive upper bound covering every fixed-width key `<= key`.
pub fn inclusive_end(key: &[u8]) -> Vec<u8> {
    let mut end = key.to_vec();
    end.push(0x00);
    end
}

pub fn historical_info_key(height: u64) -> Vec<u8> {
    key(HISTORICAL_INFO_PREFIX, &[&height.to_be_bytes()])
}

pub fn outstanding_key(operator: &Address) -> Vec<u8> {
    key(OUTSTANDING_PREFIX, &[operator.as_bytes()])
}

pub fn withdraw_addr_key(delegator: &Address) -> Vec<u8> {
    key(WITHDRAW_ADDR_PREFIX, &[delegator.as_bytes()])
}

pub fn starting_info_key(operator: &Address, delegator: &Address) -> Vec<u8> {
    key(STARTING_INFO_PREFIX, &[operator.as_bytes(), delegator.as_bytes()])
}

pub fn historical_rewards_key(operator: &Address, period: u64) -> Vec<u8> {
    key(
        HISTORICAL_REWARDS_PREFIX,
        &[operator.as_bytes(), &period.to_be_bytes()],
    )
}

pub fn historical_rewards_prefix(operator: &Address) -> Vec<u8> {
    key(HISTORICAL_REWARDS_PREFIX, &[operator.as_bytes()])
}

/// Inverse of [`historical_rewards_key`].
pub fn parse_historical_rewards_key(bz: &[u8]) -> Result<(Address, u64)> {
    Ok((address_at(bz, 1)?, u64_at(bz, 1 + Address::LEN)?))
}

pub fn current_rewards_key(operator: &Address) -> Vec<u8> {
    key(CURRENT_REWARDS_PREFIX, &[operator.as_bytes()])
}

pub fn commission_key(operator: &Address) -> Vec<u8> {
    key(COMMISSION_PREFIX, &[operator.as_bytes()])
}

pub fn balance_key(account: &Address, denom: &str) -> Vec<u8> {
    key(BALANCE_PREFIX, &[account.as_bytes(), denom.as_bytes()])
}

pub fn balances_prefix(account: &Address) -> Vec<u8> {
    key(BALANCE_PREFIX, &[account.as_bytes()])
}

pub fn supply_key(denom: &str) -> Vec<u8> {
    key(SUPPLY_PREFIX, &[denom.as_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_queue_key_roundtrip_and_order() {
        let k = pool_queue_key(1_000, 7);
        assert_eq!(parse_pool_queue_key(&k).unwrap(), (1_000, 7));
        assert!(pool_queue_key(999, 100) < pool_queue_key(1_000, 1));
        assert!(pool_queue_key(1_000, 7) < inclusive_end(&pool_queue_key(1_000, 7)));
        assert!(inclusive_end(&pool_queue_key(1_000, 7)) < pool_queue_key(1_000, 8));
        assert!(parse_pool_queue_key(&[0x43, 1, 2]).is_err());
    }

    #[test]
    fn historical_rewards_key_roundtrip() {
        let op = Address::from_label("op");
        let k = historical_rewards_key(&op, 42);
        assert!(k.starts_with(&historical_rewards_prefix(&op)));
        assert_eq!(parse_historical_rewards_key(&k).unwrap(), (op, 42));
    }

    #[test]
    fn delegation_keys_group_by_delegator() {
        let del = Address::from_label("del");
        let k = delegation_key(&del, &Address::from_label("op"));
        assert!(k.starts_with(&delegations_by_delegator_prefix(&del)));
        assert_eq!(address_at(&k, 1 + Address::LEN).unwrap(), Address::from_label("op"));
    }
}
