use crate::registry::PoolId;
use anyhow::{bail, Result};
use pol_ledger::{AccountAddress, AssetId, TokenAmount};
use std::collections::HashMap;

/// Constant-product pair state: reserves plus LP share bookkeeping.
///
/// `asset_a < asset_b` always holds (canonical pair order).
#[derive(Debug, Clone)]
pub struct Pool {
    pub id: PoolId,
    pub asset_a: AssetId,
    pub asset_b: AssetId,
    pub reserve_a: TokenAmount,
    pub reserve_b: TokenAmount,
    pub total_shares: TokenAmount,
    pub shares: HashMap<AccountAddress, TokenAmount>,
}

impl Pool {
    pub fn new(id: PoolId, asset_a: AssetId, asset_b: AssetId) -> Self {
        Self {
            id,
            asset_a,
            asset_b,
            reserve_a: TokenAmount::ZERO,
            reserve_b: TokenAmount::ZERO,
            total_shares: TokenAmount::ZERO,
            shares: HashMap::new(),
        }
    }

    pub fn contains(&self, asset: AssetId) -> bool {
        asset == self.asset_a || asset == self.asset_b
    }

    pub fn shares_of(&self, owner: AccountAddress) -> TokenAmount {
        self.shares.get(&owner).copied().unwrap_or(TokenAmount::ZERO)
    }

    /// Mint LP shares for a deposit of (amount_a, amount_b) in pair order.
    /// First deposit mints sqrt(a*b); later deposits mint pro-rata against
    /// the smaller side so a lopsided deposit cannot inflate shares.
    pub fn mint_shares(
        &mut self,
        provider: AccountAddress,
        amount_a: TokenAmount,
        amount_b: TokenAmount,
    ) -> Result<TokenAmount> {
        if amount_a.is_zero() || amount_b.is_zero() {
            bail!("Liquidity deposit requires both assets");
        }

        let a = amount_a.to_base_units() as u128;
        let b = amount_b.to_base_units() as u128;

        let minted = if self.total_shares.is_zero() {
            isqrt(a * b)
        } else {
            let total = self.total_shares.to_base_units() as u128;
            let by_a = a * total / self.reserve_a.to_base_units() as u128;
            let by_b = b * total / self.reserve_b.to_base_units() as u128;
            by_a.min(by_b)
        };

        if minted == 0 {
            bail!("Deposit too small to mint shares");
        }
        let minted = TokenAmount::from_base_units(u64::try_from(minted)?);

        // Compute every new value before mutating so a failure leaves the
        // pool untouched
        let new_reserve_a = self
            .reserve_a
            .checked_add(amount_a)
            .ok_or_else(|| anyhow::anyhow!("Reserve overflow"))?;
        let new_reserve_b = self
            .reserve_b
            .checked_add(amount_b)
            .ok_or_else(|| anyhow::anyhow!("Reserve overflow"))?;
        let new_total = self
            .total_shares
            .checked_add(minted)
            .ok_or_else(|| anyhow::anyhow!("Share supply overflow"))?;
        let new_owned = self
            .shares_of(provider)
            .checked_add(minted)
            .ok_or_else(|| anyhow::anyhow!("Share balance overflow"))?;

        self.reserve_a = new_reserve_a;
        self.reserve_b = new_reserve_b;
        self.total_shares = new_total;
        self.shares.insert(provider, new_owned);

        Ok(minted)
    }

    /// Burn all of `owner`'s shares, returning the pro-rata underlying
    /// amounts in pair order. Zero shares yields zero amounts.
    pub fn burn_all_shares(&mut self, owner: AccountAddress) -> (TokenAmount, TokenAmount) {
        let owned = self.shares_of(owner);
        if owned.is_zero() {
            return (TokenAmount::ZERO, TokenAmount::ZERO);
        }

        let shares = owned.to_base_units() as u128;
        let total = self.total_shares.to_base_units() as u128;
        let out_a = self.reserve_a.to_base_units() as u128 * shares / total;
        let out_b = self.reserve_b.to_base_units() as u128 * shares / total;

        let out_a = TokenAmount::from_base_units(out_a as u64);
        let out_b = TokenAmount::from_base_units(out_b as u64);

        self.shares.remove(&owner);
        self.total_shares = self.total_shares.saturating_sub(owned);
        self.reserve_a = self.reserve_a.saturating_sub(out_a);
        self.reserve_b = self.reserve_b.saturating_sub(out_b);

        (out_a, out_b)
    }

    /// Constant-product swap with a 0.3% fee (997/1000).
    pub fn swap(&mut self, asset_in: AssetId, amount_in: TokenAmount) -> Result<TokenAmount> {
        if !self.contains(asset_in) {
            bail!("Asset {} not in pool {}", asset_in, self.id);
        }
        if amount_in.is_zero() {
            bail!("Swap input must be non-zero");
        }
        if self.reserve_a.is_zero() || self.reserve_b.is_zero() {
            bail!("Pool {} has no liquidity", self.id);
        }

        let a_is_input = asset_in == self.asset_a;
        let (reserve_in, reserve_out) = if a_is_input {
            (self.reserve_a, self.reserve_b)
        } else {
            (self.reserve_b, self.reserve_a)
        };

        let amount_in_u = amount_in.to_base_units() as u128;
        let in_with_fee = amount_in_u * 997;
        let numerator = in_with_fee * reserve_out.to_base_units() as u128;
        let denominator = reserve_in.to_base_units() as u128 * 1000 + in_with_fee;
        let amount_out = TokenAmount::from_base_units((numerator / denominator) as u64);

        let new_in = reserve_in
            .checked_add(amount_in)
            .ok_or_else(|| anyhow::anyhow!("Reserve overflow"))?;
        let new_out = reserve_out.saturating_sub(amount_out);

        if a_is_input {
            self.reserve_a = new_in;
            self.reserve_b = new_out;
        } else {
            self.reserve_b = new_in;
            self.reserve_a = new_out;
        }

        Ok(amount_out)
    }
}

/// Integer square root (babylonian), used for first-deposit share minting.
fn isqrt(value: u128) -> u128 {
    if value < 2 {
        return value;
    }
    let mut x = value;
    let mut y = (x + 1) / 2;
    while y < x {
        x = y;
        y = (x + value / x) / 2;
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{sort_pair, PoolId};

    fn asset(n: u8) -> AssetId {
        AssetId::from_bytes([n; 32])
    }

    fn account(n: u8) -> AccountAddress {
        AccountAddress::from_bytes([n; 32])
    }

    fn pool() -> Pool {
        let (a, b) = sort_pair(asset(1), asset(2));
        Pool::new(PoolId::for_pair(a, b), a, b)
    }

    fn amt(n: u64) -> TokenAmount {
        TokenAmount::from_base_units(n)
    }

    #[test]
    fn test_isqrt() {
        assert_eq!(isqrt(0), 0);
        assert_eq!(isqrt(1), 1);
        assert_eq!(isqrt(99), 9);
        assert_eq!(isqrt(100), 10);
        assert_eq!(isqrt(1_000_000 * 1_000_000), 1_000_000);
    }

    #[test]
    fn test_first_mint_is_geometric_mean() {
        let mut pool = pool();
        let minted = pool.mint_shares(account(1), amt(400), amt(100)).unwrap();
        assert_eq!(minted, amt(200)); // sqrt(400 * 100)
        assert_eq!(pool.total_shares, amt(200));
        assert_eq!(pool.shares_of(account(1)), amt(200));
    }

    #[test]
    fn test_later_mint_is_pro_rata() {
        let mut pool = pool();
        pool.mint_shares(account(1), amt(400), amt(100)).unwrap();

        // Doubling both reserves doubles the share supply
        let minted = pool.mint_shares(account(2), amt(400), amt(100)).unwrap();
        assert_eq!(minted, amt(200));

        // A lopsided deposit mints against the smaller side
        let minted = pool.mint_shares(account(3), amt(800), amt(100)).unwrap();
        assert_eq!(minted, amt(200));
    }

    #[test]
    fn test_swap_constant_product() {
        let mut pool = pool();
        pool.mint_shares(account(1), amt(1_000_000), amt(1_000_000))
            .unwrap();

        let out = pool.swap(asset(1), amt(1_000)).unwrap();
        // 1000 * 997 * 1_000_000 / (1_000_000 * 1000 + 1000 * 997) = 996
        assert_eq!(out, amt(996));
        assert_eq!(pool.reserve_a, amt(1_001_000));
        assert_eq!(pool.reserve_b, amt(999_004));

        assert!(pool.swap(asset(3), amt(10)).is_err());
        assert!(pool.swap(asset(1), TokenAmount::ZERO).is_err());
    }

    #[test]
    fn test_burn_all_shares() {
        let mut pool = pool();
        pool.mint_shares(account(1), amt(400), amt(100)).unwrap();
        pool.mint_shares(account(2), amt(400), amt(100)).unwrap();

        let (out_a, out_b) = pool.burn_all_shares(account(1));
        assert_eq!(out_a, amt(400));
        assert_eq!(out_b, amt(100));
        assert_eq!(pool.shares_of(account(1)), TokenAmount::ZERO);
        assert_eq!(pool.total_shares, amt(200));

        // No shares burns nothing
        let (out_a, out_b) = pool.burn_all_shares(account(9));
        assert_eq!(out_a, TokenAmount::ZERO);
        assert_eq!(out_b, TokenAmount::ZERO);
    }
}
