use crate::pool::Pool;
use crate::registry::{sort_pair, PoolId, PoolRegistry};
use anyhow::{bail, Result};
use pol_ledger::{AccountAddress, AssetId, BalanceManager, TokenAmount};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

type PoolMap = HashMap<PoolId, Pool>;

/// Executes liquidity operations against the registered pools, settling
/// every leg on the ledger.
///
/// Pool state supports the same snapshot transaction bracket as the ledger
/// storage, so callers composing several operations can make them
/// all-or-nothing across both.
pub struct LiquidityRouter {
    registry: Arc<PoolRegistry>,
    ledger: Arc<BalanceManager>,
    pools: Arc<RwLock<PoolMap>>,
    transaction_backup: Arc<RwLock<Option<PoolMap>>>,
}

impl LiquidityRouter {
    pub fn new(registry: Arc<PoolRegistry>, ledger: Arc<BalanceManager>) -> Self {
        Self {
            registry,
            ledger,
            pools: Arc::new(RwLock::new(HashMap::new())),
            transaction_backup: Arc::new(RwLock::new(None)),
        }
    }

    /// Register a new empty pool for the unordered pair.
    pub async fn create_pool(&self, asset_x: AssetId, asset_y: AssetId) -> Result<PoolId> {
        let pool_id = self.registry.register(asset_x, asset_y).await?;

        let (a, b) = sort_pair(asset_x, asset_y);
        let mut pools = self.pools.write().await;
        pools.insert(pool_id, Pool::new(pool_id, a, b));

        Ok(pool_id)
    }

    /// Deposit both assets from `provider`'s ledger balances, minting LP
    /// shares. Amounts are matched to the pool's sides by asset id.
    pub async fn add_liquidity(
        &self,
        pool_id: PoolId,
        provider: AccountAddress,
        asset_x: AssetId,
        amount_x: TokenAmount,
        asset_y: AssetId,
        amount_y: TokenAmount,
    ) -> Result<TokenAmount> {
        let mut pools = self.pools.write().await;
        let pool = pools
            .get_mut(&pool_id)
            .ok_or_else(|| anyhow::anyhow!("Unknown pool {}", pool_id))?;

        let (amount_a, amount_b) = if asset_x == pool.asset_a && asset_y == pool.asset_b {
            (amount_x, amount_y)
        } else if asset_x == pool.asset_b && asset_y == pool.asset_a {
            (amount_y, amount_x)
        } else {
            bail!("Assets ({}, {}) do not match pool {}", asset_x, asset_y, pool_id);
        };

        self.ledger.debit(pool.asset_a, provider, amount_a).await?;
        self.ledger.debit(pool.asset_b, provider, amount_b).await?;

        let minted = match pool.mint_shares(provider, amount_a, amount_b) {
            Ok(minted) => minted,
            Err(e) => {
                // Return the deposit if the mint is refused
                self.ledger.credit(pool.asset_a, provider, amount_a).await?;
                self.ledger.credit(pool.asset_b, provider, amount_b).await?;
                return Err(e);
            }
        };

        info!(
            pool = %pool_id,
            provider = %provider,
            amount_a = %amount_a,
            amount_b = %amount_b,
            shares_minted = %minted,
            "💧 Liquidity added"
        );

        Ok(minted)
    }

    /// Burn all of `owner`'s LP shares in the pool, crediting the underlying
    /// assets to `owner`'s ledger balances. Returns the asset-tagged amounts.
    pub async fn withdraw_all(
        &self,
        pool_id: PoolId,
        owner: AccountAddress,
    ) -> Result<((AssetId, TokenAmount), (AssetId, TokenAmount))> {
        let mut pools = self.pools.write().await;
        let pool = pools
            .get_mut(&pool_id)
            .ok_or_else(|| anyhow::anyhow!("Unknown pool {}", pool_id))?;

        let (out_a, out_b) = pool.burn_all_shares(owner);
        let (asset_a, asset_b) = (pool.asset_a, pool.asset_b);

        self.ledger.credit(asset_a, owner, out_a).await?;
        self.ledger.credit(asset_b, owner, out_b).await?;

        info!(
            pool = %pool_id,
            owner = %owner,
            amount_a = %out_a,
            amount_b = %out_b,
            "🫗 Position withdrawn"
        );

        Ok(((asset_a, out_a), (asset_b, out_b)))
    }

    /// Swap `amount_in` of `asset_in` for `asset_out` at the pair's
    /// constant-product price, settling both legs on `owner`'s balances.
    pub async fn swap(
        &self,
        asset_in: AssetId,
        asset_out: AssetId,
        amount_in: TokenAmount,
        owner: AccountAddress,
    ) -> Result<TokenAmount> {
        let pool_id = self
            .registry
            .lookup(asset_in, asset_out)
            .await
            .ok_or_else(|| anyhow::anyhow!("No pool for ({}, {})", asset_in, asset_out))?;

        let mut pools = self.pools.write().await;
        let pool = pools
            .get_mut(&pool_id)
            .ok_or_else(|| anyhow::anyhow!("Unknown pool {}", pool_id))?;

        self.ledger.debit(asset_in, owner, amount_in).await?;
        let amount_out = match pool.swap(asset_in, amount_in) {
            Ok(amount_out) => amount_out,
            Err(e) => {
                // Return the input if the pool refuses the swap
                self.ledger.credit(asset_in, owner, amount_in).await?;
                return Err(e);
            }
        };
        self.ledger.credit(asset_out, owner, amount_out).await?;

        info!(
            pool = %pool_id,
            asset_in = %asset_in,
            asset_out = %asset_out,
            amount_in = %amount_in,
            amount_out = %amount_out,
            "🔄 Swap executed"
        );

        Ok(amount_out)
    }

    pub async fn shares_of(&self, pool_id: PoolId, owner: AccountAddress) -> Result<TokenAmount> {
        let pools = self.pools.read().await;
        let pool = pools
            .get(&pool_id)
            .ok_or_else(|| anyhow::anyhow!("Unknown pool {}", pool_id))?;
        Ok(pool.shares_of(owner))
    }

    pub async fn reserves(&self, pool_id: PoolId) -> Result<(TokenAmount, TokenAmount)> {
        let pools = self.pools.read().await;
        let pool = pools
            .get(&pool_id)
            .ok_or_else(|| anyhow::anyhow!("Unknown pool {}", pool_id))?;
        Ok((pool.reserve_a, pool.reserve_b))
    }

    pub async fn begin_transaction(&self) -> Result<()> {
        let pools = self.pools.read().await;
        let mut backup = self.transaction_backup.write().await;
        *backup = Some(pools.clone());

        info!(
            pools = pools.len(),
            "📝 Pool transaction began (snapshot created)"
        );
        Ok(())
    }

    pub async fn commit_transaction(&self) -> Result<()> {
        let mut backup = self.transaction_backup.write().await;
        *backup = None;
        Ok(())
    }

    pub async fn rollback_transaction(&self) -> Result<()> {
        let mut backup = self.transaction_backup.write().await;

        if let Some(pool_backup) = backup.take() {
            let mut pools = self.pools.write().await;
            *pools = pool_backup;

            info!("❌ Pool transaction rolled back (snapshot restored)");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pol_ledger::MemoryStorage;

    fn asset(n: u8) -> AssetId {
        AssetId::from_bytes([n; 32])
    }

    fn account(n: u8) -> AccountAddress {
        AccountAddress::from_bytes([n; 32])
    }

    fn amt(n: u64) -> TokenAmount {
        TokenAmount::from_base_units(n)
    }

    async fn setup() -> (Arc<BalanceManager>, LiquidityRouter) {
        let ledger = Arc::new(BalanceManager::new(Arc::new(MemoryStorage::new())));
        let registry = Arc::new(PoolRegistry::new());
        let router = LiquidityRouter::new(registry, ledger.clone());
        (ledger, router)
    }

    #[tokio::test]
    async fn test_add_liquidity_settles_on_ledger() {
        let (ledger, router) = setup().await;
        let provider = account(1);

        ledger.credit(asset(1), provider, amt(1_000)).await.unwrap();
        ledger.credit(asset(2), provider, amt(4_000)).await.unwrap();

        let pool_id = router.create_pool(asset(1), asset(2)).await.unwrap();
        let minted = router
            .add_liquidity(pool_id, provider, asset(1), amt(1_000), asset(2), amt(4_000))
            .await
            .unwrap();

        assert_eq!(minted, amt(2_000)); // sqrt(1000 * 4000)
        assert_eq!(
            ledger.get_balance(asset(1), provider).await.unwrap(),
            TokenAmount::ZERO
        );
        assert_eq!(
            ledger.get_balance(asset(2), provider).await.unwrap(),
            TokenAmount::ZERO
        );
        assert_eq!(router.shares_of(pool_id, provider).await.unwrap(), amt(2_000));
    }

    #[tokio::test]
    async fn test_add_liquidity_requires_funds() {
        let (ledger, router) = setup().await;
        let provider = account(1);

        ledger.credit(asset(1), provider, amt(10)).await.unwrap();

        let pool_id = router.create_pool(asset(1), asset(2)).await.unwrap();
        assert!(router
            .add_liquidity(pool_id, provider, asset(1), amt(10), asset(2), amt(10))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_swap_round_trip_on_ledger() {
        let (ledger, router) = setup().await;
        let provider = account(1);
        let trader = account(2);

        ledger
            .credit(asset(1), provider, amt(1_000_000))
            .await
            .unwrap();
        ledger
            .credit(asset(2), provider, amt(1_000_000))
            .await
            .unwrap();

        let pool_id = router.create_pool(asset(1), asset(2)).await.unwrap();
        router
            .add_liquidity(
                pool_id,
                provider,
                asset(1),
                amt(1_000_000),
                asset(2),
                amt(1_000_000),
            )
            .await
            .unwrap();

        ledger.credit(asset(1), trader, amt(1_000)).await.unwrap();
        let out = router
            .swap(asset(1), asset(2), amt(1_000), trader)
            .await
            .unwrap();

        assert_eq!(out, amt(996));
        assert_eq!(
            ledger.get_balance(asset(1), trader).await.unwrap(),
            TokenAmount::ZERO
        );
        assert_eq!(ledger.get_balance(asset(2), trader).await.unwrap(), amt(996));
    }

    #[tokio::test]
    async fn test_failed_swap_refunds_input() {
        let (ledger, router) = setup().await;
        let trader = account(2);

        // Registered pool, but no liquidity: the swap is refused
        router.create_pool(asset(1), asset(2)).await.unwrap();
        ledger.credit(asset(1), trader, amt(1_000)).await.unwrap();

        assert!(router
            .swap(asset(1), asset(2), amt(1_000), trader)
            .await
            .is_err());

        // The debited input comes back
        assert_eq!(
            ledger.get_balance(asset(1), trader).await.unwrap(),
            amt(1_000)
        );
        assert_eq!(
            ledger.get_balance(asset(2), trader).await.unwrap(),
            TokenAmount::ZERO
        );
    }

    #[tokio::test]
    async fn test_swap_unknown_pair() {
        let (ledger, router) = setup().await;
        let trader = account(2);
        ledger.credit(asset(1), trader, amt(100)).await.unwrap();

        assert!(router
            .swap(asset(1), asset(9), amt(100), trader)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_withdraw_all() {
        let (ledger, router) = setup().await;
        let provider = account(1);

        ledger.credit(asset(1), provider, amt(500)).await.unwrap();
        ledger.credit(asset(2), provider, amt(2_000)).await.unwrap();

        let pool_id = router.create_pool(asset(1), asset(2)).await.unwrap();
        router
            .add_liquidity(pool_id, provider, asset(1), amt(500), asset(2), amt(2_000))
            .await
            .unwrap();

        let ((ret_a, out_a), (ret_b, out_b)) =
            router.withdraw_all(pool_id, provider).await.unwrap();

        let returned: HashMap<AssetId, TokenAmount> =
            [(ret_a, out_a), (ret_b, out_b)].into_iter().collect();
        assert_eq!(returned[&asset(1)], amt(500));
        assert_eq!(returned[&asset(2)], amt(2_000));

        assert_eq!(ledger.get_balance(asset(1), provider).await.unwrap(), amt(500));
        assert_eq!(
            ledger.get_balance(asset(2), provider).await.unwrap(),
            amt(2_000)
        );
        assert_eq!(
            router.shares_of(pool_id, provider).await.unwrap(),
            TokenAmount::ZERO
        );
    }

    #[tokio::test]
    async fn test_pool_rollback_restores_reserves() {
        let (ledger, router) = setup().await;
        let provider = account(1);
        let trader = account(2);

        ledger.credit(asset(1), provider, amt(10_000)).await.unwrap();
        ledger.credit(asset(2), provider, amt(10_000)).await.unwrap();
        ledger.credit(asset(1), trader, amt(1_000)).await.unwrap();

        let pool_id = router.create_pool(asset(1), asset(2)).await.unwrap();
        router
            .add_liquidity(pool_id, provider, asset(1), amt(10_000), asset(2), amt(10_000))
            .await
            .unwrap();

        router.begin_transaction().await.unwrap();
        router
            .swap(asset(1), asset(2), amt(1_000), trader)
            .await
            .unwrap();
        router.rollback_transaction().await.unwrap();

        assert_eq!(
            router.reserves(pool_id).await.unwrap(),
            (amt(10_000), amt(10_000))
        );
    }
}
