use anyhow::{bail, Result};
use pol_ledger::AssetId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Identity of a liquidity pool, derived from its unordered asset pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolId([u8; 32]);

impl PoolId {
    pub fn for_pair(asset_x: AssetId, asset_y: AssetId) -> Self {
        let (a, b) = sort_pair(asset_x, asset_y);
        let mut hasher = blake3::Hasher::new();
        hasher.update(a.as_bytes());
        hasher.update(b.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool:{}", hex::encode(&self.0[..8]))
    }
}

/// Canonical ordering for an unordered asset pair.
pub fn sort_pair(x: AssetId, y: AssetId) -> (AssetId, AssetId) {
    if x <= y {
        (x, y)
    } else {
        (y, x)
    }
}

/// Registry of known pools, keyed by their unordered asset pair.
pub struct PoolRegistry {
    pools: Arc<RwLock<HashMap<(AssetId, AssetId), PoolId>>>,
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self {
            pools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, asset_x: AssetId, asset_y: AssetId) -> Result<PoolId> {
        if asset_x == asset_y {
            bail!("Cannot register a pool for identical assets");
        }

        let key = sort_pair(asset_x, asset_y);
        let mut pools = self.pools.write().await;

        if pools.contains_key(&key) {
            bail!("Pool already registered for ({}, {})", key.0, key.1);
        }

        let pool_id = PoolId::for_pair(asset_x, asset_y);
        pools.insert(key, pool_id);

        info!(
            asset_a = %key.0,
            asset_b = %key.1,
            pool = %pool_id,
            "🏊 Pool registered"
        );

        Ok(pool_id)
    }

    /// Look up the pool for an asset pair; the pair is unordered.
    pub async fn lookup(&self, asset_x: AssetId, asset_y: AssetId) -> Option<PoolId> {
        let pools = self.pools.read().await;
        pools.get(&sort_pair(asset_x, asset_y)).copied()
    }
}
