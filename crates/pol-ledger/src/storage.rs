use crate::types::{AccountAddress, AssetId, TokenAmount};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

// Transfer record for history tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    pub asset: AssetId,
    pub from: AccountAddress,
    pub to: AccountAddress,
    pub amount: TokenAmount,
    pub timestamp: DateTime<Utc>,
    pub tx_hash: String,
}

type BalanceMap = HashMap<(AssetId, AccountAddress), TokenAmount>;

#[async_trait]
pub trait LedgerStorage: Send + Sync {
    async fn get_balance(&self, asset: AssetId, account: AccountAddress) -> Result<TokenAmount>;
    async fn set_balance(
        &self,
        asset: AssetId,
        account: AccountAddress,
        balance: TokenAmount,
    ) -> Result<()>;
    async fn accounts_for(&self, asset: AssetId) -> Result<Vec<AccountAddress>>;

    /// Transactions nest: the snapshot is taken at the outermost `begin`,
    /// and `rollback` at any depth restores it and closes the transaction.
    async fn begin_transaction(&self) -> Result<()>;
    async fn commit_transaction(&self) -> Result<()>;
    async fn rollback_transaction(&self) -> Result<()>;

    async fn record_transfer(&self, record: TransferRecord) -> Result<()>;
    async fn transfer_history(&self, account: AccountAddress) -> Result<Vec<TransferRecord>>;
}

pub struct MemoryStorage {
    balances: Arc<RwLock<BalanceMap>>,
    // Snapshot of the outermost open transaction plus current nesting depth
    transaction_backup: Arc<RwLock<Option<BalanceMap>>>,
    transaction_depth: Arc<RwLock<u32>>,
    history: Arc<RwLock<Vec<TransferRecord>>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            balances: Arc::new(RwLock::new(HashMap::new())),
            transaction_backup: Arc::new(RwLock::new(None)),
            transaction_depth: Arc::new(RwLock::new(0)),
            history: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    async fn get_balance(&self, asset: AssetId, account: AccountAddress) -> Result<TokenAmount> {
        let balances = self.balances.read().await;
        Ok(balances
            .get(&(asset, account))
            .copied()
            .unwrap_or(TokenAmount::ZERO))
    }

    async fn set_balance(
        &self,
        asset: AssetId,
        account: AccountAddress,
        balance: TokenAmount,
    ) -> Result<()> {
        let mut balances = self.balances.write().await;

        if balance == TokenAmount::ZERO {
            balances.remove(&(asset, account));
        } else {
            balances.insert((asset, account), balance);
        }

        Ok(())
    }

    async fn accounts_for(&self, asset: AssetId) -> Result<Vec<AccountAddress>> {
        let balances = self.balances.read().await;
        Ok(balances
            .keys()
            .filter(|(a, _)| *a == asset)
            .map(|(_, account)| *account)
            .collect())
    }

    async fn begin_transaction(&self) -> Result<()> {
        let mut depth = self.transaction_depth.write().await;

        if *depth == 0 {
            let balances = self.balances.read().await;
            let mut backup = self.transaction_backup.write().await;
            *backup = Some(balances.clone());

            info!(
                entries = balances.len(),
                storage_type = "memory",
                "📝 Transaction began (snapshot created)"
            );
        }

        *depth += 1;
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        let mut depth = self.transaction_depth.write().await;

        if *depth > 0 {
            *depth -= 1;
        }

        if *depth == 0 {
            let mut backup = self.transaction_backup.write().await;
            let had_backup = backup.is_some();
            *backup = None;

            if had_backup {
                info!(
                    storage_type = "memory",
                    "✅ Transaction committed (snapshot discarded)"
                );
            }
        }
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<()> {
        let mut depth = self.transaction_depth.write().await;
        let mut backup = self.transaction_backup.write().await;

        if let Some(balance_backup) = backup.take() {
            let mut balances = self.balances.write().await;

            let entries_before = balances.len();
            *balances = balance_backup;

            info!(
                entries_before,
                entries_after = balances.len(),
                storage_type = "memory",
                "❌ Transaction rolled back (snapshot restored)"
            );
        }

        *depth = 0;
        Ok(())
    }

    async fn record_transfer(&self, record: TransferRecord) -> Result<()> {
        let mut history = self.history.write().await;
        history.push(record);
        Ok(())
    }

    async fn transfer_history(&self, account: AccountAddress) -> Result<Vec<TransferRecord>> {
        let history = self.history.read().await;
        Ok(history
            .iter()
            .filter(|tx| tx.from == account || tx.to == account)
            .cloned()
            .collect())
    }
}
