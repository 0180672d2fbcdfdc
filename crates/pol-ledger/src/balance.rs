use crate::storage::{LedgerStorage, TransferRecord};
use crate::types::{AccountAddress, AssetId, TokenAmount};
use anyhow::{bail, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// Per-asset balance bookkeeping over a [`LedgerStorage`] backend.
///
/// Transfers are bracketed by storage transactions so a failure partway
/// through leaves balances untouched.
pub struct BalanceManager {
    storage: Arc<dyn LedgerStorage>,
}

impl BalanceManager {
    pub fn new(storage: Arc<dyn LedgerStorage>) -> Self {
        Self { storage }
    }

    pub async fn get_balance(
        &self,
        asset: AssetId,
        account: AccountAddress,
    ) -> Result<TokenAmount> {
        self.storage.get_balance(asset, account).await
    }

    pub async fn credit(
        &self,
        asset: AssetId,
        account: AccountAddress,
        amount: TokenAmount,
    ) -> Result<()> {
        if amount == TokenAmount::ZERO {
            return Ok(());
        }

        let current = self.storage.get_balance(asset, account).await?;
        let new_balance = current
            .checked_add(amount)
            .ok_or_else(|| anyhow::anyhow!("Balance overflow for {} on {}", account, asset))?;

        self.storage.set_balance(asset, account, new_balance).await?;

        info!(
            asset = %asset,
            account = %account,
            amount = %amount,
            balance_before = %current,
            balance_after = %new_balance,
            "💰 Balance credited"
        );
        Ok(())
    }

    pub async fn debit(
        &self,
        asset: AssetId,
        account: AccountAddress,
        amount: TokenAmount,
    ) -> Result<()> {
        if amount == TokenAmount::ZERO {
            return Ok(());
        }

        let current = self.storage.get_balance(asset, account).await?;
        let new_balance = current.checked_sub(amount).ok_or_else(|| {
            anyhow::anyhow!(
                "Insufficient balance for {} on {}: has {}, needs {}",
                account,
                asset,
                current,
                amount
            )
        })?;

        self.storage.set_balance(asset, account, new_balance).await?;

        info!(
            asset = %asset,
            account = %account,
            amount = %amount,
            balance_before = %current,
            balance_after = %new_balance,
            "💸 Balance debited"
        );
        Ok(())
    }

    /// Permanently remove `amount` of `asset` from `account`.
    pub async fn burn(
        &self,
        asset: AssetId,
        account: AccountAddress,
        amount: TokenAmount,
    ) -> Result<()> {
        self.debit(asset, account, amount).await?;

        info!(
            asset = %asset,
            account = %account,
            amount = %amount,
            "🔥 Tokens burned"
        );
        Ok(())
    }

    pub async fn transfer(
        &self,
        asset: AssetId,
        from: AccountAddress,
        to: AccountAddress,
        amount: TokenAmount,
    ) -> Result<()> {
        if amount == TokenAmount::ZERO {
            return Ok(());
        }

        if from == to {
            bail!("Cannot transfer to same account");
        }

        self.storage.begin_transaction().await?;

        match self.transfer_internal(asset, from, to, amount).await {
            Ok(tx_hash) => {
                self.storage.commit_transaction().await?;

                let record = TransferRecord {
                    asset,
                    from,
                    to,
                    amount,
                    timestamp: Utc::now(),
                    tx_hash: tx_hash.clone(),
                };

                // Record history (ignore errors to not fail the transfer)
                if let Err(e) = self.storage.record_transfer(record).await {
                    debug!(tx_hash = %tx_hash, error = %e, "Failed to record transfer");
                }

                info!(
                    asset = %asset,
                    from = %from,
                    to = %to,
                    amount = %amount,
                    tx_hash = %tx_hash,
                    "✅ Transfer committed"
                );
                Ok(())
            }
            Err(e) => {
                info!(
                    asset = %asset,
                    from = %from,
                    to = %to,
                    amount = %amount,
                    error = %e,
                    "❌ Transfer rolled back"
                );
                self.storage.rollback_transaction().await?;
                Err(e)
            }
        }
    }

    async fn transfer_internal(
        &self,
        asset: AssetId,
        from: AccountAddress,
        to: AccountAddress,
        amount: TokenAmount,
    ) -> Result<String> {
        let from_balance = self.storage.get_balance(asset, from).await?;
        if from_balance < amount {
            bail!(
                "Insufficient balance: {} has {} of {}, needs {}",
                from,
                from_balance,
                asset,
                amount
            );
        }

        let to_balance = self.storage.get_balance(asset, to).await?;

        let new_from_balance = from_balance.saturating_sub(amount);
        let new_to_balance = to_balance
            .checked_add(amount)
            .ok_or_else(|| anyhow::anyhow!("Balance overflow for recipient"))?;

        self.storage.set_balance(asset, from, new_from_balance).await?;
        self.storage.set_balance(asset, to, new_to_balance).await?;

        let now = Utc::now().timestamp();
        let mut hasher = blake3::Hasher::new();
        hasher.update(asset.as_bytes());
        hasher.update(from.as_bytes());
        hasher.update(to.as_bytes());
        hasher.update(&amount.to_base_units().to_le_bytes());
        hasher.update(&now.to_le_bytes());
        let tx_hash = hex::encode(hasher.finalize().as_bytes());

        Ok(tx_hash)
    }

    pub async fn begin_transaction(&self) -> Result<()> {
        self.storage.begin_transaction().await
    }

    pub async fn commit_transaction(&self) -> Result<()> {
        self.storage.commit_transaction().await
    }

    pub async fn rollback_transaction(&self) -> Result<()> {
        self.storage.rollback_transaction().await
    }

    pub async fn transfer_history(
        &self,
        account: AccountAddress,
    ) -> Result<Vec<TransferRecord>> {
        self.storage.transfer_history(account).await
    }
}
