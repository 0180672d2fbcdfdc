use crate::events::{AuditEvent, AuditLog};
use crate::governance::GovernanceController;
use crate::metrics;
use crate::{ControllerConfig, ControllerError, Result};
use pol_amm::{LiquidityRouter, PoolRegistry};
use pol_ledger::{AccountAddress, AssetId, BalanceManager, TokenAmount};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Treasury and farm account bindings.
///
/// The treasury binding is write-once; the farm may be rotated freely.
#[derive(Debug, Default)]
pub struct TreasuryBindings {
    treasury: Option<AccountAddress>,
    farm: Option<AccountAddress>,
}

impl TreasuryBindings {
    /// Bind the treasury account. Irreversible.
    pub fn bind_treasury(&mut self, treasury: AccountAddress) -> Result<()> {
        if self.treasury.is_some() {
            return Err(ControllerError::AlreadyInitialized);
        }
        if treasury.is_zero() {
            return Err(ControllerError::InvalidArgument(
                "treasury must not be the zero address".to_string(),
            ));
        }
        self.treasury = Some(treasury);
        Ok(())
    }

    /// Set the proceeds target, returning the previous binding.
    pub fn set_farm(&mut self, farm: AccountAddress) -> Option<AccountAddress> {
        self.farm.replace(farm)
    }

    pub fn is_initialized(&self) -> bool {
        self.treasury.is_some()
    }

    pub fn treasury(&self) -> Option<AccountAddress> {
        self.treasury
    }

    pub fn farm(&self) -> Option<AccountAddress> {
        self.farm
    }
}

/// Mapping from an input asset to the intermediate asset used when it has no
/// direct pool against the canonical asset.
///
/// Entries are overwritable and never deleted. No entry is validated against
/// the pool set: a dead-end route is an accepted operational risk, left to
/// governance judgment.
#[derive(Debug, Default)]
pub struct BridgeRoutingTable {
    routes: HashMap<AssetId, AssetId>,
}

impl BridgeRoutingTable {
    /// Set or overwrite the bridge for `input`, returning the previous one.
    pub fn set(&mut self, input: AssetId, bridge: AssetId) -> Option<AssetId> {
        self.routes.insert(input, bridge)
    }

    pub fn route_for(&self, asset: AssetId) -> Option<AssetId> {
        self.routes.get(&asset).copied()
    }
}

#[derive(Debug, Default)]
struct EngineState {
    bindings: TreasuryBindings,
    bridge: BridgeRoutingTable,
}

/// Liquidates held pool positions and routes the proceeds into the
/// canonical reserve asset.
///
/// Every mutating entry point re-checks the governor role and the treasury
/// binding at the moment of execution; the role stays pinned by a
/// [`GovernorGuard`](crate::governance::GovernorGuard) and the engine state
/// lock is held for the whole operation, so calls are strictly serialized
/// and a succession cannot land mid-mutation. A conversion (or a
/// whole batch) is bracketed by ledger and pool snapshot transactions, so
/// any failure restores the pre-call state exactly.
pub struct ConversionEngine {
    governance: Arc<GovernanceController>,
    ledger: Arc<BalanceManager>,
    registry: Arc<PoolRegistry>,
    router: Arc<LiquidityRouter>,
    canonical: AssetId,
    min_canonical_out: Option<TokenAmount>,
    state: RwLock<EngineState>,
    audit: Arc<AuditLog>,
}

impl ConversionEngine {
    pub fn new(
        governance: Arc<GovernanceController>,
        ledger: Arc<BalanceManager>,
        registry: Arc<PoolRegistry>,
        router: Arc<LiquidityRouter>,
        canonical: AssetId,
        config: &ControllerConfig,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            governance,
            ledger,
            registry,
            router,
            canonical,
            min_canonical_out: config.min_canonical_out,
            state: RwLock::new(EngineState::default()),
            audit,
        }
    }

    pub fn canonical_asset(&self) -> AssetId {
        self.canonical
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.read().await.bindings.is_initialized()
    }

    pub async fn treasury(&self) -> Option<AccountAddress> {
        self.state.read().await.bindings.treasury()
    }

    pub async fn farm(&self) -> Option<AccountAddress> {
        self.state.read().await.bindings.farm()
    }

    pub async fn bridge_route_for(&self, asset: AssetId) -> Option<AssetId> {
        self.state.read().await.bridge.route_for(asset)
    }

    /// One-time binding of the treasury account holding the fee positions.
    pub async fn initialize(&self, caller: AccountAddress, treasury: AccountAddress) -> Result<()> {
        let _governor = self.governance.authorize(caller).await?;

        let mut state = self.state.write().await;
        state.bindings.bind_treasury(treasury)?;

        info!(treasury = %treasury, "🏦 Treasury bound");
        self.audit.record(AuditEvent::TreasuryBound { treasury }).await;

        Ok(())
    }

    /// Bind or rotate the proceeds-distribution target.
    pub async fn set_farm(&self, caller: AccountAddress, farm: AccountAddress) -> Result<()> {
        let _governor = self.governance.authorize(caller).await?;

        let mut state = self.state.write().await;
        let previous = state.bindings.set_farm(farm);

        info!(
            farm = %farm,
            previous = previous.map(|p| p.to_string()),
            "🌾 Farm bound"
        );
        self.audit.record(AuditEvent::FarmBound { previous, farm }).await;

        Ok(())
    }

    /// Set or overwrite the bridge asset used to route `input` toward the
    /// canonical asset. Only future conversions are affected.
    pub async fn set_bridge_route(
        &self,
        caller: AccountAddress,
        input: AssetId,
        bridge: AssetId,
    ) -> Result<()> {
        let _governor = self.governance.authorize(caller).await?;

        let mut state = self.state.write().await;
        let previous = state.bridge.set(input, bridge);

        info!(
            input = %input,
            bridge = %bridge,
            previous = previous.map(|p| p.to_string()),
            "🌉 Bridge route set"
        );
        self.audit
            .record(AuditEvent::BridgeRouteSet {
                input,
                bridge,
                previous,
            })
            .await;
        metrics::BRIDGE_ROUTE_UPDATES.inc();

        Ok(())
    }

    /// Liquidate the treasury's position in the `(asset_a, asset_b)` pool
    /// and route the proceeds to the canonical asset. Atomic: any failure
    /// restores ledger balances and pool reserves exactly.
    pub async fn convert(
        &self,
        caller: AccountAddress,
        asset_a: AssetId,
        asset_b: AssetId,
    ) -> Result<TokenAmount> {
        let _governor = self.governance.authorize(caller).await?;

        let state = self.state.write().await;
        let treasury = state
            .bindings
            .treasury()
            .ok_or(ControllerError::Uninitialized)?;

        self.ledger.begin_transaction().await.map_err(ControllerError::Collaborator)?;
        self.router.begin_transaction().await.map_err(ControllerError::Collaborator)?;

        match self.convert_one(&state, treasury, asset_a, asset_b).await {
            Ok((total, delivered_to)) => {
                self.router.commit_transaction().await.map_err(ControllerError::Collaborator)?;
                self.ledger.commit_transaction().await.map_err(ControllerError::Collaborator)?;

                self.audit
                    .record(AuditEvent::Converted {
                        asset_a,
                        asset_b,
                        canonical_out: total,
                        delivered_to,
                    })
                    .await;
                metrics::CONVERSIONS.with_label_values(&["success"]).inc();
                metrics::CANONICAL_PROCEEDS.observe(total.to_base_units() as f64);

                Ok(total)
            }
            Err(e) => {
                self.router.rollback_transaction().await.map_err(ControllerError::Collaborator)?;
                self.ledger.rollback_transaction().await.map_err(ControllerError::Collaborator)?;
                metrics::CONVERSIONS.with_label_values(&["failure"]).inc();
                Err(e)
            }
        }
    }

    /// Apply the `convert` logic to each pair in order, as one indivisible
    /// unit: a failure on any pair discards the effects of the whole batch.
    pub async fn convert_multiple(
        &self,
        caller: AccountAddress,
        assets_a: &[AssetId],
        assets_b: &[AssetId],
    ) -> Result<TokenAmount> {
        let _governor = self.governance.authorize(caller).await?;

        if assets_a.len() != assets_b.len() {
            return Err(ControllerError::InvalidArgument(format!(
                "pair list lengths differ: {} vs {}",
                assets_a.len(),
                assets_b.len()
            )));
        }

        let state = self.state.write().await;
        let treasury = state
            .bindings
            .treasury()
            .ok_or(ControllerError::Uninitialized)?;

        self.ledger.begin_transaction().await.map_err(ControllerError::Collaborator)?;
        self.router.begin_transaction().await.map_err(ControllerError::Collaborator)?;

        match self.convert_batch(&state, treasury, assets_a, assets_b).await {
            Ok((batch_total, outcomes)) => {
                self.router.commit_transaction().await.map_err(ControllerError::Collaborator)?;
                self.ledger.commit_transaction().await.map_err(ControllerError::Collaborator)?;

                for (asset_a, asset_b, total, delivered_to) in outcomes {
                    self.audit
                        .record(AuditEvent::Converted {
                            asset_a,
                            asset_b,
                            canonical_out: total,
                            delivered_to,
                        })
                        .await;
                    metrics::CONVERSIONS.with_label_values(&["success"]).inc();
                    metrics::CANONICAL_PROCEEDS.observe(total.to_base_units() as f64);
                }

                Ok(batch_total)
            }
            Err(e) => {
                self.router.rollback_transaction().await.map_err(ControllerError::Collaborator)?;
                self.ledger.rollback_transaction().await.map_err(ControllerError::Collaborator)?;
                metrics::CONVERSIONS.with_label_values(&["failure"]).inc();
                Err(e)
            }
        }
    }

    /// Run every pair of an open batch; the first failure aborts the whole
    /// batch so the caller can roll back.
    async fn convert_batch(
        &self,
        state: &EngineState,
        treasury: AccountAddress,
        assets_a: &[AssetId],
        assets_b: &[AssetId],
    ) -> Result<(TokenAmount, Vec<(AssetId, AssetId, TokenAmount, Option<AccountAddress>)>)> {
        let mut batch_total = TokenAmount::ZERO;
        let mut outcomes = Vec::with_capacity(assets_a.len());

        for (&asset_a, &asset_b) in assets_a.iter().zip(assets_b.iter()) {
            let (total, delivered_to) =
                self.convert_one(state, treasury, asset_a, asset_b).await?;

            batch_total = batch_total.checked_add(total).ok_or_else(|| {
                ControllerError::Collaborator(anyhow::anyhow!("batch canonical proceeds overflow"))
            })?;
            outcomes.push((asset_a, asset_b, total, delivered_to));
        }

        Ok((batch_total, outcomes))
    }

    /// Convert a single pair inside an open transaction bracket.
    async fn convert_one(
        &self,
        state: &EngineState,
        treasury: AccountAddress,
        asset_a: AssetId,
        asset_b: AssetId,
    ) -> Result<(TokenAmount, Option<AccountAddress>)> {
        let pool = self
            .registry
            .lookup(asset_a, asset_b)
            .await
            .ok_or(ControllerError::NotFound(asset_a, asset_b))?;

        let ((leg_a, amount_a), (leg_b, amount_b)) = self
            .router
            .withdraw_all(pool, treasury)
            .await
            .map_err(ControllerError::Collaborator)?;

        let out_a = self.route_to_canonical(state, treasury, leg_a, amount_a).await?;
        let out_b = self.route_to_canonical(state, treasury, leg_b, amount_b).await?;

        let total = out_a.checked_add(out_b).ok_or_else(|| {
            ControllerError::Collaborator(anyhow::anyhow!("canonical proceeds overflow"))
        })?;

        if let Some(minimum) = self.min_canonical_out {
            if total < minimum {
                return Err(ControllerError::BelowMinimumOutput {
                    produced: total,
                    minimum,
                });
            }
        }

        let delivered_to = match state.bindings.farm() {
            Some(farm) => {
                if !total.is_zero() && farm != treasury {
                    self.ledger
                        .transfer(self.canonical, treasury, farm, total)
                        .await
                        .map_err(ControllerError::Collaborator)?;
                }
                Some(farm)
            }
            None => {
                // Explicit fallback: with no farm bound the proceeds stay at
                // the treasury
                info!(
                    treasury = %treasury,
                    canonical_out = %total,
                    "🌱 No farm bound, proceeds retained at treasury"
                );
                None
            }
        };

        info!(
            asset_a = %asset_a,
            asset_b = %asset_b,
            amount_a = %amount_a,
            amount_b = %amount_b,
            canonical_out = %total,
            delivered_to = delivered_to.map(|f| f.to_string()),
            "♻️ Position converted"
        );

        Ok((total, delivered_to))
    }

    /// Route one withdrawn leg into the canonical asset: at most two hops,
    /// via the bridge table, never recursive.
    async fn route_to_canonical(
        &self,
        state: &EngineState,
        owner: AccountAddress,
        asset: AssetId,
        amount: TokenAmount,
    ) -> Result<TokenAmount> {
        if amount.is_zero() || asset == self.canonical {
            return Ok(amount);
        }

        match state.bridge.route_for(asset) {
            Some(bridge) if bridge != self.canonical => {
                let mid = self.swap_hop(owner, asset, bridge, amount).await?;
                if mid.is_zero() {
                    return Ok(TokenAmount::ZERO);
                }
                self.swap_hop(owner, bridge, self.canonical, mid).await
            }
            // A bridge equal to the canonical asset collapses to one hop,
            // as does the absence of a route
            _ => self.swap_hop(owner, asset, self.canonical, amount).await,
        }
    }

    async fn swap_hop(
        &self,
        owner: AccountAddress,
        asset_in: AssetId,
        asset_out: AssetId,
        amount_in: TokenAmount,
    ) -> Result<TokenAmount> {
        if self.registry.lookup(asset_in, asset_out).await.is_none() {
            return Err(ControllerError::NotFound(asset_in, asset_out));
        }

        self.router
            .swap(asset_in, asset_out, amount_in, owner)
            .await
            .map_err(ControllerError::Collaborator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(n: u8) -> AccountAddress {
        AccountAddress::from_bytes([n; 32])
    }

    fn asset(n: u8) -> AssetId {
        AssetId::from_bytes([n; 32])
    }

    #[test]
    fn test_treasury_binding_is_write_once() {
        let mut bindings = TreasuryBindings::default();
        assert!(!bindings.is_initialized());

        assert!(matches!(
            bindings.bind_treasury(AccountAddress::ZERO),
            Err(ControllerError::InvalidArgument(_))
        ));

        bindings.bind_treasury(account(1)).unwrap();
        assert!(bindings.is_initialized());
        assert_eq!(bindings.treasury(), Some(account(1)));

        assert!(matches!(
            bindings.bind_treasury(account(2)),
            Err(ControllerError::AlreadyInitialized)
        ));
        assert_eq!(bindings.treasury(), Some(account(1)));
    }

    #[test]
    fn test_farm_binding_rotates() {
        let mut bindings = TreasuryBindings::default();
        assert_eq!(bindings.set_farm(account(1)), None);
        assert_eq!(bindings.set_farm(account(2)), Some(account(1)));
        assert_eq!(bindings.farm(), Some(account(2)));
    }

    #[test]
    fn test_bridge_table_overwrites() {
        let mut table = BridgeRoutingTable::default();
        assert_eq!(table.route_for(asset(1)), None);

        assert_eq!(table.set(asset(1), asset(2)), None);
        assert_eq!(table.route_for(asset(1)), Some(asset(2)));

        assert_eq!(table.set(asset(1), asset(3)), Some(asset(2)));
        assert_eq!(table.route_for(asset(1)), Some(asset(3)));
    }
}
