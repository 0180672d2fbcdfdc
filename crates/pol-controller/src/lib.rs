/*!
# Treasury conversion controller

Governance-gated engine that liquidates protocol-owned liquidity positions
and routes the proceeds into a single canonical reserve asset:

- **governance**: governor identity with a request-then-delay succession
  protocol (propose privileged, finalize public and time-gated)
- **engine**: write-once treasury binding, rotatable farm binding, bridge
  routing table, and the conversion engine itself
- **events**: bounded audit trail of every state-changing success
- **error**: controller-specific errors
- **metrics**: prometheus counters for transfers and conversions

All mutations are transactionally atomic: a failed conversion (or any failed
pair inside a batch) restores ledger balances and pool reserves exactly.
*/

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod governance;
pub mod metrics;

pub use config::ControllerConfig;
pub use engine::{BridgeRoutingTable, ConversionEngine, TreasuryBindings};
pub use error::{ControllerError, Result};
pub use events::{AuditEvent, AuditLog, AuditRecord};
pub use governance::{GovernanceController, GovernorGuard};

use pol_amm::{LiquidityRouter, PoolRegistry};
use pol_ledger::{AccountAddress, AssetId, BalanceManager, LedgerStorage};
use std::sync::Arc;

/// Fully wired controller: governance, conversion engine, and their
/// collaborators over one ledger storage backend.
pub struct TreasurySystem {
    pub governance: Arc<GovernanceController>,
    pub engine: Arc<ConversionEngine>,
    pub ledger: Arc<BalanceManager>,
    pub registry: Arc<PoolRegistry>,
    pub router: Arc<LiquidityRouter>,
    pub audit: Arc<AuditLog>,
}

impl TreasurySystem {
    pub fn new(
        storage: Arc<dyn LedgerStorage>,
        initial_governor: AccountAddress,
        canonical: AssetId,
        config: ControllerConfig,
    ) -> Result<Self> {
        let ledger = Arc::new(BalanceManager::new(storage));
        let registry = Arc::new(PoolRegistry::new());
        let router = Arc::new(LiquidityRouter::new(registry.clone(), ledger.clone()));
        let audit = Arc::new(AuditLog::new(config.audit_retention));

        let governance = Arc::new(GovernanceController::new(
            initial_governor,
            config.transfer_delay_secs,
            audit.clone(),
        )?);

        let engine = Arc::new(ConversionEngine::new(
            governance.clone(),
            ledger.clone(),
            registry.clone(),
            router.clone(),
            canonical,
            &config,
            audit.clone(),
        ));

        Ok(Self {
            governance,
            engine,
            ledger,
            registry,
            router,
            audit,
        })
    }
}
