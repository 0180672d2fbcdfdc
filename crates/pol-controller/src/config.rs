use pol_ledger::TokenAmount;
use serde::{Deserialize, Serialize};

/// Deploy-time constants for the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Minimum delay between a governor-transfer request and its
    /// finalization, in seconds. Immutable after construction.
    pub transfer_delay_secs: i64,
    /// Optional floor on the canonical proceeds of a single conversion.
    /// `None` disables the guard; the engine performs no other price or
    /// slippage check.
    pub min_canonical_out: Option<TokenAmount>,
    /// How many audit records to retain in memory.
    pub audit_retention: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            transfer_delay_secs: 3 * 24 * 3600, // 3 days
            min_canonical_out: None,
            audit_retention: 1000,
        }
    }
}
