use pol_ledger::{AccountAddress, AssetId, TokenAmount};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Auditable record emitted by every state-changing success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEvent {
    GovernorChangeRequested {
        candidate: AccountAddress,
        /// Candidate this request superseded, if a request was pending.
        superseded: Option<AccountAddress>,
    },
    GovernorChanged {
        old: AccountAddress,
        new: AccountAddress,
    },
    TreasuryBound {
        treasury: AccountAddress,
    },
    FarmBound {
        previous: Option<AccountAddress>,
        farm: AccountAddress,
    },
    BridgeRouteSet {
        input: AssetId,
        bridge: AssetId,
        previous: Option<AssetId>,
    },
    Converted {
        asset_a: AssetId,
        asset_b: AssetId,
        canonical_out: TokenAmount,
        /// `None` means the farm was unset and the proceeds stayed at the
        /// treasury.
        delivered_to: Option<AccountAddress>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub at: i64,
    pub event: AuditEvent,
}

/// Bounded in-memory audit trail.
pub struct AuditLog {
    records: Arc<RwLock<Vec<AuditRecord>>>,
    retention: usize,
}

impl AuditLog {
    pub fn new(retention: usize) -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
            retention: retention.max(1),
        }
    }

    pub async fn record(&self, event: AuditEvent) {
        let mut records = self.records.write().await;
        records.push(AuditRecord {
            at: chrono::Utc::now().timestamp(),
            event,
        });

        // Keep only the most recent records, dropping the oldest tenth at a
        // time so trimming stays cheap
        if records.len() > self.retention {
            let drop = (self.retention / 10).max(1);
            records.drain(0..drop);
        }
    }

    pub async fn recent(&self, limit: usize) -> Vec<AuditRecord> {
        let records = self.records.read().await;
        let start = records.len().saturating_sub(limit);
        records[start..].to_vec()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(n: u8) -> AccountAddress {
        AccountAddress::from_bytes([n; 32])
    }

    #[tokio::test]
    async fn test_record_and_recent() {
        let log = AuditLog::new(100);
        log.record(AuditEvent::TreasuryBound {
            treasury: account(1),
        })
        .await;
        log.record(AuditEvent::FarmBound {
            previous: None,
            farm: account(2),
        })
        .await;

        let recent = log.recent(1).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(
            recent[0].event,
            AuditEvent::FarmBound {
                previous: None,
                farm: account(2)
            }
        );
        assert_eq!(log.len().await, 2);
    }

    #[tokio::test]
    async fn test_records_serialize() {
        let log = AuditLog::new(10);
        log.record(AuditEvent::GovernorChanged {
            old: account(1),
            new: account(2),
        })
        .await;

        let recent = log.recent(1).await;
        let json = serde_json::to_string(&recent[0]).unwrap();
        let back: AuditRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event, recent[0].event);
        assert_eq!(back.at, recent[0].at);
    }

    #[tokio::test]
    async fn test_retention_bound() {
        let log = AuditLog::new(10);
        for n in 0..25 {
            log.record(AuditEvent::TreasuryBound {
                treasury: account(n),
            })
            .await;
        }
        assert!(log.len().await <= 11);

        // The newest record always survives trimming
        let recent = log.recent(1).await;
        assert_eq!(
            recent[0].event,
            AuditEvent::TreasuryBound {
                treasury: account(24)
            }
        );
    }
}
