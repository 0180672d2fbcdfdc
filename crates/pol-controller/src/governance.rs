use crate::events::{AuditEvent, AuditLog};
use crate::metrics;
use crate::{ControllerError, Result};
use pol_ledger::AccountAddress;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{info, warn};

/// A proposed governor succession awaiting its delay.
///
/// Candidate and request time live in one value so they are always set and
/// cleared together.
#[derive(Debug, Clone, Copy)]
struct PendingTransfer {
    candidate: AccountAddress,
    requested_at: i64,
}

#[derive(Debug)]
struct GovernanceState {
    governor: AccountAddress,
    pending: Option<PendingTransfer>,
}

/// Proof that a caller held the governor role when it was checked.
///
/// Keeps the governance state read-locked, so a succession cannot complete
/// while the guard is alive. Callers hold it across the mutation the check
/// authorized.
pub struct GovernorGuard<'a> {
    _state: RwLockReadGuard<'a, GovernanceState>,
}

/// Owns the governor identity and the request-then-delay succession
/// protocol.
///
/// Proposing a successor is restricted to the current governor; finalizing
/// is open to anyone and gated purely by elapsed time, so a hostile or
/// erroneous request stays observable for the whole delay window before it
/// can take effect.
pub struct GovernanceController {
    state: RwLock<GovernanceState>,
    transfer_delay_secs: i64,
    audit: Arc<AuditLog>,
}

impl GovernanceController {
    pub fn new(
        initial_governor: AccountAddress,
        transfer_delay_secs: i64,
        audit: Arc<AuditLog>,
    ) -> Result<Self> {
        if initial_governor.is_zero() {
            return Err(ControllerError::InvalidArgument(
                "initial governor must not be the zero address".to_string(),
            ));
        }
        if transfer_delay_secs < 0 {
            return Err(ControllerError::InvalidArgument(
                "transfer delay must be non-negative".to_string(),
            ));
        }

        Ok(Self {
            state: RwLock::new(GovernanceState {
                governor: initial_governor,
                pending: None,
            }),
            transfer_delay_secs,
            audit,
        })
    }

    pub async fn governor(&self) -> AccountAddress {
        self.state.read().await.governor
    }

    /// The pending successor and its request timestamp, if any.
    pub async fn pending_transfer(&self) -> Option<(AccountAddress, i64)> {
        self.state
            .read()
            .await
            .pending
            .map(|p| (p.candidate, p.requested_at))
    }

    pub fn transfer_delay_secs(&self) -> i64 {
        self.transfer_delay_secs
    }

    /// Reject the call unless `caller` is the current governor; on success
    /// the returned guard pins the role until it is dropped.
    pub async fn authorize(&self, caller: AccountAddress) -> Result<GovernorGuard<'_>> {
        let state = self.state.read().await;
        if caller != state.governor {
            warn!(caller = %caller, governor = %state.governor, "Rejected non-governor call");
            return Err(ControllerError::AccessDenied { caller });
        }
        Ok(GovernorGuard { _state: state })
    }

    /// Propose `candidate` as the next governor, restarting the delay timer
    /// and superseding any prior pending request.
    pub async fn request_governor_change(
        &self,
        caller: AccountAddress,
        candidate: AccountAddress,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut state = self.state.write().await;

        // Role check and mutation share the write-lock scope so a
        // concurrent succession cannot slip between them
        if caller != state.governor {
            warn!(caller = %caller, governor = %state.governor, "Rejected non-governor call");
            return Err(ControllerError::AccessDenied { caller });
        }

        if candidate.is_zero() {
            return Err(ControllerError::InvalidArgument(
                "pending governor must not be the zero address".to_string(),
            ));
        }

        let superseded = state.pending.map(|p| p.candidate);
        state.pending = Some(PendingTransfer {
            candidate,
            requested_at: now,
        });

        info!(
            governor = %state.governor,
            candidate = %candidate,
            superseded = superseded.map(|s| s.to_string()),
            delay_secs = self.transfer_delay_secs,
            "🗳️ Governor change requested"
        );

        self.audit
            .record(AuditEvent::GovernorChangeRequested {
                candidate,
                superseded,
            })
            .await;
        metrics::GOVERNOR_TRANSFER_REQUESTS.inc();

        Ok(())
    }

    /// Promote the pending candidate to governor. Callable by anyone; fails
    /// TooEarly while the delay has not elapsed or nothing is pending.
    pub async fn finalize_governor_change(&self, caller: AccountAddress) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut state = self.state.write().await;

        let pending = state.pending.ok_or_else(|| {
            ControllerError::TooEarly("no governor change has been requested".to_string())
        })?;

        let elapsed = now - pending.requested_at;
        if elapsed < self.transfer_delay_secs {
            let remaining = self.transfer_delay_secs - elapsed;
            return Err(ControllerError::TooEarly(format!(
                "{}s remaining of the {}s transfer delay",
                remaining, self.transfer_delay_secs
            )));
        }

        let old = state.governor;
        state.governor = pending.candidate;
        state.pending = None;

        info!(
            old_governor = %old,
            new_governor = %state.governor,
            finalized_by = %caller,
            elapsed_secs = elapsed,
            "🔑 Governor changed"
        );

        self.audit
            .record(AuditEvent::GovernorChanged {
                old,
                new: state.governor,
            })
            .await;
        metrics::GOVERNOR_TRANSFERS.inc();

        Ok(())
    }

    /// Shift the pending request into the past, standing in for the passage
    /// of real time.
    #[cfg(test)]
    pub(crate) async fn backdate_pending(&self, secs: i64) {
        let mut state = self.state.write().await;
        if let Some(pending) = state.pending.as_mut() {
            pending.requested_at -= secs;
        }
    }
}
