//! Prometheus metrics for the treasury controller
//!
//! Tracks governor-transfer lifecycle, binding updates, and conversion
//! outcomes.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};

/// Governor-transfer requests accepted
pub static GOVERNOR_TRANSFER_REQUESTS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "pol_governance_transfer_requests_total",
        "Total governor transfer requests accepted"
    )
    .unwrap()
});

/// Governor transfers finalized
pub static GOVERNOR_TRANSFERS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "pol_governance_transfers_total",
        "Total governor transfers finalized"
    )
    .unwrap()
});

/// Bridge-route table updates
pub static BRIDGE_ROUTE_UPDATES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "pol_bridge_route_updates_total",
        "Total bridge route updates"
    )
    .unwrap()
});

/// Conversions by outcome
pub static CONVERSIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pol_conversions_total",
        "Total conversion attempts",
        &["outcome"]
    )
    .unwrap()
});

/// Canonical proceeds per conversion (base units)
pub static CANONICAL_PROCEEDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "pol_conversion_canonical_proceeds",
        "Canonical-asset proceeds per conversion"
    )
    .unwrap()
});
