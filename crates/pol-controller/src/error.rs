use pol_ledger::{AccountAddress, AssetId, TokenAmount};
use thiserror::Error;

/// Controller operation result type
pub type Result<T> = std::result::Result<T, ControllerError>;

/// Controller errors
///
/// Every variant is a synchronous rejection of the triggering call; no
/// partial state survives a failed operation.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Access denied: {caller} is not the governor")]
    AccessDenied { caller: AccountAddress },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Treasury already initialized")]
    AlreadyInitialized,

    #[error("Treasury not initialized")]
    Uninitialized,

    #[error("Too early: {0}")]
    TooEarly(String),

    #[error("No pool found for pair ({0}, {1})")]
    NotFound(AssetId, AssetId),

    #[error("Conversion produced {produced}, below configured minimum {minimum}")]
    BelowMinimumOutput {
        produced: TokenAmount,
        minimum: TokenAmount,
    },

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),
}
