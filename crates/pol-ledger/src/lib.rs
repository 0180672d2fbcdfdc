pub mod balance;
pub mod storage;
pub mod types;

pub use balance::BalanceManager;
pub use storage::{LedgerStorage, MemoryStorage, TransferRecord};
pub use types::{AccountAddress, AssetId, TokenAmount};
