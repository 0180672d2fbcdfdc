pub mod pool;
pub mod registry;
pub mod router;

pub use pool::Pool;
pub use registry::{sort_pair, PoolId, PoolRegistry};
pub use router::LiquidityRouter;
