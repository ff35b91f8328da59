//! Frame streaming: bounded pool, async loading and eviction

pub mod buffer;
pub mod budget;
pub mod priority;
pub mod loader;
pub mod pool;

pub use buffer::{FrameKey, GridBuffer, GridRole, GpuResource, GpuUploader};
pub use budget::MemoryBudget;
pub use loader::{FrameLoader, LoadOutcome, LoaderConfig};
pub use pool::{EntryState, PoolStats, ResidentFrame, StreamingConfig, StreamingPool};
pub use priority::LoadPriority;
