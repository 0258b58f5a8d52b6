// ============================================================================
// Engine Module
// Matching, settlement, and the exchange facade
// ============================================================================

pub mod allocation;
pub mod exchange;
pub mod settlement;
pub mod worker;

pub use allocation::{allocator_for, Allocation, FifoAllocator, LevelAllocator, ProRataAllocator};
pub use exchange::Exchange;
pub use settlement::{FillOutcome, SettlementCoordinator};
pub use worker::{EngineOp, PairWorker};
