// Implementations for the leveling system.

pub mod snapshot_store;

// Re-export for convenience
pub use snapshot_store::SnapshotLevelStore;
