// ABOUTME: The synchronization core - watermark state machine, sync engine,
// ABOUTME: and run coordination, decoupled from concrete database drivers

pub mod coordinator;
pub mod engine;
pub mod sink;
pub mod source;
pub mod watermark;

pub use coordinator::{RunCoordinator, RunSummary, TableReport};
pub use engine::{SyncMode, SyncOutcome, TableSyncEngine};
pub use sink::RowSink;
pub use source::RowSource;
pub use watermark::{Watermark, WatermarkStore};
