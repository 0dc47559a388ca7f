//! 동기화 모듈.

pub mod loader;
pub mod registry;
pub mod scheduler;
pub mod sync;

pub use loader::{DataLoader, LoadRequest, Preset, PRESETS};
pub use registry::FetcherRegistry;
pub use scheduler::Scheduler;
pub use sync::{SyncEngine, SyncRunReport, TargetOutcome, TargetReport, TargetState};
