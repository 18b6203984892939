//! Engine core: configuration, job queue, event bus, shared state.

pub mod config;
pub mod events;
pub mod jobs;
pub mod notifier;
pub mod state;

pub use config::{ErpConfig, OrphanPolicy, PricingPolicy, StockCheckPolicy, SyncConfig};
pub use events::{EngineEvent, EventBus};
pub use jobs::{Job, JobContext, JobHandle, JobOutcome, JobQueue, JobState};
pub use notifier::{LogNotifier, Notifier};
pub use state::SyncContext;
