pub mod bootstrap;
pub mod digest;
pub mod id_migration;
pub mod queue;
pub mod thread;
pub mod triage;
pub mod waiting_for;

pub use digest::{DigestGenerator, DigestResult};
pub use queue::SuggestionQueue;
pub use thread::{ThreadContext, ThreadContextManager};
pub use triage::{TriageCycleResult, TriageEngine};
pub use waiting_for::{WaitingForCheckResult, WaitingForTracker};
