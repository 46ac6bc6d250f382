pub mod dedupe;
pub mod orchestrator;
pub mod retry;
pub mod session;

pub use dedupe::{DedupeStore, JsonFileStorage, SeenStorage};
pub use orchestrator::{OrchestratorSettings, Pacing, RunCounters, TargetOrchestrator};
pub use retry::{RetryEngine, RetryPolicy, ScrapeOutcome};
pub use session::{SessionPhase, SessionState, SessionSupervisor, SupervisorPolicy};
