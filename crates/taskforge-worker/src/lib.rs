// Workflow tree execution engine
//
// The scheduler drives `advance -> execute leaf -> advance` until a tree
// terminates; the queue engine decides what runs next and propagates
// failure/completion; recovery and the reaper clean up after crashes and
// stuck work.

pub mod executor;
pub mod interrupts;
pub mod process_agent;
pub mod queue;
pub mod reaper;
pub mod recovery;
pub mod rewind;
pub mod runner;
pub mod scheduler;

pub use executor::TreeExecutor;
pub use interrupts::{Interrupts, PauseWait};
pub use process_agent::{registry_from_dir, LocalWorkspaces, ProcessAgent};
pub use queue::QueueEngine;
pub use reaper::{Reaper, ReaperReport};
pub use recovery::{Recovery, RecoveryReport};
pub use rewind::{CheckpointRewind, RewindOutcome};
pub use runner::{AgentRunner, RunOutcome};
pub use scheduler::Scheduler;
