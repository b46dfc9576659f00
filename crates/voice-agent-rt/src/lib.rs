//! Specialist agent runtime: the `AgentHandler` contract, the process-wide
//! `AgentRegistry`, and the per-turn `Orchestrator` (spec §4.2, §4.5).

pub mod error;
pub mod handler;
pub mod orchestrator;
pub mod registry;

pub use error::{AgentError, Result};
pub use handler::{AgentHandler, AudioSink};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorOutcome, PhraseSpeaker};
pub use registry::{AgentRegistry, AgentRegistryBuilder};
