// Engine process plumbing
//
// - command.rs: the command surface and how it maps onto a process launch
// - hub.rs: progress fan-out to subscribers
// - orchestrator.rs: spawning, streaming and outcome extraction

pub mod command;
pub mod hub;
pub mod orchestrator;


pub use command::{injected_env, EngineCommand, EngineInvocation, EngineScript};
pub use hub::{ProgressChannel, ProgressHub, ProgressNotice, ProgressSubscription};
pub use orchestrator::{EngineRun, ProcessOrchestrator};
