mod orchestrator;
mod runtime;
mod shutdown;
mod simulation;
mod startup;
mod state;
mod types;

#[cfg(test)]
mod tests;

pub use orchestrator::{Components, SortcamOrchestrator};
pub use simulation::run_simulated_controller;
pub use types::{ComponentState, ShutdownReason};
