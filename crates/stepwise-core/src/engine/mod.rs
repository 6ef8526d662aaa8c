pub(crate) mod hooks;
pub mod runner;

pub use runner::{CaseState, RunPolicy, Runner, StepPhase};
