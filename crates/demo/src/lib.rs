//! Demo orchestrator: wires a session to the fake store and drives a
//! purchase flow the way a UI layer would.

pub mod config;
pub mod flow;

pub use config::DemoConfig;
pub use flow::{FlowReport, run_flow};
