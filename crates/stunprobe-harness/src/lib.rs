//! In-process STUN targets and the multi-instance orchestrator.
//!
//! This crate provides implementations of the `StunService` and
//! `ServiceInstance` contracts that run the reference configuration model
//! instead of a native server, so acceptance runs and orchestration can be
//! exercised without binding sockets. Instances can opt into listening for
//! real, answering STUN binding requests, which is what the orchestrator's
//! external client smoke test runs against.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod binding;
mod listener;
pub mod logging;
pub mod orchestrator;
pub mod probe;
mod sim_instance;
mod sim_server;

pub use orchestrator::{
    InstanceFactory, InstanceOutcome, OrchestrationError, OrchestrationReport, Orchestrator,
    OrchestratorSettings, SettingsError,
};
pub use probe::{ClientProbe, Probe, ProbeError, ProbeOutput};
pub use sim_instance::{PortRegistry, SimInstance};
pub use sim_server::SimServer;
