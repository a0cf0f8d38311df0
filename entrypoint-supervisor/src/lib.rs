//! Runtime supervision of a containerized workload.
//!
//! The supervisor activates a provisioned environment, runs the workload once with
//! `--interface <name>` and, when the workload fails, reports its exit status and
//! degrades into an interactive shell so that the container stays attachable.

pub mod activation;
pub mod description;
mod exec;
pub mod interface;
pub mod provisioner;
pub mod supervisor;

pub use activation::{ActivationError, EnvironmentActivator, EnvironmentHandle};
pub use description::{Activation, OnFailure, SupervisorDescription};
pub use interface::{InterfaceName, InvalidInterface};
pub use provisioner::{ProvisionError, Provisioner};
pub use supervisor::{Outcome, Supervisor, SupervisorError, WorkloadFailure, supervise};

/// Formats an error followed by each of its sources
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    message
}
