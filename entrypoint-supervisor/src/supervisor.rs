use std::fmt;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

use crate::activation::{ActivationError, EnvironmentActivator, EnvironmentHandle};
use crate::description::{OnFailure, SupervisorDescription};
use crate::exec::replace_with_shell;
use crate::interface::InterfaceName;

/// Status reported by shells for a command that cannot be found
const NOT_FOUND: i32 = 127;

/// Status reported by shells for a command that cannot be executed
const NOT_EXECUTABLE: i32 = 126;

/// Failures that prevent the workload from being started
#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    /// The environment could not be activated
    #[error("failed to activate the environment")]
    Activation(#[from] ActivationError),
    /// The workload command is empty
    #[error("the workload command must not be empty")]
    EmptyWorkload,
}

/// A workload that terminated with a non-zero status
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct WorkloadFailure {
    code: i32,
}

impl WorkloadFailure {
    /// Wraps the status a workload exited with
    pub fn new(code: i32) -> Self {
        Self { code }
    }

    /// Exit status, using `128 + signal` for workloads killed by a signal
    pub fn code(&self) -> i32 {
        self.code
    }

    fn from_status(status: ExitStatus) -> Option<Self> {
        if status.success() {
            return None;
        }

        let code = status.code().unwrap_or_else(|| {
            cfg_if::cfg_if! {
                if #[cfg(unix)] {
                    use std::os::unix::process::ExitStatusExt;

                    status.signal().map_or(1, |signal| 128 + signal)
                } else {
                    1
                }
            }
        });

        Some(Self { code })
    }
}

impl fmt::Display for WorkloadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Main command failed with exit code {}.", self.code)
    }
}

/// Terminal state of a supervised run
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Outcome {
    /// The workload exited with status 0
    Succeeded,
    /// The workload failed; the environment is kept for the fallback shell
    Degraded {
        /// How the workload failed
        failure: WorkloadFailure,
        /// Environment the workload ran with
        env: EnvironmentHandle,
    },
}

/// Activates the environment and runs the workload once.
///
/// ```text
/// Activating -> Running -> Succeeded
///                       -> Degraded(status)
/// ```
pub struct Supervisor {
    activator: Box<dyn EnvironmentActivator>,
    program: String,
    leading_args: Vec<String>,
    interface: InterfaceName,
    environment: Vec<(String, String)>,
    on_failure: OnFailure,
    fallback_shell: PathBuf,
}

impl Supervisor {
    /// Creates a supervisor from a description and the activator matching its activation source
    pub fn new(
        description: SupervisorDescription,
        activator: Box<dyn EnvironmentActivator>,
    ) -> Result<Self, SupervisorError> {
        let mut workload = description.workload.into_iter();
        let program = workload.next().ok_or(SupervisorError::EmptyWorkload)?;

        Ok(Self {
            activator,
            program,
            leading_args: workload.collect(),
            interface: description.interface,
            environment: description.environment.into_iter().collect(),
            on_failure: description.on_failure,
            fallback_shell: description.fallback_shell,
        })
    }

    /// Arguments given to the workload
    pub fn workload_args(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.program.as_str())
            .chain(self.leading_args.iter().map(String::as_str))
            .chain([InterfaceName::FLAG, self.interface.as_str()])
    }

    fn activate(&self) -> Result<EnvironmentHandle, ActivationError> {
        tracing::debug!("activating the environment");

        let mut env = self.activator.activate()?;
        for (key, value) in &self.environment {
            env.set(key, value);
        }

        Ok(env)
    }

    fn run_workload(&self, env: &EnvironmentHandle) -> Option<WorkloadFailure> {
        let program = self.program.as_str();
        tracing::debug!(
            program,
            interface = %self.interface,
            "starting the workload"
        );

        let status = Command::new(program)
            .args(self.workload_args().skip(1))
            .env_clear()
            .envs(env.iter())
            .status();

        match status {
            Ok(status) => WorkloadFailure::from_status(status),
            Err(error) => {
                tracing::error!(program, %error, "failed to start the workload");
                let code = if error.kind() == std::io::ErrorKind::NotFound {
                    NOT_FOUND
                } else {
                    NOT_EXECUTABLE
                };

                Some(WorkloadFailure::new(code))
            }
        }
    }

    /// Activates the environment, then runs the workload to completion.
    ///
    /// Activation failures are returned as errors and the workload is never started.
    /// A failing workload is not an error, it leads to [`Outcome::Degraded`].
    pub fn run(&self) -> Result<Outcome, SupervisorError> {
        let env = self.activate()?;

        match self.run_workload(&env) {
            None => {
                tracing::debug!("the workload completed successfully");
                Ok(Outcome::Succeeded)
            }
            Some(failure) => {
                tracing::debug!(code = failure.code(), "the workload failed");
                Ok(Outcome::Degraded { failure, env })
            }
        }
    }

    /// Acts on the outcome of [`Supervisor::run`].
    ///
    /// On failure the diagnostic is printed on stderr, then the configured policy applies:
    /// either the process is replaced by the fallback shell, or the status of the workload
    /// is returned as the exit status.
    pub fn conclude(&self, outcome: Outcome) -> proc_exit::ExitResult {
        let Outcome::Degraded { failure, env } = outcome else {
            return Ok(());
        };

        eprintln!("{failure}");

        match self.on_failure {
            OnFailure::Shell => match replace_with_shell(&self.fallback_shell, &env)? {},
            OnFailure::Propagate => Err(proc_exit::Exit::new(proc_exit::Code::new(failure.code()))),
        }
    }
}

/// Runs the supervisor, then applies the failure policy
pub fn supervise(supervisor: &Supervisor) -> proc_exit::ExitResult {
    let outcome = supervisor
        .run()
        .map_err(|error| proc_exit::Code::FAILURE.with_message(crate::error_chain(&error)))?;

    supervisor.conclude(outcome)
}
