use std::path::PathBuf;

use clap::Parser;

use tracing_subscriber::EnvFilter;

use entrypoint_supervisor::description::DEFAULT_DESCRIPTION_PATH;
use entrypoint_supervisor::{
    InterfaceName, OnFailure, Supervisor, SupervisorDescription, error_chain, supervise,
};

/// Activates the provisioned environment, runs the workload and degrades to an interactive shell when it fails
#[derive(clap::Parser)]
#[command(name = "entrypoint-supervisor", version, author, about, long_about)]
struct Args {
    /// Description baked into the image at build time
    #[arg(
        long,
        value_name = "PATH",
        env = "ENTRYPOINT_DESCRIPTION",
        default_value = DEFAULT_DESCRIPTION_PATH
    )]
    description: PathBuf,

    /// Overrides the value given to the workload with `--interface`
    #[arg(long, value_name = "NAME")]
    interface: Option<InterfaceName>,

    /// Overrides what happens when the workload fails
    #[arg(long, value_name = "POLICY")]
    on_failure: Option<OnFailure>,

    /// Overrides the interactive shell used when the workload fails
    #[arg(long, value_name = "PATH")]
    fallback_shell: Option<PathBuf>,
}

impl Args {
    fn description(self) -> Result<SupervisorDescription, proc_exit::Exit> {
        let mut description = SupervisorDescription::from_path(&self.description)
            .map_err(|error| proc_exit::Code::FAILURE.with_message(error_chain(&error)))?;

        if let Some(interface) = self.interface {
            description.interface = interface;
        }
        if let Some(on_failure) = self.on_failure {
            description.on_failure = on_failure;
        }
        if let Some(fallback_shell) = self.fallback_shell {
            description.fallback_shell = fallback_shell;
        }

        Ok(description)
    }
}

fn run() -> proc_exit::ExitResult {
    let description = Args::parse().description()?;

    let activator = description
        .activation
        .activator()
        .map_err(|error| proc_exit::Code::FAILURE.with_message(error_chain(&error)))?;
    let supervisor = Supervisor::new(description, activator)
        .map_err(|error| proc_exit::Code::FAILURE.with_message(error_chain(&error)))?;

    supervise(&supervisor)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("ENTRYPOINT_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run();

    proc_exit::exit(result);
}
