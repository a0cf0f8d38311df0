use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;

use clap::ColorChoice;

use console::style;

use entrypoint_supervisor::description::default_workload;
use entrypoint_supervisor::provisioner::shell_dialect;
use entrypoint_supervisor::{Activation, Provisioner, SupervisorDescription};

use crate::cli::{Args, Print};
use crate::error::AssemblyError;
use crate::script::{BuildParameters, EntrypointScript, ScriptOptions};

/// Name of the fragment written next to the supervisor description
const ACTIVATION_FILENAME: &str = "activation.sh";

/// Name of the supervisor description
const DESCRIPTION_FILENAME: &str = "supervisor.json";

/// Where the activation fragment comes from
pub enum FragmentSource {
    /// A file, or stdin for `-`
    File(PathBuf),
    /// The `shell-hook` of the provisioner
    Provisioner(Provisioner),
}

impl FragmentSource {
    /// Obtains the activation fragment of `environment`, without decoding it
    pub fn fragment(&self, environment: &str) -> Result<Vec<u8>, AssemblyError> {
        match self {
            Self::File(path) => {
                let error = |source| AssemblyError::ReadFragment {
                    path: path.clone(),
                    source,
                };
                if path == Path::new("-") {
                    let mut fragment = Vec::new();
                    std::io::stdin()
                        .read_to_end(&mut fragment)
                        .map_err(error)?;
                    Ok(fragment)
                } else {
                    std::fs::read(path).map_err(error)
                }
            }
            Self::Provisioner(provisioner) => {
                provisioner
                    .shell_hook(environment)
                    .map_err(|source| AssemblyError::Provision {
                        environment: environment.to_owned(),
                        source,
                    })
            }
        }
    }
}

/// Assembles the entrypoint of an image, and optionally what the native supervisor needs
pub struct Assembler {
    parameters: BuildParameters,
    source: FragmentSource,
    options: ScriptOptions,
    output: PathBuf,
    supervisor_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
    print: Option<Print>,
}

impl Assembler {
    pub fn from_args(args: Args) -> anyhow::Result<Self> {
        if args.color == ColorChoice::Never {
            console::set_colors_enabled(false);
        } else if args.color == ColorChoice::Always {
            console::set_colors_enabled(true);
        }

        let source = match args.activation_fragment {
            Some(path) => FragmentSource::File(path),
            None => FragmentSource::Provisioner(Provisioner {
                manifest_path: args.manifest_path,
                shell_dialect: args
                    .shell_dialect
                    .unwrap_or_else(|| shell_dialect(&args.interpreter).to_owned()),
                ..Provisioner::with_program(args.provisioner)
            }),
        };

        let workload = if args.workload.is_empty() {
            default_workload()
        } else {
            args.workload
        };

        Ok(Self {
            parameters: BuildParameters {
                environment_name: args.environment,
                interface_name: args.interface,
            },
            source,
            options: ScriptOptions {
                interpreter: args.interpreter,
                workload,
                on_failure: args.on_failure,
                fallback_shell: args.fallback_shell,
            },
            output: args.output,
            supervisor_dir: args.supervisor_dir,
            env: args.env.into_iter().collect(),
            print: args.print,
        })
    }

    fn description(&self, activation: Activation) -> SupervisorDescription {
        SupervisorDescription {
            environment_name: Some(self.parameters.environment_name.clone()),
            interface: self.parameters.interface_name.clone(),
            workload: self.options.workload.clone(),
            on_failure: self.options.on_failure,
            fallback_shell: self.options.fallback_shell.clone(),
            environment: self.env.clone(),
            activation,
        }
    }

    fn write_supervisor_files(&self, directory: &Path, fragment: &[u8]) -> anyhow::Result<PathBuf> {
        let error = |source| AssemblyError::Write {
            path: directory.to_owned(),
            source,
        };
        std::fs::create_dir_all(directory).map_err(error)?;

        let fragment_path = directory.join(ACTIVATION_FILENAME);
        std::fs::write(&fragment_path, fragment).map_err(|source| AssemblyError::Write {
            path: fragment_path.clone(),
            source,
        })?;

        let description = self.description(Activation::Fragment {
            path: fragment_path,
            shell: self.options.interpreter.clone(),
        });
        let encoded = serde_json::to_vec_pretty(&description).map_err(AssemblyError::from)?;
        let description_path = directory.join(DESCRIPTION_FILENAME);
        std::fs::write(&description_path, encoded).map_err(|source| AssemblyError::Write {
            path: description_path.clone(),
            source,
        })?;

        Ok(description_path)
    }

    /// Activation the native supervisor performs at startup when it is not given a captured fragment.
    ///
    /// Only the provisioner can be asked again at startup; a fragment read from a file or stdin
    /// exists at build time only.
    fn startup_activation(&self) -> Result<Activation, AssemblyError> {
        match &self.source {
            FragmentSource::File(path) => {
                Err(AssemblyError::UncapturedFragment { path: path.clone() })
            }
            FragmentSource::Provisioner(provisioner) => Ok(Activation::Provisioner {
                program: provisioner.program.clone(),
                manifest_path: provisioner.manifest_path.clone(),
                environment: self.parameters.environment_name.clone(),
                shell: self.options.interpreter.clone(),
                shell_dialect: Some(provisioner.shell_dialect.clone()),
            }),
        }
    }

    pub fn assemble(&self) -> anyhow::Result<()> {
        let environment = &self.parameters.environment_name;
        let interface = &self.parameters.interface_name;

        if self.print == Some(Print::Description) {
            let description = self.description(self.startup_activation()?);
            let encoded = serde_json::to_string_pretty(&description)
                .context("Failed to encode the supervisor description")?;
            println!("{encoded}");

            return Ok(());
        }

        if self.print.is_none() {
            println!(
                "{:>12} entrypoint for environment `{environment}` (interface `{interface}`)",
                style("Assembling").bold().green(),
            );
        }

        let fragment = self.source.fragment(environment)?;
        let script = EntrypointScript::assemble(interface, &fragment, &self.options);

        if self.print == Some(Print::Script) {
            std::io::stdout()
                .write_all(script.as_bytes())
                .context("Failed to print the entrypoint script")?;

            return Ok(());
        }

        script.write(&self.output)?;

        if let Some(directory) = self.supervisor_dir.as_deref() {
            let description_path = self.write_supervisor_files(directory, &fragment)?;
            println!(
                "{:>12} supervisor description ({})",
                style("Writing").bold().green(),
                description_path.display()
            );
        }

        println!(
            "{:>12} ({}) sha3-256:{}",
            style("Finished").bold().green(),
            self.output.display(),
            script.digest()
        );

        Ok(())
    }
}
