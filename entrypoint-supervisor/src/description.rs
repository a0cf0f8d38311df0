use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::activation::{
    ActivationError, EnvironmentActivator, FragmentActivator, InheritedEnvironment,
    ProvisionerActivator,
};
use crate::interface::InterfaceName;
use crate::provisioner::{Provisioner, shell_dialect};

/// Default location of the description baked into the image
pub const DEFAULT_DESCRIPTION_PATH: &str = "/usr/local/share/entrypoint/supervisor.json";

/// Default shell used to evaluate activation fragments and to degrade into
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// What happens once the workload fails
#[derive(clap::ValueEnum, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    /// Replaces the supervisor with an interactive shell so the container stays attachable
    #[default]
    Shell,
    /// Exits with the status of the workload
    Propagate,
}

/// Where the activation fragment comes from
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Activation {
    /// The environment of the supervisor is used as is
    #[default]
    Inherit,
    /// A fragment captured at build time
    Fragment {
        /// Location of the fragment
        path: PathBuf,
        /// Shell evaluating the fragment
        #[serde(default = "default_shell")]
        shell: PathBuf,
    },
    /// A fragment requested from the provisioning tool at startup
    Provisioner {
        /// Program to execute
        #[serde(default = "default_provisioner_program")]
        program: PathBuf,
        /// Manifest of the project whose environment is activated
        #[serde(default, skip_serializing_if = "Option::is_none")]
        manifest_path: Option<PathBuf>,
        /// Environment to activate
        environment: String,
        /// Shell evaluating the fragment
        #[serde(default = "default_shell")]
        shell: PathBuf,
        /// Dialect of the hook, derived from `shell` when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shell_dialect: Option<String>,
    },
}

impl Activation {
    /// Builds the activator matching this source
    pub fn activator(&self) -> Result<Box<dyn EnvironmentActivator>, ActivationError> {
        let activator: Box<dyn EnvironmentActivator> = match self {
            Self::Inherit => Box::new(InheritedEnvironment),
            Self::Fragment { path, shell } => Box::new(FragmentActivator::from_file(shell, path)?),
            Self::Provisioner {
                program,
                manifest_path,
                environment,
                shell,
                shell_dialect: dialect,
            } => {
                let provisioner = Provisioner {
                    manifest_path: manifest_path.clone(),
                    shell_dialect: dialect
                        .clone()
                        .unwrap_or_else(|| shell_dialect(shell).to_owned()),
                    ..Provisioner::with_program(program)
                };

                Box::new(ProvisionerActivator::new(provisioner, environment, shell))
            }
        };

        Ok(activator)
    }
}

fn default_shell() -> PathBuf {
    DEFAULT_SHELL.into()
}

fn default_provisioner_program() -> PathBuf {
    Provisioner::default().program
}

/// Default command of the workload (`python -m online_model.run`)
pub fn default_workload() -> Vec<String> {
    ["python", "-m", "online_model.run"]
        .into_iter()
        .map(ToOwned::to_owned)
        .collect()
}

/// Failures while loading a description
#[derive(thiserror::Error, Debug)]
pub enum DescriptionError {
    /// The file could not be read
    #[error("failed to read `{}`", path.display())]
    Read {
        /// Location of the description
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// The file is not a valid description
    #[error("failed to parse `{}`", path.display())]
    Parse {
        /// Location of the description
        path: PathBuf,
        /// Underlying parsing error
        #[source]
        source: serde_json::Error,
    },
}

/// Everything the supervisor needs to know, baked into the image at build time.
///
/// # Example
///
/// ```json
/// {
///   "environment_name": "cpu",
///   "interface": "k2eg",
///   "workload": ["python", "-m", "online_model.run"],
///   "on_failure": "shell",
///   "fallback_shell": "/bin/bash",
///   "environment": { "PYTHONUNBUFFERED": "1" },
///   "activation": { "kind": "fragment", "path": "/usr/local/share/entrypoint/activation.sh" }
/// }
/// ```
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct SupervisorDescription {
    /// Name of the provisioned environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_name: Option<String>,

    /// Value given to the workload with `--interface`
    pub interface: InterfaceName,

    /// Program and leading arguments of the workload
    #[serde(default = "default_workload")]
    pub workload: Vec<String>,

    /// What happens when the workload fails
    #[serde(default)]
    pub on_failure: OnFailure,

    /// Interactive shell the supervisor degrades into
    #[serde(default = "default_shell")]
    pub fallback_shell: PathBuf,

    /// Variables set for the workload on top of the activated environment
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    /// Source of the activation fragment
    #[serde(default)]
    pub activation: Activation,
}

impl SupervisorDescription {
    /// Describes a supervisor running the default workload with `interface`
    pub fn new(interface: InterfaceName) -> Self {
        Self {
            environment_name: None,
            interface,
            workload: default_workload(),
            on_failure: OnFailure::default(),
            fallback_shell: default_shell(),
            environment: BTreeMap::new(),
            activation: Activation::default(),
        }
    }

    /// Loads a description
    pub fn from_path(path: &Path) -> Result<Self, DescriptionError> {
        let contents = std::fs::read(path).map_err(|source| DescriptionError::Read {
            path: path.to_owned(),
            source,
        })?;
        serde_json::from_slice(&contents).map_err(|source| DescriptionError::Parse {
            path: path.to_owned(),
            source,
        })
    }
}
