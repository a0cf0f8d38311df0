//! Activation of the provisioned environment.
//!
//! The activation fragment is opaque shell text produced by the provisioning tool.
//! It is never parsed: it is evaluated by a shell and the environment that results
//! from it is captured into an [`EnvironmentHandle`].

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::provisioner::{ProvisionError, Provisioner};

/// Marks the start of the captured environment in the output of the activation shell
const ENVIRONMENT_MARKER: &[u8] = b"\0--entrypoint-environment--\0";

/// Failures while activating the environment
#[derive(thiserror::Error, Debug)]
pub enum ActivationError {
    /// The activation fragment could not be read
    #[error("failed to read the activation fragment `{}`", path.display())]
    Read {
        /// Location of the fragment
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// The provisioning tool could not produce the activation fragment
    #[error("failed to obtain the activation fragment")]
    Provision(#[from] ProvisionError),
    /// The shell evaluating the fragment could not be started
    #[error("failed to execute the activation shell `{}`", shell.display())]
    Spawn {
        /// Shell that was executed
        shell: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// The fragment itself failed
    #[error("the activation fragment failed with {0}")]
    Failed(std::process::ExitStatus),
    /// The fragment terminated the shell before the environment could be captured
    #[error("the activation fragment did not return control to the supervisor")]
    Incomplete,
}

/// Environment variables established by an activation
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct EnvironmentHandle {
    vars: BTreeMap<OsString, OsString>,
}

impl EnvironmentHandle {
    /// Captures the environment of the current process
    pub fn inherited() -> Self {
        Self {
            vars: std::env::vars_os().collect(),
        }
    }

    /// Returns the value of a variable
    pub fn get(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
        self.vars.get(key.as_ref()).map(OsString::as_os_str)
    }

    /// Sets a variable, replacing any previous value
    pub fn set(&mut self, key: impl Into<OsString>, value: impl Into<OsString>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Iterates over the variables in a stable order
    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars
            .iter()
            .map(|(key, value)| (key.as_os_str(), value.as_os_str()))
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variable is set
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Parses the output of `env -0`
    fn from_env_dump(dump: &[u8]) -> Self {
        let vars = dump
            .split(|&byte| byte == b'\0')
            .filter_map(|entry| {
                let separator = entry.iter().position(|&byte| byte == b'=')?;
                let (key, value) = entry.split_at(separator);
                let value = value.get(1..)?;
                if key.is_empty() {
                    return None;
                }

                Some((os_string(key), os_string(value)))
            })
            .collect();

        Self { vars }
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        fn os_string(bytes: &[u8]) -> OsString {
            use std::os::unix::ffi::OsStrExt;

            OsStr::from_bytes(bytes).to_owned()
        }
    } else {
        fn os_string(bytes: &[u8]) -> OsString {
            String::from_utf8_lossy(bytes).into_owned().into()
        }
    }
}

/// Something able to establish the environment the workload runs in
pub trait EnvironmentActivator {
    /// Activates the environment.
    ///
    /// A failure is fatal: the workload must not be started.
    fn activate(&self) -> Result<EnvironmentHandle, ActivationError>;
}

/// Uses the environment of the supervisor as is
#[derive(Default)]
pub struct InheritedEnvironment;

impl EnvironmentActivator for InheritedEnvironment {
    fn activate(&self) -> Result<EnvironmentHandle, ActivationError> {
        Ok(EnvironmentHandle::inherited())
    }
}

/// Evaluates an activation fragment with a shell and captures the resulting environment
pub struct FragmentActivator {
    shell: PathBuf,
    fragment: Vec<u8>,
}

impl FragmentActivator {
    /// Evaluates `fragment` with `shell`
    pub fn new(shell: impl Into<PathBuf>, fragment: impl Into<Vec<u8>>) -> Self {
        Self {
            shell: shell.into(),
            fragment: fragment.into(),
        }
    }

    /// Reads the fragment from a file
    pub fn from_file(shell: impl Into<PathBuf>, path: &Path) -> Result<Self, ActivationError> {
        let fragment = std::fs::read(path).map_err(|source| ActivationError::Read {
            path: path.to_owned(),
            source,
        })?;

        Ok(Self::new(shell, fragment))
    }

    /// Script given to the shell: the fragment with its stdout sent to stderr, then a dump of the environment
    fn script(&self) -> OsString {
        let mut script = b"{\n".to_vec();
        script.extend_from_slice(&self.fragment);
        script.extend_from_slice(
            b"\n} 1>&2\nprintf '\\0--entrypoint-environment--\\0'\nexec env -0\n",
        );

        os_string(&script)
    }
}

impl EnvironmentActivator for FragmentActivator {
    fn activate(&self) -> Result<EnvironmentHandle, ActivationError> {
        tracing::debug!(shell = %self.shell.display(), "evaluating the activation fragment");

        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(self.script())
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|source| ActivationError::Spawn {
                shell: self.shell.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ActivationError::Failed(output.status));
        }

        let dump = output
            .stdout
            .windows(ENVIRONMENT_MARKER.len())
            .position(|window| window == ENVIRONMENT_MARKER)
            .and_then(|start| output.stdout.get(start + ENVIRONMENT_MARKER.len()..))
            .ok_or(ActivationError::Incomplete)?;

        Ok(EnvironmentHandle::from_env_dump(dump))
    }
}

/// Asks the provisioning tool for the activation fragment of an environment, then evaluates it
pub struct ProvisionerActivator {
    provisioner: Provisioner,
    environment: String,
    shell: PathBuf,
}

impl ProvisionerActivator {
    /// Activates `environment` with the hook produced by `provisioner`, evaluated by `shell`
    pub fn new(
        provisioner: Provisioner,
        environment: impl Into<String>,
        shell: impl Into<PathBuf>,
    ) -> Self {
        Self {
            provisioner,
            environment: environment.into(),
            shell: shell.into(),
        }
    }
}

impl EnvironmentActivator for ProvisionerActivator {
    fn activate(&self) -> Result<EnvironmentHandle, ActivationError> {
        let fragment = self.provisioner.shell_hook(&self.environment)?;

        FragmentActivator::new(&self.shell, fragment).activate()
    }
}
