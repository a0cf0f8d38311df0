use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::description::DEFAULT_SHELL;

/// Failures of the environment provisioning tool
#[derive(thiserror::Error, Debug)]
pub enum ProvisionError {
    /// The tool could not be started
    #[error("failed to execute `{program}`")]
    Spawn {
        /// Program that was executed
        program: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// The tool ran but reported a failure
    #[error("`{program}` exited with {status}: {stderr}")]
    Failed {
        /// Program that was executed
        program: String,
        /// Exit status of the tool
        status: std::process::ExitStatus,
        /// What the tool printed on stderr
        stderr: String,
    },
}

/// Dialect `pixi shell-hook --shell` emits for an interpreter.
///
/// Interpreters pixi has no dialect for (such as a POSIX `sh`) get the `bash` one,
/// whose hook only uses `export` and `.` statements.
pub fn shell_dialect(interpreter: &Path) -> &'static str {
    match interpreter.file_name().and_then(|name| name.to_str()) {
        Some("zsh") => "zsh",
        Some("fish") => "fish",
        Some("xonsh") => "xonsh",
        Some("nu") => "nushell",
        _ => "bash",
    }
}

/// Wrapper around the `pixi` command
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Provisioner {
    /// Program to execute (`pixi` by default)
    pub program: PathBuf,

    /// Manifest of the project whose environment is activated
    pub manifest_path: Option<PathBuf>,

    /// Shell dialect the hook is generated for
    pub shell_dialect: String,
}

impl Default for Provisioner {
    fn default() -> Self {
        Self::with_program("pixi")
    }
}

impl Provisioner {
    /// Uses another program instead of `pixi`
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            manifest_path: None,
            shell_dialect: shell_dialect(Path::new(DEFAULT_SHELL)).into(),
        }
    }

    fn command(&self, environment: &str) -> Command {
        let mut command = Command::new(&self.program);
        command.arg("shell-hook");
        if let Some(manifest_path) = &self.manifest_path {
            command.arg("--manifest-path").arg(manifest_path);
        }
        command.args(["--environment", environment, "--shell", self.shell_dialect.as_str()]);

        command
    }

    /// Arguments given to the provisioner to get the activation fragment of an environment
    pub fn shell_hook_args(&self, environment: &str) -> Vec<OsString> {
        self.command(environment)
            .get_args()
            .map(ToOwned::to_owned)
            .collect()
    }

    /// Returns the shell text that activates the given environment, byte for byte
    pub fn shell_hook(&self, environment: &str) -> Result<Vec<u8>, ProvisionError> {
        let program = self.program.display().to_string();
        let output = self
            .command(environment)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ProvisionError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ProvisionError::Failed {
                program,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        Ok(output.stdout)
    }
}
