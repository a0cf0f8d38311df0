use std::path::PathBuf;

use entrypoint_supervisor::ProvisionError;

/// Failures while assembling the entrypoint; all of them abort the image build
#[derive(thiserror::Error, Debug)]
pub enum AssemblyError {
    /// The provisioner could not produce the activation fragment
    #[error("failed to obtain the activation fragment of environment `{environment}`")]
    Provision {
        /// Environment that was requested
        environment: String,
        /// Underlying provisioner error
        #[source]
        source: ProvisionError,
    },
    /// The activation fragment could not be read
    #[error("failed to read the activation fragment from `{}`", path.display())]
    ReadFragment {
        /// Location of the fragment (`-` for stdin)
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// An artifact could not be written
    #[error("failed to write `{}`", path.display())]
    Write {
        /// Location of the artifact
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// The supervisor description would refer to a fragment that was not captured
    #[error(
        "cannot describe the supervisor with a fragment read from `{}`; use `--supervisor-dir` to capture it",
        path.display()
    )]
    UncapturedFragment {
        /// Location of the fragment (`-` for stdin)
        path: PathBuf,
    },
    /// The supervisor description could not be encoded
    #[error("failed to encode the supervisor description")]
    Encode(#[from] serde_json::Error),
}
