use std::path::PathBuf;

use clap::ColorChoice;

use entrypoint_supervisor::description::DEFAULT_SHELL;
use entrypoint_supervisor::{InterfaceName, OnFailure};

/// Type of information to print on stdout
#[derive(clap::ValueEnum, Clone, Copy, PartialEq, Eq)]
pub enum Print {
    /// Prints the entrypoint script instead of writing it
    Script,
    /// Prints the description of the native supervisor instead of writing it
    Description,
}

/// Assembles the entrypoint script of a container image
#[derive(clap::Parser)]
#[command(name = "entrypoint-assembler", version, author, about, long_about)]
pub struct Args {
    /// Environment whose activation fragment is embedded in the script
    #[arg(
        long,
        value_name = "NAME",
        env = "ENTRYPOINT_ENVIRONMENT",
        default_value = "default"
    )]
    pub environment: String,

    /// Value given to the workload with `--interface`
    #[arg(long, value_name = "NAME", env = "ENTRYPOINT_INTERFACE")]
    pub interface: InterfaceName,

    /// Reads the activation fragment from a file (`-` for stdin) instead of asking the provisioner
    #[arg(long, value_name = "PATH")]
    pub activation_fragment: Option<PathBuf>,

    /// Program producing the activation fragment with `shell-hook`
    #[arg(long, value_name = "PROGRAM", default_value = "pixi")]
    pub provisioner: PathBuf,

    /// Manifest given to the provisioner
    #[arg(long, value_name = "PATH")]
    pub manifest_path: Option<PathBuf>,

    /// Dialect of the `shell-hook` (derived from `--interpreter` by default)
    #[arg(long, value_name = "SHELL")]
    pub shell_dialect: Option<String>,

    /// Location of the entrypoint script
    #[arg(long, value_name = "PATH", default_value = "/app/entrypoint.sh")]
    pub output: PathBuf,

    /// Interpreter selected by the first line of the script
    #[arg(long, value_name = "PATH", default_value = DEFAULT_SHELL)]
    pub interpreter: PathBuf,

    /// What happens when the workload fails
    #[arg(long, value_name = "POLICY", default_value = "shell")]
    pub on_failure: OnFailure,

    /// Interactive shell started when the workload fails
    #[arg(long, value_name = "PATH", default_value = DEFAULT_SHELL)]
    pub fallback_shell: PathBuf,

    /// Also writes `supervisor.json` and `activation.sh` for `entrypoint-supervisor` to this directory
    #[arg(long, value_name = "DIR")]
    pub supervisor_dir: Option<PathBuf>,

    /// Variable set for the workload by `entrypoint-supervisor`
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Print information on stdout
    #[arg(long, value_name = "INFORMATION")]
    pub print: Option<Print>,

    /// Color preferences for program output
    #[arg(long, value_name = "WHEN", default_value = "auto")]
    pub color: ColorChoice,

    /// Workload command (defaults to `python -m online_model.run`)
    #[arg(raw = true)]
    pub workload: Vec<String>,
}

fn parse_key_value(value: &str) -> Result<(String, String), String> {
    let (key, value) = value
        .split_once('=')
        .ok_or_else(|| format!("`{value}` is not of the form KEY=VALUE"))?;
    if key.is_empty() {
        return Err("the variable name must not be empty".into());
    }

    Ok((key.to_owned(), value.to_owned()))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use entrypoint_supervisor::OnFailure;

    use super::{Args, parse_key_value};

    #[test]
    fn key_value() {
        assert_eq!(
            parse_key_value("EPICS_CA_AUTO_ADDR_LIST=NO").unwrap(),
            ("EPICS_CA_AUTO_ADDR_LIST".into(), "NO".into())
        );
        assert_eq!(
            parse_key_value("EMPTY=").unwrap(),
            ("EMPTY".into(), String::new())
        );
        assert_eq!(
            parse_key_value("URL=a=b").unwrap(),
            ("URL".into(), "a=b".into())
        );
        parse_key_value("NO_SEPARATOR").unwrap_err();
        parse_key_value("=value").unwrap_err();
    }

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["entrypoint-assembler", "--interface", "k2eg"]).unwrap();
        assert_eq!(args.interface.as_str(), "k2eg");
        assert_eq!(args.on_failure, OnFailure::Shell);
        assert_eq!(args.output.to_str(), Some("/app/entrypoint.sh"));
        assert!(args.workload.is_empty());
        assert_eq!(args.shell_dialect, None);
    }

    #[test]
    fn workload_after_separator() {
        let args = Args::try_parse_from([
            "entrypoint-assembler",
            "--interface",
            "epics",
            "--on-failure",
            "propagate",
            "--",
            "python",
            "-m",
            "online_model.run",
        ])
        .unwrap();
        assert_eq!(args.on_failure, OnFailure::Propagate);
        assert_eq!(args.workload, ["python", "-m", "online_model.run"]);
    }

    #[test]
    fn empty_interface_is_rejected() {
        assert!(Args::try_parse_from(["entrypoint-assembler", "--interface", ""]).is_err());
    }
}
