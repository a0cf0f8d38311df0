use std::convert::Infallible;
use std::path::Path;
use std::process::Command;

use crate::activation::EnvironmentHandle;

pub(super) fn exec_interactive(
    program: &Path,
    env: &EnvironmentHandle,
) -> Result<Infallible, proc_exit::Exit> {
    let exit_status = Command::new(program)
        .arg("-i")
        .env_clear()
        .envs(env.iter())
        .status()
        .map_err(|_| {
            proc_exit::Code::new(126).with_message(format!(
                "Failed to execute the fallback shell `{}`",
                program.display()
            ))
        })?;

    proc_exit::Code::from_status(exit_status).process_exit()
}
