//! Replacement of the supervisor by the interactive fallback shell.

use std::convert::Infallible;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::activation::EnvironmentHandle;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        use self::unix as imp;
    } else {
        mod generic;
        use self::generic as imp;
    }
}

/// Replaces the current process with `shell -i`, running with the variables of `env`.
///
/// On unix this never returns on success: the process image is substituted and keeps
/// its pid and signal disposition. Elsewhere the shell is spawned, awaited, and the
/// supervisor exits with its status.
pub fn replace_with_shell(
    shell: &Path,
    env: &EnvironmentHandle,
) -> Result<Infallible, proc_exit::Exit> {
    let program = resolve(shell, env.get("PATH")).ok_or_else(|| {
        proc_exit::Code::new(127).with_message(format!(
            "Failed to find the fallback shell `{}`",
            shell.display()
        ))
    })?;

    tracing::debug!(shell = %program.display(), "starting the interactive fallback shell");

    imp::exec_interactive(&program, env)
}

/// Resolves a program name the way `execvp` does, using the given `PATH`
fn resolve(program: &Path, path: Option<&OsStr>) -> Option<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        return Some(program.to_owned());
    }

    std::env::split_paths(path?)
        .map(|directory| directory.join(program))
        .find(|candidate| candidate.is_file())
}
