use std::convert::Infallible;
use std::ffi::{CString, OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use nix::unistd::execve;

use crate::activation::EnvironmentHandle;

fn c_string(bytes: &[u8]) -> Result<CString, proc_exit::Exit> {
    CString::new(bytes).map_err(|_| {
        proc_exit::Code::FAILURE.with_message("Failed to pass a value containing a NUL byte")
    })
}

pub(super) fn exec_interactive(
    program: &Path,
    env: &EnvironmentHandle,
) -> Result<Infallible, proc_exit::Exit> {
    let path = c_string(program.as_os_str().as_bytes())?;
    let args = [program.as_os_str(), OsStr::new("-i")]
        .into_iter()
        .map(|arg| c_string(arg.as_bytes()))
        .collect::<Result<Vec<CString>, _>>()?;
    let env = env
        .iter()
        .map(|(key, value)| {
            let mut entry = OsString::from(key);
            entry.push("=");
            entry.push(value);

            c_string(entry.as_bytes())
        })
        .collect::<Result<Vec<CString>, _>>()?;

    let errno = match execve(&path, &args, &env) {
        Ok(never) => match never {},
        Err(errno) => errno,
    };

    Err(proc_exit::Code::new(126).with_message(format!(
        "Failed to execute the fallback shell `{}`: {errno}",
        program.display()
    )))
}
