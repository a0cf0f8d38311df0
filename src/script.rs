use std::borrow::Cow;
use std::path::{Path, PathBuf};

use itertools::Itertools;

use sha3::{Digest, Sha3_256};

use entrypoint_supervisor::description::{DEFAULT_SHELL, default_workload};
use entrypoint_supervisor::{InterfaceName, OnFailure};

use crate::error::AssemblyError;

/// Parameters fixed when the image is built
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BuildParameters {
    /// Environment whose activation fragment is embedded
    pub environment_name: String,
    /// Value given to the workload with `--interface`
    pub interface_name: InterfaceName,
}

/// Shape of the control template
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ScriptOptions {
    /// Interpreter selected by the first line
    pub interpreter: PathBuf,
    /// Program and leading arguments of the workload
    pub workload: Vec<String>,
    /// What happens when the workload fails
    pub on_failure: OnFailure,
    /// Interactive shell started when the workload fails
    pub fallback_shell: PathBuf,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            interpreter: DEFAULT_SHELL.into(),
            workload: default_workload(),
            on_failure: OnFailure::default(),
            fallback_shell: DEFAULT_SHELL.into(),
        }
    }
}

fn quote(word: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(Cow::Borrowed(word))
}

fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy()).into_owned()
}

/// The executable started when the container starts.
///
/// It is made of an interpreter line, the activation fragment inserted verbatim,
/// a `main` routine running the workload, and a guarded call of that routine:
///
/// ```sh
/// #!/bin/bash
/// # ...activation fragment...
/// main() {
///     python -m online_model.run --interface k2eg
/// }
///
/// main || {
///     status=$?
///     echo "Main command failed with exit code ${status}." >&2
///     exec /bin/bash -i
/// }
/// ```
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct EntrypointScript {
    contents: Vec<u8>,
}

impl EntrypointScript {
    /// Concatenates the interpreter line, the activation fragment and the control template.
    ///
    /// The fragment is copied byte for byte, whatever its encoding.
    pub fn assemble(interface: &InterfaceName, fragment: &[u8], options: &ScriptOptions) -> Self {
        let mut contents = format!("#!{}\n", options.interpreter.display()).into_bytes();

        contents.extend_from_slice(fragment);
        if fragment.last().is_some_and(|&byte| byte != b'\n') {
            contents.push(b'\n');
        }

        let invocation = options
            .workload
            .iter()
            .map(|word| quote(word))
            .chain([
                Cow::Borrowed(InterfaceName::FLAG),
                quote(interface.as_str()),
            ])
            .join(" ");
        let on_failure = match options.on_failure {
            OnFailure::Shell => format!("exec {} -i", quote_path(&options.fallback_shell)),
            OnFailure::Propagate => r#"exit "${status}""#.to_owned(),
        };

        let control = format!(
            r#"main() {{
    {invocation}
}}

main || {{
    status=$?
    echo "Main command failed with exit code ${{status}}." >&2
    {on_failure}
}}
"#
        );
        contents.extend_from_slice(control.as_bytes());

        Self { contents }
    }

    /// Bytes of the script
    pub fn as_bytes(&self) -> &[u8] {
        &self.contents
    }

    /// SHA3-256 of the script, in hexadecimal
    pub fn digest(&self) -> String {
        format!("{:x}", Sha3_256::digest(&self.contents))
    }

    /// Writes the script and marks it executable
    pub fn write(&self, path: &Path) -> Result<(), AssemblyError> {
        let error = |source| AssemblyError::Write {
            path: path.to_owned(),
            source,
        };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(error)?;
        }
        std::fs::write(path, &self.contents).map_err(error)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
                .map_err(error)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use entrypoint_supervisor::{InterfaceName, OnFailure};

    use super::{EntrypointScript, ScriptOptions};

    const FRAGMENT: &[u8] = b"export PATH=\"/app/.pixi/envs/cpu/bin:${PATH}\"\nexport CONDA_DEFAULT_ENV=cpu\n";

    fn interface(name: &str) -> InterfaceName {
        InterfaceName::new(name).unwrap()
    }

    fn text(script: &EntrypointScript) -> &str {
        std::str::from_utf8(script.as_bytes()).unwrap()
    }

    #[test]
    fn default_layout() {
        let script =
            EntrypointScript::assemble(&interface("k2eg"), FRAGMENT, &ScriptOptions::default());
        assert_eq!(
            text(&script),
            r#"#!/bin/bash
export PATH="/app/.pixi/envs/cpu/bin:${PATH}"
export CONDA_DEFAULT_ENV=cpu
main() {
    python -m online_model.run --interface k2eg
}

main || {
    status=$?
    echo "Main command failed with exit code ${status}." >&2
    exec /bin/bash -i
}
"#
        );
    }

    #[test]
    fn propagate_layout() {
        let options = ScriptOptions {
            on_failure: OnFailure::Propagate,
            ..ScriptOptions::default()
        };
        let script = EntrypointScript::assemble(&interface("epics"), b"", &options);
        assert_eq!(
            text(&script),
            r#"#!/bin/bash
main() {
    python -m online_model.run --interface epics
}

main || {
    status=$?
    echo "Main command failed with exit code ${status}." >&2
    exit "${status}"
}
"#
        );
    }

    #[test]
    fn fragment_is_inserted_verbatim() {
        let fragment = "export A='x y'\n# trailing comment without newline";
        let script = EntrypointScript::assemble(
            &interface("test"),
            fragment.as_bytes(),
            &ScriptOptions::default(),
        );
        let body = text(&script).strip_prefix("#!/bin/bash\n").unwrap();
        assert!(body.starts_with(fragment));
        assert!(body[fragment.len()..].starts_with("\nmain() {\n"));
    }

    #[test]
    fn fragment_bytes_are_not_reencoded() {
        let fragment = b"export LABEL='caf\xe9'\n";
        let script =
            EntrypointScript::assemble(&interface("k2eg"), fragment, &ScriptOptions::default());
        let body = script.as_bytes().strip_prefix(b"#!/bin/bash\n").unwrap();
        assert!(body.starts_with(fragment));
        assert!(body[fragment.len()..].starts_with(b"main() {\n"));
    }

    #[test]
    fn interface_is_quoted() {
        let script = EntrypointScript::assemble(
            &interface("k2eg; rm -rf ./sentinel $(id) `id` it's"),
            b"",
            &ScriptOptions::default(),
        );
        assert!(
            text(&script).contains(r#"--interface 'k2eg; rm -rf ./sentinel $(id) `id` it'\''s'"#),
            "{}",
            text(&script)
        );
    }

    #[test]
    fn workload_and_shell_are_quoted() {
        let options = ScriptOptions {
            interpreter: "/bin/sh".into(),
            workload: vec!["/opt/my model/run".into(), "--flag=$HOME".into()],
            on_failure: OnFailure::Shell,
            fallback_shell: "/opt/debug shell".into(),
        };
        let script = EntrypointScript::assemble(&interface("k2eg"), b"", &options);
        assert!(text(&script).starts_with("#!/bin/sh\n"));
        assert!(
            text(&script).contains("    '/opt/my model/run' '--flag=$HOME' --interface k2eg\n")
        );
        assert!(text(&script).contains("    exec '/opt/debug shell' -i\n"));
    }

    #[test]
    fn assembling_is_deterministic() {
        let options = ScriptOptions::default();
        let first = EntrypointScript::assemble(&interface("k2eg"), FRAGMENT, &options);
        let second = EntrypointScript::assemble(&interface("k2eg"), FRAGMENT, &options);
        assert_eq!(first.as_bytes(), second.as_bytes());
        assert_eq!(first.digest(), second.digest());

        let other = EntrypointScript::assemble(&interface("epics"), FRAGMENT, &options);
        assert_ne!(first.digest(), other.digest());
    }

    #[cfg(unix)]
    #[test]
    fn write_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("app").join("entrypoint.sh");
        let script =
            EntrypointScript::assemble(&interface("k2eg"), FRAGMENT, &ScriptOptions::default());
        script.write(&path).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), script.as_bytes());
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
