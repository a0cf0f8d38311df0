#![cfg(unix)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;

use predicates::prelude::*;

use serde_json::{Value, json};

use tempfile::TempDir;

/// Temporary directory holding the description and the stub programs of a test
struct Fixture {
    directory: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            directory: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.directory.path().join(name)
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Writes a stub workload, run through `/bin/sh` so it does not need to be executable
    fn workload(&self, body: &str) -> Vec<String> {
        let script = self.write("workload.sh", body);
        vec!["/bin/sh".into(), script.display().to_string()]
    }

    fn description(&self, description: Value) -> Command {
        let path = self.write("supervisor.json", &description.to_string());
        let mut command = Command::cargo_bin("entrypoint-supervisor").unwrap();
        command
            .arg("--description")
            .arg(path)
            .env("ENTRYPOINT_LOG", "warn");
        command
    }
}

fn exists(path: &Path) -> bool {
    path.try_exists().unwrap()
}

/// Checks that a successful workload neither reports a failure nor starts the fallback shell
#[test]
fn successful_workload_exits_cleanly() {
    let fixture = Fixture::new();
    fixture
        .description(json!({
            "interface": "test",
            "workload": fixture.workload("echo workload ran\nexit 0\n"),
            "fallback_shell": "/bin/sh",
        }))
        .write_stdin("echo fallback shell started\n")
        .assert()
        .success()
        .stdout("workload ran\n")
        .stderr(predicate::str::contains("Main command failed").not());
}

/// Checks that a failing workload is reported, then replaced by an interactive shell
#[test]
fn failing_workload_degrades_to_shell() {
    let fixture = Fixture::new();
    fixture
        .description(json!({
            "interface": "test",
            "workload": fixture.workload("exit 7\n"),
            "fallback_shell": "/bin/sh",
        }))
        .write_stdin("echo fallback shell started\nexit 0\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("fallback shell started"))
        .stderr(predicate::str::contains(
            "Main command failed with exit code 7.",
        ));
}

/// Checks that the `propagate` policy exits with the status of the workload
#[test]
fn propagate_policy_exits_with_workload_status() {
    let fixture = Fixture::new();
    fixture
        .description(json!({
            "interface": "test",
            "workload": fixture.workload("exit 3\n"),
            "on_failure": "propagate",
            "fallback_shell": "/bin/sh",
        }))
        .write_stdin("echo fallback shell started\n")
        .assert()
        .code(3)
        .stdout(predicate::str::contains("fallback shell started").not())
        .stderr(predicate::str::contains(
            "Main command failed with exit code 3.",
        ));
}

/// Checks that the policy can be overridden on the command line
#[test]
fn on_failure_override() {
    let fixture = Fixture::new();
    fixture
        .description(json!({
            "interface": "test",
            "workload": fixture.workload("exit 9\n"),
            "fallback_shell": "/bin/sh",
        }))
        .args(["--on-failure", "propagate"])
        .assert()
        .code(9);
}

/// Checks that the interface reaches the workload as one argument, whatever it contains
#[test]
fn interface_is_a_single_argument() {
    let interface = "k2eg; touch injected $(touch injected) `touch injected` 'quoted' \"double\"";
    let fixture = Fixture::new();
    let injected = fixture.path("injected");
    let mut command = fixture.description(json!({
        "interface": interface,
        "workload": fixture.workload("printf '[%s]\\n' \"$@\"\n"),
        "fallback_shell": "/bin/sh",
    }));
    command
        .current_dir(fixture.directory.path())
        .assert()
        .success()
        .stdout(predicate::str::diff(format!(
            "[--interface]\n[{interface}]\n"
        )));

    assert!(!exists(&injected));
}

/// Checks that the workload is never started when the activation fragment fails
#[test]
fn failing_activation_never_starts_workload() {
    let fixture = Fixture::new();
    let marker = fixture.path("workload-started");
    let fragment = fixture.write("activation.sh", "echo activating\nexit 1\n");
    fixture
        .description(json!({
            "interface": "test",
            "workload": fixture.workload(&format!("touch '{}'\n", marker.display())),
            "fallback_shell": "/bin/sh",
            "activation": { "kind": "fragment", "path": fragment, "shell": "/bin/sh" },
        }))
        .write_stdin("echo fallback shell started\n")
        .assert()
        .failure()
        .stdout(predicate::str::contains("fallback shell started").not())
        .stderr(predicate::str::contains("failed to activate the environment"))
        .stderr(predicate::str::contains("Main command failed").not());

    assert!(!exists(&marker));
}

/// `cpu` environment, `k2eg` interface, workload exiting with 3
#[test]
fn activated_workload_failure_scenario() {
    let fixture = Fixture::new();
    let fragment = fixture.write(
        "activation.sh",
        "export ACTIVATED_ENVIRONMENT=cpu\nexport PATH=\"/opt/envs/cpu/bin:$PATH\"\n",
    );
    fixture
        .description(json!({
            "environment_name": "cpu",
            "interface": "k2eg",
            "workload": fixture.workload(
                "echo \"environment=$ACTIVATED_ENVIRONMENT unbuffered=$PYTHONUNBUFFERED\"\nprintf '[%s]\\n' \"$@\"\nexit 3\n"
            ),
            "fallback_shell": "/bin/sh",
            "environment": { "PYTHONUNBUFFERED": "1" },
            "activation": { "kind": "fragment", "path": fragment, "shell": "/bin/sh" },
        }))
        .write_stdin("echo \"fallback shell in $ACTIVATED_ENVIRONMENT\"\n")
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "environment=cpu unbuffered=1\n[--interface]\n[k2eg]\n",
        ))
        .stdout(predicate::str::contains("fallback shell in cpu"))
        .stderr(predicate::str::contains(
            "Main command failed with exit code 3.",
        ));
}

/// Checks that the interface can be overridden on the command line
#[test]
fn interface_override() {
    let fixture = Fixture::new();
    fixture
        .description(json!({
            "interface": "k2eg",
            "workload": fixture.workload("printf '[%s]\\n' \"$@\"\n"),
        }))
        .args(["--interface", "epics"])
        .assert()
        .success()
        .stdout("[--interface]\n[epics]\n");
}

/// Checks that a missing workload is reported with the status a shell would use
#[test]
fn missing_workload_is_reported_as_127() {
    let fixture = Fixture::new();
    fixture
        .description(json!({
            "interface": "test",
            "workload": [fixture.path("missing").display().to_string()],
            "on_failure": "propagate",
        }))
        .assert()
        .code(127)
        .stderr(predicate::str::contains(
            "Main command failed with exit code 127.",
        ));
}

#[test]
fn missing_description() {
    let fixture = Fixture::new();
    Command::cargo_bin("entrypoint-supervisor")
        .unwrap()
        .arg("--description")
        .arg(fixture.path("missing.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn invalid_interface_in_description() {
    let fixture = Fixture::new();
    fixture
        .description(json!({ "interface": "" }))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse"));
}

/// Checks that the default log level leaves the diagnostic as the first line on stderr
#[test]
fn diagnostic_is_the_first_line_by_default() {
    let fixture = Fixture::new();
    fixture
        .description(json!({
            "interface": "test",
            "workload": fixture.workload("exit 5\n"),
            "fallback_shell": "/bin/sh",
        }))
        .env_remove("ENTRYPOINT_LOG")
        .write_stdin("exit 0\n")
        .assert()
        .success()
        .stderr(predicate::str::starts_with(
            "Main command failed with exit code 5.\n",
        ))
        .stderr(predicate::str::contains("INFO").not())
        .stderr(predicate::str::contains("WARN").not());
}

#[test]
fn empty_workload_in_description() {
    let fixture = Fixture::new();
    fixture
        .description(json!({ "interface": "k2eg", "workload": [] }))
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "the workload command must not be empty",
        ));
}
