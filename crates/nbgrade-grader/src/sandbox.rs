//! Wraps the external sandboxing binary with the fixed resource-limit policy
//! applied to every user-code execution, and supports a host-side timeout
//! backstop that captures output after killing the child.

use crate::error::SandboxError;
use std::{
    io::Read,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

/// Wall-clock budget for one unit-test file.
pub const UNIT_TEST_LIMIT: Duration = Duration::from_secs(30);
/// Wall-clock budget for one inline test.
pub const INLINE_TEST_LIMIT: Duration = Duration::from_secs(10);

// The sandbox enforces its own wall clock; the host-side backstop only fires
// when the sandbox fails to.
const KILL_GRACE: Duration = Duration::from_secs(5);

const ADDRESS_SPACE_MB: &str = "700";

/// Invoker for the sandbox binary.
#[derive(Debug, Clone)]
pub struct Sandbox {
    path: PathBuf,
    python: PathBuf,
}

/// The captured result of one sandboxed run. stdout and stderr are merged.
#[derive(Debug)]
pub struct SandboxRun {
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Set when the host-side backstop killed the process.
    pub killed: bool,
    pub output: String,
}

impl Sandbox {
    pub fn new(path: impl Into<PathBuf>, python: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            python: python.into(),
        }
    }

    /// Runs the python interpreter with the given arguments inside the
    /// sandbox, in the given working directory, under the given wall-clock
    /// limit. A non-zero exit is a classified result, not an error; only
    /// exec-level failures error.
    pub fn run_python(
        &self,
        cwd: &Path,
        args: &[&str],
        limit: Duration,
    ) -> Result<SandboxRun, SandboxError> {
        let mut command = Command::new(&self.path);
        command
            .arg("-Mo")
            .args(["--time_limit", &limit.as_secs().to_string()])
            .args(["--max_cpus", "1"])
            .args(["--rlimit_as", ADDRESS_SPACE_MB])
            .args(["--env", "LANG=en_US.UTF-8"])
            .arg("--disable_proc")
            .args(["--cwd", &cwd.to_string_lossy()])
            .args(["--user", "nobody"])
            .args(["--group", "nogroup"])
            .arg("--iface_no_lo")
            .arg("--")
            .arg(&self.python)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        log::debug!("about to execute {command:?}");

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SandboxError::NotFound {
                    path: self.path.clone(),
                    source: e,
                }
            } else {
                SandboxError::Spawn(self.path.clone(), e)
            }
        })?;

        let timer = Instant::now();
        let backstop = limit + KILL_GRACE;
        loop {
            match child.try_wait().map_err(SandboxError::Process)? {
                Some(status) => {
                    let output = child.wait_with_output().map_err(SandboxError::Process)?;
                    let mut merged = String::from_utf8_lossy(&output.stdout).into_owned();
                    merged.push_str(&String::from_utf8_lossy(&output.stderr));
                    log::trace!("sandbox output: {merged}");
                    return Ok(SandboxRun {
                        success: status.success(),
                        killed: false,
                        output: merged,
                    });
                }
                None => {
                    if timer.elapsed() > backstop {
                        log::warn!(
                            "sandboxed run exceeded the {}s backstop, killing it",
                            backstop.as_secs()
                        );
                        child.kill().map_err(SandboxError::Process)?;
                        let _ = child.wait().map_err(SandboxError::Process)?;
                        let mut merged = String::new();
                        if let Some(stdout) = child.stdout.as_mut() {
                            let _ = stdout.read_to_string(&mut merged);
                        }
                        if let Some(stderr) = child.stderr.as_mut() {
                            let _ = stderr.read_to_string(&mut merged);
                        }
                        return Ok(SandboxRun {
                            success: false,
                            killed: true,
                            output: merged,
                        });
                    }
                    thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    // A stand-in for the sandbox binary: skips its own flags and execs the
    // wrapped command.
    fn fake_sandbox(dir: &Path) -> PathBuf {
        let path = dir.join("sandbox");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"#!/bin/sh\nwhile [ \"$1\" != \"--\" ]; do shift; done\nshift\nexec \"$@\"\n")
            .unwrap();
        drop(f);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn captures_merged_output() {
        let temp = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(fake_sandbox(temp.path()), "/bin/echo");
        let run = sandbox
            .run_python(temp.path(), &["hello"], Duration::from_secs(5))
            .unwrap();
        assert!(run.success);
        assert!(!run.killed);
        assert_eq!(run.output, "hello\n");
    }

    #[test]
    fn nonzero_exit_is_not_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(fake_sandbox(temp.path()), "/bin/false");
        let run = sandbox
            .run_python(temp.path(), &[], Duration::from_secs(5))
            .unwrap();
        assert!(!run.success);
    }

    #[test]
    fn missing_binary_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(temp.path().join("no-such-sandbox"), "/bin/true");
        let err = sandbox
            .run_python(temp.path(), &[], Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, SandboxError::NotFound { .. }));
    }
}
