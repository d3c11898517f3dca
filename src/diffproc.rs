use std::env;
use std::io::{self, BufReader};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};

use tracing::{debug, warn};

use crate::config::{Config, ENV_ALLOW_LIST};
use crate::error::{IoResultExt, Result, SdiffError};

pub type DiffOutput = BufReader<ChildStdout>;

/// A running differencing engine with its stdout wired to a pipe.
///
/// Dropping the handle before [`DiffProcess::finish`] kills and reaps the
/// child, so early returns never leave a zombie behind.
pub struct DiffProcess {
    child: Child,
    reaped: bool,
}

impl DiffProcess {
    /// Starts the engine and returns its handle plus the read end of its stdout.
    ///
    /// The write end lives only in the child. Drop the returned reader before
    /// calling [`DiffProcess::finish`] so a child still writing sees a closed
    /// pipe instead of blocking forever.
    pub fn spawn(config: &Config, path_a: &Path, path_b: &Path) -> Result<(Self, DiffOutput)> {
        let mut command = build_command(config, path_a, path_b);
        debug!(
            program = %config.diff_program.display(),
            args = ?config.diff_args(),
            "spawning diff"
        );

        let mut child = command.spawn().map_err(|source| SdiffError::Spawn {
            program: config.diff_program.display().to_string(),
            source,
        })?;
        let stdout = child.stdout.take();
        let process = Self {
            child,
            reaped: false,
        };
        let stdout = stdout.ok_or_else(|| SdiffError::Spawn {
            program: config.diff_program.display().to_string(),
            source: io::Error::other("stdout was not captured"),
        })?;

        Ok((process, BufReader::new(stdout)))
    }

    /// Waits for the child's exit status.
    pub fn finish(mut self) -> Result<ExitStatus> {
        let status = self.child.wait().op("waiting for diff")?;
        self.reaped = true;
        debug!(%status, "diff exited");
        Ok(status)
    }
}

impl Drop for DiffProcess {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        if let Err(err) = self.child.kill() {
            warn!("failed to kill diff: {err}");
        }
        let _ = self.child.wait();
    }
}

fn build_command(config: &Config, path_a: &Path, path_b: &Path) -> Command {
    let mut command = Command::new(&config.diff_program);
    #[cfg(unix)]
    command.arg0(config.display_name());
    command
        .args(config.diff_args())
        .arg(path_a)
        .arg(path_b)
        .env_clear()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
    for name in ENV_ALLOW_LIST {
        if let Some(value) = env::var_os(name) {
            command.env(name, value);
        }
    }
    command
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Read;
    use std::path::PathBuf;

    fn config_for(program: &str) -> Config {
        Config {
            diff_program: PathBuf::from(program),
            ..Config::default()
        }
    }

    #[test]
    fn test_command_argv_and_environment() {
        let mut config = config_for("/usr/bin/diff");
        config.diff_flags.ignore_case = true;
        let command = build_command(&config, Path::new("left.txt"), Path::new("right.txt"));

        let args: Vec<_> = command.get_args().filter_map(|arg| arg.to_str()).collect();
        assert_eq!(args, ["-i", "left.txt", "right.txt"]);

        for (name, _) in command.get_envs() {
            assert!(ENV_ALLOW_LIST.contains(&name.to_str().unwrap()), "{name:?} leaked");
        }
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let config = config_for("/nonexistent/sdiff-test-diff");
        let err = DiffProcess::spawn(&config, Path::new("a"), Path::new("b"))
            .err()
            .expect("spawn should fail");
        assert!(matches!(err, SdiffError::Spawn { .. }));
    }

    #[test]
    fn test_output_and_exit_status() {
        // `echo` prints its operands, which stands in for diff output here.
        let config = config_for("/bin/echo");
        let (process, mut output) =
            DiffProcess::spawn(&config, Path::new("a"), Path::new("b")).unwrap();
        let mut text = String::new();
        output.read_to_string(&mut text).unwrap();
        drop(output);
        assert_eq!(text, "a b\n");
        assert!(process.finish().unwrap().success());
    }

    #[test]
    fn test_exit_code_is_reported() {
        let config = config_for("/bin/false");
        let (process, mut output) =
            DiffProcess::spawn(&config, Path::new("a"), Path::new("b")).unwrap();
        let mut text = String::new();
        output.read_to_string(&mut text).unwrap();
        drop(output);
        assert_eq!(process.finish().unwrap().code(), Some(1));
    }
}
