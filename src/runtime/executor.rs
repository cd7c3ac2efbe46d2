//! Isolated execution of the container command
//!
//! The child is confined in two steps. The PID namespace is requested with
//! `unshare(CLONE_NEWPID)` on the calling thread, which only affects processes
//! forked afterwards, so the child starts as PID 1 of a fresh namespace. The
//! root change happens inside the forked child between fork and exec, so the
//! caller's own root and working directory never change.

use crate::error::{Result, RunnerError};
use crate::logging::Logger;
use nix::errno::Errno;
use nix::sched::{CloneFlags, unshare};
use nix::unistd::{chdir, chroot};
use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Added to the errno of a failed chroot/chdir in the child so the parent can
/// tell it apart from an exec failure. Errno values stay far below this.
const ROOT_CHANGE_ERRNO_BASE: i32 = 0x10000;

fn root_change_error(errno: Errno) -> io::Error {
    io::Error::from_raw_os_error(ROOT_CHANGE_ERRNO_BASE + errno as i32)
}

/// Classify an error returned by `spawn`
fn spawn_error(command: &Path, err: io::Error) -> RunnerError {
    match err.raw_os_error() {
        Some(raw) if raw >= ROOT_CHANGE_ERRNO_BASE => RunnerError::Isolation(format!(
            "Failed to change root for {}: {}",
            command.display(),
            Errno::from_raw(raw - ROOT_CHANGE_ERRNO_BASE)
        )),
        _ => RunnerError::Exec(format!("Failed to spawn {}: {}", command.display(), err)),
    }
}

/// What the child is confined to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Isolation {
    root: Option<PathBuf>,
    pid_namespace: bool,
}

impl Isolation {
    /// chroot into `root` and start in a new PID namespace
    pub fn container(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            pid_namespace: true,
        }
    }

    /// Run on the host as-is
    pub fn disabled() -> Self {
        Self {
            root: None,
            pid_namespace: false,
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn uses_pid_namespace(&self) -> bool {
        self.pid_namespace
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecState {
    NotStarted,
    Isolating,
    Running { pid: u32 },
    Exited(i32),
    Signaled(i32),
    Failed,
}

/// How the child terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited(i32),
    Signaled(i32),
}

impl ExitOutcome {
    /// Exit code for this process: the child's own code, or 128 + signal
    pub fn exit_code(&self) -> u8 {
        match *self {
            ExitOutcome::Exited(code) => u8::try_from(code).unwrap_or(1),
            ExitOutcome::Signaled(signal) => u8::try_from(128 + signal).unwrap_or(1),
        }
    }
}

pub struct IsolatedExecutor {
    isolation: Isolation,
    output: Logger,
    state: ExecState,
}

impl IsolatedExecutor {
    pub fn new(isolation: Isolation, output: Logger) -> Self {
        Self {
            isolation,
            output,
            state: ExecState::NotStarted,
        }
    }

    pub fn state(&self) -> &ExecState {
        &self.state
    }

    /// Spawn `command` under the configured isolation and block until it terminates.
    ///
    /// Stdout and stderr are inherited; stdin is `/dev/null` so the child sees
    /// end-of-input immediately.
    pub fn run(&mut self, command: &Path, args: &[String]) -> Result<ExitOutcome> {
        if self.state != ExecState::NotStarted {
            return Err(RunnerError::Exec(
                "executor has already started a process".to_string(),
            ));
        }
        self.state = ExecState::Isolating;

        let result = self.spawn_and_wait(command, args);
        if result.is_err() {
            self.state = ExecState::Failed;
        }
        result
    }

    fn spawn_and_wait(&mut self, command: &Path, args: &[String]) -> Result<ExitOutcome> {
        let root = match self.isolation.root() {
            Some(root) => {
                if !root.is_dir() {
                    return Err(RunnerError::Isolation(format!(
                        "Root {} is not a directory",
                        root.display()
                    )));
                }
                Some(CString::new(root.as_os_str().as_bytes()).map_err(|_| {
                    RunnerError::Isolation(format!(
                        "Root path contains a NUL byte: {}",
                        root.display()
                    ))
                })?)
            }
            None => None,
        };

        if self.isolation.uses_pid_namespace() {
            unshare(CloneFlags::CLONE_NEWPID).map_err(|e| {
                RunnerError::Isolation(format!("Failed to create PID namespace: {}", e))
            })?;
            self.output.debug("Created PID namespace for the child");
        }

        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        if let Some(root) = root {
            // SAFETY: the closure only issues chroot(2) and chdir(2) on
            // pre-built C strings, both async-signal-safe.
            unsafe {
                cmd.pre_exec(move || {
                    chroot(root.as_c_str()).map_err(root_change_error)?;
                    chdir(c"/").map_err(root_change_error)?;
                    Ok(())
                });
            }
        }

        let mut child = cmd.spawn().map_err(|e| spawn_error(command, e))?;
        self.state = ExecState::Running { pid: child.id() };
        self.output
            .debug(&format!("Spawned {} as pid {}", command.display(), child.id()));

        let status = child.wait().map_err(|e| {
            RunnerError::Exec(format!("Failed to wait for {}: {}", command.display(), e))
        })?;

        if let Some(code) = status.code() {
            self.state = ExecState::Exited(code);
            Ok(ExitOutcome::Exited(code))
        } else if let Some(signal) = status.signal() {
            self.state = ExecState::Signaled(signal);
            Ok(ExitOutcome::Signaled(signal))
        } else {
            Err(RunnerError::Exec(format!(
                "{} terminated with unknown status {:?}",
                command.display(),
                status
            )))
        }
    }
}
