//! Bounded execution of external programs.

use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

use crate::error::{Error, Result};

/// An external program invocation with a time limit.
#[derive(Debug)]
pub struct Invocation<'a> {
    program: &'a OsStr,
    args: Vec<&'a OsStr>,
    envs: Vec<(&'a str, String)>,
    current_dir: Option<&'a Path>,
    timeout: Duration,
}

impl<'a> Invocation<'a> {
    pub fn new(program: &'a (impl AsRef<OsStr> + ?Sized), timeout: Duration) -> Self {
        Self {
            program: program.as_ref(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: &'a (impl AsRef<OsStr> + ?Sized)) -> Self {
        self.args.push(arg.as_ref());
        self
    }

    pub fn args<S: AsRef<OsStr> + 'a>(mut self, args: &'a [S]) -> Self {
        self.args.extend(args.iter().map(|a| a.as_ref()));
        self
    }

    pub fn env(mut self, key: &'a str, value: impl Into<String>) -> Self {
        self.envs.push((key, value.into()));
        self
    }

    pub fn current_dir(mut self, dir: &'a Path) -> Self {
        self.current_dir = Some(dir);
        self
    }

    fn program_name(&self) -> String {
        Path::new(self.program)
            .file_name()
            .unwrap_or(self.program)
            .to_string_lossy()
            .into_owned()
    }

    /// Run to completion, returning the raw output whatever the exit status.
    ///
    /// Fails only when the program cannot be started or exceeds its time
    /// limit; the child is killed in the latter case.
    pub async fn output(&self) -> Result<Output> {
        let name = self.program_name();
        let mut command = Command::new(self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        if let Some(dir) = self.current_dir {
            command.current_dir(dir);
        }

        tracing::debug!(program = %name, args = ?self.args, "running command");

        let child = command.spawn().map_err(|e| Error::ExternalProcess {
            program: name.clone(),
            message: if e.kind() == io::ErrorKind::NotFound {
                "not found in PATH".to_string()
            } else {
                e.to_string()
            },
        })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(Error::ExternalProcess {
                program: name,
                message: e.to_string(),
            }),
            Err(_) => Err(Error::Timeout {
                program: name,
                after: self.timeout,
            }),
        }
    }

    /// Run to completion and return stdout, failing on a non-zero exit.
    pub async fn stdout(&self) -> Result<String> {
        let output = self.output().await?;
        if !output.status.success() {
            return Err(Error::ExternalProcess {
                program: self.program_name(),
                message: failure_message(&output),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| Error::ExternalProcess {
            program: self.program_name(),
            message: "output is not valid UTF-8".to_string(),
        })
    }
}

/// Describe a failed run using whatever the program printed.
pub(crate) fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let detail = if stderr.trim().is_empty() {
        stdout.trim()
    } else {
        stderr.trim()
    };

    match output.status.code() {
        Some(code) if detail.is_empty() => format!("exit status {code}"),
        Some(code) => format!("exit status {code}: {detail}"),
        None if detail.is_empty() => "terminated by signal".to_string(),
        None => format!("terminated by signal: {detail}"),
    }
}
