// ── External command execution ──
//
// Every external program runs through `ShellExec`: argument vectors only
// (no shell), captured output, and a hard timeout after which the child
// is killed.

use std::fs::File;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::error::{CoreError, IoContext};

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Stderr if present, else stdout; trimmed.
    pub fn message(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Files to connect to a child's standard streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct Redirect<'a> {
    pub stdin: Option<&'a Path>,
    pub stdout: Option<&'a Path>,
}

/// Runs programs with a bounded wait.
#[derive(Debug, Clone)]
pub struct ShellExec {
    timeout: Duration,
}

impl ShellExec {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run and capture. A non-zero exit is reported in the output, not as an
    /// error; spawn failures and timeouts are errors.
    pub async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CoreError> {
        self.run_redirected(program, args, Redirect::default(), self.timeout)
            .await
    }

    /// Run and require success.
    pub async fn run_checked(
        &self,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, CoreError> {
        let output = self.run(program, args).await?;
        ensure_success(program, output)
    }

    pub async fn run_redirected(
        &self,
        program: &str,
        args: &[&str],
        redirect: Redirect<'_>,
        limit: Duration,
    ) -> Result<CommandOutput, CoreError> {
        debug!(program, args = %redact(args), "exec");

        let mut cmd = Command::new(program);
        cmd.args(args).kill_on_drop(true).stderr(Stdio::piped());
        match redirect.stdin {
            Some(path) => cmd.stdin(Stdio::from(File::open(path).at(path)?)),
            None => cmd.stdin(Stdio::null()),
        };
        match redirect.stdout {
            Some(path) => cmd.stdout(Stdio::from(File::create(path).at(path)?)),
            None => cmd.stdout(Stdio::piped()),
        };

        let output = timeout(limit, cmd.output())
            .await
            .map_err(|_| CoreError::Timeout {
                program: program.to_owned(),
                timeout_secs: limit.as_secs(),
            })?
            .map_err(|e| CoreError::CommandFailed {
                program: program.to_owned(),
                message: format!("failed to spawn: {e}"),
            })?;

        let result = CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        trace!(program, code = ?result.code, "exit");
        Ok(result)
    }
}

/// Turn an unsuccessful output into `CommandFailed`.
pub fn ensure_success(program: &str, output: CommandOutput) -> Result<CommandOutput, CoreError> {
    if output.success {
        Ok(output)
    } else {
        Err(CoreError::CommandFailed {
            program: program.to_owned(),
            message: match output.code {
                Some(code) => format!("exit {code}: {}", output.message()),
                None => format!("killed: {}", output.message()),
            },
        })
    }
}

const MASK: &str = "***";

/// Render arguments for logs with secrets masked: `--password=x`,
/// `-px` and SQL `IDENTIFIED BY '...'` literals.
pub fn redact(args: &[&str]) -> String {
    args.iter()
        .map(|arg| redact_arg(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn redact_arg(arg: &str) -> String {
    if let Some((flag, _)) = arg.split_once('=') {
        if flag.ends_with("password") {
            return format!("{flag}={MASK}");
        }
    }
    if arg.len() > 2 && arg.starts_with("-p") && !arg.starts_with("--") {
        return format!("-p{MASK}");
    }
    let lower = arg.to_ascii_lowercase();
    if let Some(pos) = lower.find("identified by '") {
        let start = pos + "identified by '".len();
        if let Some(len) = arg[start..].find('\'') {
            return format!("{}{MASK}{}", &arg[..start], &arg[start + len..]);
        }
    }
    arg.to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn masks_password_forms() {
        assert_eq!(redact(&["mysql", "--password=hunter2"]), "mysql --password=***");
        assert_eq!(redact(&["mysql", "-phunter2", "-u", "root"]), "mysql -p*** -u root");
        assert_eq!(redact(&["-p"]), "-p");
    }

    #[test]
    fn masks_sql_identified_by() {
        let sql = "CREATE USER `u`@`localhost` IDENTIFIED BY 's3cret'";
        assert_eq!(
            redact(&["-e", sql]),
            "-e CREATE USER `u`@`localhost` IDENTIFIED BY '***'"
        );
    }

    #[test]
    fn failure_message_prefers_stderr() {
        let out = CommandOutput {
            success: false,
            code: Some(3),
            stdout: "ignored".into(),
            stderr: " boom \n".into(),
        };
        match ensure_success("systemctl", out) {
            Err(CoreError::CommandFailed { message, .. }) => assert_eq!(message, "exit 3: boom"),
            other => panic!("{other:?}"),
        }
    }

    #[tokio::test]
    async fn reports_nonzero_exit_without_error() {
        let exec = ShellExec::new(Duration::from_secs(5));
        let out = exec.run("sh", &["-c", "echo out; echo err >&2; exit 4"]).await.unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(4));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.message(), "err");
    }

    #[tokio::test]
    async fn times_out_slow_commands() {
        let exec = ShellExec::new(Duration::from_millis(100));
        let err = exec.run("sleep", &["5"]).await.unwrap_err();
        assert!(matches!(err, CoreError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let exec = ShellExec::new(Duration::from_secs(1));
        let err = exec.run("wo-definitely-not-installed", &[]).await.unwrap_err();
        assert!(matches!(err, CoreError::CommandFailed { .. }));
    }
}
