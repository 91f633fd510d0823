use anyhow::{Context, Result, anyhow};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};

/// Runs a hook command through `sh -c` inside `cwd`, printing its output in
/// real-time, and fails if the command exits with a non-zero status code.
pub fn execute_and_stream_command(command: &str, cwd: &Path) -> Result<()> {
    if command.trim().is_empty() {
        return Err(anyhow!("Command string is empty"));
    }

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn command: '{command}'"))?;

    let stdout = child
        .stdout
        .take()
        .context("Child process did not have a stdout handle")?;

    for line in BufReader::new(stdout).lines() {
        let line = line.context("Error reading output from child process")?;
        println!("{line}");
    }

    let status = child.wait().context("Failed to wait on child process")?;

    if status.success() {
        Ok(())
    } else {
        let code = status.code().unwrap_or(-1);
        Err(anyhow!("Command '{command}' failed with exit code: {code}"))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn runs_in_the_given_directory() {
        let tmp = TempDir::new().unwrap();
        execute_and_stream_command("touch marker", tmp.path()).unwrap();
        assert!(tmp.path().join("marker").exists());
    }

    #[test]
    fn non_zero_exit_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = execute_and_stream_command("exit 3", tmp.path()).unwrap_err();
        assert!(err.to_string().contains("exit code: 3"));
    }

    #[test]
    fn empty_command_is_rejected() {
        let tmp = TempDir::new().unwrap();
        assert!(execute_and_stream_command("  ", tmp.path()).is_err());
    }
}
