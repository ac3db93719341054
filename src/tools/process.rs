//! Spawning external aligner processes.

use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// Translate a comma-joined option list into separate flags.
///
/// `"k12,T0"` becomes `["-k12", "-T0"]`; empty items are dropped.
pub fn split_options(options: &str) -> Vec<String> {
    options
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(|o| format!("-{}", o.trim_start_matches('-')))
        .collect()
}

/// Whether a program can be found on `PATH`
pub fn on_path(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Run a program, write `input` to its stdin and return everything it
/// printed on stdout.
pub fn run_with_input<I, S>(program: &str, args: I, input: &str) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    tracing::trace!("Executing: {:?}", cmd);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to start {}", program))?;

    // Feed stdin from another thread so a chatty child cannot block on a full
    // stdout pipe while we are still writing
    let writer = child.stdin.take().map(|mut stdin| {
        let input = input.to_string();
        std::thread::spawn(move || stdin.write_all(input.as_bytes()))
    });

    let output = child
        .wait_with_output()
        .with_context(|| format!("Failed to wait for {}", program))?;

    let written = writer.map(|handle| handle.join());

    if !output.status.success() {
        anyhow::bail!(
            "{} failed with exit code {:?}: {}",
            program,
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    match written {
        Some(Ok(result)) => {
            result.with_context(|| format!("Failed to write input to {}", program))?
        }
        Some(Err(_)) => anyhow::bail!("stdin writer for {} panicked", program),
        None => {}
    }

    String::from_utf8(output.stdout).with_context(|| format!("{} produced non UTF-8 output", program))
}

/// Run a program to completion, failing on a non-zero exit
pub fn run<I, S>(program: &str, args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());

    tracing::debug!("Executing: {:?}", cmd);

    let output = cmd
        .output()
        .with_context(|| format!("Failed to start {}", program))?;

    if !output.status.success() {
        anyhow::bail!(
            "{} failed with exit code {:?}: {}",
            program,
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

/// An index file exists and holds data
pub fn non_empty(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_options() {
        assert_eq!(split_options("k12,T0"), vec!["-k12", "-T0"]);
        assert_eq!(split_options("s2, T0,,Q0,a1"), vec!["-s2", "-T0", "-Q0", "-a1"]);
        assert_eq!(split_options("-k12"), vec!["-k12"]);
        assert!(split_options("").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_with_input_echoes() {
        let out = run_with_input("cat", Vec::<&str>::new(), ">r\nACGT\n").unwrap();
        assert_eq!(out, ">r\nACGT\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_zero_exit_is_error() {
        assert!(run_with_input("false", Vec::<&str>::new(), "").is_err());
        assert!(run("false", Vec::<&str>::new()).is_err());
    }

    #[test]
    fn test_missing_program() {
        assert!(run_with_input("poreflow-no-such-binary", ["-x"], "").is_err());
        assert!(!on_path("poreflow-no-such-binary"));
    }

    #[test]
    fn test_non_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("idx.bwt");
        assert!(!non_empty(&path));
        std::fs::write(&path, b"").unwrap();
        assert!(!non_empty(&path));
        std::fs::write(&path, b"x").unwrap();
        assert!(non_empty(&path));
    }
}
