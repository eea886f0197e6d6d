//! External process invocation.
//!
//! Everything the harness spawns goes through [`CommandRunner`] so the
//! pipeline can be driven by a recording fake in tests.

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub trait CommandRunner {
    /// Runs `program` to completion with inherited stdio. Returns the exit
    /// code, or `None` when the process was terminated by a signal.
    fn run(&self, program: &Path, args: &[String]) -> io::Result<Option<i32>>;

    /// Runs `program` to completion and returns its stdout.
    fn capture(&self, program: &Path, args: &[String]) -> io::Result<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, program: &Path, args: &[String]) -> io::Result<Option<i32>> {
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()?;
        Ok(status.code())
    }

    fn capture(&self, program: &Path, args: &[String]) -> io::Result<String> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Looks `name` up on `PATH`, returning the first executable file found.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let path = env::var_os("PATH")?;
    find_in_dirs(name, env::split_paths(&path))
}

pub(crate) fn find_in_dirs<I>(name: &str, dirs: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    dirs.into_iter()
        .filter(|d| !d.as_os_str().is_empty())
        .map(|d| d.join(name))
        .find(|p| is_executable(p))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
