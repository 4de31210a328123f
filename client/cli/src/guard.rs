//! One running workflow per kind, across processes, via PID files.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

/// An empty PID file younger than this belongs to a process still writing it.
const STARTING_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowKind {
    Upload,
    Sync,
    HashBackfill,
}

impl WorkflowKind {
    fn file_name(self) -> &'static str {
        match self {
            WorkflowKind::Upload => "upload.pid",
            WorkflowKind::Sync => "sync.pid",
            WorkflowKind::HashBackfill => "populate-hashes.pid",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WorkflowKind::Upload => "upload",
            WorkflowKind::Sync => "sync",
            WorkflowKind::HashBackfill => "hash backfill",
        }
    }
}

fn pid_dir() -> anyhow::Result<PathBuf> {
    let dir = dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .ok_or_else(|| anyhow::anyhow!("Could not determine runtime directory"))?
        .join("docsearch");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn is_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

fn recently_modified(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .map(|age| age < STARTING_GRACE)
        .unwrap_or(false)
}

/// PID recorded in `path`, if that process is still running. A fresh empty
/// file counts as held, reported as pid 0. Stale or unreadable files are
/// removed.
fn running_pid(path: &Path) -> anyhow::Result<Option<u32>> {
    let pid_str = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if pid_str.trim().is_empty() && recently_modified(path) {
        return Ok(Some(0));
    }
    let pid: u32 = match pid_str.trim().parse() {
        Ok(p) => p,
        Err(_) => {
            let _ = fs::remove_file(path);
            return Ok(None);
        }
    };
    if pid != std::process::id() && !is_alive(pid) {
        let _ = fs::remove_file(path);
        return Ok(None);
    }
    Ok(Some(pid))
}

/// Held for the lifetime of a workflow; removes its PID file on drop.
#[derive(Debug)]
pub struct WorkflowGuard {
    path: PathBuf,
}

impl WorkflowGuard {
    pub fn acquire(kind: WorkflowKind) -> anyhow::Result<Self> {
        Self::acquire_in(&pid_dir()?, kind)
    }

    /// Create the PID file exclusively. An existing file is checked once for
    /// staleness; if it was stale the create is retried a single time.
    fn acquire_in(dir: &Path, kind: WorkflowKind) -> anyhow::Result<Self> {
        let path = dir.join(kind.file_name());
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let guard = Self { path };
                    write!(file, "{}", std::process::id())?;
                    tracing::debug!(path = %guard.path.display(), "workflow guard acquired");
                    return Ok(guard);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if let Some(pid) = running_pid(&path)? {
                        anyhow::bail!("{} already running (pid {})", kind.label(), pid);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        anyhow::bail!("{} already running", kind.label())
    }
}

impl Drop for WorkflowGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
