use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::ProbeError;

/// Where system artifacts live and where external tools are looked up.
/// Production uses `/` and `$PATH`; tests point `root` at a scratch dir.
#[derive(Debug, Clone)]
pub struct Host {
    root: PathBuf,
    search_path: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl Host {
    pub fn system() -> Self {
        Self::with_root("/")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let search_path = env::var_os("PATH")
            .map(|paths| env::split_paths(&paths).collect())
            .unwrap_or_default();
        Self {
            root: root.into(),
            search_path,
        }
    }

    pub fn with_search_path(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_path = dirs;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether artifacts under the root belong to the running machine.
    pub fn is_live(&self) -> bool {
        self.root == Path::new("/")
    }

    /// Maps an absolute system path (e.g. `/etc/fstab`) under the root.
    pub fn path(&self, absolute: impl AsRef<Path>) -> PathBuf {
        let absolute = absolute.as_ref();
        let relative = absolute.strip_prefix("/").unwrap_or(absolute);
        self.root.join(relative)
    }

    pub fn find_tool(&self, tool: &str) -> Option<PathBuf> {
        self.search_path
            .iter()
            .map(|dir| dir.join(tool))
            .find(|candidate| candidate.is_file())
    }

    pub fn require_tool(&self, tool: &str) -> Result<PathBuf, ProbeError> {
        self.find_tool(tool).ok_or_else(|| ProbeError::ToolUnavailable {
            tool: tool.to_string(),
        })
    }

    /// Runs a tool found on the search path. A non-zero exit is reported in
    /// `ToolOutput::success`, not as an error.
    pub fn run(&self, program: &Path, args: &[&str]) -> io::Result<ToolOutput> {
        debug!(program = %program.display(), ?args, "running tool");
        let output = Command::new(program).args(args).output()?;
        Ok(ToolOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::system()
    }
}
