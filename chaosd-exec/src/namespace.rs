use std::fmt;
use std::path::{Path, PathBuf};

/// A handle to a Linux network namespace, identified by the path of its namespace file.
///
/// Nothing is opened when the handle is created: the path is only handed to the command runner,
/// which enters the namespace for the duration of a single command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkNamespace {
    pub path: PathBuf,
}

impl NetworkNamespace {
    /// Wraps an arbitrary namespace file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The network namespace of the process `pid`, as exposed by procfs.
    pub fn from_pid(pid: u32) -> Self {
        Self::new(Path::new("/proc").join(pid.to_string()).join("ns").join("net"))
    }

    /// A namespace created with `ip netns add <name>`.
    pub fn named(name: &str) -> Self {
        Self::new(Path::new("/run").join("netns").join(name))
    }

    /// The namespace of the init process, i.e. the host namespace.
    pub fn host() -> Self {
        Self::from_pid(1)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for NetworkNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
