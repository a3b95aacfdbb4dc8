use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

pub trait Filesystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StdFilesystem;

impl Filesystem for StdFilesystem {
    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        fs::metadata(path)?.modified()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{Filesystem, StdFilesystem};
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::time::SystemTime;

    #[derive(Debug, Default)]
    pub struct RecordingFilesystem {
        pub renames: Mutex<Vec<(PathBuf, PathBuf)>>,
    }

    impl RecordingFilesystem {
        pub fn rename_calls(&self) -> usize {
            self.renames.lock().map(|calls| calls.len()).unwrap_or(0)
        }
    }

    impl Filesystem for RecordingFilesystem {
        fn exists(&self, path: &Path) -> bool {
            StdFilesystem.exists(path)
        }

        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            if let Ok(mut calls) = self.renames.lock() {
                calls.push((from.to_path_buf(), to.to_path_buf()));
            }
            StdFilesystem.rename(from, to)
        }

        fn modified(&self, path: &Path) -> io::Result<SystemTime> {
            StdFilesystem.modified(path)
        }
    }

    #[derive(Debug)]
    pub struct FailingRenames {
        pub fail_from: PathBuf,
    }

    impl Filesystem for FailingRenames {
        fn exists(&self, path: &Path) -> bool {
            StdFilesystem.exists(path)
        }

        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            if from == self.fail_from {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "rename refused"));
            }
            StdFilesystem.rename(from, to)
        }

        fn modified(&self, path: &Path) -> io::Result<SystemTime> {
            StdFilesystem.modified(path)
        }
    }
}
