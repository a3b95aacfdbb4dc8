use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

pub(crate) const STAGING_PREFIX: &str = ".pixstamp_tmp_";

pub trait PathProducer {
    fn produce(&self, root: &Path, recursive: bool) -> Result<Vec<PathBuf>, walkdir::Error>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryWalker {
    pub include_hidden: bool,
}

impl PathProducer for DirectoryWalker {
    fn produce(&self, root: &Path, recursive: bool) -> Result<Vec<PathBuf>, walkdir::Error> {
        let max_depth = if recursive { usize::MAX } else { 1 };
        let include_hidden = self.include_hidden;
        let mut out = Vec::new();

        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || include_hidden || !is_hidden(entry.path()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => return Err(err),
                Err(err) => {
                    warn!(error = %err, "フォルダ走査中にエラーが発生しました");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if is_staging(entry.path()) {
                continue;
            }
            out.push(entry.into_path());
        }

        Ok(out)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

fn is_staging(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with(STAGING_PREFIX))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn names(paths: &[PathBuf], root: &Path) -> Vec<String> {
        paths
            .iter()
            .map(|p| {
                p.strip_prefix(root)
                    .expect("under root")
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    fn fixture() -> tempfile::TempDir {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("b.jpg"), b"x").expect("write");
        fs::write(temp.path().join("a.jpg"), b"x").expect("write");
        fs::write(temp.path().join(".hidden.jpg"), b"x").expect("write");
        fs::write(temp.path().join(".pixstamp_tmp_0_c.jpg"), b"x").expect("write");
        fs::create_dir_all(temp.path().join("nested")).expect("mkdir");
        fs::write(temp.path().join("nested").join("c.jpg"), b"x").expect("write");
        temp
    }

    #[test]
    fn flat_walk_skips_directories_and_hidden_files() {
        let temp = fixture();
        let found = DirectoryWalker::default()
            .produce(temp.path(), false)
            .expect("walk");
        assert_eq!(names(&found, temp.path()), vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn recursive_walk_descends() {
        let temp = fixture();
        let found = DirectoryWalker::default()
            .produce(temp.path(), true)
            .expect("walk");
        assert_eq!(
            names(&found, temp.path()),
            vec!["a.jpg", "b.jpg", "nested/c.jpg"]
        );
    }

    #[test]
    fn hidden_files_can_be_included_but_staging_files_never_are() {
        let temp = fixture();
        let found = DirectoryWalker {
            include_hidden: true,
        }
        .produce(temp.path(), false)
        .expect("walk");
        assert_eq!(
            names(&found, temp.path()),
            vec![".hidden.jpg", "a.jpg", "b.jpg"]
        );
    }

    #[test]
    fn missing_root_is_an_error() {
        let temp = tempdir().expect("tempdir");
        let result = DirectoryWalker::default().produce(&temp.path().join("nope"), false);
        assert!(result.is_err());
    }
}
