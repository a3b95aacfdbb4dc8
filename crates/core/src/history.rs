use crate::filesystem::Filesystem;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{error, info, warn};

const HEADER: &str = r#"#!/usr/bin/env bash
# Rename history written by pixstamp.
#   bash <this file> do    re-applies every rename in order
#   bash <this file> undo  reverts them, last rename first
case "${1:-}" in
  do|undo) mode="$1" ;;
  *) echo "Usage: $0 {do|undo}"; exit 0 ;;
esac
sources=()
targets=()
pixwork() { sources+=("$1"); targets+=("$2"); }
replay() {
  local i
  if [[ "$mode" == "do" ]]; then
    for ((i = 0; i < ${#sources[@]}; i++)); do mv -n -v -- "${sources[i]}" "${targets[i]}"; done
  else
    for ((i = ${#sources[@]} - 1; i >= 0; i--)); do mv -n -v -- "${targets[i]}" "${sources[i]}"; done
  fi
}
trap replay EXIT

"#;

const RECORD_COMMAND: &str = "pixwork ";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("履歴ファイルを作成できませんでした: {path}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("履歴を書き込めませんでした: {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("履歴ファイルを読めませんでした: {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("履歴の{line}行目を解釈できません: {path}")]
    Parse { path: PathBuf, line: usize },
    #[error("履歴のロックが壊れています")]
    Poisoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub source: PathBuf,
    pub destination: PathBuf,
}

type HistoryWriter = BufWriter<Box<dyn Write + Send>>;

pub struct HistoryLog {
    path: PathBuf,
    writer: Mutex<Option<HistoryWriter>>,
}

impl fmt::Debug for HistoryLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryLog")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl HistoryLog {
    /// Creates `history-<YYYYmmdd-HHMMSS>.sh` under `dir`, never reusing an
    /// existing file.
    pub fn open(dir: &Path) -> Result<Self, HistoryError> {
        fs::create_dir_all(dir).map_err(|source| HistoryError::Create {
            path: dir.to_path_buf(),
            source,
        })?;

        let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let mut n = 0usize;
        let (path, file) = loop {
            let name = if n == 0 {
                format!("history-{stamp}.sh")
            } else {
                format!("history-{stamp}-{n}.sh")
            };
            let path = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (path, file),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => n += 1,
                Err(source) => return Err(HistoryError::Create { path, source }),
            }
        };

        let mut writer: HistoryWriter = BufWriter::new(Box::new(file));
        writer
            .write_all(HEADER.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|source| HistoryError::Write {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), "履歴の書き込みを開始します");
        Ok(Self {
            path,
            writer: Mutex::new(Some(writer)),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_writer(path: PathBuf, writer: Box<dyn Write + Send>) -> Self {
        Self {
            path,
            writer: Mutex::new(Some(BufWriter::new(writer))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, source: &Path, destination: &Path) -> Result<(), HistoryError> {
        let mut guard = self.writer.lock().map_err(|_| HistoryError::Poisoned)?;
        let Some(writer) = guard.as_mut() else {
            warn!(path = %self.path.display(), "閉じた履歴への書き込みを無視しました");
            return Ok(());
        };

        let line = format_record(source, destination);
        writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|source| HistoryError::Write {
                path: self.path.clone(),
                source,
            })
    }

    pub fn close(&self) -> Result<(), HistoryError> {
        let mut guard = self.writer.lock().map_err(|_| HistoryError::Poisoned)?;
        if let Some(mut writer) = guard.take() {
            writer.flush().map_err(|source| HistoryError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

fn format_record(source: &Path, destination: &Path) -> String {
    format!(
        "{}{} {}\n",
        RECORD_COMMAND,
        shell_quote(&source.to_string_lossy()),
        shell_quote(&destination.to_string_lossy())
    )
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn parse_record(line: &str) -> Option<HistoryRecord> {
    let rest = line.strip_prefix(RECORD_COMMAND)?;
    let (source, rest) = take_quoted(rest.trim_start())?;
    let (destination, rest) = take_quoted(rest.trim_start())?;
    if !rest.trim().is_empty() {
        return None;
    }
    Some(HistoryRecord {
        source: PathBuf::from(source),
        destination: PathBuf::from(destination),
    })
}

/// Reads one `'...'` word, where `'\''` stands for a literal quote.
fn take_quoted(input: &str) -> Option<(String, &str)> {
    let mut rest = input.strip_prefix('\'')?;
    let mut value = String::new();
    loop {
        let end = rest.find('\'')?;
        value.push_str(&rest[..end]);
        rest = &rest[end + 1..];
        match rest.strip_prefix(r"\''") {
            Some(next) => {
                value.push('\'');
                rest = next;
            }
            None => return Some((value, rest)),
        }
    }
}

pub fn read_history(path: &Path) -> Result<Vec<HistoryRecord>, HistoryError> {
    let raw = fs::read_to_string(path).map_err(|source| HistoryError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut records = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if !line.starts_with(RECORD_COMMAND) {
            continue;
        }
        let record = parse_record(line).ok_or_else(|| HistoryError::Parse {
            path: path.to_path_buf(),
            line: index + 1,
        })?;
        records.push(record);
    }
    Ok(records)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Reverse,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayResult {
    pub replayed: usize,
    pub missing: usize,
    pub failed: usize,
}

/// Forward re-applies records in order; reverse walks them backwards moving
/// each destination back to its source. Existing targets are never replaced.
pub fn replay(
    records: &[HistoryRecord],
    direction: Direction,
    fs: &dyn Filesystem,
) -> ReplayResult {
    let mut result = ReplayResult::default();

    let ordered: Box<dyn Iterator<Item = &HistoryRecord>> = match direction {
        Direction::Forward => Box::new(records.iter()),
        Direction::Reverse => Box::new(records.iter().rev()),
    };

    for record in ordered {
        let (from, to) = match direction {
            Direction::Forward => (&record.source, &record.destination),
            Direction::Reverse => (&record.destination, &record.source),
        };

        if !fs.exists(from) {
            warn!(path = %from.display(), "再生元のファイルがありません");
            result.missing += 1;
            continue;
        }
        if fs.exists(to) {
            error!(path = %to.display(), "再生先に既にファイルがあります");
            result.failed += 1;
            continue;
        }

        match fs.rename(from, to) {
            Ok(()) => result.replayed += 1,
            Err(err) => {
                error!(from = %from.display(), to = %to.display(), error = %err, "再生に失敗しました");
                result.failed += 1;
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::StdFilesystem;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn quoting_round_trips_awkward_paths() {
        let source = Path::new("/in/it's a \"photo\" $HOME.jpg");
        let destination = Path::new("/in/img_20230101_101500000.jpg");
        let line = format_record(source, destination);
        let parsed = parse_record(line.trim_end()).expect("must parse");
        assert_eq!(parsed.source, source);
        assert_eq!(parsed.destination, destination);
    }

    #[test]
    fn open_writes_replayable_header_and_never_reuses_files() {
        let temp = tempdir().expect("tempdir");
        let first = HistoryLog::open(temp.path()).expect("open first");
        let second = HistoryLog::open(temp.path()).expect("open second");
        assert_ne!(first.path(), second.path());

        let body = fs::read_to_string(first.path()).expect("read");
        assert!(body.starts_with("#!/usr/bin/env bash"));
        assert!(body.contains("trap replay EXIT"));
        assert!(read_history(first.path()).expect("parse").is_empty());
    }

    #[test]
    fn appends_from_many_threads_keep_whole_lines() {
        let temp = tempdir().expect("tempdir");
        let log = Arc::new(HistoryLog::open(temp.path()).expect("open"));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for i in 0..50 {
                        let source = PathBuf::from(format!("/in/{t}-{i}.jpg"));
                        let destination = PathBuf::from(format!("/in/out-{t}-{i}.jpg"));
                        log.append(&source, &destination).expect("append");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }
        log.close().expect("close");

        let records = read_history(log.path()).expect("parse");
        assert_eq!(records.len(), 200);
    }

    #[test]
    fn append_after_close_is_ignored() {
        let temp = tempdir().expect("tempdir");
        let log = HistoryLog::open(temp.path()).expect("open");
        log.close().expect("close");
        log.append(Path::new("/a"), Path::new("/b"))
            .expect("ignored append");
        assert!(read_history(log.path()).expect("parse").is_empty());
    }

    #[test]
    fn corrupt_record_is_reported_with_line_number() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("history.sh");
        fs::write(&path, "#!/usr/bin/env bash\npixwork '/a' \n").expect("write");
        let err = read_history(&path).expect_err("must fail");
        assert!(matches!(err, HistoryError::Parse { line: 2, .. }));
    }

    #[test]
    fn reverse_replay_undoes_a_chain_of_renames() {
        let temp = tempdir().expect("tempdir");
        let a = temp.path().join("a.jpg");
        let b = temp.path().join("b.jpg");
        let staged = temp.path().join(".staged_b.jpg");
        fs::write(&a, b"A").expect("write a");
        fs::write(&b, b"B").expect("write b");

        // b moved aside, a took its name, b landed at c
        let c = temp.path().join("c.jpg");
        let records = vec![
            HistoryRecord {
                source: b.clone(),
                destination: staged.clone(),
            },
            HistoryRecord {
                source: a.clone(),
                destination: b.clone(),
            },
            HistoryRecord {
                source: staged.clone(),
                destination: c.clone(),
            },
        ];

        let applied = replay(&records, Direction::Forward, &StdFilesystem);
        assert_eq!(applied.replayed, 3);
        assert_eq!(fs::read(&b).expect("b"), b"A");
        assert_eq!(fs::read(&c).expect("c"), b"B");

        let undone = replay(&records, Direction::Reverse, &StdFilesystem);
        assert_eq!(undone.replayed, 3);
        assert_eq!(fs::read(&a).expect("a"), b"A");
        assert_eq!(fs::read(&b).expect("b"), b"B");
        assert!(!c.exists());
        assert!(!staged.exists());
    }

    #[test]
    fn replay_counts_missing_and_refuses_to_overwrite() {
        let temp = tempdir().expect("tempdir");
        let a = temp.path().join("a.jpg");
        let b = temp.path().join("b.jpg");
        let c = temp.path().join("c.jpg");
        let d = temp.path().join("d.jpg");
        fs::write(&b, b"B").expect("write b");
        fs::write(&c, b"C").expect("write c");
        fs::write(&d, b"D").expect("write d");

        let records = vec![
            HistoryRecord {
                source: a.clone(),
                destination: b.clone(),
            },
            HistoryRecord {
                source: c.clone(),
                destination: d.clone(),
            },
        ];

        let undone = replay(&records, Direction::Reverse, &StdFilesystem);
        assert_eq!(undone.replayed, 1);
        assert_eq!(undone.failed, 1);
        assert_eq!(undone.missing, 0);
        assert_eq!(fs::read(&a).expect("a"), b"B");

        let again = replay(&records, Direction::Reverse, &StdFilesystem);
        assert_eq!(again.missing, 1);
    }
}
