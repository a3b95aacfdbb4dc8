use crate::filesystem::Filesystem;
use crate::finder::STAGING_PREFIX;
use crate::group::{PlannedRename, StampGroup};
use crate::history::HistoryLog;
use crate::queue::WorkQueue;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Span};

pub const MAX_WORKERS: usize = 8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Apply,
    #[default]
    Preview,
}

/// Checked by every worker between groups, never inside one.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Renamed,
    Planned,
    Unchanged,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenameEntry {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub seq: usize,
    pub status: EntryStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BatchResult {
    pub renamed: usize,
    pub planned: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub history_path: Option<PathBuf>,
    pub entries: Vec<RenameEntry>,
}

impl BatchResult {
    pub fn merge(&mut self, other: BatchResult) {
        self.renamed += other.renamed;
        self.planned += other.planned;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.failed += other.failed;
        if self.history_path.is_none() {
            self.history_path = other.history_path;
        }
        self.entries.extend(other.entries);
    }

    fn record(&mut self, planned: &PlannedRename, status: EntryStatus, reason: Option<String>) {
        match status {
            EntryStatus::Renamed => self.renamed += 1,
            EntryStatus::Planned => self.planned += 1,
            EntryStatus::Unchanged => self.unchanged += 1,
            EntryStatus::Failed => self.failed += 1,
        }
        self.entries.push(RenameEntry {
            source: planned.source.clone(),
            destination: planned.destination.clone(),
            seq: planned.seq,
            status,
            reason,
        });
    }
}

#[derive(Debug, Error)]
pub enum RenameFailure {
    #[error("リネーム先が既に存在します: {0}")]
    DestinationExists(PathBuf),
    #[error("リネームに失敗しました: {from} -> {to}")]
    Io {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Sources that will move, and where the ones blocking a destination were parked.
#[derive(Debug, Default)]
pub struct Staging {
    moving: HashSet<PathBuf>,
    parked: HashMap<PathBuf, PathBuf>,
    failed: HashMap<PathBuf, String>,
}

impl Staging {
    pub fn prepare(
        planned: &[PlannedRename],
        mode: RunMode,
        fs: &dyn Filesystem,
        history: Option<&HistoryLog>,
    ) -> Self {
        let changing = || planned.iter().filter(|p| !p.is_unchanged());
        let destinations: HashSet<&Path> = changing().map(|p| p.destination.as_path()).collect();
        let mut staging = Staging {
            moving: changing().map(|p| p.source.clone()).collect(),
            ..Staging::default()
        };
        if mode == RunMode::Preview {
            return staging;
        }

        let occupying = changing().filter(|p| destinations.contains(p.source.as_path()));
        for (n, p) in occupying.enumerate() {
            let temp = staging_path(&p.source, n);
            match rename_logged(fs, history, &p.source, &temp) {
                Ok(()) => {
                    debug!(from = %p.source.display(), to = %temp.display(), "一時名に退避しました");
                    staging.parked.insert(p.source.clone(), temp);
                }
                Err(failure) => {
                    error!("{failure}");
                    staging.failed.insert(p.source.clone(), failure.to_string());
                }
            }
        }
        staging
    }

    pub fn is_moving(&self, path: &Path) -> bool {
        self.moving.contains(path)
    }

    pub fn parked_count(&self) -> usize {
        self.parked.len()
    }

    fn current_path<'p>(&'p self, source: &'p Path) -> &'p Path {
        self.parked
            .get(source)
            .map(PathBuf::as_path)
            .unwrap_or(source)
    }

    pub fn restore_unprocessed(&self, fs: &dyn Filesystem, history: Option<&HistoryLog>) {
        for (original, parked) in &self.parked {
            if fs.exists(parked) {
                restore_staged(fs, history, parked, original);
            }
        }
    }
}

pub struct RenameJob<'a> {
    pub mode: RunMode,
    pub uppercase: bool,
    pub fs: &'a dyn Filesystem,
    pub history: Option<&'a HistoryLog>,
    pub staging: &'a Staging,
    pub cancel: &'a CancelFlag,
    pub span: Span,
}

pub struct WorkerPool {
    workers: usize,
    pool: ThreadPool,
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("ワーカー数は1〜{max}で指定してください: {requested}")]
    InvalidWorkerCount { requested: usize, max: usize },
    #[error("ワーカースレッドを起動できませんでした")]
    Build(#[from] ThreadPoolBuildError),
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self, PoolError> {
        if !(1..=MAX_WORKERS).contains(&workers) {
            return Err(PoolError::InvalidWorkerCount {
                requested: workers,
                max: MAX_WORKERS,
            });
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("pixstamp-worker-{i}"))
            .build()?;
        Ok(Self { workers, pool })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn run(&self, shards: Vec<WorkQueue>, job: &RenameJob<'_>) -> BatchResult {
        let slots: Vec<Mutex<Option<WorkQueue>>> =
            shards.into_iter().map(|q| Mutex::new(Some(q))).collect();
        let workers = self.workers;

        let per_thread = self.pool.broadcast(|ctx| {
            let mut result = BatchResult::default();
            for slot in slots.iter().skip(ctx.index()).step_by(workers) {
                let queue = slot.lock().ok().and_then(|mut q| q.take());
                if let Some(queue) = queue {
                    result.merge(drain(ctx.index(), queue, job));
                }
            }
            result
        });

        let mut total = BatchResult::default();
        for result in per_thread {
            total.merge(result);
        }
        total
    }
}

fn drain(worker: usize, mut queue: WorkQueue, job: &RenameJob<'_>) -> BatchResult {
    let span = info_span!(parent: &job.span, "worker", id = worker, shard = queue.id());
    let _enter = span.enter();
    let mut result = BatchResult::default();

    while let Some(mut group) = queue.pop() {
        if job.cancel.is_cancelled() {
            let skipped = group.len() + queue.path_count();
            warn!(skipped, "中断されたため残りのグループをスキップします");
            result.skipped += skipped;
            break;
        }
        process_group(&mut group, job, &mut result);
    }

    result
}

fn process_group(group: &mut StampGroup, job: &RenameJob<'_>, result: &mut BatchResult) {
    let planned = group.sequence(job.uppercase);
    match job.mode {
        RunMode::Preview => preview_group(&planned, job, result),
        RunMode::Apply => apply_group(&planned, job, result),
    }
}

fn preview_group(planned: &[PlannedRename], job: &RenameJob<'_>, result: &mut BatchResult) {
    for p in planned {
        if p.is_unchanged() {
            info!(path = %p.source.display(), "[X] 変更なし");
            result.record(p, EntryStatus::Unchanged, None);
        } else if job.fs.exists(&p.destination) && !job.staging.is_moving(&p.destination) {
            let failure = RenameFailure::DestinationExists(p.destination.clone());
            error!(from = %p.source.display(), "{failure}");
            result.record(p, EntryStatus::Failed, Some(failure.to_string()));
        } else {
            info!(from = %p.source.display(), to = %p.destination.display(), "[P] リネーム予定");
            result.record(p, EntryStatus::Planned, None);
        }
    }
}

fn apply_group(planned: &[PlannedRename], job: &RenameJob<'_>, result: &mut BatchResult) {
    for p in planned {
        if p.is_unchanged() {
            info!(path = %p.source.display(), "[X] 変更なし");
            result.record(p, EntryStatus::Unchanged, None);
            continue;
        }
        if let Some(reason) = job.staging.failed.get(&p.source) {
            result.record(p, EntryStatus::Failed, Some(reason.clone()));
            continue;
        }

        let from = job.staging.current_path(&p.source);
        let outcome = if job.fs.exists(&p.destination) {
            Err(RenameFailure::DestinationExists(p.destination.clone()))
        } else {
            rename_logged(job.fs, job.history, from, &p.destination)
        };

        match outcome {
            Ok(()) => {
                info!(from = %p.source.display(), to = %p.destination.display(), "[A] リネームしました");
                result.record(p, EntryStatus::Renamed, None);
            }
            Err(failure) => {
                error!(from = %p.source.display(), "{failure}");
                if from != p.source.as_path() {
                    restore_staged(job.fs, job.history, from, &p.source);
                }
                result.record(p, EntryStatus::Failed, Some(failure.to_string()));
            }
        }
    }
}

fn restore_staged(
    fs: &dyn Filesystem,
    history: Option<&HistoryLog>,
    staged: &Path,
    original: &Path,
) {
    if fs.exists(original) {
        warn!(
            staged = %staged.display(),
            original = %original.display(),
            "元の名前が使われているため一時ファイルのまま残します"
        );
        return;
    }
    if let Err(failure) = rename_logged(fs, history, staged, original) {
        error!("{failure}");
    }
}

fn rename_logged(
    fs: &dyn Filesystem,
    history: Option<&HistoryLog>,
    from: &Path,
    to: &Path,
) -> Result<(), RenameFailure> {
    fs.rename(from, to).map_err(|source| RenameFailure::Io {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })?;

    if let Some(history) = history {
        if let Err(err) = history.append(from, to) {
            error!(error = %err, from = %from.display(), to = %to.display(), "履歴を書き込めませんでした");
        }
    }
    Ok(())
}

fn staging_path(source: &Path, seq: usize) -> PathBuf {
    let parent = source.parent().unwrap_or_else(|| Path::new("."));
    let file_name = source
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    parent.join(format!(
        "{}{}_{}_{}",
        STAGING_PREFIX,
        std::process::id(),
        seq,
        file_name
    ))
}
