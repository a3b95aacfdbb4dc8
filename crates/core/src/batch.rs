use crate::exif_reader::{ExifTimeReader, MetadataTimeReader};
use crate::filesystem::{Filesystem, StdFilesystem};
use crate::finder::{DirectoryWalker, PathProducer};
use crate::history::{HistoryError, HistoryLog};
use crate::index::GroupIndex;
use crate::inspector::{InspectError, TimestampInspector};
use crate::media::{MediaClassifier, SignatureClassifier};
use crate::stamp::StampFormat;
use crate::worker::{BatchResult, CancelFlag, PoolError, RenameJob, RunMode, Staging, WorkerPool};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub input: PathBuf,
    pub recursive: bool,
    pub include_hidden: bool,
    pub uppercase: bool,
    pub workers: usize,
    pub mode: RunMode,
    pub format: StampFormat,
    pub history_dir: PathBuf,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            recursive: false,
            include_hidden: false,
            uppercase: false,
            workers: 1,
            mode: RunMode::Preview,
            format: StampFormat::default(),
            history_dir: PathBuf::from("."),
        }
    }
}

#[derive(Clone)]
pub struct Backends {
    pub classifier: Arc<dyn MediaClassifier>,
    pub reader: Arc<dyn MetadataTimeReader>,
    pub fs: Arc<dyn Filesystem>,
}

impl Default for Backends {
    fn default() -> Self {
        Self {
            classifier: Arc::new(SignatureClassifier),
            reader: Arc::new(ExifTimeReader),
            fs: Arc::new(StdFilesystem),
        }
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("入力フォルダが存在しません: {0}")]
    InputMissing(PathBuf),
    #[error("入力パスがフォルダではありません: {0}")]
    InputNotDirectory(PathBuf),
    #[error("入力フォルダを解決できませんでした: {path}")]
    InputUnresolved {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("入力フォルダを走査できませんでした")]
    Scan(#[from] walkdir::Error),
    #[error(transparent)]
    History(#[from] HistoryError),
}

#[derive(Debug)]
pub struct ScanOutcome {
    pub index: GroupIndex,
    pub skipped: usize,
}

pub fn group_paths(
    paths: &[PathBuf],
    shard_count: usize,
    format: &StampFormat,
    inspector: &TimestampInspector<'_>,
) -> ScanOutcome {
    let mut index = GroupIndex::new(shard_count);
    let mut skipped = 0usize;

    for path in paths {
        let info = match inspector.inspect(path) {
            Ok(info) => info,
            Err(InspectError::Unclassifiable(path)) => {
                debug!(path = %path.display(), "メディアファイルではないためスキップします");
                skipped += 1;
                continue;
            }
            Err(err) => {
                warn!(error = %err, "タイムスタンプを取得できないためスキップします");
                skipped += 1;
                continue;
            }
        };

        let Some(identity) = format.identity_for(&info) else {
            debug!(path = %path.display(), "分類タグがないためスキップします");
            skipped += 1;
            continue;
        };
        debug!(path = %path.display(), key = %identity.key, source = ?info.source, "検査完了");
        index.add_or_merge(identity, path.clone());
    }

    ScanOutcome { index, skipped }
}

pub fn run_batch(options: &BatchOptions) -> Result<BatchResult, BatchError> {
    run_batch_with(options, &Backends::default(), &CancelFlag::default())
}

pub fn run_batch_with(
    options: &BatchOptions,
    backends: &Backends,
    cancel: &CancelFlag,
) -> Result<BatchResult, BatchError> {
    let pool = WorkerPool::new(options.workers)?;
    let input = resolve_input(&options.input)?;

    let span = info_span!(
        "batch",
        input = %input.display(),
        mode = ?options.mode,
        workers = options.workers
    );
    let _enter = span.enter();

    let paths = DirectoryWalker {
        include_hidden: options.include_hidden,
    }
    .produce(&input, options.recursive)?;
    info!(files = paths.len(), "ファイルを検査します");

    let inspector = TimestampInspector::new(
        backends.classifier.as_ref(),
        backends.reader.as_ref(),
        backends.fs.as_ref(),
    )
    .with_tags(&options.format.tags);
    let mut scan = group_paths(&paths, pool.workers(), &options.format, &inspector);
    info!(
        groups = scan.index.group_count(),
        skipped = scan.skipped,
        "グループ化が完了しました"
    );

    let history = match options.mode {
        RunMode::Apply => Some(HistoryLog::open(&options.history_dir)?),
        RunMode::Preview => None,
    };

    let planned = scan.index.plan(options.uppercase);
    let staging = Staging::prepare(
        &planned,
        options.mode,
        backends.fs.as_ref(),
        history.as_ref(),
    );
    if staging.parked_count() > 0 {
        info!(parked = staging.parked_count(), "リネーム先を空けるため一時名に退避しました");
    }

    let job = RenameJob {
        mode: options.mode,
        uppercase: options.uppercase,
        fs: backends.fs.as_ref(),
        history: history.as_ref(),
        staging: &staging,
        cancel,
        span: span.clone(),
    };
    let mut result = pool.run(scan.index.into_shards(), &job);
    staging.restore_unprocessed(backends.fs.as_ref(), history.as_ref());
    result.skipped += scan.skipped;
    result.entries.sort_by(|a, b| a.source.cmp(&b.source));

    if let Some(history) = history {
        if let Err(err) = history.close() {
            error!(error = %err, "履歴ファイルを閉じられませんでした");
        }
        result.history_path = Some(history.path().to_path_buf());
    }

    info!(
        renamed = result.renamed,
        planned = result.planned,
        unchanged = result.unchanged,
        skipped = result.skipped,
        failed = result.failed,
        "完了"
    );
    Ok(result)
}

// History records must stay valid from any working directory.
fn resolve_input(input: &Path) -> Result<PathBuf, BatchError> {
    if !input.exists() {
        return Err(BatchError::InputMissing(input.to_path_buf()));
    }
    if !input.is_dir() {
        return Err(BatchError::InputNotDirectory(input.to_path_buf()));
    }
    fs::canonicalize(input).map_err(|source| BatchError::InputUnresolved {
        path: input.to_path_buf(),
        source,
    })
}
