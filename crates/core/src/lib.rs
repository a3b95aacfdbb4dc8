mod batch;
mod config;
mod exif_reader;
mod filesystem;
mod finder;
mod group;
mod history;
mod index;
mod inspector;
mod media;
mod queue;
mod stamp;
mod worker;

pub use batch::{group_paths, run_batch, run_batch_with, Backends, BatchError, BatchOptions, ScanOutcome};
pub use config::{
    app_paths, load_config, load_config_from, save_config, save_config_to, AppConfig, AppPaths,
};
pub use exif_reader::{ExifTimeReader, MetadataTimeReader, NoMetadata};
pub use filesystem::{Filesystem, StdFilesystem};
pub use finder::{DirectoryWalker, PathProducer};
pub use group::{GroupMember, PlannedRename, StampGroup};
pub use history::{
    read_history, replay, Direction, HistoryError, HistoryLog, HistoryRecord, ReplayResult,
};
pub use index::GroupIndex;
pub use inspector::{
    match_file_name, match_own_name, InspectError, NameMatch, NamePattern, TimeSource, TimestampInfo,
    TimestampInspector,
};
pub use media::{
    ClassTags, Classification, ExtensionClassifier, MediaClassifier, MediaFormat, MediaKind,
    SignatureClassifier,
};
pub use queue::WorkQueue;
pub use stamp::{Precision, StampFormat, StampIdentity, StampStyle};
pub use worker::{
    BatchResult, CancelFlag, EntryStatus, PoolError, RenameEntry, RenameFailure, RenameJob,
    RunMode, Staging, WorkerPool, MAX_WORKERS,
};
