use crate::exif_reader::MetadataTimeReader;
use crate::filesystem::Filesystem;
use crate::media::{ClassTags, MediaClassifier, MediaFormat, MediaKind};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimeSource {
    FileNamePattern,
    EmbeddedMetadata,
    FileModified,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NamePattern {
    Standard,
    TimeStruct,
    EpochSeconds,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampInfo {
    pub time: DateTime<Local>,
    pub source: TimeSource,
    pub pattern: Option<NamePattern>,
    pub fraction_supplied: bool,
    pub kind: MediaKind,
    pub format: Option<MediaFormat>,
    pub extension: String,
}

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("メディアファイルとして分類できません: {0}")]
    Unclassifiable(PathBuf),
    #[error("ファイルが存在しません: {0}")]
    Missing(PathBuf),
    #[error("タイムスタンプを取得できませんでした: {path}")]
    NoTimestamp {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

const FRACTION_WIDTH: usize = 6;

static NAME_PATTERNS: Lazy<Vec<(Regex, NamePattern)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"^[A-Za-z_ ]*([0-9]{8})_?([0-9]{6})([0-9]*)")
                .expect("failed to compile standard name pattern"),
            NamePattern::Standard,
        ),
        (
            Regex::new(
                r"^[A-Za-z_ ]*([0-9]{4})_([0-9]{2})_([0-9]{2})[ _T]?([0-9]{2})[._:]([0-9]{2})[._:]([0-9]{2})",
            )
            .expect("failed to compile time-struct name pattern"),
            NamePattern::TimeStruct,
        ),
        (
            Regex::new(r"^[A-Za-z_ ]*([0-9]{10})[0-9]{0,3}(?:[^0-9]|$)")
                .expect("failed to compile epoch name pattern"),
            NamePattern::EpochSeconds,
        ),
    ]
});

// Our own output after the `<tag>_` prefix: stamp, optional `_mmm`, then the
// three-digit sequence.
static OWN_STANDARD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{8})_([0-9]{6})(?:_([0-9]{3}))?[0-9]{3}(?:\.[A-Za-z0-9]+)?$")
        .expect("failed to compile own standard name pattern")
});

static OWN_EPOCH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{10})(?:_([0-9]{3}))?[0-9]{3}(?:\.[A-Za-z0-9]+)?$")
        .expect("failed to compile own epoch name pattern")
});

static DEFAULT_TAGS: Lazy<ClassTags> = Lazy::new(ClassTags::default);

pub struct TimestampInspector<'a> {
    classifier: &'a dyn MediaClassifier,
    reader: &'a dyn MetadataTimeReader,
    fs: &'a dyn Filesystem,
    tags: &'a ClassTags,
}

impl<'a> TimestampInspector<'a> {
    pub fn new(
        classifier: &'a dyn MediaClassifier,
        reader: &'a dyn MetadataTimeReader,
        fs: &'a dyn Filesystem,
    ) -> Self {
        Self {
            classifier,
            reader,
            fs,
            tags: &DEFAULT_TAGS,
        }
    }

    pub fn with_tags(mut self, tags: &'a ClassTags) -> Self {
        self.tags = tags;
        self
    }

    pub fn inspect(&self, path: &Path) -> Result<TimestampInfo, InspectError> {
        if !self.fs.exists(path) {
            return Err(InspectError::Missing(path.to_path_buf()));
        }

        let classified = self.classifier.classify(path);
        if classified.kind == MediaKind::Unknown {
            return Err(InspectError::Unclassifiable(path.to_path_buf()));
        }

        let info = |time, source, pattern, fraction_supplied| TimestampInfo {
            time,
            source,
            pattern,
            fraction_supplied,
            kind: classified.kind,
            format: classified.format,
            extension: classified.extension.clone(),
        };

        let file_name = path
            .file_name()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_default();
        let matched =
            match_own_name(&file_name, self.tags).or_else(|| match_file_name(&file_name));
        if let Some(found) = matched {
            return Ok(info(
                found.time,
                TimeSource::FileNamePattern,
                Some(found.pattern),
                found.fraction_supplied,
            ));
        }

        if let (MediaKind::Image, Some(format)) = (classified.kind, classified.format) {
            if let Some(time) = self
                .reader
                .capture_time(path, format)
                .and_then(|naive| local_from_naive(&naive))
            {
                return Ok(info(time, TimeSource::EmbeddedMetadata, None, false));
            }
        }

        let time = self
            .fs
            .modified(path)
            .and_then(|modified| {
                whole_seconds(DateTime::<Local>::from(modified)).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidData, "更新日時が不正です")
                })
            })
            .map_err(|source| InspectError::NoTimestamp {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(info(time, TimeSource::FileModified, None, false))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameMatch {
    pub time: DateTime<Local>,
    pub pattern: NamePattern,
    pub fraction_supplied: bool,
}

pub fn match_file_name(file_name: &str) -> Option<NameMatch> {
    let normalized = file_name.replace('-', "_");

    let (caps, pattern) = NAME_PATTERNS
        .iter()
        .find_map(|(re, pattern)| re.captures(&normalized).map(|caps| (caps, *pattern)))?;

    let parsed = match pattern {
        NamePattern::Standard => parse_standard(&caps),
        NamePattern::TimeStruct => parse_time_struct(&caps),
        NamePattern::EpochSeconds => parse_epoch(&caps),
    };

    if parsed.is_none() {
        debug!(file_name, ?pattern, "ファイル名の日時が不正です");
    }
    parsed.map(|(time, fraction_supplied)| NameMatch {
        time,
        pattern,
        fraction_supplied,
    })
}

/// Names this tool rendered itself, read back without mistaking the sequence for a fraction.
pub fn match_own_name(file_name: &str, tags: &ClassTags) -> Option<NameMatch> {
    let upper = file_name == file_name.to_uppercase();
    let rest = [&tags.image, &tags.video].into_iter().find_map(|tag| {
        file_name
            .strip_prefix(&format!("{tag}_"))
            .or_else(|| {
                upper
                    .then(|| file_name.strip_prefix(&format!("{}_", tag.to_uppercase())))
                    .flatten()
            })
    })?;

    if let Some(caps) = OWN_STANDARD.captures(rest) {
        let date = NaiveDate::parse_from_str(&caps[1], "%Y%m%d").ok()?;
        let time = NaiveTime::parse_from_str(&caps[2], "%H%M%S").ok()?;
        let millis = own_millis(&caps, 3)?;
        let naive = date
            .and_time(time)
            .with_nanosecond(millis.unwrap_or(0) * 1_000_000)?;
        return Some(NameMatch {
            time: local_from_naive(&naive)?,
            pattern: NamePattern::Standard,
            fraction_supplied: millis.is_some(),
        });
    }

    let caps = OWN_EPOCH.captures(rest)?;
    let secs = caps[1].parse::<i64>().ok()?;
    let millis = own_millis(&caps, 2)?;
    let time = Local
        .timestamp_opt(secs, millis.unwrap_or(0) * 1_000_000)
        .single()?;
    Some(NameMatch {
        time,
        pattern: NamePattern::EpochSeconds,
        fraction_supplied: millis.is_some(),
    })
}

fn own_millis(caps: &Captures, group: usize) -> Option<Option<u32>> {
    match caps.get(group) {
        Some(m) => m.as_str().parse::<u32>().ok().map(Some),
        None => Some(None),
    }
}

fn parse_standard(caps: &Captures) -> Option<(DateTime<Local>, bool)> {
    let date = NaiveDate::parse_from_str(&caps[1], "%Y%m%d").ok()?;
    let time = NaiveTime::parse_from_str(&caps[2], "%H%M%S").ok()?;
    let fraction = &caps[3];
    let micros = pad_fraction(fraction).parse::<u32>().ok()?;
    let naive = date.and_time(time).with_nanosecond(micros * 1_000)?;
    Some((local_from_naive(&naive)?, !fraction.is_empty()))
}

fn parse_time_struct(caps: &Captures) -> Option<(DateTime<Local>, bool)> {
    let field = |i: usize| caps[i].parse::<u32>().ok();
    let year = caps[1].parse::<i32>().ok()?;
    let naive = NaiveDate::from_ymd_opt(year, field(2)?, field(3)?)?.and_hms_opt(
        field(4)?,
        field(5)?,
        field(6)?,
    )?;
    Some((local_from_naive(&naive)?, false))
}

fn parse_epoch(caps: &Captures) -> Option<(DateTime<Local>, bool)> {
    let secs = caps[1].parse::<i64>().ok()?;
    Some((Local.timestamp_opt(secs, 0).single()?, false))
}

fn pad_fraction(fraction: &str) -> String {
    let mut padded: String = fraction.chars().take(FRACTION_WIDTH).collect();
    while padded.len() < FRACTION_WIDTH {
        padded.push('0');
    }
    padded
}

fn local_from_naive(naive: &NaiveDateTime) -> Option<DateTime<Local>> {
    Local.from_local_datetime(naive).earliest()
}

fn whole_seconds(time: DateTime<Local>) -> Option<DateTime<Local>> {
    let secs = time.timestamp();
    if secs <= 0 {
        return None;
    }
    Local.timestamp_opt(secs, 0).single()
}
