use crate::media::MediaFormat;
use chrono::NaiveDateTime;
use exif::{In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

pub trait MetadataTimeReader: Send + Sync {
    fn capture_time(&self, path: &Path, format: MediaFormat) -> Option<NaiveDateTime>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExifTimeReader;

#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

impl MetadataTimeReader for NoMetadata {
    fn capture_time(&self, _path: &Path, _format: MediaFormat) -> Option<NaiveDateTime> {
        None
    }
}

const CAPTURE_TAGS: &[Tag] = &[Tag::DateTimeOriginal, Tag::DateTimeDigitized];

impl MetadataTimeReader for ExifTimeReader {
    fn capture_time(&self, path: &Path, format: MediaFormat) -> Option<NaiveDateTime> {
        if !format.carries_capture_time() {
            return None;
        }

        let file = File::open(path).ok()?;
        let mut buf = BufReader::new(file);
        let exif = match Reader::new().read_from_container(&mut buf) {
            Ok(exif) => exif,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "EXIFを解析できませんでした");
                return None;
            }
        };

        CAPTURE_TAGS.iter().find_map(|tag| {
            let field = exif.get_field(*tag, In::PRIMARY)?;
            match &field.value {
                Value::Ascii(values) => values
                    .first()
                    .and_then(|raw| std::str::from_utf8(raw).ok())
                    .and_then(parse_capture_time),
                _ => None,
            }
        })
    }
}

pub(crate) fn parse_capture_time(input: &str) -> Option<NaiveDateTime> {
    let normalized = input.trim().trim_end_matches('\0');

    let candidates = [
        "%Y:%m:%d %H:%M:%S",
        "%Y:%m:%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
    ];

    candidates
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(normalized, fmt).ok())
}
