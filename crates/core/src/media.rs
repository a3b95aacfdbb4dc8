use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MediaFormat {
    Jpeg,
    Tiff,
    Png,
    Gif,
    Mp4,
    Mov,
}

const ALL_FORMATS: &[MediaFormat] = &[
    MediaFormat::Jpeg,
    MediaFormat::Tiff,
    MediaFormat::Png,
    MediaFormat::Gif,
    MediaFormat::Mp4,
    MediaFormat::Mov,
];

impl MediaFormat {
    pub fn kind(self) -> MediaKind {
        match self {
            MediaFormat::Jpeg | MediaFormat::Tiff | MediaFormat::Png | MediaFormat::Gif => {
                MediaKind::Image
            }
            MediaFormat::Mp4 | MediaFormat::Mov => MediaKind::Video,
        }
    }

    /// The first entry is the canonical extension.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            MediaFormat::Jpeg => &["jpg", "jpeg", "mpo"],
            MediaFormat::Tiff => &["tif", "tiff"],
            MediaFormat::Png => &["png"],
            MediaFormat::Gif => &["gif"],
            MediaFormat::Mp4 => &["mp4"],
            MediaFormat::Mov => &["mov"],
        }
    }

    pub fn carries_capture_time(self) -> bool {
        matches!(self, MediaFormat::Jpeg | MediaFormat::Tiff)
    }

    pub fn from_extension(ext: &str) -> Option<MediaFormat> {
        ALL_FORMATS.iter().copied().find(|format| {
            format
                .extensions()
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(ext))
        })
    }

    pub fn from_signature(header: &[u8]) -> Option<MediaFormat> {
        if header.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(MediaFormat::Jpeg);
        }
        if header.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(MediaFormat::Png);
        }
        if header.starts_with(b"II*\0") || header.starts_with(b"MM\0*") {
            return Some(MediaFormat::Tiff);
        }
        if header.starts_with(b"GIF87a") || header.starts_with(b"GIF89a") {
            return Some(MediaFormat::Gif);
        }
        if header.len() >= 12 && &header[4..8] == b"ftyp" {
            if &header[8..12] == b"qt  " {
                return Some(MediaFormat::Mov);
            }
            return Some(MediaFormat::Mp4);
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassTags {
    pub image: String,
    pub video: String,
}

impl Default for ClassTags {
    fn default() -> Self {
        Self {
            image: "img".to_string(),
            video: "mov".to_string(),
        }
    }
}

impl MediaKind {
    pub fn class_tag(self, tags: &ClassTags) -> Option<&str> {
        match self {
            MediaKind::Image => Some(tags.image.as_str()),
            MediaKind::Video => Some(tags.video.as_str()),
            MediaKind::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: MediaKind,
    pub format: Option<MediaFormat>,
    pub extension: String,
}

impl Classification {
    pub fn unknown(extension: String) -> Self {
        Self {
            kind: MediaKind::Unknown,
            format: None,
            extension,
        }
    }
}

pub trait MediaClassifier: Send + Sync {
    fn classify(&self, path: &Path) -> Classification;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureClassifier;

const SIGNATURE_LEN: usize = 16;

impl MediaClassifier for SignatureClassifier {
    fn classify(&self, path: &Path) -> Classification {
        let extension = lower_extension(path);
        let format = read_header(path)
            .and_then(|header| MediaFormat::from_signature(&header))
            .or_else(|| extension.as_deref().and_then(MediaFormat::from_extension));

        match format {
            Some(format) => Classification {
                kind: format.kind(),
                format: Some(format),
                extension: extension.unwrap_or_else(|| format.extensions()[0].to_string()),
            },
            None => Classification::unknown(extension.unwrap_or_default()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionClassifier;

impl MediaClassifier for ExtensionClassifier {
    fn classify(&self, path: &Path) -> Classification {
        let extension = lower_extension(path).unwrap_or_default();
        match MediaFormat::from_extension(&extension) {
            Some(format) => Classification {
                kind: format.kind(),
                format: Some(format),
                extension,
            },
            None => Classification::unknown(extension),
        }
    }
}

fn lower_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

fn read_header(path: &Path) -> Option<Vec<u8>> {
    let mut file = File::open(path).ok()?;
    let mut header = Vec::with_capacity(SIGNATURE_LEN);
    file.by_ref()
        .take(SIGNATURE_LEN as u64)
        .read_to_end(&mut header)
        .ok()?;
    Some(header)
}
