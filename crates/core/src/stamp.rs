use crate::inspector::TimestampInfo;
use crate::media::{ClassTags, MediaKind};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StampStyle {
    #[default]
    Standard,
    Epoch,
}

/// `Auto` keeps milliseconds only when the file name supplied a fraction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Seconds,
    Millis,
    #[default]
    Auto,
}

impl Precision {
    fn includes_millis(self, fraction_supplied: bool) -> bool {
        match self {
            Precision::Seconds => false,
            Precision::Millis => true,
            Precision::Auto => fraction_supplied,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StampIdentity {
    pub key: String,
    pub class_tag: String,
    pub stamp: String,
    pub extension: String,
}

impl StampIdentity {
    pub fn name_prefix(&self) -> String {
        format!("{}_{}", self.class_tag, self.stamp)
    }

    pub fn file_name(&self, seq: usize, extension: &str, uppercase: bool) -> String {
        let mut name = format!("{}{:03}", self.name_prefix(), seq);
        if !extension.is_empty() {
            name.push('.');
            name.push_str(extension);
        }
        if uppercase {
            name.to_uppercase()
        } else {
            name
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StampFormat {
    pub style: StampStyle,
    pub precision: Precision,
    pub tags: ClassTags,
}

impl StampFormat {
    pub fn build(
        &self,
        time: &DateTime<Local>,
        fraction_supplied: bool,
        kind: MediaKind,
        extension: &str,
    ) -> Option<StampIdentity> {
        let class_tag = kind.class_tag(&self.tags)?.to_string();

        let mut stamp = match self.style {
            StampStyle::Standard => time.format("%Y%m%d_%H%M%S").to_string(),
            StampStyle::Epoch => time.timestamp().to_string(),
        };
        if self.precision.includes_millis(fraction_supplied) {
            stamp.push_str(&format!("_{:03}", time.timestamp_subsec_millis()));
        }

        Some(StampIdentity {
            key: format!("{}/{}", class_tag, stamp),
            class_tag,
            stamp,
            extension: extension.to_ascii_lowercase(),
        })
    }

    pub fn identity_for(&self, info: &TimestampInfo) -> Option<StampIdentity> {
        self.build(
            &info.time,
            info.fraction_supplied,
            info.kind,
            &info.extension,
        )
    }
}
