use crate::batch::BatchOptions;
use crate::media::ClassTags;
use crate::stamp::{Precision, StampFormat, StampStyle};
use crate::worker::{RunMode, MAX_WORKERS};
use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub workers: usize,
    pub recursive: bool,
    pub include_hidden: bool,
    pub uppercase: bool,
    pub style: StampStyle,
    pub precision: Precision,
    pub image_tag: String,
    pub video_tag: String,
    pub history_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let tags = ClassTags::default();
        Self {
            workers: 1,
            recursive: false,
            include_hidden: false,
            uppercase: false,
            style: StampStyle::default(),
            precision: Precision::default(),
            image_tag: tags.image,
            video_tag: tags.video,
            history_dir: None,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 || self.workers > MAX_WORKERS {
            bail!(
                "workers は 1 から {} の範囲で指定してください: {}",
                MAX_WORKERS,
                self.workers
            );
        }
        for (field, tag) in [("image_tag", &self.image_tag), ("video_tag", &self.video_tag)] {
            if tag.is_empty() {
                bail!("{field} が空です");
            }
            if tag.contains(['/', '\\']) {
                bail!("{field} にパス区切り文字は使えません: {tag}");
            }
        }
        Ok(())
    }

    pub fn stamp_format(&self) -> StampFormat {
        StampFormat {
            style: self.style,
            precision: self.precision,
            tags: ClassTags {
                image: self.image_tag.clone(),
                video: self.video_tag.clone(),
            },
        }
    }

    pub fn batch_options(&self, input: PathBuf, mode: RunMode, paths: &AppPaths) -> BatchOptions {
        BatchOptions {
            input,
            recursive: self.recursive,
            include_hidden: self.include_hidden,
            uppercase: self.uppercase,
            workers: self.workers,
            mode,
            format: self.stamp_format(),
            history_dir: self
                .history_dir
                .clone()
                .unwrap_or_else(|| paths.history_dir.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub config_path: PathBuf,
    pub history_dir: PathBuf,
}

pub fn app_paths() -> Result<AppPaths> {
    let proj = ProjectDirs::from("com", "pixstamp", "pixstamp")
        .context("OS標準設定ディレクトリを取得できませんでした")?;
    let config_dir = proj.config_dir().to_path_buf();
    Ok(AppPaths {
        config_path: config_dir.join("config.toml"),
        history_dir: proj.data_dir().join("history"),
        config_dir,
    })
}

pub fn load_config() -> Result<AppConfig> {
    let paths = app_paths()?;
    load_config_from(&paths.config_path)
}

pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("設定ファイルを読めませんでした: {}", path.display()))?;

    let config = toml::from_str::<AppConfig>(&raw).context("設定ファイルのパースに失敗しました")?;
    config
        .validate()
        .with_context(|| format!("設定ファイルの値が不正です: {}", path.display()))?;
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> Result<()> {
    let paths = app_paths()?;
    save_config_to(config, &paths.config_path)
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    config.validate()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| {
            format!("設定ディレクトリを作成できませんでした: {}", dir.display())
        })?;
    }
    let body = toml::to_string_pretty(config).context("設定のシリアライズに失敗しました")?;
    fs::write(path, body)
        .with_context(|| format!("設定ファイルを書き込めませんでした: {}", path.display()))?;
    Ok(())
}
