mod logging;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use pixstamp_core::{
    app_paths, load_config, read_history, replay, run_batch, save_config, AppConfig, BatchResult,
    Direction, EntryStatus, Precision, RunMode, StdFilesystem, StampStyle,
};
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "pixstamp")]
#[command(about = "写真・動画を撮影日時ベースのファイル名に一括リネームします")]
struct Cli {
    /// デバッグログを表示します (RUST_LOG が優先されます)
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Rename(RenameArgs),
    /// 履歴ファイルの操作を逆順に取り消します
    Undo { log: PathBuf },
    /// 履歴ファイルの操作を先頭から再適用します
    Redo { log: PathBuf },
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
    /// 既定値で設定ファイルを作成します
    Init {
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Debug, Args)]
struct RenameArgs {
    input: PathBuf,
    #[arg(long, default_value_t = false)]
    recursive: bool,
    #[arg(long, default_value_t = false)]
    include_hidden: bool,
    #[arg(long, default_value_t = false)]
    uppercase: bool,
    #[arg(long, default_value_t = false)]
    apply: bool,
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long, value_enum)]
    style: Option<StyleArg>,
    #[arg(long, value_enum)]
    precision: Option<PrecisionArg>,
    #[arg(long)]
    image_tag: Option<String>,
    #[arg(long)]
    video_tag: Option<String>,
    #[arg(long)]
    history_dir: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StyleArg {
    Standard,
    Epoch,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PrecisionArg {
    Seconds,
    Millis,
    Auto,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logger(cli.verbose);

    match cli.command {
        Commands::Rename(args) => cmd_rename(args),
        Commands::Undo { log } => cmd_replay(log, Direction::Reverse),
        Commands::Redo { log } => cmd_replay(log, Direction::Forward),
        Commands::Config(config) => match config.action {
            ConfigAction::Show => cmd_config_show(),
            ConfigAction::Init { force } => cmd_config_init(force),
        },
    }
}

fn apply_overrides(config: &mut AppConfig, args: &RenameArgs) {
    config.recursive |= args.recursive;
    config.include_hidden |= args.include_hidden;
    config.uppercase |= args.uppercase;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(style) = args.style {
        config.style = match style {
            StyleArg::Standard => StampStyle::Standard,
            StyleArg::Epoch => StampStyle::Epoch,
        };
    }
    if let Some(precision) = args.precision {
        config.precision = match precision {
            PrecisionArg::Seconds => Precision::Seconds,
            PrecisionArg::Millis => Precision::Millis,
            PrecisionArg::Auto => Precision::Auto,
        };
    }
    if let Some(tag) = &args.image_tag {
        config.image_tag = tag.clone();
    }
    if let Some(tag) = &args.video_tag {
        config.video_tag = tag.clone();
    }
    if let Some(dir) = &args.history_dir {
        config.history_dir = Some(dir.clone());
    }
}

fn cmd_rename(args: RenameArgs) -> Result<()> {
    let mut config = load_config()?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    let mode = if args.apply {
        RunMode::Apply
    } else {
        RunMode::Preview
    };
    let paths = app_paths()?;
    let options = config.batch_options(args.input.clone(), mode, &paths);
    debug!(?options, "バッチ設定");
    let result = run_batch(&options)?;

    match args.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Table => {
            print_table(&result);
        }
    }

    match mode {
        RunMode::Apply => {
            eprintln!(
                "適用完了: {}件 (変更なし {}件, スキップ {}件)",
                result.renamed, result.unchanged, result.skipped
            );
            if let Some(path) = &result.history_path {
                eprintln!("履歴ファイル: {}", path.display());
            }
        }
        RunMode::Preview => {
            eprintln!("dry-runモード: 実ファイルは変更していません。適用するには --apply を指定してください。");
        }
    }

    if result.failed > 0 {
        bail!("{}件のリネームに失敗しました", result.failed);
    }
    Ok(())
}

fn cmd_replay(log: PathBuf, direction: Direction) -> Result<()> {
    let records = read_history(&log)?;
    let result = replay(&records, direction, &StdFilesystem);
    let label = match direction {
        Direction::Forward => "再適用",
        Direction::Reverse => "取り消し",
    };
    println!(
        "{}完了: {}件 (元ファイルなし {}件, 失敗 {}件)",
        label, result.replayed, result.missing, result.failed
    );
    if result.failed > 0 {
        bail!("{}件の{}に失敗しました", result.failed, label);
    }
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let paths = app_paths()?;
    println!("設定ファイル: {}", paths.config_path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_config_init(force: bool) -> Result<()> {
    let paths = app_paths()?;
    if paths.config_path.exists() && !force {
        bail!(
            "設定ファイルが既に存在します: {} (上書きするには --force を指定してください)",
            paths.config_path.display()
        );
    }
    save_config(&AppConfig::default())?;
    println!("設定ファイルを作成しました: {}", paths.config_path.display());
    Ok(())
}

fn print_table(result: &BatchResult) {
    println!("元ファイル -> 新ファイル (status)");
    for entry in &result.entries {
        let status = match entry.status {
            EntryStatus::Renamed => "renamed",
            EntryStatus::Planned => "planned",
            EntryStatus::Unchanged => "unchanged",
            EntryStatus::Failed => "failed",
        };
        match &entry.reason {
            Some(reason) => println!(
                "{} -> {} ({}: {})",
                entry.source.display(),
                entry.destination.display(),
                status,
                reason
            ),
            None => println!(
                "{} -> {} ({})",
                entry.source.display(),
                entry.destination.display(),
                status
            ),
        }
    }

    println!(
        "\n集計: renamed={} planned={} unchanged={} skipped={} failed={}",
        result.renamed, result.planned, result.unchanged, result.skipped, result.failed
    );
}
