//! Command-line front end for the capture pipeline.
//!
//! - `normalize <image> [--out-dir DIR]` prepares a photo for OCR upload.
//! - `boxes <ocr.json> [--granularity paragraph|annotation]` prints the
//!   reconstructed text boxes of a saved OCR response as JSON.
//! - `clear-cache` removes prepared uploads.
//!
//! `--config <path>` may precede any command; the default is
//! `conf/config.toml`.

use anyhow::{Context, Result, anyhow, bail};
use lingua_lens::cache::clear_uploads;
use lingua_lens::cancellation::CancellationToken;
use lingua_lens::config::{AppConfig, load_config};
use lingua_lens::imaging::{NormalizeOutcome, normalize_in_background};
use lingua_lens::ocr::{Granularity, reconstruct_json};
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

const USAGE: &str = "Usage: lingua-lens [--config <path>] \
<normalize <image> [--out-dir DIR] | boxes <ocr.json> [--granularity paragraph|annotation] | clear-cache>";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Normalize {
        source: PathBuf,
        out_dir: Option<PathBuf>,
    },
    Boxes {
        path: PathBuf,
        granularity: Option<Granularity>,
    },
    ClearCache,
}

#[derive(Debug, Clone, PartialEq)]
struct Cli {
    config_path: PathBuf,
    command: Command,
}

fn main() {
    let reload_handle = init_tracing();
    if let Err(err) = run(&reload_handle) {
        error!("{err:?}");
        std::process::exit(1);
    }
}

fn run(reload_handle: &ReloadHandle) -> Result<()> {
    let cli = parse_args(env::args().skip(1))?;
    let config = load_config(&cli.config_path);
    set_log_level(reload_handle, config.log_level.as_filter_str());
    info!(
        config = %cli.config_path.display(),
        level = %config.log_level,
        "Starting lingua-lens"
    );

    match cli.command {
        Command::Normalize { source, out_dir } => normalize(&config, source, out_dir),
        Command::Boxes { path, granularity } => {
            print_boxes(path, granularity.unwrap_or(config.default_granularity))
        }
        Command::ClearCache => {
            let removed = clear_uploads(&config.cache_root())?;
            println!("Removed {removed} prepared uploads");
            Ok(())
        }
    }
}

fn normalize(config: &AppConfig, source: PathBuf, out_dir: Option<PathBuf>) -> Result<()> {
    if !source.exists() {
        bail!("File not found: {}", source.display());
    }
    let cache_root = out_dir.unwrap_or_else(|| config.cache_root());
    let options = config.normalize_options();
    info!(
        source = %source.display(),
        cache = %cache_root.display(),
        max_width = options.max_width,
        max_height = options.max_height,
        quality = options.jpeg_quality,
        "Normalizing image"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let outcome = runtime.block_on(normalize_in_background(
        source,
        cache_root,
        options,
        CancellationToken::new(),
    ));
    match outcome {
        NormalizeOutcome::Ready(image) => {
            println!("{}", image.upload_path.display());
            let (width, height) = (image.display.width(), image.display.height());
            info!(
                width,
                height,
                sample = image.sample_size,
                rotation = image.orientation.degrees(),
                "Prepared upload"
            );
            Ok(())
        }
        NormalizeOutcome::Failed { message } => Err(anyhow!(message)),
        NormalizeOutcome::Cancelled => bail!("Normalization was cancelled"),
    }
}

fn print_boxes(path: PathBuf, granularity: Granularity) -> Result<()> {
    let json = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let boxes = reconstruct_json(&json, granularity)?;
    if boxes.is_empty() {
        warn!(path = %path.display(), "OCR response contains no text");
    }
    info!(count = boxes.len(), %granularity, "Reconstructed text boxes");
    println!(
        "{}",
        serde_json::to_string_pretty(&boxes).context("Serializing text boxes")?
    );
    Ok(())
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Cli> {
    let mut args = args.into_iter();
    let mut config_path = PathBuf::from("conf/config.toml");
    let mut command_name = None;
    let mut positional = None;
    let mut out_dir = None;
    let mut granularity = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_path = PathBuf::from(flag_value(&mut args, "--config")?),
            "--out-dir" => out_dir = Some(PathBuf::from(flag_value(&mut args, "--out-dir")?)),
            "--granularity" => {
                granularity = Some(flag_value(&mut args, "--granularity")?.parse()?);
            }
            "-h" | "--help" => bail!("{USAGE}"),
            flag if flag.starts_with("--") => bail!("Unknown option {flag}\n{USAGE}"),
            _ if command_name.is_none() => command_name = Some(arg),
            _ if positional.is_none() => positional = Some(PathBuf::from(arg)),
            _ => bail!("Unexpected argument {arg}\n{USAGE}"),
        }
    }

    let command = match command_name.as_deref() {
        Some("normalize") => Command::Normalize {
            source: positional.ok_or_else(|| anyhow!("normalize needs an image path\n{USAGE}"))?,
            out_dir,
        },
        Some("boxes") => Command::Boxes {
            path: positional.ok_or_else(|| anyhow!("boxes needs an OCR JSON path\n{USAGE}"))?,
            granularity,
        },
        Some("clear-cache") => Command::ClearCache,
        Some(other) => bail!("Unknown command {other}\n{USAGE}"),
        None => bail!("{USAGE}"),
    };
    Ok(Cli {
        config_path,
        command,
    })
}

fn flag_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| anyhow!("{flag} expects a value\n{USAGE}"))
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter_layer),
        )
        .init();
    handle
}

fn set_log_level(handle: &ReloadHandle, level: &str) {
    if env::var_os("RUST_LOG").is_some() {
        info!("RUST_LOG is set; ignoring config log level");
        return;
    }
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(err) = handle.modify(|filter| *filter = parsed) {
        warn!(%level, "Failed to update log level from config: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_normalize_with_out_dir() {
        let cli = parse_args(args(&["normalize", "photo.jpg", "--out-dir", "/tmp/x"])).unwrap();
        assert_eq!(cli.config_path, PathBuf::from("conf/config.toml"));
        assert_eq!(
            cli.command,
            Command::Normalize {
                source: PathBuf::from("photo.jpg"),
                out_dir: Some(PathBuf::from("/tmp/x")),
            }
        );
    }

    #[test]
    fn parses_boxes_with_granularity_and_config() {
        let cli = parse_args(args(&[
            "--config",
            "alt.toml",
            "boxes",
            "ocr.json",
            "--granularity",
            "annotation",
        ]))
        .unwrap();
        assert_eq!(cli.config_path, PathBuf::from("alt.toml"));
        assert_eq!(
            cli.command,
            Command::Boxes {
                path: PathBuf::from("ocr.json"),
                granularity: Some(Granularity::Annotation),
            }
        );
    }

    #[test]
    fn rejects_missing_values_and_unknown_commands() {
        assert!(parse_args(args(&[])).is_err());
        assert!(parse_args(args(&["boxes"])).is_err());
        assert!(parse_args(args(&["normalize", "a.jpg", "--out-dir"])).is_err());
        assert!(parse_args(args(&["translate", "a.jpg"])).is_err());
        assert!(parse_args(args(&["boxes", "a.json", "--granularity", "line"])).is_err());
    }
}
