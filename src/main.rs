mod cli;

use anyhow::Result;
use castserve::av::{self, Device};
use castserve::catalog::Catalog;
use castserve::config;
use castserve::conversion::TranscodeQueue;
use castserve::watch::Crawler;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise derive the level from -v.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "castserve=trace".to_string()
        } else {
            "castserve=info".to_string()
        }
    });
    tracing_subscriber::fmt().with_env_filter(&env_filter).init();

    match cli.command {
        Commands::Serve { root, cache, lang } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(cli.config.as_deref(), root, cache, lang))
        }
        Commands::Probe { file, json, lang } => probe_file(&file, json, &lang),
        Commands::Transcode {
            input,
            device,
            output,
            lang,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(transcode_file(&input, &device, output, &lang))
        }
        Commands::Version => {
            println!("castserve {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn serve(
    config_path: Option<&Path>,
    root: Option<PathBuf>,
    cache: Option<PathBuf>,
    lang: Option<String>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let root = match root.or(config.library.root_dir) {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let cache = cache
        .or(config.library.cache_dir)
        .unwrap_or_else(|| root.join(".cache"));
    let lang = lang.unwrap_or(config.library.preferred_lang);

    tracing::info!(
        "serving {} (cache {}, preferred language {})",
        root.display(),
        cache.display(),
        lang
    );
    let catalog = Arc::new(Catalog::new(&root, &cache, &lang)?);
    let mut crawler = Crawler::new(
        catalog.clone(),
        Duration::from_secs(config.watch.debounce_secs),
    )?;
    let queue = TranscodeQueue::new(catalog.clone());

    // Returns on interrupt, on watcher failure, or when our own binary was
    // replaced on disk; the supervisor restarts us.
    let result = crawler.watch_files().await;

    tracing::info!("shutting down");
    queue.close().await;
    if let Err(e) = crawler.close() {
        tracing::warn!("closing watcher: {e}");
    }
    result
}

fn probe_file(file: &Path, json: bool, lang: &str) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("file does not exist: {}", file.display());
    }
    let info = av::identify(file, lang)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }
    println!("File: {}", file.display());
    println!("Container: {}", info.container);
    if !info.duration.is_empty() {
        println!("Duration: {}", info.duration);
    }
    println!("Video: #{} {}", info.video_index, info.video_codec);
    print!("Audio: #{} {}", info.audio_index, info.audio_codec);
    if !info.audio_lang.is_empty() {
        print!(" ({})", info.audio_lang);
    }
    println!();
    if let Some(frames) = info.total_frames {
        println!("Frames: {frames}");
    }
    Ok(())
}

async fn transcode_file(
    input: &Path,
    device: &str,
    output: Option<PathBuf>,
    lang: &str,
) -> Result<()> {
    let device: Device = device.parse().map_err(anyhow::Error::msg)?;
    if !input.exists() {
        anyhow::bail!("file does not exist: {}", input.display());
    }
    let output = output.unwrap_or_else(|| input.with_extension(device.container()));

    let probe_input = input.to_path_buf();
    let probe_lang = lang.to_string();
    let info =
        tokio::task::spawn_blocking(move || av::identify(&probe_input, &probe_lang)).await??;

    av::transcode(device, input, &output, &info, |frame| {
        tracing::debug!("frame {frame}");
    })
    .await?;
    println!("wrote {}", output.display());
    Ok(())
}
