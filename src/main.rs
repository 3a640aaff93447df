mod cli;

use reelpipe::{
    config::{self, Config},
    coordinator::{Coordinator, CoordinatorSettings},
    server::{self, AppContext},
};
use reelpipe_av::{FfmpegTranscoder, TargetFormat, ToolRegistry, Transcoder};
use reelpipe_common::RawMedia;
use reelpipe_ingest::HttpFetcher;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { host, port } => {
            let mut config = config::load_config_or_default(cli.config.as_deref())?;
            init_logging(cli.verbose, &config);

            // CLI flags win over the config file and environment
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(config))
        }
        Commands::Transcode {
            input,
            format,
            output,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            init_logging(cli.verbose, &config);

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(transcode_file(&config, &input, &format, output))
        }
        Commands::Formats => {
            list_formats();
            Ok(())
        }
        Commands::CheckTools => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            init_logging(cli.verbose, &config);

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(check_tools(&config))
        }
        Commands::Validate {
            config: config_path,
        } => {
            init_logging(cli.verbose, &Config::default());
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("reelpipe {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize logging.
///
/// Respects `RUST_LOG` if set; otherwise uses the configured level, raised
/// to trace for reelpipe crates when verbose.
fn init_logging(verbose: bool, config: &Config) {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        let mut filter = if verbose {
            "reelpipe=trace,reelpipe_av=trace,reelpipe_ingest=trace,reelpipe_common=trace,tower_http=debug"
                .to_string()
        } else {
            let level = &config.logging.level;
            format!("warn,reelpipe={level},reelpipe_av={level},reelpipe_ingest={level},tower_http=info")
        };
        if config.logging.raw_ingest {
            filter.push_str(",reelpipe::raw_ingest=debug");
        }
        filter
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();
}

async fn start_server(config: Config) -> Result<()> {
    tracing::info!("Starting reelpipe server");

    let tools = Arc::new(ToolRegistry::discover(&config.tools));
    if tools.get("ffmpeg").is_none() {
        tracing::warn!("ffmpeg not found; transcodes will fail until it is installed");
    }

    let fetch_settings = config
        .ingest
        .fetch_settings(config.logging.raw_ingest, config.transcode.work_dir.clone());
    let fetcher = HttpFetcher::new(fetch_settings, tools.clone())?;
    let transcoder = FfmpegTranscoder::new(tools.clone(), config.transcode.settings());

    let coordinator = Coordinator::new(
        Arc::new(fetcher),
        Arc::new(transcoder),
        CoordinatorSettings::from(&config),
    );

    let shutdown = CancellationToken::new();
    let sweeper = coordinator.spawn_sweeper(
        Duration::from_secs(config.jobs.sweep_interval_secs),
        shutdown.clone(),
    );

    let ctx = AppContext {
        coordinator,
        config: Arc::new(config),
        tools,
    };

    let server_result = server::start_server(ctx).await;

    tracing::info!("Shutting down...");
    shutdown.cancel();
    let _ = sweeper.await;

    server_result
}

async fn transcode_file(
    config: &Config,
    input: &Path,
    format: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let target: TargetFormat = format.parse()?;

    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }
    let output = output.unwrap_or_else(|| default_output_path(input, target));

    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {:?}", input))?;
    let media = RawMedia::new(bytes, None, input.display().to_string());

    let tools = Arc::new(ToolRegistry::discover(&config.tools));
    let transcoder = FfmpegTranscoder::new(tools, config.transcode.settings());

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    println!("Transcoding {} -> {} ({})", input.display(), output.display(), target);
    let artifact = transcoder.transcode(media, target, cancel).await?;

    tokio::fs::write(&output, &artifact.bytes)
        .await
        .with_context(|| format!("Failed to write {:?}", output))?;

    println!("✓ Wrote {} bytes to {}", artifact.size(), output.display());
    if let Some(duration) = artifact.metadata.duration_secs {
        println!("  Duration: {:.2}s", duration);
    }
    if let (Some(w), Some(h)) = (artifact.metadata.width, artifact.metadata.height) {
        println!("  Resolution: {}x{}", w, h);
    }

    Ok(())
}

/// `clip.mov` -> `clip.mp4`; an input that already has the target extension
/// gets the format id inserted (`clip.mp4` -> `clip.mp4-720p.mp4`).
fn default_output_path(input: &Path, target: TargetFormat) -> PathBuf {
    let candidate = input.with_extension(target.extension());
    if candidate != input {
        return candidate;
    }
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}.{}.{}", stem, target.id(), target.extension()))
}

fn list_formats() {
    println!("Supported target formats:\n");
    for format in TargetFormat::all() {
        println!(
            "  {:<10} {:<12} {}",
            format.id(),
            format.content_type(),
            format.description()
        );
    }
}

async fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let registry = ToolRegistry::discover(&config.tools);
    let tools = registry.check_all().await;
    let mut ffmpeg_ok = false;

    for tool in &tools {
        let status = if tool.available { "✓" } else { "✗" };
        if tool.name == "ffmpeg" {
            ffmpeg_ok = tool.available;
        }

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if tools.iter().all(|t| t.available) {
        println!("All tools are available!");
    } else if ffmpeg_ok {
        println!("ffmpeg is available; install the missing tools to enable all features.");
    } else {
        println!("ffmpeg is missing. Transcoding will not work until it is installed.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let path = path.map(Path::to_path_buf).or_else(config::find_config_file);

    let config = match &path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?
        }
        None => {
            println!("No config file found, validating defaults");
            config::load_config_or_default(None)?
        }
    };

    println!("✓ Configuration is valid");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!(
        "  Ingest: {} attempts, {}s timeout, {} req/min",
        config.ingest.max_attempts, config.ingest.request_timeout_secs, config.ingest.requests_per_minute
    );
    println!(
        "  Transcode: {} concurrent, {}s timeout, max {}p",
        config.transcode.max_concurrent, config.transcode.timeout_secs, config.transcode.max_height
    );
    println!(
        "  Jobs: retained {}s, swept every {}s",
        config.jobs.retention_secs, config.jobs.sweep_interval_secs
    );
    println!("  Raw ingest logging: {}", config.logging.raw_ingest);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_swaps_extension() {
        assert_eq!(
            default_output_path(Path::new("/tmp/clip.mov"), TargetFormat::Mp4_720p),
            PathBuf::from("/tmp/clip.mp4")
        );
        assert_eq!(
            default_output_path(Path::new("/tmp/clip.mp4"), TargetFormat::Mp4_720p),
            PathBuf::from("/tmp/clip.mp4-720p.mp4")
        );
        assert_eq!(
            default_output_path(Path::new("song.wav"), TargetFormat::Mp3),
            PathBuf::from("song.mp3")
        );
    }
}
