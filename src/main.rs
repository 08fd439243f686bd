//! Main entry point for the tubelist CLI

use anyhow::Context;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tubelist::cli::args::video_id_from_input;
use tubelist::cli::{Args, Command, OutputFormatter, VerbosityLevel};
use tubelist::core::{ApiDurationResolver, MemoryPlaylist, Resolver};
use tubelist::platform::cipher::extract_program;
use tubelist::utils::ConfigStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbosity_level())?;
    debug!("Starting tubelist with args: {:?}", args);

    let formatter = OutputFormatter::new(args.verbosity_level());

    let result = match &args.command {
        Command::Resolve { link, json, .. } => handle_resolve(&args, link, *json, &formatter).await,
        Command::Stream { video } => handle_stream(&args, video, &formatter).await,
        Command::Cipher { script, signature } => {
            handle_cipher(script, signature.as_deref(), &formatter).await
        }
    };

    if let Err(e) = result {
        formatter.error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

async fn open_store(args: &Args) -> anyhow::Result<Arc<ConfigStore>> {
    let store = match &args.config {
        Some(path) => ConfigStore::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => ConfigStore::in_memory(),
    };
    Ok(Arc::new(store))
}

/// Cancel `token` on Ctrl-C
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current page");
            token.cancel();
        }
    });
}

async fn handle_resolve(
    args: &Args,
    link: &str,
    json: bool,
    formatter: &OutputFormatter,
) -> anyhow::Result<()> {
    let settings = args.settings();
    let store = open_store(args).await?;
    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let resolver = Resolver::new(settings.clone())?
        .with_store(store.clone())
        .with_cancel_token(cancel);
    let durations = ApiDurationResolver::new(resolver.transport(), store, &settings.api_key);
    let resolver = resolver.with_duration_resolver(Arc::new(durations));

    let playlist = Arc::new(MemoryPlaylist::new("cli"));
    let flags = args.resolve_flags();
    if !flags.is_empty() {
        formatter.info(&format!("Session flags: {:?}", flags));
    }

    let spinner = formatter.spinner(&format!("Resolving {}", link));
    let outcome = resolver
        .resolve_url_with(link, playlist.clone(), flags)
        .await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let report = match outcome {
        Ok(report) => report,
        Err(e) if e.is_session_abort() => {
            return Err(e).context("ingestion stopped before reaching the end of the listing")
        }
        Err(e) => return Err(e.into()),
    };
    info!("Resolved {} into {} tracks", link, playlist.len());

    if json {
        println!("{}", serde_json::to_string_pretty(&playlist.items())?);
    } else {
        formatter.print_report(&report);
        formatter.print_tracks(&playlist.items());
    }
    Ok(())
}

async fn handle_stream(
    args: &Args,
    video: &str,
    formatter: &OutputFormatter,
) -> anyhow::Result<()> {
    let resolver = Resolver::new(args.settings())?;

    match resolver.load_signature_decoder().await {
        Ok(program) => formatter.info(&format!(
            "Signature program loaded ({} steps)",
            program.steps().len()
        )),
        Err(e) => formatter.warning(&format!("Signature decoding unavailable: {}", e)),
    }

    let video_id = video_id_from_input(video);
    match resolver.stream_url(&video_id).await? {
        Some(url) => println!("{}", url),
        None => anyhow::bail!("no playable stream found for {}", video_id),
    }
    Ok(())
}

async fn handle_cipher(
    script: &Path,
    signature: Option<&str>,
    formatter: &OutputFormatter,
) -> anyhow::Result<()> {
    let source = tokio::fs::read_to_string(script)
        .await
        .with_context(|| format!("reading {}", script.display()))?;
    let source: String = source.chars().filter(|c| *c != '\n' && *c != '\r').collect();

    let program = extract_program(&source)?;
    formatter.success(&format!("{} steps extracted", program.steps().len()));
    formatter.print_program(&program);

    if let Some(signature) = signature {
        println!("{}", program.decode(signature));
    }
    Ok(())
}

/// Initialize logging system
fn init_logging(verbosity: VerbosityLevel) -> anyhow::Result<()> {
    let default_level = match verbosity {
        VerbosityLevel::Quiet => "error",
        VerbosityLevel::Normal => "info",
        VerbosityLevel::Verbose => "debug",
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init()?;

    Ok(())
}
