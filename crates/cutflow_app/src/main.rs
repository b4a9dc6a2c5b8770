use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use cutflow_core::version::versioned_id;
use cutflow_core::{base_of, Adjustments, JobSource, PipelineStage, Quality};
use cutflow_engine::{Orchestrator, ReqwestBackend};
use pipeline_logging::{parse_level, pipeline_info, pipeline_warn, LevelFilter};

mod config;
mod logging;
mod render;

use config::AppConfig;
use logging::LogDestination;
use render::{summary_lines, TerminalView};

#[derive(Parser, Debug)]
#[command(name = "cutflow", version, about = "Drive the remote video-editing pipeline")]
struct Cli {
    /// Config file (RON); defaults to ./cutflow.ron when present
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Backend base url, e.g. http://localhost:8000
    #[arg(long, global = true, value_name = "URL")]
    base_url: Option<String>,

    /// Where downloaded exports are written
    #[arg(long, global = true, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Log destination
    #[arg(long, global = true, value_enum)]
    log: Option<LogDestination>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a job, review it, apply adjustments, export and download
    Run(RunArgs),
    /// Check that the backend answers
    Health,
    /// List the versions recorded for a project
    Versions {
        /// Project id; a version id such as p1_v2 is mapped to its base
        id: String,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Source video (mp4, mov or avi)
    #[arg(
        long,
        value_name = "PATH",
        required_unless_present = "manifest",
        conflicts_with = "manifest"
    )]
    video: Option<PathBuf>,

    /// Asset manifest (JSON) for an assembly job
    #[arg(long, value_name = "PATH")]
    manifest: Option<PathBuf>,

    /// Optional script outline (JSON) for an assembly job
    #[arg(long, value_name = "PATH", requires = "manifest")]
    outline: Option<PathBuf>,

    /// Target platform
    #[arg(long)]
    platform: Option<String>,

    /// Editing style
    #[arg(long)]
    style: Option<String>,

    /// One adjustment round, e.g. "hook=regenerate,pace=faster"; repeat for more rounds
    #[arg(long = "adjust", value_name = "ASPECT=ACTION[,...]", value_parser = parse_adjustments)]
    adjust: Vec<Adjustments>,

    /// Export quality
    #[arg(long, default_value = "1080p", value_parser = parse_quality)]
    quality: Quality,

    /// Stop after review instead of exporting
    #[arg(long)]
    no_export: bool,

    /// How many times to retry a failed download
    #[arg(long, default_value_t = 1)]
    download_retries: u32,

    /// Skip the health check before creating the job
    #[arg(long)]
    skip_health: bool,
}

fn parse_adjustments(raw: &str) -> Result<Adjustments, String> {
    let mut adjustments = Adjustments::default();
    for pair in raw.split(',').filter(|pair| !pair.trim().is_empty()) {
        adjustments.apply_pair(pair)?;
    }
    if adjustments.is_noop() {
        return Err("adjustment round changes nothing".to_string());
    }
    Ok(adjustments)
}

fn parse_quality(raw: &str) -> Result<Quality, String> {
    raw.parse()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, config_warning) = config::load(cli.config.as_deref());
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Some(output_dir) = cli.output_dir {
        config.output_dir = output_dir;
    }
    if let Some(destination) = cli.log {
        config.log_destination = destination;
    }

    let level = parse_level(&config.log_level).unwrap_or(LevelFilter::Info);
    logging::initialize(config.log_destination, level);
    if let Some(warning) = config_warning {
        pipeline_warn!("{}", warning);
    }
    if parse_level(&config.log_level).is_none() {
        pipeline_warn!("Unknown log level {:?}; using info", config.log_level);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async {
        match cli.command {
            Commands::Run(args) => cmd_run(&config, args).await,
            Commands::Health => cmd_health(&config).await,
            Commands::Versions { id } => cmd_versions(&config, &id).await,
        }
    })
}

fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator> {
    let backend = ReqwestBackend::new(config.backend_settings())
        .with_context(|| format!("invalid backend url {:?}", config.base_url))?;
    Ok(Orchestrator::new(Arc::new(backend), config.orchestrator_settings()))
}

async fn cmd_health(config: &AppConfig) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    orchestrator.check_health().await?;
    println!("backend ok at {}", config.base_url);
    Ok(())
}

async fn cmd_versions(config: &AppConfig, id: &str) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let base = base_of(id);
    let versions = orchestrator
        .list_versions(base)
        .await
        .with_context(|| format!("failed to list versions of {base}"))?;
    if versions.is_empty() {
        println!("{base}: no versions");
    }
    for info in versions {
        let status = info
            .status
            .map(|status| format!("{status:?}").to_lowercase())
            .unwrap_or_else(|| "unknown".to_string());
        let id = versioned_id(base, info.version);
        match info.preview_url {
            Some(url) => println!("{id}  {status}  {url}"),
            None => println!("{id}  {status}"),
        }
    }
    Ok(())
}

async fn cmd_run(config: &AppConfig, args: RunArgs) -> Result<()> {
    let mut options = config.create_options();
    if let Some(platform) = args.platform {
        options.platform = platform;
    }
    if let Some(style) = args.style {
        options.style = style;
    }
    let source = match (args.video, args.manifest) {
        (Some(path), _) => JobSource::Video { path, options },
        (None, Some(manifest)) => JobSource::Assembly {
            manifest,
            outline: args.outline,
            options,
        },
        (None, None) => bail!("either --video or --manifest is required"),
    };

    let mut orchestrator =
        build_orchestrator(config)?.with_sink(Box::new(TerminalView::default()));
    if !args.skip_health {
        orchestrator.check_health().await?;
    }

    let export = (!args.no_export).then_some(args.quality);
    let result = drive(
        &mut orchestrator,
        source,
        args.adjust,
        export,
        args.download_retries,
    )
    .await;
    for line in summary_lines(&orchestrator.view()) {
        println!("{line}");
    }
    result
}

async fn drive(
    orchestrator: &mut Orchestrator,
    source: JobSource,
    rounds: Vec<Adjustments>,
    export: Option<Quality>,
    download_retries: u32,
) -> Result<()> {
    orchestrator.start(source).await;
    orchestrator.expect_stage(PipelineStage::Reviewing)?;

    for (round, adjustments) in rounds.into_iter().enumerate() {
        pipeline_info!("Adjustment round {}", round + 1);
        orchestrator.adjust(adjustments).await;
        orchestrator.expect_stage(PipelineStage::Reviewing)?;
    }
    let Some(quality) = export else {
        return Ok(());
    };

    let mut stage = orchestrator.export(quality).await;
    let mut retries = 0;
    while stage == PipelineStage::Exporting && retries < download_retries {
        retries += 1;
        pipeline_warn!("Retrying download ({}/{})", retries, download_retries);
        stage = orchestrator.retry_download().await;
    }
    orchestrator.expect_stage(PipelineStage::Downloaded)?;
    Ok(())
}
