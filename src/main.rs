mod cli;
mod ui;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command, ProfileArg};
use genjob::artifact::Artifact;
use genjob::config::GenjobConfig;
use genjob::kie::JobClient;
use genjob::manifest::{DEFAULT_MANIFEST, Manifest, scan_images};
use genjob::pipeline::{Pipeline, WorkUnit};
use genjob::poller::{self, TokioClock};
use genjob::units::{dated_dir, image_units, plan_video_units};
use genjob::upload::Uploader;
use genjob::{Error, Result};
use ui::{ActiveBar, RunProgress};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "genjob=debug" } else { "genjob=info" };
    let active = ActiveBar::default();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(active.clone()))
        .init();

    let config = GenjobConfig::load(cli.config.as_deref()).context("loading configuration")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current step");
            on_signal.cancel();
        }
    });

    match cli.command {
        Command::Images {
            manifest,
            only,
            out,
        } => {
            let timing = config.image.timing();
            let client = JobClient::new(config.client_config(&timing))?;
            let manifest = Manifest::load(&manifest)?;
            let personas = manifest.select(&only)?;
            let out_dir = out
                .or_else(|| config.image.output_dir.clone())
                .unwrap_or_else(|| today_dir(&config, "personas"));

            let units = image_units(&personas, &config.image, &out_dir);
            let pipeline = Pipeline::new(client, timing.poll_policy()?).with_cancellation(cancel);
            Ok(run_units(&pipeline, &units, cli.verbose, &active).await)
        }
        Command::Videos {
            manifest,
            images_dir,
            only,
            out,
        } => {
            let timing = config.video.timing();
            let client = JobClient::new(config.client_config(&timing))?;
            let uploader = Uploader::new(config.upload_config())?;
            let out_dir = out
                .or_else(|| config.video.output_dir.clone())
                .unwrap_or_else(|| today_dir(&config, "videos"));

            let units = plan_videos(&config, manifest.as_deref(), images_dir, &only, &out_dir)?;
            let pipeline = Pipeline::new(client, timing.poll_policy()?)
                .with_uploader(uploader)
                .with_cancellation(cancel);
            Ok(run_units(&pipeline, &units, cli.verbose, &active).await)
        }
        Command::Fetch {
            task_id,
            out,
            profile,
        } => {
            let timing = match profile {
                ProfileArg::Image => config.image.timing(),
                ProfileArg::Video => config.video.timing(),
            };
            let client = JobClient::new(config.client_config(&timing))?;
            let policy = timing.poll_policy()?;
            fetch_task(&client, &task_id, &out, &policy, &cancel, cli.verbose, &active).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn today_dir(config: &GenjobConfig, kind: &str) -> PathBuf {
    dated_dir(&config.output_root, Local::now().date_naive(), kind)
}

fn plan_videos(
    config: &GenjobConfig,
    manifest: Option<&Path>,
    images_dir: Option<PathBuf>,
    only: &[String],
    out_dir: &Path,
) -> Result<Vec<WorkUnit>> {
    let manifest = match manifest {
        Some(path) => Manifest::load(path)?,
        None if Path::new(DEFAULT_MANIFEST).exists() => Manifest::load(Path::new(DEFAULT_MANIFEST))?,
        None => Manifest::default(),
    };
    let scanned = match &images_dir {
        Some(dir) => scan_images(dir)?,
        None => Vec::new(),
    };
    let images_dir = images_dir.unwrap_or_else(|| today_dir(config, "personas"));
    plan_video_units(&manifest, &scanned, only, &config.video, &images_dir, out_dir)
}

async fn run_units(
    pipeline: &Pipeline,
    units: &[WorkUnit],
    verbose: bool,
    active: &ActiveBar,
) -> ExitCode {
    if units.is_empty() {
        tracing::warn!("Nothing to do");
        return ExitCode::SUCCESS;
    }
    let progress = RunProgress::start(verbose, active);
    let summary = pipeline.run(units, &progress).await;
    progress.finish();
    progress.print_summary(&summary);

    if summary.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn fetch_task(
    client: &JobClient,
    task_id: &str,
    out: &Path,
    policy: &genjob::state_machine::PollPolicy,
    cancel: &CancellationToken,
    verbose: bool,
    active: &ActiveBar,
) -> Result<()> {
    if out.exists() {
        println!("already present: {}", out.display());
        return Ok(());
    }
    let progress = RunProgress::start(verbose, active);
    let outcome = poller::poll(client, &TokioClock, task_id, policy, cancel, &progress).await;
    progress.finish();

    let locator = outcome?.ok_or_else(|| Error::NoResult(task_id.to_string()))?;
    let bytes = client.fetch(locator.primary()).await?;
    let size = bytes.len();
    Artifact::new(bytes, out).persist()?;
    println!("saved {} ({size} bytes)", out.display());
    Ok(())
}
