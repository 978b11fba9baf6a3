use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{AnalysisClient, HttpAnalysisApi, SessionEvent, VideoUpload};
use futures::StreamExt;
use shared::{
    domain::{DetectionModule, JobState},
    protocol::ViolationRecord,
};
use tokio_stream::wrappers::BroadcastStream;

mod config;

use config::{load_settings, Settings};

#[derive(Parser, Debug)]
struct Cli {
    /// Base URL of the analysis service; overrides analyzer.toml and env.
    #[arg(long)]
    server_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a video and stream detected violations until the job finishes.
    Analyze {
        file: PathBuf,
        /// Detection module wire tag (see `modules`).
        #[arg(long, default_value = "anpr")]
        module: DetectionModule,
    },
    /// List the available detection modules.
    Modules,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let cli = Cli::parse();
    let mut settings = load_settings();
    if let Some(server_url) = cli.server_url {
        settings.server_url = server_url;
    }

    match cli.command {
        Command::Analyze { file, module } => analyze(&settings, &file, module).await,
        Command::Modules => {
            for module in DetectionModule::ALL {
                println!(
                    "{:<12} {:<16} {}",
                    module.wire_tag(),
                    module.title(),
                    module.description()
                );
            }
            Ok(())
        }
    }
}

async fn analyze(settings: &Settings, file: &Path, module: DetectionModule) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let filename = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.mp4".to_string());

    let api = Arc::new(HttpAnalysisApi::new(&settings.server_url)?);
    let client = AnalysisClient::new_with_api_and_interval(
        api,
        Duration::from_secs(settings.poll_interval_secs),
    );
    let mut events = BroadcastStream::new(client.subscribe_events());

    let job_id = client
        .submit(
            VideoUpload {
                filename,
                mime_type: Some("video/mp4".to_string()),
                bytes,
            },
            module,
        )
        .await?;
    println!("submitted job {job_id}: {} on {}", module.title(), settings.server_url);

    let mut printed = 0;
    while let Some(event) = events.next().await {
        // A lagged receiver skips ahead; the next snapshot read catches up.
        let Ok(event) = event else { continue };
        match event {
            SessionEvent::ReportUpdated { .. } => {
                let snapshot = client.current_state().await;
                print_new_rows(&snapshot.report, &mut printed);
            }
            SessionEvent::StateChanged(JobState::Completed) => {
                let snapshot = client.current_state().await;
                print_new_rows(&snapshot.report, &mut printed);
                println!("analysis complete: {} violations", snapshot.report.len());
                if let Some(media) = snapshot.result_media {
                    println!("annotated video: {media}");
                }
                return Ok(());
            }
            SessionEvent::StateChanged(JobState::Error) => {
                bail!("analysis failed on the service; submit again to retry");
            }
            SessionEvent::StateChanged(_) => {}
        }
    }
    bail!("event stream ended before the job finished")
}

fn print_new_rows(report: &[ViolationRecord], printed: &mut usize) {
    if *printed > report.len() {
        *printed = report.len();
    }
    for row in &report[*printed..] {
        let plate = row.plate.as_deref().unwrap_or("N/A");
        let evidence = row
            .crop_img_url
            .as_deref()
            .map(|crop| row.full_img_url.as_deref().unwrap_or(crop))
            .unwrap_or("-");
        println!(
            "frame {:>6}  vehicle {:<10} {:<14} plate {:<14} evidence {evidence}",
            row.frame, row.vehicle_id, row.violation_type, plate
        );
    }
    *printed = report.len();
}
