//! Command line harvester.
//!
//! ```text
//! harvest <rootFolder>
//! harvest --config <brokers.json> <inputId> <outputId>...
//! ```
//!
//! The first form reads a folder through the `FOLDER` connector and prints
//! every record as a JSON line. The second registers the brokers of a
//! configuration file and runs one engine job.

use metadata_harvester::harvest::formats::folder::{FOLDER, P_ROOT_FOLDER};
use metadata_harvester::harvest::formats::stream::CONSOLE;
use metadata_harvester::harvest::formats::{ConsoleConnector, FolderInputConnector};
use metadata_harvester::harvest::{Connector, DataCollector};
use metadata_harvester::{
    DataReference, Engine, EntityDefinition, HarvestError, HarvesterConfig, JobState, Listener,
};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const USAGE: &str =
    "usage: harvest <rootFolder> | harvest --config <file.json> <inputId> <outputId>...";

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match args.as_slice() {
        [flag, path, input, outputs @ ..] if flag == "--config" && !outputs.is_empty() => {
            run_job(path, input, outputs).await
        }
        [root] if !root.starts_with("--") => collect_folder(root).await,
        _ => {
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Harvest failed");
            ExitCode::FAILURE
        }
    }
}

async fn collect_folder(root: &str) -> Result<(), BoxError> {
    let source = FolderInputConnector::new()
        .create_broker(&EntityDefinition::new(FOLDER).with_property(P_ROOT_FOLDER, root))?;
    let destination = ConsoleConnector.create_broker(&EntityDefinition::new(CONSOLE))?;

    let summary = DataCollector::new(source, vec![destination]).collect().await?;
    info!(records = summary.records, failed = summary.failed, "Done");
    Ok(())
}

async fn run_job(config: &str, input: &str, outputs: &[String]) -> Result<(), BoxError> {
    let engine = Engine::with_default_connectors();
    engine.load_config(&HarvesterConfig::from_path(config)?)?;

    let input = Uuid::parse_str(input)?;
    let outputs = outputs
        .iter()
        .map(|id| Uuid::parse_str(id))
        .collect::<Result<Vec<_>, _>>()?;

    let progress = Arc::new(Progress::default());
    let (id, handler) = engine.submit_by_id(input, &outputs, progress.clone())?;
    info!(job = %id, "Harvest running, press Ctrl-C to abort");

    let state = tokio::select! {
        state = handler.wait() => state,
        _ = tokio::signal::ctrl_c() => {
            warn!(job = %id, "Interrupted");
            engine.shutdown();
            handler.wait().await
        }
    };

    info!(
        job = %id,
        state = ?state,
        published = progress.published.load(Ordering::Relaxed),
        failed = progress.failed.load(Ordering::Relaxed),
        "Harvest finished"
    );
    if state == JobState::Aborted {
        return Err("harvest aborted".into());
    }
    Ok(())
}

#[derive(Default)]
struct Progress {
    published: AtomicUsize,
    failed: AtomicUsize,
}

impl Listener for Progress {
    fn on_success(&self, reference: &DataReference) {
        self.published.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(record = %reference, "Published");
    }

    fn on_error(&self, error: &HarvestError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        warn!(error = %error, "Harvest error");
    }
}
