mod archive;
mod blob;
mod collector;
mod error;
mod finalize;
mod notifier;
mod pipeline;
mod runner;
#[cfg(test)]
mod testing;

use grader_common::{Config, JobContext, WorkspaceLayout};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::archive::TarGzCodec;
use crate::blob::AwsCliStore;
use crate::notifier::HttpNotifier;
use crate::pipeline::Agent;
use crate::runner::ProcessRunner;

// One job per process, strictly sequential
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    init_tracing(config.json_logs);

    info!("Grader agent started");

    let env = JobContext::from_env();

    let root = resolve_root(&config.workspace_root);
    let layout = WorkspaceLayout::new(root, &config.scratch_dir);

    let store = AwsCliStore::new(config.aws_cli.clone());
    let codec = TarGzCodec::new();
    let runner = ProcessRunner::new(layout.root());
    let notifier = HttpNotifier::new();

    let agent = Agent {
        store: &store,
        codec: &codec,
        runner: &runner,
        notifier: &notifier,
        layout: &layout,
    };

    let report = agent.run(&env).await;

    info!(exit_code = report.exit.code(), "Grader agent finishing");
    std::process::exit(report.exit.code());
}

/// Scripts run with the workspace as cwd, so paths to them must be absolute.
/// A root that cannot be resolved is used as given; the run still reaches
/// finalize.
fn resolve_root(root: &Path) -> PathBuf {
    std::path::absolute(root).unwrap_or_else(|e| {
        warn!(
            root = %root.display(),
            error = %e,
            "Could not resolve workspace root, using it as given"
        );
        root.to_path_buf()
    })
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
