use anyhow::{bail, Result};
use clap::Parser;
use glob::glob;
use minimr::cmd::coordinator::Args;
use minimr::coordinator::{self, Scheduler, DEFAULT_LEASE};
use minimr::rpc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let n_reduce = args.n_reduce.unwrap_or(10);
    let lease = args.lease_secs.map(Duration::from_secs).unwrap_or(DEFAULT_LEASE);
    let sock = args.sock.unwrap_or_else(rpc::coordinator_sock);

    // One Map task per input file. Patterns the shell did not expand are
    // expanded here.
    let mut inputs = Vec::new();
    for spec in &args.inputs {
        let before = inputs.len();
        for path in glob(spec)?.flatten() {
            inputs.push(path.to_string_lossy().into_owned());
        }
        if inputs.len() == before {
            bail!("no input files match `{spec}`");
        }
    }

    info!(n_map = inputs.len(), n_reduce, "starting job");
    let scheduler = Arc::new(Scheduler::with_lease(inputs, n_reduce, lease));

    let server = tokio::spawn({
        let scheduler = scheduler.clone();
        let sock = sock.clone();
        async move { coordinator::serve(scheduler, &sock).await }
    });

    while !scheduler.done() {
        // A bind failure surfaces here instead of polling forever.
        if server.is_finished() {
            return server.await?;
        }
        sleep(Duration::from_millis(500)).await;
    }

    // Give lingering workers a moment to collect their exit directives.
    sleep(Duration::from_secs(1)).await;
    info!("job complete");
    Ok(())
}
