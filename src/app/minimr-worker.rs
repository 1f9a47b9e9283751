use anyhow::Result;
use clap::Parser;
use minimr::cmd::worker::Args;
use minimr::rpc;
use minimr::worker::Worker;
use minimr::workload;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let workload = workload::named(&args.workload)?;
    let sock = args.sock.unwrap_or_else(rpc::coordinator_sock);
    let dir = args.dir.unwrap_or_else(|| PathBuf::from("."));

    Worker::new(workload, sock, dir).run().await
}
