use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Input files, one Map task per file. Glob patterns are expanded.
    #[clap(required = true)]
    pub inputs: Vec<String>,
    /// [OPT] Number of reduce partitions (default 10)
    #[clap(short = 'r', long)]
    pub n_reduce: Option<u32>,
    /// [OPT] Seconds a worker may hold a task before it is reassigned
    #[clap(short = 't', long)]
    pub lease_secs: Option<u64>,
    /// [OPT] Socket path to listen on (default: the per-user path)
    #[clap(short = 's', long)]
    pub sock: Option<PathBuf>,
}
