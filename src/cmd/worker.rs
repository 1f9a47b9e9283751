use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Name of the workload to run (e.g. `wc`)
    #[clap(short, long)]
    pub workload: String,
    /// [OPT] Working directory shared with the other workers
    #[clap(short, long)]
    pub dir: Option<PathBuf>,
    /// [OPT] Socket path of the coordinator (default: the per-user path)
    #[clap(short, long)]
    pub sock: Option<PathBuf>,
}
