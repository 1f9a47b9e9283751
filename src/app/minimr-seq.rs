use anyhow::Result;
use clap::Parser;
use minimr::standalone::{
    engine::{perform_map, perform_reduce},
    Args, Commands, Job,
};
use minimr::workload;

fn parse_args() -> Job {
    let args = Args::parse();
    match args.command {
        Commands::Submit {
            input,
            workload,
            output,
            n_reduce,
        } => Job {
            input,
            workload,
            output,
            n_reduce,
        },
    }
}

fn main() -> Result<()> {
    let job = parse_args();
    let engine = workload::named(&job.workload)?;

    /*  The map logic carries out mapping and also the shuffle. This makes
     *  sense in the case of a standalone run.
     */
    let buckets = perform_map(&job, &engine)?;
    perform_reduce(&job, &engine, buckets)
}
