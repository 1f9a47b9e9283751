//! The worker loop and the Map/Reduce execution paths.
//!
//! Workers pull work from the coordinator, execute it in the shared working
//! directory, and report outcomes. Outputs reach their canonical names only
//! through a rename of a fully written scratch file, so a second worker
//! racing on a reassigned task can overwrite a canonical file but never
//! corrupt it.

use crate::codec;
use crate::rpc::pb::coordinator_client::CoordinatorClient;
use crate::rpc::pb::{Directive, TaskAssignment, TaskReport, TaskRequest};
use crate::{ihash, MapFn, ReduceFn, Workload};
use anyhow::{Context, Result};
use glob::glob;
use itertools::Itertools;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tonic::transport::Channel;
use tonic::Request;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long to sleep when idle or when the coordinator is unreachable.
const RETRY_INTERVAL: Duration = Duration::from_millis(300);

/// Canonical name of the intermediate shard map task `map_id` publishes
/// for partition `reduce_id`.
pub fn map_output_name(map_id: u32, reduce_id: u32) -> String {
    format!("mr-{map_id}-{reduce_id}")
}

/// Canonical name of reduce partition `reduce_id`'s final output.
pub fn reduce_output_name(reduce_id: u32) -> String {
    format!("mr-out-{reduce_id}")
}

/// A scratch file next to the canonical names, so the publishing rename
/// stays on one filesystem. The dot prefix keeps it out of the `mr-*`
/// globs; the uuid keeps racing workers off each other's files.
fn scratch_path(dir: &Path, tag: &str) -> PathBuf {
    dir.join(format!(".mr-{tag}-{}", Uuid::new_v4()))
}

/// A single worker process: requests tasks, executes them in `dir`, and
/// reports outcomes until the coordinator says to exit.
pub struct Worker {
    workload: Workload,
    sock: PathBuf,
    dir: PathBuf,
}

impl Worker {
    pub fn new(workload: Workload, sock: PathBuf, dir: PathBuf) -> Self {
        Self { workload, sock, dir }
    }

    pub async fn run(&self) -> Result<()> {
        let mut client: Option<CoordinatorClient<Channel>> = None;
        loop {
            if client.is_none() {
                match crate::rpc::connect(&self.sock).await {
                    Ok(c) => client = Some(c),
                    Err(err) => {
                        // The coordinator may not be listening yet.
                        debug!("coordinator unreachable: {err:#}");
                        sleep(RETRY_INTERVAL).await;
                        continue;
                    }
                }
            }
            let Some(c) = client.as_mut() else { continue };

            let assignment = match c.request_task(Request::new(TaskRequest {})).await {
                Ok(reply) => reply.into_inner(),
                Err(status) => {
                    debug!(%status, "request_task failed; reconnecting");
                    client = None;
                    sleep(RETRY_INTERVAL).await;
                    continue;
                }
            };

            match assignment.directive() {
                Directive::Map => {
                    let success = self.run_map(&assignment);
                    report(c, Directive::Map, assignment.task_id, success).await;
                }
                Directive::Reduce => {
                    let success =
                        match do_reduce(&self.dir, assignment.task_id, self.workload.reduce_fn) {
                            Ok(()) => true,
                            Err(err) => {
                                warn!(reduce_id = assignment.task_id, "reduce failed: {err:#}");
                                false
                            }
                        };
                    report(c, Directive::Reduce, assignment.task_id, success).await;
                }
                Directive::Idle => sleep(RETRY_INTERVAL).await,
                Directive::Exit => {
                    info!("job drained; worker exiting");
                    return Ok(());
                }
            }
        }
    }

    fn run_map(&self, assignment: &TaskAssignment) -> bool {
        if assignment.input.is_empty() || assignment.n_reduce == 0 {
            warn!(map_id = assignment.task_id, "malformed map assignment");
            return false;
        }
        match do_map(
            &self.dir,
            assignment.task_id,
            assignment.n_reduce,
            Path::new(&assignment.input),
            self.workload.map_fn,
        ) {
            Ok(()) => true,
            Err(err) => {
                warn!(map_id = assignment.task_id, "map failed: {err:#}");
                false
            }
        }
    }
}

/// Report an outcome. A lost report is equivalent to a crash and is
/// repaired by lease expiry, so transport errors are dropped here.
async fn report(
    client: &mut CoordinatorClient<Channel>,
    kind: Directive,
    task_id: u32,
    success: bool,
) {
    let report = TaskReport {
        kind: kind as i32,
        task_id,
        success,
    };
    if let Err(status) = client.report_task(Request::new(report)).await {
        debug!(%status, "report_task failed; leaving repair to the lease");
    }
}

/// Execute one Map task: partition `input`'s pairs into `n_reduce`
/// intermediate shards under `dir`.
///
/// All `n_reduce` shards are created up front, so even a map that emits
/// nothing publishes a complete (empty) set of canonical files.
pub fn do_map(dir: &Path, map_id: u32, n_reduce: u32, input: &Path, map_fn: MapFn) -> Result<()> {
    anyhow::ensure!(n_reduce > 0, "map task needs at least one partition");
    let contents = fs::read_to_string(input)
        .with_context(|| format!("reading map input {}", input.display()))?;
    let pairs = map_fn(&input.to_string_lossy(), &contents);

    let mut shards = Vec::with_capacity(n_reduce as usize);
    for _ in 0..n_reduce {
        let path = scratch_path(dir, "map");
        let file = File::create(&path)
            .with_context(|| format!("creating scratch file {}", path.display()))?;
        shards.push((path, BufWriter::new(file)));
    }
    for kv in &pairs {
        let p = ihash(kv.key.as_bytes()) % n_reduce;
        codec::write_record(&mut shards[p as usize].1, kv)?;
    }

    // The renames are the publication point; a canonical name only ever
    // refers to a fully written shard.
    for (p, (path, mut writer)) in shards.into_iter().enumerate() {
        writer.flush().context("flushing shard")?;
        drop(writer);
        let canonical = dir.join(map_output_name(map_id, p as u32));
        fs::rename(&path, &canonical)
            .with_context(|| format!("publishing {}", canonical.display()))?;
    }
    Ok(())
}

/// Execute one Reduce task: fold every published shard for this partition
/// into the final `mr-out-<reduce_id>` file.
pub fn do_reduce(dir: &Path, reduce_id: u32, reduce_fn: ReduceFn) -> Result<()> {
    let pattern = dir.join(format!("mr-*-{reduce_id}"));
    let pattern = pattern
        .to_str()
        .context("working directory is not valid utf-8")?;

    let mut kvs = Vec::new();
    for entry in glob(pattern).context("globbing intermediate shards")? {
        let path = entry?;
        // mr-out-<r> matches the shard glob once a racing worker has
        // published it; final outputs are not reduce inputs.
        let published = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("mr-out-"));
        if published {
            continue;
        }
        let file =
            File::open(&path).with_context(|| format!("opening shard {}", path.display()))?;
        kvs.extend(codec::read_records(BufReader::new(file))?);
    }

    kvs.sort_unstable_by(|a, b| a.key.cmp(&b.key));

    let scratch = scratch_path(dir, "out");
    let file = File::create(&scratch)
        .with_context(|| format!("creating scratch file {}", scratch.display()))?;
    let mut out = BufWriter::new(file);
    for (key, group) in &kvs.into_iter().chunk_by(|kv| kv.key.clone()) {
        let values: Vec<String> = group.map(|kv| kv.value).collect();
        let result = reduce_fn(&key, &values);
        writeln!(out, "{key} {result}")?;
    }
    out.flush().context("flushing reduce output")?;
    drop(out);

    let canonical = dir.join(reduce_output_name(reduce_id));
    fs::rename(&scratch, &canonical)
        .with_context(|| format!("publishing {}", canonical.display()))?;
    Ok(())
}
