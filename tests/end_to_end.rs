//! Drives whole jobs through the coordinator and several workers over a
//! real Unix socket, then cross-checks the outputs against the standalone
//! engine.

use minimr::coordinator::{serve, Scheduler};
use minimr::ihash;
use minimr::standalone::{engine, Job};
use minimr::worker::Worker;
use minimr::workload;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Collect all `mr-out-*` lines in `dir` into a key -> value map, checking
/// that no key appears twice across the output files.
fn read_outputs(dir: &Path) -> HashMap<String, String> {
    let mut result = HashMap::new();
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        if !name.starts_with("mr-out-") {
            continue;
        }
        for line in fs::read_to_string(&path).unwrap().lines() {
            let (key, value) = line.split_once(' ').unwrap();
            let previous = result.insert(key.to_owned(), value.to_owned());
            assert!(previous.is_none(), "key {key} appears in two output files");
        }
    }
    result
}

#[tokio::test(flavor = "multi_thread")]
async fn word_count_with_competing_workers() {
    let dir = TempDir::new().unwrap();
    let mut files = Vec::new();
    for (name, contents) in [("in-0.txt", "a b a"), ("in-1.txt", "b c")] {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        files.push(path.to_string_lossy().into_owned());
    }

    let n_reduce = 2;
    let sock = dir.path().join("coordinator.sock");
    let scheduler = Arc::new(Scheduler::new(files, n_reduce));
    let server = tokio::spawn({
        let scheduler = scheduler.clone();
        let sock = sock.clone();
        async move { serve(scheduler, &sock).await }
    });

    let wc = workload::named("wc").unwrap();
    let mut workers = Vec::new();
    for _ in 0..3 {
        let worker = Worker::new(wc, sock.clone(), dir.path().to_path_buf());
        workers.push(tokio::spawn(async move { worker.run().await }));
    }
    for handle in workers {
        handle.await.unwrap().unwrap();
    }
    assert!(scheduler.done());
    server.abort();

    // Every output file is sorted, and each key lives in the partition its
    // hash selects.
    for r in 0..n_reduce {
        let contents = fs::read_to_string(dir.path().join(format!("mr-out-{r}"))).unwrap();
        let keys: Vec<&str> = contents
            .lines()
            .map(|line| line.split_once(' ').unwrap().0)
            .collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
        for key in keys {
            assert_eq!(ihash(key.as_bytes()) % n_reduce, r);
        }
    }

    let result = read_outputs(dir.path());
    assert_eq!(result.get("a").map(String::as_str), Some("2"));
    assert_eq!(result.get("b").map(String::as_str), Some("2"));
    assert_eq!(result.get("c").map(String::as_str), Some("1"));

    // The standalone engine over the same inputs is the oracle.
    let oracle_dir = TempDir::new().unwrap();
    let job = Job {
        input: dir.path().join("in-*.txt").to_string_lossy().into_owned(),
        workload: "wc".into(),
        output: oracle_dir.path().to_string_lossy().into_owned(),
        n_reduce,
    };
    let buckets = engine::perform_map(&job, &wc).unwrap();
    engine::perform_reduce(&job, &wc, buckets).unwrap();
    assert_eq!(result, read_outputs(oracle_dir.path()));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_job_sends_workers_home() {
    let dir = TempDir::new().unwrap();
    let sock = dir.path().join("coordinator.sock");
    let scheduler = Arc::new(Scheduler::new(Vec::new(), 0));
    let server = tokio::spawn({
        let scheduler = scheduler.clone();
        let sock = sock.clone();
        async move { serve(scheduler, &sock).await }
    });

    let worker = Worker::new(
        workload::named("wc").unwrap(),
        sock.clone(),
        dir.path().to_path_buf(),
    );
    worker.run().await.unwrap();

    assert!(scheduler.done());
    server.abort();
    assert!(read_outputs(dir.path()).is_empty());
}
